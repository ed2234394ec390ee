//! Profiling utilities based on the `puffin` crate.

#[cfg(feature = "profiling")]
use std::sync::OnceLock;

pub use puffin::{GlobalProfiler, profile_function, profile_scope};

/// Profiling backend options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfilingBackend {
    /// Send profiling data to puffin_viewer via HTTP.
    PuffinHttp,
}

pub const DEFAULT_PUFFIN_ADDR: &str = "0.0.0.0:8585";

#[cfg(feature = "profiling")]
static PROFILING_SERVER: OnceLock<puffin_http::Server> = OnceLock::new();

/// Initialize profiling with the specified backend on the default port.
///
/// # Example
/// ```no_run
/// use quill_core::profiling::{init_profiling, ProfilingBackend};
///
/// init_profiling(ProfilingBackend::PuffinHttp);
/// ```
pub fn init_profiling(backend: ProfilingBackend) {
    init_profiling_at(backend, DEFAULT_PUFFIN_ADDR);
}

pub fn init_profiling_at(backend: ProfilingBackend, addr: &str) {
    match backend {
        ProfilingBackend::PuffinHttp => {
            puffin::set_scopes_on(true);
            start_server(addr);
        }
    }
}

#[cfg(feature = "profiling")]
fn start_server(addr: &str) {
    match puffin_http::Server::new(addr) {
        Ok(server) => {
            tracing::info!("Puffin profiler server started on http://{}", addr);
            // Dropping the server stops it.
            let _ = PROFILING_SERVER.set(server);
        }
        Err(e) => {
            tracing::error!("Failed to start puffin server: {}", e);
        }
    }
}

#[cfg(not(feature = "profiling"))]
fn start_server(addr: &str) {
    tracing::warn!(
        "Puffin scopes enabled but the HTTP server at {} is unavailable: built without the `profiling` feature",
        addr
    );
}

/// Mark the start of a new frame for profiling.
///
/// Call once per presented frame, after the final flush.
#[inline]
pub fn new_frame() {
    puffin::GlobalProfiler::lock().new_frame();
}
