//! Quill Render
//!
//! Immediate-mode geometry batching: vertices submitted between
//! `begin`/`end` accumulate in CPU buffers and reach the backend as a small
//! number of draws, split only where texture, shader, blend or capacity
//! limits demand it.
//!
//! - [`Context`] - the front end (`begin`, `vertex*`, `set_texture`, matrices, ...)
//! - [`BatchEngine`] - accumulation and flushing
//! - [`GeometryBuffer`] - one vertex buffer generation
//! - [`DrawCall`] - a span of vertices drawn with one backend draw
//! - [`RenderState`] - shader, textures, matrices and the vertex cursor
//!
//! Backends implement [`quill_test_utils::RenderBackend`]. A wgpu
//! implementation is available with the `wgpu-backend` feature.

pub mod batch;
pub mod blend;
pub mod capability;
pub mod config;
pub mod context;
pub mod draw_call;
pub mod error;
pub mod geometry_buffer;
pub mod shader;
pub mod state;
#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub use batch::{BatchEngine, BatchPhase, BatchStats};
pub use blend::{BlendMode, BlendSettings};
pub use capability::BatchRequirements;
pub use config::BatchConfig;
pub use context::{Context, ContextDescriptor, ContextId};
pub use draw_call::{DrawCall, DrawQueue, PrimitiveMode};
pub use error::{BatchError, ErrorKind};
pub use geometry_buffer::GeometryBuffer;
pub use shader::{ShaderLocations, ShaderProgram};
pub use state::{MatrixMode, MatrixSlot, RenderState, StereoState};
#[cfg(feature = "wgpu-backend")]
pub use wgpu_backend::{RenderTarget, WgpuBackend};
