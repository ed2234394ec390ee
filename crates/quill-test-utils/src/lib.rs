//! Backend contract for the Quill batching engine.
//!
//! The batching engine never talks to a graphics API directly. It is written
//! against [`RenderBackend`], a small synchronous, GL-shaped command surface:
//! allocate and update buffers, bind vertex layouts, set uniforms and
//! textures, issue draws.
//!
//! # Overview
//!
//! - [`RenderBackend`] - the trait every backend implements
//! - [`BackendCapabilities`] - queried once per context and threaded through
//! - Handle newtypes ([`BufferHandle`], [`TextureHandle`], ...) where `0` is "none"
//! - `MockBackend` - records every call for assertions (requires `mock` feature)
//!
//! # Example
//!
//! ```rust
//! # #[cfg(feature = "mock")]
//! # {
//! use quill_test_utils::{BufferDesc, MockBackend, RenderBackend};
//!
//! let mock = MockBackend::new();
//! let buffer = mock
//!     .create_buffer(&BufferDesc::vertex(Some("positions"), &[0u8; 48]))
//!     .unwrap();
//! mock.write_buffer(buffer, 0, &[1u8; 12]);
//!
//! assert_eq!(mock.count_buffer_creates(), 1);
//! assert_eq!(mock.count_buffer_writes(), 1);
//! # }
//! ```
//!
//! # Design
//!
//! Methods take `&self` so one backend can be shared through `Arc` by every
//! batch of a context. Implementations that keep state use interior
//! mutability. The trait is object safe and used as `dyn RenderBackend`.

pub mod gpu_types;
#[cfg(feature = "mock")]
pub mod mock_backend;
pub mod render_backend;

pub use gpu_types::*;
#[cfg(feature = "mock")]
pub use mock_backend::*;
pub use render_backend::*;
