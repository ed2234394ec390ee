//! The synchronous command surface the batching engine draws through.

use crate::gpu_types::*;

/// Errors a backend can report while allocating resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    OutOfMemory { requested: u64 },
    Unsupported(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfMemory { requested } => {
                write!(f, "Backend out of memory allocating {} bytes", requested)
            }
            Self::Unsupported(what) => write!(f, "Unsupported by backend: {}", what),
        }
    }
}

impl std::error::Error for BackendError {}

/// Trait abstracting the graphics API underneath the batching engine.
///
/// The surface is state-machine shaped: `use_shader`, `bind_texture`,
/// `set_blend_state`, `set_viewport` and the vertex binding calls set
/// current state, and `draw_arrays`/`draw_indexed` consume it. Every call
/// completes synchronously from the caller's point of view.
///
/// Releasing a null handle must be a no-op.
///
/// # Example
///
/// ```rust,no_run
/// use quill_test_utils::{BufferDesc, RenderBackend};
///
/// fn upload(backend: &dyn RenderBackend, bytes: &[u8]) {
///     let buffer = backend
///         .create_buffer(&BufferDesc::vertex(Some("scratch"), bytes))
///         .unwrap();
///     backend.write_buffer(buffer, 0, bytes);
///     backend.destroy_buffer(buffer);
/// }
/// ```
pub trait RenderBackend: Send + Sync {
    /// Capabilities of this backend. Stable for the backend's lifetime.
    fn capabilities(&self) -> BackendCapabilities;

    // Buffers

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<BufferHandle, BackendError>;

    /// Overwrite `data.len()` bytes starting at `offset`.
    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]);

    fn destroy_buffer(&self, buffer: BufferHandle);

    // Vertex arrays (only called when `VERTEX_ARRAY_OBJECT` is supported)

    fn create_vertex_array(&self) -> Result<VertexArrayHandle, BackendError>;

    /// Record `layout` into the vertex array so a later bind restores it.
    fn configure_vertex_array(&self, vertex_array: VertexArrayHandle, layout: &VertexLayout);

    fn bind_vertex_array(&self, vertex_array: VertexArrayHandle);

    fn destroy_vertex_array(&self, vertex_array: VertexArrayHandle);

    // Vertex bindings without vertex arrays

    /// Bind every attribute stream and the index buffer of `layout`.
    fn bind_vertex_layout(&self, layout: &VertexLayout);

    /// Clear whatever vertex array or layout is bound.
    fn unbind_vertex_layout(&self);

    // Program state

    fn use_shader(&self, shader: ShaderHandle);

    fn set_uniform_mat4(&self, location: ShaderLocation, value: [f32; 16]);

    fn set_uniform_vec4(&self, location: ShaderLocation, value: [f32; 4]);

    /// Point a sampler uniform at a texture unit.
    fn set_uniform_sampler(&self, location: ShaderLocation, unit: u32);

    /// Make `unit` active and bind `texture` to it. `NULL` unbinds.
    fn bind_texture(&self, unit: u32, texture: TextureHandle);

    fn set_blend_state(&self, state: &wgpu::BlendState);

    fn set_viewport(&self, viewport: Viewport);

    // Draws

    /// Unindexed draw of `vertex_count` vertices starting at `first_vertex`.
    fn draw_arrays(&self, topology: wgpu::PrimitiveTopology, first_vertex: u32, vertex_count: u32);

    /// Indexed triangle-list draw through the bound index buffer.
    fn draw_indexed(&self, index_count: u32, first_index: u32);
}
