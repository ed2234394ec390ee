//! Mock implementation of RenderBackend for testing.
//!
//! Every call is recorded in order. Buffer contents are mirrored in memory so
//! tests can inspect exactly what reached the "GPU".

use crate::{gpu_types::*, render_backend::*};
use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;

/// Records a backend call for verification in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    CreateBuffer {
        buffer: BufferHandle,
        size: u64,
        usage: wgpu::BufferUsages,
    },
    WriteBuffer {
        buffer: BufferHandle,
        offset: u64,
        size: usize,
    },
    DestroyBuffer {
        buffer: BufferHandle,
    },
    CreateVertexArray {
        vertex_array: VertexArrayHandle,
    },
    ConfigureVertexArray {
        vertex_array: VertexArrayHandle,
        layout: VertexLayout,
    },
    BindVertexArray {
        vertex_array: VertexArrayHandle,
    },
    DestroyVertexArray {
        vertex_array: VertexArrayHandle,
    },
    BindVertexLayout {
        layout: VertexLayout,
    },
    UnbindVertexLayout,
    UseShader {
        shader: ShaderHandle,
    },
    SetUniformMat4 {
        location: ShaderLocation,
        value: [f32; 16],
    },
    SetUniformVec4 {
        location: ShaderLocation,
        value: [f32; 4],
    },
    SetUniformSampler {
        location: ShaderLocation,
        unit: u32,
    },
    BindTexture {
        unit: u32,
        texture: TextureHandle,
    },
    SetBlendState {
        state: wgpu::BlendState,
    },
    SetViewport {
        viewport: Viewport,
    },
    DrawArrays {
        topology: wgpu::PrimitiveTopology,
        first_vertex: u32,
        vertex_count: u32,
    },
    DrawIndexed {
        index_count: u32,
        first_index: u32,
    },
}

impl BackendCall {
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            BackendCall::DrawArrays { .. } | BackendCall::DrawIndexed { .. }
        )
    }
}

#[derive(Default)]
struct MockResources {
    next_id: u32,
    buffers: AHashMap<BufferHandle, Vec<u8>>,
    vertex_arrays: AHashSet<VertexArrayHandle>,
    allocations: usize,
}

impl MockResources {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

/// Mock implementation of RenderBackend for testing.
///
/// Methods take `&self` and record through a `parking_lot::Mutex`, so the
/// mock can be shared as `Arc<dyn RenderBackend>` like a real backend.
///
/// # Example
///
/// ```rust
/// use quill_test_utils::{BackendCapabilities, MockBackend, RenderBackend};
///
/// let mock = MockBackend::with_capabilities(BackendCapabilities::embedded());
/// assert!(mock.create_vertex_array().is_err());
/// ```
pub struct MockBackend {
    calls: Mutex<Vec<BackendCall>>,
    resources: Mutex<MockResources>,
    capabilities: BackendCapabilities,
    /// Allocations succeed until this many have been made.
    allocation_limit: Option<usize>,
}

impl MockBackend {
    /// A mock reporting [`BackendCapabilities::modern`].
    pub fn new() -> Self {
        Self::with_capabilities(BackendCapabilities::modern())
    }

    pub fn with_capabilities(capabilities: BackendCapabilities) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            resources: Mutex::new(MockResources::default()),
            capabilities,
            allocation_limit: None,
        }
    }

    /// Fail every buffer or vertex array allocation after the first `limit`.
    pub fn with_allocation_limit(mut self, limit: usize) -> Self {
        self.allocation_limit = Some(limit);
        self
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().push(call);
    }

    fn count(&self, pred: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| pred(call)).count()
    }

    /// Get all recorded calls.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    /// Only the draw calls, in issue order.
    pub fn draws(&self) -> Vec<BackendCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.is_draw())
            .cloned()
            .collect()
    }

    pub fn count_buffer_creates(&self) -> usize {
        self.count(|call| matches!(call, BackendCall::CreateBuffer { .. }))
    }

    pub fn count_buffer_writes(&self) -> usize {
        self.count(|call| matches!(call, BackendCall::WriteBuffer { .. }))
    }

    pub fn count_draws(&self) -> usize {
        self.count(BackendCall::is_draw)
    }

    /// Clear all recorded calls. Live resources are kept.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Get total number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Buffers created and not yet destroyed.
    pub fn live_buffer_count(&self) -> usize {
        self.resources.lock().buffers.len()
    }

    pub fn live_vertex_array_count(&self) -> usize {
        self.resources.lock().vertex_arrays.len()
    }

    /// Current bytes of a live buffer.
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.resources.lock().buffers.get(&buffer).cloned()
    }

    fn check_allocation(&self, resources: &mut MockResources, size: u64) -> Result<(), BackendError> {
        if let Some(limit) = self.allocation_limit
            && resources.allocations >= limit
        {
            return Err(BackendError::OutOfMemory { requested: size });
        }
        resources.allocations += 1;
        Ok(())
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for MockBackend {
    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<BufferHandle, BackendError> {
        if desc.size() > self.capabilities.max_buffer_size {
            return Err(BackendError::OutOfMemory {
                requested: desc.size(),
            });
        }
        let buffer = {
            let mut resources = self.resources.lock();
            self.check_allocation(&mut resources, desc.size())?;
            let buffer = BufferHandle(resources.next_id());
            resources.buffers.insert(buffer, desc.contents.to_vec());
            buffer
        };
        self.record(BackendCall::CreateBuffer {
            buffer,
            size: desc.size(),
            usage: desc.usage,
        });
        Ok(buffer)
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        {
            let mut resources = self.resources.lock();
            let storage = resources
                .buffers
                .get_mut(&buffer)
                .unwrap_or_else(|| panic!("write to unknown mock buffer {:?}", buffer));
            let start = offset as usize;
            let end = start + data.len();
            assert!(
                end <= storage.len(),
                "write of {}..{} overflows mock buffer {:?} of {} bytes",
                start,
                end,
                buffer,
                storage.len()
            );
            storage[start..end].copy_from_slice(data);
        }
        self.record(BackendCall::WriteBuffer {
            buffer,
            offset,
            size: data.len(),
        });
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        if buffer.is_null() {
            return;
        }
        let removed = self.resources.lock().buffers.remove(&buffer).is_some();
        assert!(removed, "double free of mock buffer {:?}", buffer);
        self.record(BackendCall::DestroyBuffer { buffer });
    }

    fn create_vertex_array(&self) -> Result<VertexArrayHandle, BackendError> {
        if !self
            .capabilities
            .supports(BackendFeatures::VERTEX_ARRAY_OBJECT)
        {
            return Err(BackendError::Unsupported("vertex array objects".into()));
        }
        let vertex_array = {
            let mut resources = self.resources.lock();
            self.check_allocation(&mut resources, 0)?;
            let vertex_array = VertexArrayHandle(resources.next_id());
            resources.vertex_arrays.insert(vertex_array);
            vertex_array
        };
        self.record(BackendCall::CreateVertexArray { vertex_array });
        Ok(vertex_array)
    }

    fn configure_vertex_array(&self, vertex_array: VertexArrayHandle, layout: &VertexLayout) {
        self.record(BackendCall::ConfigureVertexArray {
            vertex_array,
            layout: *layout,
        });
    }

    fn bind_vertex_array(&self, vertex_array: VertexArrayHandle) {
        self.record(BackendCall::BindVertexArray { vertex_array });
    }

    fn destroy_vertex_array(&self, vertex_array: VertexArrayHandle) {
        if vertex_array.is_null() {
            return;
        }
        let removed = self.resources.lock().vertex_arrays.remove(&vertex_array);
        assert!(removed, "double free of mock vertex array {:?}", vertex_array);
        self.record(BackendCall::DestroyVertexArray { vertex_array });
    }

    fn bind_vertex_layout(&self, layout: &VertexLayout) {
        self.record(BackendCall::BindVertexLayout { layout: *layout });
    }

    fn unbind_vertex_layout(&self) {
        self.record(BackendCall::UnbindVertexLayout);
    }

    fn use_shader(&self, shader: ShaderHandle) {
        self.record(BackendCall::UseShader { shader });
    }

    fn set_uniform_mat4(&self, location: ShaderLocation, value: [f32; 16]) {
        self.record(BackendCall::SetUniformMat4 { location, value });
    }

    fn set_uniform_vec4(&self, location: ShaderLocation, value: [f32; 4]) {
        self.record(BackendCall::SetUniformVec4 { location, value });
    }

    fn set_uniform_sampler(&self, location: ShaderLocation, unit: u32) {
        self.record(BackendCall::SetUniformSampler { location, unit });
    }

    fn bind_texture(&self, unit: u32, texture: TextureHandle) {
        self.record(BackendCall::BindTexture { unit, texture });
    }

    fn set_blend_state(&self, state: &wgpu::BlendState) {
        self.record(BackendCall::SetBlendState { state: *state });
    }

    fn set_viewport(&self, viewport: Viewport) {
        self.record(BackendCall::SetViewport { viewport });
    }

    fn draw_arrays(&self, topology: wgpu::PrimitiveTopology, first_vertex: u32, vertex_count: u32) {
        self.record(BackendCall::DrawArrays {
            topology,
            first_vertex,
            vertex_count,
        });
    }

    fn draw_indexed(&self, index_count: u32, first_index: u32) {
        self.record(BackendCall::DrawIndexed {
            index_count,
            first_index,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_buffer_creation() {
        let mock = MockBackend::new();
        let buffer = mock
            .create_buffer(&BufferDesc::vertex(Some("test"), &[0u8; 16]))
            .unwrap();

        assert!(!buffer.is_null());
        assert_eq!(mock.count_buffer_creates(), 1);
        assert_eq!(mock.live_buffer_count(), 1);
    }

    #[test]
    fn test_mock_write_mirrors_contents() {
        let mock = MockBackend::new();
        let buffer = mock
            .create_buffer(&BufferDesc::vertex(None, &[0u8; 8]))
            .unwrap();
        mock.write_buffer(buffer, 4, &[1, 2, 3, 4]);

        assert_eq!(
            mock.buffer_contents(buffer).unwrap(),
            vec![0, 0, 0, 0, 1, 2, 3, 4]
        );
        assert_eq!(mock.count_buffer_writes(), 1);
    }

    #[test]
    #[should_panic(expected = "overflows")]
    fn test_mock_write_out_of_range_panics() {
        let mock = MockBackend::new();
        let buffer = mock
            .create_buffer(&BufferDesc::vertex(None, &[0u8; 4]))
            .unwrap();
        mock.write_buffer(buffer, 2, &[0u8; 4]);
    }

    #[test]
    fn test_mock_allocation_limit() {
        let mock = MockBackend::new().with_allocation_limit(2);
        assert!(mock.create_buffer(&BufferDesc::index(None, &[0u8; 4])).is_ok());
        assert!(mock.create_vertex_array().is_ok());
        assert_eq!(
            mock.create_buffer(&BufferDesc::index(None, &[0u8; 4])),
            Err(BackendError::OutOfMemory { requested: 4 })
        );
    }

    #[test]
    fn test_mock_vertex_arrays_require_feature() {
        let mock = MockBackend::with_capabilities(BackendCapabilities::embedded());
        assert!(matches!(
            mock.create_vertex_array(),
            Err(BackendError::Unsupported(_))
        ));
    }

    #[test]
    fn test_mock_destroy_null_is_noop() {
        let mock = MockBackend::new();
        mock.destroy_buffer(BufferHandle::NULL);
        mock.destroy_vertex_array(VertexArrayHandle::NULL);
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn test_mock_clear_calls() {
        let mock = MockBackend::new();
        mock.draw_indexed(6, 0);
        mock.draw_arrays(wgpu::PrimitiveTopology::LineList, 0, 2);
        assert_eq!(mock.count_draws(), 2);

        mock.clear_calls();
        assert_eq!(mock.call_count(), 0);
    }
}
