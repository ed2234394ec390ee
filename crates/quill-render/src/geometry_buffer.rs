//! CPU-side vertex storage for one buffer generation and its GPU mirror.

use std::sync::Arc;

use quill_core::profiling::profile_function;
use quill_test_utils::{
    BackendCapabilities, BackendError, BackendFeatures, BufferDesc, BufferHandle, RenderBackend,
    VertexArrayHandle, VertexAttribute, VertexLayout, VertexSemantic,
};
use static_assertions::const_assert_eq;

use crate::shader::ShaderLocations;

pub const VERTICES_PER_QUAD: usize = 4;
pub const INDICES_PER_QUAD: usize = 6;

/// Two counter-clockwise triangles per quad.
const QUAD_INDEX_PATTERN: [u32; INDICES_PER_QUAD] = [0, 1, 2, 0, 2, 3];

pub type Position = [f32; 3];
pub type TexCoord = [f32; 2];
pub type Color = [u8; 4];

// Attribute streams are uploaded as raw bytes and described to the backend by
// `VertexSemantic::format`; the sizes must agree.
const_assert_eq!(std::mem::size_of::<Position>(), 12);
const_assert_eq!(std::mem::size_of::<TexCoord>(), 8);
const_assert_eq!(std::mem::size_of::<Color>(), 4);

/// Quad index pattern in the backend's index width.
#[derive(Debug)]
enum QuadIndices {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl QuadIndices {
    fn new(quads: usize, format: wgpu::IndexFormat) -> Self {
        let pattern = (0..quads).flat_map(|quad| {
            let base = (quad * VERTICES_PER_QUAD) as u32;
            QUAD_INDEX_PATTERN.iter().map(move |i| base + i)
        });
        if format == wgpu::IndexFormat::Uint16 {
            QuadIndices::U16(pattern.map(|i| i as u16).collect())
        } else {
            QuadIndices::U32(pattern.collect())
        }
    }

    fn as_bytes(&self) -> &[u8] {
        match self {
            QuadIndices::U16(indices) => bytemuck::cast_slice(indices),
            QuadIndices::U32(indices) => bytemuck::cast_slice(indices),
        }
    }

    fn get(&self, i: usize) -> Option<u32> {
        match self {
            QuadIndices::U16(indices) => indices.get(i).map(|&v| v as u32),
            QuadIndices::U32(indices) => indices.get(i).copied(),
        }
    }
}

#[derive(Debug, Default)]
struct GpuHandles {
    positions: BufferHandle,
    texcoords: BufferHandle,
    colors: BufferHandle,
    indices: BufferHandle,
    vertex_array: VertexArrayHandle,
}

/// Fixed-capacity vertex storage for one generation.
///
/// GPU handles are released on drop. Handles that were never created are
/// null and skipped, so a buffer whose construction failed halfway cleans up
/// exactly what it allocated.
pub struct GeometryBuffer {
    backend: Arc<dyn RenderBackend>,
    capacity: usize,
    positions: Vec<Position>,
    texcoords: Vec<TexCoord>,
    colors: Vec<Color>,
    indices: QuadIndices,
    index_format: wgpu::IndexFormat,
    handles: GpuHandles,
}

impl GeometryBuffer {
    /// Allocate storage for `capacity` quads and upload the initial (zeroed)
    /// contents. Attribute bindings are captured in a vertex array when the
    /// backend supports them.
    pub fn new(
        backend: Arc<dyn RenderBackend>,
        capabilities: &BackendCapabilities,
        locations: &ShaderLocations,
        capacity: usize,
    ) -> Result<Self, BackendError> {
        profile_function!();
        let vertex_count = capacity * VERTICES_PER_QUAD;
        let index_format = capabilities.index_format();

        let mut buffer = Self {
            backend,
            capacity,
            positions: vec![[0.0; 3]; vertex_count],
            texcoords: vec![[0.0; 2]; vertex_count],
            colors: vec![[0; 4]; vertex_count],
            indices: QuadIndices::new(capacity, index_format),
            index_format,
            handles: GpuHandles::default(),
        };

        if capabilities.supports(BackendFeatures::VERTEX_ARRAY_OBJECT) {
            buffer.handles.vertex_array = buffer.backend.create_vertex_array()?;
        }
        buffer.handles.positions = buffer.backend.create_buffer(&BufferDesc::vertex(
            Some("quill_positions"),
            bytemuck::cast_slice(&buffer.positions),
        ))?;
        buffer.handles.texcoords = buffer.backend.create_buffer(&BufferDesc::vertex(
            Some("quill_texcoords"),
            bytemuck::cast_slice(&buffer.texcoords),
        ))?;
        buffer.handles.colors = buffer.backend.create_buffer(&BufferDesc::vertex(
            Some("quill_colors"),
            bytemuck::cast_slice(&buffer.colors),
        ))?;
        buffer.handles.indices = buffer.backend.create_buffer(&BufferDesc::index(
            Some("quill_indices"),
            buffer.indices.as_bytes(),
        ))?;

        if !buffer.handles.vertex_array.is_null() {
            let layout = buffer.layout(locations);
            buffer
                .backend
                .configure_vertex_array(buffer.handles.vertex_array, &layout);
        }

        tracing::trace!(
            "Created geometry buffer: {} quads, {:?} indices, vao={}",
            capacity,
            index_format,
            !buffer.handles.vertex_array.is_null()
        );
        Ok(buffer)
    }

    /// Capacity in quads.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn vertex_capacity(&self) -> usize {
        self.capacity * VERTICES_PER_QUAD
    }

    pub fn index_format(&self) -> wgpu::IndexFormat {
        self.index_format
    }

    pub fn uses_vertex_array(&self) -> bool {
        !self.handles.vertex_array.is_null()
    }

    pub fn position_buffer(&self) -> BufferHandle {
        self.handles.positions
    }

    pub fn color_buffer(&self) -> BufferHandle {
        self.handles.colors
    }

    /// Index `i` of the precomputed quad pattern.
    pub fn index(&self, i: usize) -> Option<u32> {
        self.indices.get(i)
    }

    pub fn vertex(&self, index: usize) -> Option<(Position, TexCoord, Color)> {
        Some((
            *self.positions.get(index)?,
            *self.texcoords.get(index)?,
            *self.colors.get(index)?,
        ))
    }

    /// Callers keep `index` below [`Self::vertex_capacity`].
    pub(crate) fn write_vertex(
        &mut self,
        index: usize,
        position: Position,
        texcoord: TexCoord,
        color: Color,
    ) {
        debug_assert!(index < self.vertex_capacity());
        self.positions[index] = position;
        self.texcoords[index] = texcoord;
        self.colors[index] = color;
    }

    /// Upload the first `vertex_count` vertices of every attribute stream.
    pub fn update(&self, vertex_count: usize) {
        profile_function!();
        let count = vertex_count.min(self.vertex_capacity());
        if count == 0 {
            return;
        }
        self.backend.write_buffer(
            self.handles.positions,
            0,
            bytemuck::cast_slice(&self.positions[..count]),
        );
        self.backend.write_buffer(
            self.handles.texcoords,
            0,
            bytemuck::cast_slice(&self.texcoords[..count]),
        );
        self.backend.write_buffer(
            self.handles.colors,
            0,
            bytemuck::cast_slice(&self.colors[..count]),
        );
    }

    /// Make this buffer the vertex source for subsequent draws.
    ///
    /// Without vertex arrays the attribute streams are rebound against
    /// `locations`, so a shader switch takes effect on the next bind.
    pub fn bind(&self, locations: &ShaderLocations) {
        if self.uses_vertex_array() {
            self.backend.bind_vertex_array(self.handles.vertex_array);
        } else {
            self.backend.bind_vertex_layout(&self.layout(locations));
        }
    }

    pub fn unbind(&self) {
        self.backend.unbind_vertex_layout();
    }

    fn layout(&self, locations: &ShaderLocations) -> VertexLayout {
        let attribute = |semantic, buffer| VertexAttribute {
            semantic,
            location: locations.attribute(semantic),
            buffer,
        };
        VertexLayout {
            attributes: [
                attribute(VertexSemantic::Position, self.handles.positions),
                attribute(VertexSemantic::TexCoord, self.handles.texcoords),
                attribute(VertexSemantic::Color, self.handles.colors),
            ],
            index_buffer: self.handles.indices,
            index_format: self.index_format,
        }
    }
}

impl Drop for GeometryBuffer {
    fn drop(&mut self) {
        let handles = std::mem::take(&mut self.handles);
        if !handles.vertex_array.is_null() {
            self.backend.destroy_vertex_array(handles.vertex_array);
        }
        for buffer in [
            handles.positions,
            handles.texcoords,
            handles.colors,
            handles.indices,
        ] {
            if !buffer.is_null() {
                self.backend.destroy_buffer(buffer);
            }
        }
    }
}

impl std::fmt::Debug for GeometryBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeometryBuffer")
            .field("capacity", &self.capacity)
            .field("index_format", &self.index_format)
            .field("handles", &self.handles)
            .finish()
    }
}
