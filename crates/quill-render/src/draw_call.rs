//! One contiguous span of batched vertices.

use std::collections::VecDeque;

use quill_test_utils::{RenderBackend, TextureHandle};

use crate::geometry_buffer::{INDICES_PER_QUAD, VERTICES_PER_QUAD};

/// Primitive topology of a draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveMode {
    Lines,
    Triangles,
    #[default]
    Quads,
}

impl PrimitiveMode {
    /// Vertices that make up one primitive.
    pub fn vertices_per_primitive(self) -> usize {
        match self {
            PrimitiveMode::Lines => 2,
            PrimitiveMode::Triangles => 3,
            PrimitiveMode::Quads => 4,
        }
    }

    /// Topology the backend draws with. Quads go through the index buffer as triangles.
    pub fn topology(self) -> wgpu::PrimitiveTopology {
        match self {
            PrimitiveMode::Lines => wgpu::PrimitiveTopology::LineList,
            PrimitiveMode::Triangles | PrimitiveMode::Quads => {
                wgpu::PrimitiveTopology::TriangleList
            }
        }
    }
}

/// Vertices sharing one mode and one texture, drawn with a single backend draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    pub mode: PrimitiveMode,
    pub vertex_count: usize,
    /// Unrendered vertices after this call so the next one starts on a quad boundary.
    pub vertex_alignment: usize,
    pub texture: TextureHandle,
}

impl DrawCall {
    pub fn new(mode: PrimitiveMode, texture: TextureHandle) -> Self {
        Self {
            mode,
            vertex_count: 0,
            vertex_alignment: 0,
            texture,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertex_count == 0
    }

    /// No primitive is half-written.
    #[inline]
    pub fn at_primitive_boundary(&self) -> bool {
        self.vertex_count % self.mode.vertices_per_primitive() == 0
    }

    /// Padding that rounds `vertex_count` up to a multiple of four. Zero for
    /// well-formed quads.
    pub fn required_alignment(&self) -> usize {
        (VERTICES_PER_QUAD - self.vertex_count % VERTICES_PER_QUAD) % VERTICES_PER_QUAD
    }

    /// Issue this call's draw starting at `*vertex_offset`, then advance the
    /// offset past the call and its padding.
    ///
    /// Empty calls draw nothing but still advance the offset.
    pub fn render(&self, backend: &dyn RenderBackend, vertex_offset: &mut usize) {
        if !self.is_empty() {
            backend.bind_texture(0, self.texture);
            match self.mode {
                PrimitiveMode::Lines | PrimitiveMode::Triangles => backend.draw_arrays(
                    self.mode.topology(),
                    *vertex_offset as u32,
                    self.vertex_count as u32,
                ),
                PrimitiveMode::Quads => backend.draw_indexed(
                    (self.vertex_count / VERTICES_PER_QUAD * INDICES_PER_QUAD) as u32,
                    (*vertex_offset / VERTICES_PER_QUAD * INDICES_PER_QUAD) as u32,
                ),
            }
        }
        *vertex_offset += self.vertex_count + self.vertex_alignment;
    }
}

/// FIFO of draw calls. Always holds at least the open call at the back.
#[derive(Debug, Clone)]
pub struct DrawQueue {
    closed: VecDeque<DrawCall>,
    open: DrawCall,
}

impl DrawQueue {
    pub fn new(open: DrawCall, capacity: usize) -> Self {
        Self {
            closed: VecDeque::with_capacity(capacity.saturating_sub(1)),
            open,
        }
    }

    /// Queued calls including the open one.
    #[inline]
    pub fn call_count(&self) -> usize {
        self.closed.len() + 1
    }

    #[inline]
    pub fn back(&self) -> &DrawCall {
        &self.open
    }

    #[inline]
    pub fn back_mut(&mut self) -> &mut DrawCall {
        &mut self.open
    }

    /// Close the open call and make `call` the new open call.
    pub fn push_back(&mut self, call: DrawCall) {
        let closed = std::mem::replace(&mut self.open, call);
        self.closed.push_back(closed);
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &DrawCall> {
        self.closed.iter().chain(std::iter::once(&self.open))
    }

    /// Retire every call, leaving `open` as the only one.
    pub fn reset(&mut self, open: DrawCall) {
        self.closed.clear();
        self.open = open;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_test_utils::{BackendCall, MockBackend};

    fn call(mode: PrimitiveMode, vertex_count: usize) -> DrawCall {
        DrawCall {
            vertex_count,
            ..DrawCall::new(mode, TextureHandle(1))
        }
    }

    #[test]
    fn test_alignment() {
        assert_eq!(call(PrimitiveMode::Triangles, 3).required_alignment(), 1);
        assert_eq!(call(PrimitiveMode::Triangles, 6).required_alignment(), 2);
        assert_eq!(call(PrimitiveMode::Lines, 2).required_alignment(), 2);
        assert_eq!(call(PrimitiveMode::Lines, 4).required_alignment(), 0);
        assert_eq!(call(PrimitiveMode::Quads, 8).required_alignment(), 0);
    }

    #[test]
    fn test_primitive_boundary() {
        assert!(call(PrimitiveMode::Lines, 4).at_primitive_boundary());
        assert!(!call(PrimitiveMode::Triangles, 4).at_primitive_boundary());
        assert!(call(PrimitiveMode::Quads, 0).at_primitive_boundary());
    }

    #[test]
    fn test_render_threads_offset() {
        let backend = MockBackend::new();
        let mut triangles = call(PrimitiveMode::Triangles, 3);
        triangles.vertex_alignment = triangles.required_alignment();
        let quads = call(PrimitiveMode::Quads, 8);

        let mut offset = 0;
        triangles.render(&backend, &mut offset);
        assert_eq!(offset, 4);
        quads.render(&backend, &mut offset);
        assert_eq!(offset, 12);

        assert_eq!(
            backend.draws(),
            vec![
                BackendCall::DrawArrays {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    first_vertex: 0,
                    vertex_count: 3,
                },
                BackendCall::DrawIndexed {
                    index_count: 12,
                    first_index: 6,
                },
            ]
        );
    }

    #[test]
    fn test_empty_call_draws_nothing() {
        let backend = MockBackend::new();
        let mut offset = 8;
        call(PrimitiveMode::Lines, 0).render(&backend, &mut offset);
        assert_eq!(offset, 8);
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn test_queue_fifo() {
        let mut queue = DrawQueue::new(DrawCall::new(PrimitiveMode::Quads, TextureHandle(1)), 4);
        queue.back_mut().vertex_count = 4;
        queue.push_back(DrawCall::new(PrimitiveMode::Lines, TextureHandle(2)));
        queue.push_back(DrawCall::new(PrimitiveMode::Lines, TextureHandle(3)));

        let textures: Vec<u32> = queue.iter().map(|c| c.texture.raw()).collect();
        assert_eq!(textures, vec![1, 2, 3]);
        assert_eq!(queue.call_count(), 3);
        assert_eq!(queue.back().texture, TextureHandle(3));

        queue.reset(DrawCall::new(PrimitiveMode::Quads, TextureHandle(1)));
        assert_eq!(queue.call_count(), 1);
        assert!(queue.back().is_empty());
    }
}
