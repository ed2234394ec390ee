use quill_test_utils::{ShaderHandle, ShaderLocation, VertexSemantic};

/// Attribute and uniform locations the batch binds when drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderLocations {
    pub vertex_position: ShaderLocation,
    pub vertex_texcoord: ShaderLocation,
    pub vertex_color: ShaderLocation,
    pub matrix_mvp: ShaderLocation,
    pub color_diffuse: ShaderLocation,
    pub map_diffuse: ShaderLocation,
}

impl ShaderLocations {
    /// Attributes at 0, 1, 2 and uniforms at 0, 1, 2, in declaration order.
    pub const fn sequential() -> Self {
        Self {
            vertex_position: ShaderLocation(0),
            vertex_texcoord: ShaderLocation(1),
            vertex_color: ShaderLocation(2),
            matrix_mvp: ShaderLocation(0),
            color_diffuse: ShaderLocation(1),
            map_diffuse: ShaderLocation(2),
        }
    }

    pub fn attribute(&self, semantic: VertexSemantic) -> ShaderLocation {
        match semantic {
            VertexSemantic::Position => self.vertex_position,
            VertexSemantic::TexCoord => self.vertex_texcoord,
            VertexSemantic::Color => self.vertex_color,
        }
    }
}

impl Default for ShaderLocations {
    fn default() -> Self {
        Self::sequential()
    }
}

/// A linked program and where its inputs live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderProgram {
    pub id: ShaderHandle,
    pub locations: ShaderLocations,
}

impl ShaderProgram {
    pub fn new(id: ShaderHandle, locations: ShaderLocations) -> Self {
        Self { id, locations }
    }
}
