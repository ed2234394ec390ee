//! Handle types, vertex layout descriptions and the capability object.

use bitflags::bitflags;

macro_rules! backend_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            /// The "no object" handle. Releasing it is a no-op.
            pub const NULL: Self = Self(0);

            #[inline]
            pub fn is_null(self) -> bool {
                self.0 == 0
            }

            #[inline]
            pub fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

backend_handle!(
    /// A GPU buffer owned by a backend.
    BufferHandle
);
backend_handle!(
    /// A vertex array object capturing attribute bindings.
    VertexArrayHandle
);
backend_handle!(
    /// A texture. `TextureHandle::NULL` means "default texture" at the front end.
    TextureHandle
);
backend_handle!(
    /// A linked shader program.
    ShaderHandle
);

/// An attribute or uniform location inside a shader program.
///
/// Negative values mean the program does not use the slot; backends ignore
/// writes to unused locations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderLocation(pub i32);

impl ShaderLocation {
    pub const UNUSED: Self = Self(-1);

    #[inline]
    pub fn is_used(self) -> bool {
        self.0 >= 0
    }

    #[inline]
    pub fn index(self) -> Option<u32> {
        u32::try_from(self.0).ok()
    }
}

impl Default for ShaderLocation {
    fn default() -> Self {
        Self::UNUSED
    }
}

bitflags! {
    /// Optional backend features.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct BackendFeatures: u32 {
        /// Attribute bindings can be captured once and rebound with one call.
        const VERTEX_ARRAY_OBJECT = 1 << 0;
        /// 32-bit index buffers.
        const INDEX_U32 = 1 << 1;
        /// Separate color and alpha blend equations.
        const SEPARATE_BLEND = 1 << 2;
    }
}

/// What a backend can do. Queried once when a context is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackendCapabilities {
    pub features: BackendFeatures,
    /// Texture units including unit 0.
    pub max_texture_units: u32,
    pub max_buffer_size: u64,
}

impl BackendCapabilities {
    /// A desktop-class programmable pipeline.
    pub fn modern() -> Self {
        Self {
            features: BackendFeatures::all(),
            max_texture_units: 16,
            max_buffer_size: 256 << 20,
        }
    }

    /// A GLES2-class backend: no VAOs, 16-bit indices.
    pub fn embedded() -> Self {
        Self {
            features: BackendFeatures::empty(),
            max_texture_units: 8,
            max_buffer_size: 64 << 20,
        }
    }

    #[inline]
    pub fn supports(&self, features: BackendFeatures) -> bool {
        self.features.contains(features)
    }

    pub fn index_format(&self) -> wgpu::IndexFormat {
        if self.supports(BackendFeatures::INDEX_U32) {
            wgpu::IndexFormat::Uint32
        } else {
            wgpu::IndexFormat::Uint16
        }
    }
}

/// The fixed vertex attribute slots of the batching engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexSemantic {
    Position,
    TexCoord,
    Color,
}

impl VertexSemantic {
    pub fn format(self) -> wgpu::VertexFormat {
        match self {
            VertexSemantic::Position => wgpu::VertexFormat::Float32x3,
            VertexSemantic::TexCoord => wgpu::VertexFormat::Float32x2,
            VertexSemantic::Color => wgpu::VertexFormat::Unorm8x4,
        }
    }
}

/// One attribute stream: a whole buffer of tightly packed values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexAttribute {
    pub semantic: VertexSemantic,
    pub location: ShaderLocation,
    pub buffer: BufferHandle,
}

/// Everything needed to bind one geometry buffer for drawing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexLayout {
    pub attributes: [VertexAttribute; 3],
    pub index_buffer: BufferHandle,
    pub index_format: wgpu::IndexFormat,
}

impl VertexLayout {
    pub fn attribute(&self, semantic: VertexSemantic) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|a| a.semantic == semantic)
    }
}

/// Buffer creation request. `contents` sets both size and initial data.
#[derive(Clone, Copy, Debug)]
pub struct BufferDesc<'a> {
    pub label: Option<&'a str>,
    pub usage: wgpu::BufferUsages,
    pub contents: &'a [u8],
}

impl<'a> BufferDesc<'a> {
    /// A vertex buffer rewritten every flush.
    pub fn vertex(label: Option<&'a str>, contents: &'a [u8]) -> Self {
        Self {
            label,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            contents,
        }
    }

    /// An index buffer written once.
    pub fn index(label: Option<&'a str>, contents: &'a [u8]) -> Self {
        Self {
            label,
            usage: wgpu::BufferUsages::INDEX,
            contents,
        }
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.contents.len() as u64
    }

    /// Dynamic buffers accept partial updates after creation.
    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.usage.contains(wgpu::BufferUsages::COPY_DST)
    }
}

/// Pixel rectangle of the render target, origin at the lower left.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}
