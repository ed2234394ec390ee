//! Render state shared between the front end and the active batch.
//!
//! The batch reads the current shader, textures and matrices while flushing,
//! and owns the vertex cursor. Everything else is driven by the front end.

use quill_core::math::{self, Mat4, Vec2, Vec3};
use quill_test_utils::TextureHandle;

use crate::{blend::BlendSettings, error::BatchError, shader::ShaderProgram};

pub const DEFAULT_MATRIX_STACK_SIZE: usize = 32;

/// Which matrix the matrix operations target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatrixMode {
    #[default]
    ModelView,
    Projection,
}

/// Named matrix storage.
///
/// In model-view mode with a pushed matrix, operations go to the primitive
/// transform rather than the scene modelview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixSlot {
    ModelView,
    Projection,
    Transform,
}

/// Split-screen rendering matrices. Index 0 is the left eye.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoState {
    pub enabled: bool,
    pub projection: [Mat4; 2],
    pub view_offset: [Mat4; 2],
}

impl Default for StereoState {
    fn default() -> Self {
        Self {
            enabled: false,
            projection: [Mat4::IDENTITY; 2],
            view_offset: [Mat4::IDENTITY; 2],
        }
    }
}

#[derive(Debug)]
pub struct RenderState {
    /// Next free vertex in the active generation.
    pub(crate) vertex_counter: usize,

    texcoord: Vec2,
    normal: Vec3,
    color: [u8; 4],

    matrix_mode: MatrixMode,
    modelview: Mat4,
    projection: Mat4,
    transform: Mat4,
    transform_required: bool,
    stack: Vec<Mat4>,
    stack_capacity: usize,

    default_texture: TextureHandle,
    current_texture: TextureHandle,
    active_textures: Vec<TextureHandle>,

    default_shader: ShaderProgram,
    current_shader: ShaderProgram,

    blend: BlendSettings,
    stereo: StereoState,
    framebuffer_size: (u32, u32),
}

impl RenderState {
    pub fn new(
        default_shader: ShaderProgram,
        default_texture: TextureHandle,
        auxiliary_texture_units: usize,
        matrix_stack_size: usize,
        framebuffer_size: (u32, u32),
    ) -> Self {
        Self {
            vertex_counter: 0,
            texcoord: Vec2::ZERO,
            normal: Vec3::Z,
            color: [255; 4],
            matrix_mode: MatrixMode::ModelView,
            modelview: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            transform: Mat4::IDENTITY,
            transform_required: false,
            stack: Vec::with_capacity(matrix_stack_size),
            stack_capacity: matrix_stack_size,
            default_texture,
            current_texture: default_texture,
            active_textures: vec![TextureHandle::NULL; auxiliary_texture_units],
            default_shader,
            current_shader: default_shader,
            blend: BlendSettings::default(),
            stereo: StereoState::default(),
            framebuffer_size,
        }
    }

    pub fn vertex_counter(&self) -> usize {
        self.vertex_counter
    }

    // Vertex attributes

    pub fn texcoord(&self) -> Vec2 {
        self.texcoord
    }

    pub fn set_texcoord(&mut self, u: f32, v: f32) {
        self.texcoord = Vec2::new(u, v);
    }

    /// Stored for front ends that query it; not part of the batched vertex.
    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    pub fn set_normal(&mut self, x: f32, y: f32, z: f32) {
        self.normal = Vec3::new(x, y, z);
    }

    pub fn color(&self) -> [u8; 4] {
        self.color
    }

    pub fn set_color(&mut self, r: u8, g: u8, b: u8, a: u8) {
        self.color = [r, g, b, a];
    }

    /// Normalized color, clamped to `[0, 1]`.
    pub fn set_color_f32(&mut self, r: f32, g: f32, b: f32, a: f32) {
        let to_u8 = |c: f32| (c.clamp(0.0, 1.0) * 255.0) as u8;
        self.color = [to_u8(r), to_u8(g), to_u8(b), to_u8(a)];
    }

    // Matrices

    pub fn matrix_mode(&self) -> MatrixMode {
        self.matrix_mode
    }

    pub fn set_matrix_mode(&mut self, mode: MatrixMode) {
        self.matrix_mode = mode;
    }

    /// The slot matrix operations currently target.
    pub fn active_slot(&self) -> MatrixSlot {
        match self.matrix_mode {
            MatrixMode::Projection => MatrixSlot::Projection,
            MatrixMode::ModelView if self.transform_required => MatrixSlot::Transform,
            MatrixMode::ModelView => MatrixSlot::ModelView,
        }
    }

    pub fn matrix(&self, slot: MatrixSlot) -> Mat4 {
        match slot {
            MatrixSlot::ModelView => self.modelview,
            MatrixSlot::Projection => self.projection,
            MatrixSlot::Transform => self.transform,
        }
    }

    fn matrix_mut(&mut self, slot: MatrixSlot) -> &mut Mat4 {
        match slot {
            MatrixSlot::ModelView => &mut self.modelview,
            MatrixSlot::Projection => &mut self.projection,
            MatrixSlot::Transform => &mut self.transform,
        }
    }

    pub fn modelview(&self) -> Mat4 {
        self.modelview
    }

    pub fn set_modelview(&mut self, m: Mat4) {
        self.modelview = m;
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn set_projection(&mut self, m: Mat4) {
        self.projection = m;
    }

    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    /// Whether emitted vertices go through the primitive transform.
    pub fn transform_required(&self) -> bool {
        self.transform_required
    }

    pub fn matrix_stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Save the active matrix. In model-view mode this also starts routing
    /// matrix operations to the primitive transform.
    pub fn push_matrix(&mut self) -> Result<(), BatchError> {
        if self.stack.len() >= self.stack_capacity {
            return Err(BatchError::MatrixStackOverflow {
                capacity: self.stack_capacity,
            }
            .logged());
        }
        if self.matrix_mode == MatrixMode::ModelView {
            self.transform_required = true;
        }
        let current = self.matrix(self.active_slot());
        self.stack.push(current);
        Ok(())
    }

    /// Restore the last pushed matrix. No-op on an empty stack.
    pub fn pop_matrix(&mut self) {
        let slot = self.active_slot();
        if let Some(m) = self.stack.pop() {
            *self.matrix_mut(slot) = m;
        }
        if self.stack.is_empty() && self.matrix_mode == MatrixMode::ModelView {
            self.transform_required = false;
        }
    }

    pub fn load_identity(&mut self) {
        let slot = self.active_slot();
        *self.matrix_mut(slot) = Mat4::IDENTITY;
    }

    /// Right-multiply the active matrix, so `m` applies before what is already there.
    fn apply_local(&mut self, m: Mat4) {
        let slot = self.active_slot();
        let current = self.matrix_mut(slot);
        *current = *current * m;
    }

    /// Left-multiply the active matrix.
    fn apply_global(&mut self, m: Mat4) {
        let slot = self.active_slot();
        let current = self.matrix_mut(slot);
        *current = m * *current;
    }

    pub fn translate(&mut self, x: f32, y: f32, z: f32) {
        self.apply_local(Mat4::from_translation(Vec3::new(x, y, z)));
    }

    pub fn rotate(&mut self, angle_degrees: f32, x: f32, y: f32, z: f32) {
        self.apply_local(math::rotation(angle_degrees, Vec3::new(x, y, z)));
    }

    pub fn scale(&mut self, x: f32, y: f32, z: f32) {
        self.apply_local(Mat4::from_scale(Vec3::new(x, y, z)));
    }

    pub fn mult_matrix(&mut self, m: Mat4) {
        self.apply_global(m);
    }

    pub fn ortho(&mut self, left: f64, right: f64, bottom: f64, top: f64, near: f64, far: f64) {
        self.apply_global(math::ortho(left, right, bottom, top, near, far));
    }

    pub fn frustum(&mut self, left: f64, right: f64, bottom: f64, top: f64, near: f64, far: f64) {
        self.apply_global(math::frustum(left, right, bottom, top, near, far));
    }

    // Textures

    pub fn default_texture(&self) -> TextureHandle {
        self.default_texture
    }

    /// Texture new draw calls are opened with.
    pub fn current_texture(&self) -> TextureHandle {
        self.current_texture
    }

    pub(crate) fn set_current_texture(&mut self, texture: TextureHandle) {
        self.current_texture = if texture.is_null() {
            self.default_texture
        } else {
            texture
        };
    }

    /// Auxiliary textures bound to units `1..` during the next flush.
    pub fn active_textures(&self) -> &[TextureHandle] {
        &self.active_textures
    }

    /// Register `texture` in the first free auxiliary slot.
    ///
    /// Returns the slot index, whether newly assigned or already holding
    /// `texture`, and `None` when every slot is taken.
    pub(crate) fn activate_texture(&mut self, texture: TextureHandle) -> Option<(usize, bool)> {
        if let Some(slot) = self.active_textures.iter().position(|&t| t == texture) {
            return Some((slot, false));
        }
        let slot = self.active_textures.iter().position(|t| t.is_null())?;
        self.active_textures[slot] = texture;
        Some((slot, true))
    }

    pub(crate) fn reset_active_textures(&mut self) {
        self.active_textures.fill(TextureHandle::NULL);
    }

    // Shaders

    pub fn default_shader(&self) -> ShaderProgram {
        self.default_shader
    }

    pub fn current_shader(&self) -> ShaderProgram {
        self.current_shader
    }

    pub(crate) fn set_current_shader(&mut self, program: ShaderProgram) {
        self.current_shader = program;
    }

    // Blending

    pub fn blend(&self) -> &BlendSettings {
        &self.blend
    }

    pub(crate) fn blend_mut(&mut self) -> &mut BlendSettings {
        &mut self.blend
    }

    // Stereo and framebuffer

    pub fn stereo(&self) -> &StereoState {
        &self.stereo
    }

    pub fn set_stereo_enabled(&mut self, enabled: bool) {
        self.stereo.enabled = enabled;
    }

    pub fn set_projection_stereo(&mut self, left: Mat4, right: Mat4) {
        self.stereo.projection = [left, right];
    }

    pub fn set_view_offset_stereo(&mut self, left: Mat4, right: Mat4) {
        self.stereo.view_offset = [left, right];
    }

    pub fn framebuffer_size(&self) -> (u32, u32) {
        self.framebuffer_size
    }

    pub fn set_framebuffer_size(&mut self, width: u32, height: u32) {
        self.framebuffer_size = (width, height);
    }
}
