//! The immediate-mode front end.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use quill_core::math::Mat4;
use quill_test_utils::{
    BackendCapabilities, RenderBackend, ShaderLocation, TextureHandle, Viewport,
};
use wgpu::BlendComponent;

use crate::{
    batch::BatchEngine,
    blend::BlendMode,
    config::BatchConfig,
    draw_call::PrimitiveMode,
    error::BatchError,
    shader::ShaderProgram,
    state::{DEFAULT_MATRIX_STACK_SIZE, MatrixMode, RenderState},
};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies the context a batch was created by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Descriptor for creating a [`Context`].
#[derive(Debug, Clone)]
pub struct ContextDescriptor {
    /// Configuration of the built-in default batch.
    pub batch: BatchConfig,
    pub default_shader: ShaderProgram,
    /// Texture for untextured geometry; usually 1x1 white. Must not be null.
    pub default_texture: TextureHandle,
    pub framebuffer_size: (u32, u32),
    pub matrix_stack_size: usize,
}

impl ContextDescriptor {
    pub fn new(default_shader: ShaderProgram, default_texture: TextureHandle) -> Self {
        Self {
            batch: BatchConfig::default(),
            default_shader,
            default_texture,
            framebuffer_size: (0, 0),
            matrix_stack_size: DEFAULT_MATRIX_STACK_SIZE,
        }
    }

    pub fn with_batch_config(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    pub fn with_framebuffer_size(mut self, width: u32, height: u32) -> Self {
        self.framebuffer_size = (width, height);
        self
    }

    pub fn with_matrix_stack_size(mut self, size: usize) -> Self {
        self.matrix_stack_size = size;
        self
    }
}

/// Immediate-mode drawing on top of a [`RenderBackend`].
///
/// Geometry accumulates in the active batch and reaches the backend when a
/// limit or state change forces a flush, or when [`Context::flush`] is called.
/// Call `flush` at the end of every frame; anything still queued when the
/// context is dropped is lost.
///
/// # Example
///
/// ```rust
/// # #[cfg(feature = "mock")]
/// # {
/// use std::sync::Arc;
/// use quill_render::{Context, ContextDescriptor, PrimitiveMode, ShaderLocations, ShaderProgram};
/// use quill_test_utils::{MockBackend, ShaderHandle, TextureHandle};
///
/// let backend = Arc::new(MockBackend::new());
/// let desc = ContextDescriptor::new(
///     ShaderProgram::new(ShaderHandle(1), ShaderLocations::sequential()),
///     TextureHandle(1),
/// );
/// let mut ctx = Context::new(backend.clone(), desc).unwrap();
///
/// ctx.begin(PrimitiveMode::Lines);
/// ctx.color4ub(255, 0, 0, 255);
/// ctx.vertex2f(0.0, 0.0);
/// ctx.vertex2f(10.0, 10.0);
/// ctx.end();
/// ctx.flush();
///
/// assert_eq!(backend.count_draws(), 1);
/// # }
/// ```
pub struct Context {
    id: ContextId,
    backend: Arc<dyn RenderBackend>,
    capabilities: BackendCapabilities,
    state: RenderState,
    default_batch: BatchEngine,
    custom_batch: Option<BatchEngine>,
}

impl Context {
    /// Query the backend's capabilities once and build the default batch.
    pub fn new(
        backend: Arc<dyn RenderBackend>,
        descriptor: ContextDescriptor,
    ) -> Result<Self, BatchError> {
        if descriptor.default_texture.is_null() {
            return Err(BatchError::InvalidConfig("default texture must not be null").logged());
        }

        let capabilities = backend.capabilities();
        tracing::info!(
            "Creating render context: features {:?}, {} texture units",
            capabilities.features,
            capabilities.max_texture_units
        );

        let id = ContextId::next();
        let state = RenderState::new(
            descriptor.default_shader,
            descriptor.default_texture,
            descriptor.batch.max_texture_units,
            descriptor.matrix_stack_size,
            descriptor.framebuffer_size,
        );
        let default_batch = BatchEngine::new(
            backend.clone(),
            capabilities,
            id,
            &descriptor.batch,
            &state,
        )?;

        let blend = state.blend().resolve(&capabilities);
        backend.set_blend_state(&blend);

        Ok(Self {
            id,
            backend,
            capabilities,
            state,
            default_batch,
            custom_batch: None,
        })
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn capabilities(&self) -> &BackendCapabilities {
        &self.capabilities
    }

    pub fn backend(&self) -> &Arc<dyn RenderBackend> {
        &self.backend
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    fn active(&mut self) -> (&mut BatchEngine, &mut RenderState) {
        let batch = self
            .custom_batch
            .as_mut()
            .unwrap_or(&mut self.default_batch);
        (batch, &mut self.state)
    }

    /// The batch currently receiving geometry.
    pub fn active_batch(&self) -> &BatchEngine {
        self.custom_batch.as_ref().unwrap_or(&self.default_batch)
    }

    // Batches

    /// Create an additional batch sharing this context's backend and state.
    pub fn create_batch(&self, config: &BatchConfig) -> Result<BatchEngine, BatchError> {
        BatchEngine::new(
            self.backend.clone(),
            self.capabilities,
            self.id,
            config,
            &self.state,
        )
    }

    /// Flush the active batch, then route geometry to `batch`, or to the
    /// default batch for `None`.
    ///
    /// Returns the previously installed custom batch. A batch created by
    /// another context is rejected and nothing changes.
    pub fn set_active_batch(
        &mut self,
        batch: Option<BatchEngine>,
    ) -> Result<Option<BatchEngine>, BatchError> {
        if let Some(batch) = &batch
            && batch.owner() != self.id
        {
            return Err(BatchError::ForeignBatch.logged());
        }
        self.flush();
        Ok(std::mem::replace(&mut self.custom_batch, batch))
    }

    /// Draw everything queued in the active batch.
    pub fn flush(&mut self) {
        let (batch, state) = self.active();
        batch.flush(state);
    }

    /// Flush when `vertices` more would not fit. Returns whether it flushed.
    pub fn check_render_batch_limit(&mut self, vertices: usize) -> bool {
        let (batch, state) = self.active();
        batch.check_limit(state, vertices)
    }

    pub fn vertex_counter(&self) -> usize {
        self.state.vertex_counter()
    }

    pub fn current_depth(&self) -> f32 {
        self.active_batch().current_depth()
    }

    // Primitives

    pub fn begin(&mut self, mode: PrimitiveMode) {
        let (batch, state) = self.active();
        batch.begin(state, mode);
    }

    pub fn end(&mut self) {
        let (batch, _) = self.active();
        batch.end();
    }

    pub fn vertex3f(&mut self, x: f32, y: f32, z: f32) {
        let (batch, state) = self.active();
        batch.vertex(state, x, y, z);
    }

    /// Vertex at the batch's current depth.
    pub fn vertex2f(&mut self, x: f32, y: f32) {
        let (batch, state) = self.active();
        let z = batch.current_depth();
        batch.vertex(state, x, y, z);
    }

    pub fn vertex2i(&mut self, x: i32, y: i32) {
        self.vertex2f(x as f32, y as f32);
    }

    pub fn tex_coord2f(&mut self, u: f32, v: f32) {
        self.state.set_texcoord(u, v);
    }

    pub fn normal3f(&mut self, x: f32, y: f32, z: f32) {
        self.state.set_normal(x, y, z);
    }

    pub fn color4ub(&mut self, r: u8, g: u8, b: u8, a: u8) {
        self.state.set_color(r, g, b, a);
    }

    pub fn color4f(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.state.set_color_f32(r, g, b, a);
    }

    pub fn color3f(&mut self, r: f32, g: f32, b: f32) {
        self.state.set_color_f32(r, g, b, 1.0);
    }

    // Pipeline state

    /// Texture for following geometry. `TextureHandle::NULL` selects the default.
    ///
    /// `NULL` does not close the open call: geometry of the same mode keeps
    /// drawing with the texture set before it. The default applies to the
    /// next call opened by a mode change or a flush.
    pub fn set_texture(&mut self, texture: TextureHandle) {
        let (batch, state) = self.active();
        batch.switch_texture(state, texture);
    }

    pub fn set_shader(&mut self, program: ShaderProgram) {
        let (batch, state) = self.active();
        batch.switch_shader(state, program);
    }

    /// Return to the program given at creation.
    pub fn reset_shader(&mut self) {
        let program = self.state.default_shader();
        self.set_shader(program);
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        let (batch, state) = self.active();
        batch.switch_blend_mode(state, mode);
    }

    /// Factors for [`BlendMode::Custom`]. Applied by the next `set_blend_mode(Custom)`.
    pub fn set_blend_factors(&mut self, factors: BlendComponent) {
        self.state.blend_mut().set_factors(factors);
    }

    /// Factors for [`BlendMode::CustomSeparate`].
    pub fn set_blend_factors_separate(&mut self, color: BlendComponent, alpha: BlendComponent) {
        self.state.blend_mut().set_factors_separate(color, alpha);
    }

    /// Bind `texture` to a free auxiliary unit for the next flush and point
    /// the sampler uniform at it. Already-active textures are left alone.
    pub fn set_uniform_sampler(&mut self, location: ShaderLocation, texture: TextureHandle) {
        match self.state.activate_texture(texture) {
            Some((slot, true)) => self.backend.set_uniform_sampler(location, slot as u32 + 1),
            Some((_, false)) => {}
            None => tracing::warn!(
                "No free auxiliary texture unit for {:?}; sampler left unchanged",
                texture
            ),
        }
    }

    pub fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.backend.set_viewport(Viewport::new(x, y, width, height));
    }

    pub fn set_framebuffer_size(&mut self, width: u32, height: u32) {
        self.state.set_framebuffer_size(width, height);
    }

    // Matrices

    pub fn matrix_mode(&mut self, mode: MatrixMode) {
        self.state.set_matrix_mode(mode);
    }

    pub fn push_matrix(&mut self) -> Result<(), BatchError> {
        self.state.push_matrix()
    }

    pub fn pop_matrix(&mut self) {
        self.state.pop_matrix();
    }

    pub fn load_identity(&mut self) {
        self.state.load_identity();
    }

    pub fn translatef(&mut self, x: f32, y: f32, z: f32) {
        self.state.translate(x, y, z);
    }

    pub fn rotatef(&mut self, angle_degrees: f32, x: f32, y: f32, z: f32) {
        self.state.rotate(angle_degrees, x, y, z);
    }

    pub fn scalef(&mut self, x: f32, y: f32, z: f32) {
        self.state.scale(x, y, z);
    }

    pub fn mult_matrix(&mut self, m: Mat4) {
        self.state.mult_matrix(m);
    }

    pub fn ortho(&mut self, left: f64, right: f64, bottom: f64, top: f64, near: f64, far: f64) {
        self.state.ortho(left, right, bottom, top, near, far);
    }

    pub fn frustum(&mut self, left: f64, right: f64, bottom: f64, top: f64, near: f64, far: f64) {
        self.state.frustum(left, right, bottom, top, near, far);
    }

    pub fn matrix_modelview(&self) -> Mat4 {
        self.state.modelview()
    }

    pub fn matrix_projection(&self) -> Mat4 {
        self.state.projection()
    }

    pub fn matrix_transform(&self) -> Mat4 {
        self.state.transform()
    }

    pub fn set_matrix_modelview(&mut self, m: Mat4) {
        self.state.set_modelview(m);
    }

    pub fn set_matrix_projection(&mut self, m: Mat4) {
        self.state.set_projection(m);
    }

    // Stereo

    /// Draw every flush twice, once per half of the framebuffer.
    pub fn enable_stereo_render(&mut self) {
        let (width, height) = self.state.framebuffer_size();
        if width < 2 || height == 0 {
            tracing::warn!(
                "Stereo enabled with a {}x{} framebuffer; eye viewports will be empty until set_framebuffer_size",
                width,
                height
            );
        }
        self.state.set_stereo_enabled(true);
    }

    pub fn disable_stereo_render(&mut self) {
        self.state.set_stereo_enabled(false);
    }

    pub fn is_stereo_render_enabled(&self) -> bool {
        self.state.stereo().enabled
    }

    pub fn set_matrix_projection_stereo(&mut self, left: Mat4, right: Mat4) {
        self.state.set_projection_stereo(left, right);
    }

    pub fn set_matrix_view_offset_stereo(&mut self, left: Mat4, right: Mat4) {
        self.state.set_view_offset_stereo(left, right);
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if self.state.vertex_counter() > 0 {
            tracing::warn!(
                "Render context dropped with {} unflushed vertices",
                self.state.vertex_counter()
            );
        }
    }
}
