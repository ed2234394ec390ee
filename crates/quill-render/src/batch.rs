//! Vertex accumulation and flushing.
//!
//! A [`BatchEngine`] owns a ring of [`GeometryBuffer`] generations and a FIFO
//! of [`DrawCall`]s. The back of the queue is the open call that new vertices
//! extend. A flush uploads the hot generation, draws every queued call in
//! submission order and rotates to the next generation.

use std::sync::Arc;

use quill_core::{math::Vec3, profiling::profile_function};
use quill_test_utils::{
    BackendCapabilities, RenderBackend, ShaderHandle, TextureHandle, Viewport,
};

use crate::{
    blend::BlendMode,
    capability::BatchRequirements,
    config::BatchConfig,
    context::ContextId,
    draw_call::{DrawCall, DrawQueue, PrimitiveMode},
    error::BatchError,
    geometry_buffer::{GeometryBuffer, VERTICES_PER_QUAD},
    shader::ShaderProgram,
    state::RenderState,
};

/// Where the engine is in the begin/emit/flush cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    /// No primitive open.
    Idle,
    /// Between `begin` and `end`.
    Accumulating,
    /// Inside `flush`; back to the previous phase when it returns.
    Flushing,
}

/// Cumulative counters since the engine was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub flushes: u64,
    /// Backend draws issued (empty calls are not drawn).
    pub draw_calls: u64,
    pub vertices_uploaded: u64,
}

/// Accumulates immediate-mode geometry and turns it into batched draws.
///
/// Every method takes the [`RenderState`] it reads and advances; a
/// [`Context`](crate::Context) pairs one state with its active engine.
///
/// Vertices still queued when the engine is dropped are discarded. Flush
/// before shutting down.
pub struct BatchEngine {
    backend: Arc<dyn RenderBackend>,
    capabilities: BackendCapabilities,
    owner: ContextId,
    buffers: Vec<GeometryBuffer>,
    current_buffer: usize,
    vertex_capacity: usize,
    draws: DrawQueue,
    max_draw_calls: usize,
    depth: f32,
    initial_depth: f32,
    depth_increment: f32,
    phase: BatchPhase,
    stats: BatchStats,
}

impl BatchEngine {
    /// Validate `config`, check it against `capabilities` and allocate every
    /// generation. Any failure drops what was already allocated.
    pub(crate) fn new(
        backend: Arc<dyn RenderBackend>,
        capabilities: BackendCapabilities,
        owner: ContextId,
        config: &BatchConfig,
        state: &RenderState,
    ) -> Result<Self, BatchError> {
        profile_function!();
        config.validate().map_err(BatchError::logged)?;
        BatchRequirements::for_config(config).check(&capabilities)?;

        let locations = state.default_shader().locations;
        let buffers = (0..config.buffer_count)
            .map(|generation| {
                GeometryBuffer::new(
                    backend.clone(),
                    &capabilities,
                    &locations,
                    config.buffer_elements,
                )
                .map_err(|source| BatchError::BufferAllocation { generation, source }.logged())
            })
            .collect::<Result<Vec<_>, _>>()?;

        let draws = DrawQueue::new(
            DrawCall::new(PrimitiveMode::Quads, state.default_texture()),
            config.max_draw_calls,
        );

        tracing::debug!(
            "Created batch: {} generation(s) of {} quads, {} draw calls max",
            config.buffer_count,
            config.buffer_elements,
            config.max_draw_calls
        );

        Ok(Self {
            backend,
            capabilities,
            owner,
            buffers,
            current_buffer: 0,
            vertex_capacity: config.vertex_capacity(),
            draws,
            max_draw_calls: config.max_draw_calls,
            depth: config.initial_depth,
            initial_depth: config.initial_depth,
            depth_increment: config.depth_increment,
            phase: BatchPhase::Idle,
            stats: BatchStats::default(),
        })
    }

    pub fn owner(&self) -> ContextId {
        self.owner
    }

    pub fn phase(&self) -> BatchPhase {
        self.phase
    }

    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    /// Vertices one generation holds.
    pub fn vertex_capacity(&self) -> usize {
        self.vertex_capacity
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Index of the generation currently accumulating.
    pub fn current_generation(&self) -> usize {
        self.current_buffer
    }

    pub fn geometry(&self, generation: usize) -> Option<&GeometryBuffer> {
        self.buffers.get(generation)
    }

    /// Queued calls, oldest first.
    pub fn draw_calls(&self) -> impl Iterator<Item = &DrawCall> {
        self.draws.iter()
    }

    pub fn draw_call_count(&self) -> usize {
        self.draws.call_count()
    }

    /// The call new vertices extend.
    pub fn open_call(&self) -> &DrawCall {
        self.draws.back()
    }

    fn open_call_mut(&mut self) -> &mut DrawCall {
        self.draws.back_mut()
    }

    /// Depth the 2D vertex overloads use.
    pub fn current_depth(&self) -> f32 {
        self.depth
    }

    /// Start a primitive. Continues the open call when its mode matches.
    pub fn begin(&mut self, state: &mut RenderState, mode: PrimitiveMode) {
        if self.open_call().mode != mode {
            let texture = state.current_texture();
            self.open_new_call(state, mode, texture);
        }
        self.phase = BatchPhase::Accumulating;
    }

    pub fn end(&mut self) {
        self.depth += self.depth_increment;
        self.phase = BatchPhase::Idle;
    }

    /// Append one vertex using the current texcoord and color.
    ///
    /// A primitive never straddles generations: when the next whole primitive
    /// would not fit, the batch flushes before writing and the open call
    /// resumes in the fresh generation.
    pub fn vertex(&mut self, state: &mut RenderState, x: f32, y: f32, z: f32) {
        let mut position = Vec3::new(x, y, z);
        if state.transform_required() {
            position = state.transform().transform_point3(position);
        }

        let capacity = self.vertex_capacity();
        let open = *self.open_call();
        if open.at_primitive_boundary() {
            let unit = open.mode.vertices_per_primitive();
            if state.vertex_counter + unit > capacity {
                tracing::debug!(
                    "Generation {} full at {} vertices, flushing",
                    self.current_buffer,
                    state.vertex_counter
                );
                self.flush_preserving_open_call(state);
            }
        } else if state.vertex_counter >= capacity {
            tracing::warn!(
                "{:?} primitive overflowed generation {}; splitting it across a flush",
                open.mode,
                self.current_buffer
            );
            self.flush_preserving_open_call(state);
        }

        let index = state.vertex_counter;
        let texcoord = state.texcoord().to_array();
        let color = state.color();
        self.buffers[self.current_buffer].write_vertex(index, position.to_array(), texcoord, color);
        state.vertex_counter += 1;
        self.open_call_mut().vertex_count += 1;

        if state.vertex_counter == capacity && self.open_call().at_primitive_boundary() {
            tracing::debug!(
                "Generation {} filled exactly, flushing",
                self.current_buffer
            );
            self.flush_preserving_open_call(state);
        }
    }

    /// Select the texture for following primitives.
    ///
    /// `NULL` returns to the default texture for calls opened later and
    /// flushes early when fewer than one quad's worth of vertices is left; it
    /// never splits the open call.
    pub fn switch_texture(&mut self, state: &mut RenderState, texture: TextureHandle) {
        state.set_current_texture(texture);
        if texture.is_null() {
            if state.vertex_counter + VERTICES_PER_QUAD > self.vertex_capacity() {
                self.flush(state);
            }
            return;
        }
        if self.open_call().texture != texture {
            let mode = self.open_call().mode;
            self.open_new_call(state, mode, texture);
        }
    }

    /// Switch programs, flushing first when it changes.
    pub fn switch_shader(&mut self, state: &mut RenderState, program: ShaderProgram) {
        if state.current_shader().id != program.id {
            self.flush(state);
            state.set_current_shader(program);
        }
    }

    /// Switch blend modes, flushing first when the effective state changes.
    pub fn switch_blend_mode(&mut self, state: &mut RenderState, mode: BlendMode) {
        if !state.blend().needs_switch(mode) {
            return;
        }
        self.flush(state);
        let blend_state = state.blend_mut().apply(mode, &self.capabilities);
        self.backend.set_blend_state(&blend_state);
    }

    /// Flush if `vertices` more would not fit the current generation.
    ///
    /// The open call keeps its mode and texture. Returns whether a flush happened.
    pub fn check_limit(&mut self, state: &mut RenderState, vertices: usize) -> bool {
        if state.vertex_counter + vertices > self.vertex_capacity() {
            self.flush_preserving_open_call(state);
            true
        } else {
            false
        }
    }

    /// Close the open call and start one with `mode` and `texture`.
    ///
    /// A non-empty open call is padded to a quad boundary first. An empty
    /// one is reused in place.
    fn open_new_call(&mut self, state: &mut RenderState, mode: PrimitiveMode, texture: TextureHandle) {
        if !self.open_call().is_empty() {
            let open = self.open_call_mut();
            open.vertex_alignment = open.required_alignment();
            let alignment = open.vertex_alignment;

            // One more vertex than the padding must fit, or there is nothing
            // left to batch in this generation.
            if !self.check_limit(state, alignment + 1) {
                state.vertex_counter += alignment;
                if self.draws.call_count() >= self.max_draw_calls {
                    tracing::debug!(
                        "Draw call queue reached {} calls, flushing",
                        self.max_draw_calls
                    );
                    self.flush(state);
                } else {
                    self.draws.push_back(DrawCall::new(mode, texture));
                    return;
                }
            }
        }

        let open = self.open_call_mut();
        *open = DrawCall::new(mode, texture);
    }

    fn flush_preserving_open_call(&mut self, state: &mut RenderState) {
        let open = *self.open_call();
        self.flush(state);
        let fresh = self.open_call_mut();
        fresh.mode = open.mode;
        fresh.texture = open.texture;
    }

    /// Upload the hot generation, draw every queued call in order, restore
    /// state and rotate to the next generation.
    ///
    /// In stereo mode every call is drawn once per eye and retired after the
    /// second eye.
    pub fn flush(&mut self, state: &mut RenderState) {
        profile_function!();
        let resume = match self.phase {
            BatchPhase::Flushing => BatchPhase::Idle,
            phase => phase,
        };
        self.phase = BatchPhase::Flushing;

        let generation = self.current_buffer;
        let vertex_count = state.vertex_counter;
        let buffer = &self.buffers[generation];
        let backend = self.backend.as_ref();

        if vertex_count > 0 {
            buffer.update(vertex_count);
        }

        let projection = state.projection();
        let modelview = state.modelview();
        let stereo = *state.stereo();
        let (width, height) = state.framebuffer_size();
        let eyes = if stereo.enabled { 2 } else { 1 };
        let program = state.current_shader();
        let mut issued = 0u64;

        for eye in 0..eyes {
            if stereo.enabled {
                let eye_width = width / 2;
                backend.set_viewport(Viewport::new(
                    (eye_width * eye as u32) as i32,
                    0,
                    eye_width,
                    height,
                ));
                state.set_modelview(stereo.view_offset[eye] * modelview);
                state.set_projection(stereo.projection[eye]);
            }

            if vertex_count > 0 {
                let locations = &program.locations;
                backend.use_shader(program.id);
                let mvp = state.projection() * state.modelview();
                backend.set_uniform_mat4(locations.matrix_mvp, mvp.to_cols_array());

                buffer.bind(locations);
                backend.set_uniform_vec4(locations.color_diffuse, [1.0; 4]);
                backend.set_uniform_sampler(locations.map_diffuse, 0);

                for (slot, &texture) in state.active_textures().iter().enumerate() {
                    if !texture.is_null() {
                        backend.bind_texture(slot as u32 + 1, texture);
                    }
                }

                let mut offset = 0;
                for call in self.draws.iter() {
                    call.render(backend, &mut offset);
                    if !call.is_empty() {
                        issued += 1;
                    }
                }

                buffer.unbind();
                for (slot, &texture) in state.active_textures().iter().enumerate() {
                    if !texture.is_null() {
                        backend.bind_texture(slot as u32 + 1, TextureHandle::NULL);
                    }
                }
                backend.bind_texture(0, TextureHandle::NULL);
                backend.use_shader(ShaderHandle::NULL);
            }
        }

        if stereo.enabled {
            backend.set_viewport(Viewport::new(0, 0, width, height));
        }

        state.set_projection(projection);
        state.set_modelview(modelview);

        self.draws
            .reset(DrawCall::new(PrimitiveMode::Quads, state.default_texture()));
        self.depth = self.initial_depth;

        state.vertex_counter = 0;
        state.reset_active_textures();

        self.current_buffer = (self.current_buffer + 1) % self.buffers.len();

        self.stats.flushes += 1;
        self.stats.draw_calls += issued;
        self.stats.vertices_uploaded += vertex_count as u64;
        tracing::trace!(
            "Flushed generation {}: {} vertices, {} draw(s), {} eye(s)",
            generation,
            vertex_count,
            issued,
            eyes
        );

        self.phase = resume;
    }
}

impl Drop for BatchEngine {
    fn drop(&mut self) {
        if self.draws.iter().any(|call| !call.is_empty()) {
            tracing::warn!("Dropping batch with unflushed vertices; they will not be drawn");
        }
    }
}

impl std::fmt::Debug for BatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchEngine")
            .field("owner", &self.owner)
            .field("buffers", &self.buffers.len())
            .field("current_buffer", &self.current_buffer)
            .field("draws", &self.draws)
            .field("phase", &self.phase)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::ShaderLocations;
    use quill_test_utils::{BackendCall, MockBackend};

    const DEFAULT_TEXTURE: TextureHandle = TextureHandle(1);

    fn setup(config: BatchConfig) -> (Arc<MockBackend>, BatchEngine, RenderState) {
        let backend = Arc::new(MockBackend::new());
        let state = RenderState::new(
            ShaderProgram::new(ShaderHandle(1), ShaderLocations::sequential()),
            DEFAULT_TEXTURE,
            config.max_texture_units,
            32,
            (800, 600),
        );
        let engine = BatchEngine::new(
            backend.clone(),
            backend.capabilities(),
            ContextId::next(),
            &config,
            &state,
        )
        .unwrap();
        (backend, engine, state)
    }

    fn emit(engine: &mut BatchEngine, state: &mut RenderState, n: usize) {
        for i in 0..n {
            engine.vertex(state, i as f32, 0.0, 0.0);
        }
    }

    #[test]
    fn test_begin_same_mode_reuses_open_call() {
        let (_backend, mut engine, mut state) = setup(BatchConfig::default());
        engine.begin(&mut state, PrimitiveMode::Quads);
        emit(&mut engine, &mut state, 4);
        engine.end();
        engine.begin(&mut state, PrimitiveMode::Quads);
        emit(&mut engine, &mut state, 4);
        engine.end();

        assert_eq!(engine.draw_call_count(), 1);
        assert_eq!(engine.open_call().vertex_count, 8);
    }

    #[test]
    fn test_mode_switch_on_empty_call_reuses_it() {
        let (_backend, mut engine, mut state) = setup(BatchConfig::default());
        engine.begin(&mut state, PrimitiveMode::Lines);
        assert_eq!(engine.draw_call_count(), 1);
        assert_eq!(engine.open_call().mode, PrimitiveMode::Lines);
    }

    #[test]
    fn test_triangles_then_quads_alignment() {
        let (_backend, mut engine, mut state) = setup(BatchConfig::default());
        engine.begin(&mut state, PrimitiveMode::Triangles);
        emit(&mut engine, &mut state, 3);
        engine.end();
        engine.begin(&mut state, PrimitiveMode::Quads);

        let calls: Vec<_> = engine.draw_calls().copied().collect();
        assert_eq!(calls[0].vertex_alignment, 1);
        assert_eq!(state.vertex_counter(), 4);
        assert_eq!(calls[1].mode, PrimitiveMode::Quads);
    }

    #[test]
    fn test_phase_transitions() {
        let (_backend, mut engine, mut state) = setup(BatchConfig::default());
        assert_eq!(engine.phase(), BatchPhase::Idle);
        engine.begin(&mut state, PrimitiveMode::Quads);
        assert_eq!(engine.phase(), BatchPhase::Accumulating);
        emit(&mut engine, &mut state, 4);
        engine.end();
        assert_eq!(engine.phase(), BatchPhase::Idle);
        engine.flush(&mut state);
        assert_eq!(engine.phase(), BatchPhase::Idle);

        engine.begin(&mut state, PrimitiveMode::Quads);
        emit(&mut engine, &mut state, 4);
        engine.flush(&mut state);
        assert_eq!(engine.phase(), BatchPhase::Accumulating);
        engine.end();
        assert_eq!(engine.phase(), BatchPhase::Idle);
    }

    #[test]
    fn test_depth_advances_per_primitive_and_resets_on_flush() {
        let (_backend, mut engine, mut state) = setup(BatchConfig::default());
        assert_eq!(engine.current_depth(), -1.0);
        engine.begin(&mut state, PrimitiveMode::Quads);
        engine.end();
        engine.begin(&mut state, PrimitiveMode::Quads);
        engine.end();
        assert!((engine.current_depth() - (-1.0 + 2.0 / 20000.0)).abs() < 1e-7);

        engine.flush(&mut state);
        assert_eq!(engine.current_depth(), -1.0);
    }

    #[test]
    fn test_draw_call_limit_flushes() {
        let (backend, mut engine, mut state) =
            setup(BatchConfig::default().with_max_draw_calls(2));
        for texture in [5, 6, 7] {
            engine.switch_texture(&mut state, TextureHandle(texture));
            engine.begin(&mut state, PrimitiveMode::Quads);
            emit(&mut engine, &mut state, 4);
            engine.end();
        }

        // The third texture did not fit the two-call queue.
        assert_eq!(engine.stats().flushes, 1);
        assert_eq!(backend.count_draws(), 2);
        assert_eq!(engine.draw_call_count(), 1);
        assert_eq!(engine.open_call().texture, TextureHandle(7));
        assert_eq!(engine.open_call().vertex_count, 4);
    }

    #[test]
    fn test_null_texture_keeps_open_call() {
        let (_backend, mut engine, mut state) = setup(BatchConfig::default());
        engine.switch_texture(&mut state, TextureHandle(9));
        engine.begin(&mut state, PrimitiveMode::Quads);
        emit(&mut engine, &mut state, 4);
        engine.end();
        engine.switch_texture(&mut state, TextureHandle::NULL);

        assert_eq!(engine.draw_call_count(), 1);
        assert_eq!(state.current_texture(), DEFAULT_TEXTURE);

        // A later mode change opens a call on the default texture.
        engine.begin(&mut state, PrimitiveMode::Lines);
        assert_eq!(engine.open_call().texture, DEFAULT_TEXTURE);
    }

    #[test]
    fn test_null_texture_flushes_when_full() {
        let (backend, mut engine, mut state) =
            setup(BatchConfig::default().with_buffer_elements(2));
        engine.begin(&mut state, PrimitiveMode::Lines);
        emit(&mut engine, &mut state, 6);
        engine.end();
        assert_eq!(backend.count_draws(), 0);

        engine.switch_texture(&mut state, TextureHandle::NULL);
        assert_eq!(engine.stats().flushes, 1);
        assert_eq!(state.vertex_counter(), 0);
    }

    #[test]
    fn test_check_limit() {
        let (_backend, mut engine, mut state) =
            setup(BatchConfig::default().with_buffer_elements(2));
        engine.switch_texture(&mut state, TextureHandle(3));
        engine.begin(&mut state, PrimitiveMode::Quads);
        emit(&mut engine, &mut state, 4);

        assert!(!engine.check_limit(&mut state, 4));
        assert!(engine.check_limit(&mut state, 5));
        assert_eq!(state.vertex_counter(), 0);
        assert_eq!(engine.open_call().texture, TextureHandle(3));
        assert_eq!(engine.open_call().mode, PrimitiveMode::Quads);
    }

    #[test]
    fn test_transform_applies_to_vertices() {
        let (_backend, mut engine, mut state) = setup(BatchConfig::default());
        state.push_matrix().unwrap();
        state.translate(10.0, 20.0, 0.0);
        engine.begin(&mut state, PrimitiveMode::Lines);
        engine.vertex(&mut state, 1.0, 1.0, 0.0);
        state.pop_matrix();
        engine.vertex(&mut state, 1.0, 1.0, 0.0);

        let geometry = engine.geometry(0).unwrap();
        assert_eq!(geometry.vertex(0).unwrap().0, [11.0, 21.0, 0.0]);
        assert_eq!(geometry.vertex(1).unwrap().0, [1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_flush_binds_auxiliary_textures() {
        let (backend, mut engine, mut state) = setup(BatchConfig::default());
        state.activate_texture(TextureHandle(42));
        engine.begin(&mut state, PrimitiveMode::Quads);
        emit(&mut engine, &mut state, 4);
        engine.end();
        backend.clear_calls();

        engine.flush(&mut state);

        let calls = backend.calls();
        assert!(calls.contains(&BackendCall::BindTexture {
            unit: 1,
            texture: TextureHandle(42),
        }));
        assert!(calls.contains(&BackendCall::SetUniformVec4 {
            location: ShaderLocations::sequential().color_diffuse,
            value: [1.0; 4],
        }));
        assert!(state.active_textures().iter().all(|t| t.is_null()));
    }

    #[test]
    fn test_empty_flush_rotates_without_drawing() {
        let (backend, mut engine, mut state) =
            setup(BatchConfig::default().with_buffer_count(2));
        backend.clear_calls();
        engine.flush(&mut state);

        assert_eq!(backend.call_count(), 0);
        assert_eq!(engine.current_generation(), 1);
    }
}
