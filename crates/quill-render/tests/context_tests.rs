//! Front-end state changes, batch selection and construction errors.

use std::sync::Arc;

use quill_core::math::{Mat4, Vec3};
use quill_render::{
    BatchConfig, BatchError, BlendMode, Context, ContextDescriptor, ErrorKind, PrimitiveMode,
    ShaderLocations, ShaderProgram,
};
use quill_test_utils::{
    BackendCall, BackendCapabilities, MockBackend, ShaderHandle, ShaderLocation, TextureHandle,
    Viewport,
};

fn default_program() -> ShaderProgram {
    ShaderProgram::new(ShaderHandle(1), ShaderLocations::sequential())
}

fn descriptor() -> ContextDescriptor {
    ContextDescriptor::new(default_program(), TextureHandle(1)).with_framebuffer_size(800, 600)
}

fn context(backend: &Arc<MockBackend>) -> Context {
    quill_core::logging::init_for_tests();
    Context::new(backend.clone(), descriptor()).unwrap()
}

fn quad(ctx: &mut Context) {
    ctx.begin(PrimitiveMode::Quads);
    for (x, y) in [(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)] {
        ctx.vertex2f(x, y);
    }
    ctx.end();
}

fn mvp_uploads(backend: &MockBackend) -> Vec<Mat4> {
    backend
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            BackendCall::SetUniformMat4 { value, .. } => Some(Mat4::from_cols_array(&value)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_stereo_draws_every_call_per_eye() {
    let backend = Arc::new(MockBackend::new());
    let mut ctx = context(&backend);

    let left_offset = Mat4::from_translation(Vec3::new(-0.1, 0.0, 0.0));
    let right_offset = Mat4::from_translation(Vec3::new(0.1, 0.0, 0.0));
    let left_projection = Mat4::from_scale(Vec3::splat(2.0));
    let right_projection = Mat4::from_scale(Vec3::splat(3.0));
    let modelview = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));

    ctx.enable_stereo_render();
    ctx.set_matrix_view_offset_stereo(left_offset, right_offset);
    ctx.set_matrix_projection_stereo(left_projection, right_projection);
    ctx.set_matrix_modelview(modelview);

    ctx.set_texture(TextureHandle(3));
    quad(&mut ctx);
    ctx.set_texture(TextureHandle(4));
    quad(&mut ctx);
    backend.clear_calls();
    ctx.flush();

    // Two calls per eye.
    assert_eq!(backend.count_draws(), 4);
    assert_eq!(ctx.active_batch().stats().draw_calls, 4);

    let viewports: Vec<_> = backend
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            BackendCall::SetViewport { viewport } => Some(viewport),
            _ => None,
        })
        .collect();
    assert_eq!(
        viewports,
        vec![
            Viewport::new(0, 0, 400, 600),
            Viewport::new(400, 0, 400, 600),
            Viewport::new(0, 0, 800, 600),
        ]
    );

    assert_eq!(
        mvp_uploads(&backend),
        vec![
            left_projection * (left_offset * modelview),
            right_projection * (right_offset * modelview),
        ]
    );

    assert_eq!(ctx.matrix_modelview(), modelview);
    assert_eq!(ctx.matrix_projection(), Mat4::IDENTITY);
    assert_eq!(ctx.active_batch().draw_call_count(), 1);
}

fn viewports(backend: &MockBackend) -> Vec<Viewport> {
    backend
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            BackendCall::SetViewport { viewport } => Some(viewport),
            _ => None,
        })
        .collect()
}

#[test]
fn test_stereo_follows_framebuffer_size() {
    let backend = Arc::new(MockBackend::new());
    quill_core::logging::init_for_tests();
    let mut ctx =
        Context::new(backend.clone(), ContextDescriptor::new(default_program(), TextureHandle(1)))
            .unwrap();
    assert_eq!(ctx.state().framebuffer_size(), (0, 0));

    // Allowed, but every eye viewport is empty until a size is set.
    ctx.enable_stereo_render();
    assert!(ctx.is_stereo_render_enabled());
    quad(&mut ctx);
    backend.clear_calls();
    ctx.flush();
    assert_eq!(viewports(&backend), vec![Viewport::new(0, 0, 0, 0); 3]);

    ctx.set_framebuffer_size(640, 480);
    quad(&mut ctx);
    backend.clear_calls();
    ctx.flush();
    assert_eq!(
        viewports(&backend),
        vec![
            Viewport::new(0, 0, 320, 480),
            Viewport::new(320, 0, 320, 480),
            Viewport::new(0, 0, 640, 480),
        ]
    );
}

#[test]
fn test_mvp_combines_projection_and_modelview() {
    let backend = Arc::new(MockBackend::new());
    let mut ctx = context(&backend);
    ctx.matrix_mode(quill_render::MatrixMode::Projection);
    ctx.ortho(0.0, 800.0, 600.0, 0.0, 0.0, 1.0);
    ctx.matrix_mode(quill_render::MatrixMode::ModelView);
    ctx.translatef(10.0, 0.0, 0.0);

    quad(&mut ctx);
    backend.clear_calls();
    ctx.flush();

    assert_eq!(
        mvp_uploads(&backend),
        vec![ctx.matrix_projection() * ctx.matrix_modelview()]
    );
}

#[test]
fn test_shader_switch_flushes_only_on_change() {
    let backend = Arc::new(MockBackend::new());
    let mut ctx = context(&backend);

    quad(&mut ctx);
    ctx.set_shader(default_program());
    assert_eq!(backend.count_draws(), 0);

    let custom = ShaderProgram::new(ShaderHandle(8), ShaderLocations::sequential());
    ctx.set_shader(custom);
    assert_eq!(backend.count_draws(), 1);
    assert_eq!(ctx.vertex_counter(), 0);
    assert_eq!(ctx.state().current_shader(), custom);

    quad(&mut ctx);
    backend.clear_calls();
    ctx.flush();
    assert!(
        backend
            .calls()
            .contains(&BackendCall::UseShader { shader: ShaderHandle(8) })
    );

    ctx.reset_shader();
    assert_eq!(ctx.state().current_shader(), default_program());
}

#[test]
fn test_shader_locations_rebound_without_vertex_arrays() {
    let backend = Arc::new(MockBackend::with_capabilities(BackendCapabilities::embedded()));
    quill_core::logging::init_for_tests();
    let mut ctx = Context::new(
        backend.clone(),
        descriptor().with_batch_config(BatchConfig::embedded()),
    )
    .unwrap();

    let mut locations = ShaderLocations::sequential();
    locations.vertex_position = ShaderLocation(4);
    ctx.set_shader(ShaderProgram::new(ShaderHandle(2), locations));
    quad(&mut ctx);
    backend.clear_calls();
    ctx.flush();

    let layout = backend
        .calls()
        .into_iter()
        .find_map(|call| match call {
            BackendCall::BindVertexLayout { layout } => Some(layout),
            _ => None,
        })
        .unwrap();
    assert_eq!(layout.attributes[0].location, ShaderLocation(4));
    assert_eq!(layout.index_format, wgpu::IndexFormat::Uint16);
    assert!(
        !backend
            .calls()
            .iter()
            .any(|call| matches!(call, BackendCall::BindVertexArray { .. }))
    );
}

#[test]
fn test_blend_mode_switch() {
    let backend = Arc::new(MockBackend::new());
    let mut ctx = context(&backend);

    quad(&mut ctx);
    ctx.set_blend_mode(BlendMode::Alpha);
    assert_eq!(backend.count_draws(), 0);

    backend.clear_calls();
    ctx.set_blend_mode(BlendMode::Additive);
    let calls = backend.calls();
    let draw = calls.iter().position(BackendCall::is_draw).unwrap();
    let blend = calls
        .iter()
        .position(|call| matches!(call, BackendCall::SetBlendState { .. }))
        .unwrap();
    assert!(draw < blend, "blend state changed before pending geometry drew");
    assert_eq!(
        calls[blend],
        BackendCall::SetBlendState {
            state: BlendMode::Additive.preset().unwrap(),
        }
    );
}

#[test]
fn test_custom_blend_factors_force_reapply() {
    let backend = Arc::new(MockBackend::new());
    let mut ctx = context(&backend);

    ctx.set_blend_mode(BlendMode::Custom);
    backend.clear_calls();
    ctx.set_blend_mode(BlendMode::Custom);
    assert_eq!(backend.call_count(), 0);

    let factors = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Max,
    };
    ctx.set_blend_factors(factors);
    quad(&mut ctx);
    ctx.set_blend_mode(BlendMode::Custom);

    assert_eq!(backend.count_draws(), 1);
    assert!(backend.calls().contains(&BackendCall::SetBlendState {
        state: wgpu::BlendState {
            color: factors,
            alpha: factors,
        },
    }));
}

#[test]
fn test_auxiliary_textures_bound_for_one_flush() {
    let backend = Arc::new(MockBackend::new());
    let mut ctx = context(&backend);

    ctx.set_uniform_sampler(ShaderLocation(3), TextureHandle(50));
    quad(&mut ctx);
    backend.clear_calls();
    ctx.flush();
    assert!(backend.calls().contains(&BackendCall::BindTexture {
        unit: 1,
        texture: TextureHandle(50),
    }));

    quad(&mut ctx);
    backend.clear_calls();
    ctx.flush();
    assert!(!backend.calls().contains(&BackendCall::BindTexture {
        unit: 1,
        texture: TextureHandle(50),
    }));
}

#[test]
fn test_active_batch_switching() {
    let backend = Arc::new(MockBackend::new());
    let mut ctx = context(&backend);
    let custom = ctx
        .create_batch(&BatchConfig::default().with_buffer_elements(16))
        .unwrap();

    quad(&mut ctx);
    assert!(ctx.set_active_batch(Some(custom)).unwrap().is_none());
    // Switching flushed the default batch.
    assert_eq!(backend.count_draws(), 1);
    assert_eq!(ctx.active_batch().vertex_capacity(), 64);

    quad(&mut ctx);
    quad(&mut ctx);
    assert_eq!(ctx.vertex_counter(), 8);

    let custom = ctx.set_active_batch(None).unwrap().unwrap();
    assert_eq!(backend.count_draws(), 2);
    assert_eq!(custom.stats().vertices_uploaded, 8);
    assert_eq!(ctx.active_batch().vertex_capacity(), 8192 * 4);
}

#[test]
fn test_foreign_batch_rejected() {
    let backend = Arc::new(MockBackend::new());
    let mut ctx = context(&backend);
    let other = context(&backend);
    let foreign = other.create_batch(&BatchConfig::default()).unwrap();

    quad(&mut ctx);
    let err = ctx.set_active_batch(Some(foreign)).unwrap_err();
    assert_eq!(err, BatchError::ForeignBatch);
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);

    // Nothing was flushed or replaced.
    assert_eq!(backend.count_draws(), 0);
    assert_eq!(ctx.vertex_counter(), 4);
}

#[test]
fn test_zero_draw_call_limit_rejected() {
    let backend = Arc::new(MockBackend::new());
    let result = Context::new(
        backend.clone(),
        descriptor().with_batch_config(BatchConfig::default().with_max_draw_calls(0)),
    );
    let err = result.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    assert_eq!(backend.live_buffer_count(), 0);
}

#[test]
fn test_allocation_failure_is_configuration_error() {
    // Two generations need 2 vertex arrays and 8 buffers.
    let backend = Arc::new(MockBackend::new().with_allocation_limit(7));
    let result = Context::new(
        backend.clone(),
        descriptor().with_batch_config(BatchConfig::default().with_buffer_count(2)),
    );

    match result {
        Err(BatchError::BufferAllocation { generation, .. }) => assert_eq!(generation, 1),
        other => panic!("expected allocation failure, got {:?}", other.err()),
    }
    assert_eq!(backend.live_buffer_count(), 0);
    assert_eq!(backend.live_vertex_array_count(), 0);
}

#[test]
fn test_unsupported_configuration() {
    let backend = Arc::new(MockBackend::with_capabilities(BackendCapabilities::embedded()));
    let err = Context::new(
        backend,
        descriptor().with_batch_config(BatchConfig::default().with_buffer_elements(32_768)),
    )
    .err()
    .unwrap();
    assert!(matches!(err, BatchError::UnsupportedConfiguration(_)));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_matrix_stack_overflow_surfaces() {
    let backend = Arc::new(MockBackend::new());
    let mut ctx = Context::new(backend, descriptor().with_matrix_stack_size(2)).unwrap();
    ctx.push_matrix().unwrap();
    ctx.push_matrix().unwrap();
    assert!(matches!(
        ctx.push_matrix(),
        Err(BatchError::MatrixStackOverflow { capacity: 2 })
    ));
}

#[test]
fn test_pushed_transform_moves_vertices_only() {
    let backend = Arc::new(MockBackend::new());
    let mut ctx = context(&backend);

    ctx.push_matrix().unwrap();
    ctx.translatef(100.0, 0.0, 0.0);
    ctx.rotatef(90.0, 0.0, 0.0, 1.0);
    ctx.begin(PrimitiveMode::Lines);
    ctx.vertex3f(1.0, 0.0, 0.0);
    ctx.vertex3f(0.0, 0.0, 0.0);
    ctx.end();
    ctx.pop_matrix();

    assert_eq!(ctx.matrix_modelview(), Mat4::IDENTITY);
    let position = ctx.active_batch().geometry(0).unwrap().vertex(0).unwrap().0;
    assert!((Vec3::from_array(position) - Vec3::new(100.0, 1.0, 0.0)).length() < 1e-5);
}
