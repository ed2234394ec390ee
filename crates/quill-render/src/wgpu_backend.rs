//! wgpu implementation of [`RenderBackend`].
//!
//! wgpu has no notion of a bound program or of draw calls issued outside a
//! render pass, so the backend records every draw together with the state it
//! was issued under and replays the recording into a render pass on
//! [`WgpuBackend::encode`] or [`WgpuBackend::submit`].
//!
//! Uniform slots map onto the built-in program: location 0 is the MVP
//! matrix, location 1 the diffuse color, and texture unit 0 the diffuse
//! texture. Auxiliary units are accepted and ignored by the built-in shader.

use std::num::NonZeroU64;

use ahash::{AHashMap, AHashSet};
use bytemuck::{Pod, Zeroable};
use parking_lot::Mutex;
use quill_core::{math::Mat4, profiling::profile_function};
use quill_test_utils::{
    BackendCapabilities, BackendError, BackendFeatures, BufferDesc, BufferHandle, RenderBackend,
    ShaderHandle, ShaderLocation, TextureHandle, VertexArrayHandle, VertexLayout, VertexSemantic,
    Viewport,
};
use wgpu::util::DeviceExt;

use crate::shader::{ShaderLocations, ShaderProgram};

const MVP_LOCATION: i32 = 0;
const DIFFUSE_LOCATION: i32 = 1;

/// mat4x4 + vec4.
const UNIFORM_SIZE: u64 = 80;
const INITIAL_UNIFORM_SLOTS: usize = 64;

/// A color attachment to replay recorded draws into.
///
/// The size is needed to convert lower-left viewports to wgpu's top-left
/// origin.
#[derive(Clone, Debug)]
pub struct RenderTarget {
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl RenderTarget {
    pub fn new(view: wgpu::TextureView, width: u32, height: u32) -> Self {
        Self {
            view,
            width,
            height,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct Uniforms {
    mvp: [f32; 16],
    diffuse: [f32; 4],
}

impl Default for Uniforms {
    fn default() -> Self {
        Self {
            mvp: Mat4::IDENTITY.to_cols_array(),
            diffuse: [1.0; 4],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    shader: ShaderHandle,
    topology: wgpu::PrimitiveTopology,
    blend: wgpu::BlendState,
    locations: [i32; 3],
}

#[derive(Debug, Clone, Copy)]
enum DrawRange {
    Arrays { first: u32, count: u32 },
    Indexed { first: u32, count: u32 },
}

#[derive(Debug, Clone, Copy)]
struct RecordedDraw {
    pipeline: PipelineKey,
    layout: VertexLayout,
    texture: TextureHandle,
    uniform_slot: u32,
    viewport: Option<Viewport>,
    range: DrawRange,
}

struct Resources {
    next_id: u32,
    buffers: AHashMap<BufferHandle, wgpu::Buffer>,
    vertex_arrays: AHashMap<VertexArrayHandle, Option<VertexLayout>>,
    shaders: AHashMap<ShaderHandle, wgpu::ShaderModule>,
    textures: AHashMap<TextureHandle, wgpu::BindGroup>,
    pipelines: AHashMap<PipelineKey, wgpu::RenderPipeline>,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    uniform_slots: usize,
}

impl Resources {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

/// State set through the backend contract, captured at each draw.
struct Bindings {
    shader: ShaderHandle,
    layout: Option<VertexLayout>,
    texture: TextureHandle,
    blend: wgpu::BlendState,
    viewport: Option<Viewport>,
    uniforms: Uniforms,
}

impl Default for Bindings {
    fn default() -> Self {
        Self {
            shader: ShaderHandle::NULL,
            layout: None,
            texture: TextureHandle::NULL,
            blend: wgpu::BlendState::ALPHA_BLENDING,
            viewport: None,
            uniforms: Uniforms::default(),
        }
    }
}

#[derive(Default)]
struct Recording {
    draws: Vec<RecordedDraw>,
    uniforms: Vec<Uniforms>,
    referenced: AHashSet<BufferHandle>,
}

impl Recording {
    fn clear(&mut self) {
        self.draws.clear();
        self.uniforms.clear();
        self.referenced.clear();
    }
}

struct Inner {
    resources: Resources,
    bindings: Bindings,
    recording: Recording,
    target: Option<RenderTarget>,
}

/// [`RenderBackend`] on top of a wgpu device.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use quill_render::{Context, ContextDescriptor, WgpuBackend};
///
/// let backend = Arc::new(WgpuBackend::new_headless(wgpu::TextureFormat::Rgba8UnormSrgb).unwrap());
/// let descriptor = ContextDescriptor::new(backend.default_program(), backend.default_texture());
/// let _ctx = Context::new(backend.clone(), descriptor).unwrap();
/// ```
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target_format: wgpu::TextureFormat,
    capabilities: BackendCapabilities,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    uniform_stride: u64,
    default_shader: ShaderHandle,
    default_texture: TextureHandle,
    // Keeps the fallback texture alive alongside its bind group.
    _white: wgpu::Texture,
    inner: Mutex<Inner>,
}

impl WgpuBackend {
    /// Wrap an existing device. Pipelines render into `target_format`.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, target_format: wgpu::TextureFormat) -> Self {
        profile_function!();
        let limits = device.limits();
        let capabilities = BackendCapabilities {
            features: BackendFeatures::all(),
            max_texture_units: limits.max_sampled_textures_per_shader_stage,
            max_buffer_size: limits.max_buffer_size,
        };
        let uniform_stride =
            UNIFORM_SIZE.next_multiple_of(limits.min_uniform_buffer_offset_alignment as u64);

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("quill_uniform_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(UNIFORM_SIZE),
                },
                count: None,
            }],
        });
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("quill_texture_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("quill_pipeline_layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("quill_sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let (uniform_buffer, uniform_bind_group) = create_uniform_buffer(
            &device,
            &uniform_layout,
            uniform_stride,
            INITIAL_UNIFORM_SLOTS,
        );

        let mut resources = Resources {
            next_id: 0,
            buffers: AHashMap::new(),
            vertex_arrays: AHashMap::new(),
            shaders: AHashMap::new(),
            textures: AHashMap::new(),
            pipelines: AHashMap::new(),
            uniform_buffer,
            uniform_bind_group,
            uniform_slots: INITIAL_UNIFORM_SLOTS,
        };

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("quill_batch_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/batch.wgsl").into()),
        });
        let default_shader = ShaderHandle(resources.next_id());
        resources.shaders.insert(default_shader, module);

        let white = create_white_texture(&device, &queue);
        let white_view = white.create_view(&wgpu::TextureViewDescriptor::default());
        let default_texture = TextureHandle(resources.next_id());
        resources.textures.insert(
            default_texture,
            create_texture_bind_group(&device, &texture_layout, &white_view, &sampler),
        );

        tracing::debug!(
            "Created wgpu backend: target {:?}, uniform stride {}",
            target_format,
            uniform_stride
        );

        Self {
            device,
            queue,
            target_format,
            capabilities,
            uniform_layout,
            texture_layout,
            pipeline_layout,
            sampler,
            uniform_stride,
            default_shader,
            default_texture,
            _white: white,
            inner: Mutex::new(Inner {
                resources,
                bindings: Bindings::default(),
                recording: Recording::default(),
                target: None,
            }),
        }
    }

    /// Create a device without a surface. Blocks until the adapter is ready.
    pub fn new_headless(target_format: wgpu::TextureFormat) -> Result<Self, BackendError> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::default(),
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .map_err(|e| BackendError::Unsupported(format!("no GPU adapter: {}", e)))?;
            let (device, queue) = adapter
                .request_device(&wgpu::DeviceDescriptor {
                    label: Some("quill_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                    ..Default::default()
                })
                .await
                .map_err(|e| BackendError::Unsupported(format!("device request failed: {}", e)))?;
            tracing::info!("Using adapter {}", adapter.get_info().name);
            Ok(Self::new(device, queue, target_format))
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn default_shader(&self) -> ShaderHandle {
        self.default_shader
    }

    /// A 1x1 white texture.
    pub fn default_texture(&self) -> TextureHandle {
        self.default_texture
    }

    pub fn default_locations(&self) -> ShaderLocations {
        ShaderLocations::sequential()
    }

    pub fn default_program(&self) -> ShaderProgram {
        ShaderProgram::new(self.default_shader, self.default_locations())
    }

    /// Compile a WGSL program with the built-in interface: `vs_main` and
    /// `fs_main`, uniforms at group 0 and the diffuse texture at group 1.
    pub fn create_shader(&self, label: Option<&str>, wgsl: &str) -> ShaderHandle {
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label,
                source: wgpu::ShaderSource::Wgsl(wgsl.into()),
            });
        let mut inner = self.inner.lock();
        let handle = ShaderHandle(inner.resources.next_id());
        inner.resources.shaders.insert(handle, module);
        handle
    }

    /// Make a texture view drawable through a [`TextureHandle`].
    pub fn register_texture(&self, view: &wgpu::TextureView) -> TextureHandle {
        let bind_group =
            create_texture_bind_group(&self.device, &self.texture_layout, view, &self.sampler);
        let mut inner = self.inner.lock();
        let handle = TextureHandle(inner.resources.next_id());
        inner.resources.textures.insert(handle, bind_group);
        handle
    }

    pub fn release_texture(&self, texture: TextureHandle) {
        if texture == self.default_texture {
            tracing::warn!("Ignoring release of the default texture");
            return;
        }
        self.inner.lock().resources.textures.remove(&texture);
    }

    /// Attach the target that pending draws are submitted to when a buffer
    /// they reference is about to be rewritten.
    pub fn set_target(&self, target: Option<RenderTarget>) {
        self.inner.lock().target = target;
    }

    /// Draws recorded since the last encode.
    pub fn pending_draws(&self) -> usize {
        self.inner.lock().recording.draws.len()
    }

    /// Replay pending draws into a render pass on `target`, loading its
    /// existing contents.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, target: &RenderTarget) {
        let mut inner = self.inner.lock();
        self.encode_locked(&mut inner, encoder, target);
    }

    /// Encode pending draws into the attached target and submit them.
    /// Returns false when nothing was pending or no target is attached.
    pub fn submit(&self) -> bool {
        let mut inner = self.inner.lock();
        self.submit_locked(&mut inner)
    }

    fn submit_locked(&self, inner: &mut Inner) -> bool {
        if inner.recording.draws.is_empty() {
            return false;
        }
        let Some(target) = inner.target.clone() else {
            return false;
        };
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("quill_batch_encoder"),
            });
        self.encode_locked(inner, &mut encoder, &target);
        self.queue.submit(std::iter::once(encoder.finish()));
        true
    }

    /// Pending draws read `buffer`; they must reach the GPU before it changes.
    fn settle_before_write(&self, inner: &mut Inner, buffer: BufferHandle) {
        if !inner.recording.referenced.contains(&buffer) {
            return;
        }
        if !self.submit_locked(inner) {
            tracing::warn!(
                "Rewriting {:?} while unsubmitted draws read it; attach a target to keep them intact",
                buffer
            );
        }
    }

    fn encode_locked(&self, inner: &mut Inner, encoder: &mut wgpu::CommandEncoder, target: &RenderTarget) {
        profile_function!();
        if inner.recording.draws.is_empty() {
            return;
        }

        for draw in &inner.recording.draws {
            if !inner.resources.pipelines.contains_key(&draw.pipeline) {
                match self.create_pipeline(&inner.resources, &draw.pipeline) {
                    Some(pipeline) => {
                        inner.resources.pipelines.insert(draw.pipeline, pipeline);
                    }
                    None => tracing::warn!("Unknown shader {:?}; draw skipped", draw.pipeline.shader),
                }
            }
        }

        self.upload_uniforms(inner);

        let resources = &inner.resources;
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("quill_batch_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for draw in &inner.recording.draws {
            let Some(pipeline) = resources.pipelines.get(&draw.pipeline) else {
                continue;
            };
            let texture = resources
                .textures
                .get(&draw.texture)
                .or_else(|| resources.textures.get(&self.default_texture));
            let Some(texture) = texture else {
                continue;
            };

            let mut slot = 0;
            let mut complete = true;
            for attribute in draw.layout.attributes.iter().filter(|a| a.location.is_used()) {
                match resources.buffers.get(&attribute.buffer) {
                    Some(buffer) => pass.set_vertex_buffer(slot, buffer.slice(..)),
                    None => complete = false,
                }
                slot += 1;
            }
            if !complete {
                tracing::warn!("Draw references a destroyed buffer; skipped");
                continue;
            }

            pass.set_pipeline(pipeline);
            pass.set_bind_group(
                0,
                &resources.uniform_bind_group,
                &[(draw.uniform_slot as u64 * self.uniform_stride) as u32],
            );
            pass.set_bind_group(1, texture, &[]);

            let viewport = draw
                .viewport
                .unwrap_or(Viewport::new(0, 0, target.width, target.height));
            let flipped_y = target.height as i32 - viewport.y - viewport.height as i32;
            pass.set_viewport(
                viewport.x as f32,
                flipped_y as f32,
                viewport.width as f32,
                viewport.height as f32,
                0.0,
                1.0,
            );

            match draw.range {
                DrawRange::Arrays { first, count } => pass.draw(first..first + count, 0..1),
                DrawRange::Indexed { first, count } => {
                    let Some(indices) = resources.buffers.get(&draw.layout.index_buffer) else {
                        continue;
                    };
                    pass.set_index_buffer(indices.slice(..), draw.layout.index_format);
                    pass.draw_indexed(first..first + count, 0, 0..1);
                }
            }
        }

        drop(pass);
        tracing::trace!("Encoded {} recorded draw(s)", inner.recording.draws.len());
        inner.recording.clear();
    }

    fn upload_uniforms(&self, inner: &mut Inner) {
        let slots = inner.recording.uniforms.len();
        if slots > inner.resources.uniform_slots {
            let capacity = slots.next_power_of_two();
            let (buffer, bind_group) =
                create_uniform_buffer(&self.device, &self.uniform_layout, self.uniform_stride, capacity);
            inner.resources.uniform_buffer = buffer;
            inner.resources.uniform_bind_group = bind_group;
            inner.resources.uniform_slots = capacity;
        }

        let stride = self.uniform_stride as usize;
        let mut staging = vec![0u8; slots * stride];
        for (i, uniforms) in inner.recording.uniforms.iter().enumerate() {
            let bytes = bytemuck::bytes_of(uniforms);
            staging[i * stride..i * stride + bytes.len()].copy_from_slice(bytes);
        }
        self.queue
            .write_buffer(&inner.resources.uniform_buffer, 0, &staging);
    }

    fn create_pipeline(&self, resources: &Resources, key: &PipelineKey) -> Option<wgpu::RenderPipeline> {
        let module = resources.shaders.get(&key.shader)?;
        let semantics = [
            VertexSemantic::Position,
            VertexSemantic::TexCoord,
            VertexSemantic::Color,
        ];
        let attributes: Vec<[wgpu::VertexAttribute; 1]> = semantics
            .iter()
            .zip(key.locations)
            .filter(|(_, location)| *location >= 0)
            .map(|(semantic, location)| {
                [wgpu::VertexAttribute {
                    format: semantic.format(),
                    offset: 0,
                    shader_location: location as u32,
                }]
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout> = attributes
            .iter()
            .map(|attribute| wgpu::VertexBufferLayout {
                array_stride: attribute[0].format.size(),
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: attribute,
            })
            .collect();

        tracing::debug!(
            "Creating pipeline for {:?} ({:?})",
            key.shader,
            key.topology
        );
        Some(self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("quill_batch_pipeline"),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: Some("vs_main"),
                buffers: &buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.target_format,
                    blend: Some(key.blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: key.topology,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        }))
    }

    fn record(&self, topology: wgpu::PrimitiveTopology, range: DrawRange) {
        let mut inner = self.inner.lock();
        let Inner {
            bindings,
            recording,
            ..
        } = &mut *inner;

        let Some(layout) = bindings.layout else {
            tracing::warn!("Draw issued with no vertex layout bound; ignored");
            return;
        };

        if recording.uniforms.last() != Some(&bindings.uniforms) {
            recording.uniforms.push(bindings.uniforms);
        }
        let uniform_slot = (recording.uniforms.len() - 1) as u32;

        let locations = layout.attributes.map(|a| a.location.0);
        recording
            .referenced
            .extend(layout.attributes.iter().map(|a| a.buffer));
        recording.referenced.insert(layout.index_buffer);
        recording.draws.push(RecordedDraw {
            pipeline: PipelineKey {
                shader: bindings.shader,
                topology,
                blend: bindings.blend,
                locations,
            },
            layout,
            texture: bindings.texture,
            uniform_slot,
            viewport: bindings.viewport,
            range,
        });
    }
}

impl RenderBackend for WgpuBackend {
    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<BufferHandle, BackendError> {
        if desc.size() > self.capabilities.max_buffer_size {
            return Err(BackendError::OutOfMemory {
                requested: desc.size(),
            });
        }
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: desc.label,
                contents: desc.contents,
                usage: desc.usage | wgpu::BufferUsages::COPY_DST,
            });
        let mut inner = self.inner.lock();
        let handle = BufferHandle(inner.resources.next_id());
        inner.resources.buffers.insert(handle, buffer);
        Ok(handle)
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let mut inner = self.inner.lock();
        self.settle_before_write(&mut inner, buffer);
        match inner.resources.buffers.get(&buffer) {
            Some(target) => self.queue.write_buffer(target, offset, data),
            None => tracing::warn!("Write to unknown buffer {:?}", buffer),
        }
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        if buffer.is_null() {
            return;
        }
        let mut inner = self.inner.lock();
        self.settle_before_write(&mut inner, buffer);
        inner.resources.buffers.remove(&buffer);
    }

    fn create_vertex_array(&self) -> Result<VertexArrayHandle, BackendError> {
        let mut inner = self.inner.lock();
        let handle = VertexArrayHandle(inner.resources.next_id());
        inner.resources.vertex_arrays.insert(handle, None);
        Ok(handle)
    }

    fn configure_vertex_array(&self, vertex_array: VertexArrayHandle, layout: &VertexLayout) {
        if let Some(slot) = self.inner.lock().resources.vertex_arrays.get_mut(&vertex_array) {
            *slot = Some(*layout);
        }
    }

    fn bind_vertex_array(&self, vertex_array: VertexArrayHandle) {
        let mut inner = self.inner.lock();
        let layout = inner
            .resources
            .vertex_arrays
            .get(&vertex_array)
            .copied()
            .flatten();
        inner.bindings.layout = layout;
    }

    fn destroy_vertex_array(&self, vertex_array: VertexArrayHandle) {
        self.inner.lock().resources.vertex_arrays.remove(&vertex_array);
    }

    fn bind_vertex_layout(&self, layout: &VertexLayout) {
        self.inner.lock().bindings.layout = Some(*layout);
    }

    fn unbind_vertex_layout(&self) {
        self.inner.lock().bindings.layout = None;
    }

    fn use_shader(&self, shader: ShaderHandle) {
        self.inner.lock().bindings.shader = shader;
    }

    fn set_uniform_mat4(&self, location: ShaderLocation, value: [f32; 16]) {
        if location.0 == MVP_LOCATION {
            self.inner.lock().bindings.uniforms.mvp = value;
        }
    }

    fn set_uniform_vec4(&self, location: ShaderLocation, value: [f32; 4]) {
        if location.0 == DIFFUSE_LOCATION {
            self.inner.lock().bindings.uniforms.diffuse = value;
        }
    }

    fn set_uniform_sampler(&self, _location: ShaderLocation, _unit: u32) {}

    fn bind_texture(&self, unit: u32, texture: TextureHandle) {
        if unit == 0 {
            self.inner.lock().bindings.texture = texture;
        }
    }

    fn set_blend_state(&self, state: &wgpu::BlendState) {
        self.inner.lock().bindings.blend = *state;
    }

    fn set_viewport(&self, viewport: Viewport) {
        self.inner.lock().bindings.viewport = Some(viewport);
    }

    fn draw_arrays(&self, topology: wgpu::PrimitiveTopology, first_vertex: u32, vertex_count: u32) {
        self.record(
            topology,
            DrawRange::Arrays {
                first: first_vertex,
                count: vertex_count,
            },
        );
    }

    fn draw_indexed(&self, index_count: u32, first_index: u32) {
        self.record(
            wgpu::PrimitiveTopology::TriangleList,
            DrawRange::Indexed {
                first: first_index,
                count: index_count,
            },
        );
    }
}

fn create_uniform_buffer(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    stride: u64,
    slots: usize,
) -> (wgpu::Buffer, wgpu::BindGroup) {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("quill_uniforms"),
        size: stride * slots as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("quill_uniform_bind_group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: NonZeroU64::new(UNIFORM_SIZE),
            }),
        }],
    });
    (buffer, bind_group)
}

fn create_texture_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("quill_texture_bind_group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

fn create_white_texture(device: &wgpu::Device, queue: &wgpu::Queue) -> wgpu::Texture {
    let size = wgpu::Extent3d {
        width: 1,
        height: 1,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("quill_default_texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &[255, 255, 255, 255],
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4),
            rows_per_image: Some(1),
        },
        size,
    );
    texture
}
