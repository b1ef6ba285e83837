#[cfg(target_arch = "wasm32")]
mod imp {
    use ::wgpu::util::DeviceExt;
    use std::borrow::Cow;

    use gpu::{
        ColorOp, DepthOp, DrawKind, FramePlan, FrameUniforms, MeshVertex, Palette, PostEffect,
        Target, aircraft_icon_mesh, sphere_mesh,
    };
    use scene::{
        SizeClass,
        ambient::{FxSprite, FxVertex},
        instances::{Instance, StemVertex},
    };
    use tracing::{debug, info};

    use crate::config::EngineConfig;
    use crate::engine::{Engine, EngineError};

    const DEPTH_FORMAT: ::wgpu::TextureFormat = ::wgpu::TextureFormat::Depth24Plus;
    const OFFSCREEN_FORMAT: ::wgpu::TextureFormat = ::wgpu::TextureFormat::Rgba8Unorm;

    const GLOBALS_WGSL: &str = r#"
struct Globals {
    view_proj: mat4x4<f32>,
    globe: mat4x4<f32>,
    eye: vec4<f32>,
    light: vec4<f32>,
    viewport: vec4<f32>,
    params: vec4<f32>,
    globe_color: vec4<f32>,
    atmosphere_color: vec4<f32>,
    outline_color: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> globals: Globals;

fn to_world(p: vec3<f32>) -> vec4<f32> {
    return globals.globe * vec4<f32>(p, 1.0);
}
"#;

    const STARS_SHADER: &str = r#"
fn hash_u32(x_in: u32) -> u32 {
    var x = x_in;
    x ^= x >> 16u;
    x *= 0x7feb352du;
    x ^= x >> 15u;
    x *= 0x846ca68bu;
    x ^= x >> 16u;
    return x;
}

fn hash01(x: u32) -> f32 {
    return f32(hash_u32(x)) / 4294967295.0;
}

struct StarOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) a: f32,
};

@vertex
fn vs_main(@builtin(vertex_index) vid: u32) -> StarOut {
    let rx = hash01(vid ^ 0x68bc21ebu);
    let ry = hash01(vid ^ 0x02e5be93u);
    let rb = hash01(vid ^ 0x9e3779b9u);

    let z = ry * 2.0 - 1.0;
    let phi = 6.2831853 * rx;
    let r = sqrt(max(1.0 - z * z, 0.0));
    let dir = vec3<f32>(r * cos(phi), r * sin(phi), z);
    let twinkle = 0.8 + 0.2 * sin(globals.light.w * 1.7 + rb * 40.0);
    let a = (0.05 + 0.4 * rb * rb) * twinkle;

    // Direction at infinity, turning with the globe, pinned to the far plane.
    let world = (globals.globe * vec4<f32>(dir, 0.0)).xyz;
    var clip = globals.view_proj * vec4<f32>(world, 0.0);
    clip = vec4<f32>(clip.x, clip.y, clip.w, clip.w);
    return StarOut(clip, a);
}

@fragment
fn fs_main(in: StarOut) -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 1.0, 1.0, in.a * globals.params.z);
}
"#;

    const SPHERE_SHADER: &str = r#"
struct SphereOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) normal: vec3<f32>,
    @location(1) world: vec3<f32>,
};

fn sphere_out(position: vec3<f32>, normal: vec3<f32>, scale: f32) -> SphereOut {
    let world = to_world(position * scale);
    var out: SphereOut;
    out.pos = globals.view_proj * world;
    out.normal = (globals.globe * vec4<f32>(normal, 0.0)).xyz;
    out.world = world.xyz;
    return out;
}

@vertex
fn vs_globe(@location(0) position: vec3<f32>, @location(1) normal: vec3<f32>) -> SphereOut {
    return sphere_out(position, normal, 1.0);
}

@vertex
fn vs_atmosphere(@location(0) position: vec3<f32>, @location(1) normal: vec3<f32>) -> SphereOut {
    return sphere_out(position, normal, 1.06);
}

@vertex
fn vs_occluder(@location(0) position: vec3<f32>, @location(1) normal: vec3<f32>) -> SphereOut {
    return sphere_out(position, normal, 0.998);
}

@fragment
fn fs_globe(in: SphereOut) -> @location(0) vec4<f32> {
    let n = normalize(in.normal);
    let l = normalize(globals.light.xyz);
    let v = normalize(globals.eye.xyz - in.world);
    let diffuse = 0.3 + 0.7 * max(dot(n, l), 0.0);
    let rim = pow(1.0 - max(dot(n, v), 0.0), 3.0);
    let rgb = globals.globe_color.rgb * diffuse + globals.atmosphere_color.rgb * rim * 0.6;
    return vec4<f32>(rgb, 1.0);
}

@fragment
fn fs_atmosphere(in: SphereOut) -> @location(0) vec4<f32> {
    let n = normalize(in.normal);
    let v = normalize(globals.eye.xyz - in.world);
    let glow = pow(1.0 - abs(dot(n, v)), 4.0);
    return vec4<f32>(globals.atmosphere_color.rgb, glow * globals.atmosphere_color.a);
}

@fragment
fn fs_occluder(in: SphereOut) -> @location(0) vec4<f32> {
    return vec4<f32>(0.0);
}
"#;

    const LINES_SHADER: &str = r#"
struct LineOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) color: vec4<f32>,
};

@vertex
fn vs_line(@location(0) position: vec3<f32>, @location(1) color: vec4<f32>) -> LineOut {
    return LineOut(globals.view_proj * to_world(position), color);
}

@fragment
fn fs_line(in: LineOut) -> @location(0) vec4<f32> {
    return in.color;
}

struct OutlineOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) facing: f32,
};

@vertex
fn vs_outline(@location(0) position: vec3<f32>) -> OutlineOut {
    let world = to_world(position);
    let facing = dot(normalize(world.xyz), normalize(globals.eye.xyz - world.xyz));
    return OutlineOut(globals.view_proj * world, facing);
}

@fragment
fn fs_outline(in: OutlineOut) -> @location(0) vec4<f32> {
    // Depth is off for outlines; hide the far hemisphere by facing instead.
    if (in.facing < 0.0) {
        discard;
    }
    return vec4<f32>(globals.outline_color.rgb, globals.params.w);
}

struct SpriteOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) color: vec4<f32>,
    @location(1) local: vec2<f32>,
};

@vertex
fn vs_sprite(
    @builtin(vertex_index) vid: u32,
    @location(0) center: vec3<f32>,
    @location(1) size_px: f32,
    @location(2) color: vec4<f32>,
) -> SpriteOut {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );
    let corner = corners[vid];
    var clip = globals.view_proj * to_world(center);
    let offset = corner * size_px * globals.viewport.zw * clip.w;
    clip = vec4<f32>(clip.xy + offset, clip.zw);
    return SpriteOut(clip, color, corner);
}

@fragment
fn fs_sprite(in: SpriteOut) -> @location(0) vec4<f32> {
    let d = length(in.local);
    if (d > 1.0) {
        discard;
    }
    let falloff = (1.0 - d) * (1.0 - d);
    return vec4<f32>(in.color.rgb, in.color.a * falloff);
}

struct IconOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) color: vec4<f32>,
};

@vertex
fn vs_icon(
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) m0: vec4<f32>,
    @location(3) m1: vec4<f32>,
    @location(4) m2: vec4<f32>,
    @location(5) m3: vec4<f32>,
    @location(6) color: vec4<f32>,
) -> IconOut {
    let model = mat4x4<f32>(m0, m1, m2, m3);
    let world = globals.globe * (model * vec4<f32>(position, 1.0));
    return IconOut(globals.view_proj * world, color);
}

@fragment
fn fs_icon(in: IconOut) -> @location(0) vec4<f32> {
    return in.color;
}
"#;

    const POST_SHADER: &str = r#"
@group(1) @binding(0)
var src_a: texture_2d<f32>;
@group(1) @binding(1)
var src_b: texture_2d<f32>;
@group(1) @binding(2)
var src_sampler: sampler;

struct PostOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vid: u32) -> PostOut {
    let x = f32((vid << 1u) & 2u);
    let y = f32(vid & 2u);
    return PostOut(vec4<f32>(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0), vec2<f32>(x, 1.0 - y));
}

@fragment
fn fs_extract(in: PostOut) -> @location(0) vec4<f32> {
    let c = textureSample(src_a, src_sampler, in.uv).rgb;
    let luma = dot(c, vec3<f32>(0.2126, 0.7152, 0.0722));
    let k = smoothstep(globals.params.x, globals.params.x + 0.25, luma);
    return vec4<f32>(c * k, 1.0);
}

fn blur(uv: vec2<f32>, dir: vec2<f32>) -> vec4<f32> {
    // Bloom targets are half resolution.
    let texel = dir * globals.viewport.zw * 2.0;
    var weights = array<f32, 5>(0.227027, 0.1945946, 0.1216216, 0.054054, 0.016216);
    var sum = textureSample(src_a, src_sampler, uv).rgb * weights[0];
    for (var i = 1; i < 5; i++) {
        let o = texel * f32(i);
        sum += textureSample(src_a, src_sampler, uv + o).rgb * weights[i];
        sum += textureSample(src_a, src_sampler, uv - o).rgb * weights[i];
    }
    return vec4<f32>(sum, 1.0);
}

@fragment
fn fs_blur_h(in: PostOut) -> @location(0) vec4<f32> {
    return blur(in.uv, vec2<f32>(1.0, 0.0));
}

@fragment
fn fs_blur_v(in: PostOut) -> @location(0) vec4<f32> {
    return blur(in.uv, vec2<f32>(0.0, 1.0));
}

@fragment
fn fs_composite(in: PostOut) -> @location(0) vec4<f32> {
    let base = textureSample(src_a, src_sampler, in.uv).rgb;
    let glow = textureSample(src_b, src_sampler, in.uv).rgb;
    return vec4<f32>(base + glow * globals.params.y, 1.0);
}
"#;

    const MESH_ATTRS: [::wgpu::VertexAttribute; 2] =
        ::wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];
    const INSTANCE_ATTRS: [::wgpu::VertexAttribute; 5] = ::wgpu::vertex_attr_array![
        2 => Float32x4, 3 => Float32x4, 4 => Float32x4, 5 => Float32x4, 6 => Float32x4
    ];
    const COLORED_ATTRS: [::wgpu::VertexAttribute; 2] =
        ::wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x4];
    const POSITION_ATTRS: [::wgpu::VertexAttribute; 1] =
        ::wgpu::vertex_attr_array![0 => Float32x3];
    const SPRITE_ATTRS: [::wgpu::VertexAttribute; 3] =
        ::wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32, 2 => Float32x4];

    fn additive_blending() -> ::wgpu::BlendState {
        ::wgpu::BlendState {
            color: ::wgpu::BlendComponent {
                src_factor: ::wgpu::BlendFactor::SrcAlpha,
                dst_factor: ::wgpu::BlendFactor::One,
                operation: ::wgpu::BlendOperation::Add,
            },
            alpha: ::wgpu::BlendComponent::OVER,
        }
    }

    /// Everything that varies between the engine's render pipelines.
    struct PipelineSpec<'a> {
        label: &'static str,
        layout: &'a ::wgpu::PipelineLayout,
        module: &'a ::wgpu::ShaderModule,
        vs: &'static str,
        fs: &'static str,
        buffers: &'a [::wgpu::VertexBufferLayout<'a>],
        format: ::wgpu::TextureFormat,
        blend: Option<::wgpu::BlendState>,
        write_mask: ::wgpu::ColorWrites,
        topology: ::wgpu::PrimitiveTopology,
        /// `(depth_write_enabled, compare)`; `None` for passes without depth.
        depth: Option<(bool, ::wgpu::CompareFunction)>,
    }

    fn create_pipeline(device: &::wgpu::Device, desc: PipelineSpec<'_>) -> ::wgpu::RenderPipeline {
        device.create_render_pipeline(&::wgpu::RenderPipelineDescriptor {
            label: Some(desc.label),
            layout: Some(desc.layout),
            vertex: ::wgpu::VertexState {
                module: desc.module,
                entry_point: Some(desc.vs),
                compilation_options: Default::default(),
                buffers: desc.buffers,
            },
            fragment: Some(::wgpu::FragmentState {
                module: desc.module,
                entry_point: Some(desc.fs),
                compilation_options: Default::default(),
                targets: &[Some(::wgpu::ColorTargetState {
                    format: desc.format,
                    blend: desc.blend,
                    write_mask: desc.write_mask,
                })],
            }),
            primitive: ::wgpu::PrimitiveState {
                topology: desc.topology,
                strip_index_format: None,
                front_face: ::wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: ::wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: desc.depth.map(|(write, compare)| ::wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: write,
                depth_compare: compare,
                stencil: ::wgpu::StencilState::default(),
                bias: ::wgpu::DepthBiasState::default(),
            }),
            multisample: ::wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        })
    }

    fn create_shader(device: &::wgpu::Device, label: &'static str, body: &str) -> ::wgpu::ShaderModule {
        device.create_shader_module(::wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: ::wgpu::ShaderSource::Wgsl(Cow::Owned(format!("{GLOBALS_WGSL}{body}"))),
        })
    }

    fn create_depth_view(device: &::wgpu::Device, width: u32, height: u32) -> ::wgpu::TextureView {
        device
            .create_texture(&::wgpu::TextureDescriptor {
                label: Some("flight-depth"),
                size: ::wgpu::Extent3d {
                    width: width.max(1),
                    height: height.max(1),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: ::wgpu::TextureDimension::D2,
                format: DEPTH_FORMAT,
                usage: ::wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            })
            .create_view(&::wgpu::TextureViewDescriptor::default())
    }

    fn create_color_view(
        device: &::wgpu::Device,
        label: &'static str,
        width: u32,
        height: u32,
    ) -> ::wgpu::TextureView {
        device
            .create_texture(&::wgpu::TextureDescriptor {
                label: Some(label),
                size: ::wgpu::Extent3d {
                    width: width.max(1),
                    height: height.max(1),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: ::wgpu::TextureDimension::D2,
                format: OFFSCREEN_FORMAT,
                usage: ::wgpu::TextureUsages::RENDER_ATTACHMENT
                    | ::wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
            .create_view(&::wgpu::TextureViewDescriptor::default())
    }

    /// Vertex buffer re-filled every frame, grown in powers of two.
    struct DynamicBuffer {
        label: &'static str,
        buffer: ::wgpu::Buffer,
        capacity: u64,
        len: u32,
    }

    impl DynamicBuffer {
        fn new(device: &::wgpu::Device, label: &'static str) -> Self {
            Self {
                label,
                buffer: Self::allocate(device, label, 256),
                capacity: 256,
                len: 0,
            }
        }

        fn allocate(device: &::wgpu::Device, label: &'static str, size: u64) -> ::wgpu::Buffer {
            device.create_buffer(&::wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: ::wgpu::BufferUsages::VERTEX | ::wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        }

        fn upload<T: bytemuck::Pod>(&mut self, device: &::wgpu::Device, queue: &::wgpu::Queue, data: &[T]) {
            let bytes: &[u8] = bytemuck::cast_slice(data);
            let needed = bytes.len() as u64;
            if needed > self.capacity {
                self.capacity = needed.next_power_of_two();
                self.buffer = Self::allocate(device, self.label, self.capacity);
            }
            if !bytes.is_empty() {
                queue.write_buffer(&self.buffer, 0, bytes);
            }
            self.len = data.len() as u32;
        }
    }

    struct StaticMesh {
        vertices: ::wgpu::Buffer,
        indices: ::wgpu::Buffer,
        index_count: u32,
    }

    impl StaticMesh {
        fn upload(device: &::wgpu::Device, label: &'static str, mesh: &gpu::Mesh) -> Self {
            // Index buffers must be a multiple of four bytes.
            let mut indices = mesh.indices.clone();
            if indices.len() % 2 == 1 {
                indices.push(0);
            }
            Self {
                vertices: device.create_buffer_init(&::wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: bytemuck::cast_slice::<MeshVertex, u8>(&mesh.vertices),
                    usage: ::wgpu::BufferUsages::VERTEX,
                }),
                indices: device.create_buffer_init(&::wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: bytemuck::cast_slice(&indices),
                    usage: ::wgpu::BufferUsages::INDEX,
                }),
                index_count: mesh.index_count(),
            }
        }

        fn draw(&self, rpass: &mut ::wgpu::RenderPass<'_>, instances: std::ops::Range<u32>) {
            rpass.set_vertex_buffer(0, self.vertices.slice(..));
            rpass.set_index_buffer(self.indices.slice(..), ::wgpu::IndexFormat::Uint16);
            rpass.draw_indexed(0..self.index_count, 0, instances);
        }
    }

    struct Pipelines {
        stars: ::wgpu::RenderPipeline,
        globe: ::wgpu::RenderPipeline,
        atmosphere: ::wgpu::RenderPipeline,
        fx_lines: ::wgpu::RenderPipeline,
        fx_sprites: ::wgpu::RenderPipeline,
        outlines: ::wgpu::RenderPipeline,
        occluder: ::wgpu::RenderPipeline,
        icons: ::wgpu::RenderPipeline,
        stems: ::wgpu::RenderPipeline,
        extract: ::wgpu::RenderPipeline,
        blur_h: ::wgpu::RenderPipeline,
        blur_v: ::wgpu::RenderPipeline,
        composite: ::wgpu::RenderPipeline,
    }

    struct Offscreen {
        scene: ::wgpu::TextureView,
        bloom_a: ::wgpu::TextureView,
        bloom_b: ::wgpu::TextureView,
        /// One bind group per distinct source list in the plan.
        bindings: Vec<(Vec<Target>, ::wgpu::BindGroup)>,
    }

    pub struct Renderer {
        surface: ::wgpu::Surface<'static>,
        device: ::wgpu::Device,
        queue: ::wgpu::Queue,
        config: ::wgpu::SurfaceConfiguration,
        plan: FramePlan,
        palette: Palette,
        star_count: u32,
        outline_lift: f64,
        outline_step_deg: f64,
        depth_view: ::wgpu::TextureView,
        sampler: ::wgpu::Sampler,
        post_layout: ::wgpu::BindGroupLayout,
        offscreen: Option<Offscreen>,
        globals_buffer: ::wgpu::Buffer,
        globals_bind_group: ::wgpu::BindGroup,
        pipelines: Pipelines,
        sphere: StaticMesh,
        icon: StaticMesh,
        buckets: [DynamicBuffer; 3],
        selected: DynamicBuffer,
        stems: DynamicBuffer,
        fx_lines: DynamicBuffer,
        fx_sprites: DynamicBuffer,
        outlines: DynamicBuffer,
        outlines_revision: u64,
        // Fields drop in order; the instance goes after its surface and device.
        _instance: ::wgpu::Instance,
    }

    impl std::fmt::Debug for Renderer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Renderer")
                .field("width", &self.config.width)
                .field("height", &self.config.height)
                .field("format", &self.config.format)
                .finish()
        }
    }

    fn gpu_err(context: &str, err: impl std::fmt::Display) -> EngineError {
        EngineError::Gpu(format!("{context}: {err}"))
    }

    impl Renderer {
        pub async fn new(
            canvas: &web_sys::HtmlCanvasElement,
            engine_config: &EngineConfig,
            plan: &FramePlan,
        ) -> Result<Self, EngineError> {
            let width = canvas.width().max(1);
            let height = canvas.height().max(1);

            let instance = ::wgpu::Instance::new(&::wgpu::InstanceDescriptor {
                backends: ::wgpu::Backends::BROWSER_WEBGPU | ::wgpu::Backends::GL,
                ..Default::default()
            });

            let surface = instance
                .create_surface(::wgpu::SurfaceTarget::Canvas(canvas.clone()))
                .map_err(|e| gpu_err("surface", e))?;

            let adapter = instance
                .request_adapter(&::wgpu::RequestAdapterOptions {
                    power_preference: ::wgpu::PowerPreference::HighPerformance,
                    compatible_surface: Some(&surface),
                    force_fallback_adapter: false,
                })
                .await
                .map_err(|e| gpu_err("adapter", e))?;

            let (device, queue) = adapter
                .request_device(&::wgpu::DeviceDescriptor {
                    label: Some("flight-device"),
                    required_features: ::wgpu::Features::empty(),
                    required_limits: ::wgpu::Limits::downlevel_webgl2_defaults(),
                    ..Default::default()
                })
                .await
                .map_err(|e| gpu_err("device", e))?;

            let caps = surface.get_capabilities(&adapter);
            let format = caps
                .formats
                .iter()
                .copied()
                .find(|f| f.is_srgb())
                .or_else(|| caps.formats.first().copied())
                .ok_or_else(|| EngineError::Gpu("surface reports no formats".to_string()))?;
            let alpha_mode = caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(::wgpu::CompositeAlphaMode::Auto);

            let config = ::wgpu::SurfaceConfiguration {
                usage: ::wgpu::TextureUsages::RENDER_ATTACHMENT,
                format,
                width,
                height,
                desired_maximum_frame_latency: 2,
                present_mode: ::wgpu::PresentMode::Fifo,
                alpha_mode,
                view_formats: vec![],
            };
            surface.configure(&device, &config);

            let globals_buffer = device.create_buffer(&::wgpu::BufferDescriptor {
                label: Some("flight-globals"),
                size: std::mem::size_of::<FrameUniforms>() as u64,
                usage: ::wgpu::BufferUsages::UNIFORM | ::wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let globals_layout = device.create_bind_group_layout(&::wgpu::BindGroupLayoutDescriptor {
                label: Some("flight-globals-bgl"),
                entries: &[::wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ::wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: ::wgpu::BindingType::Buffer {
                        ty: ::wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });
            let globals_bind_group = device.create_bind_group(&::wgpu::BindGroupDescriptor {
                label: Some("flight-globals-bg"),
                layout: &globals_layout,
                entries: &[::wgpu::BindGroupEntry {
                    binding: 0,
                    resource: globals_buffer.as_entire_binding(),
                }],
            });

            let texture_entry = |binding| ::wgpu::BindGroupLayoutEntry {
                binding,
                visibility: ::wgpu::ShaderStages::FRAGMENT,
                ty: ::wgpu::BindingType::Texture {
                    sample_type: ::wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: ::wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            };
            let post_layout = device.create_bind_group_layout(&::wgpu::BindGroupLayoutDescriptor {
                label: Some("flight-post-bgl"),
                entries: &[
                    texture_entry(0),
                    texture_entry(1),
                    ::wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: ::wgpu::ShaderStages::FRAGMENT,
                        ty: ::wgpu::BindingType::Sampler(::wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });
            let sampler = device.create_sampler(&::wgpu::SamplerDescriptor {
                label: Some("flight-post-sampler"),
                address_mode_u: ::wgpu::AddressMode::ClampToEdge,
                address_mode_v: ::wgpu::AddressMode::ClampToEdge,
                mag_filter: ::wgpu::FilterMode::Linear,
                min_filter: ::wgpu::FilterMode::Linear,
                ..Default::default()
            });

            let scene_layout = device.create_pipeline_layout(&::wgpu::PipelineLayoutDescriptor {
                label: Some("flight-scene-layout"),
                bind_group_layouts: &[&globals_layout],
                immediate_size: 0,
            });
            let post_pipeline_layout =
                device.create_pipeline_layout(&::wgpu::PipelineLayoutDescriptor {
                    label: Some("flight-post-layout"),
                    bind_group_layouts: &[&globals_layout, &post_layout],
                    immediate_size: 0,
                });

            let scene_format = if plan.uses_offscreen() {
                OFFSCREEN_FORMAT
            } else {
                format
            };
            let pipelines = Self::create_pipelines(
                &device,
                &scene_layout,
                &post_pipeline_layout,
                scene_format,
                format,
            );

            let render = &engine_config.render;
            let sphere = StaticMesh::upload(
                &device,
                "flight-sphere",
                &sphere_mesh(render.globe_lat_segments, render.globe_lon_segments, 1.0),
            );
            let icon = StaticMesh::upload(&device, "flight-icon", &aircraft_icon_mesh());

            let mut renderer = Self {
                depth_view: create_depth_view(&device, width, height),
                buckets: [
                    DynamicBuffer::new(&device, "flight-icons-light"),
                    DynamicBuffer::new(&device, "flight-icons-medium"),
                    DynamicBuffer::new(&device, "flight-icons-heavy"),
                ],
                selected: DynamicBuffer::new(&device, "flight-icon-selected"),
                stems: DynamicBuffer::new(&device, "flight-stems"),
                fx_lines: DynamicBuffer::new(&device, "flight-fx-lines"),
                fx_sprites: DynamicBuffer::new(&device, "flight-fx-sprites"),
                outlines: DynamicBuffer::new(&device, "flight-outlines"),
                outlines_revision: 0,
                surface,
                queue,
                config,
                plan: plan.clone(),
                palette: render.palette(),
                star_count: render.star_count,
                outline_lift: render.outline_lift,
                outline_step_deg: render.outline_max_step_deg,
                sampler,
                post_layout,
                offscreen: None,
                globals_buffer,
                globals_bind_group,
                pipelines,
                sphere,
                icon,
                device,
                _instance: instance,
            };
            renderer.rebuild_offscreen();
            info!(width, height, ?format, bloom = plan.uses_offscreen(), "renderer ready");
            Ok(renderer)
        }

        fn create_pipelines(
            device: &::wgpu::Device,
            scene_layout: &::wgpu::PipelineLayout,
            post_layout: &::wgpu::PipelineLayout,
            scene_format: ::wgpu::TextureFormat,
            surface_format: ::wgpu::TextureFormat,
        ) -> Pipelines {
            use ::wgpu::{
                BlendState, ColorWrites, CompareFunction, PrimitiveTopology, VertexBufferLayout,
                VertexStepMode,
            };

            let stars_module = create_shader(device, "flight-stars-shader", STARS_SHADER);
            let sphere_module = create_shader(device, "flight-sphere-shader", SPHERE_SHADER);
            let lines_module = create_shader(device, "flight-lines-shader", LINES_SHADER);
            let post_module = create_shader(device, "flight-post-shader", POST_SHADER);

            let mesh_layout = VertexBufferLayout {
                array_stride: std::mem::size_of::<MeshVertex>() as ::wgpu::BufferAddress,
                step_mode: VertexStepMode::Vertex,
                attributes: &MESH_ATTRS,
            };
            let instance_layout = VertexBufferLayout {
                array_stride: std::mem::size_of::<Instance>() as ::wgpu::BufferAddress,
                step_mode: VertexStepMode::Instance,
                attributes: &INSTANCE_ATTRS,
            };
            let fx_layout = VertexBufferLayout {
                array_stride: std::mem::size_of::<FxVertex>() as ::wgpu::BufferAddress,
                step_mode: VertexStepMode::Vertex,
                attributes: &COLORED_ATTRS,
            };
            let stem_layout = VertexBufferLayout {
                array_stride: std::mem::size_of::<StemVertex>() as ::wgpu::BufferAddress,
                step_mode: VertexStepMode::Vertex,
                attributes: &COLORED_ATTRS,
            };
            let outline_layout = VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 3]>() as ::wgpu::BufferAddress,
                step_mode: VertexStepMode::Vertex,
                attributes: &POSITION_ATTRS,
            };
            let sprite_layout = VertexBufferLayout {
                array_stride: std::mem::size_of::<FxSprite>() as ::wgpu::BufferAddress,
                step_mode: VertexStepMode::Instance,
                attributes: &SPRITE_ATTRS,
            };

            let scene = |label: &'static str,
                         module: &::wgpu::ShaderModule,
                         vs: &'static str,
                         fs: &'static str,
                         buffers: &[VertexBufferLayout<'_>],
                         blend: Option<BlendState>,
                         topology: PrimitiveTopology,
                         depth: Option<(bool, CompareFunction)>| {
                create_pipeline(
                    device,
                    PipelineSpec {
                        label,
                        layout: scene_layout,
                        module,
                        vs,
                        fs,
                        buffers,
                        format: scene_format,
                        blend,
                        write_mask: ColorWrites::ALL,
                        topology,
                        depth,
                    },
                )
            };
            let overlay = |label: &'static str,
                           module: &::wgpu::ShaderModule,
                           vs: &'static str,
                           fs: &'static str,
                           buffers: &[VertexBufferLayout<'_>],
                           blend: Option<BlendState>,
                           write_mask: ColorWrites,
                           topology: PrimitiveTopology,
                           depth: Option<(bool, CompareFunction)>| {
                create_pipeline(
                    device,
                    PipelineSpec {
                        label,
                        layout: scene_layout,
                        module,
                        vs,
                        fs,
                        buffers,
                        format: surface_format,
                        blend,
                        write_mask,
                        topology,
                        depth,
                    },
                )
            };
            let post = |label: &'static str, fs: &'static str, format: ::wgpu::TextureFormat| {
                create_pipeline(
                    device,
                    PipelineSpec {
                        label,
                        layout: post_layout,
                        module: &post_module,
                        vs: "vs_main",
                        fs,
                        buffers: &[],
                        format,
                        blend: None,
                        write_mask: ColorWrites::ALL,
                        topology: PrimitiveTopology::TriangleList,
                        depth: None,
                    },
                )
            };

            let icon_buffers = [mesh_layout.clone(), instance_layout];
            Pipelines {
                stars: scene(
                    "flight-stars",
                    &stars_module,
                    "vs_main",
                    "fs_main",
                    &[],
                    Some(BlendState::ALPHA_BLENDING),
                    PrimitiveTopology::PointList,
                    Some((false, CompareFunction::Always)),
                ),
                globe: scene(
                    "flight-globe",
                    &sphere_module,
                    "vs_globe",
                    "fs_globe",
                    std::slice::from_ref(&mesh_layout),
                    Some(BlendState::REPLACE),
                    PrimitiveTopology::TriangleList,
                    Some((true, CompareFunction::Less)),
                ),
                atmosphere: scene(
                    "flight-atmosphere",
                    &sphere_module,
                    "vs_atmosphere",
                    "fs_atmosphere",
                    std::slice::from_ref(&mesh_layout),
                    Some(additive_blending()),
                    PrimitiveTopology::TriangleList,
                    Some((false, CompareFunction::Less)),
                ),
                fx_lines: scene(
                    "flight-fx-lines",
                    &lines_module,
                    "vs_line",
                    "fs_line",
                    std::slice::from_ref(&fx_layout),
                    Some(additive_blending()),
                    PrimitiveTopology::LineList,
                    Some((false, CompareFunction::LessEqual)),
                ),
                fx_sprites: scene(
                    "flight-fx-sprites",
                    &lines_module,
                    "vs_sprite",
                    "fs_sprite",
                    std::slice::from_ref(&sprite_layout),
                    Some(additive_blending()),
                    PrimitiveTopology::TriangleList,
                    Some((false, CompareFunction::LessEqual)),
                ),
                outlines: overlay(
                    "flight-outlines",
                    &lines_module,
                    "vs_outline",
                    "fs_outline",
                    std::slice::from_ref(&outline_layout),
                    Some(BlendState::ALPHA_BLENDING),
                    ColorWrites::ALL,
                    PrimitiveTopology::LineList,
                    None,
                ),
                occluder: overlay(
                    "flight-occluder",
                    &sphere_module,
                    "vs_occluder",
                    "fs_occluder",
                    std::slice::from_ref(&mesh_layout),
                    None,
                    ColorWrites::empty(),
                    PrimitiveTopology::TriangleList,
                    Some((true, CompareFunction::Less)),
                ),
                icons: overlay(
                    "flight-icons",
                    &lines_module,
                    "vs_icon",
                    "fs_icon",
                    &icon_buffers,
                    Some(BlendState::ALPHA_BLENDING),
                    ColorWrites::ALL,
                    PrimitiveTopology::TriangleList,
                    Some((true, CompareFunction::Less)),
                ),
                stems: overlay(
                    "flight-stems",
                    &lines_module,
                    "vs_line",
                    "fs_line",
                    std::slice::from_ref(&stem_layout),
                    Some(BlendState::ALPHA_BLENDING),
                    ColorWrites::ALL,
                    PrimitiveTopology::LineList,
                    Some((false, CompareFunction::LessEqual)),
                ),
                extract: post("flight-bloom-extract", "fs_extract", OFFSCREEN_FORMAT),
                blur_h: post("flight-bloom-blur-h", "fs_blur_h", OFFSCREEN_FORMAT),
                blur_v: post("flight-bloom-blur-v", "fs_blur_v", OFFSCREEN_FORMAT),
                composite: post("flight-bloom-composite", "fs_composite", surface_format),
            }
        }

        fn rebuild_offscreen(&mut self) {
            if !self.plan.uses_offscreen() {
                self.offscreen = None;
                return;
            }
            let (w, h) = (self.config.width, self.config.height);
            let scene = create_color_view(&self.device, "flight-scene-color", w, h);
            let bloom_a = create_color_view(&self.device, "flight-bloom-a", w / 2, h / 2);
            let bloom_b = create_color_view(&self.device, "flight-bloom-b", w / 2, h / 2);

            let mut bindings: Vec<(Vec<Target>, ::wgpu::BindGroup)> = Vec::new();
            for pass in self.plan.passes() {
                if pass.sources.is_empty() || bindings.iter().any(|(s, _)| *s == pass.sources) {
                    continue;
                }
                let view_of = |t: Target| match t {
                    Target::SceneColor => &scene,
                    Target::BloomA => &bloom_a,
                    Target::BloomB | Target::Surface => &bloom_b,
                };
                let first = view_of(pass.sources[0]);
                let second = pass.sources.get(1).map_or(first, |&t| view_of(t));
                let group = self.device.create_bind_group(&::wgpu::BindGroupDescriptor {
                    label: Some(pass.label),
                    layout: &self.post_layout,
                    entries: &[
                        ::wgpu::BindGroupEntry {
                            binding: 0,
                            resource: ::wgpu::BindingResource::TextureView(first),
                        },
                        ::wgpu::BindGroupEntry {
                            binding: 1,
                            resource: ::wgpu::BindingResource::TextureView(second),
                        },
                        ::wgpu::BindGroupEntry {
                            binding: 2,
                            resource: ::wgpu::BindingResource::Sampler(&self.sampler),
                        },
                    ],
                });
                bindings.push((pass.sources.clone(), group));
            }

            self.offscreen = Some(Offscreen {
                scene,
                bloom_a,
                bloom_b,
                bindings,
            });
        }

        pub fn resize(&mut self, width: u32, height: u32) {
            let (width, height) = (width.max(1), height.max(1));
            if self.config.width == width && self.config.height == height {
                return;
            }
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
            self.depth_view = create_depth_view(&self.device, width, height);
            self.rebuild_offscreen();
            debug!(width, height, "renderer resized");
        }

        fn upload_frame_data(&mut self, engine: &Engine) {
            if self.outlines_revision != engine.outlines_revision() {
                let positions = engine
                    .outlines()
                    .map(|o| o.line_list_positions(self.outline_lift, self.outline_step_deg))
                    .unwrap_or_default();
                self.outlines.upload(&self.device, &self.queue, &positions);
                self.outlines_revision = engine.outlines_revision();
                debug!(vertices = positions.len(), "outline vertices uploaded");
            }

            let instances = engine.instances();
            for class in SizeClass::ALL {
                self.buckets[class.index()].upload(
                    &self.device,
                    &self.queue,
                    instances.bucket(class).instances(),
                );
            }
            let selected: Vec<Instance> = instances.selected().map(|s| s.instance).into_iter().collect();
            self.selected.upload(&self.device, &self.queue, &selected);
            self.stems.upload(&self.device, &self.queue, instances.stems());

            let fx = engine.fx_geometry();
            self.fx_lines.upload(&self.device, &self.queue, &fx.lines);
            self.fx_sprites.upload(&self.device, &self.queue, &fx.sprites);
        }

        /// Records and submits one frame by walking the engine's pass plan.
        pub fn render(&mut self, engine: &Engine) -> Result<(), EngineError> {
            let [w, h] = engine.viewport_px();
            self.resize(w, h);
            self.upload_frame_data(engine);

            let uniforms = FrameUniforms::new(&engine.frame_inputs(), &self.palette);
            self.queue
                .write_buffer(&self.globals_buffer, 0, bytemuck::bytes_of(&uniforms));

            let frame = self
                .surface
                .get_current_texture()
                .map_err(|e| gpu_err("surface acquire", e))?;
            let surface_view = frame
                .texture
                .create_view(&::wgpu::TextureViewDescriptor::default());

            let mut encoder = self
                .device
                .create_command_encoder(&::wgpu::CommandEncoderDescriptor {
                    label: Some("flight-frame-encoder"),
                });

            for pass in self.plan.passes() {
                let target = match (pass.target, &self.offscreen) {
                    (Target::Surface, _) => &surface_view,
                    (Target::SceneColor, Some(o)) => &o.scene,
                    (Target::BloomA, Some(o)) => &o.bloom_a,
                    (Target::BloomB, Some(o)) => &o.bloom_b,
                    (_, None) => continue,
                };
                let load = match pass.color {
                    ColorOp::Clear([r, g, b, a]) => ::wgpu::LoadOp::Clear(::wgpu::Color { r, g, b, a }),
                    ColorOp::Load => ::wgpu::LoadOp::Load,
                };
                let depth_stencil_attachment = match pass.depth {
                    DepthOp::Off => None,
                    DepthOp::Clear => Some(::wgpu::RenderPassDepthStencilAttachment {
                        view: &self.depth_view,
                        depth_ops: Some(::wgpu::Operations {
                            load: ::wgpu::LoadOp::Clear(1.0),
                            store: ::wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }),
                };

                let mut rpass = encoder.begin_render_pass(&::wgpu::RenderPassDescriptor {
                    label: Some(pass.label),
                    color_attachments: &[Some(::wgpu::RenderPassColorAttachment {
                        view: target,
                        resolve_target: None,
                        depth_slice: None,
                        ops: ::wgpu::Operations {
                            load,
                            store: ::wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment,
                    occlusion_query_set: None,
                    timestamp_writes: None,
                    multiview_mask: None,
                });
                rpass.set_bind_group(0, &self.globals_bind_group, &[]);
                if !pass.sources.is_empty() {
                    let Some(group) = self.offscreen.as_ref().and_then(|o| {
                        o.bindings
                            .iter()
                            .find(|(sources, _)| *sources == pass.sources)
                            .map(|(_, g)| g)
                    }) else {
                        continue;
                    };
                    rpass.set_bind_group(1, group, &[]);
                }
                for draw in &pass.draws {
                    self.draw(&mut rpass, *draw);
                }
            }

            self.queue.submit(std::iter::once(encoder.finish()));
            frame.present();
            Ok(())
        }

        fn draw(&self, rpass: &mut ::wgpu::RenderPass<'_>, kind: DrawKind) {
            let p = &self.pipelines;
            match kind {
                DrawKind::Stars => {
                    rpass.set_pipeline(&p.stars);
                    rpass.draw(0..self.star_count, 0..1);
                }
                DrawKind::Globe => {
                    rpass.set_pipeline(&p.globe);
                    self.sphere.draw(rpass, 0..1);
                }
                DrawKind::Atmosphere => {
                    rpass.set_pipeline(&p.atmosphere);
                    self.sphere.draw(rpass, 0..1);
                }
                DrawKind::AmbientArcs => {
                    if self.fx_lines.len > 0 {
                        rpass.set_pipeline(&p.fx_lines);
                        rpass.set_vertex_buffer(0, self.fx_lines.buffer.slice(..));
                        rpass.draw(0..self.fx_lines.len, 0..1);
                    }
                }
                DrawKind::AmbientParticles => {
                    if self.fx_sprites.len > 0 {
                        rpass.set_pipeline(&p.fx_sprites);
                        rpass.set_vertex_buffer(0, self.fx_sprites.buffer.slice(..));
                        rpass.draw(0..6, 0..self.fx_sprites.len);
                    }
                }
                DrawKind::Post(effect) => {
                    rpass.set_pipeline(match effect {
                        PostEffect::BrightExtract => &p.extract,
                        PostEffect::BlurHorizontal => &p.blur_h,
                        PostEffect::BlurVertical => &p.blur_v,
                        PostEffect::Composite => &p.composite,
                    });
                    rpass.draw(0..3, 0..1);
                }
                DrawKind::Outlines => {
                    if self.outlines.len > 0 {
                        rpass.set_pipeline(&p.outlines);
                        rpass.set_vertex_buffer(0, self.outlines.buffer.slice(..));
                        rpass.draw(0..self.outlines.len, 0..1);
                    }
                }
                DrawKind::Occluder => {
                    rpass.set_pipeline(&p.occluder);
                    self.sphere.draw(rpass, 0..1);
                }
                DrawKind::Icons(class) => {
                    let bucket = &self.buckets[class.index()];
                    if bucket.len > 0 {
                        rpass.set_pipeline(&p.icons);
                        rpass.set_vertex_buffer(1, bucket.buffer.slice(..));
                        self.icon.draw(rpass, 0..bucket.len);
                    }
                }
                DrawKind::Stems => {
                    if self.stems.len > 0 {
                        rpass.set_pipeline(&p.stems);
                        rpass.set_vertex_buffer(0, self.stems.buffer.slice(..));
                        rpass.draw(0..self.stems.len, 0..1);
                    }
                }
                DrawKind::SelectedIcon => {
                    if self.selected.len > 0 {
                        rpass.set_pipeline(&p.icons);
                        rpass.set_vertex_buffer(1, self.selected.buffer.slice(..));
                        self.icon.draw(rpass, 0..self.selected.len);
                    }
                }
            }
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod imp {
    use gpu::FramePlan;

    use crate::config::EngineConfig;
    use crate::engine::{Engine, EngineError};

    #[derive(Debug, Default)]
    pub struct Renderer;

    impl Renderer {
        pub async fn new(
            _canvas: &web_sys::HtmlCanvasElement,
            _engine_config: &EngineConfig,
            _plan: &FramePlan,
        ) -> Result<Self, EngineError> {
            Err(EngineError::Gpu(
                "wgpu rendering is only available on wasm32 targets".to_string(),
            ))
        }

        pub fn resize(&mut self, _width: u32, _height: u32) {}

        pub fn render(&mut self, _engine: &Engine) -> Result<(), EngineError> {
            Ok(())
        }
    }
}

pub use imp::Renderer;
