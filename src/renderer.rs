// renderer.rs: draws the scene graph (spheres, marker lines, sprites) and the egui overlay

use crate::mesh::{build_line, build_quad, build_sphere, MeshData, Vertex};
use glam::{Mat4, Quat, Vec3};
use image::RgbaImage;
use panorama_tour::camera::PerspectiveCamera;
use panorama_tour::scene::{NodeId, NodeKind, Scene};
use std::collections::HashMap;
use wgpu::util::DeviceExt;
use winit::window::Window;

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct DrawUniform {
    mvp: [[f32; 4]; 4],
    tint: [f32; 4],
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

impl GpuMesh {
    fn upload(device: &wgpu::Device, label: &str, mesh: &MeshData) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
        }
    }
}

/// Uniform buffer + bind group of one scene node.
struct DrawSlot {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Layer {
    Sphere,
    Line,
    Sprite,
}

struct DrawItem {
    id: NodeId,
    layer: Layer,
    texture: Option<String>,
}

pub struct Renderer {
    surface: wgpu::Surface,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    pub size: winit::dpi::PhysicalSize<u32>,

    mesh_pipeline: wgpu::RenderPipeline,
    line_pipeline: wgpu::RenderPipeline,
    draw_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,

    sphere_mesh: GpuMesh,
    quad_mesh: GpuMesh,
    lines: HashMap<NodeId, wgpu::Buffer>,
    slots: HashMap<NodeId, DrawSlot>,
    textures: HashMap<String, wgpu::BindGroup>,
    // nodes whose image has not arrived (or failed) draw with this
    blank_texture: wgpu::BindGroup,

    // UI
    pub egui_ctx: egui::Context,
    pub egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
}

impl Renderer {
    pub async fn new(window: std::sync::Arc<Window>) -> anyhow::Result<Self> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = unsafe { instance.create_surface(window.as_ref()) }?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow::anyhow!("no GPU adapter"))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    features: wgpu::Features::empty(),
                    limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                    label: None,
                },
                None,
            )
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::Repeat, // panoramas wrap horizontally
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let draw_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
            label: Some("draw_bind_group_layout"),
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
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
            label: Some("texture_bind_group_layout"),
        });

        let shader = device.create_shader_module(wgpu::include_wgsl!("shader_scene.wgsl"));
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&draw_layout, &texture_layout],
            push_constant_ranges: &[],
        });
        let mesh_pipeline = create_pipeline(
            &device,
            &pipeline_layout,
            &shader,
            config.format,
            wgpu::PrimitiveTopology::TriangleList,
        );
        let line_pipeline = create_pipeline(
            &device,
            &pipeline_layout,
            &shader,
            config.format,
            wgpu::PrimitiveTopology::LineList,
        );

        let sphere_mesh = GpuMesh::upload(&device, "sphere_mesh", &build_sphere(1.0, 40, 60));
        let quad_mesh = GpuMesh::upload(&device, "sprite_quad", &build_quad());

        let blank = RgbaImage::from_pixel(1, 1, image::Rgba([255, 255, 255, 255]));
        let blank_texture = create_texture_bind_group(&device, &queue, &texture_layout, &sampler, &blank, "blank");

        let egui_ctx = egui::Context::default();
        let mut egui_state = egui_winit::State::new(window.as_ref());
        egui_state.set_pixels_per_point(window.scale_factor() as f32);
        let egui_renderer = egui_wgpu::Renderer::new(&device, config.format, None, 1);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            size,
            mesh_pipeline,
            line_pipeline,
            draw_layout,
            texture_layout,
            sampler,
            sphere_mesh,
            quad_mesh,
            lines: HashMap::new(),
            slots: HashMap::new(),
            textures: HashMap::new(),
            blank_texture,
            egui_ctx,
            egui_state,
            egui_renderer,
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    pub fn has_texture(&self, src: &str) -> bool {
        self.textures.contains_key(src)
    }

    /// Uploads a decoded image for every node that references `src`.
    pub fn upload_texture(&mut self, src: &str, img: RgbaImage) {
        let max = self.device.limits().max_texture_dimension_2d;
        let (w, h) = img.dimensions();

        let img = if w > max || h > max {
            let scale = max as f32 / w.max(h) as f32;
            let (nw, nh) = ((w as f32 * scale) as u32, (h as f32 * scale) as u32);
            log::warn!("{src} is {w}x{h}, over the GPU limit {max}; scaled to {nw}x{nh}");
            image::DynamicImage::ImageRgba8(img)
                .resize(nw, nh, image::imageops::FilterType::Lanczos3)
                .to_rgba8()
        } else {
            img
        };

        let bind_group =
            create_texture_bind_group(&self.device, &self.queue, &self.texture_layout, &self.sampler, &img, src);
        self.textures.insert(src.to_string(), bind_group);
    }

    /// Updates per-node uniforms and returns the nodes to draw, back to front
    /// by layer.
    fn prepare(&mut self, scene: &Scene, camera: &PerspectiveCamera) -> Vec<DrawItem> {
        self.slots.retain(|id, _| scene.contains(*id));
        self.lines.retain(|id, _| scene.contains(*id));

        let view_proj = camera.view_projection();
        let mut items = Vec::new();

        for (id, node) in scene.iter() {
            if !node.visible || node.opacity <= 0.0 {
                continue;
            }

            let (layer, model, tint) = match &node.kind {
                NodeKind::Sphere { radius, .. } => (
                    Layer::Sphere,
                    Mat4::from_scale_rotation_translation(node.scale * *radius, Quat::IDENTITY, node.position),
                    [1.0, 1.0, 1.0, node.opacity],
                ),
                NodeKind::Sprite { .. } => (
                    Layer::Sprite,
                    // billboard: always faces the camera
                    Mat4::from_scale_rotation_translation(
                        Vec3::new(node.scale.x, node.scale.y, 1.0),
                        camera.orientation,
                        node.position,
                    ),
                    [1.0, 1.0, 1.0, node.opacity],
                ),
                NodeKind::Line { from, to, color } => {
                    if !self.lines.contains_key(&id) {
                        let vertices = build_line(from.to_array(), to.to_array());
                        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some("marker_line"),
                            contents: bytemuck::cast_slice(&vertices),
                            usage: wgpu::BufferUsages::VERTEX,
                        });
                        self.lines.insert(id, buffer);
                    }
                    (
                        Layer::Line,
                        Mat4::IDENTITY,
                        [color[0], color[1], color[2], color[3] * node.opacity],
                    )
                }
            };

            let uniform = DrawUniform {
                mvp: (view_proj * model).to_cols_array_2d(),
                tint,
            };
            match self.slots.get(&id) {
                Some(slot) => self
                    .queue
                    .write_buffer(&slot.buffer, 0, bytemuck::cast_slice(&[uniform])),
                None => {
                    let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("draw_uniform"),
                        contents: bytemuck::cast_slice(&[uniform]),
                        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    });
                    let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                        layout: &self.draw_layout,
                        entries: &[wgpu::BindGroupEntry {
                            binding: 0,
                            resource: buffer.as_entire_binding(),
                        }],
                        label: Some("draw_bind_group"),
                    });
                    self.slots.insert(id, DrawSlot { buffer, bind_group });
                }
            }

            items.push(DrawItem {
                id,
                layer,
                texture: node.texture().map(str::to_string),
            });
        }

        // stable: keeps scene order inside a layer
        items.sort_by_key(|item| item.layer);
        items
    }

    pub fn render_with_ui(
        &mut self,
        window: &Window,
        scene: &Scene,
        camera: &PerspectiveCamera,
        run_ui: impl FnOnce(&egui::Context),
    ) -> Result<(), wgpu::SurfaceError> {
        let items = self.prepare(scene, camera);

        let output = self.surface.get_current_texture()?;
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });

        // 1. Scene
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });

            for item in &items {
                let Some(slot) = self.slots.get(&item.id) else {
                    continue;
                };
                let texture = item
                    .texture
                    .as_deref()
                    .and_then(|src| self.textures.get(src))
                    .unwrap_or(&self.blank_texture);

                render_pass.set_bind_group(0, &slot.bind_group, &[]);
                render_pass.set_bind_group(1, texture, &[]);

                match item.layer {
                    Layer::Sphere | Layer::Sprite => {
                        let mesh = if item.layer == Layer::Sphere {
                            &self.sphere_mesh
                        } else {
                            &self.quad_mesh
                        };
                        render_pass.set_pipeline(&self.mesh_pipeline);
                        render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                        render_pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                        render_pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                    }
                    Layer::Line => {
                        let Some(buffer) = self.lines.get(&item.id) else {
                            continue;
                        };
                        render_pass.set_pipeline(&self.line_pipeline);
                        render_pass.set_vertex_buffer(0, buffer.slice(..));
                        render_pass.draw(0..2, 0..1);
                    }
                }
            }
        }

        // 2. UI
        let raw_input = self.egui_state.take_egui_input(window);
        let full_output = self.egui_ctx.run(raw_input, run_ui);

        self.egui_state
            .handle_platform_output(window, &self.egui_ctx, full_output.platform_output);
        let clipped_primitives = self.egui_ctx.tessellate(full_output.shapes);

        let screen_descriptor = egui_wgpu::renderer::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: window.scale_factor() as f32,
        };

        for (id, delta) in &full_output.textures_delta.set {
            self.egui_renderer
                .update_texture(&self.device, &self.queue, *id, delta);
        }

        let ui_commands = self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            &mut encoder,
            &clipped_primitives,
            &screen_descriptor,
        );

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Egui Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });
            self.egui_renderer
                .render(&mut render_pass, &clipped_primitives, &screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }

        self.queue
            .submit(ui_commands.into_iter().chain(std::iter::once(encoder.finish())));
        output.present();

        Ok(())
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    topology: wgpu::PrimitiveTopology,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Scene Pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: "vs_main",
            buffers: &[Vertex::layout()],
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: "fs_main",
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None, // spheres are seen from inside, sprites from either side
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        // drawn in layer order, no depth buffer
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
    })
}

fn create_texture_bind_group(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    img: &RgbaImage,
    label: &str,
) -> wgpu::BindGroup {
    let (width, height) = img.dimensions();
    let texture_size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        size: texture_size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        label: Some(label),
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        img,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        texture_size,
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
        label: Some(label),
    })
}
