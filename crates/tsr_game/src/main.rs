//! Tile scene viewer -- main loop and application entry point.
//!
//! winit drives the event loop via `ApplicationHandler`. Each redraw:
//!
//!   1. `begin_frame()` -- measure wall-clock delta, feed the accumulator
//!   2. `while should_step()` -- scroll input and `TileScene::update` in fixed
//!      microsecond slices, so animated tiles advance deterministically
//!   3. Render the scene into a `QuadBatch`, stream it into GPU buffers
//!   4. Issue one draw call per texture run, composite the egui overlay
//!
//! Hot reload: the level file is polled by mtime and rebuilt at a frame
//! boundary. `R` forces a reload, PageUp/PageDown switch the map index.

mod config;
mod watcher;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use glam::{UVec2, Vec2};
use wgpu::util::DeviceExt;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use config::{load_config_or_default, EngineConfig, DEFAULT_CONFIG_PATH};
use tsr_core::input::{InputState, Key, MouseBtn};
use tsr_core::level::load_level_from_path;
use tsr_core::time::TimeState;
use tsr_core::DirectorySource;
use tsr_devtools::{DebugOverlay, OverlayStats};
use tsr_render::{
    BatchTexture, GpuContext, GpuTexture, ImageTextureCache, QuadBatch, ScreenCamera,
    TilePipeline, TileVertex,
};
use tsr_tiles::{AtlasCache, PrimitiveArena, TileScene};
use watcher::FileWatcher;

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.05,
    g: 0.06,
    b: 0.09,
    a: 1.0,
};

struct GpuTileTexture {
    texture: GpuTexture,
    bind_group: wgpu::BindGroup,
}

/// A loaded level together with the caches it was built from. Replaced as a
/// whole on reload so texture ids and primitive ids never go stale.
struct LevelContent {
    textures: ImageTextureCache<DirectorySource>,
    atlases: AtlasCache,
    scene: TileScene,
    label: String,
}

fn load_level_content(config: &EngineConfig, map_index: usize) -> LevelContent {
    let source = DirectorySource::new(".");
    let mut textures = ImageTextureCache::new(source, config.pad_textures_to_power_of_two);
    let mut atlases = AtlasCache::new(PrimitiveArena::new(config.primitive_capacity))
        .with_debug_fallback(config.debug_untextured_tiles);
    let mut scene = TileScene::new();

    let mut label = match load_level_from_path(&config.level_path) {
        Ok(document) => {
            scene.read_scene(
                &document.root(),
                &document.base_dir(),
                map_index,
                &mut textures,
                &mut atlases,
            );
            format!("Level: {}", config.level_path.display())
        }
        Err(err) => {
            log::error!("Level load failed: {err}");
            String::new()
        }
    };

    if scene.is_empty() {
        let fallback = &config.default_tileset;
        log::warn!("Scene is empty, showing default tileset '{}'", fallback.texture);
        match scene.generate_default_tileset(
            &fallback.texture,
            UVec2::new(fallback.tile_width, fallback.tile_height),
            fallback.tile_count,
            &mut textures,
            &mut atlases,
        ) {
            Ok(_) => label = format!("Default tileset: {}", fallback.texture),
            Err(err) => {
                log::error!("{err}");
                label = "No level loaded".to_string();
            }
        }
    }

    LevelContent {
        textures,
        atlases,
        scene,
        label,
    }
}

/// All mutable engine state. Constructed in `ApplicationHandler::resumed` once
/// the window and GPU surface exist.
struct EngineState {
    window: Arc<Window>,
    gpu: GpuContext,
    time: TimeState,
    input: InputState,
    camera: ScreenCamera,
    pipeline: TilePipeline,
    debug_overlay: DebugOverlay,

    // --- Hot-reloadable content -------------------------------------------------
    config: EngineConfig,
    level_watcher: FileWatcher,
    map_index: usize,
    content: LevelContent,
    scroll: Vec2,
    textures: HashMap<BatchTexture, GpuTileTexture>,

    // --- Per-frame GPU mesh state -----------------------------------------------
    // Buffers grow (power-of-two) but never shrink.
    batch: QuadBatch,
    tiles_drawn: usize,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    mesh_vertex_capacity: usize,
    mesh_index_capacity: usize,
}

impl EngineState {
    fn new(window: Arc<Window>, config: EngineConfig) -> Result<Self, String> {
        let gpu = GpuContext::new(window.clone(), config.window.vsync)?;
        let pipeline = TilePipeline::new(&gpu.device, gpu.surface_format);
        let debug_overlay = DebugOverlay::new(&gpu.device, gpu.surface_format, &window);
        let camera = ScreenCamera::new(gpu.size.0, gpu.size.1);

        let camera_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Camera Uniform Buffer"),
                contents: bytemuck::cast_slice(&[camera.build_uniform()]),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        let camera_bind_group = pipeline.create_camera_bind_group(&gpu.device, &camera_buffer);
        let vertex_buffer = create_vertex_buffer(&gpu.device, 1);
        let index_buffer = create_index_buffer(&gpu.device, 1);

        let map_index = config.map_index;
        let level_watcher = FileWatcher::new(config.level_path.clone());
        let content = load_level_content(&config, map_index);

        let mut state = Self {
            window,
            gpu,
            time: TimeState::new(),
            input: InputState::new(),
            camera,
            pipeline,
            debug_overlay,
            config,
            level_watcher,
            map_index,
            content,
            scroll: Vec2::ZERO,
            textures: HashMap::new(),
            batch: QuadBatch::new(),
            tiles_drawn: 0,
            vertex_buffer,
            index_buffer,
            camera_buffer,
            camera_bind_group,
            mesh_vertex_capacity: 0,
            mesh_index_capacity: 0,
        };
        state.ensure_white_texture()?;
        state.upload_pending_textures();
        state.ensure_mesh_capacity(4, 6);
        Ok(state)
    }

    fn reload_level(&mut self, reason: &str) {
        self.content.scene.clear(&mut self.content.atlases);
        self.content = load_level_content(&self.config, self.map_index);
        self.level_watcher.mark_seen();
        self.textures
            .retain(|key, _| matches!(key, BatchTexture::White));
        self.upload_pending_textures();
        log::info!(
            "Level {} reloaded ({reason}): {} layers, map {}",
            self.level_watcher.path().display(),
            self.content.scene.len(),
            self.map_index
        );
    }

    fn upload_pending_textures(&mut self) {
        for image in self.content.textures.take_pending_uploads() {
            let (width, height) = image.rgba.dimensions();
            match GpuTexture::from_rgba8(
                &self.gpu.device,
                &self.gpu.queue,
                image.rgba.as_raw(),
                width,
                height,
                &image.name,
            ) {
                Ok(texture) => {
                    let bind_group = self
                        .pipeline
                        .create_texture_bind_group(&self.gpu.device, &texture);
                    self.textures.insert(
                        BatchTexture::Atlas(image.id),
                        GpuTileTexture {
                            texture,
                            bind_group,
                        },
                    );
                }
                Err(err) => log::error!("Texture upload failed: {err}"),
            }
        }
    }

    fn ensure_white_texture(&mut self) -> Result<(), String> {
        if self.textures.contains_key(&BatchTexture::White) {
            return Ok(());
        }
        let texture = GpuTexture::from_rgba8(
            &self.gpu.device,
            &self.gpu.queue,
            &[255, 255, 255, 255],
            1,
            1,
            "outline_white",
        )?;
        let bind_group = self
            .pipeline
            .create_texture_bind_group(&self.gpu.device, &texture);
        self.textures.insert(
            BatchTexture::White,
            GpuTileTexture {
                texture,
                bind_group,
            },
        );
        Ok(())
    }

    fn change_map(&mut self, step: isize) {
        self.map_index = cycle_map_index(self.map_index, step);
        self.scroll = Vec2::ZERO;
        self.reload_level("map change");
    }

    fn estimate_memory_mb(&self) -> f32 {
        let mut bytes: usize = self.textures.values().map(|t| t.texture.byte_size()).sum();
        bytes += self.mesh_vertex_capacity * std::mem::size_of::<TileVertex>();
        bytes += self.mesh_index_capacity * std::mem::size_of::<u32>();
        bytes as f32 / (1024.0 * 1024.0)
    }

    /// Draw the scene into the batch and stream it to the GPU.
    fn rebuild_mesh(&mut self) {
        self.batch.clear();
        let viewport = self.camera.viewport();
        self.tiles_drawn = self.content.scene.render(
            &mut self.scroll,
            &viewport,
            self.content.atlases.primitives(),
            &mut self.batch,
        );
        log::trace!(
            "Frame mesh: {} tiles, {} quads, {} draw calls",
            self.tiles_drawn,
            self.batch.quad_count(),
            self.batch.draw_calls().len()
        );

        let vertex_count = self.batch.vertices().len();
        let index_count = self.batch.indices().len();
        self.ensure_mesh_capacity(vertex_count, index_count);
        if vertex_count > 0 {
            self.gpu.queue.write_buffer(
                &self.vertex_buffer,
                0,
                bytemuck::cast_slice(self.batch.vertices()),
            );
        }
        if index_count > 0 {
            self.gpu.queue.write_buffer(
                &self.index_buffer,
                0,
                bytemuck::cast_slice(self.batch.indices()),
            );
        }
    }

    fn ensure_mesh_capacity(&mut self, vertex_count: usize, index_count: usize) {
        let needed_vertices = vertex_count.max(1);
        if needed_vertices > self.mesh_vertex_capacity {
            self.mesh_vertex_capacity = needed_vertices.next_power_of_two();
            self.vertex_buffer = create_vertex_buffer(&self.gpu.device, self.mesh_vertex_capacity);
        }

        let needed_indices = index_count.max(1);
        if needed_indices > self.mesh_index_capacity {
            self.mesh_index_capacity = needed_indices.next_power_of_two();
            self.index_buffer = create_index_buffer(&self.gpu.device, self.mesh_index_capacity);
        }
    }

    fn overlay_stats(&self) -> OverlayStats {
        OverlayStats {
            draw_calls: self.batch.draw_calls().len() as u32,
            texture_binds: self.batch.texture_binds() as u32,
            quad_count: self.batch.quad_count() as u32,
            layer_count: self.content.scene.len() as u32,
            tiles_drawn: self.tiles_drawn as u32,
            animated_sequences: self.content.scene.sequence_count() as u32,
            map_index: self.map_index,
            scroll: self.scroll,
            level_label: format!("{} ({:.1} MB)", self.content.label, self.estimate_memory_mb()),
        }
    }

    /// One redraw: fixed steps, mesh rebuild, scene pass, overlay pass.
    /// Returns false when the app should exit.
    fn frame(&mut self) -> bool {
        self.time.begin_frame();

        while self.time.should_step() {
            if self.input.is_just_pressed(Key::Escape) {
                return false;
            }
            if self.time.steps_this_frame == 1 {
                if self.input.is_just_pressed(Key::F3) {
                    self.debug_overlay.toggle();
                }
                if self.input.is_just_pressed(Key::R) {
                    self.reload_level("manual trigger (R)");
                } else if self.input.is_just_pressed(Key::PageUp) {
                    self.change_map(1);
                } else if self.input.is_just_pressed(Key::PageDown) {
                    self.change_map(-1);
                } else if self.level_watcher.should_reload() {
                    self.reload_level("file watcher");
                }
                if self.input.is_just_pressed(Key::Home) {
                    self.scroll = Vec2::ZERO;
                }
                if self.input.is_mouse_held(MouseBtn::Left) {
                    let (dx, dy) = self.input.mouse_delta();
                    self.scroll += Vec2::new(dx as f32, dy as f32);
                }
            }

            self.scroll = keyboard_scroll(
                self.scroll,
                &self.input,
                self.config.scroll_speed,
                self.time.fixed_dt_secs(),
            );
            self.content.scene.update(self.time.fixed_dt_us);
        }

        self.rebuild_mesh();
        self.draw();

        // Edges are cleared only after a fixed step consumed them.
        if self.time.steps_this_frame > 0 {
            self.input.end_frame();
        }
        true
    }

    fn draw(&mut self) {
        self.gpu.queue.write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::cast_slice(&[self.camera.build_uniform()]),
        );

        let Some((output, view)) = self.gpu.begin_frame() else {
            return;
        };

        let stats = self.overlay_stats();
        let (egui_primitives, egui_textures_delta, actions) =
            self.debug_overlay.prepare(&self.window, &self.time, &stats);

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.gpu.size.0, self.gpu.size.1],
            pixels_per_point: self.window.scale_factor() as f32,
        };

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Tile Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                ..Default::default()
            });

            render_pass.set_pipeline(&self.pipeline.render_pipeline);
            render_pass.set_bind_group(0, &self.camera_bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);

            let mut last_bound: Option<BatchTexture> = None;
            for draw in self.batch.draw_calls() {
                let Some(texture) = self.textures.get(&draw.texture) else {
                    continue;
                };
                if last_bound != Some(draw.texture) {
                    render_pass.set_bind_group(1, &texture.bind_group, &[]);
                    last_bound = Some(draw.texture);
                }
                render_pass.draw_indexed(
                    draw.index_start..(draw.index_start + draw.index_count),
                    0,
                    0..1,
                );
            }
        }

        self.debug_overlay.upload(
            &self.gpu.device,
            &self.gpu.queue,
            &mut encoder,
            &egui_primitives,
            &egui_textures_delta,
            &screen_descriptor,
        );

        {
            let mut egui_pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("egui Render Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    ..Default::default()
                })
                .forget_lifetime();

            self.debug_overlay
                .paint(&mut egui_pass, &egui_primitives, &screen_descriptor);
        }

        self.debug_overlay.cleanup(&egui_textures_delta);
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        // Overlay buttons take effect from the next frame.
        if actions.reset_scroll {
            self.scroll = Vec2::ZERO;
        }
        if actions.next_map {
            self.change_map(1);
        } else if actions.previous_map {
            self.change_map(-1);
        } else if actions.reload_level {
            self.reload_level("overlay");
        }
    }
}

struct App {
    config: EngineConfig,
    state: Option<EngineState>,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        let platform = self.config.platform_config();
        let started = tsr_platform::window::create_window(event_loop, &platform)
            .and_then(|window| EngineState::new(window, self.config.clone()));
        match started {
            Ok(state) => self.state = Some(state),
            Err(err) => {
                log::error!("Startup failed: {err}");
                event_loop.exit();
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        let egui_consumed = state
            .debug_overlay
            .handle_window_event(&state.window, &event);

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting.");
                event_loop.exit();
            }

            WindowEvent::Resized(physical_size) => {
                let w = physical_size.width;
                let h = physical_size.height;
                if w > 0 && h > 0 {
                    state.gpu.resize(w, h);
                    state.camera.resize(w, h);
                    log::info!("Resized to {}x{}", w, h);
                }
            }

            WindowEvent::KeyboardInput { event, .. } if !egui_consumed => {
                if let PhysicalKey::Code(key_code) = event.physical_key {
                    if let Some(engine_key) = map_key(key_code) {
                        match event.state {
                            ElementState::Pressed => state.input.key_down(engine_key),
                            ElementState::Released => state.input.key_up(engine_key),
                        }
                    }
                }
            }

            WindowEvent::MouseInput {
                state: button_state,
                button,
                ..
            } => {
                let Some(btn) = map_mouse_button(button) else {
                    return;
                };
                match button_state {
                    ElementState::Pressed if !egui_consumed => state.input.mouse_down(btn),
                    ElementState::Released => state.input.mouse_up(btn),
                    ElementState::Pressed => {}
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                state.input.mouse_moved(position.x, position.y);
            }

            WindowEvent::RedrawRequested => {
                if state.gpu.size.0 == 0 || state.gpu.size.1 == 0 {
                    return;
                }
                if !state.frame() {
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }
}

fn create_vertex_buffer(device: &wgpu::Device, vertex_capacity: usize) -> wgpu::Buffer {
    let byte_len = (vertex_capacity * std::mem::size_of::<TileVertex>()).max(1) as u64;
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Tile Vertex Buffer"),
        size: byte_len,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_index_buffer(device: &wgpu::Device, index_capacity: usize) -> wgpu::Buffer {
    let byte_len = (index_capacity * std::mem::size_of::<u32>()).max(1) as u64;
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Tile Index Buffer"),
        size: byte_len,
        usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Arrow keys / WASD move the view; the scroll offset moves the other way.
fn keyboard_scroll(scroll: Vec2, input: &InputState, speed: f32, dt_secs: f32) -> Vec2 {
    let direction = Vec2::new(
        input.axis(&[Key::Left, Key::A], &[Key::Right, Key::D]),
        input.axis(&[Key::Up, Key::W], &[Key::Down, Key::S]),
    );
    scroll - direction * speed * dt_secs
}

fn cycle_map_index(current: usize, step: isize) -> usize {
    current.saturating_add_signed(step)
}

fn map_key(key_code: KeyCode) -> Option<Key> {
    match key_code {
        KeyCode::ArrowLeft => Some(Key::Left),
        KeyCode::ArrowRight => Some(Key::Right),
        KeyCode::ArrowUp => Some(Key::Up),
        KeyCode::ArrowDown => Some(Key::Down),
        KeyCode::KeyW => Some(Key::W),
        KeyCode::KeyA => Some(Key::A),
        KeyCode::KeyS => Some(Key::S),
        KeyCode::KeyD => Some(Key::D),
        KeyCode::Escape => Some(Key::Escape),
        KeyCode::F3 => Some(Key::F3),
        KeyCode::KeyR => Some(Key::R),
        KeyCode::Home => Some(Key::Home),
        KeyCode::PageUp => Some(Key::PageUp),
        KeyCode::PageDown => Some(Key::PageDown),
        _ => None,
    }
}

fn map_mouse_button(button: MouseButton) -> Option<MouseBtn> {
    match button {
        MouseButton::Left => Some(MouseBtn::Left),
        MouseButton::Right => Some(MouseBtn::Right),
        MouseButton::Middle => Some(MouseBtn::Middle),
        _ => None,
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Tile scene viewer starting...");
    let config = load_config_or_default(Path::new(DEFAULT_CONFIG_PATH));

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            log::error!("Failed to create event loop: {err}");
            return;
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    if let Err(err) = event_loop.run_app(&mut app) {
        log::error!("Event loop error: {err}");
    }
}
