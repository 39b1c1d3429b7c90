//! Debug overlay rendered via egui on top of the tile scene.
//!
//! egui needs its own render pass, so drawing is split into phases:
//!
//!   1. `prepare()` -- run the UI, produce tessellated primitives and actions
//!   2. `upload()`  -- upload egui textures and buffers (borrows the encoder)
//!   3. `paint()`   -- draw into a pass created with `forget_lifetime()`
//!   4. `cleanup()` -- free textures egui no longer references
//!
//! Event handling stays active while hidden so F3 can bring it back.

use glam::Vec2;
use tsr_core::time::TimeState;
use winit::window::Window;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayStats {
    pub draw_calls: u32,
    pub texture_binds: u32,
    pub quad_count: u32,
    pub layer_count: u32,
    pub tiles_drawn: u32,
    pub animated_sequences: u32,
    pub map_index: usize,
    pub scroll: Vec2,
    pub level_label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayActions {
    pub reload_level: bool,
    pub reset_scroll: bool,
    pub next_map: bool,
    pub previous_map: bool,
}

impl OverlayActions {
    pub fn any(&self) -> bool {
        self.reload_level || self.reset_scroll || self.next_map || self.previous_map
    }
}

pub struct DebugOverlay {
    pub egui_ctx: egui::Context,
    pub egui_winit_state: egui_winit::State,
    pub egui_renderer: egui_wgpu::Renderer,
    pub visible: bool,
}

impl DebugOverlay {
    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        window: &Window,
    ) -> Self {
        let egui_ctx = egui::Context::default();
        let egui_winit_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui_ctx.viewport_id(),
            window,
            None,
            None,
            None,
        );
        let egui_renderer = egui_wgpu::Renderer::new(device, surface_format, None, 1, false);

        Self {
            egui_ctx,
            egui_winit_state,
            egui_renderer,
            visible: false,
        }
    }

    pub fn handle_window_event(
        &mut self,
        window: &Window,
        event: &winit::event::WindowEvent,
    ) -> bool {
        self.egui_winit_state.on_window_event(window, event).consumed
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
        log::info!("Debug overlay: {}", if self.visible { "ON" } else { "OFF" });
    }

    pub fn prepare(
        &mut self,
        window: &Window,
        time: &TimeState,
        stats: &OverlayStats,
    ) -> (
        Vec<egui::ClippedPrimitive>,
        egui::TexturesDelta,
        OverlayActions,
    ) {
        let mut actions = OverlayActions::default();
        let raw_input = self.egui_winit_state.take_egui_input(window);
        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            if !self.visible {
                return;
            }
            egui::Window::new("Tile Scene")
                .default_pos([10.0, 10.0])
                .show(ctx, |ui| {
                    ui.label(format!("FPS: {:.1}", time.smoothed_fps));
                    ui.label(format!("Frame time: {:.2} ms", time.smoothed_frame_time_ms));
                    ui.label(format!("Steps this frame: {}", time.steps_this_frame));
                    ui.label(format!("Total steps: {}", time.fixed_step_count));

                    ui.separator();
                    ui.label(format!("Draw calls: {}", stats.draw_calls));
                    ui.label(format!("Texture binds: {}", stats.texture_binds));
                    ui.label(format!("Quads: {}", stats.quad_count));
                    ui.label(format!("Tiles drawn: {}", stats.tiles_drawn));

                    ui.separator();
                    ui.label(&stats.level_label);
                    ui.label(format!("Layers: {}", stats.layer_count));
                    ui.label(format!("Sequences: {}", stats.animated_sequences));
                    ui.label(format!("Scroll: ({:.0}, {:.0})", stats.scroll.x, stats.scroll.y));
                    ui.horizontal(|ui| {
                        if ui.button("<").clicked() {
                            actions.previous_map = true;
                        }
                        ui.label(format!("Map {}", stats.map_index));
                        if ui.button(">").clicked() {
                            actions.next_map = true;
                        }
                    });

                    ui.separator();
                    ui.horizontal(|ui| {
                        if ui.button("Reload").clicked() {
                            actions.reload_level = true;
                        }
                        if ui.button("Reset scroll").clicked() {
                            actions.reset_scroll = true;
                        }
                    });
                });
        });

        self.egui_winit_state
            .handle_platform_output(window, full_output.platform_output);

        let primitives = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        (primitives, full_output.textures_delta, actions)
    }

    /// Call before creating the egui render pass.
    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        primitives: &[egui::ClippedPrimitive],
        textures_delta: &egui::TexturesDelta,
        screen_descriptor: &egui_wgpu::ScreenDescriptor,
    ) {
        for (id, image_delta) in &textures_delta.set {
            self.egui_renderer
                .update_texture(device, queue, *id, image_delta);
        }

        self.egui_renderer
            .update_buffers(device, queue, encoder, primitives, screen_descriptor);
    }

    pub fn paint(
        &self,
        render_pass: &mut wgpu::RenderPass<'static>,
        primitives: &[egui::ClippedPrimitive],
        screen_descriptor: &egui_wgpu::ScreenDescriptor,
    ) {
        self.egui_renderer
            .render(render_pass, primitives, screen_descriptor);
    }

    pub fn cleanup(&mut self, textures_delta: &egui::TexturesDelta) {
        for id in &textures_delta.free {
            self.egui_renderer.free_texture(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_report_any_request() {
        assert!(!OverlayActions::default().any());
        let actions = OverlayActions {
            next_map: true,
            ..Default::default()
        };
        assert!(actions.any());
    }
}
