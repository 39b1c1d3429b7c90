use glam::{Mat4, Vec2};
use tsr_core::Viewport;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
}

/// Pixel-space camera: (0, 0) is the top-left of the window and y grows
/// downward, matching tile map coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenCamera {
    pub size: (u32, u32),
}

impl ScreenCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::from_size(Vec2::new(self.size.0 as f32, self.size.1 as f32))
    }

    pub fn projection(&self) -> Mat4 {
        let width = self.size.0.max(1) as f32;
        let height = self.size.1.max(1) as f32;
        Mat4::orthographic_rh(0.0, width, height, 0.0, -1.0, 1.0)
    }

    pub fn build_uniform(&self) -> CameraUniform {
        CameraUniform {
            view_proj: self.projection().to_cols_array_2d(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn to_clip(camera: &ScreenCamera, point: Vec2) -> Vec2 {
        let clip = camera.projection() * Vec4::new(point.x, point.y, 0.0, 1.0);
        Vec2::new(clip.x, clip.y)
    }

    #[test]
    fn corners_map_to_clip_space_with_y_down() {
        let camera = ScreenCamera::new(640, 480);
        let top_left = to_clip(&camera, Vec2::ZERO);
        let bottom_right = to_clip(&camera, Vec2::new(640.0, 480.0));
        assert!((top_left - Vec2::new(-1.0, 1.0)).abs().max_element() < 1e-6);
        assert!((bottom_right - Vec2::new(1.0, -1.0)).abs().max_element() < 1e-6);
    }

    #[test]
    fn viewport_matches_window_size() {
        let mut camera = ScreenCamera::new(10, 20);
        camera.resize(800, 600);
        assert_eq!(camera.viewport(), Viewport::new(0.0, 0.0, 800.0, 600.0));
    }
}
