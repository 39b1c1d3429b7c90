use glam::Vec2;

/// Screen-space rectangle a scene is drawn into. `position` is where the
/// top-left corner of a fully scrolled-back map lands; `size` is the visible
/// extent in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub position: Vec2,
    pub size: Vec2,
}

impl Viewport {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            position: Vec2::new(x, y),
            size: Vec2::new(width, height),
        }
    }

    pub fn from_size(size: Vec2) -> Self {
        Self {
            position: Vec2::ZERO,
            size,
        }
    }

    /// True when nothing can be drawn (either extent is zero or negative).
    pub fn is_empty(&self) -> bool {
        self.size.x <= 0.0 || self.size.y <= 0.0
    }

    pub fn max(&self) -> Vec2 {
        self.position + self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_extent_is_empty() {
        assert!(Viewport::new(0.0, 0.0, 0.0, 480.0).is_empty());
        assert!(Viewport::default().is_empty());
        assert!(!Viewport::from_size(Vec2::new(640.0, 480.0)).is_empty());
    }

    #[test]
    fn max_is_far_corner() {
        let vp = Viewport::new(10.0, 20.0, 100.0, 50.0);
        assert_eq!(vp.max(), Vec2::new(110.0, 70.0));
    }
}
