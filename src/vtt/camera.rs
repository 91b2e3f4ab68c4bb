//! Camera controller: pan and zoom.
//!
//! Two modes entered from idle: panning (pointer drag with the pan modifier)
//! and zooming (wheel with modifier, one step per event). Zoom is anchored at
//! the pointer and always clamped to [`MIN_ZOOM`, `MAX_ZOOM`].

use crate::vtt::transform::{self, Camera, Point};

pub const MIN_ZOOM: f64 = 0.5;
pub const MAX_ZOOM: f64 = 3.0;
/// Pan is kept within `±MAX_PAN` screen pixels on each axis.
pub const MAX_PAN: f64 = 1.0e6;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Idle,
    Panning { screen_start: Point, pan_start: Point },
}

#[derive(Debug, Clone)]
pub struct CameraController {
    camera: Camera,
    mode: Mode,
}

impl Default for CameraController {
    fn default() -> Self {
        Self::new(Camera::default())
    }
}

pub fn clamp_zoom(zoom: f64) -> f64 {
    if zoom.is_finite() {
        zoom.clamp(MIN_ZOOM, MAX_ZOOM)
    } else {
        1.0
    }
}

pub fn clamp_pan(pan: f64) -> f64 {
    if pan.is_finite() {
        pan.clamp(-MAX_PAN, MAX_PAN)
    } else {
        0.0
    }
}

/// Bring a restored camera back into range.
pub fn sanitize(camera: Camera) -> Camera {
    Camera {
        pan_x: clamp_pan(camera.pan_x),
        pan_y: clamp_pan(camera.pan_y),
        zoom: clamp_zoom(camera.zoom),
    }
}

impl CameraController {
    pub fn new(camera: Camera) -> Self {
        Self {
            camera: sanitize(camera),
            mode: Mode::Idle,
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Overwrite the camera (re-hydration). Any pan in progress is dropped.
    pub fn replace(&mut self, camera: Camera) {
        self.camera = sanitize(camera);
        self.mode = Mode::Idle;
    }

    pub fn begin_pan(&mut self, screen: Point) {
        self.mode = Mode::Panning {
            screen_start: screen,
            pan_start: Point::new(self.camera.pan_x, self.camera.pan_y),
        };
    }

    /// Pan by the raw screen delta since the drag started (independent of
    /// zoom). Returns whether the camera moved.
    pub fn update_pan(&mut self, screen: Point) -> bool {
        let Mode::Panning { screen_start, pan_start } = self.mode else {
            return false;
        };
        let pan_x = clamp_pan(pan_start.x + (screen.x - screen_start.x));
        let pan_y = clamp_pan(pan_start.y + (screen.y - screen_start.y));
        let changed = pan_x != self.camera.pan_x || pan_y != self.camera.pan_y;
        self.camera.pan_x = pan_x;
        self.camera.pan_y = pan_y;
        changed
    }

    pub fn end_pan(&mut self) {
        self.mode = Mode::Idle;
    }

    /// Shift the camera by a screen delta (plain wheel scrolling).
    pub fn pan_by(&mut self, dx: f64, dy: f64) -> bool {
        let pan_x = clamp_pan(self.camera.pan_x + dx);
        let pan_y = clamp_pan(self.camera.pan_y + dy);
        let changed = pan_x != self.camera.pan_x || pan_y != self.camera.pan_y;
        self.camera.pan_x = pan_x;
        self.camera.pan_y = pan_y;
        changed
    }

    /// One zoom step in (`steps > 0`) or out, keeping the world point under
    /// `anchor` fixed. Returns whether the zoom changed.
    pub fn zoom_step(&mut self, steps: f64, step: f64, anchor: Point) -> bool {
        let new_zoom = clamp_zoom(self.camera.zoom + steps * step);
        if (new_zoom - self.camera.zoom).abs() < f64::EPSILON {
            return false;
        }
        let world = transform::screen_to_world(anchor, &self.camera);
        self.camera.zoom = new_zoom;
        self.camera.pan_x = clamp_pan(anchor.x - world.x * new_zoom);
        self.camera.pan_y = clamp_pan(anchor.y - world.y * new_zoom);
        true
    }
}
