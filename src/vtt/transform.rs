//! Coordinate spaces shared by the battle map, tokens and overlays.
//!
//! - **Screen**: stage-local pixels as delivered by pointer events.
//! - **World**: the unscaled stage box; map image and tokens live here.
//! - **Normalized**: world divided by the unscaled stage size. Token
//!   positions are stored this way so layouts survive resizes and fullscreen
//!   toggles; screen positions are always recomputed from them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn distance(self, other: Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_empty(self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Axis-aligned rectangle. Width and height are never negative.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle spanning two corners given in any order (marquee drags can
    /// go up and to the left).
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Edges inclusive.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// Pan/zoom state. `pan` is a screen-pixel offset, `zoom` a scale factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Camera {
    pub pan_x: f64,
    pub pan_y: f64,
    pub zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            pan_x: 0.0,
            pan_y: 0.0,
            zoom: 1.0,
        }
    }
}

pub fn screen_to_world(p: Point, camera: &Camera) -> Point {
    Point::new(
        (p.x - camera.pan_x) / camera.zoom,
        (p.y - camera.pan_y) / camera.zoom,
    )
}

pub fn world_to_screen(p: Point, camera: &Camera) -> Point {
    Point::new(
        p.x * camera.zoom + camera.pan_x,
        p.y * camera.zoom + camera.pan_y,
    )
}

/// `viewport` is the unscaled stage box. A zero dimension maps to 0 rather
/// than producing NaN.
pub fn world_to_normalized(p: Point, viewport: Size) -> Point {
    Point::new(safe_div(p.x, viewport.width), safe_div(p.y, viewport.height))
}

pub fn normalized_to_world(p: Point, viewport: Size) -> Point {
    Point::new(p.x * viewport.width, p.y * viewport.height)
}

pub fn world_rect_to_screen(r: &Rect, camera: &Camera) -> Rect {
    let origin = world_to_screen(Point::new(r.x, r.y), camera);
    Rect::new(origin.x, origin.y, r.width * camera.zoom, r.height * camera.zoom)
}

/// The part of world space currently on screen.
pub fn visible_world_rect(viewport: Size, camera: &Camera) -> Rect {
    let top_left = screen_to_world(Point::new(0.0, 0.0), camera);
    let bottom_right = screen_to_world(Point::new(viewport.width, viewport.height), camera);
    Rect::from_corners(top_left, bottom_right)
}

fn safe_div(n: f64, d: f64) -> f64 {
    if d > 0.0 { n / d } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn close(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < EPS && (a.y - b.y).abs() < EPS
    }

    #[test]
    fn screen_world_roundtrip() {
        let cameras = [
            Camera::default(),
            Camera { pan_x: 120.5, pan_y: -33.0, zoom: 2.25 },
            Camera { pan_x: -800.0, pan_y: 410.0, zoom: 0.5 },
            Camera { pan_x: 3.0, pan_y: 7.0, zoom: 3.0 },
        ];
        let points = [
            Point::new(0.0, 0.0),
            Point::new(103.0, 68.0),
            Point::new(-45.5, 999.25),
        ];
        for cam in &cameras {
            for &p in &points {
                let back = screen_to_world(world_to_screen(p, cam), cam);
                assert!(close(back, p), "{:?} via {:?} gave {:?}", p, cam, back);
            }
        }
    }

    #[test]
    fn normalized_position_survives_resize() {
        let cam = Camera::default();
        let stored = world_to_normalized(Point::new(400.0, 300.0), Size::new(800.0, 600.0));
        assert!(close(stored, Point::new(0.5, 0.5)));

        let resized = Size::new(1200.0, 900.0);
        let screen = world_to_screen(normalized_to_world(stored, resized), &cam);
        assert!(close(screen, Point::new(600.0, 450.0)));
    }

    #[test]
    fn zero_viewport_normalizes_to_origin() {
        let p = world_to_normalized(Point::new(50.0, 50.0), Size::new(0.0, 0.0));
        assert_eq!(p, Point::new(0.0, 0.0));
    }

    #[test]
    fn rect_from_corners_any_direction() {
        let r = Rect::from_corners(Point::new(100.0, 80.0), Point::new(20.0, 10.0));
        assert_eq!(r, Rect::new(20.0, 10.0, 80.0, 70.0));
        assert!(r.contains(Point::new(20.0, 10.0)));
        assert!(r.contains(Point::new(100.0, 80.0)));
        assert!(!r.contains(Point::new(100.1, 80.0)));
    }

    #[test]
    fn visible_rect_accounts_for_pan_and_zoom() {
        let cam = Camera { pan_x: -100.0, pan_y: -50.0, zoom: 2.0 };
        let r = visible_world_rect(Size::new(800.0, 600.0), &cam);
        assert!((r.x - 50.0).abs() < EPS);
        assert!((r.y - 25.0).abs() < EPS);
        assert!((r.width - 400.0).abs() < EPS);
        assert!((r.height - 300.0).abs() < EPS);
    }
}
