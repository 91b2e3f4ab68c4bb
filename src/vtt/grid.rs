//! Grid model: cell geometry, snap-to-grid and overlay lines.
//!
//! Offsets are world-space so alignment with the map survives pan and zoom.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::vtt::transform::{Point, Rect};

/// Smallest accepted cell size in world pixels.
pub const MIN_CELL_SIZE: f64 = 10.0;

/// Strokes per axis beyond which the overlay is skipped.
const MAX_LINES_PER_AXIS: f64 = 10_000.0;

/// Grid settings, named as they appear in the persisted bundle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grid {
    /// Overlay visible.
    pub show: bool,
    /// Snap tokens while dragging.
    pub snap: bool,
    /// Cell size in world pixels, never below [`MIN_CELL_SIZE`].
    pub size: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub opacity: f64,
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            show: true,
            snap: false,
            size: 50.0,
            offset_x: 0.0,
            offset_y: 0.0,
            opacity: 0.35,
        }
    }
}

/// One grid square, addressed by integer column/row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Wire format used for fog keys: `"x,y"`.
impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

impl FromStr for Cell {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s.split_once(',').ok_or(())?;
        let x = x.trim().parse().map_err(|_| ())?;
        let y = y.trim().parse().map_err(|_| ())?;
        Ok(Cell::new(x, y))
    }
}

/// World-space positions of the overlay strokes.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GridLines {
    pub vertical: Vec<f64>,
    pub horizontal: Vec<f64>,
}

impl Grid {
    /// Clamp out-of-range settings into their valid ranges.
    pub fn sanitized(mut self) -> Self {
        let defaults = Grid::default();
        if !self.size.is_finite() {
            self.size = defaults.size;
        }
        self.size = self.size.max(MIN_CELL_SIZE);
        if !self.offset_x.is_finite() {
            self.offset_x = 0.0;
        }
        if !self.offset_y.is_finite() {
            self.offset_y = 0.0;
        }
        self.opacity = if self.opacity.is_finite() {
            self.opacity.clamp(0.0, 1.0)
        } else {
            defaults.opacity
        };
        self
    }

    /// Snap a token's top-left corner so its center lands on the nearest
    /// grid intersection. Idempotent.
    pub fn snap(&self, top_left: Point, token_size: f64) -> Point {
        let half = token_size / 2.0;
        let cx = snap_axis(top_left.x + half, self.offset_x, self.size);
        let cy = snap_axis(top_left.y + half, self.offset_y, self.size);
        Point::new(cx - half, cy - half)
    }

    pub fn cell_of(&self, p: Point) -> Cell {
        Cell::new(
            ((p.x - self.offset_x) / self.size).floor() as i32,
            ((p.y - self.offset_y) / self.size).floor() as i32,
        )
    }

    /// World rectangle covered by a cell.
    pub fn cell_rect(&self, cell: Cell) -> Rect {
        Rect::new(
            cell.x as f64 * self.size + self.offset_x,
            cell.y as f64 * self.size + self.offset_y,
            self.size,
            self.size,
        )
    }

    /// Overlay strokes across `visible` (world space). Recomputed on every
    /// render so resizes never show stale lines.
    pub fn lines(&self, visible: &Rect) -> GridLines {
        GridLines {
            vertical: axis_lines(self.offset_x, self.size, visible.x, visible.right()),
            horizontal: axis_lines(self.offset_y, self.size, visible.y, visible.bottom()),
        }
    }
}

fn snap_axis(center: f64, offset: f64, cell: f64) -> f64 {
    ((center - offset) / cell).round() * cell + offset
}

fn axis_lines(offset: f64, cell: f64, from: f64, to: f64) -> Vec<f64> {
    let phase = offset.rem_euclid(cell);
    let first = ((from - phase) / cell).ceil();
    let last = ((to - phase) / cell).floor();
    let count = last - first + 1.0;
    if !count.is_finite() || count < 1.0 || count > MAX_LINES_PER_AXIS {
        return Vec::new();
    }
    (0..count as u32)
        .map(|k| phase + (first + f64::from(k)) * cell)
        .collect()
}
