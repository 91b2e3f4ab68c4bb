//! Fog-of-war with sticky per-cell reveal tracking.
//!
//! Darkness is global. Visibility is an explicit allow-list of grid cells
//! that only grows while fog is active: once a friendly token has been near a
//! cell it stays revealed until the DM explicitly re-covers the map with
//! [`FogState::reset_coverage`]. Hostile tokens never feed the reveal set.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;

use crate::vtt::grid::{Cell, Grid};
use crate::vtt::transform::{self, Camera, Point, Rect, Size};

/// Largest reveal radius accepted from a bundle or a settings change.
pub const MAX_RADIUS_IN_CELLS: u32 = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FogState {
    pub enabled: bool,
    /// DM override: everything visible regardless of the reveal set.
    pub reveal_all: bool,
    /// Reveal radius around each friendly token, within `1..=MAX_RADIUS_IN_CELLS`.
    pub radius_in_cells: u32,
    pub opacity: f64,
    #[serde(serialize_with = "serialize_cells")]
    pub revealed_cells: BTreeSet<Cell>,
}

impl Default for FogState {
    fn default() -> Self {
        Self {
            enabled: false,
            reveal_all: false,
            radius_in_cells: 3,
            opacity: 0.85,
            revealed_cells: BTreeSet::new(),
        }
    }
}

/// What the renderer should draw over the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FogMask {
    /// Fog disabled: draw nothing.
    None,
    /// Reveal-all: a fully transparent mask.
    Clear,
    /// Opaque darkness over the viewport with transparent holes (screen space).
    Cover { opacity: f64, holes: Vec<Rect> },
}

impl FogState {
    /// Fog is being tracked and drawn.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.reveal_all
    }

    pub fn is_revealed(&self, cell: Cell) -> bool {
        !self.is_active() || self.revealed_cells.contains(&cell)
    }

    /// Mark every cell within `radius` (circular footprint, boundary
    /// inclusive) of the cell containing `world` as revealed. Returns the
    /// number of newly revealed cells.
    pub fn reveal_around(&mut self, world: Point, radius: u32, grid: &Grid) -> usize {
        let center = grid.cell_of(world);
        let before = self.revealed_cells.len();
        self.revealed_cells.extend(cells_in_radius(center, radius));
        self.revealed_cells.len() - before
    }

    /// Re-cover the whole map. Flags are left untouched.
    pub fn reset_coverage(&mut self) {
        self.revealed_cells.clear();
    }

    pub fn sanitized(mut self) -> Self {
        self.radius_in_cells = clamp_radius(self.radius_in_cells);
        self.opacity = if self.opacity.is_finite() {
            self.opacity.clamp(0.0, 1.0)
        } else {
            FogState::default().opacity
        };
        self
    }

    /// Darkness over the full viewport with a transparent hole for every
    /// revealed cell that is on screen.
    pub fn composite_mask(
        &self,
        viewport: Size,
        camera: &Camera,
        grid: &Grid,
        opacity: f64,
    ) -> FogMask {
        if !self.enabled {
            return FogMask::None;
        }
        if self.reveal_all {
            return FogMask::Clear;
        }
        let visible = transform::visible_world_rect(viewport, camera);
        let holes = self
            .revealed_cells
            .iter()
            .map(|&cell| grid.cell_rect(cell))
            .filter(|rect| rect.intersects(&visible))
            .map(|rect| transform::world_rect_to_screen(&rect, camera))
            .collect();
        FogMask::Cover { opacity, holes }
    }
}

pub fn clamp_radius(radius: u32) -> u32 {
    radius.clamp(1, MAX_RADIUS_IN_CELLS)
}

/// Cells with `dx² + dy² ≤ r²` around `center`. The radius is capped at
/// [`MAX_RADIUS_IN_CELLS`]; cells that would fall outside `i32` are skipped.
pub fn cells_in_radius(center: Cell, radius: u32) -> impl Iterator<Item = Cell> {
    let r = i64::from(radius.min(MAX_RADIUS_IN_CELLS));
    let r2 = r * r;
    (-r..=r).flat_map(move |dy| {
        (-r..=r)
            .filter(move |dx| dx * dx + dy * dy <= r2)
            .filter_map(move |dx| {
                let x = i32::try_from(i64::from(center.x) + dx).ok()?;
                let y = i32::try_from(i64::from(center.y) + dy).ok()?;
                Some(Cell::new(x, y))
            })
    })
}

/// `{"x,y": true, ...}`
fn serialize_cells<S>(cells: &BTreeSet<Cell>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(cells.len()))?;
    for cell in cells {
        map.serialize_entry(&cell.to_string(), &true)?;
    }
    map.end()
}

/// Read the `revealedCells` wire map. Keys that do not parse, or whose value
/// is not `true`, are skipped.
pub fn cells_from_wire(value: &serde_json::Value) -> BTreeSet<Cell> {
    let Some(obj) = value.as_object() else {
        return BTreeSet::new();
    };
    obj.iter()
        .filter(|(_, v)| v.as_bool() == Some(true))
        .filter_map(|(k, _)| k.parse::<Cell>().ok())
        .collect()
}
