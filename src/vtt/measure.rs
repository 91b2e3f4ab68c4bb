//! Measurement tool, a transient two-point ruler in world space.

use serde::Serialize;

use crate::vtt::grid::Grid;
use crate::vtt::transform::{self, Camera, Point};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub start: Point,
    pub end: Point,
}

/// Screen-space ruler for the renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementView {
    pub from: Point,
    pub to: Point,
    pub cells: f64,
    pub units: f64,
    pub label: String,
}

impl Measurement {
    pub fn new(start: Point) -> Self {
        Self { start, end: start }
    }

    pub fn update(&mut self, end: Point) {
        self.end = end;
    }

    pub fn distance_px(&self) -> f64 {
        self.start.distance(self.end)
    }

    pub fn distance_in_cells(&self, grid: &Grid) -> f64 {
        self.distance_px() / grid.size
    }

    pub fn distance_in_units(&self, grid: &Grid, units_per_cell: f64) -> f64 {
        self.distance_in_cells(grid) * units_per_cell
    }

    /// Unit distance rounded to the nearest multiple of `units_per_cell`.
    pub fn display_units(&self, grid: &Grid, units_per_cell: f64) -> f64 {
        (self.distance_in_units(grid, units_per_cell) / units_per_cell).round() * units_per_cell
    }

    pub fn view(
        &self,
        grid: &Grid,
        camera: &Camera,
        units_per_cell: f64,
        unit_label: &str,
    ) -> MeasurementView {
        let units = self.display_units(grid, units_per_cell);
        MeasurementView {
            from: transform::world_to_screen(self.start, camera),
            to: transform::world_to_screen(self.end, camera),
            cells: self.distance_in_cells(grid),
            units,
            label: format!("{} {}", units, unit_label),
        }
    }
}
