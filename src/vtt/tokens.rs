//! Token store and drag engine.
//!
//! Tokens mirror roster entries by stable id. The only field the engine
//! mutates is the position, stored normalized (top-left corner as a fraction
//! of the unscaled stage box). Drag math happens in world space and is
//! written back normalized.

use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::vtt::grid::Grid;
use crate::vtt::roster::{Category, RosterSnapshot};
use crate::vtt::transform::{self, Point, Rect, Size};

/// Token edge length in world pixels when nothing was persisted.
pub const DEFAULT_TOKEN_SIZE: f64 = 50.0;

const FAN_OUT_MARGIN: f64 = 0.05;
const FAN_OUT_STEP_X: f64 = 0.11;
const FAN_OUT_STEP_Y: f64 = 0.12;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub id: String,
    pub category: Category,
    pub display_name: String,
    pub avatar_ref: String,
    /// Normalized top-left corner.
    pub position: Point,
    pub current_hp: Option<i64>,
    pub max_hp: Option<i64>,
    pub defeated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectMode {
    Replace,
    Toggle,
}

/// Result of reconciling the store with a roster snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Debug, Clone)]
struct DragCapture {
    pointer_start: Point,
    /// World top-left of each captured token at drag start.
    origins: Vec<(String, Point)>,
}

#[derive(Debug, Clone)]
pub struct TokenStore {
    tokens: Vec<Token>,
    selection: BTreeSet<String>,
    drag: Option<DragCapture>,
    /// Persisted positions restored before their roster entry arrived.
    parked: HashMap<String, Point>,
    active_id: Option<String>,
    /// World-pixel edge length shared by every token.
    pub token_size: f64,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self {
            tokens: Vec::new(),
            selection: BTreeSet::new(),
            drag: None,
            parked: HashMap::new(),
            active_id: None,
            token_size: DEFAULT_TOKEN_SIZE,
        }
    }
}

/// Deterministic starting spot for the `index`-th token: evenly spaced along
/// the top edge, wrapping to a new row every `per_row` tokens.
pub fn default_position(index: usize, per_row: usize) -> Point {
    let per_row = per_row.max(1);
    let col = (index % per_row) as f64;
    let row = (index / per_row) as f64;
    Point::new(
        (FAN_OUT_MARGIN + col * FAN_OUT_STEP_X).min(1.0),
        (FAN_OUT_MARGIN + row * FAN_OUT_STEP_Y).min(1.0),
    )
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn get(&self, id: &str) -> Option<&Token> {
        self.tokens.iter().find(|t| t.id == id)
    }

    pub fn selection(&self) -> &BTreeSet<String> {
        &self.selection
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selection.contains(id)
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    // ── Roster reconciliation ──────────────────────────────────────

    /// Reconcile with the roster by id. New ids take a parked position or the
    /// fan-out default; removed ids are purged from the store, the selection
    /// and any active drag. Existing tokens keep their position.
    pub fn sync(&mut self, roster: &RosterSnapshot, per_row: usize) -> SyncReport {
        let mut report = SyncReport::default();
        let mut previous: HashMap<String, Token> =
            self.tokens.drain(..).map(|t| (t.id.clone(), t)).collect();

        for (index, entry) in roster.entries.iter().enumerate() {
            let position = match previous.remove(&entry.id) {
                Some(existing) => existing.position,
                None => {
                    report.added.push(entry.id.clone());
                    self.parked
                        .remove(&entry.id)
                        .unwrap_or_else(|| default_position(index, per_row))
                }
            };
            self.tokens.push(Token {
                id: entry.id.clone(),
                category: entry.category,
                display_name: entry.name.clone(),
                avatar_ref: entry.avatar.clone(),
                position,
                current_hp: entry.current_hp,
                max_hp: entry.max_hp,
                defeated: entry.defeated,
            });
        }

        report.removed = previous.into_keys().collect();
        report.removed.sort();
        for id in &report.removed {
            self.selection.remove(id);
        }
        if let Some(drag) = self.drag.as_mut() {
            drag.origins.retain(|(id, _)| !report.removed.contains(id));
        }
        self.parked.clear();
        self.active_id = roster.active_id().map(str::to_string);

        debug!(
            added = report.added.len(),
            removed = report.removed.len(),
            total = self.tokens.len(),
            "roster synced"
        );
        report
    }

    /// Normalized positions keyed by id, as persisted. Parked positions are
    /// included so a save before the roster arrives does not drop them.
    pub fn positions(&self) -> impl Iterator<Item = (&str, Point)> {
        self.tokens
            .iter()
            .map(|t| (t.id.as_str(), t.position))
            .chain(self.parked.iter().map(|(id, pos)| (id.as_str(), *pos)))
    }

    /// Overwrite positions from a persisted bundle. Ids not in the store yet
    /// are parked until the roster delivers them.
    pub fn restore_positions<I>(&mut self, positions: I)
    where
        I: IntoIterator<Item = (String, Point)>,
    {
        self.parked.clear();
        for (id, pos) in positions {
            let pos = clamp_unit(pos);
            match self.tokens.iter_mut().find(|t| t.id == id) {
                Some(token) => token.position = pos,
                None => {
                    self.parked.insert(id, pos);
                }
            }
        }
    }

    // ── Geometry ───────────────────────────────────────────────────

    pub fn world_top_left(&self, token: &Token, viewport: Size) -> Point {
        transform::normalized_to_world(token.position, viewport)
    }

    pub fn world_center(&self, token: &Token, viewport: Size) -> Point {
        let half = self.token_size / 2.0;
        self.world_top_left(token, viewport).offset(half, half)
    }

    pub fn world_rect(&self, token: &Token, viewport: Size) -> Rect {
        let tl = self.world_top_left(token, viewport);
        Rect::new(tl.x, tl.y, self.token_size, self.token_size)
    }

    /// Topmost token (last in roster order) under `world`, among tokens
    /// accepted by `drawn`.
    pub fn hit_test<F>(&self, world: Point, viewport: Size, drawn: F) -> Option<&Token>
    where
        F: Fn(&Token) -> bool,
    {
        self.tokens
            .iter()
            .rev()
            .filter(|t| drawn(t))
            .find(|t| self.world_rect(t, viewport).contains(world))
    }

    // ── Selection ──────────────────────────────────────────────────

    /// Returns whether the selection changed. Unknown ids are ignored.
    pub fn select(&mut self, id: &str, mode: SelectMode) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        match mode {
            SelectMode::Replace => {
                // Clicking a member of a multi-selection keeps the group so it
                // can be dragged together.
                if self.selection.contains(id) {
                    return false;
                }
                self.selection.clear();
                self.selection.insert(id.to_string());
                true
            }
            SelectMode::Toggle => {
                if !self.selection.remove(id) {
                    self.selection.insert(id.to_string());
                }
                true
            }
        }
    }

    pub fn clear_selection(&mut self) -> bool {
        let changed = !self.selection.is_empty();
        self.selection.clear();
        changed
    }

    /// Select every token whose center lies inside `rect` (world space),
    /// replacing the prior selection.
    pub fn marquee_select<F>(&mut self, rect: &Rect, viewport: Size, drawn: F) -> bool
    where
        F: Fn(&Token) -> bool,
    {
        let picked: BTreeSet<String> = self
            .tokens
            .iter()
            .filter(|t| drawn(t))
            .filter(|t| rect.contains(self.world_center(t, viewport)))
            .map(|t| t.id.clone())
            .collect();
        let changed = picked != self.selection;
        self.selection = picked;
        changed
    }

    // ── Drag ───────────────────────────────────────────────────────

    /// Capture every selected token's world position and the pointer start.
    /// Returns false (and captures nothing) when the selection is empty.
    pub fn begin_drag(&mut self, pointer_world: Point, viewport: Size) -> bool {
        let origins: Vec<(String, Point)> = self
            .tokens
            .iter()
            .filter(|t| self.selection.contains(&t.id))
            .map(|t| (t.id.clone(), self.world_top_left(t, viewport)))
            .collect();
        if origins.is_empty() {
            self.drag = None;
            return false;
        }
        self.drag = Some(DragCapture {
            pointer_start: pointer_world,
            origins,
        });
        true
    }

    /// Move every captured token by the pointer's world delta since drag
    /// start, snapping (when enabled) and clamping each token to the stage.
    /// Returns the ids whose position changed.
    pub fn update_drag(
        &mut self,
        pointer_world: Point,
        viewport: Size,
        grid: &Grid,
    ) -> Vec<String> {
        let Some(drag) = self.drag.as_ref() else {
            return Vec::new();
        };
        let dx = pointer_world.x - drag.pointer_start.x;
        let dy = pointer_world.y - drag.pointer_start.y;
        let size = self.token_size;
        let max_x = (viewport.width - size).max(0.0);
        let max_y = (viewport.height - size).max(0.0);

        let targets: Vec<(String, Point)> = drag
            .origins
            .iter()
            .map(|(id, origin)| {
                let mut next = origin.offset(dx, dy);
                if grid.snap {
                    next = grid.snap(next, size);
                }
                next = Point::new(next.x.clamp(0.0, max_x), next.y.clamp(0.0, max_y));
                (id.clone(), transform::world_to_normalized(next, viewport))
            })
            .collect();

        let mut moved = Vec::new();
        for (id, normalized) in targets {
            if let Some(token) = self.tokens.iter_mut().find(|t| t.id == id) {
                if token.position != normalized {
                    token.position = normalized;
                    moved.push(id);
                }
            }
        }
        moved
    }

    /// Release the capture. Idempotent.
    pub fn end_drag(&mut self) -> bool {
        self.drag.take().is_some()
    }

    /// Ids captured by the active drag.
    pub fn dragged_ids(&self) -> Vec<&str> {
        self.drag
            .as_ref()
            .map(|d| d.origins.iter().map(|(id, _)| id.as_str()).collect())
            .unwrap_or_default()
    }
}

fn clamp_unit(p: Point) -> Point {
    let fix = |v: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
    Point::new(fix(p.x), fix(p.y))
}
