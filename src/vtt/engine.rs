//! Engine context: one object owning every piece of VTT state.
//!
//! All mutation goes through methods that return a list of [`Effect`]s for
//! the host to carry out (write storage, redraw, change the cursor, show a
//! warning). The engine itself never touches storage or the DOM.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

use crate::vtt::bundle::SceneBundle;
use crate::vtt::camera::CameraController;
use crate::vtt::config::EngineConfig;
use crate::vtt::error::VttError;
use crate::vtt::fog::{self, FogState};
use crate::vtt::grid::Grid;
use crate::vtt::input::{
    Gesture, HostApi, InputEvent, Interaction, KeyEvent, PointerEvent, WheelEvent, choose_gesture,
};
use crate::vtt::map::{MapAsset, MapBundle};
use crate::vtt::measure::Measurement;
use crate::vtt::roster::{Category, RosterSnapshot};
use crate::vtt::tokens::{SelectMode, Token, TokenStore};
use crate::vtt::transform::{self, Point, Size};
use crate::vtt::visibility::{self, TokenVisibility, ViewRole, VisibilityFlags};

/// Stage size assumed until the host reports the real one.
pub const DEFAULT_VIEWPORT: Size = Size::new(800.0, 600.0);

/// CSS cursor the host should show over the stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cursor {
    #[default]
    Default,
    Grab,
    Grabbing,
    Crosshair,
    Move,
}

/// Work for the host, in the order it should be applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    Warning { message: String },
    PersistMap { bundle: MapBundle },
    PersistScene { bundle: SceneBundle },
    SelectionChanged { ids: Vec<String> },
    Cursor { cursor: Cursor },
    Render,
}

/// Partial grid settings update; absent fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GridUpdate {
    pub show: Option<bool>,
    pub snap: Option<bool>,
    pub size: Option<f64>,
    pub offset_x: Option<f64>,
    pub offset_y: Option<f64>,
    pub opacity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FogCommand {
    Enable,
    Disable,
    RevealAll { enabled: bool },
    /// Re-cover the map, then reveal around the party again.
    Cover,
    /// Clear the reveal set only.
    Reset,
    Refresh,
    Radius { cells: u32 },
    Opacity { value: f64 },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum VisibilityCommand {
    ToggleToken { id: String },
    HideCategory { hidden: bool },
}

#[derive(Debug, Default)]
struct Changes {
    persist_scene: bool,
    persist_map: bool,
    render: bool,
    warnings: Vec<String>,
}

impl Changes {
    fn persist(&mut self) {
        self.persist_scene = true;
        self.render = true;
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    viewport: Size,
    camera: CameraController,
    grid: Grid,
    tokens: TokenStore,
    fog: FogState,
    flags: VisibilityFlags,
    map: Option<MapAsset>,
    measure_mode: bool,
    interaction: Interaction,
    space_held: bool,
    fullscreen: bool,
    /// Last cursor reported to the host.
    cursor: Cursor,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            viewport: DEFAULT_VIEWPORT,
            camera: CameraController::default(),
            grid: Grid::default(),
            tokens: TokenStore::new(),
            fog: FogState::default(),
            flags: VisibilityFlags::default(),
            map: None,
            measure_mode: false,
            interaction: Interaction::Idle,
            space_held: false,
            fullscreen: false,
            cursor: Cursor::Default,
        }
    }

    // ── Accessors ──────────────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    pub fn camera(&self) -> &transform::Camera {
        self.camera.camera()
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn fog(&self) -> &FogState {
        &self.fog
    }

    pub fn flags(&self) -> &VisibilityFlags {
        &self.flags
    }

    pub fn map(&self) -> Option<&MapAsset> {
        self.map.as_ref()
    }

    pub fn measure_mode(&self) -> bool {
        self.measure_mode
    }

    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn role(&self) -> ViewRole {
        if self.config.player_view {
            ViewRole::Player
        } else {
            ViewRole::Dm
        }
    }

    pub fn visibility_of(&self, token: &Token) -> TokenVisibility {
        visibility::resolve_visibility(
            token,
            &self.tokens,
            self.viewport,
            &self.flags,
            &self.fog,
            &self.grid,
        )
    }

    pub fn is_drawn(&self, token: &Token) -> bool {
        self.visibility_of(token).is_drawn(self.role())
    }

    /// Cursor for the current state.
    pub fn cursor(&self) -> Cursor {
        match self.interaction {
            Interaction::Panning { .. } => Cursor::Grabbing,
            Interaction::Dragging { .. } => Cursor::Move,
            Interaction::MarqueeSelecting { .. } | Interaction::Measuring { .. } => {
                Cursor::Crosshair
            }
            Interaction::Idle if self.measure_mode => Cursor::Crosshair,
            Interaction::Idle if self.space_held => Cursor::Grab,
            Interaction::Idle => Cursor::Default,
        }
    }

    /// The scene as it should be persisted right now.
    pub fn bundle(&self) -> SceneBundle {
        SceneBundle {
            camera: *self.camera.camera(),
            token_positions: self
                .tokens
                .positions()
                .map(|(id, pos)| (id.to_string(), pos))
                .collect(),
            token_size: self.tokens.token_size,
            grid: self.grid,
            fog: self.fog.clone(),
            hidden_token_ids: self.flags.hidden_token_ids.clone(),
            hide_all_of_category: self.flags.hide_all_of_category,
        }
    }

    pub fn map_bundle(&self) -> MapBundle {
        MapAsset::bundle(self.map.as_ref())
    }

    // ── Effect plumbing ────────────────────────────────────────────

    /// Run a mutation and translate what it touched into effects.
    fn commit<F>(&mut self, f: F) -> Vec<Effect>
    where
        F: FnOnce(&mut Self, &mut Changes),
    {
        let selection_before = self.selected_ids();
        let mut changes = Changes::default();
        f(self, &mut changes);

        let mut effects: Vec<Effect> = changes
            .warnings
            .into_iter()
            .map(|message| Effect::Warning { message })
            .collect();
        let mut render = changes.render;

        if changes.persist_map {
            effects.push(Effect::PersistMap {
                bundle: self.map_bundle(),
            });
            render = true;
        }
        if changes.persist_scene {
            effects.push(Effect::PersistScene {
                bundle: self.bundle(),
            });
        }
        if *self.tokens.selection() != selection_before {
            effects.push(Effect::SelectionChanged {
                ids: self.tokens.selection().iter().cloned().collect(),
            });
            render = true;
        }
        let cursor = self.cursor();
        if cursor != self.cursor {
            self.cursor = cursor;
            effects.push(Effect::Cursor { cursor });
        }
        if render {
            effects.push(Effect::Render);
        }
        effects
    }

    // ── Input ──────────────────────────────────────────────────────

    pub fn handle_input(&mut self, event: InputEvent) -> Vec<Effect> {
        self.commit(|engine, changes| match event {
            InputEvent::PointerDown(ev) => engine.pointer_down(&ev, changes),
            InputEvent::PointerMove(ev) => engine.pointer_move(&ev, changes),
            InputEvent::PointerUp(ev) => engine.pointer_up(ev.pointer_id, changes),
            InputEvent::PointerCancel { pointer_id } => {
                if engine.interaction.pointer_id() == Some(pointer_id) {
                    engine.end_gesture(changes);
                }
            }
            InputEvent::Wheel(ev) => engine.wheel(&ev, changes),
            InputEvent::KeyDown(ev) => engine.key_down(&ev, changes),
            InputEvent::KeyUp(ev) => {
                if ev.is_space() {
                    engine.space_held = false;
                }
            }
            InputEvent::Resize { viewport } => engine.resize(viewport, changes),
            InputEvent::FullscreenChanged { active, viewport } => {
                info!(active, "fullscreen changed");
                engine.fullscreen = active;
                engine.resize(viewport, changes);
                changes.render = true;
            }
            InputEvent::HostRejected { api, reason } => {
                warn!(?api, %reason, "host API rejected");
                let message = match api {
                    HostApi::Fullscreen => {
                        format!("Fullscreen is not available ({reason}). Continuing in the window.")
                    }
                    HostApi::PointerCapture => {
                        format!("Pointer capture was refused ({reason}). Dragging continues without it.")
                    }
                };
                if api == HostApi::Fullscreen {
                    engine.fullscreen = false;
                }
                changes.warn(message);
            }
        })
    }

    fn token_at(&self, world: Point) -> Option<&Token> {
        self.tokens.hit_test(world, self.viewport, |t| self.is_drawn(t))
    }

    fn pointer_down(&mut self, ev: &PointerEvent, changes: &mut Changes) {
        if !self.interaction.is_idle() {
            debug!(
                pointer_id = ev.pointer_id,
                state = self.interaction.name(),
                "ignoring pointer down during active gesture"
            );
            return;
        }
        let screen = ev.screen();
        if !screen.is_finite() {
            return;
        }
        let world = transform::screen_to_world(screen, self.camera.camera());
        let hit = self.token_at(world).map(|t| t.id.clone());
        let pointer_id = ev.pointer_id;

        match choose_gesture(self.measure_mode, self.space_held, ev, hit.as_deref()) {
            Gesture::Measure => {
                self.interaction = Interaction::Measuring {
                    pointer_id,
                    measurement: Measurement::new(world),
                };
                changes.render = true;
            }
            Gesture::Marquee => {
                self.interaction = Interaction::MarqueeSelecting {
                    pointer_id,
                    start: world,
                    current: world,
                };
                changes.render = true;
            }
            Gesture::Pan => {
                self.camera.begin_pan(screen);
                self.interaction = Interaction::Panning { pointer_id };
            }
            Gesture::Token { id, toggle } => {
                let mode = if toggle {
                    SelectMode::Toggle
                } else {
                    SelectMode::Replace
                };
                self.tokens.select(&id, mode);
                if self.tokens.is_selected(&id) && self.tokens.begin_drag(world, self.viewport) {
                    self.interaction = Interaction::Dragging { pointer_id };
                }
                changes.render = true;
            }
            Gesture::ClearSelection => {
                self.tokens.clear_selection();
            }
            Gesture::Ignore => {}
        }

        if !self.interaction.is_idle() {
            debug!(pointer_id, state = self.interaction.name(), "gesture started");
        }
    }

    fn pointer_move(&mut self, ev: &PointerEvent, changes: &mut Changes) {
        if self.interaction.pointer_id() != Some(ev.pointer_id) {
            return;
        }
        let screen = ev.screen();
        if !screen.is_finite() {
            return;
        }
        let world = transform::screen_to_world(screen, self.camera.camera());

        match self.interaction {
            Interaction::Panning { .. } => {
                if self.camera.update_pan(screen) {
                    changes.persist();
                }
            }
            Interaction::MarqueeSelecting { ref mut current, .. } => {
                *current = world;
                changes.render = true;
            }
            Interaction::Dragging { .. } => self.drag_to(world, changes),
            Interaction::Measuring {
                ref mut measurement,
                ..
            } => {
                measurement.update(world);
                changes.render = true;
            }
            Interaction::Idle => {}
        }
    }

    fn drag_to(&mut self, world: Point, changes: &mut Changes) {
        let moved = self.tokens.update_drag(world, self.viewport, &self.grid);
        if moved.is_empty() {
            return;
        }
        changes.persist();
        let revealed = self.reveal_friendly(&moved);
        if revealed > 0 {
            debug!(revealed, "fog revealed by drag");
        }
    }

    fn pointer_up(&mut self, pointer_id: i32, changes: &mut Changes) {
        if self.interaction.pointer_id() != Some(pointer_id) {
            return;
        }
        if let Some(rect) = self.interaction.marquee_rect() {
            let drawn: HashSet<String> = self
                .tokens
                .tokens()
                .iter()
                .filter(|t| self.is_drawn(t))
                .map(|t| t.id.clone())
                .collect();
            self.tokens
                .marquee_select(&rect, self.viewport, |t| drawn.contains(&t.id));
        }
        self.end_gesture(changes);
    }

    /// Back to idle, discarding transient state. Positions already written by
    /// a drag stay where they are.
    fn end_gesture(&mut self, changes: &mut Changes) {
        let previous = std::mem::replace(&mut self.interaction, Interaction::Idle);
        match previous {
            Interaction::Idle => return,
            Interaction::Panning { .. } => self.camera.end_pan(),
            Interaction::Dragging { .. } => {
                self.tokens.end_drag();
            }
            Interaction::MarqueeSelecting { .. } | Interaction::Measuring { .. } => {}
        }
        debug!(state = previous.name(), "gesture ended");
        changes.render = true;
    }

    fn wheel(&mut self, ev: &WheelEvent, changes: &mut Changes) {
        if !self.interaction.is_idle() || !ev.delta_x.is_finite() || !ev.delta_y.is_finite() {
            return;
        }
        let changed = if ev.modifiers.command() {
            if ev.delta_y == 0.0 {
                false
            } else {
                let steps = if ev.delta_y < 0.0 { 1.0 } else { -1.0 };
                self.camera
                    .zoom_step(steps, self.config.zoom_step, Point::new(ev.x, ev.y))
            }
        } else {
            self.camera.pan_by(-ev.delta_x, -ev.delta_y)
        };
        if changed {
            changes.persist();
        }
    }

    fn key_down(&mut self, ev: &KeyEvent, changes: &mut Changes) {
        if ev.is_space() {
            self.space_held = true;
        } else if ev.is_escape() {
            self.end_gesture(changes);
        }
    }

    fn resize(&mut self, viewport: Size, changes: &mut Changes) {
        if !viewport.width.is_finite() || !viewport.height.is_finite() || viewport.is_empty() {
            warn!(
                width = viewport.width,
                height = viewport.height,
                "ignoring unusable viewport size"
            );
            return;
        }
        if viewport == self.viewport {
            return;
        }
        // Drag origins were captured against the old stage size.
        if matches!(self.interaction, Interaction::Dragging { .. }) {
            self.end_gesture(changes);
        }
        self.viewport = viewport;
        debug!(width = viewport.width, height = viewport.height, "viewport resized");
        if self.refresh_fog() > 0 {
            changes.persist();
        }
        changes.render = true;
    }

    // ── Fog helpers ────────────────────────────────────────────────

    /// Reveal around the listed tokens that are friendly. Returns the number
    /// of newly revealed cells; does nothing while fog is disabled.
    fn reveal_friendly(&mut self, ids: &[String]) -> usize {
        if !self.fog.enabled {
            return 0;
        }
        let radius = self.fog.radius_in_cells;
        let mut revealed = 0;
        for id in ids {
            let Some(token) = self.tokens.get(id) else {
                continue;
            };
            if token.category != Category::Friendly {
                continue;
            }
            let center = self.tokens.world_center(token, self.viewport);
            revealed += self.fog.reveal_around(center, radius, &self.grid);
        }
        revealed
    }

    /// Reveal around every friendly token.
    fn refresh_fog(&mut self) -> usize {
        let ids: Vec<String> = self.tokens.tokens().iter().map(|t| t.id.clone()).collect();
        self.reveal_friendly(&ids)
    }

    // ── Host commands ──────────────────────────────────────────────

    /// Reconcile tokens with the latest roster.
    pub fn sync_roster(&mut self, roster: &RosterSnapshot) -> Vec<Effect> {
        self.commit(|engine, changes| {
            let report = engine.tokens.sync(roster, engine.config.tokens_per_row);
            engine.flags.purge(&report.removed);
            if matches!(engine.interaction, Interaction::Dragging { .. })
                && engine.tokens.dragged_ids().is_empty()
            {
                engine.end_gesture(changes);
            }
            engine.reveal_friendly(&report.added);
            if report.added.is_empty() && report.removed.is_empty() {
                changes.render = true;
            } else {
                info!(
                    added = report.added.len(),
                    removed = report.removed.len(),
                    "roster changed"
                );
                changes.persist();
            }
        })
    }

    /// Overwrite local state with a persisted bundle (boot, or another tab
    /// wrote storage). Never emits a persist effect. Blank input boots the
    /// default scene; unreadable input does too, with a warning.
    pub fn rehydrate(&mut self, json: &str) -> Vec<Effect> {
        self.commit(|engine, changes| {
            let bundle = if json.trim().is_empty() {
                SceneBundle::default()
            } else {
                match SceneBundle::from_json(json) {
                    Ok(bundle) => bundle,
                    Err(e) => {
                        warn!(error = %e, "unreadable scene bundle, using defaults");
                        changes.warn("The saved scene could not be read. Starting from a blank scene.");
                        SceneBundle::default()
                    }
                }
            };
            engine.end_gesture(changes);
            engine.apply_bundle(bundle);
            changes.render = true;
            info!("scene rehydrated");
        })
    }

    fn apply_bundle(&mut self, bundle: SceneBundle) {
        let bundle = bundle.sanitized();
        self.camera.replace(bundle.camera);
        self.tokens.token_size = bundle.token_size;
        self.tokens.restore_positions(bundle.token_positions);
        self.grid = bundle.grid;
        self.fog = bundle.fog;
        self.flags = VisibilityFlags {
            hidden_token_ids: bundle.hidden_token_ids,
            hide_all_of_category: bundle.hide_all_of_category,
        };
    }

    pub fn set_measure_mode(&mut self, on: bool) -> Vec<Effect> {
        self.commit(|engine, changes| {
            if engine.measure_mode == on {
                return;
            }
            engine.end_gesture(changes);
            engine.measure_mode = on;
            changes.render = true;
            info!(on, "measure mode");
        })
    }

    pub fn update_grid(&mut self, update: GridUpdate) -> Vec<Effect> {
        self.commit(|engine, changes| {
            let before = engine.grid;
            let mut grid = before;
            if let Some(v) = update.show {
                grid.show = v;
            }
            if let Some(v) = update.snap {
                grid.snap = v;
            }
            if let Some(v) = update.size {
                grid.size = v;
            }
            if let Some(v) = update.offset_x {
                grid.offset_x = v;
            }
            if let Some(v) = update.offset_y {
                grid.offset_y = v;
            }
            if let Some(v) = update.opacity {
                grid.opacity = v;
            }
            let grid = grid.sanitized();
            if grid == before {
                return;
            }
            engine.grid = grid;
            let geometry_changed = grid.size != before.size
                || grid.offset_x != before.offset_x
                || grid.offset_y != before.offset_y;
            if geometry_changed {
                engine.refresh_fog();
            }
            debug!(size = grid.size, snap = grid.snap, show = grid.show, "grid updated");
            changes.persist();
        })
    }

    pub fn fog_command(&mut self, command: FogCommand) -> Vec<Effect> {
        self.commit(|engine, changes| {
            debug!(?command, "fog command");
            let fog = &mut engine.fog;
            match command {
                FogCommand::Enable => {
                    if fog.enabled {
                        return;
                    }
                    fog.enabled = true;
                    engine.refresh_fog();
                }
                FogCommand::Disable => {
                    if !fog.enabled {
                        return;
                    }
                    fog.enabled = false;
                }
                FogCommand::RevealAll { enabled } => {
                    if fog.reveal_all == enabled {
                        return;
                    }
                    fog.reveal_all = enabled;
                    if !enabled {
                        engine.refresh_fog();
                    }
                }
                FogCommand::Cover => {
                    fog.reveal_all = false;
                    fog.reset_coverage();
                    engine.refresh_fog();
                }
                FogCommand::Reset => fog.reset_coverage(),
                FogCommand::Refresh => {
                    if engine.refresh_fog() == 0 {
                        changes.render = true;
                        return;
                    }
                }
                FogCommand::Radius { cells } => {
                    fog.radius_in_cells = fog::clamp_radius(cells);
                    engine.refresh_fog();
                }
                FogCommand::Opacity { value } => {
                    if !value.is_finite() {
                        return;
                    }
                    fog.opacity = value.clamp(0.0, 1.0);
                }
            }
            changes.persist();
        })
    }

    pub fn visibility_command(&mut self, command: VisibilityCommand) -> Vec<Effect> {
        self.commit(|engine, changes| match command {
            VisibilityCommand::ToggleToken { id } => {
                if engine.tokens.get(&id).is_none() {
                    debug!(%id, "visibility toggle for unknown token ignored");
                    return;
                }
                let hidden = engine.flags.toggle_token(&id);
                info!(%id, hidden, "token visibility toggled");
                changes.persist();
            }
            VisibilityCommand::HideCategory { hidden } => {
                if engine.flags.hide_all_of_category == hidden {
                    return;
                }
                engine.flags.hide_all_of_category = hidden;
                info!(hidden, "hostile tokens visibility changed");
                changes.persist();
            }
        })
    }

    /// Replace (or clear, with `None`) the map image. Oversized or malformed
    /// images are rejected before anything is written.
    pub fn set_map(&mut self, reference: Option<&str>) -> Result<Vec<Effect>, VttError> {
        let asset = match reference.map(str::trim).filter(|r| !r.is_empty()) {
            Some(r) => Some(MapAsset::parse(r, self.config.map_byte_budget)?),
            None => None,
        };
        Ok(self.commit(|engine, changes| {
            engine.map = asset;
            changes.persist_map = true;
        }))
    }

    /// Load the persisted map bundle without writing it back.
    pub fn rehydrate_map(&mut self, bundle: MapBundle) -> Vec<Effect> {
        self.commit(|engine, changes| {
            engine.map = match bundle.image.as_deref().map(str::trim) {
                None | Some("") => None,
                Some(reference) => match MapAsset::parse(reference, engine.config.map_byte_budget) {
                    Ok(asset) => {
                        debug!(
                            mime = asset.mime().unwrap_or("url"),
                            bytes = ?asset.byte_len(),
                            "stored map loaded"
                        );
                        Some(asset)
                    }
                    Err(e) => {
                        warn!(error = %e, "stored map rejected");
                        changes.warn(format!("The saved map could not be loaded: {e}"));
                        None
                    }
                },
            };
            changes.render = true;
        })
    }

    pub fn set_config(&mut self, config: EngineConfig) -> Result<Vec<Effect>, VttError> {
        config.validate()?;
        Ok(self.commit(|engine, changes| {
            info!(player_view = config.player_view, "engine configured");
            engine.config = config;
            changes.render = true;
        }))
    }

    /// Ids currently selected, in id order.
    pub fn selected_ids(&self) -> BTreeSet<String> {
        self.tokens.selection().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vtt::grid::Cell;
    use crate::vtt::input::{Button, Modifiers};
    use crate::vtt::roster::RosterEntry;
    use serde_json::json;

    const VP: Size = Size::new(1000.0, 800.0);

    fn entry(id: &str, category: Category) -> RosterEntry {
        RosterEntry {
            id: id.to_string(),
            name: id.to_string(),
            category,
            avatar: String::new(),
            current_hp: Some(10),
            max_hp: Some(10),
            defeated: false,
        }
    }

    fn roster(entries: &[(&str, Category)]) -> RosterSnapshot {
        RosterSnapshot {
            entries: entries.iter().map(|(id, c)| entry(id, *c)).collect(),
            active_turn: None,
        }
    }

    /// hero at (100, 80), ally at (300, 80), orc at (500, 400); identity camera.
    fn engine() -> Engine {
        let mut engine = Engine::default();
        engine.handle_input(InputEvent::Resize { viewport: VP });
        engine.sync_roster(&roster(&[
            ("hero", Category::Friendly),
            ("ally", Category::Friendly),
            ("orc", Category::Hostile),
        ]));
        engine.rehydrate(
            &json!({
                "tokenPositions": {
                    "hero": {"x": 0.1, "y": 0.1},
                    "ally": {"x": 0.3, "y": 0.1},
                    "orc": {"x": 0.5, "y": 0.5}
                }
            })
            .to_string(),
        );
        engine
    }

    fn pointer(pointer_id: i32, x: f64, y: f64) -> PointerEvent {
        PointerEvent {
            pointer_id,
            x,
            y,
            button: Button::Primary,
            modifiers: Modifiers::default(),
        }
    }

    fn with_mods(mut ev: PointerEvent, modifiers: Modifiers) -> PointerEvent {
        ev.modifiers = modifiers;
        ev
    }

    fn down(engine: &mut Engine, ev: PointerEvent) -> Vec<Effect> {
        engine.handle_input(InputEvent::PointerDown(ev))
    }

    fn move_to(engine: &mut Engine, ev: PointerEvent) -> Vec<Effect> {
        engine.handle_input(InputEvent::PointerMove(ev))
    }

    fn up(engine: &mut Engine, ev: PointerEvent) -> Vec<Effect> {
        engine.handle_input(InputEvent::PointerUp(ev))
    }

    fn key(engine: &mut Engine, key: &str, pressed: bool) -> Vec<Effect> {
        let ev = KeyEvent {
            key: key.to_string(),
            modifiers: Modifiers::default(),
        };
        if pressed {
            engine.handle_input(InputEvent::KeyDown(ev))
        } else {
            engine.handle_input(InputEvent::KeyUp(ev))
        }
    }

    fn persisted(effects: &[Effect]) -> Option<&SceneBundle> {
        effects.iter().find_map(|e| match e {
            Effect::PersistScene { bundle } => Some(bundle),
            _ => None,
        })
    }

    fn top_left(engine: &Engine, id: &str) -> Point {
        let token = engine.tokens().get(id).unwrap();
        engine.tokens().world_top_left(token, engine.viewport())
    }

    fn assert_near(a: Point, b: Point) {
        assert!((a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9, "{a:?} != {b:?}");
    }

    #[test]
    fn drag_moves_token_and_persists() {
        let mut engine = engine();
        let effects = down(&mut engine, pointer(1, 110.0, 90.0));
        assert!(matches!(engine.interaction(), Interaction::Dragging { pointer_id: 1 }));
        assert!(effects.contains(&Effect::SelectionChanged { ids: vec!["hero".to_string()] }));
        assert!(effects.contains(&Effect::Cursor { cursor: Cursor::Move }));

        let effects = move_to(&mut engine, pointer(1, 160.0, 140.0));
        let bundle = persisted(&effects).expect("drag persists");
        assert_near(bundle.token_positions["hero"], Point::new(0.15, 0.1625));
        assert!(effects.contains(&Effect::Render));

        let effects = up(&mut engine, pointer(1, 160.0, 140.0));
        assert!(engine.interaction().is_idle());
        assert!(persisted(&effects).is_none());
        assert!(effects.contains(&Effect::Cursor { cursor: Cursor::Default }));
        assert_near(top_left(&engine, "hero"), Point::new(150.0, 130.0));
    }

    #[test]
    fn ctrl_click_builds_group_and_drags_together() {
        let mut engine = engine();
        down(&mut engine, pointer(1, 110.0, 90.0));
        up(&mut engine, pointer(1, 110.0, 90.0));
        let ctrl = Modifiers { ctrl: true, ..Modifiers::default() };
        down(&mut engine, with_mods(pointer(1, 310.0, 90.0), ctrl));
        assert_eq!(engine.selected_ids().len(), 2);

        move_to(&mut engine, pointer(1, 330.0, 150.0));
        up(&mut engine, pointer(1, 330.0, 150.0));
        assert_near(top_left(&engine, "hero"), Point::new(120.0, 140.0));
        assert_near(top_left(&engine, "ally"), Point::new(320.0, 140.0));
    }

    #[test]
    fn ctrl_click_on_selected_token_deselects_without_dragging() {
        let mut engine = engine();
        down(&mut engine, pointer(1, 110.0, 90.0));
        up(&mut engine, pointer(1, 110.0, 90.0));
        let meta = Modifiers { meta: true, ..Modifiers::default() };
        down(&mut engine, with_mods(pointer(1, 110.0, 90.0), meta));
        assert!(engine.selected_ids().is_empty());
        assert!(engine.interaction().is_idle());
    }

    #[test]
    fn click_on_empty_space_clears_selection() {
        let mut engine = engine();
        down(&mut engine, pointer(1, 110.0, 90.0));
        up(&mut engine, pointer(1, 110.0, 90.0));
        let effects = down(&mut engine, pointer(1, 900.0, 700.0));
        assert!(engine.selected_ids().is_empty());
        assert!(effects.contains(&Effect::SelectionChanged { ids: vec![] }));
        assert!(engine.interaction().is_idle());
    }

    #[test]
    fn marquee_applies_on_release_only() {
        let mut engine = engine();
        let shift = Modifiers { shift: true, ..Modifiers::default() };
        down(&mut engine, with_mods(pointer(1, 420.0, 120.0), shift));
        let effects = move_to(&mut engine, pointer(1, 90.0, 60.0));
        assert!(engine.selected_ids().is_empty());
        assert!(!effects.iter().any(|e| matches!(e, Effect::SelectionChanged { .. })));

        let effects = up(&mut engine, pointer(1, 90.0, 60.0));
        let ids: Vec<String> = engine.selected_ids().into_iter().collect();
        assert_eq!(ids, vec!["ally".to_string(), "hero".to_string()]);
        assert!(effects.iter().any(|e| matches!(e, Effect::SelectionChanged { .. })));
    }

    #[test]
    fn cancelled_marquee_selects_nothing() {
        let mut engine = engine();
        let shift = Modifiers { shift: true, ..Modifiers::default() };
        down(&mut engine, with_mods(pointer(4, 0.0, 0.0), shift));
        move_to(&mut engine, pointer(4, 999.0, 799.0));
        engine.handle_input(InputEvent::PointerCancel { pointer_id: 4 });
        assert!(engine.interaction().is_idle());
        assert!(engine.selected_ids().is_empty());
    }

    #[test]
    fn space_pan_persists_camera_and_ignores_other_pointers() {
        let mut engine = engine();
        let effects = key(&mut engine, " ", true);
        assert!(effects.contains(&Effect::Cursor { cursor: Cursor::Grab }));

        down(&mut engine, pointer(1, 110.0, 90.0));
        assert!(matches!(engine.interaction(), Interaction::Panning { .. }));
        assert!(engine.selected_ids().is_empty());

        // A second finger neither pans nor starts anything.
        assert!(move_to(&mut engine, pointer(2, 500.0, 500.0)).is_empty());
        assert!(down(&mut engine, pointer(2, 500.0, 500.0)).is_empty());

        let effects = move_to(&mut engine, pointer(1, 140.0, 70.0));
        let bundle = persisted(&effects).unwrap();
        assert_eq!(bundle.camera.pan_x, 30.0);
        assert_eq!(bundle.camera.pan_y, -20.0);

        up(&mut engine, pointer(2, 140.0, 70.0));
        assert!(!engine.interaction().is_idle());
        up(&mut engine, pointer(1, 140.0, 70.0));
        assert!(engine.interaction().is_idle());
        key(&mut engine, " ", false);
        assert_eq!(engine.cursor(), Cursor::Default);
    }

    #[test]
    fn ctrl_wheel_zooms_at_pointer_and_clamps() {
        let mut engine = engine();
        let ctrl = Modifiers { ctrl: true, ..Modifiers::default() };
        let wheel = |dy: f64| {
            InputEvent::Wheel(WheelEvent {
                x: 400.0,
                y: 300.0,
                delta_x: 0.0,
                delta_y: dy,
                modifiers: ctrl,
            })
        };
        let effects = engine.handle_input(wheel(-100.0));
        assert!((persisted(&effects).unwrap().camera.zoom - 1.1).abs() < 1e-9);
        let world = transform::screen_to_world(Point::new(400.0, 300.0), engine.camera());
        assert_near(world, Point::new(400.0, 300.0));

        for _ in 0..50 {
            engine.handle_input(wheel(100.0));
        }
        assert_eq!(engine.camera().zoom, crate::vtt::camera::MIN_ZOOM);
        assert!(engine.handle_input(wheel(100.0)).is_empty());
    }

    #[test]
    fn plain_wheel_pans_and_wheel_is_ignored_mid_gesture() {
        let mut engine = engine();
        let plain = WheelEvent {
            x: 0.0,
            y: 0.0,
            delta_x: 5.0,
            delta_y: 40.0,
            modifiers: Modifiers::default(),
        };
        engine.handle_input(InputEvent::Wheel(plain));
        assert_eq!(engine.camera().pan_x, -5.0);
        assert_eq!(engine.camera().pan_y, -40.0);

        down(&mut engine, pointer(1, 110.0, 50.0));
        assert!(matches!(engine.interaction(), Interaction::Dragging { .. }));
        assert!(engine.handle_input(InputEvent::Wheel(plain)).is_empty());
    }

    #[test]
    fn measure_mode_wins_and_discards_on_release() {
        let mut engine = engine();
        engine.set_measure_mode(true);
        assert_eq!(engine.cursor(), Cursor::Crosshair);

        down(&mut engine, pointer(1, 110.0, 90.0));
        assert!(engine.selected_ids().is_empty());
        move_to(&mut engine, pointer(1, 260.0, 90.0));
        match engine.interaction() {
            Interaction::Measuring { measurement, .. } => {
                let view = measurement.view(engine.grid(), engine.camera(), 5.0, "ft");
                assert_eq!(view.label, "15 ft");
            }
            other => panic!("expected measuring, got {other:?}"),
        }
        let effects = up(&mut engine, pointer(1, 260.0, 90.0));
        assert!(engine.interaction().is_idle());
        assert!(persisted(&effects).is_none());
        assert_near(top_left(&engine, "hero"), Point::new(100.0, 80.0));
    }

    #[test]
    fn escape_cancels_active_gesture() {
        let mut engine = engine();
        down(&mut engine, pointer(1, 110.0, 90.0));
        key(&mut engine, "Escape", true);
        assert!(engine.interaction().is_idle());
        assert!(engine.tokens().dragged_ids().is_empty());
        assert!(move_to(&mut engine, pointer(1, 500.0, 500.0)).is_empty());
    }

    #[test]
    fn roster_removal_mid_drag_never_resurfaces() {
        let mut engine = engine();
        down(&mut engine, pointer(1, 110.0, 90.0));
        up(&mut engine, pointer(1, 110.0, 90.0));
        let ctrl = Modifiers { ctrl: true, ..Modifiers::default() };
        down(&mut engine, with_mods(pointer(1, 310.0, 90.0), ctrl));
        assert!(matches!(engine.interaction(), Interaction::Dragging { .. }));

        let effects = engine.sync_roster(&roster(&[
            ("hero", Category::Friendly),
            ("orc", Category::Hostile),
        ]));
        assert!(effects.contains(&Effect::SelectionChanged { ids: vec!["hero".to_string()] }));
        assert!(!persisted(&effects).unwrap().token_positions.contains_key("ally"));

        move_to(&mut engine, pointer(1, 320.0, 90.0));
        up(&mut engine, pointer(1, 320.0, 90.0));
        assert_near(top_left(&engine, "hero"), Point::new(110.0, 80.0));

        let shift = Modifiers { shift: true, ..Modifiers::default() };
        down(&mut engine, with_mods(pointer(1, 0.0, 0.0), shift));
        move_to(&mut engine, pointer(1, 999.0, 799.0));
        up(&mut engine, pointer(1, 999.0, 799.0));
        assert!(!engine.selected_ids().contains("ally"));
        assert_eq!(engine.selected_ids().len(), 2);
    }

    #[test]
    fn removing_last_dragged_token_returns_to_idle() {
        let mut engine = engine();
        down(&mut engine, pointer(1, 510.0, 410.0));
        assert!(matches!(engine.interaction(), Interaction::Dragging { .. }));
        engine.sync_roster(&roster(&[("hero", Category::Friendly)]));
        assert!(engine.interaction().is_idle());
    }

    #[test]
    fn fog_reveals_only_around_friendly_tokens() {
        let mut engine = engine();
        let effects = engine.fog_command(FogCommand::Enable);
        let bundle = persisted(&effects).unwrap();
        // hero center (125, 105) is cell (2, 2)
        assert!(bundle.fog.revealed_cells.contains(&Cell::new(2, 2)));
        let orc = engine.tokens().get("orc").unwrap().clone();
        assert_eq!(engine.visibility_of(&orc), TokenVisibility::Fogged);
        // orc's own surroundings are never revealed by the orc
        assert!(!engine.fog().revealed_cells.contains(&Cell::new(10, 8)));

        let before = engine.fog().revealed_cells.clone();
        down(&mut engine, pointer(1, 110.0, 90.0));
        move_to(&mut engine, pointer(1, 460.0, 340.0));
        up(&mut engine, pointer(1, 460.0, 340.0));
        assert!(engine.fog().revealed_cells.is_superset(&before));
        assert!(engine.fog().revealed_cells.contains(&Cell::new(10, 8)));
        assert_eq!(engine.visibility_of(&orc), TokenVisibility::Visible);
    }

    #[test]
    fn fog_cover_reset_and_reveal_all() {
        let mut engine = engine();
        engine.fog_command(FogCommand::Enable);
        engine.fog_command(FogCommand::Reset);
        assert!(engine.fog().revealed_cells.is_empty());
        assert!(engine.fog().enabled);

        engine.fog_command(FogCommand::RevealAll { enabled: true });
        let orc = engine.tokens().get("orc").unwrap().clone();
        assert_eq!(engine.visibility_of(&orc), TokenVisibility::Visible);
        // Switching reveal-all off refreshes around the party.
        engine.fog_command(FogCommand::RevealAll { enabled: false });
        assert!(engine.fog().revealed_cells.contains(&Cell::new(2, 2)));

        engine.fog_command(FogCommand::Radius { cells: 0 });
        assert_eq!(engine.fog().radius_in_cells, 1);
        engine.fog_command(FogCommand::Radius { cells: 50_000 });
        assert_eq!(engine.fog().radius_in_cells, fog::MAX_RADIUS_IN_CELLS);
        engine.fog_command(FogCommand::Radius { cells: 1 });
        engine.fog_command(FogCommand::Cover);
        assert_eq!(engine.fog().revealed_cells.len(), 10);
        assert!(engine.fog_command(FogCommand::Enable).is_empty());
    }

    #[test]
    fn player_view_cannot_touch_hidden_tokens() {
        let mut engine = engine();
        engine.visibility_command(VisibilityCommand::ToggleToken { id: "orc".to_string() });
        let config = EngineConfig {
            player_view: true,
            ..EngineConfig::default()
        };
        engine.set_config(config).unwrap();
        down(&mut engine, pointer(1, 510.0, 410.0));
        assert!(engine.interaction().is_idle());
        assert!(engine.selected_ids().is_empty());
    }

    #[test]
    fn visibility_toggle_for_unknown_token_is_noop() {
        let mut engine = engine();
        assert!(engine
            .visibility_command(VisibilityCommand::ToggleToken { id: "ghost".to_string() })
            .is_empty());
        let effects = engine.visibility_command(VisibilityCommand::HideCategory { hidden: true });
        assert!(persisted(&effects).unwrap().hide_all_of_category);
        let orc = engine.tokens().get("orc").unwrap().clone();
        assert_eq!(engine.visibility_of(&orc), TokenVisibility::HiddenCategory);
    }

    #[test]
    fn rehydrate_overwrites_without_persisting() {
        let mut engine = engine();
        down(&mut engine, pointer(1, 110.0, 90.0));
        let effects = engine.rehydrate(
            &json!({
                "camera": {"panX": 12, "panY": 0, "zoom": 2},
                "tokenPositions": {"hero": {"x": 0.5, "y": 0.25}},
                "grid": {"snap": true}
            })
            .to_string(),
        );
        assert!(persisted(&effects).is_none());
        assert!(effects.contains(&Effect::Render));
        assert!(engine.interaction().is_idle());
        assert_eq!(engine.camera().zoom, 2.0);
        assert!(engine.grid().snap);
        assert_near(top_left(&engine, "hero"), Point::new(500.0, 200.0));
    }

    #[test]
    fn unreadable_bundle_boots_default_scene_with_warning() {
        let mut engine = engine();
        engine.update_grid(GridUpdate { size: Some(80.0), ..GridUpdate::default() });
        let effects = engine.rehydrate("{definitely not json");
        assert!(matches!(effects.first(), Some(Effect::Warning { .. })));
        assert_eq!(engine.grid().size, Grid::default().size);
        assert!(engine.rehydrate("").iter().all(|e| !matches!(e, Effect::Warning { .. })));
    }

    #[test]
    fn resize_keeps_normalized_positions() {
        let mut engine = Engine::default();
        engine.handle_input(InputEvent::Resize { viewport: Size::new(800.0, 600.0) });
        engine.sync_roster(&roster(&[("hero", Category::Friendly)]));
        engine.rehydrate(&json!({"tokenPositions": {"hero": {"x": 0.5, "y": 0.5}}}).to_string());
        let effects = engine.handle_input(InputEvent::FullscreenChanged {
            active: true,
            viewport: Size::new(1200.0, 900.0),
        });
        assert!(effects.contains(&Effect::Render));
        assert!(engine.is_fullscreen());
        let screen = transform::world_to_screen(top_left(&engine, "hero"), engine.camera());
        assert_near(screen, Point::new(600.0, 450.0));
    }

    #[test]
    fn zero_viewport_is_ignored() {
        let mut engine = engine();
        let effects = engine.handle_input(InputEvent::Resize { viewport: Size::new(0.0, 300.0) });
        assert!(effects.is_empty());
        assert_eq!(engine.viewport(), VP);
    }

    #[test]
    fn host_rejection_becomes_warning() {
        let mut engine = engine();
        let effects = engine.handle_input(InputEvent::HostRejected {
            api: HostApi::Fullscreen,
            reason: "NotAllowedError".to_string(),
        });
        match effects.as_slice() {
            [Effect::Warning { message }] => assert!(message.contains("NotAllowedError")),
            other => panic!("unexpected effects {other:?}"),
        }
    }

    #[test]
    fn oversized_map_is_rejected_before_write() {
        let mut engine = Engine::new(EngineConfig {
            map_byte_budget: 3,
            ..EngineConfig::default()
        });
        let err = engine.set_map(Some("data:image/png;base64,AAAAAAAA")).unwrap_err();
        assert!(matches!(err, VttError::MapTooLarge { bytes: 6, budget: 3 }));
        assert!(engine.map().is_none());

        let effects = engine.set_map(Some("maps/cave.png")).unwrap();
        assert_eq!(
            effects.first(),
            Some(&Effect::PersistMap {
                bundle: MapBundle { image: Some("maps/cave.png".to_string()) }
            })
        );
        let effects = engine.set_map(None).unwrap();
        assert_eq!(effects.first(), Some(&Effect::PersistMap { bundle: MapBundle::default() }));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut engine = Engine::default();
        let bad = EngineConfig {
            zoom_step: 0.0,
            ..EngineConfig::default()
        };
        assert!(matches!(engine.set_config(bad), Err(VttError::InvalidConfig(_))));
    }

    #[test]
    fn effects_serialize_with_type_tag() {
        let value = serde_json::to_value(Effect::Cursor { cursor: Cursor::Grabbing }).unwrap();
        assert_eq!(value, json!({"type": "cursor", "cursor": "grabbing"}));
        let value = serde_json::to_value(Effect::Render).unwrap();
        assert_eq!(value, json!({"type": "render"}));
    }
}
