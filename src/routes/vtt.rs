//! `/api/vtt/*` routes, the host's only way into the spatial engine.
//!
//! Requests carry JSON bodies (form bodies for the two flag-style routes).
//! Mutations answer `{"effects": [...]}`; reads answer the requested model;
//! anything rejected answers `{"error": "..."}`. The engine lives in
//! [`crate::vtt::state`].

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::routes::util::{
    error_response, get_bool, get_param, json_response, parse_form_body, parse_json, parse_query,
};
use crate::vtt::config::EngineConfig;
use crate::vtt::engine::{Effect, FogCommand, GridUpdate, VisibilityCommand};
use crate::vtt::input::{HostApi, InputEvent, KeyEvent, PointerEvent, WheelEvent};
use crate::vtt::map::MapBundle;
use crate::vtt::roster::RosterSnapshot;
use crate::vtt::state::{with_engine, with_engine_mut};
use crate::vtt::transform::Size;
use crate::vtt::view::SceneView;

#[derive(Serialize)]
struct EffectsBody {
    effects: Vec<Effect>,
}

fn effects_response(effects: Vec<Effect>) -> String {
    json_response(&EffectsBody { effects })
}

fn dispatch(event: InputEvent) -> String {
    effects_response(with_engine_mut(|e| e.handle_input(event)))
}

// ── Reads ──────────────────────────────────────────────────────────

/// Handle GET /api/vtt/scene
/// Returns the screen-space render model.
pub fn handle_scene_get(_query: &str) -> String {
    with_engine(|e| json_response(&SceneView::build(e)))
}

/// Handle GET /api/vtt/bundle
/// Returns the scene bundle exactly as it should be stored.
pub fn handle_bundle_get(_query: &str) -> String {
    with_engine(|e| e.bundle().to_json())
}

/// Handle GET /api/vtt/map
pub fn handle_map_get(_query: &str) -> String {
    with_engine(|e| json_response(&e.map_bundle()))
}

// ── Host state ─────────────────────────────────────────────────────

/// Handle POST /api/vtt/bundle
/// Body: the stored scene bundle (boot, or another tab wrote storage).
/// Never fails: unreadable bundles fall back to the default scene.
pub fn handle_bundle_post(body: &str) -> String {
    effects_response(with_engine_mut(|e| e.rehydrate(body)))
}

/// Handle POST /api/vtt/roster
/// Body: a roster snapshot or the encounter tracker's stored state.
pub fn handle_roster_post(body: &str) -> String {
    match RosterSnapshot::from_json(body) {
        Ok(roster) => effects_response(with_engine_mut(|e| e.sync_roster(&roster))),
        Err(err) => {
            warn!(error = %err, "roster rejected");
            error_response(&err.to_string())
        }
    }
}

#[derive(Deserialize)]
struct ViewportBody {
    width: f64,
    height: f64,
    /// Present only when the change came from entering/leaving fullscreen.
    #[serde(default)]
    fullscreen: Option<bool>,
}

/// Handle POST /api/vtt/viewport
/// Body: `{"width", "height", "fullscreen"?}`
pub fn handle_viewport_post(body: &str) -> String {
    let vp: ViewportBody = match parse_json(body, "viewport") {
        Ok(v) => v,
        Err(msg) => return error_response(&msg),
    };
    let viewport = Size::new(vp.width, vp.height);
    dispatch(match vp.fullscreen {
        Some(active) => InputEvent::FullscreenChanged { active, viewport },
        None => InputEvent::Resize { viewport },
    })
}

/// Handle POST /api/vtt/config
pub fn handle_config_post(body: &str) -> String {
    let result = EngineConfig::from_json(body)
        .and_then(|config| with_engine_mut(|e| e.set_config(config)));
    match result {
        Ok(effects) => effects_response(effects),
        Err(err) => {
            warn!(error = %err, "config rejected");
            error_response(&err.to_string())
        }
    }
}

/// Handle POST /api/vtt/host/warning
/// Body: `api=fullscreen|pointer_capture&reason=...`
pub fn handle_host_warning_post(body: &str) -> String {
    let params = parse_form_body(body);
    let api = match get_param(&params, "api") {
        Some("fullscreen") => HostApi::Fullscreen,
        Some("pointer_capture") => HostApi::PointerCapture,
        _ => return error_response("api must be fullscreen or pointer_capture"),
    };
    let reason = get_param(&params, "reason").unwrap_or("blocked by the browser");
    dispatch(InputEvent::HostRejected {
        api,
        reason: reason.to_string(),
    })
}

// ── Input ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerPhase {
    Down,
    Move,
    Up,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelBody {
    #[serde(default)]
    pointer_id: i32,
}

/// Handle POST /api/vtt/pointer/{down,move,up}
/// Body: `{"pointerId", "x", "y", "button"?, "modifiers"?}` (screen pixels)
pub fn handle_pointer_post(phase: PointerPhase, body: &str) -> String {
    let ev: PointerEvent = match parse_json(body, "pointer event") {
        Ok(ev) => ev,
        Err(msg) => return error_response(&msg),
    };
    dispatch(match phase {
        PointerPhase::Down => InputEvent::PointerDown(ev),
        PointerPhase::Move => InputEvent::PointerMove(ev),
        PointerPhase::Up => InputEvent::PointerUp(ev),
    })
}

/// Handle POST /api/vtt/pointer/cancel
/// Body: `{"pointerId"}`
pub fn handle_pointer_cancel_post(body: &str) -> String {
    match parse_json::<CancelBody>(body, "pointer cancel") {
        Ok(c) => dispatch(InputEvent::PointerCancel {
            pointer_id: c.pointer_id,
        }),
        Err(msg) => error_response(&msg),
    }
}

/// Handle POST /api/vtt/wheel
pub fn handle_wheel_post(body: &str) -> String {
    match parse_json::<WheelEvent>(body, "wheel event") {
        Ok(ev) => dispatch(InputEvent::Wheel(ev)),
        Err(msg) => error_response(&msg),
    }
}

/// Handle POST /api/vtt/key/{down,up}
pub fn handle_key_post(pressed: bool, body: &str) -> String {
    match parse_json::<KeyEvent>(body, "key event") {
        Ok(ev) if pressed => dispatch(InputEvent::KeyDown(ev)),
        Ok(ev) => dispatch(InputEvent::KeyUp(ev)),
        Err(msg) => error_response(&msg),
    }
}

// ── Tools and settings ─────────────────────────────────────────────

/// Handle POST /api/vtt/tool
/// Body: `measure=on|off`
pub fn handle_tool_post(body: &str) -> String {
    let params = parse_form_body(body);
    match get_bool(&params, "measure") {
        Some(on) => effects_response(with_engine_mut(|e| e.set_measure_mode(on))),
        None => error_response("missing measure=on|off"),
    }
}

/// Handle POST /api/vtt/grid
/// Body: any subset of `{"show", "snap", "size", "offsetX", "offsetY", "opacity"}`
pub fn handle_grid_post(body: &str) -> String {
    match parse_json::<GridUpdate>(body, "grid settings") {
        Ok(update) => effects_response(with_engine_mut(|e| e.update_grid(update))),
        Err(msg) => error_response(&msg),
    }
}

/// Handle POST /api/vtt/fog
/// Body: `{"action": "enable" | "disable" | "reveal_all" | "cover" | "reset" |
/// "refresh" | "radius" | "opacity", ...}`
pub fn handle_fog_post(body: &str) -> String {
    match parse_json::<FogCommand>(body, "fog command") {
        Ok(cmd) => effects_response(with_engine_mut(|e| e.fog_command(cmd))),
        Err(msg) => error_response(&msg),
    }
}

/// Handle POST /api/vtt/visibility
/// Body: `{"action": "toggle_token", "id"}` or `{"action": "hide_category", "hidden"}`
pub fn handle_visibility_post(body: &str) -> String {
    match parse_json::<VisibilityCommand>(body, "visibility command") {
        Ok(cmd) => effects_response(with_engine_mut(|e| e.visibility_command(cmd))),
        Err(msg) => error_response(&msg),
    }
}

/// Handle POST /api/vtt/map
/// Body: `{"image": "<data uri or url>" | null}`.
/// `?source=storage` loads a stored map without writing it back; otherwise
/// this is an upload and is checked against the byte budget first.
pub fn handle_map_post(query: &str, body: &str) -> String {
    let bundle: MapBundle = match parse_json(body, "map bundle") {
        Ok(b) => b,
        Err(msg) => return error_response(&msg),
    };
    let params = parse_query(query);
    if get_param(&params, "source") == Some("storage") {
        return effects_response(with_engine_mut(|e| e.rehydrate_map(bundle)));
    }
    match with_engine_mut(|e| e.set_map(bundle.image.as_deref())) {
        Ok(effects) => effects_response(effects),
        Err(err) => {
            warn!(error = %err, "map upload rejected");
            error_response(&err.to_string())
        }
    }
}
