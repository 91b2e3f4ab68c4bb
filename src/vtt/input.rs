//! Input events delivered by the host and the interaction state machine.
//!
//! Pointer coordinates are stage-local screen pixels. The host forwards raw
//! browser events; deciding what a press means happens in
//! [`choose_gesture`], which is pure so the priority order can be tested
//! without an engine.

use serde::Deserialize;

use crate::vtt::measure::Measurement;
use crate::vtt::transform::{Point, Rect, Size};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    /// Ctrl on most platforms, Cmd on macOS.
    pub fn command(&self) -> bool {
        self.ctrl || self.meta
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Button {
    #[default]
    Primary,
    Middle,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointerEvent {
    #[serde(default)]
    pub pointer_id: i32,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub button: Button,
    #[serde(default)]
    pub modifiers: Modifiers,
}

impl PointerEvent {
    pub fn screen(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WheelEvent {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub delta_x: f64,
    #[serde(default)]
    pub delta_y: f64,
    #[serde(default)]
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeyEvent {
    /// `KeyboardEvent.key`, e.g. `" "` or `"Escape"`.
    pub key: String,
    #[serde(default)]
    pub modifiers: Modifiers,
}

impl KeyEvent {
    pub fn is_space(&self) -> bool {
        self.key == " " || self.key == "Space" || self.key == "Spacebar"
    }

    pub fn is_escape(&self) -> bool {
        self.key == "Escape" || self.key == "Esc"
    }
}

/// Browser API the host tried and the browser refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostApi {
    Fullscreen,
    PointerCapture,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    PointerDown(PointerEvent),
    PointerMove(PointerEvent),
    PointerUp(PointerEvent),
    PointerCancel { pointer_id: i32 },
    Wheel(WheelEvent),
    KeyDown(KeyEvent),
    KeyUp(KeyEvent),
    Resize { viewport: Size },
    FullscreenChanged { active: bool, viewport: Size },
    HostRejected { api: HostApi, reason: String },
}

/// Active pointer gesture. Every non-idle state belongs to one pointer.
#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    Idle,
    Panning {
        pointer_id: i32,
    },
    /// Corners in world space.
    MarqueeSelecting {
        pointer_id: i32,
        start: Point,
        current: Point,
    },
    Dragging {
        pointer_id: i32,
    },
    Measuring {
        pointer_id: i32,
        measurement: Measurement,
    },
}

impl Interaction {
    pub fn is_idle(&self) -> bool {
        matches!(self, Interaction::Idle)
    }

    pub fn pointer_id(&self) -> Option<i32> {
        match self {
            Interaction::Idle => None,
            Interaction::Panning { pointer_id }
            | Interaction::MarqueeSelecting { pointer_id, .. }
            | Interaction::Dragging { pointer_id }
            | Interaction::Measuring { pointer_id, .. } => Some(*pointer_id),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Interaction::Idle => "idle",
            Interaction::Panning { .. } => "panning",
            Interaction::MarqueeSelecting { .. } => "marquee",
            Interaction::Dragging { .. } => "dragging",
            Interaction::Measuring { .. } => "measuring",
        }
    }

    /// World-space marquee rectangle, normalized for any drag direction.
    pub fn marquee_rect(&self) -> Option<Rect> {
        match self {
            Interaction::MarqueeSelecting { start, current, .. } => {
                Some(Rect::from_corners(*start, *current))
            }
            _ => None,
        }
    }
}

/// What a pointer press starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gesture {
    Measure,
    Marquee,
    Pan,
    /// Press on a token. `toggle` adds/removes it instead of replacing the
    /// selection.
    Token { id: String, toggle: bool },
    ClearSelection,
    Ignore,
}

/// Pointer-down priority: measure mode, then Shift (marquee), then the pan
/// modifiers (held Space, Alt, middle button), then a token under the
/// pointer, then empty space.
pub fn choose_gesture(
    measure_mode: bool,
    space_held: bool,
    event: &PointerEvent,
    token_under_pointer: Option<&str>,
) -> Gesture {
    if event.button == Button::Secondary {
        return Gesture::Ignore;
    }
    if measure_mode {
        return Gesture::Measure;
    }
    if event.modifiers.shift {
        return Gesture::Marquee;
    }
    if space_held || event.modifiers.alt || event.button == Button::Middle {
        return Gesture::Pan;
    }
    match token_under_pointer {
        Some(id) => Gesture::Token {
            id: id.to_string(),
            toggle: event.modifiers.command(),
        },
        None => Gesture::ClearSelection,
    }
}
