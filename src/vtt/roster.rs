//! Roster adapter: the read-only combatant list the VTT mirrors as tokens.
//!
//! Two input shapes are accepted:
//!
//! ```text
//! snapshot: { "entries": [{ id, name, category, avatar, currentHp, maxHp, defeated }],
//!             "activeTurn": 2 }
//! tracker:  { "encounter": { "name", "status", "turnIndex",
//!             "roster": [{ encId, name, type: "pc"|"monster", curHp, maxHp, avatar, defeated }] } }
//! ```
//!
//! The tracker shape is the encounter tracker's own persisted state, so the
//! host can forward the storage value untouched.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::vtt::error::VttError;

/// Token category. Only friendly tokens reveal fog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[serde(alias = "pc")]
    Friendly,
    #[serde(alias = "monster", alias = "npc")]
    Hostile,
}

impl Category {
    /// Tracker combatant `type` → category. Anything that is not a PC is hostile.
    pub fn from_tracker_type(kind: &str) -> Self {
        if kind.eq_ignore_ascii_case("pc") || kind.eq_ignore_ascii_case("friendly") {
            Category::Friendly
        } else {
            Category::Hostile
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub id: String,
    #[serde(default = "unknown_name")]
    pub name: String,
    pub category: Category,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub current_hp: Option<i64>,
    #[serde(default)]
    pub max_hp: Option<i64>,
    #[serde(default)]
    pub defeated: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterSnapshot {
    #[serde(default)]
    pub entries: Vec<RosterEntry>,
    /// Index of the combatant whose turn it is, only while an encounter runs.
    #[serde(default)]
    pub active_turn: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TrackerState {
    encounter: TrackerEncounter,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TrackerEncounter {
    status: String,
    roster: Vec<TrackerCombatant>,
    turn_index: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TrackerCombatant {
    enc_id: Option<String>,
    base_id: Option<String>,
    name: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    cur_hp: Option<f64>,
    max_hp: Option<f64>,
    avatar: Option<String>,
    defeated: bool,
}

fn unknown_name() -> String {
    "Unknown".to_string()
}

impl RosterSnapshot {
    /// Parse either accepted shape (or a bare array of entries).
    pub fn from_json(json: &str) -> Result<Self, VttError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| VttError::InvalidRoster(e.to_string()))?;

        let mut snapshot = if value.get("encounter").is_some() {
            let tracker: TrackerState = serde_json::from_value(value)
                .map_err(|e| VttError::InvalidRoster(e.to_string()))?;
            Self::from_tracker(tracker.encounter)
        } else if value.is_array() {
            let entries: Vec<RosterEntry> = serde_json::from_value(value)
                .map_err(|e| VttError::InvalidRoster(e.to_string()))?;
            RosterSnapshot {
                entries,
                active_turn: None,
            }
        } else {
            serde_json::from_value(value).map_err(|e| VttError::InvalidRoster(e.to_string()))?
        };

        snapshot.fill_defaults();
        Ok(snapshot)
    }

    fn from_tracker(encounter: TrackerEncounter) -> Self {
        let running = encounter.status == "running";
        let active_turn = encounter
            .turn_index
            .filter(|_| running)
            .filter(|t| t.is_finite() && *t >= 0.0)
            .map(|t| t as usize);

        let entries = encounter
            .roster
            .into_iter()
            .filter_map(|c| {
                let Some(id) = c.enc_id.or(c.base_id).filter(|id| !id.is_empty()) else {
                    warn!(name = ?c.name, "skipping tracker combatant without an id");
                    return None;
                };
                let max_hp = c.max_hp.map(|hp| hp as i64);
                Some(RosterEntry {
                    id,
                    name: c.name.unwrap_or_else(unknown_name),
                    category: Category::from_tracker_type(&c.kind),
                    avatar: c.avatar.unwrap_or_default(),
                    current_hp: c.cur_hp.map(|hp| hp as i64).or(max_hp),
                    max_hp,
                    defeated: c.defeated,
                })
            })
            .collect();

        RosterSnapshot {
            entries,
            active_turn,
        }
    }

    /// Blank names and avatars get the tracker's fallbacks; duplicate ids
    /// keep their first occurrence.
    fn fill_defaults(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.entries.retain(|e| {
            let keep = !e.id.is_empty() && seen.insert(e.id.clone());
            if !keep {
                warn!(id = %e.id, "dropping roster entry with empty or duplicate id");
            }
            keep
        });
        for entry in &mut self.entries {
            if entry.name.trim().is_empty() {
                entry.name = unknown_name();
            }
            if entry.avatar.trim().is_empty() {
                entry.avatar = default_avatar(entry.category);
            }
        }
        if let Some(turn) = self.active_turn {
            if turn >= self.entries.len() {
                self.active_turn = None;
            }
        }
    }

    /// Id of the combatant whose turn it is.
    pub fn active_id(&self) -> Option<&str> {
        self.active_turn
            .and_then(|i| self.entries.get(i))
            .map(|e| e.id.as_str())
    }
}

/// Placeholder portrait matching the tracker's: gold for the party, crimson
/// for everything else.
pub fn default_avatar(category: Category) -> String {
    let fill = match category {
        Category::Friendly => "#c9a227",
        Category::Hostile => "#7a0f1a",
    };
    let svg = format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="96" height="96"><rect width="96" height="96" rx="20" fill="#f6efe2"/><circle cx="48" cy="40" r="18" fill="{fill}" opacity=".85"/><rect x="22" y="62" width="52" height="18" rx="9" fill="{fill}" opacity=".45"/></svg>"##
    );
    format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg))
}
