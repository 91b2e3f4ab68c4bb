//! Persisted scene bundle: camera, token positions, grid, fog and DM
//! visibility flags as one JSON object.
//!
//! ## Wire shape
//!
//! ```text
//! {
//!   "camera":         { "panX": 0, "panY": 0, "zoom": 1 },
//!   "tokenPositions": { "<id>": { "x": 0.05, "y": 0.05 } },
//!   "tokenSize":      50,
//!   "grid":           { "show": true, "snap": false, "size": 50, "offsetX": 0, "offsetY": 0, "opacity": 0.35 },
//!   "fog":            { "enabled": false, "revealAll": false, "radiusInCells": 3, "opacity": 0.85,
//!                       "revealedCells": { "4,7": true } },
//!   "hiddenTokenIds": { "<id>": true },
//!   "hideAllOfCategory": false
//! }
//! ```
//!
//! Loading is lenient: any field that is missing or has the wrong shape takes
//! its default (the values of `SceneBundle::default()`), and out-of-range
//! values are clamped. Only input that is not JSON at all is an error, and
//! callers fall back to the default scene on it.

use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::vtt::camera;
use crate::vtt::error::VttError;
use crate::vtt::fog::{self, FogState};
use crate::vtt::grid::Grid;
use crate::vtt::tokens::DEFAULT_TOKEN_SIZE;
use crate::vtt::transform::{Camera, Point};

/// Smallest token edge accepted from storage.
const MIN_TOKEN_SIZE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneBundle {
    pub camera: Camera,
    pub token_positions: BTreeMap<String, Point>,
    pub token_size: f64,
    pub grid: Grid,
    pub fog: FogState,
    #[serde(serialize_with = "serialize_id_set")]
    pub hidden_token_ids: BTreeSet<String>,
    pub hide_all_of_category: bool,
}

impl Default for SceneBundle {
    fn default() -> Self {
        Self {
            camera: Camera::default(),
            token_positions: BTreeMap::new(),
            token_size: DEFAULT_TOKEN_SIZE,
            grid: Grid::default(),
            fog: FogState::default(),
            hidden_token_ids: BTreeSet::new(),
            hide_all_of_category: false,
        }
    }
}

impl SceneBundle {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Parse a stored bundle. Errors only when the text is not JSON.
    pub fn from_json(json: &str) -> Result<Self, VttError> {
        let value: Value = serde_json::from_str(json).map_err(VttError::InvalidBundle)?;
        Ok(Self::from_value(&value))
    }

    /// Build a bundle from any JSON value, defaulting whatever is unusable.
    pub fn from_value(value: &Value) -> Self {
        let mut bundle = SceneBundle::default();
        let Some(root) = value.as_object() else {
            debug!("scene bundle is not an object, using defaults");
            return bundle;
        };

        if let Some(obj) = object(root, "camera") {
            let cam = &mut bundle.camera;
            read_into(obj, "panX", &mut cam.pan_x);
            read_into(obj, "panY", &mut cam.pan_y);
            read_into(obj, "zoom", &mut cam.zoom);
        }

        if let Some(obj) = object(root, "tokenPositions") {
            for (id, pos) in obj {
                match serde_json::from_value::<Point>(pos.clone()) {
                    Ok(p) if p.is_finite() => {
                        bundle.token_positions.insert(id.clone(), p);
                    }
                    _ => debug!(%id, "dropping malformed token position"),
                }
            }
        }

        read_into(root, "tokenSize", &mut bundle.token_size);

        if let Some(obj) = object(root, "grid") {
            let grid = &mut bundle.grid;
            read_into(obj, "show", &mut grid.show);
            read_into(obj, "snap", &mut grid.snap);
            read_into(obj, "size", &mut grid.size);
            read_into(obj, "offsetX", &mut grid.offset_x);
            read_into(obj, "offsetY", &mut grid.offset_y);
            read_into(obj, "opacity", &mut grid.opacity);
        }

        if let Some(obj) = object(root, "fog") {
            let f = &mut bundle.fog;
            read_into(obj, "enabled", &mut f.enabled);
            read_into(obj, "revealAll", &mut f.reveal_all);
            read_into(obj, "radiusInCells", &mut f.radius_in_cells);
            read_into(obj, "opacity", &mut f.opacity);
            if let Some(cells) = obj.get("revealedCells") {
                f.revealed_cells = fog::cells_from_wire(cells);
            }
        }

        if let Some(obj) = object(root, "hiddenTokenIds") {
            bundle.hidden_token_ids = obj
                .iter()
                .filter(|(_, v)| v.as_bool() == Some(true))
                .map(|(k, _)| k.clone())
                .collect();
        }

        read_into(root, "hideAllOfCategory", &mut bundle.hide_all_of_category);

        bundle.sanitized()
    }

    /// Clamp every field into its valid range.
    pub fn sanitized(mut self) -> Self {
        self.camera = camera::sanitize(self.camera);
        self.grid = self.grid.sanitized();
        self.fog = self.fog.sanitized();
        if !self.token_size.is_finite() {
            self.token_size = DEFAULT_TOKEN_SIZE;
        }
        self.token_size = self.token_size.max(MIN_TOKEN_SIZE);
        for pos in self.token_positions.values_mut() {
            pos.x = pos.x.clamp(0.0, 1.0);
            pos.y = pos.y.clamp(0.0, 1.0);
        }
        self
    }
}

fn object<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    obj.get(key).and_then(Value::as_object)
}

/// Overwrite `slot` with `obj[key]` when it is present and well-typed.
fn read_into<T: DeserializeOwned>(obj: &Map<String, Value>, key: &str, slot: &mut T) {
    let Some(value) = obj.get(key) else {
        return;
    };
    match T::deserialize(value) {
        Ok(v) => *slot = v,
        Err(e) => debug!(key, error = %e, "ignoring malformed bundle field"),
    }
}

/// `{"<id>": true, ...}`
fn serialize_id_set<S>(ids: &BTreeSet<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(ids.len()))?;
    for id in ids {
        map.serialize_entry(id, &true)?;
    }
    map.end()
}
