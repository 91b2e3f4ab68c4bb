//! Battle-map image reference and its own persisted bundle.
//!
//! The map is stored apart from the scene bundle because data URIs are large
//! and change rarely. Oversized uploads are rejected here, before anything is
//! written.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::vtt::error::VttError;

/// ~4 MiB of decoded image data.
pub const DEFAULT_MAP_BYTE_BUDGET: usize = 4 * 1024 * 1024;

/// Persisted shape: `{ "image": "<data uri or url>" }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapBundle {
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapAsset {
    reference: String,
    mime: Option<String>,
    byte_len: Option<usize>,
}

impl MapAsset {
    /// Validate a map reference. Data URIs are decoded to measure their size
    /// against `budget`; anything else is kept as an opaque URL.
    pub fn parse(reference: &str, budget: usize) -> Result<Self, VttError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(VttError::InvalidMapReference("empty reference".to_string()));
        }

        let Some(rest) = reference.strip_prefix("data:") else {
            if reference.chars().any(char::is_whitespace) {
                return Err(VttError::InvalidMapReference(
                    "URL contains whitespace".to_string(),
                ));
            }
            return Ok(Self {
                reference: reference.to_string(),
                mime: None,
                byte_len: None,
            });
        };

        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| VttError::InvalidMapReference("data URI has no payload".to_string()))?;
        let is_base64 = header.ends_with(";base64");
        let mime = header.trim_end_matches(";base64").to_string();
        if !mime.starts_with("image/") {
            return Err(VttError::InvalidMapReference(format!(
                "expected an image, got '{}'",
                mime
            )));
        }

        let byte_len = if is_base64 {
            STANDARD
                .decode(payload)
                .map_err(|e| VttError::InvalidMapReference(format!("bad base64: {}", e)))?
                .len()
        } else {
            payload.len()
        };

        if byte_len > budget {
            warn!(byte_len, budget, "rejecting oversized map image");
            return Err(VttError::MapTooLarge {
                bytes: byte_len,
                budget,
            });
        }

        info!(%mime, byte_len, "map image accepted");
        Ok(Self {
            reference: reference.to_string(),
            mime: Some(mime),
            byte_len: Some(byte_len),
        })
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn mime(&self) -> Option<&str> {
        self.mime.as_deref()
    }

    pub fn byte_len(&self) -> Option<usize> {
        self.byte_len
    }

    pub fn bundle(asset: Option<&MapAsset>) -> MapBundle {
        MapBundle {
            image: asset.map(|a| a.reference.clone()),
        }
    }
}
