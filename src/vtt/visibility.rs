//! Visibility resolution for tokens.
//!
//! Precedence, evaluated per render: per-token hidden flag, then the
//! category-wide hide, then fog. The DM view draws everything (with the
//! reason attached); the player view drops anything not plainly visible.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::vtt::fog::FogState;
use crate::vtt::grid::Grid;
use crate::vtt::roster::Category;
use crate::vtt::tokens::{Token, TokenStore};
use crate::vtt::transform::Size;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewRole {
    Dm,
    Player,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenVisibility {
    Visible,
    HiddenToken,
    HiddenCategory,
    Fogged,
}

impl TokenVisibility {
    pub fn is_drawn(self, role: ViewRole) -> bool {
        role == ViewRole::Dm || self == TokenVisibility::Visible
    }
}

/// DM visibility toggles persisted with the scene.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisibilityFlags {
    pub hidden_token_ids: BTreeSet<String>,
    /// Hide every hostile token from players.
    pub hide_all_of_category: bool,
}

impl VisibilityFlags {
    /// Returns the new hidden state.
    pub fn toggle_token(&mut self, id: &str) -> bool {
        if self.hidden_token_ids.remove(id) {
            false
        } else {
            self.hidden_token_ids.insert(id.to_string());
            true
        }
    }

    pub fn purge(&mut self, ids: &[String]) {
        for id in ids {
            self.hidden_token_ids.remove(id);
        }
    }
}

pub fn resolve_visibility(
    token: &Token,
    store: &TokenStore,
    viewport: Size,
    flags: &VisibilityFlags,
    fog: &FogState,
    grid: &Grid,
) -> TokenVisibility {
    if flags.hidden_token_ids.contains(&token.id) {
        return TokenVisibility::HiddenToken;
    }
    if token.category == Category::Hostile && flags.hide_all_of_category {
        return TokenVisibility::HiddenCategory;
    }
    // The party always sees itself.
    if token.category == Category::Friendly {
        return TokenVisibility::Visible;
    }
    let cell = grid.cell_of(store.world_center(token, viewport));
    if fog.is_revealed(cell) {
        TokenVisibility::Visible
    } else {
        TokenVisibility::Fogged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vtt::grid::Cell;
    use crate::vtt::roster::{RosterEntry, RosterSnapshot};
    use std::collections::HashMap;
    use crate::vtt::transform::Point;

    const VP: Size = Size::new(500.0, 500.0);

    fn setup() -> TokenStore {
        let entries = vec![
            RosterEntry {
                id: "hero".to_string(),
                name: "Hero".to_string(),
                category: Category::Friendly,
                avatar: String::new(),
                current_hp: None,
                max_hp: None,
                defeated: false,
            },
            RosterEntry {
                id: "orc".to_string(),
                name: "Orc".to_string(),
                category: Category::Hostile,
                avatar: String::new(),
                current_hp: None,
                max_hp: None,
                defeated: false,
            },
        ];
        let mut store = TokenStore::new();
        store.sync(&RosterSnapshot { entries, active_turn: None }, 8);
        // Orc centered in cell (2, 2) of a 50px grid.
        store.restore_positions(HashMap::from([
            ("hero".to_string(), Point::new(0.0, 0.0)),
            ("orc".to_string(), Point::new(0.2, 0.2)),
        ]));
        store
    }

    fn check(
        store: &TokenStore,
        id: &str,
        flags: &VisibilityFlags,
        fog: &FogState,
    ) -> TokenVisibility {
        let token = store.get(id).unwrap();
        resolve_visibility(token, store, VP, flags, fog, &Grid::default())
    }

    #[test]
    fn per_token_flag_wins_over_everything() {
        let store = setup();
        let mut flags = VisibilityFlags::default();
        flags.toggle_token("orc");
        flags.hide_all_of_category = true;
        let fog = FogState::default();
        assert_eq!(check(&store, "orc", &flags, &fog), TokenVisibility::HiddenToken);
    }

    #[test]
    fn category_hide_applies_to_hostiles_only() {
        let store = setup();
        let flags = VisibilityFlags {
            hide_all_of_category: true,
            ..VisibilityFlags::default()
        };
        let fog = FogState::default();
        assert_eq!(check(&store, "orc", &flags, &fog), TokenVisibility::HiddenCategory);
        assert_eq!(check(&store, "hero", &flags, &fog), TokenVisibility::Visible);
    }

    #[test]
    fn fog_hides_hostiles_in_unrevealed_cells() {
        let store = setup();
        let flags = VisibilityFlags::default();
        let mut fog = FogState {
            enabled: true,
            ..FogState::default()
        };
        assert_eq!(check(&store, "orc", &flags, &fog), TokenVisibility::Fogged);
        assert_eq!(check(&store, "hero", &flags, &fog), TokenVisibility::Visible);

        fog.revealed_cells.insert(Cell::new(2, 2));
        assert_eq!(check(&store, "orc", &flags, &fog), TokenVisibility::Visible);
    }

    #[test]
    fn dm_draws_everything_player_only_visible() {
        for v in [
            TokenVisibility::HiddenToken,
            TokenVisibility::HiddenCategory,
            TokenVisibility::Fogged,
        ] {
            assert!(v.is_drawn(ViewRole::Dm));
            assert!(!v.is_drawn(ViewRole::Player));
        }
        assert!(TokenVisibility::Visible.is_drawn(ViewRole::Player));
    }

    #[test]
    fn toggle_and_purge() {
        let mut flags = VisibilityFlags::default();
        assert!(flags.toggle_token("a"));
        assert!(!flags.toggle_token("a"));
        flags.toggle_token("b");
        flags.purge(&["b".to_string()]);
        assert!(flags.hidden_token_ids.is_empty());
    }
}
