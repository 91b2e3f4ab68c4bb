//! Screen-space render model.
//!
//! Everything the host needs to paint one frame, already projected through
//! the camera. Rebuilt from scratch on every request, so a resize or a
//! fullscreen toggle can never leave stale grid lines or fog behind.

use serde::Serialize;

use crate::vtt::engine::{Cursor, Engine};
use crate::vtt::fog::FogMask;
use crate::vtt::input::Interaction;
use crate::vtt::measure::MeasurementView;
use crate::vtt::roster::Category;
use crate::vtt::transform::{self, Camera, Rect, Size};
use crate::vtt::visibility::{TokenVisibility, ViewRole};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneView {
    pub viewport: Size,
    pub camera: Camera,
    pub player_view: bool,
    pub fullscreen: bool,
    pub measure_mode: bool,
    pub interaction: &'static str,
    pub cursor: Cursor,
    pub map: Option<MapLayer>,
    pub grid: Option<GridLayer>,
    pub tokens: Vec<TokenView>,
    pub fog: FogMask,
    pub measurement: Option<MeasurementView>,
    pub marquee: Option<Rect>,
}

/// The map image stretched over the stage box.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapLayer {
    pub image: String,
    pub rect: Rect,
}

/// Screen x positions of vertical strokes and y positions of horizontal ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridLayer {
    pub opacity: f64,
    pub vertical: Vec<f64>,
    pub horizontal: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenView {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub avatar: String,
    pub rect: Rect,
    pub selected: bool,
    pub active: bool,
    pub dragging: bool,
    pub defeated: bool,
    pub current_hp: Option<i64>,
    pub max_hp: Option<i64>,
    pub visibility: TokenVisibility,
}

impl SceneView {
    pub fn build(engine: &Engine) -> Self {
        let camera = *engine.camera();
        let viewport = engine.viewport();
        let role = engine.role();
        let store = engine.tokens();
        let grid = engine.grid();
        let config = engine.config();

        let map = engine.map().map(|asset| MapLayer {
            image: asset.reference().to_string(),
            rect: transform::world_rect_to_screen(
                &Rect::new(0.0, 0.0, viewport.width, viewport.height),
                &camera,
            ),
        });

        let grid_layer = grid.show.then(|| {
            let lines = grid.lines(&transform::visible_world_rect(viewport, &camera));
            GridLayer {
                opacity: grid.opacity,
                vertical: lines
                    .vertical
                    .iter()
                    .map(|x| x * camera.zoom + camera.pan_x)
                    .collect(),
                horizontal: lines
                    .horizontal
                    .iter()
                    .map(|y| y * camera.zoom + camera.pan_y)
                    .collect(),
            }
        });

        let dragged = store.dragged_ids();
        let tokens = store
            .tokens()
            .iter()
            .filter_map(|token| {
                let visibility = engine.visibility_of(token);
                if !visibility.is_drawn(role) {
                    return None;
                }
                Some(TokenView {
                    id: token.id.clone(),
                    name: token.display_name.clone(),
                    category: token.category,
                    avatar: token.avatar_ref.clone(),
                    rect: transform::world_rect_to_screen(
                        &store.world_rect(token, viewport),
                        &camera,
                    ),
                    selected: store.is_selected(&token.id),
                    active: store.active_id() == Some(token.id.as_str()),
                    dragging: dragged.contains(&token.id.as_str()),
                    defeated: token.defeated,
                    current_hp: token.current_hp,
                    max_hp: token.max_hp,
                    visibility,
                })
            })
            .collect();

        // Players never see through the fog.
        let fog_opacity = match role {
            ViewRole::Player => 1.0,
            ViewRole::Dm => engine.fog().opacity,
        };
        let fog = engine
            .fog()
            .composite_mask(viewport, &camera, grid, fog_opacity);

        let interaction = engine.interaction();
        let measurement = match interaction {
            Interaction::Measuring { measurement, .. } => Some(measurement.view(
                grid,
                &camera,
                config.units_per_cell,
                &config.unit_label,
            )),
            _ => None,
        };
        let marquee = interaction
            .marquee_rect()
            .map(|rect| transform::world_rect_to_screen(&rect, &camera));

        SceneView {
            viewport,
            camera,
            player_view: role == ViewRole::Player,
            fullscreen: engine.is_fullscreen(),
            measure_mode: engine.measure_mode(),
            interaction: interaction.name(),
            cursor: engine.cursor(),
            map,
            grid: grid_layer,
            tokens,
            fog,
            measurement,
            marquee,
        }
    }
}
