//! Scarlett Isles VTT spatial engine, compiled to WASM.
//!
//! Exports `handle_request(method, path, query, body)` for the Web Worker
//! bridge to call. Uses `matchit` for URL routing, the same router engine
//! that powers Axum. Responses are JSON: mutations return the effects the
//! host must apply (persist, render, cursor, warnings), reads return the
//! scene model or the stored bundles.

use wasm_bindgen::prelude::*;

pub mod routes;
pub mod vtt;

use routes::util::error_response;
use routes::vtt::PointerPhase;

/// Install the panic hook and route `tracing` output to the browser console.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    tracing_wasm::set_as_global_default();
}

/// Process an HTTP-like request and return a JSON body.
///
/// Called from JavaScript (Web Worker) via wasm-bindgen.
///
/// # Arguments
/// * `method`: HTTP method ("GET" or "POST")
/// * `path`:   URL path (e.g., "/api/vtt/pointer/down")
/// * `query`:  Query string (e.g., "?source=storage")
/// * `body`:   Request body. Empty string for GET requests.
#[wasm_bindgen]
pub fn handle_request(method: &str, path: &str, query: &str, body: &str) -> String {
    // Build the router. matchit compiles route patterns into a radix tree.
    let mut router = matchit::Router::new();

    router.insert("/api/vtt/scene", "scene").ok();
    router.insert("/api/vtt/bundle", "bundle").ok();
    router.insert("/api/vtt/roster", "roster").ok();
    router.insert("/api/vtt/viewport", "viewport").ok();
    router.insert("/api/vtt/pointer/{phase}", "pointer").ok();
    router.insert("/api/vtt/wheel", "wheel").ok();
    router.insert("/api/vtt/key/{state}", "key").ok();
    router.insert("/api/vtt/tool", "tool").ok();
    router.insert("/api/vtt/grid", "grid").ok();
    router.insert("/api/vtt/fog", "fog").ok();
    router.insert("/api/vtt/visibility", "visibility").ok();
    router.insert("/api/vtt/map", "map").ok();
    router.insert("/api/vtt/config", "config").ok();
    router.insert("/api/vtt/host/warning", "host_warning").ok();

    match router.at(path) {
        Ok(matched) => match (*matched.value, method) {
            // Reads
            ("scene", "GET") => routes::vtt::handle_scene_get(query),
            ("bundle", "GET") => routes::vtt::handle_bundle_get(query),
            ("map", "GET") => routes::vtt::handle_map_get(query),

            // Host-driven state
            ("bundle", "POST") => routes::vtt::handle_bundle_post(body),
            ("roster", "POST") => routes::vtt::handle_roster_post(body),
            ("viewport", "POST") => routes::vtt::handle_viewport_post(body),
            ("config", "POST") => routes::vtt::handle_config_post(body),
            ("host_warning", "POST") => routes::vtt::handle_host_warning_post(body),

            // Input
            ("pointer", "POST") => match matched.params.get("phase") {
                Some("down") => routes::vtt::handle_pointer_post(PointerPhase::Down, body),
                Some("move") => routes::vtt::handle_pointer_post(PointerPhase::Move, body),
                Some("up") => routes::vtt::handle_pointer_post(PointerPhase::Up, body),
                Some("cancel") => routes::vtt::handle_pointer_cancel_post(body),
                _ => not_found(),
            },
            ("wheel", "POST") => routes::vtt::handle_wheel_post(body),
            ("key", "POST") => match matched.params.get("state") {
                Some("down") => routes::vtt::handle_key_post(true, body),
                Some("up") => routes::vtt::handle_key_post(false, body),
                _ => not_found(),
            },

            // Tools and settings
            ("tool", "POST") => routes::vtt::handle_tool_post(body),
            ("grid", "POST") => routes::vtt::handle_grid_post(body),
            ("fog", "POST") => routes::vtt::handle_fog_post(body),
            ("visibility", "POST") => routes::vtt::handle_visibility_post(body),
            ("map", "POST") => routes::vtt::handle_map_post(query, body),

            _ => method_not_allowed(),
        },
        Err(_) => not_found(),
    }
}

fn not_found() -> String {
    error_response("404: route not found")
}

fn method_not_allowed() -> String {
    error_response("405: method not allowed")
}
