//! VTT spatial engine.
//!
//! Leaf modules first: `transform`, `camera`, `grid`, `tokens`, `fog`,
//! `measure`. `engine` owns one of each and routes input to them; `view`
//! projects the result into screen space for the renderer. `state` is the
//! single thread-local instance used by the WASM bridge.

pub mod bundle;
pub mod camera;
pub mod config;
pub mod engine;
pub mod error;
pub mod fog;
pub mod grid;
pub mod input;
pub mod map;
pub mod measure;
pub mod roster;
pub mod state;
pub mod tokens;
pub mod transform;
pub mod view;
pub mod visibility;
