//! Engine instance held by the WASM bridge.
//!
//! Uses `thread_local!` + `RefCell` for safe mutable access in single-threaded
//! WASM. The Web Worker keeps the module alive, so the engine persists across
//! `handle_request` calls for the whole page session. Nothing in the engine
//! itself reads this; only route handlers do.

use std::cell::RefCell;

use crate::vtt::engine::Engine;

thread_local! {
    static ENGINE: RefCell<Engine> = RefCell::new(Engine::default());
}

/// Execute a closure with read access to the engine.
pub fn with_engine<F, R>(f: F) -> R
where
    F: FnOnce(&Engine) -> R,
{
    ENGINE.with(|e| f(&e.borrow()))
}

/// Execute a closure with mutable access to the engine.
pub fn with_engine_mut<F, R>(f: F) -> R
where
    F: FnOnce(&mut Engine) -> R,
{
    ENGINE.with(|e| f(&mut e.borrow_mut()))
}

/// Back to a fresh default engine between bridge tests.
#[cfg(test)]
pub fn reset_engine() {
    ENGINE.with(|e| {
        *e.borrow_mut() = Engine::default();
    });
}
