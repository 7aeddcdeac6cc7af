//! Library circulation service.
//!
//! The domain lives in [`circulation`]; [`modules`] exposes it over HTTP as
//! kernel modules, and [`app`] wires those modules into a registry.

pub mod app;
pub mod circulation;
pub mod modules;
pub mod state;
pub mod utils;

pub use circulation::Library;
pub use state::AppState;
