//! Module lifecycle, layered settings, and the registry that wires them together.

pub mod module;
pub mod registry;
pub mod settings;

pub use module::{InitCtx, Module};
pub use registry::ModuleRegistry;
