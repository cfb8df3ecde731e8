//! Kernel of the Livros service: module contract, lifecycle registry, and settings.

pub mod module;
pub mod registry;
pub mod settings;

pub use module::{InitCtx, Migration, Module};
pub use registry::ModuleRegistry;
