//! Built-in media and text modules.

mod clean_text;
mod extract_audio;
pub mod process;
mod split;

use std::sync::Arc;

use crate::engine::error::RegistryError;
use crate::modules::ModuleRegistry;

pub use clean_text::{CleanOptions, CleanTextModule, clean_text};
pub use extract_audio::ExtractAudioModule;
pub use split::SplitModule;

/// Register every built-in module with `registry`.
pub fn register_all(registry: &ModuleRegistry) -> Result<(), RegistryError> {
    registry.register(Arc::new(ExtractAudioModule))?;
    registry.register(Arc::new(SplitModule))?;
    registry.register(Arc::new(CleanTextModule))?;
    Ok(())
}
