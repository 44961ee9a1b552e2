//! Plugin system.
//!
//! Add a built-in plugin by:
//! 1. Creating a new file in this directory exposing `unit()`
//! 2. Adding `mod your_plugin;` below
//! 3. Adding it to `builtin_units()`
//!
//! Plugins outside the binary are TOML manifests under `PLUGIN_DIR`
//! (see [`loader`]).

mod descriptor;
pub mod loader;
mod registry;
pub mod watcher;

mod log;
mod menu;
mod ping;
mod prefix;
mod rvo;
mod timer;

use thiserror::Error;

pub use descriptor::{Plugin, PluginKind};
pub use loader::{PluginUnit, load_dir};
pub use registry::Registry;

/// Errors raised while building or loading plugins.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin has no exec action")]
    MissingExec,

    #[error("plugin command list is empty")]
    EmptyCommand,

    #[error("{location}: invalid manifest: {source}")]
    Manifest {
        location: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("{location}: {reason}")]
    Invalid { location: String, reason: String },

    #[error("{location}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },
}

/// Units compiled into the binary.
pub fn builtin_units() -> Result<Vec<PluginUnit>, PluginError> {
    Ok(vec![
        log::unit()?,
        ping::unit()?,
        menu::unit()?,
        prefix::unit()?,
        timer::unit()?,
        rvo::unit()?,
    ])
}
