//! Runtime for the `cmdhost` binary.
//!
//! Wires argument parsing, provider initialization, command loading and
//! routing into one invocation with a single cleanup path.

pub mod cli_runtime;
pub mod core_actions;
pub mod providers;
pub mod runtime_config;

pub use cli_runtime::{package_info, render_output, CliRuntime};
pub use core_actions::register_core_actions;
pub use providers::{
    initialize_providers, Provider, ProvidedModule, ServerInstallation, ServerProvider,
    LOCATION_MARKER_FILE, NOT_INSTALLED_WARNING_MARKER, SERVER_MODULE,
};
pub use runtime_config::RuntimeConfig;
