// Re-export all items from the submodules
mod env_vars;
mod uploader_config;

// Re-export uploader config
pub use uploader_config::{load_or_default, Protocol, UploaderConfig};

// Re-export environment variable functions
pub use env_vars::{expand_env_vars, resolve_run_id, resolve_run_id_with};
