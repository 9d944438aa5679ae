//! Engine configuration
//!
//! - Generic YAML config loading/saving
//! - Standard config file location
//! - [`EngineConfig`]: pool sizes, queue capacities and pad defaults, read
//!   once before instantiate
//!
//! # Usage
//!
//! ```ignore
//! use padbank_core::config::{default_config_path, load_config, EngineConfig};
//!
//! let config: EngineConfig = load_config(&default_config_path());
//! ```

mod engine;
mod io;
mod paths;

pub use engine::EngineConfig;
pub use io::{load_config, read_config, save_config};
pub use paths::{default_config_dir, default_config_path};
