//! Pool configuration: TOML file or environment, with `PUMICE_*` overrides.
//!
//! Split into focused submodules:
//! - `types`: config structs and their serde defaults
//! - `loading`: TOML/env loading and environment overrides
//! - `validation`: sanity checks run after loading
//! - `helpers`: core-count detection and worker binary discovery

mod helpers;
mod loading;
mod types;
mod validation;

pub use helpers::{detect_logical_cores, FALLBACK_CONCURRENCY};
pub use loading::load_dotenv;
pub use types::{PoolConfig, WorkerCommand};
