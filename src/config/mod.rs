//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (deployment manifests fill registry / guard)
//!     → validation.rs (semantic checks)
//!     → SentinelConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Private keys never live in the file; they come from the environment

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError, Deployments};
pub use schema::{ChainConfig, SentinelConfig};
pub use validation::ValidationError;
