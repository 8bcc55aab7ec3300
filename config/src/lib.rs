//! Configuration loading and shared configuration types for the sync merge services.
//!
//! Services describe their configuration as a [`serde::Deserialize`] struct implementing
//! [`Config`] and load it with [`load_config`], which layers a base file, an environment
//! specific file and `APP_`-prefixed environment variables.

mod environment;
mod load;
pub mod shared;

pub use environment::*;
pub use load::*;
