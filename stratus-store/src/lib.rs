//! Object storage over a local directory tree or an S3-compatible service,
//! behind the [`stratus_common::ObjectStore`] trait.

pub mod backend;
pub mod config;

pub use backend::from_config;
pub use config::{BackendConfig, StoreConfig};
