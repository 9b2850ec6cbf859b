pub mod local;
pub mod s3;
pub mod sigv4;
mod xml;

use stratus_common::{ObjectStore, Result};

use crate::config::BackendConfig;

use self::local::LocalAdapter;
use self::s3::S3Adapter;

/// Construct the configured backend. This is the only place that knows which
/// concrete store sits behind the [`ObjectStore`] trait.
pub fn from_config(config: &BackendConfig) -> Result<Box<dyn ObjectStore>> {
    let store: Box<dyn ObjectStore> = match config {
        BackendConfig::Local(local) => Box::new(LocalAdapter::new(local.clone())?),
        BackendConfig::S3(s3) => Box::new(S3Adapter::new(s3.clone())?),
    };
    tracing::debug!(backend = store.name(), "Object store constructed");
    Ok(store)
}
