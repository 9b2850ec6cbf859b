use serde::Deserialize;
use std::path::Path;

use crate::backend::local::LocalConfig;
use crate::backend::s3::S3Config;

#[derive(Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: BackendConfig,
}

#[derive(Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Local(LocalConfig),
    S3(S3Config),
}

impl StoreConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        Self::parse(&content).map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: StoreConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        match &self.backend {
            BackendConfig::Local(local) => {
                if local.store_path.as_os_str().is_empty() {
                    anyhow::bail!("store_path must not be empty");
                }
                if let Some(tmp) = &local.tmp_path {
                    if tmp.as_os_str().is_empty() {
                        anyhow::bail!("tmp_path must not be empty when set");
                    }
                }
            }
            BackendConfig::S3(s3) => {
                if s3.bucket.is_empty() {
                    anyhow::bail!("bucket must not be empty");
                }
                if s3.access_key_id.is_empty() {
                    anyhow::bail!("access_key_id must not be empty");
                }
                if s3.secret_access_key.is_empty() {
                    anyhow::bail!("secret_access_key must not be empty");
                }
                for (name, url) in [("endpoint", &s3.endpoint), ("endpoint_alias", &s3.endpoint_alias)] {
                    if let Some(url) = url {
                        if !url.starts_with("http://") && !url.starts_with("https://") {
                            anyhow::bail!("{} must start with http:// or https://: {}", name, url);
                        }
                    }
                }
                if s3.timeout_secs == 0 {
                    anyhow::bail!("timeout_secs must be greater than zero");
                }
            }
        }
        Ok(())
    }
}
