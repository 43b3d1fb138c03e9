use anyhow::{Context, Result};
use keyring::Entry;

/// SASL passwords stored in the OS keyring, one entry per bootstrap
/// cluster name.
pub struct KeyringSecretRepository {
    service_name: String,
}

impl KeyringSecretRepository {
    pub fn new(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
        }
    }

    /// `Ok(None)` when no password was ever stored for `cluster_name`.
    pub fn sasl_password(&self, cluster_name: &str) -> Result<Option<String>> {
        let entry = Entry::new(&self.service_name, cluster_name).with_context(|| {
            format!("opening keyring entry {}/{}", self.service_name, cluster_name)
        })?;
        match entry.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("reading SASL password from keyring"),
        }
    }
}
