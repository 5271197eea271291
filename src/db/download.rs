use anyhow::{anyhow, Context as _, Result};
use std::collections::BTreeMap;

use super::{
    identifier::JobId,
    payment::{BunqAccountId, RawPayment},
    store::KeyValueStore,
};

/// Downloaded payments, grouped by the bunq account they were downloaded from
pub type Download = BTreeMap<BunqAccountId, Vec<RawPayment>>;

pub struct DownloadStore<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> DownloadStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn has(&self, identifier: &JobId) -> Result<bool> {
        self.store.exists(identifier.as_str()).await
    }

    pub async fn get(&self, identifier: &JobId) -> Result<Download> {
        let content = self
            .get_raw(identifier)
            .await?
            .ok_or_else(|| anyhow!("No download stored for job \"{identifier}\""))?;
        serde_json::from_slice(&content)
            .with_context(|| anyhow!("Download of job \"{identifier}\" is corrupted"))
    }

    pub async fn get_raw(&self, identifier: &JobId) -> Result<Option<Vec<u8>>> {
        self.store.get(identifier.as_str()).await
    }

    pub async fn put(&self, identifier: &JobId, download: &Download) -> Result<()> {
        log::info!("Storing download of job \"{identifier}\"...");
        let content = serde_json::to_vec(download)?;
        self.store.put(identifier.as_str(), &content).await?;
        log::info!("Storing download of job \"{identifier}\"...done");
        Ok(())
    }
}
