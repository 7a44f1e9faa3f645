//! Provider-key vault
//!
//! Maps a caller to the provider key that should be presented upstream on
//! its behalf, so callers can authenticate with a gateway credential only.

use crate::domain::CallerIdentity;
use crate::kv::{KvError, KvStore};
use bytes::Bytes;
use std::sync::Arc;

#[derive(Clone)]
pub struct ProviderKeyVault {
    store: Arc<dyn KvStore>,
}

impl ProviderKeyVault {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn provider_key(&self, caller: &CallerIdentity) -> Result<Option<String>, KvError> {
        match self.store.get(&vault_key(caller)).await? {
            Some(raw) => {
                let key = String::from_utf8(raw.to_vec())
                    .map_err(|e| KvError::Codec(format!("vault entry: {e}")))?;
                Ok(Some(key.trim().to_string()).filter(|key| !key.is_empty()))
            }
            None => Ok(None),
        }
    }

    pub async fn store_provider_key(
        &self,
        caller: &CallerIdentity,
        provider_key: &str,
    ) -> Result<(), KvError> {
        self.store
            .put(
                &vault_key(caller),
                Bytes::from(provider_key.to_string()),
                None,
            )
            .await
    }
}

fn vault_key(caller: &CallerIdentity) -> String {
    format!("vault:{caller}")
}
