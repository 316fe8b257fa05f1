use fastly::kv_store::{InsertMode, KVStore, KVStoreError};
use fastly::SecretStore;

use error_stack::{Report, ResultExt};

use crate::constants::{DIGEST_INDEX_KEY_PREFIX, RECORD_KEY_PREFIX};
use crate::error::TrustCenterError;
use crate::models::{IssuanceRecord, Keyspec};
use crate::storage::IssuanceStore;

pub struct FastlySecretStore {
    store_name: String,
}

impl FastlySecretStore {
    pub fn new(store_name: impl Into<String>) -> Self {
        Self {
            store_name: store_name.into(),
        }
    }

    /// Retrieves a secret value from the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret store cannot be opened, the key is not found,
    /// or the secret plaintext cannot be retrieved.
    pub fn get(&self, key: &str) -> Result<Vec<u8>, Report<TrustCenterError>> {
        let store = SecretStore::open(&self.store_name).map_err(|_| {
            Report::new(TrustCenterError::Configuration {
                message: format!("Failed to open SecretStore '{}'", self.store_name),
            })
        })?;

        let secret = store.get(key).ok_or_else(|| {
            Report::new(TrustCenterError::Configuration {
                message: format!(
                    "Secret '{}' not found in secret store '{}'",
                    key, self.store_name
                ),
            })
        })?;

        secret
            .try_plaintext()
            .map_err(|_| {
                Report::new(TrustCenterError::Configuration {
                    message: "Failed to get secret plaintext".into(),
                })
            })
            .map(|bytes| bytes.into_iter().collect())
    }
}

/// Key of the record document for `issued_id`.
#[must_use]
pub fn record_key(issued_id: &str) -> String {
    format!("{RECORD_KEY_PREFIX}{issued_id}")
}

/// Key of the digest index entry pointing at the record issued for `(digest, keyspec)`.
#[must_use]
pub fn digest_index_key(digest: &str, keyspec: Keyspec) -> String {
    format!(
        "{DIGEST_INDEX_KEY_PREFIX}{}/{}",
        digest.to_ascii_lowercase(),
        keyspec
    )
}

/// Issuance records in a Fastly KV Store.
///
/// Each record is stored as JSON under `issue/<issued_id>`. A digest index entry
/// `digest/<digest>/<keyspec>` holds the `issued_id` of the record issued for that pair. Both
/// keys are written in add-only mode, so the KV store rejects a second issuance for the same
/// `(digest, keyspec)` or `issued_id` even when two requests pass the duplicate guard together.
pub struct FastlyKvIssuanceStore {
    store_name: String,
}

impl FastlyKvIssuanceStore {
    pub fn new(store_name: impl Into<String>) -> Self {
        Self {
            store_name: store_name.into(),
        }
    }

    fn open(&self) -> Result<KVStore, Report<TrustCenterError>> {
        match KVStore::open(&self.store_name) {
            Ok(Some(store)) => Ok(store),
            Ok(None) => Err(Report::new(TrustCenterError::Storage {
                message: format!("KV store '{}' not found", self.store_name),
            })),
            Err(e) => Err(Report::new(TrustCenterError::Storage {
                message: format!("Failed to open KV store '{}': {e}", self.store_name),
            })),
        }
    }

    fn lookup_string(
        store: &KVStore,
        key: &str,
    ) -> Result<Option<String>, Report<TrustCenterError>> {
        match store.lookup(key) {
            Ok(mut response) => String::from_utf8(response.take_body_bytes())
                .map(Some)
                .change_context(TrustCenterError::Storage {
                    message: format!("Value of '{key}' is not valid UTF-8"),
                }),
            Err(KVStoreError::ItemNotFound) => Ok(None),
            Err(e) => Err(Report::new(TrustCenterError::Storage {
                message: format!("Failed to look up '{key}': {e}"),
            })),
        }
    }

    fn add(store: &KVStore, key: &str, value: String) -> Result<(), Report<TrustCenterError>> {
        match store.build_insert().mode(InsertMode::Add).execute(key, value) {
            Ok(()) => Ok(()),
            Err(KVStoreError::ItemPreconditionFailed) => Err(Report::new(
                TrustCenterError::conflict(format!("'{key}' already exists")),
            )),
            Err(e) => Err(Report::new(TrustCenterError::Storage {
                message: format!("Failed to insert '{key}': {e}"),
            })),
        }
    }

    fn read_record(
        store: &KVStore,
        issued_id: &str,
    ) -> Result<Option<IssuanceRecord>, Report<TrustCenterError>> {
        let Some(json) = Self::lookup_string(store, &record_key(issued_id))? else {
            return Ok(None);
        };

        serde_json::from_str(&json)
            .map(Some)
            .change_context(TrustCenterError::Storage {
                message: format!("Failed to parse record '{issued_id}'"),
            })
    }
}

impl IssuanceStore for FastlyKvIssuanceStore {
    fn insert(&self, record: &IssuanceRecord) -> Result<String, Report<TrustCenterError>> {
        let store = self.open()?;
        let json = serde_json::to_string(record).change_context(TrustCenterError::Storage {
            message: "Failed to serialize record".into(),
        })?;

        let index_key = digest_index_key(&record.digest, record.keyspec);
        Self::add(&store, &index_key, record.issued_id.clone())?;

        if let Err(report) = Self::add(&store, &record_key(&record.issued_id), json) {
            if let Err(e) = store.delete(&index_key) {
                log::warn!("Failed to release index entry '{}': {}", index_key, e);
            }
            return Err(report);
        }

        Ok(record.issued_id.clone())
    }

    fn find_by_digest(&self, digest: &str) -> Result<Vec<IssuanceRecord>, Report<TrustCenterError>> {
        let store = self.open()?;
        let mut records = Vec::new();

        for keyspec in Keyspec::ALL {
            let Some(issued_id) = Self::lookup_string(&store, &digest_index_key(digest, keyspec))?
            else {
                continue;
            };
            match Self::read_record(&store, &issued_id)? {
                Some(record) => records.push(record),
                None => log::warn!(
                    "Index entry for {} under {} points at missing record {}",
                    digest,
                    keyspec,
                    issued_id
                ),
            }
        }

        Ok(records)
    }

    fn find_by_id(&self, issued_id: &str) -> Result<Option<IssuanceRecord>, Report<TrustCenterError>> {
        let store = self.open()?;
        Self::read_record(&store, issued_id)
    }
}
