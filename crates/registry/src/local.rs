//! Registry stored beside a local tracking store
//!
//! Versions live in a sled database under `<tracking root>/registry`, or in
//! memory when no database is opened. Keys:
//! `latest_version:<name>` holds the newest version as big-endian u64,
//! `model_version:<name>:<version>` holds the JSON [`ModelVersion`].

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use taxi_duration_tracking::{FileTrackingStore, TrackingStore};

use crate::errors::{RegistryError, Result};
use crate::types::{ModelUri, ModelVersion};
use crate::{check_model_name, ModelRegistry};

/// Directory under the tracking root holding the registry database
pub const REGISTRY_DIR: &str = "registry";

const LATEST_PREFIX: &str = "latest_version:";
const VERSION_PREFIX: &str = "model_version:";

/// Registry backed by sled (or memory) that checks sources in a file store
pub struct LocalRegistry {
    store: FileTrackingStore,
    db: Option<sled::Db>,
    cache: RwLock<HashMap<String, Vec<u8>>>,
}

impl LocalRegistry {
    /// Open the persistent registry of the tracking store at `tracking_root`
    pub fn open<P: AsRef<Path>>(tracking_root: P) -> Result<Self> {
        let store = FileTrackingStore::open(tracking_root)?;
        let db = sled::open(store.root().join(REGISTRY_DIR))?;
        tracing::debug!(root = %store.root().display(), "Opened local model registry");
        Ok(Self {
            store,
            db: Some(db),
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Registry that forgets its versions when dropped
    pub fn in_memory(store: FileTrackingStore) -> Self {
        Self {
            store,
            db: None,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// All versions of `name`, oldest first
    pub fn versions(&self, name: &str) -> Result<Vec<ModelVersion>> {
        let prefix = format!("{VERSION_PREFIX}{name}:");
        let mut versions = Vec::new();

        if let Some(ref db) = self.db {
            for item in db.scan_prefix(prefix.as_bytes()) {
                let (_, value) = item?;
                versions.push(serde_json::from_slice::<ModelVersion>(&value)?);
            }
        } else {
            let cache = self.cache.read();
            for (key, value) in cache.iter() {
                if key.starts_with(&prefix) {
                    versions.push(serde_json::from_slice::<ModelVersion>(value)?);
                }
            }
        }

        versions.sort_by_key(|v| v.version);
        Ok(versions)
    }

    /// Newest version of `name`, if any was registered
    pub fn latest_version(&self, name: &str) -> Result<Option<ModelVersion>> {
        let cache = self.cache.read();
        let Some(latest) = self.latest(&cache, name)? else {
            return Ok(None);
        };
        match self.get(&cache, &version_key(name, latest))? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Err(RegistryError::Database(format!(
                "version {latest} of {name} is missing"
            ))),
        }
    }

    fn check_source(&self, uri: &ModelUri) -> Result<()> {
        self.store.get_run(&uri.run_id)?;
        if !self.store.artifact_exists(&uri.run_id, &uri.artifact_path)? {
            return Err(RegistryError::ArtifactNotFound {
                run_id: uri.run_id.clone(),
                artifact_path: uri.artifact_path.clone(),
            });
        }
        Ok(())
    }

    fn latest(&self, cache: &HashMap<String, Vec<u8>>, name: &str) -> Result<Option<u64>> {
        let Some(data) = self.get(cache, &format!("{LATEST_PREFIX}{name}"))? else {
            return Ok(None);
        };
        let bytes: [u8; 8] = data.as_slice().try_into().map_err(|_| {
            RegistryError::Database(format!("corrupt version counter for {name}"))
        })?;
        Ok(Some(u64::from_be_bytes(bytes)))
    }

    fn get(&self, cache: &HashMap<String, Vec<u8>>, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(ref db) = self.db {
            Ok(db.get(key.as_bytes())?.map(|v| v.to_vec()))
        } else {
            Ok(cache.get(key).cloned())
        }
    }

    fn put(&self, cache: &mut HashMap<String, Vec<u8>>, key: String, data: Vec<u8>) -> Result<()> {
        if let Some(ref db) = self.db {
            db.insert(key.as_bytes(), data)?;
        } else {
            cache.insert(key, data);
        }
        Ok(())
    }
}

impl ModelRegistry for LocalRegistry {
    fn register_model(&self, uri: &ModelUri, name: &str) -> Result<ModelVersion> {
        check_model_name(name)?;
        self.check_source(uri)?;

        // The write lock serializes version assignment within the process
        let mut cache = self.cache.write();
        let version = self.latest(&cache, name)?.unwrap_or(0) + 1;
        let registered = ModelVersion {
            name: name.to_string(),
            version,
            source: uri.to_string(),
            run_id: uri.run_id.clone(),
            creation_timestamp: chrono::Utc::now().timestamp_millis(),
        };

        self.put(
            &mut cache,
            version_key(name, version),
            serde_json::to_vec(&registered)?,
        )?;
        self.put(
            &mut cache,
            format!("{LATEST_PREFIX}{name}"),
            version.to_be_bytes().to_vec(),
        )?;
        if let Some(ref db) = self.db {
            db.flush()?;
        }

        tracing::info!(name, version, source = %registered.source, "Registered model version");
        Ok(registered)
    }
}

fn version_key(name: &str, version: u64) -> String {
    format!("{VERSION_PREFIX}{name}:{version:020}")
}
