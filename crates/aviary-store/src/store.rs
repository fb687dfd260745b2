//! JSON-backed record store with per-collection locking.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use aviary_core::write_text_atomic;

use crate::records::{BotRecord, LinkRecord, PlayerRecord, TenantRecord};

const TENANTS_FILE: &str = "tenants.json";
const BOTS_FILE: &str = "bots.json";
const PLAYERS_FILE: &str = "players.json";
const LINKS_FILE: &str = "links.json";

/// Per-collection corruption events recovered during loads.
///
/// An entry means the named collection's file was present but unparseable
/// and the store served it as empty; "recovered empty" stays
/// distinguishable from a legitimately empty collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreHealthReport {
    pub corrupt_collections: BTreeMap<String, String>,
}

/// Durable mapping of the four record collections to JSON files.
///
/// Each collection is guarded by its own mutex; every mutation runs as a
/// closure inside `update_*`, which holds the lock across the full
/// load-modify-replace sequence. Replaces are atomic (temp file + rename),
/// so readers never observe a partially updated collection.
pub struct RecordStore {
    database_dir: PathBuf,
    tenants_lock: Mutex<()>,
    bots_lock: Mutex<()>,
    players_lock: Mutex<()>,
    links_lock: Mutex<()>,
    health: Mutex<BTreeMap<String, String>>,
}

impl RecordStore {
    pub fn new(database_dir: impl Into<PathBuf>) -> Self {
        Self {
            database_dir: database_dir.into(),
            tenants_lock: Mutex::new(()),
            bots_lock: Mutex::new(()),
            players_lock: Mutex::new(()),
            links_lock: Mutex::new(()),
            health: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn database_dir(&self) -> &Path {
        &self.database_dir
    }

    pub fn load_tenants(&self) -> Vec<TenantRecord> {
        let _guard = lock_or_recover(&self.tenants_lock);
        self.load_collection("tenants", TENANTS_FILE)
    }

    pub fn update_tenants<R>(&self, mutate: impl FnOnce(&mut Vec<TenantRecord>) -> R) -> Result<R> {
        let _guard = lock_or_recover(&self.tenants_lock);
        self.update_collection("tenants", TENANTS_FILE, mutate)
    }

    pub fn load_bots(&self) -> Vec<BotRecord> {
        let _guard = lock_or_recover(&self.bots_lock);
        self.load_collection("bots", BOTS_FILE)
    }

    pub fn update_bots<R>(&self, mutate: impl FnOnce(&mut Vec<BotRecord>) -> R) -> Result<R> {
        let _guard = lock_or_recover(&self.bots_lock);
        self.update_collection("bots", BOTS_FILE, mutate)
    }

    pub fn load_players(&self) -> Vec<PlayerRecord> {
        let _guard = lock_or_recover(&self.players_lock);
        self.load_collection("players", PLAYERS_FILE)
    }

    pub fn update_players<R>(&self, mutate: impl FnOnce(&mut Vec<PlayerRecord>) -> R) -> Result<R> {
        let _guard = lock_or_recover(&self.players_lock);
        self.update_collection("players", PLAYERS_FILE, mutate)
    }

    pub fn load_links(&self) -> Vec<LinkRecord> {
        let _guard = lock_or_recover(&self.links_lock);
        self.load_collection("links", LINKS_FILE)
    }

    pub fn update_links<R>(&self, mutate: impl FnOnce(&mut Vec<LinkRecord>) -> R) -> Result<R> {
        let _guard = lock_or_recover(&self.links_lock);
        self.update_collection("links", LINKS_FILE, mutate)
    }

    pub fn health_report(&self) -> StoreHealthReport {
        StoreHealthReport {
            corrupt_collections: lock_or_recover(&self.health).clone(),
        }
    }

    fn collection_path(&self, file_name: &str) -> PathBuf {
        self.database_dir.join(file_name)
    }

    /// Loads a collection; absent or unparseable data yields an empty vec.
    ///
    /// Caller must hold the collection's lock.
    fn load_collection<T: DeserializeOwned>(&self, name: &str, file_name: &str) -> Vec<T> {
        let path = self.collection_path(file_name);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(error) => {
                tracing::warn!(
                    collection = name,
                    path = %path.display(),
                    %error,
                    "failed to read collection; serving it empty"
                );
                self.record_corruption(name, format!("read failed: {error}"));
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<T>>(&raw) {
            Ok(records) => records,
            Err(error) => {
                tracing::warn!(
                    collection = name,
                    path = %path.display(),
                    %error,
                    "collection file is unparseable; serving it empty"
                );
                self.record_corruption(name, format!("parse failed: {error}"));
                Vec::new()
            }
        }
    }

    /// Whole-collection overwrite via temp file + rename.
    ///
    /// Caller must hold the collection's lock.
    fn replace_collection<T: Serialize>(&self, name: &str, file_name: &str, records: &[T]) -> Result<()> {
        let payload = serde_json::to_string_pretty(records)
            .with_context(|| format!("failed to serialize {name} collection"))?;
        write_text_atomic(&self.collection_path(file_name), payload.as_str())
            .with_context(|| format!("failed to persist {name} collection"))
    }

    fn update_collection<T, R>(
        &self,
        name: &str,
        file_name: &str,
        mutate: impl FnOnce(&mut Vec<T>) -> R,
    ) -> Result<R>
    where
        T: DeserializeOwned + Serialize,
    {
        let mut records = self.load_collection::<T>(name, file_name);
        let outcome = mutate(&mut records);
        self.replace_collection(name, file_name, &records)?;
        Ok(outcome)
    }

    fn record_corruption(&self, name: &str, message: String) {
        lock_or_recover(&self.health).insert(name.to_string(), message);
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
