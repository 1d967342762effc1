//! File-backed watchlist and cursor store.
//!
//! # Responsibilities
//! - Keep `watchlist.json` (`{"<chainId>": [WatchItem]}`) and `cursor.json`
//!   (`{"<chainId>": CursorState}`)
//! - Write atomically: temp file in the same directory, then rename
//! - Treat unreadable documents as absent so the worker heals itself
//!
//! # Design Decisions
//! - Read-modify-write sequences are serialised within the process only;
//!   two processes sharing the directory can still race
//! - Cursors never move backwards

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::Address;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::schema::StateConfig;
use crate::state::types::{CursorState, WatchItem};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    pub fn kind(&self) -> &'static str {
        "StateError"
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

type Watchlist = BTreeMap<String, Vec<WatchItem>>;
type Cursors = BTreeMap<String, CursorState>;

/// Durable per-chain watchlist and cursor.
#[derive(Debug, Clone)]
pub struct StateStore {
    watchlist_path: PathBuf,
    cursor_path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl StateStore {
    pub fn new(watchlist_path: impl Into<PathBuf>, cursor_path: impl Into<PathBuf>) -> Self {
        Self {
            watchlist_path: watchlist_path.into(),
            cursor_path: cursor_path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_config(config: &StateConfig) -> Self {
        Self::new(config.watchlist_path(), config.cursor_path())
    }

    /// Store rooted at `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join("watchlist.json"), dir.join("cursor.json"))
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The guarded data is `()`, so a poisoned lock carries no broken state.
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Watch `wallet` from `start_block`, replacing any prior entry for it.
    pub fn add_watch(&self, chain_id: u64, wallet: Address, start_block: u64) -> StoreResult<WatchItem> {
        let _guard = self.guard();
        let mut watchlist = self.load_watchlist()?;
        let items = watchlist.entry(chain_id.to_string()).or_default();
        items.retain(|item| item.wallet != wallet);

        let item = WatchItem::new(wallet, start_block);
        items.push(item.clone());
        write_atomic(&self.watchlist_path, &watchlist)?;

        tracing::info!(chain_id, wallet = %wallet, start_block, "Wallet added to watchlist");
        Ok(item)
    }

    /// Returns whether an entry was removed.
    pub fn remove_watch(&self, chain_id: u64, wallet: Address) -> StoreResult<bool> {
        let _guard = self.guard();
        let mut watchlist = self.load_watchlist()?;
        let items = watchlist.entry(chain_id.to_string()).or_default();
        let before = items.len();
        items.retain(|item| item.wallet != wallet);
        let removed = items.len() != before;
        write_atomic(&self.watchlist_path, &watchlist)?;

        if removed {
            tracing::info!(chain_id, wallet = %wallet, "Wallet removed from watchlist");
        }
        Ok(removed)
    }

    pub fn list_watch(&self, chain_id: u64) -> StoreResult<Vec<WatchItem>> {
        let mut watchlist = self.load_watchlist()?;
        Ok(watchlist.remove(&chain_id.to_string()).unwrap_or_default())
    }

    pub fn get_cursor(&self, chain_id: u64) -> StoreResult<Option<CursorState>> {
        let mut cursors = self.load_cursors()?;
        Ok(cursors.remove(&chain_id.to_string()))
    }

    /// Advance the cursor to `block`. A lower `block` leaves the stored
    /// cursor in place; the effective cursor is returned either way.
    pub fn set_cursor(&self, chain_id: u64, block: u64) -> StoreResult<CursorState> {
        let _guard = self.guard();
        let mut cursors = self.load_cursors()?;
        let key = chain_id.to_string();

        if let Some(existing) = cursors.get(&key) {
            if existing.last_processed_block > block {
                tracing::warn!(
                    chain_id,
                    current = existing.last_processed_block,
                    requested = block,
                    "Refusing to move cursor backwards"
                );
                return Ok(*existing);
            }
        }

        let state = CursorState::at(block);
        cursors.insert(key, state);
        write_atomic(&self.cursor_path, &cursors)?;
        Ok(state)
    }

    fn load_watchlist(&self) -> StoreResult<Watchlist> {
        let Some(root) = read_document(&self.watchlist_path)? else {
            return Ok(Watchlist::new());
        };

        let mut watchlist = Watchlist::new();
        for (chain, items) in root {
            let Value::Array(items) = items else {
                tracing::warn!(path = %self.watchlist_path.display(), chain = %chain, "Skipping non-list watchlist entry");
                continue;
            };
            let parsed = items
                .into_iter()
                .filter_map(|item| parse_entry::<WatchItem>(&self.watchlist_path, &chain, item))
                .collect();
            watchlist.insert(chain, parsed);
        }
        Ok(watchlist)
    }

    fn load_cursors(&self) -> StoreResult<Cursors> {
        let Some(root) = read_document(&self.cursor_path)? else {
            return Ok(Cursors::new());
        };

        Ok(root
            .into_iter()
            .filter_map(|(chain, value)| {
                parse_entry::<CursorState>(&self.cursor_path, &chain, value).map(|state| (chain, state))
            })
            .collect())
    }
}

/// Top-level JSON object, or `None` when missing or corrupt.
fn read_document(path: &Path) -> StoreResult<Option<serde_json::Map<String, Value>>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(_) => {
            tracing::warn!(path = %path.display(), "State document is not an object; treating as absent");
            Ok(None)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "State document unreadable; treating as absent");
            Ok(None)
        }
    }
}

fn parse_entry<T: DeserializeOwned>(path: &Path, chain: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(entry) => Some(entry),
        Err(e) => {
            tracing::warn!(path = %path.display(), chain = %chain, error = %e, "Skipping malformed state entry");
            None
        }
    }
}

/// Serialize to `<path>.tmp` and rename over `path`.
fn write_atomic<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }

    let mut body = serde_json::to_string_pretty(value)?;
    body.push('\n');

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let mut file = fs::File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
    file.write_all(body.as_bytes()).map_err(|e| StoreError::io(&tmp, e))?;
    file.sync_all().map_err(|e| StoreError::io(&tmp, e))?;
    drop(file);

    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}
