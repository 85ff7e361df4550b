//! Synchronous embedded document engine.
//!
//! Each collection is an ordered map from identifier to document. A write
//! is applied to a copy of the collection, persisted as a JSON array via a
//! temporary file and an atomic rename, then swapped in. A failed write
//! leaves both memory and disk untouched.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};

use polystore_core::config::document::IN_MEMORY;
use polystore_core::entity::{Record, record_id};
use polystore_core::error::{AppError, ErrorKind};
use polystore_core::result::AppResult;

/// Documents of one collection keyed by identifier.
pub type Documents = BTreeMap<String, Record>;

#[derive(Debug, Default)]
struct CollectionState {
    documents: Documents,
    /// Bumped on every committed write.
    version: u64,
}

/// An embedded document database rooted in a directory, or in memory.
#[derive(Debug)]
pub struct EmbeddedDatabase {
    location: Option<PathBuf>,
    collections: Mutex<HashMap<String, CollectionState>>,
}

impl EmbeddedDatabase {
    /// Open a database from a connection string.
    ///
    /// Accepts `":memory:"`, a plain directory path, or a LiteDB-style
    /// `Filename=<dir>;...` string. The directory is created if missing.
    pub fn open(connection_string: &str) -> AppResult<Self> {
        let location = parse_location(connection_string)?;
        match location {
            None => Ok(Self::in_memory()),
            Some(dir) => {
                fs::create_dir_all(&dir).map_err(|e| {
                    AppError::with_source(
                        ErrorKind::Storage,
                        format!("Failed to create database directory {}", dir.display()),
                        e,
                    )
                })?;
                info!(path = %dir.display(), "Opened embedded document database");
                Ok(Self {
                    location: Some(dir),
                    collections: Mutex::new(HashMap::new()),
                })
            }
        }
    }

    /// Create a database that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            location: None,
            collections: Mutex::new(HashMap::new()),
        }
    }

    /// Directory holding the collection files, `None` when in memory.
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Load a collection from disk, or create it empty.
    pub fn ensure_collection(&self, name: &str) -> AppResult<()> {
        validate_collection_name(name)?;
        let mut collections = self.lock()?;
        if collections.contains_key(name) {
            return Ok(());
        }
        let documents = match &self.location {
            Some(dir) => load_collection(&collection_path(dir, name))?,
            None => Documents::new(),
        };
        debug!(collection = name, documents = documents.len(), "Loaded embedded collection");
        collections.insert(
            name.to_string(),
            CollectionState {
                documents,
                version: 0,
            },
        );
        Ok(())
    }

    /// Run a read-only closure over a collection.
    pub fn read<R>(&self, name: &str, f: impl FnOnce(&Documents) -> R) -> AppResult<R> {
        let collections = self.lock()?;
        let state = collections
            .get(name)
            .ok_or_else(|| missing_collection(name))?;
        Ok(f(&state.documents))
    }

    /// Apply a write to a copy of a collection, persist it, then swap it in.
    pub fn write<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Documents) -> AppResult<R>,
    ) -> AppResult<R> {
        let mut collections = self.lock()?;
        let state = collections
            .get_mut(name)
            .ok_or_else(|| missing_collection(name))?;
        let mut working = state.documents.clone();
        let result = f(&mut working)?;
        self.persist(name, &working)?;
        state.documents = working;
        state.version += 1;
        Ok(result)
    }

    /// Copy a collection together with its current version.
    pub fn snapshot(&self, name: &str) -> AppResult<(Documents, u64)> {
        let collections = self.lock()?;
        let state = collections
            .get(name)
            .ok_or_else(|| missing_collection(name))?;
        Ok((state.documents.clone(), state.version))
    }

    /// Replace a collection with a staged copy taken at `base_version`.
    ///
    /// Fails with [`ErrorKind::Conflict`] when another write landed since
    /// the snapshot was taken.
    pub fn commit(&self, name: &str, base_version: u64, documents: Documents) -> AppResult<()> {
        let mut collections = self.lock()?;
        let state = collections
            .get_mut(name)
            .ok_or_else(|| missing_collection(name))?;
        if state.version != base_version {
            return Err(AppError::conflict(format!(
                "Collection '{name}' changed during the transaction"
            )));
        }
        self.persist(name, &documents)?;
        state.documents = documents;
        state.version += 1;
        Ok(())
    }

    /// Names of every loaded collection.
    pub fn collection_names(&self) -> AppResult<Vec<String>> {
        let collections = self.lock()?;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn persist(&self, name: &str, documents: &Documents) -> AppResult<()> {
        let Some(dir) = &self.location else {
            return Ok(());
        };
        let path = collection_path(dir, name);
        let tmp = path.with_extension("json.tmp");
        let rows: Vec<&Record> = documents.values().collect();
        let bytes = serde_json::to_vec(&rows)?;
        fs::write(&tmp, bytes).map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to write {}", tmp.display()),
                e,
            )
        })?;
        fs::rename(&tmp, &path).map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to replace {}", path.display()),
                e,
            )
        })
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, HashMap<String, CollectionState>>> {
        self.collections
            .lock()
            .map_err(|_| AppError::internal("Embedded database lock poisoned"))
    }
}

fn parse_location(connection_string: &str) -> AppResult<Option<PathBuf>> {
    let trimmed = connection_string.trim();
    let path = if trimmed.contains('=') {
        trimmed
            .split(';')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("filename"))
            .map(|(_, value)| value.trim())
            .ok_or_else(|| {
                AppError::configuration(format!(
                    "Embedded connection string '{trimmed}' has no Filename"
                ))
            })?
    } else {
        trimmed
    };
    if path.eq_ignore_ascii_case(IN_MEMORY) {
        Ok(None)
    } else {
        Ok(Some(PathBuf::from(path)))
    }
}

fn validate_collection_name(name: &str) -> AppResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !name.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(AppError::validation(format!(
            "Invalid embedded collection name '{name}'"
        )))
    }
}

fn collection_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.json"))
}

fn load_collection(path: &Path) -> AppResult<Documents> {
    if !path.exists() {
        return Ok(Documents::new());
    }
    let bytes = fs::read(path).map_err(|e| {
        AppError::with_source(
            ErrorKind::Storage,
            format!("Failed to read {}", path.display()),
            e,
        )
    })?;
    let rows: Vec<Record> = serde_json::from_slice(&bytes)?;
    rows.into_iter()
        .map(|row| record_id(&row).map(|id| (id.to_string(), row)))
        .collect()
}

fn missing_collection(name: &str) -> AppError {
    AppError::internal(format!("Embedded collection '{name}' is not open"))
}
