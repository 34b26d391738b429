//! Credential storage for SAP robot accounts.
//!
//! [`CredentialStore`] is the three-operation contract the rest of the crate
//! relies on (`get`, `backup`, `save`). [`FileCredentialStore`] is a small
//! JSON-file implementation of it, keeping one active record per
//! `(user, system)` and an append-only list of backups, guarded by lock files
//! so that several processes can share one store.

use crate::errors::SapError;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

/// Identifies one credential record: which store, which robot user, which SAP system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountRef {
    pub store_path: PathBuf,
    pub user: String,
    pub system: String,
}

impl AccountRef {
    pub fn new(
        store_path: impl Into<PathBuf>,
        user: impl Into<String>,
        system: impl Into<String>,
    ) -> Self {
        Self {
            store_path: store_path.into(),
            user: user.into(),
            system: system.into(),
        }
    }

}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user, self.system)
    }
}

/// Username and password of an SAP account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Storage for SAP credentials.
///
/// `save` must only be called after a successful `backup` of the same account
/// within the same rotation; backups are never deleted.
pub trait CredentialStore: Send + Sync {
    fn get(&self, account: &AccountRef) -> Result<Credential, SapError>;

    /// Copies the active record of `account` to the backup list.
    fn backup(&self, account: &AccountRef) -> Result<(), SapError>;

    /// Replaces the active password of `account`.
    fn save(&self, account: &AccountRef, new_password: &str) -> Result<(), SapError>;

    /// Reserves `account` against rotations running in other processes.
    ///
    /// Stores without a cross-process notion of ownership return `None`.
    fn lock_account(&self, _account: &AccountRef) -> Result<Option<StoreLock>, SapError> {
        Ok(None)
    }
}

/// Serialises credential mutations per `(user, system)` within one process.
///
/// Rotations of different accounts never wait on each other. Across
/// processes the same role is played by [`CredentialStore::lock_account`].
#[derive(Debug, Default)]
pub struct AccountLocks {
    held: Mutex<HashSet<(String, String)>>,
    released: Condvar,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until no other holder owns `account`, then takes it.
    pub fn lock(&self, account: &AccountRef) -> AccountLockGuard<'_> {
        let key = (account.user.clone(), account.system.clone());
        let mut held = self
            .held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while held.contains(&key) {
            debug!("Waiting for in-flight rotation of {}/{}", key.0, key.1);
            held = self
                .released
                .wait(held)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        held.insert(key.clone());
        AccountLockGuard { locks: self, key }
    }

    pub fn is_locked(&self, account: &AccountRef) -> bool {
        let held = self
            .held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        held.contains(&(account.user.clone(), account.system.clone()))
    }
}

/// Holds one account of an [`AccountLocks`] until dropped.
#[derive(Debug)]
pub struct AccountLockGuard<'a> {
    locks: &'a AccountLocks,
    key: (String, String),
}

impl Drop for AccountLockGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .locks
            .held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        held.remove(&self.key);
        self.locks.released.notify_all();
    }
}

/// Exclusive advisory lock on a file beside a credential store.
///
/// Held until dropped. The lock is taken on a dedicated file, never on the
/// store document itself, because the document is replaced by rename.
#[derive(Debug)]
pub struct StoreLock {
    _file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Blocks until the lock on `path` is free, creating the file if needed.
    pub fn acquire(path: &Path) -> Result<Self, SapError> {
        fs::create_dir_all(parent_dir(path))?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        FileExt::lock_exclusive(&file).map_err(|e| {
            SapError::CredentialStore(format!("Failed to lock {}: {}", path.display(), e))
        })?;
        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ActiveRecord {
    username: String,
    password: String,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BackupRecord {
    user: String,
    system: String,
    username: String,
    password: String,
    backed_up_at: DateTime<Utc>,
}

impl BackupRecord {
    fn belongs_to(&self, account: &AccountRef) -> bool {
        self.user == account.user && self.system == account.system
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    /// user -> system -> record
    #[serde(default)]
    active: BTreeMap<String, BTreeMap<String, ActiveRecord>>,
    #[serde(default)]
    backups: Vec<BackupRecord>,
}

impl StoreDocument {
    fn active(&self, account: &AccountRef) -> Option<&ActiveRecord> {
        self.active
            .get(&account.user)
            .and_then(|systems| systems.get(&account.system))
    }

    fn set_active(&mut self, account: &AccountRef, record: ActiveRecord) {
        self.active
            .entry(account.user.clone())
            .or_default()
            .insert(account.system.clone(), record);
    }

    fn backup_count(&self, account: &AccountRef) -> usize {
        self.backups.iter().filter(|b| b.belongs_to(account)).count()
    }
}

/// JSON-file credential store.
///
/// Each [`AccountRef::store_path`] names one document:
///
/// ```json
/// {
///   "active":  { "robot": { "opus": { "username": "...", "password": "...", "updated_at": "..." } } },
///   "backups": [ { "user": "robot", "system": "opus", "username": "...", "password": "...", "backed_up_at": "..." } ]
/// }
/// ```
///
/// Every read-modify-write holds `<store>.lock`, so writers in other threads
/// and processes never interleave. Documents are replaced through a uniquely
/// named temp file in the same directory and a rename.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileCredentialStore;

impl FileCredentialStore {
    pub fn new() -> Self {
        Self
    }

    /// Writes (or replaces) the active record of `account` without taking a backup.
    ///
    /// Meant for provisioning a new store; rotations go through [`CredentialStore`].
    pub fn provision(&self, account: &AccountRef, credential: &Credential) -> Result<(), SapError> {
        update_document(&account.store_path, |doc| {
            doc.set_active(
                account,
                ActiveRecord {
                    username: credential.username.clone(),
                    password: credential.password.clone(),
                    updated_at: Utc::now(),
                },
            );
            Ok(())
        })
    }

    /// Number of backups held for `account`.
    pub fn backup_count(&self, account: &AccountRef) -> Result<usize, SapError> {
        Ok(load_document(&account.store_path)?.backup_count(account))
    }
}

impl CredentialStore for FileCredentialStore {
    #[instrument(level = "debug", skip(self), fields(account = %account))]
    fn get(&self, account: &AccountRef) -> Result<Credential, SapError> {
        let doc = load_document(&account.store_path)?;
        let record = doc
            .active(account)
            .ok_or_else(|| SapError::CredentialUnavailable {
                user: account.user.clone(),
                system: account.system.clone(),
                reason: format!("no record in {}", account.store_path.display()),
            })?;
        Ok(Credential::new(&record.username, &record.password))
    }

    #[instrument(level = "debug", skip(self), fields(account = %account))]
    fn backup(&self, account: &AccountRef) -> Result<(), SapError> {
        update_document(&account.store_path, |doc| {
            let active = doc
                .active(account)
                .ok_or_else(|| SapError::CredentialUnavailable {
                    user: account.user.clone(),
                    system: account.system.clone(),
                    reason: "nothing to back up".to_string(),
                })?
                .clone();

            doc.backups.push(BackupRecord {
                user: account.user.clone(),
                system: account.system.clone(),
                username: active.username,
                password: active.password,
                backed_up_at: Utc::now(),
            });
            Ok(())
        })?;
        info!("Backed up credential for {}", account);
        Ok(())
    }

    #[instrument(level = "debug", skip(self, new_password), fields(account = %account))]
    fn save(&self, account: &AccountRef, new_password: &str) -> Result<(), SapError> {
        update_document(&account.store_path, |doc| {
            if doc.backup_count(account) == 0 {
                return Err(SapError::CredentialStore(format!(
                    "refusing to overwrite {account} without a backup"
                )));
            }

            let username = doc
                .active(account)
                .map(|r| r.username.clone())
                .unwrap_or_else(|| account.user.clone());
            doc.set_active(
                account,
                ActiveRecord {
                    username,
                    password: new_password.to_string(),
                    updated_at: Utc::now(),
                },
            );
            Ok(())
        })?;
        info!("Saved new credential for {}", account);
        Ok(())
    }

    fn lock_account(&self, account: &AccountRef) -> Result<Option<StoreLock>, SapError> {
        StoreLock::acquire(&account_lock_path(account)).map(Some)
    }
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn document_lock_path(path: &Path) -> PathBuf {
    sibling_path(path, ".lock")
}

/// `<store>.<user>@<system>.lock`, with anything outside `[A-Za-z0-9_-]` replaced.
fn account_lock_path(account: &AccountRef) -> PathBuf {
    fn clean(tag: &str) -> String {
        tag.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
    sibling_path(
        &account.store_path,
        &format!(".{}@{}.lock", clean(&account.user), clean(&account.system)),
    )
}

fn load_document(path: &Path) -> Result<StoreDocument, SapError> {
    if !path.exists() {
        return Ok(StoreDocument::default());
    }
    let raw = fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(StoreDocument::default());
    }
    Ok(serde_json::from_str(&raw)?)
}

/// Loads, edits and rewrites the document at `path` under its lock file.
fn update_document<T>(
    path: &Path,
    edit: impl FnOnce(&mut StoreDocument) -> Result<T, SapError>,
) -> Result<T, SapError> {
    let lock = StoreLock::acquire(&document_lock_path(path))?;
    debug!("Holding {}", lock.path().display());

    let mut doc = load_document(path)?;
    let value = edit(&mut doc)?;
    write_document(path, &doc)?;
    Ok(value)
}

fn write_document(path: &Path, doc: &StoreDocument) -> Result<(), SapError> {
    let mut tmp = NamedTempFile::new_in(parent_dir(path))?;
    serde_json::to_writer_pretty(&mut tmp, doc)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| SapError::from(e.error))?;
    Ok(())
}
