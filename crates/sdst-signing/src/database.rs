//! In-memory key registry.
//!
//! A [`KeyDatabase`] holds key pairs and public-only keys, keeps key ids and
//! aliases unique, and tells registered observers about every mutation.
//!
//! # Document format
//!
//! ```json
//! {
//!   "dbName": "sdstKeyDb1700000000",
//!   "createdOn": "2023-11-14T22:13:20.000Z",
//!   "guid": "1700000000000:<base64 of 32 random bytes>",
//!   "keys": [
//!     { "alias": "...", "keyId": "...", "algorithm": "ed25519",
//!       "publicKey": "-----BEGIN PUBLIC KEY-----\n...", "addedOn": "..." }
//!   ]
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::DateTime;
use chrono::TimeZone;
use chrono::Utc;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use serde::Serialize;

use crate::algorithm::Algorithm;
use crate::algorithm::canonical_algorithm;
use crate::error::Result;
use crate::error::SigningError;
use crate::identity::KEY_ID_PREFIX_MIN;
use crate::identity::KeyId;
use crate::pem::encode_base64;

/// Guid given to documents that predate guids.
pub const LEGACY_GUID: &str = "0000000000000000000000000000000000000000000=";

/// A stored key. `private_key` is present for key pairs only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Key {
    pub alias: String,
    pub key_id: KeyId,
    pub algorithm: Algorithm,
    pub public_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_on: Option<DateTime<Utc>>,
}

impl Key {
    pub fn is_key_pair(&self) -> bool {
        self.private_key.is_some()
    }
}

/// Everything needed to insert a key. An empty or missing alias defaults to
/// the key id prefix.
#[derive(Debug, Clone)]
pub struct NewKey {
    pub alias: Option<String>,
    pub key_id: KeyId,
    pub algorithm: Algorithm,
    pub public_key: String,
    pub private_key: Option<String>,
    pub added_on: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Change events
// ---------------------------------------------------------------------------

/// A mutation of a [`KeyDatabase`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEvent {
    AddKey(Key),
    DeleteKey(KeyId),
    SetAlias(Key),
    SetDbName(String),
    /// The whole database was replaced.
    Reload,
}

/// Receives every [`KeyEvent`] synchronously, in mutation order.
pub trait KeyDatabaseObserver: Send + Sync {
    fn on_change(&self, event: &KeyEvent);
}

impl<F> KeyDatabaseObserver for F
where
    F: Fn(&KeyEvent) + Send + Sync,
{
    fn on_change(&self, event: &KeyEvent) {
        self(event)
    }
}

/// Handle returned by [`KeyDatabase::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// Ordered collection of keys plus database metadata.
pub struct KeyDatabase {
    db_name: String,
    created_on: DateTime<Utc>,
    guid: String,
    keys: Vec<Key>,
    observers: Vec<(ObserverId, Arc<dyn KeyDatabaseObserver>)>,
    next_observer: u64,
}

impl KeyDatabase {
    /// Create an empty database with a fresh guid and a timestamped name.
    pub fn new() -> Self {
        let now = Utc::now();
        let mut random = [0u8; 32];
        OsRng.fill_bytes(&mut random);
        Self {
            db_name: default_db_name(now),
            created_on: now,
            guid: format!("{}:{}", now.timestamp_millis(), encode_base64(&random)),
            keys: Vec::new(),
            observers: Vec::new(),
            next_observer: 0,
        }
    }

    pub fn with_name(db_name: &str) -> Self {
        Self {
            db_name: db_name.to_string(),
            ..Self::new()
        }
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn created_on(&self) -> DateTime<Utc> {
        self.created_on
    }

    /// Identity of the logical database across save and reload cycles.
    pub fn guid(&self) -> &str {
        &self.guid
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// All keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.keys.iter()
    }

    pub fn key_pairs(&self) -> impl Iterator<Item = &Key> {
        self.keys.iter().filter(|k| k.is_key_pair())
    }

    pub fn public_keys(&self) -> impl Iterator<Item = &Key> {
        self.keys.iter().filter(|k| !k.is_key_pair())
    }

    // -- observers ----------------------------------------------------------

    pub fn subscribe(&mut self, observer: Arc<dyn KeyDatabaseObserver>) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, observer));
        id
    }

    /// Returns whether the observer was registered.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(registered, _)| *registered != id);
        self.observers.len() < before
    }

    fn notify(&self, event: KeyEvent) {
        for (_, observer) in &self.observers {
            observer.on_change(&event);
        }
    }

    // -- lookups ------------------------------------------------------------

    pub fn get_by_id(&self, key_id: &str) -> Option<&Key> {
        self.keys.iter().find(|k| k.key_id.as_str() == key_id)
    }

    /// Every key whose id starts with `prefix`. Callers decide what an
    /// ambiguous result means.
    pub fn get_by_prefix(&self, prefix: &str) -> Vec<&Key> {
        self.keys.iter().filter(|k| k.key_id.starts_with(prefix)).collect()
    }

    pub fn get_by_alias(&self, alias: &str) -> Option<&Key> {
        self.keys.iter().find(|k| k.alias == alias)
    }

    /// Exact string match; normalize the PEM first.
    pub fn get_by_public_key(&self, public_key: &str) -> Option<&Key> {
        self.keys.iter().find(|k| k.public_key == public_key)
    }

    pub fn contains_id(&self, key_id: &str) -> bool {
        self.get_by_id(key_id).is_some()
    }

    pub fn contains_alias(&self, alias: &str) -> bool {
        self.get_by_alias(alias).is_some()
    }

    // -- mutations ----------------------------------------------------------

    /// Insert a key, disambiguating its alias with ` (2)`, ` (3)`, ...
    pub fn add_key(&mut self, new: NewKey) -> Result<&Key> {
        if self.contains_id(new.key_id.as_str()) {
            return Err(SigningError::KeyIdExists(new.key_id));
        }
        let alias = self.choose_alias(new.alias.as_deref(), &new.key_id);
        let key = Key {
            alias,
            key_id: new.key_id,
            algorithm: new.algorithm,
            public_key: new.public_key,
            private_key: new.private_key,
            added_on: Some(new.added_on.unwrap_or_else(Utc::now)),
        };
        tracing::info!(key_id = %key.key_id, alias = %key.alias, algorithm = %key.algorithm, pair = key.is_key_pair(), "key added");
        self.keys.push(key.clone());
        self.notify(KeyEvent::AddKey(key));
        Ok(&self.keys[self.keys.len() - 1])
    }

    /// Rename a key. A collision with another key's alias is rejected.
    pub fn set_alias(&mut self, key_id: &str, alias: &str) -> Result<()> {
        let index = self
            .keys
            .iter()
            .position(|k| k.key_id.as_str() == key_id)
            .ok_or_else(|| SigningError::KeyNotFound(key_id.to_string()))?;
        if self.keys[index].alias == alias {
            return Ok(());
        }
        if self.contains_alias(alias) {
            return Err(SigningError::AliasExists(alias.to_string()));
        }
        self.keys[index].alias = alias.to_string();
        tracing::info!(key_id, alias, "alias changed");
        self.notify(KeyEvent::SetAlias(self.keys[index].clone()));
        Ok(())
    }

    pub fn set_db_name(&mut self, db_name: &str) {
        self.db_name = db_name.to_string();
        self.notify(KeyEvent::SetDbName(self.db_name.clone()));
    }

    /// Remove a key. Returns whether anything was removed; absent ids emit
    /// no event.
    pub fn delete_key(&mut self, key_id: &str) -> bool {
        let Some(index) = self.keys.iter().position(|k| k.key_id.as_str() == key_id) else {
            return false;
        };
        let removed = self.keys.remove(index);
        tracing::info!(key_id, alias = %removed.alias, "key deleted");
        self.notify(KeyEvent::DeleteKey(removed.key_id));
        true
    }

    /// Take over the contents of `other`, keeping this database's observers.
    pub fn reload_from(&mut self, other: KeyDatabase) {
        self.db_name = other.db_name;
        self.created_on = other.created_on;
        self.guid = other.guid;
        self.keys = other.keys;
        tracing::info!(db_name = %self.db_name, keys = self.keys.len(), "key database reloaded");
        self.notify(KeyEvent::Reload);
    }

    fn choose_alias(&self, alias: Option<&str>, key_id: &KeyId) -> String {
        let base = match alias {
            Some(alias) if !alias.is_empty() => alias,
            _ => key_id.prefix(KEY_ID_PREFIX_MIN),
        };
        let mut candidate = base.to_string();
        let mut n = 1;
        while self.contains_alias(&candidate) {
            n += 1;
            candidate = format!("{base} ({n})");
        }
        candidate
    }

    // -- documents ----------------------------------------------------------

    /// Pretty-printed JSON document.
    pub fn serialize(&self) -> Result<String> {
        let document = DocumentRef {
            db_name: &self.db_name,
            created_on: self.created_on,
            guid: &self.guid,
            keys: &self.keys,
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    /// Rebuild a database from a JSON document.
    ///
    /// Aliases are disambiguated as by [`KeyDatabase::add_key`]; key ids are
    /// taken as stored.
    pub fn deserialize(json: &str) -> Result<Self> {
        let document: RawDocument = serde_json::from_str(json)?;
        let now = Utc::now();
        let mut db = Self {
            db_name: document.db_name.unwrap_or_else(|| default_db_name(now)),
            created_on: document.created_on.as_ref().and_then(parse_timestamp).unwrap_or(now),
            guid: document.guid.unwrap_or_else(|| LEGACY_GUID.to_string()),
            keys: Vec::with_capacity(document.keys.len()),
            observers: Vec::new(),
            next_observer: 0,
        };

        for (index, raw) in document.keys.into_iter().enumerate() {
            let public_key = raw.public_key.ok_or(SigningError::PublicKeyMissing { index })?;
            let algorithm_name = raw.algorithm.ok_or(SigningError::AlgorithmMissing { index })?;
            let key_id = KeyId::from(raw.key_id.ok_or(SigningError::KeyIdMissing { index })?);
            let algorithm =
                canonical_algorithm(&algorithm_name).ok_or(SigningError::UnknownAlgorithm(algorithm_name))?;
            if db.contains_id(key_id.as_str()) {
                return Err(SigningError::KeyIdExists(key_id));
            }
            let alias = db.choose_alias(raw.alias.as_deref(), &key_id);
            db.keys.push(Key {
                alias,
                key_id,
                algorithm,
                public_key,
                private_key: raw.private_key,
                added_on: raw.added_on.as_ref().and_then(parse_timestamp),
            });
        }
        tracing::debug!(db_name = %db.db_name, keys = db.keys.len(), "key database parsed");
        Ok(db)
    }
}

impl Default for KeyDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeyDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDatabase")
            .field("db_name", &self.db_name)
            .field("created_on", &self.created_on)
            .field("guid", &self.guid)
            .field("keys", &self.keys.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

fn default_db_name(now: DateTime<Utc>) -> String {
    format!("sdstKeyDb{}", now.timestamp())
}

/// Accepts RFC 3339 text or epoch milliseconds. Anything else is dropped.
fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    if let Some(millis) = value.as_i64() {
        return Utc.timestamp_millis_opt(millis).single();
    }
    DateTime::parse_from_rfc3339(value.as_str()?).ok().map(|t| t.with_timezone(&Utc))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentRef<'a> {
    db_name: &'a str,
    created_on: DateTime<Utc>,
    guid: &'a str,
    keys: &'a [Key],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    db_name: Option<String>,
    created_on: Option<serde_json::Value>,
    guid: Option<String>,
    #[serde(default)]
    keys: Vec<RawKey>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawKey {
    alias: Option<String>,
    key_id: Option<String>,
    algorithm: Option<String>,
    public_key: Option<String>,
    private_key: Option<String>,
    added_on: Option<serde_json::Value>,
}
