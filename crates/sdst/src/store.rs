//! Shared state for commands: settings, engine and the key database file.

use std::io::Read;
use std::path::Path;
use std::path::PathBuf;

use sdst_signing::Key;
use sdst_signing::KeyDatabase;
use sdst_signing::SignatureEngine;
use sdst_signing::SigningConfig;
use sdst_signing::container;
use sdst_signing::provider::ProviderHandle;
use sdst_signing::provider::RustCryptoProvider;

/// Global options every command receives.
pub struct Store {
    pub config: SigningConfig,
    pub engine: SignatureEngine,
    pub db: KeyDatabase,
    path: PathBuf,
    password: Option<String>,
}

impl Store {
    /// Load settings and the key database. A missing database file gives an
    /// empty database.
    pub fn open(config_path: Option<&Path>, database: Option<PathBuf>, password: Option<String>) -> anyhow::Result<Self> {
        let config_path = config_path.map(Path::to_path_buf).unwrap_or_else(SigningConfig::default_path);
        let config = SigningConfig::load(&config_path)?;
        let path = database.unwrap_or_else(|| config.database_path());

        let engine = SignatureEngine::new(ProviderHandle::new(RustCryptoProvider::new()));
        let db = container::load_database(engine.provider(), &path, password.as_deref())?;
        tracing::debug!(path = %path.display(), keys = db.len(), "key database loaded");

        Ok(Self {
            config,
            engine,
            db,
            path,
            password,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Write the database back, encrypted when a password was given.
    pub fn save(&self) -> anyhow::Result<()> {
        container::save_database(self.engine.provider(), &self.db, &self.path, self.password())?;
        Ok(())
    }

    /// Find a key by alias, full key id or unique key id prefix.
    pub fn find_key(&self, reference: &str) -> anyhow::Result<&Key> {
        if let Some(key) = self.db.get_by_alias(reference).or_else(|| self.db.get_by_id(reference)) {
            return Ok(key);
        }
        match self.db.get_by_prefix(reference).as_slice() {
            [key] => Ok(*key),
            [] => anyhow::bail!("no key with alias or id '{reference}'"),
            matches => anyhow::bail!("'{reference}' matches {} keys, use a longer prefix", matches.len()),
        }
    }
}

/// Read a file, or stdin when no path is given.
pub fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

/// Write to a file, or stdout when no path is given.
pub fn write_output(path: Option<&Path>, text: &str) -> anyhow::Result<()> {
    match path {
        Some(path) => std::fs::write(path, text)?,
        None => println!("{text}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(dir: &Path, password: Option<&str>) -> Store {
        Store::open(Some(&dir.join("config.json")), Some(dir.join("keys.sdst")), password.map(str::to_string)).unwrap()
    }

    #[test]
    fn save_and_reopen_encrypted() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open(dir.path(), Some("pw"));
        assert!(store.db.is_empty());
        let key = store.engine.generate_key(&mut store.db, "ed25519", Some("alice"), None).unwrap();
        store.save().unwrap();

        let text = std::fs::read_to_string(store.path()).unwrap();
        assert!(container::is_encrypted(&text));

        let reopened = open(dir.path(), Some("pw"));
        assert_eq!(reopened.find_key("alice").unwrap().key_id, key.key_id);
        assert!(Store::open(Some(&dir.path().join("config.json")), Some(dir.path().join("keys.sdst")), None).is_err());
    }

    #[test]
    fn find_key_by_alias_id_and_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open(dir.path(), None);
        let key = store.engine.generate_key(&mut store.db, "ed25519", Some("bob"), None).unwrap();

        assert_eq!(store.find_key("bob").unwrap().key_id, key.key_id);
        assert_eq!(store.find_key(key.key_id.as_str()).unwrap().alias, "bob");
        assert_eq!(store.find_key(key.key_id.prefix(12)).unwrap().alias, "bob");
        assert!(store.find_key("nobody").is_err());
    }
}
