//! User settings.
//!
//! Stored as JSON at `$XDG_CONFIG_HOME/sdst/config.json`. Every field has a
//! default, so a partial or missing file is fine.

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;
use crate::identity::KEY_ID_PREFIX_MAX;
use crate::identity::KEY_ID_PREFIX_MIN;
use crate::plain_text::DEFAULT_MAX_CHAIN_DEPTH;
use crate::plain_text::ENDING_PHRASES;
use crate::plain_text::PlainTextOptions;
use crate::plain_text::SignerIdStyle;

const CONFIG_FILE: &str = "config.json";
const DATABASE_FILE: &str = "keys.sdst";

/// Signing preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Name signers by key id instead of embedding the public key.
    pub sign_with_key_id: bool,
    /// Use `---SIG---` instead of `-----SIGNATURE-----`.
    pub use_short_ending_phrase: bool,
    pub break_after_ending_phrase: bool,
    /// Plain-text signers are named by a key id prefix.
    pub key_id_prefix_plain_text: bool,
    pub key_id_prefix_length: usize,
    pub normalize_plain_text: bool,
    pub append_newline_plain_text: bool,
    pub digest_method: Option<String>,
    pub max_chain_depth: usize,
    pub database_path: Option<PathBuf>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            sign_with_key_id: false,
            use_short_ending_phrase: false,
            break_after_ending_phrase: false,
            key_id_prefix_plain_text: false,
            key_id_prefix_length: KEY_ID_PREFIX_MIN,
            normalize_plain_text: false,
            append_newline_plain_text: false,
            digest_method: None,
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            database_path: None,
        }
    }
}

impl SigningConfig {
    /// Default path for the settings file.
    pub fn default_path() -> PathBuf {
        config_dir().join(CONFIG_FILE)
    }

    /// Load settings. Returns defaults if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Key database file, `keys.sdst` next to the settings unless configured.
    pub fn database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| config_dir().join(DATABASE_FILE))
    }

    pub fn ending_phrase(&self) -> &'static str {
        if self.use_short_ending_phrase { ENDING_PHRASES[1] } else { ENDING_PHRASES[0] }
    }

    pub fn plain_text_options(&self) -> PlainTextOptions {
        let signer_id = match (self.sign_with_key_id, self.key_id_prefix_plain_text) {
            (true, true) => {
                SignerIdStyle::KeyIdPrefix(self.key_id_prefix_length.clamp(KEY_ID_PREFIX_MIN, KEY_ID_PREFIX_MAX))
            }
            (true, false) => SignerIdStyle::KeyId,
            (false, _) => SignerIdStyle::PublicKey,
        };
        PlainTextOptions {
            ending_phrase: self.ending_phrase().to_string(),
            break_after_ending_phrase: self.break_after_ending_phrase,
            signer_id,
            digest: self.digest_method.clone(),
            normalize: self.normalize_plain_text,
            append_newline: self.append_newline_plain_text,
        }
    }
}

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
        .map(|d| d.join("sdst"))
        .unwrap_or_else(|| PathBuf::from("/tmp/sdst-config"))
}
