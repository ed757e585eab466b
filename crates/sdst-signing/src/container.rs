//! Password-protected key database files.
//!
//! An encrypted database is the literal prefix `ENCRYPTED ` followed by the
//! single-line base64 of the provider's symmetric ciphertext of the JSON
//! document. Text without the prefix is a plain JSON document.

use std::path::Path;

use crate::database::KeyDatabase;
use crate::error::Result;
use crate::error::SigningError;
use crate::pem::decode_base64;
use crate::pem::encode_base64;
use crate::provider::ProviderError;
use crate::provider::ProviderHandle;

pub const ENCRYPTED_PREFIX: &str = "ENCRYPTED ";

pub fn is_encrypted(text: &str) -> bool {
    text.starts_with(ENCRYPTED_PREFIX)
}

/// Encrypt `plaintext` into the `ENCRYPTED <base64>` form.
pub fn seal(provider: &ProviderHandle, plaintext: &str, password: &str) -> Result<String> {
    let ciphertext = provider.run(|p| p.symmetric_encrypt(plaintext.as_bytes(), password.as_bytes()))?;
    Ok(format!("{ENCRYPTED_PREFIX}{}", encode_base64(&ciphertext)))
}

/// Decrypt the `ENCRYPTED <base64>` form back to text.
pub fn unseal(provider: &ProviderHandle, text: &str, password: &str) -> Result<String> {
    let body = text
        .strip_prefix(ENCRYPTED_PREFIX)
        .ok_or_else(|| SigningError::InvalidCiphertext(format!("should start with '{ENCRYPTED_PREFIX}'")))?;
    let ciphertext =
        decode_base64(body).ok_or_else(|| SigningError::InvalidCiphertext("payload is not base64".into()))?;
    let plaintext = match provider.run(|p| p.symmetric_decrypt(&ciphertext, password.as_bytes())) {
        Ok(plaintext) => plaintext,
        Err(SigningError::Provider(ProviderError::BadPassword)) => return Err(SigningError::WrongPassword),
        Err(SigningError::Provider(err)) => return Err(SigningError::InvalidCiphertext(err.to_string())),
        Err(err) => return Err(err),
    };
    // Padding can check out under a wrong password; the text will not.
    String::from_utf8(plaintext).map_err(|_| SigningError::WrongPassword)
}

/// Serialize `db`, encrypting it when a password is given.
pub fn export_database(provider: &ProviderHandle, db: &KeyDatabase, password: Option<&str>) -> Result<String> {
    let json = db.serialize()?;
    match password {
        Some(password) => seal(provider, &json, password),
        None => Ok(json),
    }
}

/// Parse an exported database, plain or encrypted.
pub fn import_database(provider: &ProviderHandle, text: &str, password: Option<&str>) -> Result<KeyDatabase> {
    if !is_encrypted(text) {
        return KeyDatabase::deserialize(text);
    }
    let password = password.ok_or(SigningError::PasswordRequired)?;
    let json = unseal(provider, text.trim_end(), password)?;
    if !json.trim_start().starts_with('{') {
        return Err(SigningError::WrongPassword);
    }
    KeyDatabase::deserialize(&json)
}

/// Load a database file. A missing file yields an empty database.
pub fn load_database(provider: &ProviderHandle, path: &Path, password: Option<&str>) -> Result<KeyDatabase> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no key database file, starting empty");
        return Ok(KeyDatabase::new());
    }
    let text = std::fs::read_to_string(path)?;
    import_database(provider, &text, password)
}

/// Write a database file, readable by the owner only on Unix.
pub fn save_database(provider: &ProviderHandle, db: &KeyDatabase, path: &Path, password: Option<&str>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, export_database(provider, db, password)?)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!(path = %path.display(), encrypted = password.is_some(), keys = db.len(), "key database saved");
    Ok(())
}
