//! Signer resolution and per-entry verification outcomes.
//!
//! Both envelope formats name their signer either by key id (full or
//! prefix) or by embedding the raw public key. Resolution never fails the
//! whole envelope: problems come back as a [`VerifyFailure`] for the entry.

use std::fmt;

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use serde::Serializer;

use crate::algorithm::Algorithm;
use crate::database::Key;
use crate::database::KeyDatabase;
use crate::engine::PublicKeyMaterial;
use crate::error::SigningError;
use crate::identity::KEY_ID_LEN;
use crate::identity::KEY_ID_PREFIX_MAX;
use crate::identity::KEY_ID_PREFIX_MIN;
use crate::identity::KeyId;
use crate::identity::classify_key_material;
use crate::identity::derive_key_id;
use crate::pem::normalize_public_key;
use crate::pem::public_key_pem_to_raw;
use crate::provider::ProviderHandle;

/// How an envelope entry names its signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerRef {
    /// Full key id or a key id prefix.
    KeyId(String),
    /// Raw or PEM public key.
    PublicKey(String),
}

impl SignerRef {
    /// Interpret a plain-text signer identifier: 43 characters is a key id,
    /// 12 to 14 a key id prefix, anything else a public key.
    pub fn from_identifier(identifier: &str) -> Self {
        let len = identifier.chars().count();
        if len == KEY_ID_LEN || (KEY_ID_PREFIX_MIN..=KEY_ID_PREFIX_MAX).contains(&len) {
            SignerRef::KeyId(identifier.to_string())
        } else {
            SignerRef::PublicKey(identifier.to_string())
        }
    }

    /// Whether this reference names `key`. Prefixes count when they match.
    pub fn refers_to(&self, key_id: &KeyId, public_key: &str) -> bool {
        match self {
            SignerRef::KeyId(id) => match id.chars().count() {
                KEY_ID_LEN => id == key_id.as_str(),
                len => (KEY_ID_PREFIX_MIN..=KEY_ID_PREFIX_MAX).contains(&len) && key_id.starts_with(id),
            },
            SignerRef::PublicKey(raw) => public_key_pem_to_raw(raw) == public_key_pem_to_raw(public_key),
        }
    }
}

/// Public view of the key an entry resolved to. Never carries a private key.
///
/// `alias` and `added_on` are present only for keys stored locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerKey {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub key_id: KeyId,
    pub algorithm: Algorithm,
    pub public_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_on: Option<DateTime<Utc>>,
}

impl SignerKey {
    pub fn is_stored(&self) -> bool {
        self.alias.is_some()
    }
}

impl From<&Key> for SignerKey {
    fn from(key: &Key) -> Self {
        Self {
            alias: Some(key.alias.clone()),
            key_id: key.key_id.clone(),
            algorithm: key.algorithm,
            public_key: key.public_key.clone(),
            added_on: key.added_on,
        }
    }
}

impl PublicKeyMaterial for SignerKey {
    fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn public_key(&self) -> &str {
        &self.public_key
    }
}

/// Why a signer could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeriveKeyReason {
    KeyIdNotFound,
    KeyIdPrefixNotFound,
    KeyIdPrefixAmbiguous,
    InvalidKeyId,
    InvalidPublicKey,
    NoSignerReference,
}

impl fmt::Display for DeriveKeyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeriveKeyReason::KeyIdNotFound => "keyId not found",
            DeriveKeyReason::KeyIdPrefixNotFound => "keyId prefix not found",
            DeriveKeyReason::KeyIdPrefixAmbiguous => "keyId prefix has multiple matches",
            DeriveKeyReason::InvalidKeyId => "invalid keyId",
            DeriveKeyReason::InvalidPublicKey => "invalid public key",
            DeriveKeyReason::NoSignerReference => "no keyId or publicKey",
        })
    }
}

/// Why one envelope entry could not be verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyFailure {
    UnknownDigest,
    MissingSignature,
    SignatureNotString,
    SignatureNotBase64,
    DeriveKey(DeriveKeyReason),
    ProviderBusy,
    Unexpected(String),
}

impl fmt::Display for VerifyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyFailure::UnknownDigest => f.write_str("unknown digest method"),
            VerifyFailure::MissingSignature => f.write_str("missing signature"),
            VerifyFailure::SignatureNotString => f.write_str("signature not a string"),
            VerifyFailure::SignatureNotBase64 => f.write_str("signature not in base64"),
            VerifyFailure::DeriveKey(reason) => write!(f, "failed to derive key ({reason})"),
            VerifyFailure::ProviderBusy => f.write_str("provider busy, try again"),
            VerifyFailure::Unexpected(message) => write!(f, "unexpected error: {message}"),
        }
    }
}

impl Serialize for VerifyFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<SigningError> for VerifyFailure {
    fn from(err: SigningError) -> Self {
        match err {
            SigningError::ProviderBusy => VerifyFailure::ProviderBusy,
            other => VerifyFailure::Unexpected(other.to_string()),
        }
    }
}

/// Find the key an entry refers to.
///
/// Embedded public keys are looked up in `db` and otherwise turned into an
/// ephemeral [`SignerKey`] with a derived id and classified algorithm.
pub fn resolve_signer(
    provider: &ProviderHandle,
    db: &KeyDatabase,
    signer: Option<&SignerRef>,
) -> Result<SignerKey, VerifyFailure> {
    match signer {
        None => Err(VerifyFailure::DeriveKey(DeriveKeyReason::NoSignerReference)),
        Some(SignerRef::PublicKey(text)) => {
            let public_key = normalize_public_key(text);
            if let Some(stored) = db.get_by_public_key(&public_key) {
                return Ok(SignerKey::from(stored));
            }
            let key_id = match derive_key_id(provider, &public_key) {
                Ok(key_id) => key_id,
                Err(SigningError::InvalidPublicKey(_)) => {
                    return Err(VerifyFailure::DeriveKey(DeriveKeyReason::InvalidPublicKey));
                }
                Err(err) => return Err(err.into()),
            };
            let algorithm = classify_key_material(provider, public_key.as_bytes())?
                .ok_or(VerifyFailure::DeriveKey(DeriveKeyReason::InvalidPublicKey))?;
            Ok(SignerKey {
                alias: None,
                key_id,
                algorithm,
                public_key,
                added_on: None,
            })
        }
        Some(SignerRef::KeyId(id)) => {
            let len = id.chars().count();
            if len == KEY_ID_LEN {
                db.get_by_id(id)
                    .map(SignerKey::from)
                    .ok_or(VerifyFailure::DeriveKey(DeriveKeyReason::KeyIdNotFound))
            } else if (KEY_ID_PREFIX_MIN..=KEY_ID_PREFIX_MAX).contains(&len) {
                match db.get_by_prefix(id).as_slice() {
                    [] => Err(VerifyFailure::DeriveKey(DeriveKeyReason::KeyIdPrefixNotFound)),
                    [key] => Ok(SignerKey::from(*key)),
                    _ => Err(VerifyFailure::DeriveKey(DeriveKeyReason::KeyIdPrefixAmbiguous)),
                }
            } else {
                Err(VerifyFailure::DeriveKey(DeriveKeyReason::InvalidKeyId))
            }
        }
    }
}
