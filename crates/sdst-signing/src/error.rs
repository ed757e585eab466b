//! Error types for key management, signing and envelope handling.

use crate::identity::KeyId;
use crate::provider::ProviderError;

/// Result alias used throughout the crate.
pub type Result<T, E = SigningError> = std::result::Result<T, E>;

/// Errors from key management, signing and envelope operations.
///
/// Per-entry verification problems are never reported through this type;
/// they are collected as [`crate::resolve::VerifyFailure`] on each entry.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    /// A key with this id is already stored.
    #[error("key id already exists ({0})")]
    KeyIdExists(KeyId),

    /// Another key already uses this alias.
    #[error("alias already exists ({0})")]
    AliasExists(String),

    /// No stored key has this id.
    #[error("key not found ({0})")]
    KeyNotFound(String),

    /// A database document entry has no `keyId`.
    #[error("key id missing from key #{index}")]
    KeyIdMissing { index: usize },

    /// A database document entry has no `publicKey`.
    #[error("public key missing from key #{index}")]
    PublicKeyMissing { index: usize },

    /// A database document entry has no `algorithm`.
    #[error("algorithm missing from key #{index}")]
    AlgorithmMissing { index: usize },

    /// The private key could not be parsed or does not match its public key.
    #[error("failed to derive public key from private key, private key is invalid")]
    InvalidPrivateKey,

    /// The public key text is not a usable PEM or base64 payload.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The operation needs a private key but the key is public-only.
    #[error("key has no private part ({0})")]
    NoPrivateKey(KeyId),

    /// The algorithm name is not in the catalog or could not be derived from a key.
    #[error("algorithm unknown ({0})")]
    UnknownAlgorithm(String),

    /// The digest method name is not in the catalog.
    #[error("digest method unknown ({0})")]
    UnknownDigest(String),

    /// Signing an empty payload is refused.
    #[error("cannot sign empty data")]
    EmptyPayload,

    /// The provider produced no signature.
    #[error("failed to sign data: {0}")]
    SignFailed(String),

    /// Another provider operation is in flight.
    #[error("crypto provider is busy computing something else")]
    ProviderBusy,

    /// The provider was reset while this operation was running.
    #[error("crypto provider operation was aborted")]
    ProviderAborted,

    /// A provider failure that is not busy/abort.
    #[error("crypto provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Plain text contains no recognized ending phrase line.
    #[error("invalid signed plain text: no ending phrase")]
    NoEndingPhrase,

    /// Plain-text trailer lacks a signer identifier paragraph.
    #[error("invalid signed plain text: no signer identifier")]
    NoSignerIdentifier,

    /// A signature is not valid base64.
    #[error("signature is not valid base64")]
    InvalidBase64Signature,

    /// The JSON document is not a valid JSON sign request.
    #[error("invalid JSON sign request: {0}")]
    InvalidJsonSignRequest(String),

    /// The JSON sign request does not accept this signer.
    #[error("failed to sign JSON sign request: {0}")]
    JsrSignRejected(String),

    /// Decrypting the database failed, most likely because of the password.
    #[error("failed to decrypt key database (wrong password?)")]
    WrongPassword,

    /// The database is encrypted but no password was supplied.
    #[error("key database is encrypted, a password is required")]
    PasswordRequired,

    /// The encrypted database container is malformed.
    #[error("invalid encrypted key database: {0}")]
    InvalidCiphertext(String),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
