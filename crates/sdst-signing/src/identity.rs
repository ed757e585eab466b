//! Key identifiers and key-material classification.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use serde::Serialize;

use crate::algorithm::Algorithm;
use crate::algorithm::DEFAULT_DIGEST;
use crate::algorithm::RSA_MODULUS_SIZES;
use crate::error::Result;
use crate::error::SigningError;
use crate::pem::PUBLIC_KEY_HEADER;
use crate::pem::decode_base64;
use crate::pem::public_key_pem_to_raw;
use crate::provider::ProviderHandle;

/// Length of a full key id: 32 hash bytes in unpadded base64.
pub const KEY_ID_LEN: usize = 43;

/// Shortest and longest accepted key id prefix.
pub const KEY_ID_PREFIX_MIN: usize = 12;
pub const KEY_ID_PREFIX_MAX: usize = 14;

/// PEM file sizes of RSA public keys, indexed like [`RSA_MODULUS_SIZES`].
const RSA_PUBLIC_PEM_LENGTHS: [usize; 9] = [272, 361, 451, 625, 800, 1405, 1491, 2705, 2880];

/// PEM file sizes of PKCS#8 RSA private keys, indexed like [`RSA_MODULUS_SIZES`].
const RSA_PRIVATE_PEM_LENGTHS: [usize; 9] = [916, 1306, 1704, 2484, 3272, 6002, 6392, 11852, 12632];

/// Stable identifier of a public key.
///
/// URL-safe base64 (no padding) of the SHA-256 of the key's DER encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first `len` characters, or the whole id if shorter.
    pub fn prefix(&self, len: usize) -> &str {
        self.0.get(..len).unwrap_or(&self.0)
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl From<String> for KeyId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for KeyId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for KeyId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the key id of a public key given as PEM or raw base64.
///
/// Line wrapping and surrounding whitespace do not affect the result.
pub fn derive_key_id(provider: &ProviderHandle, public_key: &str) -> Result<KeyId> {
    let der = decode_base64(&public_key_pem_to_raw(public_key))
        .filter(|der| !der.is_empty())
        .ok_or_else(|| SigningError::InvalidPublicKey("public key is not base64".into()))?;
    let digest = provider.run(|p| p.hash(&der, DEFAULT_DIGEST))?;
    Ok(KeyId(URL_SAFE_NO_PAD.encode(digest)))
}

/// Work out which catalog algorithm a PEM key (public or private) uses.
///
/// Returns `Ok(None)` when the key cannot be parsed or matches nothing.
/// RSA modulus sizes are inferred from the PEM file length, falling back to
/// a modulus size reported by the provider. Provider unavailability is
/// still an error.
pub fn classify_key_material(provider: &ProviderHandle, pem: &[u8]) -> Result<Option<Algorithm>> {
    let report = match provider.run(|p| p.inspect_key_structure(pem)) {
        Ok(report) => report.to_lowercase(),
        Err(SigningError::Provider(err)) => {
            tracing::debug!(error = %err, "key structure inspection failed");
            return Ok(None);
        }
        Err(err) => return Err(err),
    };
    let objects: Vec<&str> = report
        .split_whitespace()
        .filter_map(|token| token.strip_prefix(':'))
        .collect();

    if objects.contains(&"rsaencryption") {
        let is_public = String::from_utf8_lossy(pem).trim_start().starts_with(PUBLIC_KEY_HEADER);
        return Ok(rsa_bits_from_pem_length(pem.len(), is_public)
            .or_else(|| rsa_bits_from_report(&report))
            .map(|bits| Algorithm::Rsa { bits }));
    }

    Ok(Algorithm::all()
        .filter(|alg| !matches!(alg, Algorithm::Rsa { .. }))
        .find(|alg| objects.contains(&alg.name().to_lowercase().as_str())))
}

/// Length table lookup, tolerating one extra byte (a trailing newline).
fn rsa_bits_from_pem_length(len: usize, is_public: bool) -> Option<u32> {
    let table = if is_public { &RSA_PUBLIC_PEM_LENGTHS } else { &RSA_PRIVATE_PEM_LENGTHS };
    table
        .iter()
        .position(|&known| known == len || known + 1 == len)
        .map(|index| RSA_MODULUS_SIZES[index])
}

/// Parse a `public-key: (<bits> bit)` line, accepting catalog sizes only.
fn rsa_bits_from_report(report: &str) -> Option<u32> {
    let start = report.find("public-key: (")? + "public-key: (".len();
    let bits: u32 = report[start..].split_whitespace().next()?.parse().ok()?;
    RSA_MODULUS_SIZES.contains(&bits).then_some(bits)
}
