//! Cryptographic operations provider boundary.
//!
//! Everything that touches key material goes through a [`CryptoProvider`].
//! The provider executes one operation at a time: callers go through a
//! [`ProviderHandle`], which fails fast with [`SigningError::ProviderBusy`]
//! instead of queueing.
//!
//! # Abort
//!
//! [`ProviderHandle::abort`] resets a busy handle to idle. An operation that
//! was running at that moment reports [`SigningError::ProviderAborted`]
//! instead of its result, even if the provider call itself completed.

pub mod rust_crypto;

use std::fmt;
use std::mem::ManuallyDrop;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

pub use rust_crypto::RustCryptoProvider;

use crate::algorithm::Algorithm;
use crate::algorithm::DigestMethod;
use crate::error::Result;
use crate::error::SigningError;

/// Errors reported by a provider implementation.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The algorithm, curve, digest or key encoding is not implemented.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The key material could not be parsed.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Symmetric decryption failed its padding check.
    #[error("bad decrypt (wrong password or corrupt data)")]
    BadPassword,

    /// Any other primitive failure.
    #[error("{0}")]
    Crypto(String),
}

/// A freshly generated key pair, both halves PEM encoded.
#[derive(Debug, Clone)]
pub struct KeyPairPem {
    pub public_key: String,
    pub private_key: String,
}

/// Raw cryptographic primitives.
///
/// Implementations are not expected to be reentrant; exclusivity is enforced
/// by [`ProviderHandle`].
pub trait CryptoProvider: Send + Sync {
    /// Generate a key pair, seeding the generator with `entropy`.
    fn generate_key_pair(&self, algorithm: Algorithm, entropy: &[u8]) -> Result<KeyPairPem, ProviderError>;

    /// Derive the SPKI public key PEM from a private key PEM.
    fn derive_public_key(&self, private_key_pem: &str) -> Result<String, ProviderError>;

    /// Sign `payload`. `digest` is ignored by EdDSA keys; `seed` feeds the
    /// nonce generator of ECDSA keys.
    fn sign(
        &self,
        private_key_pem: &str,
        payload: &[u8],
        digest: Option<DigestMethod>,
        seed: Option<&[u8]>,
    ) -> Result<Vec<u8>, ProviderError>;

    /// Check `signature` over `payload`. A mismatch is `Ok(false)`.
    fn verify(
        &self,
        public_key_pem: &str,
        payload: &[u8],
        signature: &[u8],
        digest: Option<DigestMethod>,
    ) -> Result<bool, ProviderError>;

    /// Describe the ASN.1 structure of a PEM key as text.
    fn inspect_key_structure(&self, pem: &[u8]) -> Result<String, ProviderError>;

    fn hash(&self, bytes: &[u8], digest: DigestMethod) -> Result<Vec<u8>, ProviderError>;

    fn symmetric_encrypt(&self, plaintext: &[u8], password: &[u8]) -> Result<Vec<u8>, ProviderError>;

    /// Fails with [`ProviderError::BadPassword`] when the password is wrong.
    fn symmetric_decrypt(&self, ciphertext: &[u8], password: &[u8]) -> Result<Vec<u8>, ProviderError>;
}

// ---------------------------------------------------------------------------
// Exclusive handle
// ---------------------------------------------------------------------------

/// Low bit of the state word; the remaining bits count aborts.
const BUSY: u64 = 1;

struct Shared {
    provider: Box<dyn CryptoProvider>,
    /// `abort_epoch << 1 | busy`
    state: AtomicU64,
}

/// Shared, exclusive access to a provider.
#[derive(Clone)]
pub struct ProviderHandle {
    shared: Arc<Shared>,
}

impl ProviderHandle {
    pub fn new(provider: impl CryptoProvider + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                provider: Box::new(provider),
                state: AtomicU64::new(0),
            }),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.shared.state.load(Ordering::Acquire) & BUSY != 0
    }

    /// Mark the provider busy for the lifetime of the returned lease.
    pub fn acquire(&self) -> Result<ProviderLease<'_>> {
        let current = self.shared.state.load(Ordering::Acquire);
        if current & BUSY != 0 {
            return Err(SigningError::ProviderBusy);
        }
        self.shared
            .state
            .compare_exchange(current, current | BUSY, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SigningError::ProviderBusy)?;
        Ok(ProviderLease {
            shared: &self.shared,
            held: current | BUSY,
        })
    }

    /// Run one provider round trip under an exclusive lease.
    pub fn run<T>(&self, op: impl FnOnce(&dyn CryptoProvider) -> Result<T, ProviderError>) -> Result<T> {
        let lease = self.acquire()?;
        let outcome = op(lease.provider());
        lease.finish(outcome)
    }

    /// Reset a busy provider to idle. Returns whether anything was aborted.
    pub fn abort(&self) -> bool {
        let aborted = self
            .shared
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                (state & BUSY != 0).then(|| ((state >> 1) + 1) << 1)
            })
            .is_ok();
        if aborted {
            tracing::warn!("crypto provider aborted");
        }
        aborted
    }
}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderHandle").field("busy", &self.is_busy()).finish()
    }
}

/// Proof of exclusive provider access. Releases on drop.
pub struct ProviderLease<'a> {
    shared: &'a Shared,
    held: u64,
}

impl ProviderLease<'_> {
    pub fn provider(&self) -> &dyn CryptoProvider {
        self.shared.provider.as_ref()
    }

    /// Release the lease and convert a provider outcome, turning any result
    /// obtained after an abort into [`SigningError::ProviderAborted`].
    pub fn finish<T>(self, outcome: Result<T, ProviderError>) -> Result<T> {
        let lease = ManuallyDrop::new(self);
        if !lease.release() {
            return Err(SigningError::ProviderAborted);
        }
        outcome.map_err(SigningError::from)
    }

    /// Clear the busy bit if this lease still holds it. Fails after an
    /// abort, leaving any newer holder untouched.
    fn release(&self) -> bool {
        self.shared
            .state
            .compare_exchange(self.held, self.held & !BUSY, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Drop for ProviderLease<'_> {
    fn drop(&mut self) {
        if !self.release() {
            tracing::debug!("aborted provider lease dropped");
        }
    }
}
