//! JSON Sign Requests.
//!
//! A JSON Sign Request (JSR) carries the `data` to sign, the negotiation
//! terms a signer must meet and the signatures collected so far:
//!
//! ```json
//! {
//!   "data": {"order": 42},
//!   "acceptedAlgorithms": ["ed25519", "prime256v1"],
//!   "acceptedDigestMethods": ["sha256", "sha512"],
//!   "signatures": [
//!     {"signature": "<base64>", "keyId": "<43 chars>"},
//!     {"signature": "<base64>", "publicKey": "<raw base64>", "digestMethod": "sha512"}
//!   ]
//! }
//! ```
//!
//! Structured `data` is signed in canonical form, so verifiers may reorder
//! object keys freely. A request either names acceptable algorithms
//! (`acceptedAlgorithms`, signed with an explicit key) or asks specific keys
//! to sign (`requestSignaturesFrom`, keys picked from the local database).

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::algorithm::DEFAULT_DIGEST;
use crate::algorithm::DigestMethod;
use crate::algorithm::canonical_digest;
use crate::algorithm::negotiate_algorithms;
use crate::algorithm::negotiate_digests;
use crate::canonical::payload_bytes;
use crate::database::Key;
use crate::database::KeyDatabase;
use crate::engine::SignatureEngine;
use crate::engine::resolve_digest;
use crate::error::Result;
use crate::error::SigningError;
use crate::pem::decode_base64;
use crate::pem::encode_base64;
use crate::pem::public_key_pem_to_raw;
use crate::resolve::SignerKey;
use crate::resolve::SignerRef;
use crate::resolve::VerifyFailure;
use crate::resolve::resolve_signer;

/// Fields written by verification; stale copies are dropped on parse.
const VERIFICATION_FIELDS: [&str; 5] = ["failedToVerify", "valid", "key", "illegalAlgorithm", "illegalDigestMethod"];

/// What a request is parsed for. Signing and verifying validate different
/// fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsrPurpose {
    Sign,
    Verify,
}

/// One signature of a request. Parsed leniently so that a malformed entry
/// fails on its own during verification.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureEntry {
    /// Base64 signature. Kept as raw JSON so a non-string can be reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    /// Raw (PEM-stripped) public key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest_method: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SignatureEntry {
    fn from_value(value: Value) -> Self {
        let Value::Object(mut object) = value else {
            return Self::default();
        };
        for field in VERIFICATION_FIELDS {
            object.remove(field);
        }
        Self {
            signature: object.remove("signature"),
            key_id: object.remove("keyId").and_then(lenient_string),
            public_key: object.remove("publicKey").and_then(lenient_string),
            digest_method: object.remove("digestMethod").and_then(lenient_string),
            extra: object,
        }
    }

    /// The signer this entry names. An embedded public key wins over a key id.
    pub fn signer_ref(&self) -> Option<SignerRef> {
        match (&self.public_key, &self.key_id) {
            (Some(public_key), _) => Some(SignerRef::PublicKey(public_key.clone())),
            (None, Some(key_id)) => Some(SignerRef::KeyId(key_id.clone())),
            (None, None) => None,
        }
    }

    fn names_key(&self, key: &Key) -> bool {
        let by_id = self
            .key_id
            .as_ref()
            .is_some_and(|id| SignerRef::KeyId(id.clone()).refers_to(&key.key_id, &key.public_key));
        let by_public_key = self
            .public_key
            .as_ref()
            .is_some_and(|pk| SignerRef::PublicKey(pk.clone()).refers_to(&key.key_id, &key.public_key));
        by_id || by_public_key
    }
}

/// A parsed JSON Sign Request. Unknown top-level fields survive signing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonSignRequest {
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_algorithms: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_digest_methods: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept_all_digest_methods: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_signatures_from: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_public_key: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<SignatureEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JsonSignRequest {
    /// A request over `data` with no terms and no signatures.
    pub fn new(data: Value) -> Self {
        Self {
            data,
            accepted_algorithms: None,
            accepted_digest_methods: None,
            accept_all_digest_methods: None,
            request_signatures_from: None,
            require_public_key: None,
            signatures: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Parse and validate JSON text.
    pub fn parse(text: &str, purpose: JsrPurpose) -> Result<Self> {
        let value: Value = serde_json::from_str(text).map_err(|e| invalid(format!("not JSON ({e})")))?;
        Self::from_value(value, purpose)
    }

    /// Validate an already parsed JSON value.
    pub fn from_value(value: Value, purpose: JsrPurpose) -> Result<Self> {
        let Value::Object(mut object) = value else {
            return Err(invalid("not a JSON object"));
        };
        let data = object.remove("data").ok_or_else(|| invalid("data missing"))?;
        // `null` counts as an object and signs as the canonical text "null".
        if !(data.is_string() || data.is_object() || data.is_array() || data.is_null()) {
            return Err(invalid("data neither string nor object"));
        }

        let request_signatures_from = take_string_array(&mut object, "requestSignaturesFrom")?;
        let accepted_algorithms = take_string_array(&mut object, "acceptedAlgorithms")?;
        let accepted_digest_methods = take_string_array(&mut object, "acceptedDigestMethods")?;
        if purpose == JsrPurpose::Sign && accepted_algorithms.is_none() && request_signatures_from.is_none() {
            return Err(invalid("neither acceptedAlgorithms nor requestSignaturesFrom present"));
        }

        let signatures = match (object.remove("signatures"), purpose) {
            (Some(Value::Array(items)), JsrPurpose::Verify) if items.is_empty() => {
                return Err(invalid("signatures empty"));
            }
            (Some(Value::Array(items)), _) => items.into_iter().map(SignatureEntry::from_value).collect(),
            (Some(_), JsrPurpose::Verify) => return Err(invalid("signatures not an array")),
            (None, JsrPurpose::Verify) => return Err(invalid("signatures missing")),
            (_, JsrPurpose::Sign) => Vec::new(),
        };
        object.remove("missingSignatures");

        Ok(Self {
            data,
            accepted_algorithms,
            accepted_digest_methods,
            accept_all_digest_methods: object.remove("acceptAllDigestMethods").and_then(|v| v.as_bool()),
            request_signatures_from,
            require_public_key: object.remove("requirePublicKey").and_then(|v| v.as_bool()),
            signatures,
            extra: object,
        })
    }

    pub fn accepts_all_digests(&self) -> bool {
        self.accept_all_digest_methods == Some(true)
    }

    /// Accepted digests; only `sha256` when the request names none.
    pub fn accepted_digests(&self) -> Vec<DigestMethod> {
        match &self.accepted_digest_methods {
            Some(names) => negotiate_digests(names),
            None => vec![DEFAULT_DIGEST],
        }
    }

    /// Bytes the signatures cover.
    pub fn payload(&self) -> Vec<u8> {
        payload_bytes(&self.data)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn digest_accepted(&self, key: &Key, digest: DigestMethod) -> bool {
        self.accepts_all_digests()
            || !key.algorithm.family().allows_digest_choice()
            || self.accepted_digests().contains(&digest)
    }
}

fn invalid(reason: impl Into<String>) -> SigningError {
    SigningError::InvalidJsonSignRequest(reason.into())
}

fn take_string_array(object: &mut Map<String, Value>, field: &str) -> Result<Option<Vec<String>>> {
    let Some(value) = object.remove(field) else {
        return Ok(None);
    };
    let not_strings = || invalid(format!("{field} is not an array of strings"));
    let Value::Array(items) = value else {
        return Err(not_strings());
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::String(text) => Ok(text),
            _ => Err(not_strings()),
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

fn lenient_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// Signer choices for [`sign_json_request`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsrSignOptions<'a> {
    /// Name the signer by key id instead of embedding the public key.
    /// Ignored when the request sets `requirePublicKey`.
    pub sign_with_key_id: bool,
    pub digest: Option<&'a str>,
    pub entropy: Option<&'a [u8]>,
}

/// Add signatures to a request.
///
/// With `requestSignaturesFrom`, every listed key pair found in `db` signs
/// and `key` is ignored. Otherwise `key` signs, provided its algorithm is in
/// `acceptedAlgorithms`. Either way the digest must be accepted unless the
/// request accepts all digests or the key is EdDSA. All terms are checked
/// before anything is signed.
pub fn sign_json_request(
    engine: &SignatureEngine,
    db: &KeyDatabase,
    key: Option<&Key>,
    mut jsr: JsonSignRequest,
    options: &JsrSignOptions<'_>,
) -> Result<JsonSignRequest> {
    let digest = resolve_digest(options.digest)?;

    let signers: Vec<&Key> = match &jsr.request_signatures_from {
        Some(requested) => {
            let found: Vec<&Key> = requested
                .iter()
                .filter_map(|id| db.get_by_id(id))
                .filter(|key| key.is_key_pair())
                .collect();
            if found.is_empty() {
                return Err(SigningError::JsrSignRejected(
                    "no key found from which a signature is requested".into(),
                ));
            }
            found
        }
        None => vec![key.ok_or_else(|| SigningError::JsrSignRejected("no signing key selected".into()))?],
    };

    for signer in &signers {
        if !jsr.digest_accepted(signer, digest) {
            return Err(SigningError::JsrSignRejected(format!(
                "selected digest method '{digest}' not accepted for this JSON sign request"
            )));
        }
        if let Some(accepted) = &jsr.accepted_algorithms {
            if !negotiate_algorithms(accepted).contains(&signer.algorithm) {
                return Err(SigningError::JsrSignRejected(format!(
                    "selected algorithm '{}' not accepted for this JSON sign request",
                    signer.algorithm
                )));
            }
        }
    }

    let payload = jsr.payload();
    for signer in signers {
        let signature = engine.sign(signer, &payload, Some(digest.name()), options.entropy)?;
        jsr.signatures.retain(|entry| !entry.names_key(signer));

        let by_key_id = options.sign_with_key_id && jsr.require_public_key != Some(true);
        jsr.signatures.push(SignatureEntry {
            signature: Some(Value::String(encode_base64(&signature))),
            key_id: by_key_id.then(|| signer.key_id.to_string()),
            public_key: (!by_key_id).then(|| public_key_pem_to_raw(&signer.public_key)),
            digest_method: (signer.algorithm.family().allows_digest_choice() && !digest.is_default())
                .then(|| digest.name().to_string()),
            extra: Map::new(),
        });
        tracing::info!(key_id = %signer.key_id, algorithm = %signer.algorithm, %digest, "JSON sign request signed");
    }
    Ok(jsr)
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Outcome for one signature entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedEntry {
    #[serde(flatten)]
    pub entry: SignatureEntry,
    /// Set when the entry could not be checked at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_to_verify: Option<VerifyFailure>,
    /// Result of the cryptographic check, when one ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<SignerKey>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub illegal_algorithm: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub illegal_digest_method: bool,
}

impl VerifiedEntry {
    fn new(entry: SignatureEntry) -> Self {
        Self {
            entry,
            failed_to_verify: None,
            valid: None,
            key: None,
            illegal_algorithm: false,
            illegal_digest_method: false,
        }
    }

    /// The signature checked out cryptographically.
    pub fn is_valid(&self) -> bool {
        self.valid == Some(true)
    }

    /// Valid, and within the request's algorithm and digest terms.
    pub fn is_acceptable(&self) -> bool {
        self.is_valid() && !self.illegal_algorithm && !self.illegal_digest_method
    }

    fn fail(mut self, failure: VerifyFailure) -> Self {
        tracing::warn!(reason = %failure, "signature entry not verified");
        self.failed_to_verify = Some(failure);
        self
    }
}

/// A verified request, serializable back into annotated JSR JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsrVerification {
    /// The request with its signatures moved into `signatures` below.
    #[serde(flatten)]
    pub request: JsonSignRequest,
    pub signatures: Vec<VerifiedEntry>,
    /// Requested key ids without a valid signature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_signatures: Option<Vec<String>>,
}

impl JsrVerification {
    pub fn all_valid(&self) -> bool {
        self.signatures.iter().all(VerifiedEntry::is_acceptable)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Verify every entry of a request, one at a time. Entry failures are
/// recorded on the entry and never stop the others.
pub fn verify_json_request(engine: &SignatureEngine, db: &KeyDatabase, mut jsr: JsonSignRequest) -> JsrVerification {
    let payload = jsr.payload();
    let entries = std::mem::take(&mut jsr.signatures);
    let verified: Vec<VerifiedEntry> =
        entries.into_iter().map(|entry| verify_signature_entry(engine, db, &jsr, &payload, entry)).collect();

    let missing_signatures = jsr.request_signatures_from.as_ref().map(|requested| {
        requested
            .iter()
            .filter(|id| {
                !verified
                    .iter()
                    .any(|v| v.is_valid() && v.key.as_ref().is_some_and(|k| k.key_id.as_str() == id.as_str()))
            })
            .cloned()
            .collect()
    });
    tracing::debug!(
        entries = verified.len(),
        valid = verified.iter().filter(|v| v.is_valid()).count(),
        "JSON sign request verified"
    );

    JsrVerification {
        request: jsr,
        signatures: verified,
        missing_signatures,
    }
}

/// Verify one entry against `payload` under the terms of `jsr`.
pub(crate) fn verify_signature_entry(
    engine: &SignatureEngine,
    db: &KeyDatabase,
    jsr: &JsonSignRequest,
    payload: &[u8],
    entry: SignatureEntry,
) -> VerifiedEntry {
    let signer = entry.signer_ref();
    let mut out = VerifiedEntry::new(entry);

    let key = match resolve_signer(engine.provider(), db, signer.as_ref()) {
        Ok(key) => key,
        Err(failure) => return out.fail(failure),
    };
    out.key = Some(key.clone());
    let family = key.algorithm.family();

    let digest = match &out.entry.digest_method {
        None => Some(DEFAULT_DIGEST),
        Some(name) => canonical_digest(name),
    };
    if digest.is_none() && family.allows_digest_choice() {
        return out.fail(VerifyFailure::UnknownDigest);
    }

    let signature = match &out.entry.signature {
        None => return out.fail(VerifyFailure::MissingSignature),
        Some(Value::String(text)) => match decode_base64(text) {
            Some(bytes) => bytes,
            None => return out.fail(VerifyFailure::SignatureNotBase64),
        },
        Some(_) => return out.fail(VerifyFailure::SignatureNotString),
    };

    match engine.verify(&key, payload, &signature, digest.map(|d| d.name())) {
        Ok(valid) => out.valid = Some(valid),
        Err(err) => return out.fail(err.into()),
    }

    if let Some(accepted) = &jsr.accepted_algorithms {
        out.illegal_algorithm = !negotiate_algorithms(accepted).contains(&key.algorithm);
    }
    if !jsr.accepts_all_digests() && family.allows_digest_choice() {
        out.illegal_digest_method = !digest.is_some_and(|d| jsr.accepted_digests().contains(&d));
    }
    out
}
