//! Plain-text signatures that can be stacked.
//!
//! A signed text is the original text followed by an ending phrase, the
//! wrapped base64 signature, a blank line and the signer identifier, plus an
//! optional blank line and digest name:
//!
//! ```text
//! Pay Bob 10 coins.
//! -----SIGNATURE-----
//! MEUCIQDv...
//!
//! J3v0QmI9oQ2k8hZs1yq3vP0h1mXz4c6nRk2wL9fT7Ew
//!
//! sha512
//! ```
//!
//! Signing an already signed text wraps it in another layer. Verification
//! unwinds the layers from the outermost inwards.

use serde::Serialize;
use serde_json::Value;

use crate::database::Key;
use crate::database::KeyDatabase;
use crate::engine::SignatureEngine;
use crate::engine::resolve_digest;
use crate::error::Result;
use crate::error::SigningError;
use crate::identity::KEY_ID_PREFIX_MAX;
use crate::identity::KEY_ID_PREFIX_MIN;
use crate::jsr::JsonSignRequest;
use crate::jsr::SignatureEntry;
use crate::jsr::VerifiedEntry;
use crate::jsr::verify_signature_entry;
use crate::pem::LINE_WIDTH;
use crate::pem::decode_base64;
use crate::pem::encode_base64;
use crate::pem::public_key_pem_to_raw;
use crate::pem::wrap_lines;
use crate::resolve::SignerRef;

/// Recognized ending phrases. The first is the default, the second the
/// short form.
pub const ENDING_PHRASES: [&str; 2] = ["-----SIGNATURE-----", "---SIG---"];

/// Layers unwound before verification stops.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 64;

/// How the signer is named below the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignerIdStyle {
    /// Full 43 character key id.
    KeyId,
    /// The first n characters of the key id, n clamped to 12..=14.
    KeyIdPrefix(usize),
    /// Raw public key wrapped at 64 columns.
    #[default]
    PublicKey,
}

/// Layout and preprocessing for [`sign_plain_text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainTextOptions {
    pub ending_phrase: String,
    /// Leave an empty line between the ending phrase and the signature.
    pub break_after_ending_phrase: bool,
    pub signer_id: SignerIdStyle,
    pub digest: Option<String>,
    /// Trim every line and collapse whitespace runs before signing.
    pub normalize: bool,
    /// Append a newline to the text before signing.
    pub append_newline: bool,
}

impl Default for PlainTextOptions {
    fn default() -> Self {
        Self {
            ending_phrase: ENDING_PHRASES[0].to_string(),
            break_after_ending_phrase: false,
            signer_id: SignerIdStyle::default(),
            digest: None,
            normalize: false,
            append_newline: false,
        }
    }
}

/// Trim each line and collapse runs of whitespace to one space.
pub fn normalize_plain_text(text: &str) -> String {
    text.split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sign `text` with a key pair and append the signature block.
pub fn sign_plain_text(
    engine: &SignatureEngine,
    key: &Key,
    text: &str,
    options: &PlainTextOptions,
    entropy: Option<&[u8]>,
) -> Result<String> {
    let mut data = if options.normalize { normalize_plain_text(text) } else { text.to_string() };
    if options.append_newline {
        data.push('\n');
    }
    let digest = resolve_digest(options.digest.as_deref())?;
    let signature = engine.sign(key, data.as_bytes(), Some(digest.name()), entropy)?;

    let signer = match options.signer_id {
        SignerIdStyle::KeyId => key.key_id.to_string(),
        SignerIdStyle::KeyIdPrefix(len) => key.key_id.prefix(len.clamp(KEY_ID_PREFIX_MIN, KEY_ID_PREFIX_MAX)).to_string(),
        SignerIdStyle::PublicKey => wrap_lines(&public_key_pem_to_raw(&key.public_key), LINE_WIDTH),
    };

    let mut out = data;
    out.push('\n');
    out.push_str(&options.ending_phrase);
    if options.break_after_ending_phrase {
        out.push('\n');
    }
    out.push('\n');
    out.push_str(&wrap_lines(&encode_base64(&signature), LINE_WIDTH));
    out.push_str("\n\n");
    out.push_str(&signer);
    if key.algorithm.family().allows_digest_choice() && !digest.is_default() {
        out.push_str("\n\n");
        out.push_str(digest.name());
    }
    tracing::info!(key_id = %key.key_id, algorithm = %key.algorithm, %digest, "plain text signed");
    Ok(out)
}

/// One parsed signature layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainTextEnvelope {
    /// Everything above the ending phrase. This is what the signature covers.
    pub data: String,
    /// Base64 signature with line breaks removed.
    pub signature: String,
    pub signer: SignerRef,
    pub digest_method: Option<String>,
}

impl PlainTextEnvelope {
    pub fn signature_bytes(&self) -> Result<Vec<u8>> {
        decode_base64(&self.signature).ok_or(SigningError::InvalidBase64Signature)
    }

    fn into_entry(self) -> (String, SignatureEntry) {
        let (key_id, public_key) = match self.signer {
            SignerRef::KeyId(id) => (Some(id), None),
            SignerRef::PublicKey(raw) => (None, Some(raw)),
        };
        let entry = SignatureEntry {
            signature: Some(Value::String(self.signature)),
            key_id,
            public_key,
            digest_method: self.digest_method,
            extra: Default::default(),
        };
        (self.data, entry)
    }
}

/// Split off the outermost signature layer.
///
/// The last line equal to one of `ending_phrases` (both sides trimmed) ends
/// the data.
pub fn parse_plain_text(text: &str, ending_phrases: &[&str]) -> Result<PlainTextEnvelope> {
    let lines: Vec<&str> = text.split('\n').collect();
    let split_at = lines
        .iter()
        .rposition(|line| ending_phrases.iter().any(|phrase| phrase.trim() == line.trim()))
        .ok_or(SigningError::NoEndingPhrase)?;

    let trailer = lines[split_at + 1..].iter().map(|line| line.trim()).collect::<Vec<_>>().join("\n");
    let mut parts = trailer
        .split("\n\n")
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.replace('\n', ""));

    let (Some(signature), Some(signer)) = (parts.next(), parts.next()) else {
        return Err(SigningError::NoSignerIdentifier);
    };
    Ok(PlainTextEnvelope {
        data: lines[..split_at].join("\n"),
        signature,
        signer: SignerRef::from_identifier(&signer),
        digest_method: parts.next(),
    })
}

/// A verified layer: the text it covers and the outcome for its signature.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlainTextLayer {
    pub data: String,
    pub entry: VerifiedEntry,
}

/// All layers of a signed text, outermost (most recent) first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlainTextVerification {
    pub layers: Vec<PlainTextLayer>,
    /// Unwinding stopped at the depth bound while more layers remained.
    pub depth_limited: bool,
}

impl PlainTextVerification {
    /// Layers in the order they were applied.
    pub fn chronological(&self) -> impl Iterator<Item = &PlainTextLayer> {
        self.layers.iter().rev()
    }

    /// The text under the innermost signature.
    pub fn original_payload(&self) -> &str {
        self.layers.last().map_or("", |layer| layer.data.as_str())
    }

    pub fn all_valid(&self) -> bool {
        self.layers.iter().all(|layer| layer.entry.is_valid())
    }
}

/// Verify a signed text layer by layer.
///
/// Fails with [`SigningError::NoEndingPhrase`] or
/// [`SigningError::NoSignerIdentifier`] only for the outermost layer; below
/// that, the first text that does not parse is the original payload. An
/// invalid signature does not stop the unwinding. At most `max_depth` layers
/// are verified.
pub fn verify_plain_text(
    engine: &SignatureEngine,
    db: &KeyDatabase,
    text: &str,
    ending_phrases: &[&str],
    max_depth: usize,
) -> Result<PlainTextVerification> {
    let mut terms = JsonSignRequest::new(Value::Null);
    terms.accept_all_digest_methods = Some(true);

    let mut layers = Vec::new();
    let mut depth_limited = false;
    let mut current = parse_plain_text(text, ending_phrases)?;
    loop {
        let inner = parse_plain_text(&current.data, ending_phrases).ok();
        let (data, entry) = current.into_entry();
        let entry = verify_signature_entry(engine, db, &terms, data.as_bytes(), entry);
        tracing::debug!(depth = layers.len(), valid = entry.is_valid(), "plain text layer verified");
        layers.push(PlainTextLayer { data, entry });

        match inner {
            None => break,
            Some(_) if layers.len() >= max_depth.max(1) => {
                tracing::warn!(max_depth, "plain text chain deeper than allowed, stopped unwinding");
                depth_limited = true;
                break;
            }
            Some(next) => current = next,
        }
    }
    Ok(PlainTextVerification { layers, depth_limited })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderHandle;
    use crate::provider::RustCryptoProvider;

    fn setup() -> (SignatureEngine, KeyDatabase) {
        (SignatureEngine::new(ProviderHandle::new(RustCryptoProvider::new())), KeyDatabase::new())
    }

    fn with_style(signer_id: SignerIdStyle) -> PlainTextOptions {
        PlainTextOptions {
            signer_id,
            ..Default::default()
        }
    }

    #[test]
    fn layout_with_key_id() {
        let (engine, mut db) = setup();
        let key = engine.generate_key(&mut db, "ed25519", None, None).unwrap();
        let signed = sign_plain_text(&engine, &key, "hello", &with_style(SignerIdStyle::KeyId), None).unwrap();

        let lines: Vec<&str> = signed.split('\n').collect();
        assert_eq!(lines[0], "hello");
        assert_eq!(lines[1], ENDING_PHRASES[0]);
        // 64 byte Ed25519 signature: 88 base64 characters over two lines
        assert_eq!(lines[2].len(), 64);
        assert_eq!(lines[3].len(), 24);
        assert_eq!(lines[4], "");
        assert_eq!(lines[5], key.key_id.as_str());
        assert_eq!(lines.len(), 6);

        let envelope = parse_plain_text(&signed, &ENDING_PHRASES).unwrap();
        assert_eq!(envelope.data, "hello");
        assert_eq!(envelope.signer, SignerRef::KeyId(key.key_id.to_string()));
        assert_eq!(envelope.signature_bytes().unwrap().len(), 64);
        assert!(envelope.digest_method.is_none());
    }

    #[test]
    fn public_key_signer_and_digest_suffix() {
        let (engine, mut db) = setup();
        let key = engine.generate_key(&mut db, "prime256v1", None, None).unwrap();
        let options = PlainTextOptions {
            digest: Some("SHA512".into()),
            ..Default::default()
        };
        let signed = sign_plain_text(&engine, &key, "text", &options, None).unwrap();
        assert!(signed.ends_with("\n\nsha512"));

        let envelope = parse_plain_text(&signed, &ENDING_PHRASES).unwrap();
        assert_eq!(envelope.signer, SignerRef::PublicKey(public_key_pem_to_raw(&key.public_key)));
        assert_eq!(envelope.digest_method.as_deref(), Some("sha512"));

        let result = verify_plain_text(&engine, &KeyDatabase::new(), &signed, &ENDING_PHRASES, 8).unwrap();
        assert!(result.all_valid());
        assert!(!result.layers[0].entry.key.as_ref().unwrap().is_stored());
    }

    #[test]
    fn eddsa_never_names_digest() {
        let (engine, mut db) = setup();
        let key = engine.generate_key(&mut db, "ed25519", None, None).unwrap();
        let options = PlainTextOptions {
            digest: Some("sha512".into()),
            ..with_style(SignerIdStyle::KeyIdPrefix(13))
        };
        let signed = sign_plain_text(&engine, &key, "text", &options, None).unwrap();
        assert!(signed.ends_with(&format!("\n\n{}", key.key_id.prefix(13))));

        let result = verify_plain_text(&engine, &db, &signed, &ENDING_PHRASES, 8).unwrap();
        assert!(result.all_valid());
    }

    #[test]
    fn chain_unwinds_outermost_first() {
        let (engine, mut db) = setup();
        let alice = engine.generate_key(&mut db, "ed25519", Some("alice"), None).unwrap();
        let bob = engine.generate_key(&mut db, "secp256k1", Some("bob"), None).unwrap();

        let once = sign_plain_text(&engine, &alice, "Pay Bob 10 coins.", &with_style(SignerIdStyle::KeyId), None).unwrap();
        let short = PlainTextOptions {
            ending_phrase: ENDING_PHRASES[1].into(),
            break_after_ending_phrase: true,
            ..Default::default()
        };
        let twice = sign_plain_text(&engine, &bob, &once, &short, None).unwrap();

        let result = verify_plain_text(&engine, &db, &twice, &ENDING_PHRASES, DEFAULT_MAX_CHAIN_DEPTH).unwrap();
        assert_eq!(result.layers.len(), 2);
        assert!(result.all_valid());
        assert!(!result.depth_limited);
        assert_eq!(result.layers[0].data, once);
        assert_eq!(result.original_payload(), "Pay Bob 10 coins.");

        let signers: Vec<&str> =
            result.chronological().map(|layer| layer.entry.key.as_ref().unwrap().alias.as_deref().unwrap()).collect();
        assert_eq!(signers, ["alice", "bob"]);

        let stripped = twice.replace(ENDING_PHRASES[1], "").replace(ENDING_PHRASES[0], "");
        assert!(matches!(
            verify_plain_text(&engine, &db, &stripped, &ENDING_PHRASES, 8),
            Err(SigningError::NoEndingPhrase)
        ));
    }

    #[test]
    fn tampered_inner_layer_does_not_stop_unwinding() {
        let (engine, mut db) = setup();
        let key = engine.generate_key(&mut db, "ed25519", None, None).unwrap();
        let options = with_style(SignerIdStyle::KeyId);
        let inner = sign_plain_text(&engine, &key, "original", &options, None).unwrap();
        let tampered = inner.replacen("original", "forged", 1);
        let outer = sign_plain_text(&engine, &key, &tampered, &options, None).unwrap();

        let result = verify_plain_text(&engine, &db, &outer, &ENDING_PHRASES, 8).unwrap();
        assert_eq!(result.layers.len(), 2);
        assert_eq!(result.layers[0].entry.valid, Some(true));
        assert_eq!(result.layers[1].entry.valid, Some(false));
        assert_eq!(result.original_payload(), "forged");
        assert!(!result.all_valid());
    }

    #[test]
    fn depth_bound_stops_unwinding() {
        let (engine, mut db) = setup();
        let key = engine.generate_key(&mut db, "ed25519", None, None).unwrap();
        let options = with_style(SignerIdStyle::KeyId);
        let mut text = "base".to_string();
        for _ in 0..3 {
            text = sign_plain_text(&engine, &key, &text, &options, None).unwrap();
        }
        let result = verify_plain_text(&engine, &db, &text, &ENDING_PHRASES, 2).unwrap();
        assert_eq!(result.layers.len(), 2);
        assert!(result.depth_limited);
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(parse_plain_text("no marker here", &ENDING_PHRASES), Err(SigningError::NoEndingPhrase)));
        let nameless = "data\n-----SIGNATURE-----\nAAAA\n\n   \n";
        assert!(matches!(parse_plain_text(nameless, &ENDING_PHRASES), Err(SigningError::NoSignerIdentifier)));

        let envelope = parse_plain_text("data\n  ---SIG---  \n\nAA\nAA\n\n  KEYIDPREFIX12  \n", &ENDING_PHRASES).unwrap();
        assert_eq!(envelope.signature, "AAAA");
        assert_eq!(envelope.signer, SignerRef::KeyId("KEYIDPREFIX12".into()));
        assert!(envelope.digest_method.is_none());

        let bad = parse_plain_text("d\n---SIG---\n***\n\nKEYIDPREFIX12", &ENDING_PHRASES).unwrap();
        assert!(matches!(bad.signature_bytes(), Err(SigningError::InvalidBase64Signature)));
    }

    #[test]
    fn normalization_and_trailing_newline() {
        assert_eq!(normalize_plain_text("  a \t b  \n\n c   d"), "a b\n\nc d");

        let (engine, mut db) = setup();
        let key = engine.generate_key(&mut db, "ed25519", None, None).unwrap();
        let options = PlainTextOptions {
            normalize: true,
            append_newline: true,
            ..with_style(SignerIdStyle::KeyId)
        };
        let signed = sign_plain_text(&engine, &key, " Pay   Bob ", &options, None).unwrap();
        let result = verify_plain_text(&engine, &db, &signed, &ENDING_PHRASES, 8).unwrap();
        assert_eq!(result.original_payload(), "Pay Bob\n");
        assert!(result.all_valid());
    }
}
