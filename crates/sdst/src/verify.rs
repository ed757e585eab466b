//! `sdst verify` — verify a JSON sign request or signed plain text.

use std::path::Path;

use sdst_signing::jsr;
use sdst_signing::jsr::JsonSignRequest;
use sdst_signing::jsr::JsrPurpose;
use sdst_signing::jsr::VerifiedEntry;
use sdst_signing::plain_text;

use crate::store::Store;
use crate::store::read_input;

/// JSON sign requests are tried first; anything that is not one is read as
/// plain text.
pub fn run(store: &Store, input: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let text = read_input(input)?;

    match JsonSignRequest::parse(&text, JsrPurpose::Verify) {
        Ok(request) => {
            let result = jsr::verify_json_request(&store.engine, &store.db, request);
            if json {
                println!("{}", result.to_json()?);
            } else {
                println!("JSON sign request, {} signatures", result.signatures.len());
                for entry in &result.signatures {
                    println!("  {}", describe(entry));
                }
                if let Some(missing) = result.missing_signatures.as_ref().filter(|m| !m.is_empty()) {
                    println!("  missing signatures from: {}", missing.join(", "));
                }
            }
            let complete = !result.missing_signatures.as_ref().is_some_and(|m| !m.is_empty());
            if !result.all_valid() || !complete {
                anyhow::bail!("JSON sign request did not verify");
            }
        }
        Err(err) => {
            tracing::debug!(error = %err, "input is not a JSON sign request, verifying as plain text");
            let result = plain_text::verify_plain_text(
                &store.engine,
                &store.db,
                &text,
                &plain_text::ENDING_PHRASES,
                store.config.max_chain_depth,
            )?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Plain text, {} signatures (oldest first)", result.layers.len());
                for layer in result.chronological() {
                    println!("  {}", describe(&layer.entry));
                }
                if result.depth_limited {
                    println!("  more signatures below, stopped after {}", result.layers.len());
                }
                println!("\n{}", result.original_payload());
            }
            if !result.all_valid() {
                anyhow::bail!("plain text signature did not verify");
            }
        }
    }
    Ok(())
}

/// One line per entry: verdict, signer and any policy flags.
fn describe(entry: &VerifiedEntry) -> String {
    if let Some(failure) = &entry.failed_to_verify {
        return format!("✗ {failure}");
    }
    let signer = match &entry.key {
        Some(key) => match &key.alias {
            Some(alias) => format!("'{alias}' ({}, {})", key.key_id, key.algorithm),
            None => format!("unknown signer {} ({})", key.key_id, key.algorithm),
        },
        None => "unknown signer".to_string(),
    };
    let mut line = if entry.is_valid() { format!("✓ {signer}") } else { format!("✗ invalid signature by {signer}") };
    if entry.illegal_algorithm {
        line.push_str(" [algorithm not accepted]");
    }
    if entry.illegal_digest_method {
        line.push_str(" [digest method not accepted]");
    }
    line
}

#[cfg(test)]
mod tests {
    use sdst_signing::jsr::JsrSignOptions;
    use sdst_signing::plain_text::PlainTextOptions;

    use super::*;

    fn store(dir: &Path) -> Store {
        Store::open(Some(&dir.join("config.json")), Some(dir.join("keys.sdst")), None).unwrap()
    }

    #[test]
    fn verifies_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = store(dir.path());
        let key = s.engine.generate_key(&mut s.db, "ed25519", Some("alice"), None).unwrap();

        let request = JsonSignRequest::parse(r#"{"data":"hi","acceptedAlgorithms":["ed25519"]}"#, JsrPurpose::Sign).unwrap();
        let signed = jsr::sign_json_request(&s.engine, &s.db, Some(&key), request, &JsrSignOptions::default()).unwrap();
        let jsr_file = dir.path().join("signed.json");
        std::fs::write(&jsr_file, signed.to_json().unwrap()).unwrap();
        run(&s, Some(&jsr_file), false).unwrap();

        let text = plain_text::sign_plain_text(&s.engine, &key, "hello", &PlainTextOptions::default(), None).unwrap();
        let text_file = dir.path().join("signed.txt");
        std::fs::write(&text_file, &text).unwrap();
        run(&s, Some(&text_file), true).unwrap();

        std::fs::write(&text_file, text.replacen("hello", "hallo", 1)).unwrap();
        assert!(run(&s, Some(&text_file), false).is_err());
    }

    #[test]
    fn describe_flags_policy_violations() {
        let entry = VerifiedEntry {
            entry: Default::default(),
            failed_to_verify: None,
            valid: Some(true),
            key: None,
            illegal_algorithm: true,
            illegal_digest_method: false,
        };
        assert_eq!(describe(&entry), "✓ unknown signer [algorithm not accepted]");
    }
}
