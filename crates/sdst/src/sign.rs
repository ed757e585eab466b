//! `sdst sign` — sign a JSON sign request or plain text.

use std::path::Path;

use sdst_signing::jsr;
use sdst_signing::jsr::JsonSignRequest;
use sdst_signing::jsr::JsrPurpose;
use sdst_signing::jsr::JsrSignOptions;
use sdst_signing::plain_text;

use crate::store::Store;
use crate::store::read_input;
use crate::store::write_output;

pub struct SignArgs<'a> {
    pub key: Option<&'a str>,
    pub input: Option<&'a Path>,
    pub output: Option<&'a Path>,
    pub plain: bool,
    pub digest: Option<&'a str>,
    pub key_id: bool,
    pub entropy: Option<&'a str>,
}

pub fn run(store: &Store, args: &SignArgs<'_>) -> anyhow::Result<()> {
    let text = read_input(args.input)?;
    let key = args.key.map(|reference| store.find_key(reference)).transpose()?;
    let digest = args.digest.or(store.config.digest_method.as_deref());
    let entropy = args.entropy.map(str::as_bytes);

    if !args.plain {
        match JsonSignRequest::parse(&text, JsrPurpose::Sign) {
            Ok(request) => {
                let options = JsrSignOptions {
                    sign_with_key_id: args.key_id || store.config.sign_with_key_id,
                    digest,
                    entropy,
                };
                let signed = jsr::sign_json_request(&store.engine, &store.db, key, request, &options)?;
                let count = signed.signatures.len();
                write_output(args.output, &signed.to_json()?)?;
                eprintln!("✓ Signed JSON sign request ({count} signatures)");
                return Ok(());
            }
            Err(err) => tracing::debug!(error = %err, "input is not a JSON sign request, signing as plain text"),
        }
    }

    let Some(key) = key else {
        anyhow::bail!("plain text needs a signing key: pass --key <alias or key id>");
    };
    let mut options = store.config.plain_text_options();
    options.digest = digest.map(str::to_string);
    if args.key_id && options.signer_id == plain_text::SignerIdStyle::PublicKey {
        options.signer_id = plain_text::SignerIdStyle::KeyId;
    }
    let signed = plain_text::sign_plain_text(&store.engine, key, &text, &options, entropy)?;
    write_output(args.output, &signed)?;
    eprintln!("✓ Signed with '{}' ({})", key.alias, key.key_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> Store {
        Store::open(Some(&dir.join("config.json")), Some(dir.join("keys.sdst")), None).unwrap()
    }

    fn args<'a>(key: Option<&'a str>, input: &'a Path, output: &'a Path) -> SignArgs<'a> {
        SignArgs {
            key,
            input: Some(input),
            output: Some(output),
            plain: false,
            digest: None,
            key_id: false,
            entropy: None,
        }
    }

    #[test]
    fn signs_json_request_and_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = store(dir.path());
        s.engine.generate_key(&mut s.db, "ed25519", Some("alice"), None).unwrap();

        let input = dir.path().join("request.json");
        let output = dir.path().join("signed.json");
        std::fs::write(&input, r#"{"data": {"x": 1}, "acceptedAlgorithms": ["ed25519"]}"#).unwrap();
        run(&s, &args(Some("alice"), &input, &output)).unwrap();
        let signed = JsonSignRequest::parse(&std::fs::read_to_string(&output).unwrap(), JsrPurpose::Verify).unwrap();
        assert_eq!(signed.signatures.len(), 1);

        let plain = SignArgs {
            plain: true,
            key_id: true,
            ..args(Some("alice"), &input, &output)
        };
        run(&s, &plain).unwrap();
        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.contains(plain_text::ENDING_PHRASES[0]));
        assert!(text.trim_end().ends_with(s.find_key("alice").unwrap().key_id.as_str()));
    }

    #[test]
    fn plain_text_requires_key() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let input = dir.path().join("note.txt");
        std::fs::write(&input, "hello").unwrap();
        let err = run(&s, &args(None, &input, &dir.path().join("out.txt"))).unwrap_err();
        assert!(err.to_string().contains("--key"));
    }
}
