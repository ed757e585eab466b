//! Public-key PEM framing and base64 helpers.
//!
//! Public keys travel in two shapes: full PEM (`BEGIN/END PUBLIC KEY`) and
//! the bare base64 payload ("raw"). Everything stored or compared uses the
//! normalized PEM form: 64-column lines with a trailing newline.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

pub const PUBLIC_KEY_HEADER: &str = "-----BEGIN PUBLIC KEY-----";
pub const PUBLIC_KEY_FOOTER: &str = "-----END PUBLIC KEY-----";

/// Line width used for PEM bodies, plain-text signatures and public keys.
pub const LINE_WIDTH: usize = 64;

/// Insert a newline after every `width` characters (none at the end).
pub fn wrap_lines(text: &str, width: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(width.max(1)).map(|chunk| chunk.iter().collect::<String>()).collect::<Vec<_>>().join("\n")
}

/// Whether `text` is PEM framed as a public key.
pub fn is_public_key_pem(text: &str) -> bool {
    text.trim().starts_with(PUBLIC_KEY_HEADER)
}

/// Strip PEM header, footer and all line breaks, leaving the base64 payload.
///
/// Text without a header is treated as an already raw payload.
pub fn public_key_pem_to_raw(pem: &str) -> String {
    pem.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("-----"))
        .flat_map(str::split_whitespace)
        .collect()
}

/// Frame a raw base64 payload (standard or URL-safe) as PEM.
pub fn public_key_raw_to_pem(raw: &str) -> String {
    let compact: String = raw.split_whitespace().collect();
    format!("{PUBLIC_KEY_HEADER}\n{}\n{PUBLIC_KEY_FOOTER}\n", wrap_lines(&to_standard_base64(&compact), LINE_WIDTH))
}

/// Canonical PEM for a public key given either as PEM or as raw payload.
pub fn normalize_public_key(public_key: &str) -> String {
    public_key_raw_to_pem(&public_key_pem_to_raw(public_key))
}

/// Convert URL-safe base64 to the standard alphabet and restore padding.
fn to_standard_base64(text: &str) -> String {
    let mut standard = text.replace('-', "+").replace('_', "/");
    match standard.len() % 4 {
        2 => standard.push_str("=="),
        3 => standard.push('='),
        _ => {}
    }
    standard
}

/// Decode standard or URL-safe base64, ignoring whitespace.
///
/// Returns `None` if the text is not base64.
pub fn decode_base64(text: &str) -> Option<Vec<u8>> {
    let compact: String = text.split_whitespace().collect();
    STANDARD.decode(to_standard_base64(&compact)).ok()
}

/// Split a PEM block into its label and DER body.
///
/// Surrounding whitespace and any body line width are accepted. Returns
/// `None` when the framing is incomplete or the body is not base64.
pub fn decode_pem(text: &str) -> Option<(String, Vec<u8>)> {
    decode_pem_blocks(text)?.into_iter().next()
}

/// Every PEM block in `text`, in order.
///
/// `openssl ecparam -genkey` writes an `EC PARAMETERS` block ahead of the
/// key, so a single file can carry several blocks.
pub fn decode_pem_blocks(text: &str) -> Option<Vec<(String, Vec<u8>)>> {
    let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());
    let mut blocks = Vec::new();
    while let Some(header) = lines.next() {
        let label = header.strip_prefix("-----BEGIN ")?.strip_suffix("-----")?.to_string();
        let footer = format!("-----END {label}-----");
        let mut body = String::new();
        loop {
            let line = lines.next()?;
            if line == footer {
                break;
            }
            body.push_str(line);
        }
        blocks.push((label, decode_base64(&body)?));
    }
    if blocks.is_empty() { None } else { Some(blocks) }
}

/// Encode bytes as standard, padded base64 on a single line.
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "MCowBQYDK2VwAyEAGb9ECWmEzf6FQbrBZ9w7lshQhqowtrbLDFw4rXAxZuE=";

    #[test]
    fn wrap_lines_breaks_every_n() {
        assert_eq!(wrap_lines("FFAA33", 2), "FF\nAA\n33");
        assert_eq!(wrap_lines("FFAA3", 2), "FF\nAA\n3");
        assert_eq!(wrap_lines("", 64), "");
    }

    #[test]
    fn raw_and_pem_roundtrip() {
        let pem = public_key_raw_to_pem(RAW);
        assert!(pem.starts_with(PUBLIC_KEY_HEADER));
        assert!(pem.ends_with("-----END PUBLIC KEY-----\n"));
        assert_eq!(public_key_pem_to_raw(&pem), RAW);
        assert!(is_public_key_pem(&pem));
        assert!(!is_public_key_pem(RAW));
    }

    #[test]
    fn normalize_rewraps_and_adds_trailing_newline() {
        let narrow = format!("  {PUBLIC_KEY_HEADER}\n{}\n{PUBLIC_KEY_FOOTER}  ", wrap_lines(RAW, 20));
        assert_eq!(normalize_public_key(&narrow), public_key_raw_to_pem(RAW));
        assert_eq!(normalize_public_key(RAW), public_key_raw_to_pem(RAW));
    }

    #[test]
    fn url_safe_payload_is_accepted() {
        let url_safe = RAW.replace('+', "-").replace('/', "_").trim_end_matches('=').to_string();
        assert_eq!(decode_base64(&url_safe), decode_base64(RAW));
        assert!(decode_base64(RAW).is_some());
    }

    #[test]
    fn decode_pem_returns_label_and_body() {
        let (label, der) = decode_pem(&public_key_raw_to_pem(RAW)).unwrap();
        assert_eq!(label, "PUBLIC KEY");
        assert_eq!(der.len(), 44);
        assert!(decode_pem(&format!("{PUBLIC_KEY_HEADER}\n{RAW}\n")).is_none());
        assert!(decode_pem(RAW).is_none());
    }

    #[test]
    fn decode_pem_blocks_keeps_order() {
        let text = format!("-----BEGIN EC PARAMETERS-----\nBggqhkjOPQMBBw==\n-----END EC PARAMETERS-----\n{}", public_key_raw_to_pem(RAW));
        let blocks = decode_pem_blocks(&text).unwrap();
        let labels: Vec<_> = blocks.iter().map(|(label, _)| label.as_str()).collect();
        assert_eq!(labels, ["EC PARAMETERS", "PUBLIC KEY"]);
        assert_eq!(blocks[0].1.len(), 10);
        assert_eq!(decode_pem(&text).unwrap().0, "EC PARAMETERS");
        assert!(decode_pem_blocks(&format!("{text}-----BEGIN PUBLIC KEY-----\n{RAW}\n")).is_none());
    }

    #[test]
    fn invalid_base64_is_none() {
        assert!(decode_base64("not*base64!").is_none());
        assert!(decode_base64("a").is_none());
    }
}
