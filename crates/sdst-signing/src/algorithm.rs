//! Supported signature algorithms and digest methods.
//!
//! Names are matched case- and whitespace-insensitively against fixed tables
//! and always come back in their canonical spelling (`brainpoolP256r1`,
//! `rsa2048`, `sha512-256`, ...).

use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

/// Digest used when a signer does not pick one explicitly.
pub const DEFAULT_DIGEST: DigestMethod = DigestMethod("sha256");

/// RSA modulus sizes, in bits, that keys may be generated with.
pub const RSA_MODULUS_SIZES: [u32; 9] = [1024, 1536, 2048, 3072, 4096, 7680, 8192, 15360, 16384];

const EDDSA_CURVES: &[&str] = &["ed25519", "ed448"];

const NAMED_CURVES: &[&str] = &[
    "secp112r1",
    "secp112r2",
    "secp128r1",
    "secp128r2",
    "secp160k1",
    "secp160r1",
    "secp160r2",
    "secp192k1",
    "secp224k1",
    "secp224r1",
    "secp256k1",
    "secp384r1",
    "secp521r1",
    "prime192v1",
    "prime192v2",
    "prime192v3",
    "prime239v1",
    "prime239v2",
    "prime239v3",
    "prime256v1",
    "sect113r1",
    "sect113r2",
    "sect131r1",
    "sect131r2",
    "sect163k1",
    "sect163r1",
    "sect163r2",
    "sect193r1",
    "sect193r2",
    "sect233k1",
    "sect233r1",
    "sect239k1",
    "sect283k1",
    "sect283r1",
    "sect409k1",
    "sect409r1",
    "sect571k1",
    "sect571r1",
    "c2pnb163v1",
    "c2pnb163v2",
    "c2pnb163v3",
    "c2pnb176v1",
    "c2tnb191v1",
    "c2tnb191v2",
    "c2tnb191v3",
    "c2pnb208w1",
    "c2tnb239v1",
    "c2tnb239v2",
    "c2tnb239v3",
    "c2pnb272w1",
    "c2pnb304w1",
    "c2tnb359v1",
    "c2pnb368w1",
    "c2tnb431r1",
    "wap-wsg-idm-ecid-wtls1",
    "wap-wsg-idm-ecid-wtls3",
    "wap-wsg-idm-ecid-wtls4",
    "wap-wsg-idm-ecid-wtls5",
    "wap-wsg-idm-ecid-wtls6",
    "wap-wsg-idm-ecid-wtls7",
    "wap-wsg-idm-ecid-wtls8",
    "wap-wsg-idm-ecid-wtls9",
    "wap-wsg-idm-ecid-wtls10",
    "wap-wsg-idm-ecid-wtls11",
    "wap-wsg-idm-ecid-wtls12",
    "brainpoolP160r1",
    "brainpoolP160t1",
    "brainpoolP192r1",
    "brainpoolP192t1",
    "brainpoolP224r1",
    "brainpoolP224t1",
    "brainpoolP256r1",
    "brainpoolP256t1",
    "brainpoolP320r1",
    "brainpoolP320t1",
    "brainpoolP384r1",
    "brainpoolP384t1",
    "brainpoolP512r1",
    "brainpoolP512t1",
];

const DIGEST_METHODS: &[&str] = &[
    "blake2b512",
    "blake2s256",
    "md4",
    "md5",
    "md5-sha1",
    "mdc2",
    "ripemd",
    "ripemd160",
    "rmd160",
    "sha1",
    "sha224",
    "sha256",
    "sha3-224",
    "sha3-256",
    "sha3-384",
    "sha3-512",
    "sha384",
    "sha512",
    "sha512-224",
    "sha512-256",
    "shake128",
    "shake256",
    "sm3",
    "ssl3-md5",
    "ssl3-sha1",
    "whirlpool",
];

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// Algorithm
// ---------------------------------------------------------------------------

/// Coarse classification that drives digest and entropy handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmFamily {
    Rsa,
    Ec,
    EdDsa,
}

impl AlgorithmFamily {
    /// Whether the signer may choose the digest. EdDSA hashes internally.
    pub fn allows_digest_choice(self) -> bool {
        !matches!(self, AlgorithmFamily::EdDsa)
    }

    /// Whether signing consumes fresh randomness (ECDSA nonces).
    pub fn requires_entropy(self) -> bool {
        matches!(self, AlgorithmFamily::Ec)
    }
}

/// A supported signature algorithm in canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// RSA with the given modulus size.
    Rsa { bits: u32 },
    /// ECDSA over a named curve.
    Ec { curve: &'static str },
    /// EdDSA over `ed25519` or `ed448`.
    EdDsa { curve: &'static str },
}

impl Algorithm {
    pub fn family(&self) -> AlgorithmFamily {
        match self {
            Algorithm::Rsa { .. } => AlgorithmFamily::Rsa,
            Algorithm::Ec { .. } => AlgorithmFamily::Ec,
            Algorithm::EdDsa { .. } => AlgorithmFamily::EdDsa,
        }
    }

    /// Canonical name, e.g. `rsa2048`, `prime256v1`, `ed25519`.
    pub fn name(&self) -> String {
        match self {
            Algorithm::Rsa { bits } => format!("rsa{bits}"),
            Algorithm::Ec { curve } | Algorithm::EdDsa { curve } => (*curve).to_string(),
        }
    }

    /// Every supported algorithm, in catalog order (EdDSA, RSA, named curves).
    pub fn all() -> impl Iterator<Item = Algorithm> {
        EDDSA_CURVES
            .iter()
            .map(|&curve| Algorithm::EdDsa { curve })
            .chain(RSA_MODULUS_SIZES.iter().map(|&bits| Algorithm::Rsa { bits }))
            .chain(NAMED_CURVES.iter().map(|&curve| Algorithm::Ec { curve }))
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Rsa { bits } => write!(f, "rsa{bits}"),
            Algorithm::Ec { curve } | Algorithm::EdDsa { curve } => f.write_str(curve),
        }
    }
}

impl Serialize for Algorithm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Algorithm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        canonical_algorithm(&name).ok_or_else(|| serde::de::Error::custom(format!("unknown algorithm '{name}'")))
    }
}

/// Look up an algorithm by name. Returns `None` if unsupported.
pub fn canonical_algorithm(name: &str) -> Option<Algorithm> {
    let wanted = normalize(name);
    if let Some(&curve) = EDDSA_CURVES.iter().find(|c| normalize(c) == wanted) {
        return Some(Algorithm::EdDsa { curve });
    }
    if let Some(bits) = wanted.strip_prefix("rsa").and_then(|b| b.parse::<u32>().ok()) {
        // "rsa02048" would parse; require the exact canonical digits.
        if RSA_MODULUS_SIZES.contains(&bits) && wanted == format!("rsa{bits}") {
            return Some(Algorithm::Rsa { bits });
        }
        return None;
    }
    NAMED_CURVES.iter().find(|c| normalize(c) == wanted).map(|&curve| Algorithm::Ec { curve })
}

/// Classify an algorithm name by prefix. `None` if the name is unsupported.
pub fn algorithm_family(name: &str) -> Option<AlgorithmFamily> {
    canonical_algorithm(name).map(|alg| alg.family())
}

// ---------------------------------------------------------------------------
// Digest methods
// ---------------------------------------------------------------------------

/// A supported digest method in canonical spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DigestMethod(&'static str);

impl DigestMethod {
    pub fn name(&self) -> &'static str {
        self.0
    }

    pub fn is_default(&self) -> bool {
        *self == DEFAULT_DIGEST
    }

    pub fn all() -> impl Iterator<Item = DigestMethod> {
        DIGEST_METHODS.iter().map(|&d| DigestMethod(d))
    }
}

impl fmt::Display for DigestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Serialize for DigestMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

/// Look up a digest method by name. Returns `None` if unsupported.
pub fn canonical_digest(name: &str) -> Option<DigestMethod> {
    let wanted = normalize(name);
    DIGEST_METHODS.iter().find(|d| normalize(d) == wanted).map(|&d| DigestMethod(d))
}

// ---------------------------------------------------------------------------
// Negotiation
// ---------------------------------------------------------------------------

fn negotiate<T, S>(requested: &[S], lookup: impl Fn(&str) -> Option<T>, name: impl Fn(&T) -> String) -> Vec<T>
where
    S: AsRef<str>,
{
    let mut accepted: Vec<T> = requested.iter().filter_map(|r| lookup(r.as_ref())).collect();
    accepted.sort_by_key(|a| name(a));
    accepted.dedup_by(|a, b| name(a) == name(b));
    accepted
}

/// Intersect requested algorithm names with the catalog, canonicalized and
/// sorted by canonical name.
pub fn negotiate_algorithms<S: AsRef<str>>(requested: &[S]) -> Vec<Algorithm> {
    negotiate(requested, canonical_algorithm, Algorithm::name)
}

/// Intersect requested digest names with the catalog, canonicalized and
/// sorted by canonical name.
pub fn negotiate_digests<S: AsRef<str>>(requested: &[S]) -> Vec<DigestMethod> {
    negotiate(requested, canonical_digest, |d| d.name().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_algorithm_ignores_case_and_whitespace() {
        assert_eq!(canonical_algorithm(" RSA2048 "), canonical_algorithm("rsa2048"));
        assert_eq!(canonical_algorithm("rsa2048"), Some(Algorithm::Rsa { bits: 2048 }));
        assert_eq!(canonical_algorithm("BRAINPOOLP256R1").unwrap().name(), "brainpoolP256r1");
        assert_eq!(canonical_algorithm("\tEd25519\n"), Some(Algorithm::EdDsa { curve: "ed25519" }));
    }

    #[test]
    fn every_catalog_name_roundtrips() {
        for alg in Algorithm::all() {
            let name = alg.name();
            assert_eq!(canonical_algorithm(&name), Some(alg), "{name}");
            assert_eq!(canonical_algorithm(&format!("  {}  ", name.to_uppercase())), Some(alg), "{name}");
        }
        for dm in DigestMethod::all() {
            assert_eq!(canonical_digest(&dm.name().to_uppercase()), Some(dm));
        }
    }

    #[test]
    fn unsupported_names_are_rejected() {
        assert_eq!(canonical_algorithm("rsa1000"), None);
        assert_eq!(canonical_algorithm("rsa02048"), None);
        assert_eq!(canonical_algorithm("dsa"), None);
        assert_eq!(canonical_algorithm(""), None);
        assert_eq!(canonical_digest("sha257"), None);
    }

    #[test]
    fn family_by_prefix() {
        assert_eq!(algorithm_family("rsa4096"), Some(AlgorithmFamily::Rsa));
        assert_eq!(algorithm_family("ed448"), Some(AlgorithmFamily::EdDsa));
        assert_eq!(algorithm_family("secp256k1"), Some(AlgorithmFamily::Ec));
        assert_eq!(algorithm_family("wap-wsg-idm-ecid-wtls1"), Some(AlgorithmFamily::Ec));
        assert_eq!(algorithm_family("nope"), None);
        assert!(!AlgorithmFamily::EdDsa.allows_digest_choice());
        assert!(AlgorithmFamily::Ec.requires_entropy());
        assert!(!AlgorithmFamily::Rsa.requires_entropy());
    }

    #[test]
    fn negotiation_filters_and_sorts() {
        let accepted = negotiate_algorithms(&["secp256k1", "RSA2048", "bogus", "Ed25519", "rsa2048"]);
        let names: Vec<String> = accepted.iter().map(Algorithm::name).collect();
        assert_eq!(names, vec!["ed25519", "rsa2048", "secp256k1"]);

        let digests = negotiate_digests(&["SHA512", "sha256", "crc32"]);
        assert_eq!(digests, vec![DigestMethod("sha256"), DigestMethod("sha512")]);
    }

    #[test]
    fn negotiation_keeps_mixed_case_curves() {
        let accepted = negotiate_algorithms(&["brainpoolP384r1"]);
        assert_eq!(accepted, vec![Algorithm::Ec { curve: "brainpoolP384r1" }]);
    }

    #[test]
    fn algorithm_serializes_as_canonical_name() {
        let json = serde_json::to_string(&Algorithm::Rsa { bits: 3072 }).unwrap();
        assert_eq!(json, "\"rsa3072\"");
        let back: Algorithm = serde_json::from_str("\"PRIME256V1\"").unwrap();
        assert_eq!(back, Algorithm::Ec { curve: "prime256v1" });
        assert!(serde_json::from_str::<Algorithm>("\"rot13\"").is_err());
    }
}
