// src/hash.rs

//! C1: Hash Oracle (compute half).
//!
//! Computes digests of file content under any of the algorithms a promise
//! may ask for. `BEST` is not a real digest algorithm: it asks the oracle to
//! compute two strong digests at once (MD5 and SHA-1, matching the legacy
//! "best" contract this crate's promise format still exposes) and report a
//! change if *either* differs — cheaper than SHA-256 alone was historically,
//! and kept here because promise-writers already depend on the name.
//!
//! MD5 and SHA-1 are included purely for wire compatibility with existing
//! promises and the `BEST` composite; neither is recommended for new promise
//! authoring, which should prefer `Sha256`.

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest as _, Sha256};
use md5::Md5;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::str::FromStr;

/// Hash algorithm selection, matching the `compare` field of a promise's
/// `copy_from` attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha1,
    Md5,
    /// Compute both MD5 and SHA-1; a divergence on either one counts.
    Best,
}

impl HashAlgorithm {
    /// Output length in bytes. `Best` has no single output; callers that
    /// need a length should match on the component algorithms instead.
    pub const fn output_len(&self) -> Option<usize> {
        match self {
            Self::Sha256 => Some(32),
            Self::Sha1 => Some(20),
            Self::Md5 => Some(16),
            Self::Best => None,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha1 => "sha1",
            Self::Md5 => "md5",
            Self::Best => "best",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha1" | "sha-1" => Ok(Self::Sha1),
            "md5" => Ok(Self::Md5),
            "best" => Ok(Self::Best),
            _ => Err(HashError::UnknownAlgorithm(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    UnknownAlgorithm(String),
    InvalidLength { expected: usize, got: usize },
    InvalidHex(String),
    Io(String),
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAlgorithm(name) => write!(f, "unknown hash algorithm: {name}"),
            Self::InvalidLength { expected, got } => {
                write!(f, "invalid hash length: expected {expected}, got {got}")
            }
            Self::InvalidHex(s) => write!(f, "invalid hex in hash: {s}"),
            Self::Io(s) => write!(f, "hash I/O error: {s}"),
        }
    }
}

impl std::error::Error for HashError {}

impl From<io::Error> for HashError {
    fn from(e: io::Error) -> Self {
        HashError::Io(e.to_string())
    }
}

/// A single digest. `Best` is stored as `md5_hex:sha1_hex`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    pub algorithm: HashAlgorithm,
    pub value: String,
}

impl Digest {
    fn new(algorithm: HashAlgorithm, value: String) -> Self {
        Self { algorithm, value }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// `alg:hex` used as the human-readable form and the HASHDB value
    /// column; not the HASHDB key (see [`crate::hashdb`]).
    pub fn to_prefixed_string(&self) -> String {
        format!("{}:{}", self.algorithm.name(), self.value)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

fn hex_update<D: sha2::digest::Update + sha2::digest::FixedOutput + Default>(data: &[u8]) -> String {
    let mut hasher = D::default();
    sha2::digest::Update::update(&mut hasher, data);
    let out = hasher.finalize_fixed();
    hex_encode(&out)
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Compute a digest of an in-memory byte slice.
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> Digest {
    let value = match algorithm {
        HashAlgorithm::Sha256 => {
            let mut h = Sha256::new();
            h.update(data);
            hex_encode(&h.finalize())
        }
        HashAlgorithm::Sha1 => hex_update::<Sha1>(data),
        HashAlgorithm::Md5 => hex_update::<Md5>(data),
        HashAlgorithm::Best => {
            let md5 = hex_update::<Md5>(data);
            let sha1 = hex_update::<Sha1>(data);
            format!("{md5}:{sha1}")
        }
    };
    Digest::new(algorithm, value)
}

/// Compute a digest of a reader, streaming in fixed-size chunks so large
/// files never need to be buffered whole.
pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, reader: &mut R) -> io::Result<Digest> {
    const CHUNK: usize = 64 * 1024;
    let mut buf = [0u8; CHUNK];

    macro_rules! stream {
        ($hasher:expr) => {{
            loop {
                let n = reader.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                sha2::digest::Update::update(&mut $hasher, &buf[..n]);
            }
        }};
    }

    let value = match algorithm {
        HashAlgorithm::Sha256 => {
            let mut h = Sha256::new();
            stream!(h);
            hex_encode(&h.finalize())
        }
        HashAlgorithm::Sha1 => {
            let mut h = Sha1::new();
            stream!(h);
            hex_encode(&h.finalize())
        }
        HashAlgorithm::Md5 => {
            let mut h = Md5::new();
            stream!(h);
            hex_encode(&h.finalize())
        }
        HashAlgorithm::Best => {
            let mut md5 = Md5::new();
            let mut sha1 = Sha1::new();
            loop {
                let n = reader.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                sha2::digest::Update::update(&mut md5, &buf[..n]);
                sha2::digest::Update::update(&mut sha1, &buf[..n]);
            }
            format!("{}:{}", hex_encode(&md5.finalize()), hex_encode(&sha1.finalize()))
        }
    };

    Ok(Digest::new(algorithm, value))
}

/// Compute the digest of a file on disk.
pub fn hash_file(algorithm: HashAlgorithm, path: &Path) -> Result<Digest, HashError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    Ok(hash_reader(algorithm, &mut reader)?)
}

/// Compute the digest of an in-memory string, used for symlink targets and
/// other short promised values.
pub fn hash_string(algorithm: HashAlgorithm, s: &str) -> Digest {
    hash_bytes(algorithm, s.as_bytes())
}

/// Compute one digest over a list of item *names* (e.g. directory entry
/// names), matching the legacy contract exactly: the names are concatenated
/// with no separator before hashing. This admits collisions (`["ab", "c"]`
/// and `["a", "bc"]` hash identically) but promise-writers already depend on
/// the existing digests this produces, so the behavior is retained as-is
/// rather than silently inserting a separator.
pub fn hash_list<S: AsRef<str>>(algorithm: HashAlgorithm, items: &[S]) -> Digest {
    let mut joined = String::new();
    for item in items {
        joined.push_str(item.as_ref());
    }
    hash_string(algorithm, &joined)
}
