use std::convert::TryInto;
use std::fmt;

use log::trace;
use openssl::pkey::{PKey, Public};

use crate::{Error, internal, utils};

/// One committed snapshot of the log: how many leaves it had and the root
/// hash over them.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeState {
  size: u64,
  root_hash: [u8; 32],
}

impl TreeState {
  pub fn new(size: u64, root_hash: [u8; 32]) -> Self {
    TreeState { size, root_hash }
  }

  /// Number of leaves in the tree.
  pub fn size(&self) -> u64 {
    self.size
  }

  pub fn root_hash(&self) -> &[u8; 32] {
    &self.root_hash
  }
}

impl fmt::Debug for TreeState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "TreeState {{ size: {}, root_hash: {} }}", self.size, utils::u8_to_hex(&self.root_hash))
  }
}

impl fmt::Display for TreeState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} (size = {})", utils::u8_to_hex(&self.root_hash), self.size)
  }
}

/// A *signed tree head*, after its signature has been checked. The only way
/// to get one is [`SignedLogRoot::verify`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTreeHead {
  pub state: TreeState,
  /// When the log produced this root, in nanoseconds since the unix epoch.
  pub timestamp_nanos: Option<u64>,
  pub revision: u64,
  pub signature: Vec<u8>,
}

/// A signed log root as returned by the server, not yet verified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedLogRoot {
  /// TLS encoded `LogRoot` structure. The signature is over these bytes.
  pub log_root: Vec<u8>,
  pub signature: Vec<u8>,
  pub key_hint: Vec<u8>,
}

impl SignedLogRoot {
  /// Check the signature with the log's public key, and only then parse the
  /// signed bytes into a [`SignedTreeHead`].
  pub fn verify(&self, pub_key: &PKey<Public>) -> Result<SignedTreeHead, Error> {
    internal::verify_signature(pub_key, &self.signature, &self.log_root).map_err(|e| {
      match e {
        Error::InvalidSignature(desc) => Error::InvalidSignature(format!("When checking log root signature: {}", &desc)),
        other => other
      }
    })?;
    let root = LogRootV1::from_bytes(&self.log_root).map_err(|e| Error::MalformedResponseBody(format!("Signed log root does not parse: {}", &e)))?;
    if root.root_hash.len() != utils::HASH_LEN {
      return Err(Error::MalformedResponseBody(format!("Root hash has length {}, expected {}.", root.root_hash.len(), utils::HASH_LEN)));
    }
    let root_hash: [u8; 32] = root.root_hash[..].try_into().map_err(|_| Error::Unknown("root hash length".to_owned()))?;
    trace!("verified log root: size {}, hash {}, revision {}", root.tree_size, utils::u8_to_hex(&root_hash), root.revision);
    Ok(SignedTreeHead {
      state: TreeState::new(root.tree_size, root_hash),
      timestamp_nanos: if root.timestamp_nanos == 0 { None } else { Some(root.timestamp_nanos) },
      revision: root.revision,
      signature: self.signature.clone(),
    })
  }
}

/// Version 1 of the log root structure that the server signs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRootV1 {
  pub tree_size: u64,
  pub root_hash: Vec<u8>,
  pub timestamp_nanos: u64,
  pub revision: u64,
  pub metadata: Vec<u8>,
}

impl LogRootV1 {
  pub const VERSION: u16 = 1;

  /// Parse a TLS encoded `LogRoot`, which must be version 1 and have no
  /// trailing bytes.
  pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
    /*
      struct {
        LogRootFormat version;   // u16
        select (version) {
          case 1: LogRootV1;
        }
      } LogRoot;

      struct {
        uint64 tree_size;
        opaque root_hash<0..128>;
        uint64 timestamp_nanos;
        uint64 revision;
        opaque metadata<0..65535>;
      } LogRootV1;
    */
    let mut slice = bytes;
    let version = take(&mut slice, 2, "version")?;
    let version = u16::from_be_bytes([version[0], version[1]]);
    if version != Self::VERSION {
      return Err(format!("unsupported log root version {}", version));
    }
    let tree_size = take_u64(&mut slice, "tree_size")?;
    let hash_len = take(&mut slice, 1, "root_hash length")?[0] as usize;
    if hash_len > 128 {
      return Err(format!("root_hash length {} exceeds 128", hash_len));
    }
    let root_hash = take(&mut slice, hash_len, "root_hash")?.to_vec();
    let timestamp_nanos = take_u64(&mut slice, "timestamp_nanos")?;
    let revision = take_u64(&mut slice, "revision")?;
    let metadata_len = take(&mut slice, 2, "metadata length")?;
    let metadata_len = u16::from_be_bytes([metadata_len[0], metadata_len[1]]) as usize;
    let metadata = take(&mut slice, metadata_len, "metadata")?.to_vec();
    if !slice.is_empty() {
      return Err(format!("{} bytes of trailing data", slice.len()));
    }
    Ok(LogRootV1 { tree_size, root_hash, timestamp_nanos, revision, metadata })
  }

  /// Inverse of [`from_bytes`](Self::from_bytes).
  pub fn to_bytes(&self) -> Vec<u8> {
    let mut buf = Vec::with_capacity(2 + 8 + 1 + self.root_hash.len() + 8 + 8 + 2 + self.metadata.len());
    buf.extend_from_slice(&Self::VERSION.to_be_bytes());
    buf.extend_from_slice(&self.tree_size.to_be_bytes());
    buf.push(self.root_hash.len() as u8);
    buf.extend_from_slice(&self.root_hash);
    buf.extend_from_slice(&self.timestamp_nanos.to_be_bytes());
    buf.extend_from_slice(&self.revision.to_be_bytes());
    buf.extend_from_slice(&(self.metadata.len() as u16).to_be_bytes());
    buf.extend_from_slice(&self.metadata);
    buf
  }
}

fn take<'a>(slice: &mut &'a [u8], len: usize, what: &str) -> Result<&'a [u8], String> {
  if slice.len() < len {
    return Err(format!("truncated at {}: need {} bytes, have {}", what, len, slice.len()));
  }
  let (head, rest) = slice.split_at(len);
  *slice = rest;
  Ok(head)
}

fn take_u64(slice: &mut &[u8], what: &str) -> Result<u64, String> {
  let bytes = take(slice, 8, what)?;
  let mut arr = [0u8; 8];
  arr.copy_from_slice(bytes);
  Ok(u64::from_be_bytes(arr))
}

/// Parse a log public key. Accepts PEM (`-----BEGIN PUBLIC KEY-----`) or DER
/// `SubjectPublicKeyInfo`.
pub fn parse_public_key(bytes: &[u8]) -> Result<PKey<Public>, Error> {
  let parsed = if bytes.starts_with(b"-----BEGIN") {
    PKey::public_key_from_pem(bytes)
  } else {
    PKey::public_key_from_der(bytes)
  };
  parsed.map_err(|e| Error::InvalidKey(format!("Error parsing public key: {}", &e)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testutil;

  fn sample_root() -> LogRootV1 {
    LogRootV1 {
      tree_size: 7,
      root_hash: utils::sha256(b"root").to_vec(),
      timestamp_nanos: 1_600_000_000_000_000_000,
      revision: 3,
      metadata: Vec::new(),
    }
  }

  #[test]
  fn log_root_parse() {
    let root = sample_root();
    let bytes = root.to_bytes();
    assert_eq!(bytes.len(), 2 + 8 + 1 + 32 + 8 + 8 + 2);
    assert_eq!(&bytes[0..2], &[0, 1]);
    assert_eq!(LogRootV1::from_bytes(&bytes).unwrap(), root);
  }

  #[test]
  fn log_root_rejects_bad_input() {
    let bytes = sample_root().to_bytes();
    // Don't panic.
    for len in 0..bytes.len() {
      LogRootV1::from_bytes(&bytes[..len]).expect_err("truncated");
    }
    let mut trailing = bytes.clone();
    trailing.push(0);
    assert!(LogRootV1::from_bytes(&trailing).unwrap_err().contains("trailing"));
    let mut wrong_version = bytes.clone();
    wrong_version[1] = 2;
    assert!(LogRootV1::from_bytes(&wrong_version).unwrap_err().contains("version"));
  }

  #[test]
  fn verify_ec_signed_root() {
    let key = testutil::ec_key();
    let signed = testutil::sign_root(&key, 7, &utils::sha256(b"root"));
    let sth = signed.verify(&testutil::public(&key)).unwrap();
    assert_eq!(sth.state, TreeState::new(7, utils::sha256(b"root")));
    assert_eq!(sth.timestamp_nanos, Some(testutil::TIMESTAMP));
  }

  #[test]
  fn verify_ed25519_signed_root() {
    let key = testutil::ed25519_key();
    let signed = testutil::sign_root(&key, 0, &utils::sha256(b""));
    let sth = signed.verify(&testutil::public(&key)).unwrap();
    assert_eq!(sth.state.size(), 0);
  }

  #[test]
  fn verify_rejects_tampered_root() {
    let key = testutil::ec_key();
    let mut signed = testutil::sign_root(&key, 7, &utils::sha256(b"root"));
    // Bump tree_size from 7 to 8 after signing.
    signed.log_root[9] ^= 0x0f;
    match signed.verify(&testutil::public(&key)) {
      Err(Error::InvalidSignature(_)) => {},
      other => panic!("expected InvalidSignature, got {:?}", other),
    }
  }

  #[test]
  fn verify_rejects_other_key() {
    let signed = testutil::sign_root(&testutil::ec_key(), 7, &utils::sha256(b"root"));
    match signed.verify(&testutil::public(&testutil::ec_key())) {
      Err(Error::InvalidSignature(_)) => {},
      other => panic!("expected InvalidSignature, got {:?}", other),
    }
  }

  #[test]
  fn verify_rejects_short_hash_even_if_signed() {
    let key = testutil::ec_key();
    let root = LogRootV1 { root_hash: vec![1, 2, 3], ..sample_root() };
    let signed = testutil::sign_log_root_bytes(&key, root.to_bytes());
    match signed.verify(&testutil::public(&key)) {
      Err(Error::MalformedResponseBody(_)) => {},
      other => panic!("expected MalformedResponseBody, got {:?}", other),
    }
  }

  #[test]
  fn public_key_formats() {
    let key = testutil::ec_key();
    parse_public_key(&key.public_key_to_der().unwrap()).unwrap();
    parse_public_key(&key.public_key_to_pem().unwrap()).unwrap();
    match parse_public_key(b"definitely not a key") {
      Err(Error::InvalidKey(_)) => {},
      other => panic!("expected InvalidKey, got {:?}", other.map(|_| ())),
    }
  }
}
