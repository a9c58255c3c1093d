//! Fixtures shared by tests: throwaway log keys and a reference RFC 6962 tree.

use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, Private, Public};
use openssl::rsa::Rsa;
use openssl::sign::Signer;

use crate::utils::{combine_tree_hash, largest_power_of_2_smaller_than, leaf_hash, sha256};
use crate::{LogRootV1, SignedLogRoot, TreeState};

pub const TIMESTAMP: u64 = 1_614_000_000_000_000_000;

pub fn ec_key() -> PKey<Private> {
  let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
  PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

pub fn ed25519_key() -> PKey<Private> {
  PKey::generate_ed25519().unwrap()
}

pub fn rsa_key() -> PKey<Private> {
  PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

pub fn public(key: &PKey<Private>) -> PKey<Public> {
  PKey::public_key_from_der(&key.public_key_to_der().unwrap()).unwrap()
}

pub fn sign(key: &PKey<Private>, data: &[u8]) -> Vec<u8> {
  if key.id() == Id::ED25519 {
    let mut signer = Signer::new_without_digest(key).unwrap();
    signer.sign_oneshot_to_vec(data).unwrap()
  } else {
    let mut signer = Signer::new(MessageDigest::sha256(), key).unwrap();
    signer.update(data).unwrap();
    signer.sign_to_vec().unwrap()
  }
}

pub fn sign_log_root_bytes(key: &PKey<Private>, log_root: Vec<u8>) -> SignedLogRoot {
  SignedLogRoot {
    signature: sign(key, &log_root),
    log_root,
    key_hint: Vec::new(),
  }
}

pub fn sign_root(key: &PKey<Private>, size: u64, root_hash: &[u8; 32]) -> SignedLogRoot {
  sign_log_root_bytes(key, LogRootV1 {
    tree_size: size,
    root_hash: root_hash.to_vec(),
    timestamp_nanos: TIMESTAMP,
    revision: size,
    metadata: Vec::new(),
  }.to_bytes())
}

/// Leaf hashes of a test log with `n` entries.
pub fn leaves(n: u64) -> Vec<[u8; 32]> {
  (0..n).map(|i| leaf_hash(format!("entry #{}", i).as_bytes())).collect()
}

/// `MTH(D[n])` from RFC 6962 section 2.1, over already hashed leaves.
pub fn tree_hash(leaves: &[[u8; 32]]) -> [u8; 32] {
  match leaves.len() {
    0 => sha256(b""),
    1 => leaves[0],
    n => {
      let k = largest_power_of_2_smaller_than(n as u64) as usize;
      combine_tree_hash(&tree_hash(&leaves[..k]), &tree_hash(&leaves[k..]))
    }
  }
}

pub fn state(leaves: &[[u8; 32]]) -> TreeState {
  TreeState::new(leaves.len() as u64, tree_hash(leaves))
}

/// `PROOF(m, D[n])` from RFC 6962 section 2.1.2.
pub fn consistency_proof(m: usize, leaves: &[[u8; 32]]) -> Vec<[u8; 32]> {
  fn subproof(m: usize, leaves: &[[u8; 32]], complete: bool) -> Vec<[u8; 32]> {
    let n = leaves.len();
    if m == n {
      return if complete { Vec::new() } else { vec![tree_hash(leaves)] };
    }
    let k = largest_power_of_2_smaller_than(n as u64) as usize;
    if m <= k {
      let mut proof = subproof(m, &leaves[..k], complete);
      proof.push(tree_hash(&leaves[k..]));
      proof
    } else {
      let mut proof = subproof(m - k, &leaves[k..], false);
      proof.push(tree_hash(&leaves[..k]));
      proof
    }
  }
  if m == 0 {
    return Vec::new();
  }
  subproof(m, leaves, true)
}

#[test]
fn reference_tree_matches_rfc_shapes() {
  let l = leaves(7);
  // RFC 6962 2.1.3: the proof between hash0 and hash is [c, d, g, l].
  let proof = consistency_proof(3, &l);
  assert_eq!(proof, vec![l[2], l[3], combine_tree_hash(&l[0], &l[1]), tree_hash(&l[4..])]);
  assert_eq!(consistency_proof(4, &l), vec![tree_hash(&l[4..])]);
  assert_eq!(consistency_proof(6, &l).len(), 3);
}
