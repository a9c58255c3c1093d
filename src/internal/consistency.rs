use log::trace;

use crate::{Error, TreeState};
use crate::utils::{combine_tree_hash, largest_power_of_2_smaller_than, u8_to_hex};

/// Work out which subtrees a consistency proof from `from_size` to `to_size`
/// should contain, so that we know how to use the server provided proof.
///
/// Returns an array of (u64, u64)s. Each (x: u64, y: u64) denotes that this part
/// of the proof should be the hash of the subtree formed by leafs with number [x, y).
///
/// Will not omit the first component even if it's the same as the previous
/// root hash (the server will). This means that the subtree represented by
/// ret\[0] will always be contained within (0, from_size) (i.e. already known).
///
/// `from_size` must be in `1..=to_size`.
///
/// # Example
///
/// ```
/// # use tlog_monitor::internal::consistency_proof_partial;
/// // Examples from RFC 6962 2.1.3 (https://tools.ietf.org/html/rfc6962#section-2.1.3)
/// assert_eq!(consistency_proof_partial(3, 7), vec![(2, 3), (3, 4), (0, 2), (4, 7)]);
/// assert_eq!(consistency_proof_partial(4, 7), vec![(0, 4), (4, 7)]);
/// assert_eq!(consistency_proof_partial(6, 7), vec![(4, 6), (6, 7), (0, 4)]);
/// ```
pub fn consistency_proof_partial(from_size: u64, to_size: u64) -> Vec<(u64, u64)> {
  // The function 'verify_consistency_proof' contains detailed comments about the nature of consistency proofs.
  debug_assert!(from_size >= 1 && from_size <= to_size);

  let mut result_store = Vec::new();
  let mut subtree = (0, to_size);
  loop {
    if from_size >= subtree.1 {
      result_store.push(subtree);
      break;
    }
    let subtree_size = subtree.1 - subtree.0;
    let start_of_right_branch = largest_power_of_2_smaller_than(subtree_size);
    if from_size - subtree.0 <= start_of_right_branch { // go left
      result_store.push((subtree.0 + start_of_right_branch, subtree.1));
      subtree = (subtree.0, subtree.0 + start_of_right_branch);
    } else { // go right
      result_store.push((subtree.0, subtree.0 + start_of_right_branch));
      subtree = (subtree.0 + start_of_right_branch, subtree.1);
    }
  }
  result_store.reverse();
  result_store
}

#[test]
fn consistency_proof_partial_test() {
  assert_eq!(consistency_proof_partial(753913835, 753913848).len(), 25);
  assert_eq!(consistency_proof_partial(6, 6), vec![(0, 6)]);
  assert_eq!(consistency_proof_partial(7, 7), vec![(0, 7)]);
  assert_eq!(consistency_proof_partial(1, 2), vec![(0, 1), (1, 2)]);

  assert_eq!(consistency_proof_partial(4, 7), vec![(0, 4), (4, 7)]);
}

/// Verify that `server_provided_proof` gets us from `perv_root` to
/// `next_root`, returning an `Err(String)` describing why the proof is invalid
/// otherwise.
///
/// Pure function; [`ConsistencyProof::verify`] is the version that speaks in
/// [`TreeState`]s and [`Error`]s.
pub fn verify_consistency_proof(perv_size: u64, next_size: u64, server_provided_proof: &[[u8; 32]], perv_root: &[u8; 32], next_root: &[u8; 32]) -> Result<(), String> {
  if perv_size > next_size {
    return Err(format!("previous size {} is larger than new size {}", perv_size, next_size));
  }
  if perv_size == next_size {
    if perv_root != next_root {
      return Err(format!("{} and {} both claim to be the tree of size {}", u8_to_hex(perv_root), u8_to_hex(next_root), next_size));
    }
    return Ok(());
  }
  if perv_size == 0 {
    // An empty tree is a subtree of every tree. No need to prove.
    if !server_provided_proof.is_empty() {
      return Err(format!("expected an empty proof from the empty tree, got {} hashes", server_provided_proof.len()));
    }
    return Ok(());
  }

  // A consistency proof is an array of hashes of some subtrees of the current
  // tree. These subtrees will entirely cover the previous tree, and will also
  // include some new parts which is only in the current tree. To validate the
  // proof, we attempt to derive the new root hash based on these provided
  // hashes. If we got the same hash as the server signed tree hash, we know that
  // the previous tree is entirely contained in the new tree. In addition, we
  // also need to check that the hashes which corresponds to subtrees that
  // contains previous nodes are genuine. We do this by attempting to construct
  // the previous root hash based on these hashes, and see if we came up with a
  // hash that is the same as the `perv_root` provided by the caller.

  // A subtree is represented with (u64, u64), where the first number is the
  // starting index, and the second number is the non-inclusive ending index. For
  // example, (2, 4) denote the 2-level subtree made by the nodes with index 2
  // and 3, which looks like this:
  //
  //      23
  //     /  \
  //    2    3
  let calculated_proof = consistency_proof_partial(perv_size, next_size);

  // The server will omit the first hash if it will otherwise simply be the
  // previous root hash. This happens when previous tree is a complete balanced
  // tree, sitting in the bottom-left corner of the current tree. Since these
  // trees always start at 0, we only need to check if the size is a power of 2
  // (hence a balanced tree)
  let omit_first = u64::is_power_of_two(perv_size);

  let mut expected_proof_len = calculated_proof.len();
  if omit_first {
    expected_proof_len -= 1;
  }
  if server_provided_proof.len() != expected_proof_len {
    return Err(format!("wrong proof length: expected {}, got {}", expected_proof_len, server_provided_proof.len()));
  }

  let mut hashes = Vec::with_capacity(calculated_proof.len());
  if omit_first {
    hashes.push(*perv_root);
  }
  hashes.extend_from_slice(server_provided_proof);
  debug_assert_eq!(hashes.len(), calculated_proof.len());

  // Now each element of `hashes` and `calculated_proof` match up
  // (hash[i] is the hash of the subtree calculated_proof[i]). Walk them left to
  // right, folding each into the new root and, if it lies inside the previous
  // tree, into the previous root as well.
  //
  // Each proof entry is either entirely old or entirely new. An old one always
  // sits to the left of what we have so far, a new one to the right.
  let mut derived_new_hash = hashes[0];
  let mut derived_new_hash_subtree = calculated_proof[0];
  let mut derived_old_hash = hashes[0];
  for (subtree, hash) in calculated_proof.iter().zip(hashes.iter()).skip(1) {
    if subtree.0 > derived_new_hash_subtree.0 {
      // Right branch
      debug_assert_eq!(subtree.0, derived_new_hash_subtree.1);
      derived_new_hash = combine_tree_hash(&derived_new_hash, hash);
      derived_new_hash_subtree = (derived_new_hash_subtree.0, subtree.1);
    } else {
      // Left branch
      debug_assert_eq!(subtree.1, derived_new_hash_subtree.0);
      derived_new_hash = combine_tree_hash(hash, &derived_new_hash);
      derived_new_hash_subtree = (subtree.0, derived_new_hash_subtree.1);
      if subtree.1 <= perv_size {
        derived_old_hash = combine_tree_hash(hash, &derived_old_hash);
      }
    }
  }
  debug_assert_eq!(derived_new_hash_subtree, (0, next_size));
  if derived_new_hash != *next_root {
    return Err(format!("calculated tree root {} does not match given tree root {}", u8_to_hex(&derived_new_hash), u8_to_hex(next_root)));
  }

  // When the first hash was omitted we used perv_root itself to get to
  // next_root, so there's nothing more to check.
  if !omit_first && derived_old_hash != *perv_root {
    return Err(format!("calculated perv_root {} does not match given perv_root {}", u8_to_hex(&derived_old_hash), u8_to_hex(perv_root)));
  }

  trace!("consistency checked from {} to {}", &u8_to_hex(perv_root), &u8_to_hex(next_root));
  Ok(())
}

/// A consistency proof between two tree sizes, as given by the log.
///
/// `node_hashes` are in the order the log sent them; the proof is a left to
/// right reduction over them so the order matters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsistencyProof {
  pub old_size: u64,
  pub new_size: u64,
  pub node_hashes: Vec<[u8; 32]>,
}

impl ConsistencyProof {
  /// Check that `new` is an append-only extension of `old`.
  ///
  /// * `new` smaller than `old` is a [`RollbackDetected`](Error::RollbackDetected).
  /// * Equal sizes don't look at the proof at all; the root hashes just have
  ///   to be the same.
  /// * Otherwise the proof has to reconstruct both roots, or we get a
  ///   [`ConsistencyViolation`](Error::ConsistencyViolation).
  pub fn verify(&self, old: &TreeState, new: &TreeState) -> Result<(), Error> {
    if new.size() < old.size() {
      return Err(Error::RollbackDetected { trusted_size: old.size(), fetched_size: new.size() });
    }
    if new.size() == old.size() {
      if new.root_hash() != old.root_hash() {
        return Err(Error::ConsistencyViolation {
          prev_size: old.size(),
          new_size: new.size(),
          desc: format!("Log forked! {} and {} both correspond to tree size {}", u8_to_hex(old.root_hash()), u8_to_hex(new.root_hash()), new.size()),
        });
      }
      return Ok(());
    }
    if self.old_size != old.size() || self.new_size != new.size() {
      return Err(Error::InvalidArgument(format!("proof is for sizes {} to {}, but asked to check {} to {}", self.old_size, self.new_size, old.size(), new.size())));
    }
    verify_consistency_proof(old.size(), new.size(), &self.node_hashes, old.root_hash(), new.root_hash())
        .map_err(|desc| Error::ConsistencyViolation { prev_size: old.size(), new_size: new.size(), desc })
  }
}
