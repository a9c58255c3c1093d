//! Some utility functions, mostly RFC 6962 tree hashing.

pub use openssl::sha::sha256;

/// Length of every hash in the tree.
pub const HASH_LEN: usize = 32;

/// Domain separation prefix for leaf hashes.
pub const LEAF_PREFIX: u8 = 0x00;

/// Domain separation prefix for internal node hashes.
pub const NODE_PREFIX: u8 = 0x01;

#[test]
fn sha256_test() {
  assert_eq!(u8_to_hex(&sha256(b"")), "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
  assert_eq!(u8_to_hex(&sha256(b"hello")), "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824");
}

/// Convert a hex string with no whitespace or other sepreator into bytes.
///
/// # Example:
/// ```rust
/// # use tlog_monitor::utils::hex_to_u8;
/// assert_eq!(&hex_to_u8("aabb").unwrap(), b"\xaa\xbb");
/// assert!(hex_to_u8("abc").is_err());
/// ```
pub fn hex_to_u8(hex: &str) -> Result<Vec<u8>, String> {
  if hex.len() % 2 != 0 {
    return Err(format!("partial hex: odd length {}", hex.len()));
  }
  let mut vec = Vec::with_capacity(hex.len() / 2);
  for i in 0..(hex.len() / 2) {
    let pair = hex.get(i*2..(i+1)*2).ok_or_else(|| "non-ascii hex".to_owned())?;
    vec.push(u8::from_str_radix(pair, 16).map_err(|e| format!("{:?}: {}", pair, e))?);
  }
  Ok(vec)
}

/// Convert a `&[u8]` byte array to a lower-case, no-sepreator hex string.
///
/// # Example:
/// ```rust
/// # use tlog_monitor::utils::u8_to_hex;
/// assert_eq!(&u8_to_hex(b"\xaa\xbb"), "aabb");
/// ```
pub fn u8_to_hex(bytes: &[u8]) -> String {
  let mut buf = String::with_capacity(bytes.len() * 2);
  for i in bytes {
    buf.push_str(&format!("{:02x}", i));
  }
  buf
}

#[test]
fn hex_to_u8_test() {
  assert_eq!(hex_to_u8("deadbeef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
  assert_eq!(hex_to_u8("DEADBEEF").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
  hex_to_u8("zz").expect_err("not hex");
}
#[test]
fn u8_to_hex_test() {
  assert_eq!(u8_to_hex(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
  assert_eq!(u8_to_hex(&[0x01, 0x02, 0x03, 0x04]), "01020304");
}

/// Calculate `sha256(0x00 || data)`, the hash of a single leaf.
pub fn leaf_hash(data: &[u8]) -> [u8; 32] {
  let mut buf = Vec::with_capacity(data.len() + 1);
  buf.push(LEAF_PREFIX);
  buf.extend_from_slice(data);
  sha256(&buf[..])
}

/// Calculate `sha256(0x01 || left || right)`
pub fn combine_tree_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
  let mut buf = Vec::with_capacity(32 + 32 + 1);
  buf.push(NODE_PREFIX);
  buf.extend_from_slice(left);
  buf.extend_from_slice(right);
  sha256(&buf[..])
}

#[test]
fn domain_separation_test() {
  // A leaf can never be mistaken for an internal node with the same bytes.
  let a = sha256(b"a");
  let b = sha256(b"b");
  let mut concat = Vec::new();
  concat.extend_from_slice(&a);
  concat.extend_from_slice(&b);
  assert_ne!(leaf_hash(&concat), combine_tree_hash(&a, &b));
  assert_eq!(u8_to_hex(&leaf_hash(b"")), "6e340b9cffb37a989ca544e6bb780a2c78901d3fb33738768511a30617afa01d");
}

/// For a tree of size `n`, return the size of the left branch of the root.
pub fn largest_power_of_2_smaller_than(n: u64) -> u64 {
  if n <= 1 {
    return 0;
  }
  // Highest set bit of n - 1.
  1u64 << (63 - (n - 1).leading_zeros())
}

#[test]
fn test_largest_power_of_2_smaller_than() {
  assert_eq!(largest_power_of_2_smaller_than(0), 0);
  assert_eq!(largest_power_of_2_smaller_than(1), 0);
  assert_eq!(largest_power_of_2_smaller_than(2), 1);
  assert_eq!(largest_power_of_2_smaller_than(3), 2);
  assert_eq!(largest_power_of_2_smaller_than(4), 2);
  assert_eq!(largest_power_of_2_smaller_than(5), 4);
  assert_eq!(largest_power_of_2_smaller_than(6), 4);
  assert_eq!(largest_power_of_2_smaller_than(7), 4);
  assert_eq!(largest_power_of_2_smaller_than(8), 4);
  assert_eq!(largest_power_of_2_smaller_than(9), 8);

  assert_eq!(largest_power_of_2_smaller_than(1u64<<33u64), 1u64<<32u64);
  assert_eq!(largest_power_of_2_smaller_than((1u64<<34u64) - 100u64), 1u64<<33u64);
  assert_eq!(largest_power_of_2_smaller_than(u64::max_value()), 1u64<<63u64);
}
