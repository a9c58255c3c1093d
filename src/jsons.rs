//! Structs for parsing server response.
//!
//! Byte fields are left as base64 strings here; decoding (and complaining
//! about bad input) happens in [`client`](crate::HttpLogClient).

use serde::{Serialize, Deserialize};

/// Response of `POST api/v1/latest`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LatestResponse {
  #[serde(rename = "Status", default)]
  pub status: Option<Status>,
  #[serde(rename = "Proof")]
  pub proof: LatestSignedLogRoot,
  /// DER encoded public key of the log, base64.
  #[serde(rename = "Key")]
  pub key: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Status {
  #[serde(rename = "file_received", default)]
  pub code: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LatestSignedLogRoot {
  pub signed_log_root: SignedLogRoot,
  /// Only present when `lastSize` was sent.
  #[serde(default)]
  pub proof: Option<Proof>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SignedLogRoot {
  #[serde(default)]
  pub key_hint: Option<String>,
  pub log_root: String,
  pub log_root_signature: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Proof {
  #[serde(default)]
  pub leaf_index: i64,
  #[serde(default)]
  pub hashes: Vec<String>,
}

#[test]
fn latest_response_parse_test() {
  let json = r#"{
    "Status": {"file_received": "OK"},
    "Proof": {
      "signed_log_root": {"key_hint": "AQI=", "log_root": "AAE=", "log_root_signature": "MEU="},
      "proof": {"leaf_index": 4, "hashes": ["AA==", "AQ=="]}
    },
    "Key": "MFkw"
  }"#;
  let parsed: LatestResponse = serde_json::from_str(json).unwrap();
  assert_eq!(parsed.status.unwrap().code, "OK");
  assert_eq!(parsed.proof.signed_log_root.log_root, "AAE=");
  assert_eq!(parsed.proof.proof.unwrap().hashes.len(), 2);
  assert_eq!(parsed.key, "MFkw");

  // First runs don't get a proof back, and servers may leave out status.
  let json = r#"{"Proof": {"signed_log_root": {"log_root": "AAE=", "log_root_signature": "MEU="}, "proof": null}, "Key": "MFkw"}"#;
  let parsed: LatestResponse = serde_json::from_str(json).unwrap();
  assert!(parsed.status.is_none());
  assert!(parsed.proof.proof.is_none());
  assert!(parsed.proof.signed_log_root.key_hint.is_none());
}
