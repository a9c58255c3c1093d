use log::trace;
use openssl::hash::MessageDigest;
use openssl::pkey::{Id, PKey, Public};
use openssl::sign::Verifier;

use crate::Error;
use crate::utils;

/// Which signature scheme a log key implies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureAlgorithm {
  /// SHA-256 digest, ASN.1 DER encoded ECDSA signature.
  Sha256Ecdsa,
  /// SHA-256 digest, RSASSA-PKCS1-v1_5.
  Sha256Rsa,
  /// Pure Ed25519 over the message itself.
  Ed25519,
}

impl SignatureAlgorithm {
  pub fn for_key(pub_key: &PKey<Public>) -> Result<Self, Error> {
    match pub_key.id() {
      Id::EC => Ok(SignatureAlgorithm::Sha256Ecdsa),
      Id::RSA => Ok(SignatureAlgorithm::Sha256Rsa),
      Id::ED25519 => Ok(SignatureAlgorithm::Ed25519),
      other => Err(Error::InvalidKey(format!("Unsupported key type {:?}", other))),
    }
  }
}

/// Verifies a raw signature made by the log over `data`. The scheme is picked
/// from the key type.
///
/// * `pub_key`: use [`parse_public_key`](crate::parse_public_key) to turn the
/// DER or PEM key into an openssl key object.
///
/// * `data`: the stuff to verify against. Server should have signed this.
pub fn verify_signature(pub_key: &PKey<Public>, raw_signature: &[u8], data: &[u8]) -> Result<(), Error> {
  use SignatureAlgorithm::*;
  let signature_algorithm = SignatureAlgorithm::for_key(pub_key)?;

  let valid = match signature_algorithm {
    Sha256Ecdsa | Sha256Rsa => {
      let mut verifier = Verifier::new(MessageDigest::sha256(), pub_key).map_err(|e| Error::Unknown(format!("EVP_DigestVerifyInit: {}", &e)))?;
      if signature_algorithm == Sha256Rsa {
        verifier.set_rsa_padding(openssl::rsa::Padding::PKCS1).map_err(|e| Error::Unknown(format!("EVP_PKEY_CTX_set_rsa_padding: {}", &e)))?;
      }
      verifier.update(data).map_err(|e| Error::Unknown(format!("EVP_DigestUpdate: {}", &e)))?;
      verifier.verify(raw_signature).map_err(|e| Error::InvalidSignature(format!("EVP_DigestVerifyFinal: {}", &e)))?
    }
    Ed25519 => {
      let mut verifier = Verifier::new_without_digest(pub_key).map_err(|e| Error::Unknown(format!("EVP_DigestVerifyInit: {}", &e)))?;
      verifier.verify_oneshot(raw_signature, data).map_err(|e| Error::InvalidSignature(format!("EVP_DigestVerify: {}", &e)))?
    }
  };
  if !valid {
    return Err(Error::InvalidSignature(format!("Signature is invalid: signature = {}, data = {}.", &utils::u8_to_hex(raw_signature), &utils::u8_to_hex(data))));
  }

  debug_assert!({
    trace!("Signature checked for data {}", &utils::u8_to_hex(data));
    true
  });

  Ok(())
}

#[test]
fn verify_signature_fixed_vectors_test() {
  let hex = |s: &str| utils::hex_to_u8(s).unwrap();
  // secp256k1 key, signatures over "hello" and "not hello".
  let key = PKey::public_key_from_der(&hex("3056301006072a8648ce3d020106052b8104000a0342000412c022d1b5cab048f419d46f111743cea4fcd54a05228d14cecd9cc1d120e4cc3e22e8481e5ccc3db16273a8d981ac144306d644a4227468fccd6580563ec8bd")[..]).unwrap();
  verify_signature(&key, &hex("3045022100ba6da0fb4d4440965dd1d096212da95880320113320ddc5202a0b280ac518349022005bb17637d4ed06facb4af5b4b9b9083210474998ac33809a6e10c9352032055"), b"hello").unwrap();
  verify_signature(&key, &hex("30460221009857dc5e2bcc0b67059a5bde9ead6a36614ab315423c0b2e4762ba7aca3f0181022100eab3af33367cb89d556c17c1ce7de1c2b8c2b80d709d0c3cbb45c8acc6809d1d"), b"not hello").unwrap();
  verify_signature(&key, &hex("30460221009857dc5e2bcc0b67059a5bde9ead6a36614ab315423c0b2e4762ba7aca3f0181022100eab3af33367cb89d556c17c1ce7de1c2b8c2b80d709d0c3cbb45c8acc6809d1d"), b"hello").expect_err("");

  // Don't panic.
  for garbage in &["", "00", "3000", "30450221", "000102030405"] {
    match verify_signature(&key, &hex(*garbage), b"hello") {
      Err(Error::InvalidSignature(_)) => {},
      other => panic!("{:?}: expected InvalidSignature, got {:?}", garbage, other),
    }
  }
}

#[test]
fn verify_signature_generated_keys_test() {
  use crate::testutil;
  for key in vec![testutil::ec_key(), testutil::ed25519_key(), testutil::rsa_key()] {
    let sig = testutil::sign(&key, b"log root bytes");
    let public = testutil::public(&key);
    verify_signature(&public, &sig, b"log root bytes").unwrap();
    verify_signature(&public, &sig, b"log root bytez").expect_err("wrong data");
  }
}

#[test]
fn unsupported_key_type_test() {
  // X25519 is a key agreement key, it can't sign.
  let x25519 = PKey::generate_x25519().unwrap();
  let public = PKey::public_key_from_der(&x25519.public_key_to_der().unwrap()).unwrap();
  match verify_signature(&public, b"sig", b"data") {
    Err(Error::InvalidKey(_)) => {},
    other => panic!("expected InvalidKey, got {:?}", other),
  }
}
