fn main() {
  let openssl_version = unsafe { openssl_sys::OpenSSL_version_num() };
  // Ed25519 tree head signatures need EVP_DigestVerify, added in 1.1.1.
  if openssl_version < 0x010101000 {
    eprintln!("This crate must be linked with OpenSSL version >= 1.1.1.");
    std::process::exit(1);
  }
}
