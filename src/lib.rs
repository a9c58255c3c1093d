//! Light client that keeps a transparency log honest.
//!
//! Each run fetches the log's latest signed tree head, checks the signature
//! against the log's key, and, if we have seen the log before, checks a
//! consistency proof showing that the new tree is an append-only extension of
//! the one we saw last time. The verified `(size, root_hash)` pair is then
//! written to a small state file so that the next run only has to prove the
//! part of history that is new.
//!
//! The first run has nothing to compare against, so it trusts whatever head it
//! gets (trust-on-first-use). Every run after that either proves extension,
//! observes an unchanged tree, or fails loudly with a
//! [`ConsistencyViolation`](crate::Error::ConsistencyViolation) or
//! [`RollbackDetected`](crate::Error::RollbackDetected).
//!
//! Tree hashing follows [RFC 6962](https://tools.ietf.org/html/rfc6962).
//! Read it first if consistency proofs are new to you.
//!
//! The usual entry point is [`Updater`](crate::Updater):
//!
//! ```no_run
//! use tlog_monitor::{MonitorConfig, Updater};
//!
//! let config = MonitorConfig::new("https://log.example.com/").unwrap();
//! let updater = Updater::from_config(&config).unwrap();
//! match updater.update() {
//!   Ok(outcome) => println!("{}", outcome),
//!   Err(e) => eprintln!("{}", e),
//! }
//! ```
use std::{fmt, io, path};

pub mod utils;
pub mod jsons;
pub mod internal;
mod tree_head;
mod client;
mod state;
mod config;
mod update;

#[cfg(test)]
mod testutil;

pub use tree_head::*;
pub use client::*;
pub use state::*;
pub use config::*;
pub use update::*;
pub use internal::ConsistencyProof;

/// Errors that this library could return.
#[derive(Debug)]
pub enum Error {
	/// Some odd stuff happened.
	Unknown(String),

	/// You provided something bad.
	InvalidArgument(String),

	/// The state file exists but can't be read.
	StateIO(path::PathBuf, io::Error),

	/// The state file exists but does not contain a valid record.
	StateDecode(path::PathBuf, String),

	/// Network IO error, including timeouts.
	FetchFailed(reqwest::Error),

	/// The log server responsed with something other than 200.
	InvalidResponseStatus(reqwest::StatusCode),

	/// Server responsed with something bad (e.g. malformed JSON)
	MalformedResponseBody(String),

	/// The public key used to check tree heads can't be used.
	InvalidKey(String),

	/// The log server provided us with invalid signature.
	InvalidSignature(String),

	/// The new tree is not an append-only extension of the one we trusted.
	ConsistencyViolation { prev_size: u64, new_size: u64, desc: String },

	/// The log server reported a tree smaller than one we already trusted.
	RollbackDetected { trusted_size: u64, fetched_size: u64 },

	/// The new tree head was verified but could not be saved.
	PersistFailed { state: TreeState, path: path::PathBuf, source: io::Error },
}

impl Error {
	/// Whether this error means the log itself misbehaved, as opposed to
	/// something going wrong on our side or in transit.
	pub fn is_security_violation(&self) -> bool {
		match self {
			Error::ConsistencyViolation { .. } | Error::RollbackDetected { .. } => true,
			_ => false,
		}
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::Unknown(desc) => write!(f, "{}", desc),
			Error::InvalidArgument(desc) => write!(f, "Invalid argument: {}", desc),
			Error::StateIO(path, e) => write!(f, "{}: {}", path.to_string_lossy(), &e),
			Error::StateDecode(path, desc) => write!(f, "{}: corrupt state record: {}", path.to_string_lossy(), &desc),
			Error::FetchFailed(e) => write!(f, "Network IO error: {}", &e),
			Error::InvalidResponseStatus(response_code) => write!(f, "Server responsed with {} {}", response_code.as_u16(), response_code.as_str()),
			Error::MalformedResponseBody(desc) => write!(f, "Unable to parse server response: {}", &desc),
			Error::InvalidKey(desc) => write!(f, "Invalid log public key: {}", &desc),
			Error::InvalidSignature(desc) => write!(f, "Invalid signature received: {}", &desc),
			Error::ConsistencyViolation { prev_size, new_size, desc } => write!(f, "Log is not consistent between sizes {} and {}: {}", prev_size, new_size, &desc),
			Error::RollbackDetected { trusted_size, fetched_size } => write!(f, "Log rolled back: previously verified size {}, server now reports {}", trusted_size, fetched_size),
			Error::PersistFailed { state, path, source } => write!(f, "Verified tree head {} but could not save it to {}: {}", state, path.to_string_lossy(), &source),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::StateIO(_, e) => Some(e),
			Error::FetchFailed(e) => Some(e),
			Error::PersistFailed { source, .. } => Some(source),
			_ => None,
		}
	}
}

#[test]
fn security_violation_classification() {
	assert!(Error::RollbackDetected { trusted_size: 10, fetched_size: 8 }.is_security_violation());
	assert!(Error::ConsistencyViolation { prev_size: 5, new_size: 7, desc: String::new() }.is_security_violation());
	assert!(!Error::InvalidSignature("bad".to_owned()).is_security_violation());
	assert!(!Error::StateDecode(path::PathBuf::from("/x"), "bad".to_owned()).is_security_violation());
}
