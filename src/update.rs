use std::fmt;

use log::{error, info, trace, warn};
use openssl::pkey::{PKey, Public};

use crate::{Error, FileStateStore, HttpLogClient, LatestHead, LogClient, MonitorConfig, StateStore, TreeState};
use crate::{parse_public_key, utils};

/// What a successful run did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
  /// There was no previous state; the fetched head was trusted as is and saved.
  Bootstrapped(TreeState),
  /// The log hasn't grown since last time.
  Unchanged(TreeState),
  /// The log grew, and the growth was proven append-only.
  Extended { from: TreeState, to: TreeState },
}

impl UpdateOutcome {
  /// The state that is trusted (and stored) after this run.
  pub fn trusted_state(&self) -> &TreeState {
    match self {
      UpdateOutcome::Bootstrapped(s) | UpdateOutcome::Unchanged(s) => s,
      UpdateOutcome::Extended { to, .. } => to,
    }
  }
}

impl fmt::Display for UpdateOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      UpdateOutcome::Bootstrapped(s) => write!(f, "No previous state, trusting {}", s),
      UpdateOutcome::Unchanged(s) => write!(f, "Tree is unchanged at size {}", s.size()),
      UpdateOutcome::Extended { from, to } => write!(f, "Proof correct between sizes {} and {}, now at {}", from.size(), to.size(), to),
    }
  }
}

/// What to do with a verified head, given what we trusted before.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
  /// Nothing trusted yet. Trust on first use.
  Bootstrap,
  /// Same tree as before. Nothing to prove, nothing to save.
  Unchanged,
  /// The tree grew from `from`. Needs a consistency proof.
  Extend { from: TreeState },
}

impl Transition {
  /// Compare a verified head against the previously trusted state.
  ///
  /// Fails with [`RollbackDetected`](Error::RollbackDetected) if the tree
  /// shrank, and with [`ConsistencyViolation`](Error::ConsistencyViolation)
  /// if the size is the same but the root hash is not.
  pub fn plan(prior: Option<&TreeState>, verified: &TreeState) -> Result<Self, Error> {
    let prior = match prior {
      None => return Ok(Transition::Bootstrap),
      Some(p) => p,
    };
    if verified.size() < prior.size() {
      return Err(Error::RollbackDetected { trusted_size: prior.size(), fetched_size: verified.size() });
    }
    if verified.size() == prior.size() {
      if verified.root_hash() != prior.root_hash() {
        return Err(Error::ConsistencyViolation {
          prev_size: prior.size(),
          new_size: verified.size(),
          desc: format!("Log forked! {} and {} both correspond to tree size {}", utils::u8_to_hex(prior.root_hash()), utils::u8_to_hex(verified.root_hash()), verified.size()),
        });
      }
      return Ok(Transition::Unchanged);
    }
    Ok(Transition::Extend { from: *prior })
  }
}

/// Single status summarizing a run, for reporting and exit codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
  /// Unchanged tree.
  Unchanged,
  /// Bootstrapped, or extended and verified.
  Extended,
  /// The log misbehaved: rollback, fork or failed consistency proof.
  ViolationDetected,
  /// Couldn't complete the check (network, bad response, bad signature, bad
  /// local state). Nothing was saved.
  Aborted,
  /// Everything verified but the new state couldn't be saved. The next run
  /// will redo the check from the older state.
  NotPersisted,
}

impl RunStatus {
  pub fn of(result: &Result<UpdateOutcome, Error>) -> Self {
    match result {
      Ok(UpdateOutcome::Unchanged(_)) => RunStatus::Unchanged,
      Ok(_) => RunStatus::Extended,
      Err(e) if e.is_security_violation() => RunStatus::ViolationDetected,
      Err(Error::PersistFailed { .. }) => RunStatus::NotPersisted,
      Err(_) => RunStatus::Aborted,
    }
  }

  /// Process exit code for this status.
  pub fn exit_code(&self) -> i32 {
    match self {
      RunStatus::Unchanged | RunStatus::Extended => 0,
      RunStatus::Aborted => 1,
      RunStatus::ViolationDetected => 2,
      RunStatus::NotPersisted => 3,
    }
  }
}

/// Runs the fetch, verify, compare, prove, save sequence against one log and
/// one state store.
///
/// Runs are sequential and not coordinated with other processes: only have
/// one `Updater` per state file at a time.
pub struct Updater<C: LogClient, S: StateStore> {
  client: C,
  store: S,
  pinned_key: Option<PKey<Public>>,
  /// Which log this is, for log lines.
  log_name: String,
}

impl Updater<HttpLogClient, FileStateStore> {
  /// Updater talking HTTP to the configured server and keeping state in the
  /// configured file.
  pub fn from_config(config: &MonitorConfig) -> Result<Self, Error> {
    let pinned_key = match &config.pinned_key {
      Some(k) => Some(parse_public_key(k)?),
      None => None,
    };
    let client = HttpLogClient::new(config.server_url.clone(), config.timeout)?;
    let store = FileStateStore::new(config.resolved_state_path()?);
    Ok(Updater::new(client, store, pinned_key, config.server_url.as_str()))
  }
}

impl<C: LogClient, S: StateStore> Updater<C, S> {
  pub fn new<N: Into<String>>(client: C, store: S, pinned_key: Option<PKey<Public>>, log_name: N) -> Self {
    Updater { client, store, pinned_key, log_name: log_name.into() }
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  /// Do one check. Nothing is saved unless the new head is verified and, when
  /// there is a previous state, proven consistent with it.
  pub fn update(&self) -> Result<UpdateOutcome, Error> {
    let result = self.run();
    match &result {
      Ok(outcome) => info!("{}: {}", self.log_name, outcome),
      Err(e) if e.is_security_violation() => error!("{}: LOG INTEGRITY VIOLATION: {}", self.log_name, e),
      Err(e @ Error::PersistFailed { .. }) => warn!("{}: {}", self.log_name, e),
      Err(e) => warn!("{}: update aborted: {}", self.log_name, e),
    }
    result
  }

  fn run(&self) -> Result<UpdateOutcome, Error> {
    let prior = self.store.load()?;
    let head = self.client.fetch_latest_head(prior.map(|s| s.size()))?;
    let key = self.select_key(&head, prior.is_none())?;
    let verified = head.signed_root.verify(&key)?.state;

    match Transition::plan(prior.as_ref(), &verified)? {
      Transition::Bootstrap => {
        self.store.save(&verified)?;
        Ok(UpdateOutcome::Bootstrapped(verified))
      },
      Transition::Unchanged => Ok(UpdateOutcome::Unchanged(verified)),
      Transition::Extend { from } => {
        let proof = head.consistency_proof(from.size(), verified.size())?;
        proof.verify(&from, &verified)?;
        self.store.save(&verified)?;
        Ok(UpdateOutcome::Extended { from, to: verified })
      },
    }
  }

  fn select_key(&self, head: &LatestHead, bootstrapping: bool) -> Result<PKey<Public>, Error> {
    if let Some(pinned) = &self.pinned_key {
      let pinned_der = pinned.public_key_to_der().map_err(|e| Error::InvalidKey(format!("{}", e)))?;
      if !head.public_key.is_empty() && head.public_key != pinned_der {
        warn!("{}: server sent a different public key than the pinned one; ignoring it", self.log_name);
      }
      if !head.signed_root.key_hint.is_empty() {
        trace!("{}: using pinned key, server key hint is {}", self.log_name, utils::u8_to_hex(&head.signed_root.key_hint));
      }
      return Ok(pinned.clone());
    }
    if bootstrapping {
      warn!("{}: no pinned key, trusting the key sent by the server", self.log_name);
    }
    parse_public_key(&head.public_key)
  }
}
