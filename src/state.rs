use std::convert::TryInto;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{info, trace};
use serde::{Deserialize, Serialize};

use crate::{Error, TreeState};

/// Where the last trusted [`TreeState`] is kept between runs.
pub trait StateStore {
  /// Load the last trusted state.
  ///
  /// `Ok(None)` means there is no record yet (first run). A record that
  /// exists but can't be read or decoded is an `Err`, never `Ok(None)`.
  fn load(&self) -> Result<Option<TreeState>, Error>;

  /// Replace the stored state. Either the old or the new record survives a
  /// crash, never a mix of both.
  fn save(&self, state: &TreeState) -> Result<(), Error>;
}

impl<'a, S: StateStore + ?Sized> StateStore for &'a S {
  fn load(&self) -> Result<Option<TreeState>, Error> {
    (**self).load()
  }

  fn save(&self, state: &TreeState) -> Result<(), Error> {
    (**self).save(state)
  }
}

/// On-disk representation, `{"Size": 123, "Hash": "<base64>"}`.
#[derive(Serialize, Deserialize, Debug)]
struct PersistedState {
  #[serde(rename = "Size")]
  size: u64,
  #[serde(rename = "Hash")]
  hash: String,
}

impl PersistedState {
  fn from_state(state: &TreeState) -> Self {
    PersistedState {
      size: state.size(),
      hash: base64::encode(state.root_hash()),
    }
  }

  fn into_state(self) -> Result<TreeState, String> {
    let hash = base64::decode(&self.hash).map_err(|e| format!("Hash is not valid base64: {}", e))?;
    let hash: [u8; 32] = hash[..].try_into().map_err(|_| format!("Hash has length {}, expected 32", hash.len()))?;
    Ok(TreeState::new(self.size, hash))
  }
}

/// Serialize a state the way [`FileStateStore`] stores it.
pub fn encode_state(state: &TreeState) -> Result<Vec<u8>, String> {
  serde_json::to_vec(&PersistedState::from_state(state)).map_err(|e| format!("{}", e))
}

/// Inverse of [`encode_state`].
pub fn decode_state(bytes: &[u8]) -> Result<TreeState, String> {
  let persisted: PersistedState = serde_json::from_slice(bytes).map_err(|e| format!("{}", e))?;
  persisted.into_state()
}

/// [`StateStore`] keeping the state in a single JSON file.
#[derive(Debug, Clone)]
pub struct FileStateStore {
  path: PathBuf,
}

impl FileStateStore {
  pub fn new<P: Into<PathBuf>>(path: P) -> Self {
    FileStateStore { path: path.into() }
  }

  /// `<home>/.tlog-monitor/state.json`.
  pub fn default_path() -> Result<PathBuf, Error> {
    let home = dirs::home_dir().ok_or_else(|| Error::InvalidArgument("Can't find home directory; specify a state file.".to_owned()))?;
    Ok(home.join(".tlog-monitor").join("state.json"))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn tmp_path(&self) -> PathBuf {
    let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    self.path.with_file_name(name)
  }

  /// Create the directory holding the state file if it isn't there.
  fn ensure_dir(&self) -> io::Result<()> {
    let dir = self.dir();
    if dir.exists() {
      return Ok(());
    }
    info!("Creating state directory {}", dir.to_string_lossy());
    fs::create_dir_all(dir)
  }

  /// Directory the state file lives in.
  fn dir(&self) -> &Path {
    match self.path.parent() {
      Some(dir) if !dir.as_os_str().is_empty() => dir,
      _ => Path::new("."),
    }
  }

  fn write_atomic(&self, bytes: &[u8]) -> io::Result<()> {
    self.ensure_dir()?;
    let tmp_path = self.tmp_path();
    // A leftover temp file would keep its old mode through the rename.
    match fs::remove_file(&tmp_path) {
      Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
      _ => {},
    }
    {
      let mut opts = fs::OpenOptions::new();
      opts.write(true).create(true).truncate(true);
      #[cfg(unix)]
      {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
      }
      let mut file = opts.open(&tmp_path)?;
      file.write_all(bytes)?;
      file.sync_all()?;
    }
    fs::rename(&tmp_path, &self.path).map_err(|e| {
      let _ = fs::remove_file(&tmp_path);
      e
    })?;
    #[cfg(unix)]
    fs::File::open(self.dir())?.sync_all()?;
    Ok(())
  }
}

impl StateStore for FileStateStore {
  fn load(&self) -> Result<Option<TreeState>, Error> {
    self.ensure_dir().map_err(|e| Error::StateIO(self.path.clone(), e))?;
    let bytes = match fs::read(&self.path) {
      Ok(b) => b,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        info!("No previous state found at {}", self.path.to_string_lossy());
        return Ok(None);
      },
      Err(e) => return Err(Error::StateIO(self.path.clone(), e)),
    };
    let state = decode_state(&bytes).map_err(|e| Error::StateDecode(self.path.clone(), e))?;
    trace!("Loaded state {} from {}", &state, self.path.to_string_lossy());
    Ok(Some(state))
  }

  fn save(&self, state: &TreeState) -> Result<(), Error> {
    let bytes = encode_state(state).map_err(Error::Unknown)?;
    self.write_atomic(&bytes).map_err(|source| Error::PersistFailed {
      state: *state,
      path: self.path.clone(),
      source,
    })?;
    trace!("Saved state {} to {}", state, self.path.to_string_lossy());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::utils::sha256;

  #[test]
  fn missing_file_is_bootstrap() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStateStore::new(dir.path().join("nested").join("state.json"));
    assert_eq!(store.load().unwrap(), None);
    // First use creates the directory.
    assert!(dir.path().join("nested").is_dir());
  }

  #[test]
  fn save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStateStore::new(dir.path().join("a").join("state.json"));
    let state = TreeState::new(u64::max_value(), sha256(b"root"));
    store.save(&state).unwrap();
    assert_eq!(store.load().unwrap(), Some(state));
    assert!(!store.tmp_path().exists());

    let newer = TreeState::new(12, sha256(b"newer"));
    store.save(&newer).unwrap();
    assert_eq!(store.load().unwrap(), Some(newer));
  }

  #[test]
  fn record_format() {
    let state = TreeState::new(5, [0xffu8; 32]);
    let encoded = String::from_utf8(encode_state(&state).unwrap()).unwrap();
    assert_eq!(encoded, format!(r#"{{"Size":5,"Hash":"{}"}}"#, base64::encode(&[0xffu8; 32])));
    assert_eq!(decode_state(encoded.as_bytes()).unwrap(), state);
  }

  #[test]
  fn corrupt_record_is_not_bootstrap() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = FileStateStore::new(&path);
    let corrupt: &[&[u8]] = &[
      b"",
      b"{",
      b"not json at all",
      br#"{"Size": 5}"#,
      br#"{"Size": -1, "Hash": "AAAA"}"#,
      br#"{"Size": 5, "Hash": "!!!"}"#,
      // Truncated hash.
      br#"{"Size": 5, "Hash": "AAECAw=="}"#,
    ];
    for bytes in corrupt {
      fs::write(&path, bytes).unwrap();
      match store.load() {
        Err(Error::StateDecode(p, _)) => assert_eq!(p, path),
        other => panic!("{:?}: expected StateDecode, got {:?}", String::from_utf8_lossy(bytes), other),
      }
    }
  }

  #[test]
  fn unreadable_record_is_not_bootstrap() {
    let dir = tempfile::tempdir().unwrap();
    // A directory where the file should be can't be read as a file.
    let path = dir.path().join("state.json");
    fs::create_dir(&path).unwrap();
    match FileStateStore::new(&path).load() {
      Err(Error::StateIO(p, _)) => assert_eq!(p, path),
      other => panic!("expected StateIO, got {:?}", other),
    }
  }

  #[test]
  fn failed_save_reports_verified_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    // Can't rename a file over a non-empty directory.
    fs::create_dir(&path).unwrap();
    fs::write(path.join("occupied"), b"x").unwrap();
    let state = TreeState::new(3, sha256(b"three"));
    match FileStateStore::new(&path).save(&state) {
      Err(Error::PersistFailed { state: s, path: p, .. }) => {
        assert_eq!(s, state);
        assert_eq!(p, path);
      },
      other => panic!("expected PersistFailed, got {:?}", other),
    }
  }

  #[cfg(unix)]
  #[test]
  fn state_file_is_private() {
    use std::os::unix::fs::PermissionsExt;
    let dir = tempfile::tempdir().unwrap();
    let store = FileStateStore::new(dir.path().join("state.json"));
    store.save(&TreeState::new(1, sha256(b"one"))).unwrap();
    let mode = fs::metadata(store.path()).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);

    // Stale world-readable temp file from an earlier crash.
    fs::write(store.tmp_path(), b"stale").unwrap();
    fs::set_permissions(store.tmp_path(), fs::Permissions::from_mode(0o666)).unwrap();
    store.save(&TreeState::new(2, sha256(b"two"))).unwrap();
    let mode = fs::metadata(store.path()).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
    assert_eq!(store.load().unwrap(), Some(TreeState::new(2, sha256(b"two"))));
    assert!(!store.tmp_path().exists());
  }

  #[test]
  fn state_dir_test() {
    assert_eq!(FileStateStore::new("/var/lib/x/state.json").dir(), Path::new("/var/lib/x"));
    assert_eq!(FileStateStore::new("state.json").dir(), Path::new("."));
  }
}
