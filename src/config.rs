use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, FileStateStore};

/// How long a fetch may take before the run is aborted.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a run needs to know that isn't fetched or stored.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
  /// Root of the log server. Always ends with `/`.
  pub server_url: reqwest::Url,
  /// `None` means [`FileStateStore::default_path`].
  pub state_path: Option<PathBuf>,
  /// Log public key (DER or PEM). When set, keys sent by the server are
  /// ignored.
  pub pinned_key: Option<Vec<u8>>,
  pub timeout: Duration,
}

impl MonitorConfig {
  /// Config for the log at `server`, with the state file at
  /// [`FileStateStore::default_path`] and a 5 second timeout. Nothing is
  /// looked up until the config is used.
  pub fn new(server: &str) -> Result<Self, Error> {
    let mut server = server.to_owned();
    if !server.ends_with('/') {
      server.push('/');
    }
    let server_url = reqwest::Url::parse(&server).map_err(|e| Error::InvalidArgument(format!("Unable to parse url {:?}: {}", &server, &e)))?;
    match server_url.scheme() {
      "http" | "https" => {},
      other => return Err(Error::InvalidArgument(format!("Unsupported url scheme {:?}", other))),
    }
    Ok(MonitorConfig {
      server_url,
      state_path: None,
      pinned_key: None,
      timeout: DEFAULT_TIMEOUT,
    })
  }

  pub fn with_state_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
    self.state_path = Some(path.into());
    self
  }

  /// The state file to use. The home directory is only looked up when no
  /// path was given.
  pub fn resolved_state_path(&self) -> Result<PathBuf, Error> {
    match &self.state_path {
      Some(path) => Ok(path.clone()),
      None => FileStateStore::default_path(),
    }
  }

  pub fn with_pinned_key(mut self, key: Vec<u8>) -> Self {
    self.pinned_key = Some(key);
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, Error> {
    if timeout == Duration::from_secs(0) {
      return Err(Error::InvalidArgument("timeout must be positive".to_owned()));
    }
    self.timeout = timeout;
    Ok(self)
  }
}

#[test]
fn config_test() {
  let config = MonitorConfig::new("https://log.example.com").unwrap();
  assert_eq!(config.server_url.as_str(), "https://log.example.com/");
  assert_eq!(config.timeout, DEFAULT_TIMEOUT);
  assert!(config.state_path.is_none());
  assert!(config.pinned_key.is_none());

  let config = MonitorConfig::new("http://localhost:3000/log/").unwrap()
      .with_state_path("/tmp/s.json")
      .with_timeout(Duration::from_secs(1)).unwrap();
  assert_eq!(config.server_url.as_str(), "http://localhost:3000/log/");
  assert_eq!(config.resolved_state_path().unwrap(), PathBuf::from("/tmp/s.json"));

  MonitorConfig::new("not a url").expect_err("");
  MonitorConfig::new("ftp://log.example.com/").expect_err("");
  MonitorConfig::new("https://log.example.com/").unwrap().with_timeout(Duration::from_secs(0)).expect_err("");
}
