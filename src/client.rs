use std::convert::TryInto;
use std::fmt;
use std::time::Duration;

use log::{info, trace};

use crate::internal::{self, ConsistencyProof};
use crate::{jsons, Error, SignedLogRoot};

/// What the log server hands back when asked for its latest state. Nothing in
/// here is trusted yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LatestHead {
  pub signed_root: SignedLogRoot,
  /// DER encoded public key the server says it signs with.
  pub public_key: Vec<u8>,
  /// Consistency proof from the size we asked about to the new size, if we
  /// asked.
  pub proof_hashes: Option<Vec<Vec<u8>>>,
  pub status: Option<String>,
}

impl LatestHead {
  /// Decode the base64 fields of a server response.
  pub fn from_json(response: jsons::LatestResponse) -> Result<Self, Error> {
    let signed = &response.proof.signed_log_root;
    let signed_root = SignedLogRoot {
      log_root: internal::decode_base64("log_root", &signed.log_root)?,
      signature: internal::decode_base64("log_root_signature", &signed.log_root_signature)?,
      key_hint: match &signed.key_hint {
        Some(hint) => internal::decode_base64("key_hint", hint)?,
        None => Vec::new(),
      },
    };
    let public_key = internal::decode_base64("Key", &response.key)?;
    let proof_hashes = match &response.proof.proof {
      Some(proof) => {
        let mut hashes = Vec::with_capacity(proof.hashes.len());
        for h in proof.hashes.iter() {
          hashes.push(internal::decode_base64("consistency proof element", h)?);
        }
        Some(hashes)
      },
      None => None,
    };
    Ok(LatestHead {
      signed_root,
      public_key,
      proof_hashes,
      status: response.status.map(|s| s.code),
    })
  }

  /// The consistency proof from `old_size` to `new_size` carried by this
  /// response.
  pub fn consistency_proof(&self, old_size: u64, new_size: u64) -> Result<ConsistencyProof, Error> {
    let hashes = self.proof_hashes.as_ref().ok_or_else(|| {
      Error::MalformedResponseBody(format!("Server did not include a consistency proof from {} to {}.", old_size, new_size))
    })?;
    let mut node_hashes: Vec<[u8; 32]> = Vec::with_capacity(hashes.len());
    for h in hashes.iter() {
      let h: [u8; 32] = h[..].try_into().map_err(|_| {
        Error::MalformedResponseBody(format!("Consistency proof element has length {}, expected 32.", h.len()))
      })?;
      node_hashes.push(h);
    }
    Ok(ConsistencyProof { old_size, new_size, node_hashes })
  }
}

/// Something that can fetch the latest signed tree head from a log.
pub trait LogClient {
  /// Fetch the latest head. When `previous_size` is given, the response
  /// should also carry a consistency proof from that size to the new one.
  fn fetch_latest_head(&self, previous_size: Option<u64>) -> Result<LatestHead, Error>;
}

impl<C: LogClient + ?Sized> LogClient for Box<C> {
  fn fetch_latest_head(&self, previous_size: Option<u64>) -> Result<LatestHead, Error> {
    (**self).fetch_latest_head(previous_size)
  }
}

impl<'a, C: LogClient + ?Sized> LogClient for &'a C {
  fn fetch_latest_head(&self, previous_size: Option<u64>) -> Result<LatestHead, Error> {
    (**self).fetch_latest_head(previous_size)
  }
}

/// [`LogClient`] talking to a log server over HTTP(S).
pub struct HttpLogClient {
  base_url: reqwest::Url,
  http_client: reqwest::blocking::Client,
}

impl fmt::Debug for HttpLogClient {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "HttpLogClient({})", self.base_url)
  }
}

impl HttpLogClient {
  /// `base_url` must end with `/`; [`MonitorConfig`](crate::MonitorConfig)
  /// takes care of that.
  pub fn new(base_url: reqwest::Url, timeout: Duration) -> Result<Self, Error> {
    if !base_url.as_str().ends_with('/') {
      return Err(Error::InvalidArgument("base_url must end with /".to_owned()));
    }
    Ok(HttpLogClient {
      base_url,
      http_client: internal::new_http_client(timeout)?,
    })
  }

  pub fn base_url(&self) -> &reqwest::Url {
    &self.base_url
  }

  /// Get the underlying http client used to call the log API.
  pub fn get_reqwest_client(&self) -> &reqwest::blocking::Client {
    &self.http_client
  }
}

/// Path of the latest-head endpoint, relative to the server root.
pub fn latest_head_path(previous_size: Option<u64>) -> Result<String, Error> {
  match previous_size {
    None => Ok("api/v1/latest".to_owned()),
    Some(size) => {
      let query = serde_urlencoded::to_string(&[("lastSize", size.to_string())]).map_err(|e| Error::Unknown(format!("{}", e)))?;
      Ok(format!("api/v1/latest?{}", query))
    }
  }
}

impl LogClient for HttpLogClient {
  fn fetch_latest_head(&self, previous_size: Option<u64>) -> Result<LatestHead, Error> {
    let response: jsons::LatestResponse = internal::post_json(&self.http_client, &self.base_url, &latest_head_path(previous_size)?)?;
    let head = LatestHead::from_json(response)?;
    if let Some(status) = &head.status {
      info!("{}: status {}", self.base_url, status);
    }
    trace!("{}: got log root of {} bytes, proof of {:?} hashes", self.base_url, head.signed_root.log_root.len(), head.proof_hashes.as_ref().map(|h| h.len()));
    Ok(head)
  }
}
