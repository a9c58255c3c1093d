//! Things that are only useful if you are doing your own API calling.

use std::time::Duration;

use log::trace;

use crate::Error;

mod consistency;
mod signature;
pub use consistency::*;
pub use signature::*;

/// Construct a new [reqwest::blocking::Client](reqwest::blocking::Client) to
/// be used with the functions in this module. You don't necessary need to use
/// this.
///
/// The client constructed will not store cookie or follow redirect, and gives
/// up on a request after `timeout`.
pub fn new_http_client(timeout: Duration) -> Result<reqwest::blocking::Client, Error> {
  let mut def_headers = reqwest::header::HeaderMap::new();
  def_headers.insert("User-Agent", reqwest::header::HeaderValue::from_static(concat!("tlog-monitor/", env!("CARGO_PKG_VERSION"))));
  match reqwest::blocking::Client::builder()
      .connect_timeout(timeout)
      .timeout(timeout)
      .tcp_nodelay(true)
      .gzip(true)
      .default_headers(def_headers)
      .redirect(reqwest::redirect::Policy::none())
      .build() {
    Ok(r) => Ok(r),
    Err(e) => Err(Error::Unknown(format!("{}", &e)))
  }
}

/// Perform a POST request with an empty body and parse the result as a JSON.
///
/// `path` is relative to `base_url` and may include a query string.
pub fn post_json<J: serde::de::DeserializeOwned>(client: &reqwest::blocking::Client, base_url: &reqwest::Url, path: &str) -> Result<J, Error> {
  let url = base_url.join(path).map_err(|e| Error::InvalidArgument(format!("Can't join {:?} onto {}: {}", path, base_url, &e)))?;
  let url_str = url.as_str().to_owned();
  let response = client.post(url)
      .header(reqwest::header::CONTENT_LENGTH, "0")
      .send().map_err(Error::FetchFailed)?;
  if response.status().as_u16() != 200 {
    trace!("POST {} -> {}", &url_str, response.status());
    return Err(Error::InvalidResponseStatus(response.status()));
  }
  let response = response.text().map_err(Error::FetchFailed)?;
  if response.len() > 150 {
    trace!("POST {} -> {:?}...", &url_str, response.chars().take(150).collect::<String>());
  } else {
    trace!("POST {} -> {:?}", &url_str, &response);
  }
  let json = serde_json::from_str(&response).map_err(|e| Error::MalformedResponseBody(format!("Unable to decode JSON: {} (response is {:?})", &e, &response)))?;
  Ok(json)
}

/// Decode a base64 field of a server response.
pub fn decode_base64(field: &str, value: &str) -> Result<Vec<u8>, Error> {
  base64::decode(value).map_err(|e| Error::MalformedResponseBody(format!("base64 decode failure on {}: {} (trying to decode {:?})", field, &e, value)))
}

#[test]
fn decode_base64_test() {
  assert_eq!(decode_base64("x", "AAE=").unwrap(), vec![0, 1]);
  match decode_base64("log_root", "not base64!") {
    Err(Error::MalformedResponseBody(desc)) => assert!(desc.contains("log_root")),
    other => panic!("expected MalformedResponseBody, got {:?}", other),
  }
}

#[cfg(test)]
mod tests {
  use std::io::{Read, Write};
  use std::net::TcpListener;
  use std::thread;

  use super::*;

  /// Accept one connection, answer it with `body`, and hand back the request head.
  fn serve_once(listener: TcpListener, body: &'static str) -> thread::JoinHandle<String> {
    thread::spawn(move || {
      let (mut stream, _) = listener.accept().unwrap();
      let mut request = Vec::new();
      let mut buf = [0u8; 1024];
      while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).unwrap();
        if n == 0 {
          break;
        }
        request.extend_from_slice(&buf[..n]);
      }
      write!(stream, "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}", body.len(), body).unwrap();
      String::from_utf8_lossy(&request).into_owned()
    })
  }

  #[test]
  fn post_json_sends_empty_body() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = reqwest::Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
    let server = serve_once(listener, r#"{"ok":true}"#);
    let client = reqwest::blocking::Client::builder().no_proxy().build().unwrap();
    let json: serde_json::Value = post_json(&client, &base_url, "api/v1/latest?lastSize=7").unwrap();
    assert_eq!(json["ok"], serde_json::Value::Bool(true));

    let request = server.join().unwrap().to_ascii_lowercase();
    assert!(request.starts_with("post /api/v1/latest?lastsize=7 http/1.1\r\n"), "{}", request);
    assert!(request.contains("\r\ncontent-length: 0\r\n"), "{}", request);
  }
}
