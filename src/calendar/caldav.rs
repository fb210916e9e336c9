use std::collections::{BTreeMap, BTreeSet};

use base64::prelude::*;
use ureq::Agent;
use url::Url;

use crate::config;

use super::extract;
use super::remote::{RemoteCalendar, RemoteItem};

#[derive(Clone)]
pub enum Credentials {
  Basic(String, String),
  Bearer(String),
}

impl From<&config::Caldav> for Credentials {
  fn from(config: &config::Caldav) -> Self {
    match &config.token {
      Some(token) => Self::Bearer(token.clone()),
      None => Self::Basic(
        config.username.clone(),
        config.password.clone().unwrap_or_default(),
      ),
    }
  }
}

impl core::fmt::Debug for Credentials {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("<hidden>")
  }
}

/// Blocking client for a single calendar collection.
#[derive(Debug, Clone)]
pub struct Client {
  credentials: Credentials,
  agent: Agent,
  collection_url: Url,
}

impl Client {
  pub fn new(credentials: Credentials, collection_url: Url) -> Self {
    Self {
      credentials,
      agent: Agent::new(),
      collection_url,
    }
  }

  fn get_auth_header(&self) -> String {
    match &self.credentials {
      Credentials::Basic(username, password) => {
        format!(
          "Basic {}",
          BASE64_STANDARD.encode(format!("{username}:{password}"))
        )
      }
      Credentials::Bearer(token) => format!("Bearer {token}"),
    }
  }

  /// Send a WebDAV request with an XML body to the collection and parse the multistatus answer.
  ///
  /// # Errors
  /// Returns an error if the request or the XML parsing fails.
  fn dav_request(
    &self,
    method: &str,
    body: &str,
    depth: &str,
  ) -> Result<xmltree::Element, Error> {
    let content = self.agent
      .request(method, self.collection_url.as_str())
      .set("Authorization", &self.get_auth_header())
      .set("Content-Type", "application/xml; charset=utf-8")
      .set("Prefer", "return-minimal")
      .set("Depth", depth)
      .send_bytes(body.as_bytes())?
      .into_string()
      .map_err(|e| Error {
        kind: ErrorKind::Parsing,
        message: e.to_string(),
      })?;

    log::trace!("CalDAV {method} response: {content:?}");

    Ok(xmltree::Element::parse(content.as_bytes())?)
  }

  fn resolve(&self, href: &str) -> Result<Url, Error> {
    Ok(self.collection_url.join(href)?)
  }
}

impl RemoteCalendar for Client {
  fn collection_fingerprint(&self) -> Result<Option<String>, Error> {
    let root = self.dav_request("PROPFIND", CTAG_REQUEST, "0")?;
    let ctag = collection_ctag(&root);

    if ctag.is_none() {
      log::warn!("{} reported no ctag", self.collection_url);
    }

    Ok(ctag)
  }

  fn item_fingerprints(&self) -> Result<BTreeMap<String, String>, Error> {
    let root = self.dav_request("REPORT", ETAGS_REQUEST, "1")?;

    let etags = extract::responses(&root)
      .filter_map(|response| Some((extract::href(response)?, extract::etag(response)?)))
      .filter(|(href, _)| href.trim_end_matches('/') != self.collection_url.path().trim_end_matches('/'))
      .inspect(|(href, etag)| log::debug!("etag {href}: {etag}"))
      .collect();

    Ok(etags)
  }

  fn fetch_items(&self, hrefs: &BTreeSet<String>) -> Result<Vec<RemoteItem>, Error> {
    if hrefs.is_empty() {
      return Ok(Vec::new());
    }

    let root = self.dav_request("REPORT", &request_multiget(hrefs), "1")?;

    let items = extract::responses(&root)
      .filter_map(|response| {
        Some(RemoteItem {
          href: extract::href(response)?,
          etag: extract::etag(response)?,
          payload: extract::event_data(response)?,
        })
      })
      .collect();

    Ok(items)
  }

  fn put_item(&self, href: &str, expected_etag: &str, payload: &str) -> Result<Option<String>, Error> {
    let url = self.resolve(href)?;

    let response = self.agent
      .put(url.as_str())
      .set("Authorization", &self.get_auth_header())
      .set("Content-Type", "text/calendar; charset=utf-8")
      .set("If-Match", &format!("\"{expected_etag}\""))
      .send_string(payload);

    match response {
      Ok(response) => {
        let etag = put_outcome(response.status(), response.header("ETag"));

        if etag.is_none() {
          log::info!("Server accepted {href} without returning a new etag");
        }

        Ok(etag)
      }
      Err(ureq::Error::Status(code, response)) => {
        log::warn!(
          "Update of {href} rejected with status {code}: {}",
          response.into_string().unwrap_or_default(),
        );

        Ok(put_outcome(code, None))
      }
      Err(e) => Err(e.into()),
    }
  }

  fn item_href(&self, name: &str) -> Result<String, Error> {
    Ok(self.resolve(name)?.path().to_owned())
  }
}

/// The ctag of the first response carrying one.
fn collection_ctag(root: &xmltree::Element) -> Option<String> {
  extract::responses(root).find_map(extract::ctag)
}

/// Only a 2xx answer with an `ETag` header confirms a conditional write.
fn put_outcome(status: u16, etag: Option<&str>) -> Option<String> {
  if !(200..300).contains(&status) {
    return None;
  }

  etag
    .map(extract::unquote)
    .filter(|etag| !etag.is_empty())
    .map(str::to_owned)
}

pub static CTAG_REQUEST: &str = r#"
<d:propfind xmlns:d="DAV:" xmlns:cs="http://calendarserver.org/ns/">
  <d:prop>
    <cs:getctag />
  </d:prop>
</d:propfind>
"#;

pub static ETAGS_REQUEST: &str = r#"
<c:calendar-query xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop>
    <d:getetag />
  </d:prop>
  <c:filter>
    <c:comp-filter name="VCALENDAR">
      <c:comp-filter name="VEVENT" />
    </c:comp-filter>
  </c:filter>
</c:calendar-query>
"#;

pub fn request_multiget(hrefs: &BTreeSet<String>) -> String {
  let hrefs: String = hrefs
    .iter()
    .map(|href| format!("  <d:href>{}</d:href>\n", escape(href)))
    .collect();

  format!(r#"
<c:calendar-multiget xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop>
    <d:getetag />
    <c:calendar-data />
  </d:prop>
{hrefs}</c:calendar-multiget>
"#)
}

fn escape(text: &str) -> String {
  text
    .replace('&', "&amp;")
    .replace('<', "&lt;")
    .replace('>', "&gt;")
}

/// Errors that may occur during `CalDAV` operations.
#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
#[error("{kind:?} error: {message}")]
pub struct Error {
  pub kind: ErrorKind,
  pub message: String,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
  Http,
  Parsing,
}

impl From<ureq::Error> for Error {
  fn from(e: ureq::Error) -> Self {
    Self {
      kind: ErrorKind::Http,
      message: format!("{e:?}"),
    }
  }
}

impl From<xmltree::ParseError> for Error {
  fn from(e: xmltree::ParseError) -> Self {
    Self {
      kind: ErrorKind::Parsing,
      message: e.to_string(),
    }
  }
}

impl From<url::ParseError> for Error {
  fn from(e: url::ParseError) -> Self {
    Self {
      kind: ErrorKind::Parsing,
      message: e.to_string(),
    }
  }
}
