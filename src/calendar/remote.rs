use std::collections::{BTreeMap, BTreeSet};

use super::caldav::Error;

/// A calendar object as returned by a batch fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItem {
    pub href: String,
    pub etag: String,
    pub payload: String,
}

/// The operations the sync engine and the registrar need from the server
/// holding the calendar collection.
pub trait RemoteCalendar {
    /// The collection's ctag, `None` when the server did not report one.
    ///
    /// # Errors
    /// Returns an error if the request or the response parsing fails.
    fn collection_fingerprint(&self) -> Result<Option<String>, Error>;

    /// Every item of the collection, mapped from href to etag.
    ///
    /// # Errors
    /// Returns an error if the request or the response parsing fails.
    fn item_fingerprints(&self) -> Result<BTreeMap<String, String>, Error>;

    /// Fetches the given hrefs in one round trip. Items which no longer exist
    /// are silently missing from the result.
    ///
    /// # Errors
    /// Returns an error if the request or the response parsing fails.
    fn fetch_items(&self, hrefs: &BTreeSet<String>) -> Result<Vec<RemoteItem>, Error>;

    /// Conditionally replaces an item. `Some` carries the new etag, `None`
    /// means the write was rejected or the server did not confirm a new etag.
    ///
    /// # Errors
    /// Returns an error if the server could not be reached at all.
    fn put_item(&self, href: &str, expected_etag: &str, payload: &str) -> Result<Option<String>, Error>;

    /// The href of the item cached under `name`.
    ///
    /// # Errors
    /// Returns an error if the name does not form a valid url.
    fn item_href(&self, name: &str) -> Result<String, Error>;
}

/// Derives the cache name of an item from its href: the last path segment.
pub fn item_name(href: &str) -> Option<&str> {
    href.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
}
