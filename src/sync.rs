//! Fingerprint based reconciliation of the local cache with the remote collection.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::cache::{self, LocalCache};
use crate::calendar::{caldav, event, item_name, CalendarItem, RemoteCalendar, RemoteItem};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("remote calendar error: {0}")]
    Remote(#[from] caldav::Error),
    #[error("local cache error: {0}")]
    Cache(#[from] cache::Error),
    #[error("remote item {href} is not a valid event: {source}")]
    Item {
        href: String,
        #[source]
        source: event::Error,
    },
    #[error("the remote calendar did not report a collection fingerprint")]
    MissingCollectionFingerprint,
    #[error("no cached item named {0:?}")]
    UnknownItem(String),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Local and remote ctag were equal, nothing else was requested.
    pub unchanged: bool,
    pub fetched: usize,
    pub stored: usize,
    pub skipped_past: usize,
    /// Calendar objects without a `VEVENT`, such as tasks.
    pub ignored: usize,
    pub deleted: usize,
}

/// Result of storing a batch of fetched items.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoreReport {
    pub fetched: usize,
    pub stored: usize,
    pub skipped_past: usize,
    pub ignored: usize,
}

pub struct SyncEngine<'a, R, C> {
    remote: &'a R,
    cache: &'a mut C,
}

impl<'a, R: RemoteCalendar, C: LocalCache> SyncEngine<'a, R, C> {
    pub fn new(remote: &'a R, cache: &'a mut C) -> Self {
        Self { remote, cache }
    }

    /// Brings the cache in line with the remote collection. The new ctag is
    /// only stored once every other step succeeded, so a failed attempt is
    /// retried from scratch by the next call.
    ///
    /// # Errors
    /// Returns an error if the remote cannot be queried, reports no ctag,
    /// returns an unparsable item, or the cache cannot be written.
    pub fn synchronize(&mut self) -> Result<SyncReport, Error> {
        let remote_ctag = self.remote
            .collection_fingerprint()?
            .ok_or(Error::MissingCollectionFingerprint)?;
        let local_ctag = self.cache.collection_fingerprint()?;

        log::debug!("ctags: remote {remote_ctag:?}, local {local_ctag:?}");

        if local_ctag.as_deref() == Some(remote_ctag.as_str()) {
            return Ok(SyncReport {
                unchanged: true,
                ..SyncReport::default()
            });
        }

        log::debug!("Agenda update needed");

        let etags = self.remote.item_fingerprints()?;
        let names = remote_names(&etags);
        let outdated = self.outdated(&names)?;

        let stored = store_remote_items(self.remote, self.cache, &outdated, Utc::now())?;
        let deleted = self.remove_deleted(&names)?;

        self.cache.set_collection_fingerprint(&remote_ctag)?;

        let report = SyncReport {
            unchanged: false,
            fetched: stored.fetched,
            stored: stored.stored,
            skipped_past: stored.skipped_past,
            ignored: stored.ignored,
            deleted,
        };

        log::info!(
            fetched = report.fetched, stored = report.stored, skipped = report.skipped_past, ignored = report.ignored, deleted = report.deleted;
            "Agenda synchronized to {remote_ctag}"
        );

        Ok(report)
    }

    /// Hrefs whose item is missing locally or carries a different etag.
    fn outdated(&self, names: &BTreeMap<String, (&String, &String)>) -> Result<BTreeSet<String>, Error> {
        let mut outdated = BTreeSet::new();

        for (name, (href, remote_etag)) in names {
            if !self.cache.item_exists(name) {
                outdated.insert((*href).clone());
                continue;
            }

            let local_etag = self.cache.item_fingerprint(name)?;

            log::debug!("{name}: remote etag {remote_etag:?}, local etag {local_etag:?}");

            if local_etag.as_ref() != Some(*remote_etag) {
                outdated.insert((*href).clone());
            }
        }

        Ok(outdated)
    }

    fn remove_deleted(&mut self, names: &BTreeMap<String, (&String, &String)>) -> Result<usize, Error> {
        let mut deleted = 0;

        for name in self.cache.item_names()? {
            if names.contains_key(&name) {
                continue;
            }

            log::info!("Removing {name}, it no longer exists remotely");
            self.cache.delete_item(&name)?;
            deleted += 1;
        }

        Ok(deleted)
    }
}

/// Maps every usable item name of an etag listing to its href and etag.
fn remote_names(etags: &BTreeMap<String, String>) -> BTreeMap<String, (&String, &String)> {
    etags
        .iter()
        .filter_map(|(href, etag)| match item_name(href) {
            Some(name) if cache::validate_name(name).is_ok() => Some((name.to_owned(), (href, etag))),
            _ => {
                log::warn!("Skipping remote item with unusable href {href:?}");
                None
            }
        })
        .collect()
}

/// Fetches `hrefs` in one request and replaces the cached copies. Events which
/// already started are dropped from the cache instead of stored, as are objects
/// holding no event at all. Every payload is parsed before the first write so an
/// invalid item leaves the cache as it was.
///
/// # Errors
/// Returns an error if the fetch fails, a fetched event cannot be read,
/// or the cache cannot be written.
pub fn store_remote_items<R: RemoteCalendar, C: LocalCache>(
    remote: &R,
    cache: &mut C,
    hrefs: &BTreeSet<String>,
    now: DateTime<Utc>,
) -> Result<StoreReport, Error> {
    if hrefs.is_empty() {
        return Ok(StoreReport::default());
    }

    let fetched = remote.fetch_items(hrefs)?;
    let mut report = StoreReport {
        fetched: fetched.len(),
        ..StoreReport::default()
    };

    let mut items = Vec::new();
    let mut ignored = Vec::new();

    for RemoteItem { href, etag, payload } in fetched {
        let Some(name) = item_name(&href).map(str::to_owned) else {
            log::warn!("Skipping fetched item with unusable href {href:?}");
            continue;
        };

        match CalendarItem::new(name, payload, etag) {
            Ok(item) => items.push(item),
            Err(event::Error::NoEvent) => {
                log::warn!("Ignoring {href}, it holds no event");
                ignored.push(href);
            }
            Err(source) => return Err(Error::Item { href, source }),
        }
    }

    for href in ignored {
        if let Some(name) = item_name(&href) {
            cache.delete_item(name)?;
        }
        report.ignored += 1;
    }

    for item in items {
        if item.has_started(now) {
            log::debug!("{} is in the past, skipping", item.name);
            cache.delete_item(&item.name)?;
            report.skipped_past += 1;
            continue;
        }

        log::info!("Storing event {}", item.name);
        cache.upsert_item(&item.name, &item.payload, &item.etag)?;
        report.stored += 1;
    }

    Ok(report)
}
