//! Adds or removes a participant on a cached event and writes the change back.

use std::collections::BTreeSet;

use chrono::Utc;

use crate::cache::LocalCache;
use crate::calendar::event::{self, EventData};
use crate::calendar::RemoteCalendar;
use crate::sync::{self, store_remote_items, Error};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// Joining, but the attendee was already on the event. Nothing was sent.
    AlreadyRegistered,
    /// Leaving, but the attendee was not on the event. Nothing was sent.
    NotRegistered,
    /// The remote accepted the write, the cache holds the new payload and etag.
    Committed { etag: String },
    /// The write was not confirmed. The cache was refreshed from the remote,
    /// which may or may not contain the change.
    Reconciled,
}

pub struct AttendeeRegistrar<'a, R, C> {
    remote: &'a R,
    cache: &'a mut C,
}

impl<'a, R: RemoteCalendar, C: LocalCache> AttendeeRegistrar<'a, R, C> {
    pub fn new(remote: &'a R, cache: &'a mut C) -> Self {
        Self { remote, cache }
    }

    /// Joins (`join = true`) or leaves the cached event `name` as `email`.
    ///
    /// The write is conditional on the cached etag. When the remote rejects it,
    /// or answers without an etag, the item is fetched again instead of guessed.
    ///
    /// # Errors
    /// Returns an error if the item is not cached, its payload cannot be parsed,
    /// the remote is unreachable, or the cache cannot be written.
    pub fn register(
        &mut self,
        name: &str,
        email: &str,
        join: bool,
        display_name: Option<&str>,
    ) -> Result<Registration, Error> {
        let email = event::strip_mailto(email);

        let (Some(payload), Some(etag)) = (self.cache.serialized_item(name)?, self.cache.item_fingerprint(name)?) else {
            return Err(Error::UnknownItem(name.to_owned()));
        };

        let data = EventData::parse(&payload).map_err(|source| Error::Item {
            href: name.to_owned(),
            source,
        })?;

        let updated = match (join, data.has_attendee(email)) {
            (true, true) => {
                log::info!("{email} already attends {name}");
                return Ok(Registration::AlreadyRegistered);
            }
            (false, false) => {
                log::info!("{email} does not attend {name}");
                return Ok(Registration::NotRegistered);
            }
            (true, false) => event::with_attendee(&payload, email, display_name),
            (false, true) => match event::without_attendee(&payload, email) {
                Some(updated) => updated,
                None => return Ok(Registration::NotRegistered),
            },
        };

        let href = self.remote.item_href(name)?;

        log::debug!(join = join; "Sending {name} with precondition {etag:?}");

        match self.remote.put_item(&href, &etag, &updated)? {
            Some(new_etag) => {
                self.cache.upsert_item(name, &updated, &new_etag)?;
                log::info!(etag = new_etag.as_str(); "{} {email} on {name}", if join { "Registered" } else { "Unregistered" });

                Ok(Registration::Committed { etag: new_etag })
            }
            None => {
                log::warn!("Write of {name} was not confirmed, fetching it again");
                self.refresh(&href)?;

                Ok(Registration::Reconciled)
            }
        }
    }

    fn refresh(&mut self, href: &str) -> Result<(), sync::Error> {
        let hrefs = BTreeSet::from([href.to_owned()]);
        store_remote_items(self.remote, self.cache, &hrefs, Utc::now())?;

        Ok(())
    }
}
