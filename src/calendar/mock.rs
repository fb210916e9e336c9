//! In-memory stand-in for a CalDAV collection, recording every call.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};

use super::caldav::{Error, ErrorKind};
use super::remote::{RemoteCalendar, RemoteItem};

pub const COLLECTION: &str = "/calendars/team/agenda/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutBehaviour {
    /// Apply the write when the precondition holds and return a fresh etag.
    Honour,
    /// Drop the write and return no etag.
    Unconfirmed,
    /// Fail without any HTTP response.
    Unreachable,
}

#[derive(Debug)]
pub struct MockRemote {
    pub ctag: RefCell<Option<String>>,
    /// Items by href: (etag, payload).
    pub items: RefCell<BTreeMap<String, (String, String)>>,
    pub fetches: RefCell<Vec<BTreeSet<String>>>,
    pub fingerprint_listings: Cell<usize>,
    pub puts: RefCell<Vec<(String, String, String)>>,
    pub put_behaviour: Cell<PutBehaviour>,
    pub unreachable: Cell<bool>,
    revision: Cell<usize>,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self {
            ctag: RefCell::new(None),
            items: RefCell::new(BTreeMap::new()),
            fetches: RefCell::new(Vec::new()),
            fingerprint_listings: Cell::new(0),
            puts: RefCell::new(Vec::new()),
            put_behaviour: Cell::new(PutBehaviour::Honour),
            unreachable: Cell::new(false),
            revision: Cell::new(0),
        }
    }
}

impl MockRemote {
    pub fn href(name: &str) -> String {
        format!("{COLLECTION}{name}")
    }

    pub fn set_ctag(&self, ctag: &str) {
        *self.ctag.borrow_mut() = Some(ctag.to_owned());
    }

    pub fn set_item(&self, name: &str, etag: &str, payload: &str) {
        self.items
            .borrow_mut()
            .insert(Self::href(name), (etag.to_owned(), payload.to_owned()));
    }

    pub fn remove_item(&self, name: &str) {
        self.items.borrow_mut().remove(&Self::href(name));
    }

    pub fn payload(&self, name: &str) -> Option<String> {
        self.items.borrow().get(&Self::href(name)).map(|(_, payload)| payload.clone())
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.borrow().len()
    }

    fn check_reachable(&self) -> Result<(), Error> {
        if self.unreachable.get() {
            return Err(Error {
                kind: ErrorKind::Http,
                message: "connection refused".to_owned(),
            });
        }

        Ok(())
    }
}

impl RemoteCalendar for MockRemote {
    fn collection_fingerprint(&self) -> Result<Option<String>, Error> {
        self.check_reachable()?;

        Ok(self.ctag.borrow().clone())
    }

    fn item_fingerprints(&self) -> Result<BTreeMap<String, String>, Error> {
        self.check_reachable()?;
        self.fingerprint_listings.set(self.fingerprint_listings.get() + 1);

        Ok(self.items
            .borrow()
            .iter()
            .map(|(href, (etag, _))| (href.clone(), etag.clone()))
            .collect())
    }

    fn fetch_items(&self, hrefs: &BTreeSet<String>) -> Result<Vec<RemoteItem>, Error> {
        self.check_reachable()?;
        self.fetches.borrow_mut().push(hrefs.clone());

        let items = self.items.borrow();

        Ok(hrefs
            .iter()
            .filter_map(|href| {
                let (etag, payload) = items.get(href)?;

                Some(RemoteItem {
                    href: href.clone(),
                    etag: etag.clone(),
                    payload: payload.clone(),
                })
            })
            .collect())
    }

    fn put_item(&self, href: &str, expected_etag: &str, payload: &str) -> Result<Option<String>, Error> {
        self.puts
            .borrow_mut()
            .push((href.to_owned(), expected_etag.to_owned(), payload.to_owned()));

        match self.put_behaviour.get() {
            PutBehaviour::Unreachable => Err(Error {
                kind: ErrorKind::Http,
                message: "connection reset".to_owned(),
            }),
            PutBehaviour::Unconfirmed => Ok(None),
            PutBehaviour::Honour => {
                let mut items = self.items.borrow_mut();

                match items.get_mut(href) {
                    Some((etag, stored)) if *etag == expected_etag => {
                        self.revision.set(self.revision.get() + 1);
                        *etag = format!("put-{}", self.revision.get());
                        payload.clone_into(stored);

                        Ok(Some(etag.clone()))
                    }
                    _ => Ok(None),
                }
            }
        }
    }

    fn item_href(&self, name: &str) -> Result<String, Error> {
        Ok(Self::href(name))
    }
}

/// Builds a minimal calendar object starting at `start` (`YYYYMMDDTHHMMSSZ`).
pub fn ics(uid: &str, start: &str, attendees: &[&str], categories: &[&str]) -> String {
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_owned(),
        "VERSION:2.0".to_owned(),
        "PRODID:-//agenda-sync//tests//EN".to_owned(),
        "BEGIN:VEVENT".to_owned(),
        format!("UID:{uid}"),
        format!("DTSTART:{start}"),
        format!("SUMMARY:Event {uid}"),
    ];

    lines.extend(categories.iter().map(|category| format!("CATEGORIES:{category}")));
    lines.extend(attendees.iter().map(|email| format!("ATTENDEE:mailto:{email}")));
    lines.push("END:VEVENT".to_owned());
    lines.push("END:VCALENDAR".to_owned());

    lines.iter().map(|line| format!("{line}\r\n")).collect()
}
