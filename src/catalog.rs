//! Classification of cached events and filter evaluation.

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::cache::{self, LocalCache};
use crate::calendar::CalendarItem;
use crate::identity::IdentityResolver;

pub const MY_EVENTS: &str = "my_events";
pub const NEED_VOLUNTEERS: &str = "need_volunteers";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Filter {
    MyEvents,
    NeedVolunteers,
    Level(u8),
    Category(String),
}

impl FromStr for Filter {
    type Err = Infallible;

    /// Levels are accepted as `level:<n>` and in their category spelling `E<n>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let filter = match s {
            MY_EVENTS => Self::MyEvents,
            NEED_VOLUNTEERS => Self::NeedVolunteers,
            _ => match s.strip_prefix("level:").and_then(digits::<u8>).or_else(|| parse_level(s)) {
                Some(level) => Self::Level(level),
                None => Self::Category(s.to_owned()),
            },
        };

        Ok(filter)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MyEvents => f.write_str(MY_EVENTS),
            Self::NeedVolunteers => f.write_str(NEED_VOLUNTEERS),
            Self::Level(level) => write!(f, "level:{level}"),
            Self::Category(category) => f.write_str(category),
        }
    }
}

fn digits<T: FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    s.parse().ok()
}

/// `E<digits>`
pub fn parse_level(tag: &str) -> Option<u8> {
    tag.strip_prefix('E').and_then(digits)
}

/// `<digits>P`
pub fn parse_capacity(tag: &str) -> Option<u32> {
    tag.strip_suffix('P').and_then(digits)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attendee {
    pub email: String,
    /// `None` when the email is unknown to the resolver.
    pub identity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEvent {
    pub name: String,
    pub start: DateTime<Utc>,
    pub summary: Option<String>,
    pub location: Option<String>,
    pub attendees: Vec<Attendee>,
    pub is_registered: bool,
    pub level: Option<u8>,
    pub capacity: Option<u32>,
    pub categories: Vec<String>,
    pub warnings: Vec<String>,
}

impl ParsedEvent {
    pub fn needs_volunteers(&self) -> bool {
        self.capacity
            .is_some_and(|capacity| self.attendees.len() < capacity as usize)
    }

    pub fn matches(&self, filter: &Filter) -> bool {
        match filter {
            Filter::MyEvents => self.is_registered,
            Filter::NeedVolunteers => self.needs_volunteers(),
            Filter::Level(level) => self.level == Some(*level),
            Filter::Category(category) => self.categories.contains(category),
        }
    }

    /// Every filter must match; evaluation stops at the first one that does not.
    pub fn matches_all(&self, filters: &[Filter]) -> bool {
        filters.iter().all(|filter| self.matches(filter))
    }
}

/// A classified event and whether the active filters keep it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub event: ParsedEvent,
    pub keep: bool,
}

/// Splits category tags into level, capacity and opaque tags. Level and
/// capacity come from the first tag matching their pattern; tags matching a
/// reserved pattern are never opaque.
pub fn categorize<'a>(tags: impl IntoIterator<Item = &'a str>) -> (Option<u8>, Option<u32>, Vec<String>) {
    let mut level = None;
    let mut capacity = None;
    let mut opaque = Vec::new();

    for tag in tags {
        if let Some(parsed) = parse_level(tag) {
            level.get_or_insert(parsed);
        } else if let Some(parsed) = parse_capacity(tag) {
            capacity.get_or_insert(parsed);
        } else {
            opaque.push(tag.to_owned());
        }
    }

    (level, capacity, opaque)
}

/// Builds the flat view of one item for `viewer` from the event parsed when
/// the item was loaded.
pub fn classify(item: CalendarItem, viewer: &str, resolver: &impl IdentityResolver) -> ParsedEvent {
    let CalendarItem { name, data, .. } = item;
    let mut warnings = Vec::new();

    let attendees: Vec<Attendee> = data.attendees
        .into_iter()
        .map(|email| {
            let identity = resolver.lookup(&email);

            if identity.is_none() {
                log::warn!("{name}: no identity known for attendee {email}");
                warnings.push(format!("unknown attendee {email}"));
            }

            Attendee { email, identity }
        })
        .collect();

    let is_registered = attendees
        .iter()
        .any(|attendee| attendee.identity.as_deref() == Some(viewer));

    let (level, capacity, categories) = categorize(data.categories.iter().map(String::as_str));

    ParsedEvent {
        name,
        start: data.start,
        summary: data.summary,
        location: data.location,
        attendees,
        is_registered,
        level,
        capacity,
        categories,
        warnings,
    }
}

/// Union of the opaque categories over a whole selection, kept or not.
pub fn all_categories(selections: &[Selection]) -> BTreeSet<String> {
    selections
        .iter()
        .flat_map(|selection| selection.event.categories.iter().cloned())
        .collect()
}

/// Read side of the agenda: classifies and filters the cached events.
pub struct EventCatalog<'a, C, I> {
    cache: &'a C,
    resolver: &'a I,
}

impl<'a, C: LocalCache, I: IdentityResolver> EventCatalog<'a, C, I> {
    pub const fn new(cache: &'a C, resolver: &'a I) -> Self {
        Self { cache, resolver }
    }

    /// Cached items which have not started yet, ordered by start.
    ///
    /// # Errors
    /// Returns an error if the cache cannot be read.
    pub fn upcoming(&self, now: DateTime<Utc>) -> Result<Vec<CalendarItem>, cache::Error> {
        let mut items = Vec::new();

        for name in self.cache.item_names()? {
            let Some(payload) = self.cache.serialized_item(&name)? else {
                continue;
            };
            let etag = self.cache.item_fingerprint(&name)?.unwrap_or_default();

            match CalendarItem::new(name.clone(), payload, etag) {
                Ok(item) if item.has_started(now) => log::debug!("{name} is in the past, skipping"),
                Ok(item) => items.push(item),
                Err(e) => log::warn!("Skipping unreadable cached event {name}: {e}"),
            }
        }

        items.sort_by(|a, b| a.start().cmp(&b.start()).then_with(|| a.name.cmp(&b.name)));

        Ok(items)
    }

    /// # Errors
    /// Returns an error if the cache cannot be read.
    pub fn select(&self, viewer: &str, filters: &[Filter]) -> Result<Vec<Selection>, cache::Error> {
        self.select_at(viewer, filters, Utc::now())
    }

    /// Classifies every upcoming event and tags it with the outcome of `filters`.
    /// Cached payloads which cannot be parsed are left out by [`Self::upcoming`].
    ///
    /// # Errors
    /// Returns an error if the cache cannot be read.
    pub fn select_at(&self, viewer: &str, filters: &[Filter], now: DateTime<Utc>) -> Result<Vec<Selection>, cache::Error> {
        let selections = self.upcoming(now)?
            .into_iter()
            .map(|item| classify(item, viewer, self.resolver))
            .map(|event| Selection {
                keep: event.matches_all(filters),
                event,
            })
            .collect();

        Ok(selections)
    }
}
