use chrono::{DateTime, Utc};

use super::event::{self, EventData};

/// A cached calendar object together with its parsed event.
#[derive(Debug, Clone)]
pub struct CalendarItem {
    pub name: String,
    pub payload: String,
    pub etag: String,
    pub data: EventData,
}

impl CalendarItem {
    /// # Errors
    /// Returns an error if the payload holds no event with a valid start.
    pub fn new(name: String, payload: String, etag: String) -> Result<Self, event::Error> {
        let data = EventData::parse(&payload)?;

        Ok(Self {
            name,
            payload,
            etag,
            data,
        })
    }

    pub const fn start(&self) -> DateTime<Utc> {
        self.data.start
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.start() < now
    }
}

impl PartialEq for CalendarItem {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.etag == other.etag
    }
}
