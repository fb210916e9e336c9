use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::parser::{self, Component, Property};

const MAILTO: &str = "mailto:";
const LINE_LIMIT: usize = 75;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid iCalendar data: {0}")]
    Parse(String),
    #[error("no VEVENT component")]
    NoEvent,
    #[error("event has no DTSTART")]
    NoStart,
    #[error("invalid DTSTART: {0}")]
    InvalidStart(String),
}

/// The parts of a `VEVENT` the agenda works with, read once from the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventData {
    pub start: DateTime<Utc>,
    pub summary: Option<String>,
    pub location: Option<String>,
    /// Attendee emails in payload order, without the `mailto:` scheme.
    pub attendees: Vec<String>,
    /// Category tags in payload order, multi-valued properties flattened.
    pub categories: Vec<String>,
}

impl EventData {
    /// Parses the first `VEVENT` of a serialized calendar.
    ///
    /// # Errors
    /// Returns an error if the payload is not valid iCalendar data or the event has no usable start.
    pub fn parse(payload: &str) -> Result<Self, Error> {
        let unfolded = parser::unfold(payload);
        let calendar = parser::read_calendar(&unfolded).map_err(Error::Parse)?;
        let event = find_event(&calendar.components).ok_or(Error::NoEvent)?;

        let mut start = None;
        let mut summary = None;
        let mut location = None;
        let mut attendees = Vec::new();
        let mut categories = Vec::new();

        for property in &event.properties {
            match property.name.as_str().to_ascii_uppercase().as_str() {
                "DTSTART" => start = Some(start_of(property)?),
                "SUMMARY" => summary = Some(unescape(property.val.as_str())),
                "LOCATION" => location = Some(unescape(property.val.as_str())),
                "ATTENDEE" => attendees.push(strip_mailto(property.val.as_str()).to_owned()),
                "CATEGORIES" => categories.extend(
                    property.val.as_str()
                        .split(',')
                        .map(str::trim)
                        .filter(|category| !category.is_empty())
                        .map(str::to_owned),
                ),
                _ => {}
            }
        }

        Ok(Self {
            start: start.ok_or(Error::NoStart)?,
            summary,
            location,
            attendees,
            categories,
        })
    }

    pub fn has_attendee(&self, email: &str) -> bool {
        self.attendees.iter().any(|attendee| attendee.eq_ignore_ascii_case(email))
    }
}

fn find_event<'a>(components: &'a [Component<'a>]) -> Option<&'a Component<'a>> {
    components.iter().find_map(|component| {
        if component.name.as_str().eq_ignore_ascii_case("VEVENT") {
            Some(component)
        } else {
            find_event(&component.components)
        }
    })
}

fn param<'a>(property: &'a Property<'a>, key: &str) -> Option<&'a str> {
    property.params
        .iter()
        .find(|param| param.key.as_str().eq_ignore_ascii_case(key))
        .and_then(|param| param.val.as_ref())
        .map(|val| val.as_str().trim_matches('"'))
}

/// Converts a `DTSTART` property into a UTC instant. Floating times, dates and
/// times in a zone that is not an IANA name (Windows names, custom `VTIMEZONE`s)
/// are taken as UTC.
fn start_of(property: &Property<'_>) -> Result<DateTime<Utc>, Error> {
    let value = property.val.as_str().trim();
    let invalid = || Error::InvalidStart(value.to_owned());

    let is_date = param(property, "VALUE").is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
        || value.len() == 8;

    let naive = if is_date {
        NaiveDate::parse_from_str(value, "%Y%m%d")
            .map_err(|_| invalid())?
            .and_time(NaiveTime::MIN)
    } else {
        NaiveDateTime::parse_from_str(value.trim_end_matches('Z'), "%Y%m%dT%H%M%S")
            .map_err(|_| invalid())?
    };

    if value.ends_with('Z') {
        return Ok(naive.and_utc());
    }

    let Some(tzid) = param(property, "TZID") else {
        return Ok(naive.and_utc());
    };

    match Tz::from_str(tzid) {
        Ok(tz) => tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|date_time| date_time.with_timezone(&Utc))
            .ok_or_else(invalid),
        Err(_) => {
            log::warn!("Unknown time zone {tzid:?}, reading {value} as UTC");
            Ok(naive.and_utc())
        }
    }
}

pub fn strip_mailto(value: &str) -> &str {
    let value = value.trim();

    match value.get(..MAILTO.len()) {
        Some(scheme) if scheme.eq_ignore_ascii_case(MAILTO) => &value[MAILTO.len()..],
        _ => value,
    }
}

fn unescape(text: &str) -> String {
    text.replace("\\n", "\n")
        .replace("\\N", "\n")
        .replace("\\,", ",")
        .replace("\\;", ";")
        .replace("\\\\", "\\")
}

/// Returns the payload with an `ATTENDEE` line for `email` appended to the
/// first `VEVENT`.
pub fn with_attendee(payload: &str, email: &str, display_name: Option<&str>) -> String {
    let attendee = match display_name.map(|name| name.replace('"', "")) {
        Some(name) if !name.trim().is_empty() => format!("ATTENDEE;CN=\"{}\":{MAILTO}{email}", name.trim()),
        _ => format!("ATTENDEE:{MAILTO}{email}"),
    };

    let mut lines = content_lines(payload);
    let mut depth = 0;
    let position = lines.iter().position(|line| {
        if line.eq_ignore_ascii_case("BEGIN:VEVENT") {
            depth += 1;
        }
        depth > 0 && line.eq_ignore_ascii_case("END:VEVENT")
    });

    match position {
        Some(index) => lines.insert(index, attendee),
        None => lines.push(attendee),
    }

    serialize(&lines)
}

/// Returns the payload without the first `ATTENDEE` line for `email`, or
/// `None` if the email is not an attendee.
pub fn without_attendee(payload: &str, email: &str) -> Option<String> {
    let mut lines = content_lines(payload);

    let index = lines.iter().position(|line| {
        split_content_line(line).is_some_and(|(name, value)| {
            name.eq_ignore_ascii_case("ATTENDEE") && strip_mailto(value).eq_ignore_ascii_case(email)
        })
    })?;

    lines.remove(index);

    Some(serialize(&lines))
}

fn content_lines(payload: &str) -> Vec<String> {
    parser::unfold(payload)
        .lines()
        .map(|line| line.trim_end_matches('\r').to_owned())
        .filter(|line| !line.is_empty())
        .collect()
}

/// Splits an unfolded content line into its name and value, skipping quoted
/// parameter values which may contain colons.
fn split_content_line(line: &str) -> Option<(&str, &str)> {
    let mut quoted = false;

    for (index, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ':' if !quoted => {
                let name = line[..index].split(';').next()?;
                return Some((name, &line[index + 1..]));
            }
            _ => {}
        }
    }

    None
}

fn serialize(lines: &[String]) -> String {
    let mut out = String::new();

    for line in lines {
        fold_into(&mut out, line);
    }

    out
}

fn fold_into(out: &mut String, line: &str) {
    let mut width = 0;

    for c in line.chars() {
        if width + c.len_utf8() > LINE_LIMIT {
            out.push_str("\r\n ");
            width = 1;
        }
        out.push(c);
        width += c.len_utf8();
    }

    out.push_str("\r\n");
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const EVENT: &str = "BEGIN:VCALENDAR\r
VERSION:2.0\r
PRODID:-//test//agenda//EN\r
BEGIN:VEVENT\r
UID:a@example.org\r
DTSTART;TZID=Europe/Paris:20300601T140000\r
DTEND;TZID=Europe/Paris:20300601T170000\r
SUMMARY:Atelier réparation\\, vélos\r
LOCATION:Local associatif\r
CATEGORIES:E1,foo\r
CATEGORIES:4P\r
ATTENDEE;CN=Alice:mailto:alice@example.org\r
ATTENDEE:MAILTO:bob@example.org\r
END:VEVENT\r
END:VCALENDAR\r
";

    #[test]
    fn parses_event_fields() {
        let data = EventData::parse(EVENT).unwrap();

        assert_eq!(data.start, Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap());
        assert_eq!(data.summary.as_deref(), Some("Atelier réparation, vélos"));
        assert_eq!(data.location.as_deref(), Some("Local associatif"));
        assert_eq!(data.attendees, ["alice@example.org", "bob@example.org"]);
        assert_eq!(data.categories, ["E1", "foo", "4P"]);
    }

    #[test]
    fn parses_utc_and_date_starts() {
        let utc = EVENT.replace("DTSTART;TZID=Europe/Paris:20300601T140000", "DTSTART:20300601T140000Z");
        let date = EVENT.replace("DTSTART;TZID=Europe/Paris:20300601T140000", "DTSTART;VALUE=DATE:20300601");

        assert_eq!(EventData::parse(&utc).unwrap().start, Utc.with_ymd_and_hms(2030, 6, 1, 14, 0, 0).unwrap());
        assert_eq!(EventData::parse(&date).unwrap().start, Utc.with_ymd_and_hms(2030, 6, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn unknown_time_zones_are_read_as_utc() {
        let windows = EVENT.replace("TZID=Europe/Paris:20300601T140000", "TZID=W. Europe Standard Time:20300601T140000");
        let custom = EVENT.replace("TZID=Europe/Paris:20300601T140000", "TZID=Office Local Time:20300601T140000");

        assert_eq!(EventData::parse(&windows).unwrap().start, Utc.with_ymd_and_hms(2030, 6, 1, 14, 0, 0).unwrap());
        assert_eq!(EventData::parse(&custom).unwrap().start, Utc.with_ymd_and_hms(2030, 6, 1, 14, 0, 0).unwrap());
    }

    #[test]
    fn rejects_event_without_start() {
        let payload = EVENT.replace("DTSTART;TZID=Europe/Paris:20300601T140000\r\n", "");

        assert_eq!(EventData::parse(&payload), Err(Error::NoStart));
    }

    #[test]
    fn adds_attendee_inside_the_event() {
        let payload = with_attendee(EVENT, "carol@example.org", None);
        let data = EventData::parse(&payload).unwrap();

        assert_eq!(data.attendees.last().map(String::as_str), Some("carol@example.org"));
        assert!(payload.contains("ATTENDEE:mailto:carol@example.org\r\nEND:VEVENT"));
    }

    #[test]
    fn adds_display_name_hint() {
        let payload = with_attendee(EVENT, "carol@example.org", Some("Carol \"C\" Doe"));

        assert!(payload.contains("ATTENDEE;CN=\"Carol C Doe\":mailto:carol@example.org"));
        assert!(EventData::parse(&payload).unwrap().has_attendee("carol@example.org"));
    }

    #[test]
    fn removes_first_matching_attendee() {
        let payload = without_attendee(EVENT, "Bob@Example.org").unwrap();
        let data = EventData::parse(&payload).unwrap();

        assert_eq!(data.attendees, ["alice@example.org"]);
        assert_eq!(without_attendee(EVENT, "nobody@example.org"), None);
    }

    #[test]
    fn folds_long_lines() {
        let name = "x".repeat(120);
        let payload = with_attendee(EVENT, &format!("{name}@example.org"), None);

        assert!(payload.split("\r\n").all(|line| line.len() <= LINE_LIMIT));
        assert!(EventData::parse(&payload).unwrap().has_attendee(&format!("{name}@example.org")));
    }

    #[test]
    fn quoted_colons_do_not_split_lines() {
        assert_eq!(
            split_content_line("ATTENDEE;CN=\"a:b\":mailto:x@example.org"),
            Some(("ATTENDEE", "mailto:x@example.org")),
        );
    }
}
