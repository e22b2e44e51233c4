//! Publish-date normalization for feed items.
//!
//! Feeds disagree wildly on how `<pubDate>` is written. [`parse_timestamp`]
//! tries a fixed, ordered list of [`Layout`]s and returns the first one that
//! parses. The order is part of the contract: a string that is valid under
//! two layouts always resolves to the earlier one.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc, Weekday};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimestampError {
    /// No known layout matched the input
    #[error("Unable to parse timestamp {0:?}")]
    Unparseable(String),
}

/// A timestamp layout understood by the normalizer.
///
/// Variants are declared in priority order; [`Layout::ORDERED`] mirrors it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// `Mon Jan _2 15:04:05 2006`
    Ansic,
    /// `Mon Jan _2 15:04:05 MST 2006`
    UnixDate,
    /// `Mon Jan 02 15:04:05 -0700 2006`
    RubyDate,
    /// `02 Jan 06 15:04 MST`
    Rfc822,
    /// `02 Jan 06 15:04 -0700`
    Rfc822Z,
    /// `Monday, 02-Jan-06 15:04:05 MST`
    Rfc850,
    /// `Mon, 02 Jan 2006 15:04:05 MST`
    Rfc1123,
    /// `Mon, 02 Jan 2006 15:04:05 -0700`
    Rfc1123Z,
    /// `2006-01-02T15:04:05Z07:00`
    Rfc3339,
    /// `2006-01-02T15:04:05.999999999Z07:00`
    Rfc3339Nano,
}

/// How a layout spells its leading weekday, if it has one.
#[derive(Clone, Copy)]
enum WeekdayField {
    None,
    /// `Mon`
    Short,
    /// `Mon,`
    ShortComma,
    /// `Monday,`
    LongComma,
}

/// How a layout spells its zone.
#[derive(Clone, Copy)]
enum ZoneField {
    /// No zone; the instant is read as UTC.
    None,
    /// Alphabetic abbreviation at this token index (after the weekday).
    Abbrev(usize),
    /// Numeric `-0700` offset, handled by `%z`.
    Numeric,
}

/// Token-level description of a layout that chrono cannot take as-is.
struct Shape {
    weekday: WeekdayField,
    zone: ZoneField,
    format: &'static str,
}

impl Layout {
    /// Every layout, in the order they are tried.
    pub const ORDERED: [Layout; 10] = [
        Layout::Ansic,
        Layout::UnixDate,
        Layout::RubyDate,
        Layout::Rfc822,
        Layout::Rfc822Z,
        Layout::Rfc850,
        Layout::Rfc1123,
        Layout::Rfc1123Z,
        Layout::Rfc3339,
        Layout::Rfc3339Nano,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Layout::Ansic => "ANSIC",
            Layout::UnixDate => "UnixDate",
            Layout::RubyDate => "RubyDate",
            Layout::Rfc822 => "RFC822",
            Layout::Rfc822Z => "RFC822Z",
            Layout::Rfc850 => "RFC850",
            Layout::Rfc1123 => "RFC1123",
            Layout::Rfc1123Z => "RFC1123Z",
            Layout::Rfc3339 => "RFC3339",
            Layout::Rfc3339Nano => "RFC3339Nano",
        }
    }

    /// Parse `raw` under this layout only.
    pub fn parse(self, raw: &str) -> Option<DateTime<Utc>> {
        match self.shape() {
            Some(shape) => shape.parse(raw),
            // RFC 3339 accepts an optional fractional second, so both variants
            // share one parser and the nano form is normally claimed by Rfc3339.
            None => DateTime::parse_from_rfc3339(raw.trim())
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }

    fn shape(self) -> Option<Shape> {
        let shape = match self {
            Layout::Ansic => Shape {
                weekday: WeekdayField::Short,
                zone: ZoneField::None,
                format: "%b %d %H:%M:%S %Y",
            },
            Layout::UnixDate => Shape {
                weekday: WeekdayField::Short,
                zone: ZoneField::Abbrev(3),
                format: "%b %d %H:%M:%S %z %Y",
            },
            Layout::RubyDate => Shape {
                weekday: WeekdayField::Short,
                zone: ZoneField::Numeric,
                format: "%b %d %H:%M:%S %z %Y",
            },
            Layout::Rfc822 => Shape {
                weekday: WeekdayField::None,
                zone: ZoneField::Abbrev(4),
                format: "%d %b %y %H:%M %z",
            },
            Layout::Rfc822Z => Shape {
                weekday: WeekdayField::None,
                zone: ZoneField::Numeric,
                format: "%d %b %y %H:%M %z",
            },
            Layout::Rfc850 => Shape {
                weekday: WeekdayField::LongComma,
                zone: ZoneField::Abbrev(2),
                format: "%d-%b-%y %H:%M:%S %z",
            },
            Layout::Rfc1123 => Shape {
                weekday: WeekdayField::ShortComma,
                zone: ZoneField::Abbrev(4),
                format: "%d %b %Y %H:%M:%S %z",
            },
            Layout::Rfc1123Z => Shape {
                weekday: WeekdayField::ShortComma,
                zone: ZoneField::Numeric,
                format: "%d %b %Y %H:%M:%S %z",
            },
            Layout::Rfc3339 | Layout::Rfc3339Nano => return None,
        };
        Some(shape)
    }
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Shape {
    fn parse(&self, raw: &str) -> Option<DateTime<Utc>> {
        let mut tokens: Vec<&str> = raw.split_whitespace().collect();

        let expects_weekday = !matches!(self.weekday, WeekdayField::None);
        if expects_weekday {
            if tokens.is_empty() || !self.is_weekday(tokens[0]) {
                return None;
            }
            tokens.remove(0);
        }

        let mut normalized: Vec<&str> = tokens;
        if let ZoneField::Abbrev(index) = self.zone {
            let offset = zone_offset(normalized.get(index)?)?;
            normalized[index] = offset;
        }
        let normalized = normalized.join(" ");

        match self.zone {
            ZoneField::None => NaiveDateTime::parse_from_str(&normalized, self.format)
                .ok()
                .map(|naive| naive.and_utc()),
            ZoneField::Abbrev(_) | ZoneField::Numeric => {
                DateTime::<FixedOffset>::parse_from_str(&normalized, self.format)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            }
        }
    }

    /// Weekday names are checked for spelling only. Feeds routinely pair a
    /// date with the wrong day, so the day is never cross-checked.
    fn is_weekday(&self, token: &str) -> bool {
        let (name, long) = match self.weekday {
            WeekdayField::None => return false,
            WeekdayField::Short => (token, false),
            WeekdayField::ShortComma => match token.strip_suffix(',') {
                Some(name) => (name, false),
                None => return false,
            },
            WeekdayField::LongComma => match token.strip_suffix(',') {
                Some(name) => (name, true),
                None => return false,
            },
        };
        let length_ok = if long { name.len() > 3 } else { name.len() == 3 };
        length_ok && name.parse::<Weekday>().is_ok()
    }
}

/// Numeric offset for an alphabetic zone abbreviation.
///
/// The RFC 822 zones carry their defined offsets, so `EST` is `-05:00` here
/// where Go's `time.Parse` would read it at a zero offset. Any other short
/// upper-case abbreviation is accepted as UTC.
///
/// Two-digit years go through chrono's `%y`, which puts `69` in 2069 rather
/// than Go's 1969.
fn zone_offset(abbrev: &str) -> Option<&'static str> {
    let offset = match abbrev {
        "Z" | "UT" | "UTC" | "GMT" => "+0000",
        "EST" => "-0500",
        "EDT" => "-0400",
        "CST" => "-0600",
        "CDT" => "-0500",
        "MST" => "-0700",
        "MDT" => "-0600",
        "PST" => "-0800",
        "PDT" => "-0700",
        other => {
            let plausible = (2..=5).contains(&other.len())
                && other.bytes().all(|b| b.is_ascii_uppercase());
            if !plausible {
                return None;
            }
            "+0000"
        }
    };
    Some(offset)
}

/// Parse a feed timestamp into a UTC instant.
///
/// # Errors
///
/// Returns [`TimestampError::Unparseable`] when no layout matches.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, TimestampError> {
    parse_timestamp_with_layout(raw).map(|(_, instant)| instant)
}

/// Like [`parse_timestamp`], also reporting which layout matched.
pub fn parse_timestamp_with_layout(raw: &str) -> Result<(Layout, DateTime<Utc>), TimestampError> {
    Layout::ORDERED
        .iter()
        .find_map(|layout| layout.parse(raw).map(|instant| (*layout, instant)))
        .ok_or_else(|| TimestampError::Unparseable(raw.to_string()))
}
