//! Text encoding of marker events
//!
//! One event per line. Names shorter than [`MARKER_NAME_WIDTH`] are padded
//! into columns so raw files stay readable; longer names fall back to fields
//! separated by [`FIELD_SEPARATOR`]. Either way the field order is fixed and
//! names never contain raw whitespace, so a whitespace tokenizer recovers
//! every field:
//!
//! ```text
//! clBeginPerfMarker   <name>   <timestamp>   <group>
//! clEndPerfMarker     <timestamp>
//! clEndPerfMarkerEx   <timestamp>   <name>   <group>
//! ```

use crate::domain::Timestamp;
use perfmarker_common::{
    FIELD_SEPARATOR, FIELD_WIDTH, MARKER_NAME_WIDTH, SPACE_ESCAPE, TAG_BEGIN, TAG_END, TAG_END_EX,
};
use std::fmt::Write as _;

/// Replace whitespace so a name or group stays a single token on one line
///
/// Spaces become the viewer's `&nbsp;` token; every other whitespace
/// character (tab, line breaks, Unicode spaces) becomes a numeric `&#N;`
/// entity.
#[must_use]
pub fn escape_whitespace(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            ' ' => escaped.push_str(SPACE_ESCAPE),
            c if c.is_whitespace() => {
                let _ = write!(escaped, "&#{};", u32::from(c));
            }
            c => escaped.push(c),
        }
    }
    escaped
}

/// Inverse of [`escape_whitespace`]
///
/// Numeric entities are only decoded when they name a whitespace character.
#[must_use]
pub fn unescape_whitespace(text: &str) -> String {
    let text = text.replace(SPACE_ESCAPE, " ");
    let mut unescaped = String::with_capacity(text.len());
    let mut rest = text.as_str();

    while let Some(start) = rest.find("&#") {
        unescaped.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        let entity = tail.split_once(';').and_then(|(code, after)| {
            let c = code.parse::<u32>().ok().and_then(char::from_u32)?;
            c.is_whitespace().then_some((c, after))
        });
        match entity {
            Some((c, after)) => {
                unescaped.push(c);
                rest = after;
            }
            None => {
                unescaped.push_str("&#");
                rest = tail;
            }
        }
    }

    unescaped.push_str(rest);
    unescaped
}

/// A marker event ready to be written
///
/// Names and groups are expected to be escaped already.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedEvent<'a> {
    Begin { name: &'a str, group: &'a str, timestamp: Timestamp },
    /// Closes the innermost marker without renaming it
    End { timestamp: Timestamp },
    /// Closes the innermost marker, replacing its name and group
    EndNamed { name: &'a str, group: &'a str, timestamp: Timestamp },
}

impl EncodedEvent<'_> {
    /// Encode as one newline-terminated record
    #[must_use]
    pub fn to_line(&self) -> String {
        let mut line = String::with_capacity(128);
        let w = FIELD_WIDTH;
        let nw = MARKER_NAME_WIDTH;
        let sep = FIELD_SEPARATOR;

        // Writing into a String cannot fail.
        let _ = match *self {
            EncodedEvent::Begin { name, group, timestamp } if fits_column(name) => {
                writeln!(line, "{TAG_BEGIN:<w$}{name:<nw$}{timestamp:<w$}{sep}{group}")
            }
            EncodedEvent::Begin { name, group, timestamp } => {
                writeln!(line, "{TAG_BEGIN}{sep}{name}{sep}{timestamp}{sep}{group}")
            }
            EncodedEvent::End { timestamp } => writeln!(line, "{TAG_END:<w$}{timestamp:<w$}"),
            EncodedEvent::EndNamed { name, group, timestamp } if fits_column(name) => {
                writeln!(line, "{TAG_END_EX:<w$}{timestamp:<w$}{name:<nw$}{sep}{group}")
            }
            EncodedEvent::EndNamed { name, group, timestamp } => {
                writeln!(line, "{TAG_END_EX}{sep}{timestamp:<w$}{sep}{name}{sep}{group}")
            }
        };

        line
    }
}

/// Short names are column aligned; width counts characters, matching `{:<n$}`
fn fits_column(name: &str) -> bool {
    name.chars().count() < MARKER_NAME_WIDTH
}
