//! Choosing the canonical record between two that share a key.
//!
//! Rules are tried in order and the first one that decides wins:
//!
//! 1. both identifiers carry a timestamp and they differ: the later one wins;
//! 2. exactly one identifier contains the marker substring: that one wins;
//! 3. the record seen first wins.

use lazy_static::lazy_static;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;

lazy_static! {
    /// Index pair (`ACGTAC-GTTACA_`) followed by a hex run hash.
    static ref INDEX_HASH_REGEX: Regex =
        Regex::new(r"[ACGT]+-[ACGT]+[-_]").expect("index hash regex is valid");
    static ref DATE_REGEX: Regex =
        Regex::new(r"[0-9]{4}-[0-9]{2}-[0-9]{2}").expect("date regex is valid");
}

/// Where a timestamp token was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampSource {
    IndexHash,
    Date,
}

/// Timestamp-like token embedded in a record identifier.
///
/// Index hashes made of hex digits order by numeric value, at any length.
/// Every other token orders lexicographically, which is chronological for
/// ISO dates, and sorts below all numeric hashes.
#[derive(Debug, Clone)]
pub struct Timestamp {
    pub raw: String,
    pub source: TimestampSource,
}

impl Timestamp {
    /// Extracts a timestamp token, preferring the index hash over a calendar date.
    pub fn extract(identifier: &str) -> Option<Timestamp> {
        if let Some(m) = INDEX_HASH_REGEX.find(identifier) {
            let token = identifier[m.end()..].split('_').next().unwrap_or("");
            if !token.is_empty() {
                return Some(Timestamp {
                    raw: token.to_string(),
                    source: TimestampSource::IndexHash,
                });
            }
        }
        DATE_REGEX.find(identifier).map(|m| Timestamp {
            raw: m.as_str().to_string(),
            source: TimestampSource::Date,
        })
    }

    /// Hex digits without leading zeros, lowercased, for a numeric hash.
    fn hex_digits(&self) -> Option<String> {
        let is_hex = !self.raw.is_empty() && self.raw.bytes().all(|b| b.is_ascii_hexdigit());
        match self.source {
            TimestampSource::IndexHash if is_hex => {
                Some(self.raw.trim_start_matches('0').to_ascii_lowercase())
            }
            _ => None,
        }
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.hex_digits(), other.hex_digits()) {
            (Some(a), Some(b)) => a
                .len()
                .cmp(&b.len())
                .then_with(|| a.cmp(&b))
                .then_with(|| self.raw.cmp(&other.raw)),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => self.raw.cmp(&other.raw),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Which rule of the cascade decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreakRule {
    Timestamp,
    Marker,
    FirstSeen,
}

impl TieBreakRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            TieBreakRule::Timestamp => "newer_timestamp",
            TieBreakRule::Marker => "marker",
            TieBreakRule::FirstSeen => "first_seen",
        }
    }
}

impl fmt::Display for TieBreakRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Existing,
    Incoming,
}

/// Result of comparing the current winner against an incoming record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TieBreak {
    pub winner: Winner,
    pub rule: TieBreakRule,
    pub existing_timestamp: Option<Timestamp>,
    pub incoming_timestamp: Option<Timestamp>,
}

fn has_marker(identifier: &str, marker: &str) -> bool {
    !marker.is_empty() && identifier.to_lowercase().contains(&marker.to_lowercase())
}

/// Decides between the record already holding a key and a newcomer.
///
/// # Arguments
///
/// * `existing` - Identifier of the current winner
/// * `incoming` - Identifier of the record being offered
/// * `marker` - Case-insensitive substring for the second rule; empty disables it
///
/// # Returns
///
/// * The winner, the rule that decided and both extracted timestamps
pub fn break_tie(existing: &str, incoming: &str, marker: &str) -> TieBreak {
    let existing_timestamp = Timestamp::extract(existing);
    let incoming_timestamp = Timestamp::extract(incoming);

    let by_timestamp = match (&existing_timestamp, &incoming_timestamp) {
        (Some(e), Some(i)) => match i.cmp(e) {
            Ordering::Greater => Some(Winner::Incoming),
            Ordering::Less => Some(Winner::Existing),
            Ordering::Equal => None,
        },
        _ => None,
    };

    let (winner, rule) = if let Some(winner) = by_timestamp {
        (winner, TieBreakRule::Timestamp)
    } else {
        match (has_marker(existing, marker), has_marker(incoming, marker)) {
            (true, false) => (Winner::Existing, TieBreakRule::Marker),
            (false, true) => (Winner::Incoming, TieBreakRule::Marker),
            _ => (Winner::Existing, TieBreakRule::FirstSeen),
        }
    };

    TieBreak {
        winner,
        rule,
        existing_timestamp,
        incoming_timestamp,
    }
}
