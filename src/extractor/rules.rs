//! Recognized script assignments.
//!
//! Each rule is a pattern with an `index` and a `value` capture, tagged with
//! the dataset field it feeds. Adding a field means adding a row here.

use regex::Regex;
use std::sync::LazyLock;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    ParticipantName,
    ParticipantId,
    TimeSlot,
    Availability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Integer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value<'h> {
    Text(&'h str),
    Integer(i64),
}

/// Largest index a page may address. Anything above is ignored.
pub const MAX_INDEX: usize = 100_000;

pub struct Rule {
    pub field: Field,
    pub kind: ValueKind,
    pattern: Regex,
}

/// One recognized assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleMatch<'h> {
    pub field: Field,
    pub index: usize,
    pub value: Value<'h>,
}

const RULE_TABLE: &[(Field, ValueKind, &str)] = &[
    // PeopleNames[3] = 'Alice';
    (
        Field::ParticipantName,
        ValueKind::Text,
        r"PeopleNames\[(?P<index>[0-9]+)\]\s*=\s*'(?P<value>[^']+)'",
    ),
    // PeopleIDs[3] = 81234;
    (
        Field::ParticipantId,
        ValueKind::Integer,
        r"PeopleIDs\[(?P<index>[0-9]+)\]\s*=\s*(?P<value>[0-9]+)",
    ),
    // TimeOfSlot[0] = 1700000000;
    (
        Field::TimeSlot,
        ValueKind::Integer,
        r"TimeOfSlot\[(?P<index>[0-9]+)\]\s*=\s*(?P<value>[0-9]+)",
    ),
    // AvailableAtSlot[0].push(81234);
    (
        Field::Availability,
        ValueKind::Integer,
        r"AvailableAtSlot\[(?P<index>[0-9]+)\]\.push\((?P<value>[0-9]+)\)",
    ),
];

pub static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    RULE_TABLE
        .iter()
        .map(|&(field, kind, pattern)| Rule {
            field,
            kind,
            pattern: Regex::new(pattern).expect("extraction rule pattern is valid"),
        })
        .collect()
});

impl Rule {
    /// All matches of this rule in document order. Matches whose index or
    /// value cannot be represented are skipped.
    pub fn matches<'a>(&'a self, html: &'a str) -> impl Iterator<Item = RuleMatch<'a>> + 'a {
        self.pattern.captures_iter(html).filter_map(move |caps| {
            let index = caps.name("index")?.as_str().parse::<usize>().ok()?;
            if index > MAX_INDEX {
                return None;
            }

            let raw = caps.name("value")?.as_str();
            let value = match self.kind {
                ValueKind::Text => Value::Text(raw),
                ValueKind::Integer => Value::Integer(raw.parse::<i64>().ok()?),
            };

            Some(RuleMatch {
                field: self.field,
                index,
                value,
            })
        })
    }
}

/// Runs every rule independently over `html`, rule by rule.
pub fn scan(html: &str) -> impl Iterator<Item = RuleMatch<'_>> {
    RULES.iter().flat_map(move |rule| rule.matches(html))
}
