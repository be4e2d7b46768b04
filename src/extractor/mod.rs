//! Scheduling data extraction from a raw When2Meet page.
//!
//! The page embeds its data as script assignments (`PeopleNames[i] = '...'`,
//! `TimeOfSlot[j] = ...`, `AvailableAtSlot[j].push(...)`). Those are picked up
//! by the rule table in [`rules`]; nothing else about the markup is parsed.

pub mod rules;
pub mod sparse;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use rules::{Field, Value};
use sparse::SparseArray;

static TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<title[^>]*>([^<]+)</title>").expect("title pattern is valid")
});

static SITE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*[-–—]\s*when2meet\s*$").expect("suffix pattern is valid")
});

pub const SCHEMA_VERSION: u32 = 1;

/// Scheduling data reconstructed from one page.
///
/// Serialized with the compact keys clients expect: `v`, `e`, `n`, `i`,
/// `a`, `t`. Gaps in the index-addressed arrays serialize as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDataset {
    #[serde(rename = "v")]
    version: u32,
    #[serde(rename = "e")]
    event_name: String,
    #[serde(rename = "n")]
    participant_names: Vec<Option<String>>,
    #[serde(rename = "i")]
    participant_ids: Vec<Option<i64>>,
    #[serde(rename = "a")]
    availability: Vec<Vec<i64>>,
    #[serde(rename = "t")]
    time_slots: Vec<Option<i64>>,
}

impl ScheduleDataset {
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    pub fn participant_names(&self) -> &[Option<String>] {
        &self.participant_names
    }

    pub fn participant_ids(&self) -> &[Option<i64>] {
        &self.participant_ids
    }

    /// One entry per time slot; each holds the participants available then.
    pub fn availability(&self) -> &[Vec<i64>] {
        &self.availability
    }

    pub fn time_slots(&self) -> &[Option<i64>] {
        &self.time_slots
    }
}

/// Page title with the trailing `- When2meet` site name removed.
pub fn event_name(html: &str) -> String {
    let raw = TITLE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or_default();

    SITE_SUFFIX.replace(raw, "").trim().to_string()
}

/// Rebuild the scheduling dataset embedded in `html`.
///
/// Returns `None` when the page carries no participant names or no time
/// slots, which usually means the page layout changed or the event is empty.
pub fn extract(html: &str) -> Option<ScheduleDataset> {
    let mut names = SparseArray::new();
    let mut ids = SparseArray::new();
    let mut slots = SparseArray::new();
    let mut pushes = Vec::new();

    for found in rules::scan(html) {
        match (found.field, found.value) {
            (Field::ParticipantName, Value::Text(name)) => {
                names.set(found.index, name.to_string());
            }
            (Field::ParticipantId, Value::Integer(id)) => {
                ids.set(found.index, id);
            }
            (Field::TimeSlot, Value::Integer(time)) => {
                slots.set(found.index, time);
            }
            (Field::Availability, Value::Integer(participant)) => {
                pushes.push((found.index, participant));
            }
            _ => {}
        }
    }

    if names.is_empty() || slots.is_empty() {
        return None;
    }

    let mut availability: Vec<Vec<i64>> = vec![Vec::new(); slots.dense_len()];
    for (slot, participant) in pushes {
        if slot >= availability.len() {
            availability.resize_with(slot + 1, Vec::new);
        }
        let entry = &mut availability[slot];
        if !entry.contains(&participant) {
            entry.push(participant);
        }
    }

    Some(ScheduleDataset {
        version: SCHEMA_VERSION,
        event_name: event_name(html),
        participant_names: names.into_dense(),
        participant_ids: ids.into_dense(),
        availability,
        time_slots: slots.into_dense(),
    })
}
