use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::SuretyEvent;

/// Hash-chained journal entry for one published notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub entry_id: String,
    pub index: u64,
    pub recorded_at: DateTime<Utc>,
    pub event: SuretyEvent,
    pub previous_hash: Option<String>,
    pub entry_hash: String,
}

/// Append-only journal of every notification the engine has published.
///
/// No in-place mutation APIs are exposed; each entry commits to its
/// predecessor's hash so any edit breaks `verify_chain`.
#[derive(Debug, Default, Clone)]
pub struct EventJournal {
    entries: Vec<JournalEntry>,
}

impl EventJournal {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries with `index >= from`.
    pub fn since(&self, from: u64) -> &[JournalEntry] {
        let start = (from as usize).min(self.entries.len());
        &self.entries[start..]
    }

    pub fn append(&mut self, event: SuretyEvent) -> JournalEntry {
        let index = self.entries.len() as u64;
        let recorded_at = Utc::now();
        let previous_hash = self.entries.last().map(|entry| entry.entry_hash.clone());
        let entry_hash = compute_entry_hash(index, recorded_at, &event, previous_hash.as_deref());

        let entry = JournalEntry {
            entry_id: Uuid::new_v4().to_string(),
            index,
            recorded_at,
            event,
            previous_hash,
            entry_hash,
        };
        self.entries.push(entry.clone());
        entry
    }

    pub fn verify_chain(&self) -> bool {
        let mut previous_hash: Option<String> = None;
        for (expected_index, entry) in self.entries.iter().enumerate() {
            if entry.index != expected_index as u64 {
                return false;
            }
            let expected_hash = compute_entry_hash(
                entry.index,
                entry.recorded_at,
                &entry.event,
                previous_hash.as_deref(),
            );
            if entry.entry_hash != expected_hash || entry.previous_hash != previous_hash {
                return false;
            }
            previous_hash = Some(entry.entry_hash.clone());
        }
        true
    }
}

#[derive(Serialize)]
struct HashMaterial<'a> {
    index: u64,
    recorded_at: DateTime<Utc>,
    event: &'a SuretyEvent,
    previous_hash: Option<&'a str>,
}

fn compute_entry_hash(
    index: u64,
    recorded_at: DateTime<Utc>,
    event: &SuretyEvent,
    previous_hash: Option<&str>,
) -> String {
    let material = HashMaterial {
        index,
        recorded_at,
        event,
        previous_hash,
    };
    let bytes = serde_json::to_vec(&material).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}
