use super::SyncRecord;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Maximum number of records kept; the oldest is dropped on overflow.
pub const MAX_HISTORY: usize = 50;

/// Newest-first log of sync runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<SyncRecord>", into = "Vec<SyncRecord>")]
pub struct SyncHistory {
    records: VecDeque<SyncRecord>,
}

impl SyncHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: SyncRecord) {
        self.records.push_front(record);
        self.records.truncate(MAX_HISTORY);
    }

    pub fn latest(&self) -> Option<&SyncRecord> {
        self.records.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SyncRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn to_vec(&self) -> Vec<SyncRecord> {
        self.records.iter().cloned().collect()
    }
}

// Stored lists are assumed newest-first already
impl From<Vec<SyncRecord>> for SyncHistory {
    fn from(mut records: Vec<SyncRecord>) -> Self {
        records.truncate(MAX_HISTORY);
        Self {
            records: records.into(),
        }
    }
}

impl From<SyncHistory> for Vec<SyncRecord> {
    fn from(history: SyncHistory) -> Self {
        history.records.into()
    }
}
