//! Per-row residency and frequency bookkeeping.
//!
//! One record per global row, stored in a flat array indexed by row id, so every lookup
//! is a single index operation.

/// Where the authoritative value of a row currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowState {
    /// The row occupies this slot of the device buffer.
    Resident(usize),
    NotResident,
}

/// Eviction priority of one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencyRecord {
    /// Access count, seeded from the frequency ranking when one is supplied.
    pub count: u64,
    /// Logical tick of the last lookup that touched the row; `0` means never.
    pub last_access: u64,
}

#[derive(Debug, Clone, Copy)]
struct RowRecord {
    state: RowState,
    freq: FrequencyRecord,
}

#[derive(Debug, Clone)]
pub(crate) struct RowTable {
    records: Vec<RowRecord>,
}

impl RowTable {
    pub(crate) fn new(num_rows: usize, ranking: Option<&[u64]>) -> Self {
        let records = (0..num_rows)
            .map(|row| RowRecord {
                state: RowState::NotResident,
                freq: FrequencyRecord {
                    count: ranking.map_or(0, |r| r[row]),
                    last_access: 0,
                },
            })
            .collect();
        Self { records }
    }

    pub(crate) fn state(&self, row: usize) -> Option<RowState> {
        self.records.get(row).map(|r| r.state)
    }

    pub(crate) fn frequency(&self, row: usize) -> Option<FrequencyRecord> {
        self.records.get(row).map(|r| r.freq)
    }

    pub(crate) fn slot(&self, row: usize) -> Option<usize> {
        match self.state(row) {
            Some(RowState::Resident(slot)) => Some(slot),
            _ => None,
        }
    }

    pub(crate) fn bind(&mut self, row: usize, slot: usize) {
        self.records[row].state = RowState::Resident(slot);
    }

    pub(crate) fn unbind(&mut self, row: usize) {
        self.records[row].state = RowState::NotResident;
    }

    pub(crate) fn touch(&mut self, row: usize, tick: u64) {
        let freq = &mut self.records[row].freq;
        freq.count = freq.count.saturating_add(1);
        freq.last_access = tick;
    }

    /// Ordering key for eviction: the smallest key is evicted first.
    ///
    /// Lowest count first, then the least recently accessed, then the lowest row id, so
    /// the choice never depends on slot layout or hash order.
    pub(crate) fn eviction_key(&self, row: usize) -> (u64, u64, usize) {
        let freq = self.records[row].freq;
        (freq.count, freq.last_access, row)
    }
}
