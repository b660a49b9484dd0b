use serde::{Deserialize, Serialize};

/// Per-sample state. A redundant sample is still valid but excluded from the
/// active view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFlag {
    Valid,
    Redundant,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SampleRecord<V> {
    time: f64,
    value: V,
    flag: SampleFlag,
}

/// Time-ordered samples of one axis. Filters only toggle flags or adjust
/// values in place; the table is never resized or reordered.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTable<V> {
    records: Vec<SampleRecord<V>>,
}

impl<V> SampleTable<V> {
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = (f64, V)>,
    {
        Self {
            records: records
                .into_iter()
                .map(|(time, value)| SampleRecord {
                    time,
                    value,
                    flag: SampleFlag::Valid,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn time(&self, index: usize) -> f64 {
        self.records[index].time
    }

    pub fn value(&self, index: usize) -> &V {
        &self.records[index].value
    }

    pub fn value_mut(&mut self, index: usize) -> &mut V {
        &mut self.records[index].value
    }

    pub fn flag(&self, index: usize) -> SampleFlag {
        self.records[index].flag
    }

    pub fn flags(&self) -> Vec<SampleFlag> {
        self.records.iter().map(|r| r.flag).collect()
    }

    /// Valid or redundant.
    pub fn is_valid(&self, index: usize) -> bool {
        self.records[index].flag != SampleFlag::Invalid
    }

    /// Valid and not redundant.
    pub fn is_active(&self, index: usize) -> bool {
        self.records[index].flag == SampleFlag::Valid
    }

    /// Returns `true` if the flag changed.
    pub fn invalidate(&mut self, index: usize) -> bool {
        self.set_flag(index, SampleFlag::Invalid, |_| true)
    }

    pub fn mark_redundant(&mut self, index: usize) -> bool {
        self.set_flag(index, SampleFlag::Redundant, |f| f == SampleFlag::Valid)
    }

    pub fn mark_required(&mut self, index: usize) -> bool {
        self.set_flag(index, SampleFlag::Valid, |f| f == SampleFlag::Redundant)
    }

    fn set_flag<F>(&mut self, index: usize, flag: SampleFlag, allowed: F) -> bool
    where
        F: Fn(SampleFlag) -> bool,
    {
        let record = &mut self.records[index];
        if record.flag == flag || !allowed(record.flag) {
            return false;
        }
        record.flag = flag;
        true
    }

    pub fn valid_indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(move |&i| self.is_valid(i))
    }

    pub fn active_indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(move |&i| self.is_active(i))
    }

    pub fn valid_count(&self) -> usize {
        self.valid_indices().count()
    }

    /// First valid index at or after `from`.
    pub fn next_valid(&self, from: usize) -> Option<usize> {
        (from..self.len()).find(|&i| self.is_valid(i))
    }

    /// Last valid index at or before `to`.
    pub fn prev_valid(&self, to: usize) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        (0..=to.min(self.len() - 1)).rev().find(|&i| self.is_valid(i))
    }

    pub fn first_valid(&self) -> Option<usize> {
        self.next_valid(0)
    }

    pub fn last_valid(&self) -> Option<usize> {
        self.records.iter().rposition(|r| r.flag != SampleFlag::Invalid)
    }

    pub fn first_active(&self) -> Option<usize> {
        self.records.iter().position(|r| r.flag == SampleFlag::Valid)
    }

    pub fn last_active(&self) -> Option<usize> {
        self.records.iter().rposition(|r| r.flag == SampleFlag::Valid)
    }
}
