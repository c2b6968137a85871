// Copyright (c) 2023 Huawei Device Co., Ltd.
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Header field tables.
//!
//! Indexed representations resolve against a single index space composed of
//! two tables. The dynamic table is a per-connection, size-bounded ring of
//! previously seen header fields, addressable by age: index 1 is always the
//! most recently inserted live entry. The static table is a predefined
//! constant list addressed past the end of the dynamic table.
//!
//! Dynamic table entries additionally carry the reference-set membership
//! flag and the emitted-this-block flag used by the decoder; keeping the
//! flags on the entries makes eviction drop the membership with the entry.

use std::collections::VecDeque;

/// Extra bytes charged to each dynamic table entry on top of its name and
/// value lengths, accounting for the per-entry bookkeeping overhead.
pub const HEADER_ENTRY_OVERHEAD: usize = 32;

/// One header field stored in the dynamic table.
///
/// The name and value octets are immutable once the entry is inserted; only
/// the two block-keeping flags change afterwards.
pub struct HeaderEntry {
    name: Vec<u8>,
    value: Vec<u8>,
    pub(crate) in_reference_set: bool,
    pub(crate) emitted: bool,
}

impl HeaderEntry {
    /// Creates an entry outside the reference set.
    pub fn new(name: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            name,
            value,
            in_reference_set: false,
            emitted: false,
        }
    }

    /// The header field name octets.
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// The header field value octets.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// The size cost charged against the table capacity.
    pub fn size(&self) -> usize {
        self.name.len() + self.value.len() + HEADER_ENTRY_OVERHEAD
    }

    /// Whether the entry currently belongs to the reference set.
    pub fn in_reference_set(&self) -> bool {
        self.in_reference_set
    }
}

/// The dynamic header field table.
///
/// Entries are kept in first-in, first-out order and evicted oldest first
/// whenever an insertion needs room. An entry whose own cost exceeds the
/// whole capacity clears the table instead of being inserted. The table can
/// contain duplicate entries; duplicates are not an error.
pub struct DynamicTable {
    queue: VecDeque<HeaderEntry>,
    curr_size: usize,
    capacity: usize,
}

impl DynamicTable {
    /// Creates a `DynamicTable` with the given capacity in bytes. The slot
    /// budget follows from the capacity: each entry costs at least
    /// `HEADER_ENTRY_OVERHEAD` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(max_entries(capacity)),
            curr_size: 0,
            capacity,
        }
    }

    /// The number of live entries.
    pub fn length(&self) -> usize {
        self.queue.len()
    }

    /// The sum of the size costs of all live entries.
    pub fn size(&self) -> usize {
        self.curr_size
    }

    /// The maximum total size cost the table may hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Gets the entry at the given age rank. Rank 1 is the newest entry and
    /// rank `length()` the oldest.
    pub fn get_entry(&self, index: usize) -> Option<&HeaderEntry> {
        match index {
            0 => None,
            _ => self.queue.get(index - 1),
        }
    }

    pub(crate) fn get_entry_mut(&mut self, index: usize) -> Option<&mut HeaderEntry> {
        match index {
            0 => None,
            _ => self.queue.get_mut(index - 1),
        }
    }

    /// Gets the lowest age rank whose entry name equals `name`.
    pub fn get_index(&self, name: &[u8]) -> Option<usize> {
        self.queue
            .iter()
            .position(|entry| fixed_time_eq(&entry.name, name))
            .map(|pos| pos + 1)
    }

    /// Gets the lowest age rank whose entry name and value both match.
    pub fn get_index_with_value(&self, name: &[u8], value: &[u8]) -> Option<usize> {
        self.queue
            .iter()
            .position(|entry| {
                let name_matches = fixed_time_eq(&entry.name, name);
                let value_matches = fixed_time_eq(&entry.value, value);
                name_matches && value_matches
            })
            .map(|pos| pos + 1)
    }

    /// Inserts an entry as the newest, evicting the oldest entries until it
    /// fits. An entry larger than the whole capacity clears the table and is
    /// dropped.
    pub fn add(&mut self, entry: HeaderEntry) {
        let entry_size = entry.size();
        if entry_size > self.capacity {
            self.clear();
            return;
        }
        while self.curr_size + entry_size > self.capacity {
            self.remove();
        }
        self.curr_size += entry_size;
        self.queue.push_front(entry);
    }

    /// Evicts and returns the oldest entry.
    pub fn remove(&mut self) -> Option<HeaderEntry> {
        let removed = self.queue.pop_back()?;
        self.curr_size -= removed.size();
        Some(removed)
    }

    /// Drops all entries.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.curr_size = 0;
    }

    /// Sets a new capacity, evicting the oldest entries until the current
    /// size fits, and reallocates the slots to the new budget preserving
    /// entry order.
    pub fn set_capacity(&mut self, capacity: usize) {
        while self.curr_size > capacity {
            self.remove();
        }
        self.capacity = capacity;
        let mut slots = VecDeque::with_capacity(max_entries(capacity));
        slots.extend(self.queue.drain(..));
        self.queue = slots;
    }

    /// Iterates all entries mutably, newest first.
    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut HeaderEntry> + '_ {
        self.queue.iter_mut()
    }
}

fn max_entries(capacity: usize) -> usize {
    capacity.div_ceil(HEADER_ENTRY_OVERHEAD)
}

/// Byte string compare whose timing depends on the operand lengths only,
/// so that table lookups do not leak header contents.
fn fixed_time_eq(lhs: &[u8], rhs: &[u8]) -> bool {
    if lhs.len() != rhs.len() {
        return false;
    }
    let mut diff = 0u8;
    for (l, r) in lhs.iter().zip(rhs.iter()) {
        diff |= l ^ r;
    }
    diff == 0
}

/// The predefined static header field table.
///
/// A constant, 1-indexed list of common header fields. Indexed operations
/// address it past the dynamic table: combined index `length() + i` is
/// static entry `i`.
pub struct StaticTable;

impl StaticTable {
    /// The number of static table entries.
    pub const LENGTH: usize = 61;

    /// Gets the entry at `index`, which must be in `[1, Self::LENGTH]`.
    /// Callers range-check before calling; an out-of-range index is a
    /// programmer error and panics.
    pub fn entry(index: usize) -> (&'static [u8], &'static [u8]) {
        STATIC_ENTRIES[index - 1]
    }
}

const STATIC_ENTRIES: [(&[u8], &[u8]); StaticTable::LENGTH] = [
    (b":authority", b""),
    (b":method", b"GET"),
    (b":method", b"POST"),
    (b":path", b"/"),
    (b":path", b"/index.html"),
    (b":scheme", b"http"),
    (b":scheme", b"https"),
    (b":status", b"200"),
    (b":status", b"204"),
    (b":status", b"206"),
    (b":status", b"304"),
    (b":status", b"400"),
    (b":status", b"404"),
    (b":status", b"500"),
    (b"accept-charset", b""),
    (b"accept-encoding", b"gzip, deflate"),
    (b"accept-language", b""),
    (b"accept-ranges", b""),
    (b"accept", b""),
    (b"access-control-allow-origin", b""),
    (b"age", b""),
    (b"allow", b""),
    (b"authorization", b""),
    (b"cache-control", b""),
    (b"content-disposition", b""),
    (b"content-encoding", b""),
    (b"content-language", b""),
    (b"content-length", b""),
    (b"content-location", b""),
    (b"content-range", b""),
    (b"content-type", b""),
    (b"cookie", b""),
    (b"date", b""),
    (b"etag", b""),
    (b"expect", b""),
    (b"expires", b""),
    (b"from", b""),
    (b"host", b""),
    (b"if-match", b""),
    (b"if-modified-since", b""),
    (b"if-none-match", b""),
    (b"if-range", b""),
    (b"if-unmodified-since", b""),
    (b"last-modified", b""),
    (b"link", b""),
    (b"location", b""),
    (b"max-forwards", b""),
    (b"proxy-authenticate", b""),
    (b"proxy-authorization", b""),
    (b"range", b""),
    (b"referer", b""),
    (b"refresh", b""),
    (b"retry-after", b""),
    (b"server", b""),
    (b"set-cookie", b""),
    (b"strict-transport-security", b""),
    (b"transfer-encoding", b""),
    (b"user-agent", b""),
    (b"vary", b""),
    (b"via", b""),
    (b"www-authenticate", b""),
];

#[cfg(test)]
mod ut_dynamic_table {
    use super::{DynamicTable, HeaderEntry, StaticTable};

    fn entry(name: &str, value: &str) -> HeaderEntry {
        HeaderEntry::new(name.as_bytes().to_vec(), value.as_bytes().to_vec())
    }

    /// UT test cases for `DynamicTable::with_capacity`.
    ///
    /// # Brief
    /// 1. Calls `DynamicTable::with_capacity` to create a `DynamicTable`.
    /// 2. Checks the results.
    #[test]
    fn ut_dynamic_table_with_capacity() {
        let table = DynamicTable::with_capacity(4096);
        assert_eq!(table.length(), 0);
        assert_eq!(table.size(), 0);
        assert_eq!(table.capacity(), 4096);
    }

    /// UT test cases for `DynamicTable::add` and `DynamicTable::get_entry`.
    ///
    /// # Brief
    /// 1. Creates a `DynamicTable`.
    /// 2. Calls `DynamicTable::add` to insert entries.
    /// 3. Checks sizes, age ranks and eviction order.
    #[test]
    fn ut_dynamic_table_add() {
        let mut table = DynamicTable::with_capacity(100);
        assert!(table.get_entry(0).is_none());
        assert!(table.get_entry(1).is_none());

        // Each entry costs 4 + 4 + 32 = 40 bytes.
        table.add(entry("aaaa", "AAAA"));
        assert_eq!(table.length(), 1);
        assert_eq!(table.size(), 40);

        table.add(entry("bbbb", "BBBB"));
        assert_eq!(table.length(), 2);
        assert_eq!(table.size(), 80);

        // The third insertion exceeds the capacity and evicts the oldest.
        table.add(entry("cccc", "CCCC"));
        assert_eq!(table.length(), 2);
        assert_eq!(table.size(), 80);
        assert_eq!(table.get_entry(1).unwrap().name(), b"cccc");
        assert_eq!(table.get_entry(2).unwrap().name(), b"bbbb");
        assert!(table.get_entry(3).is_none());
    }

    /// UT test cases for `DynamicTable::add` with an oversized entry.
    ///
    /// # Brief
    /// 1. Creates a `DynamicTable` holding one entry.
    /// 2. Adds an entry whose own cost exceeds the capacity.
    /// 3. Checks that the table is cleared and the entry dropped.
    #[test]
    fn ut_dynamic_table_add_oversized() {
        let mut table = DynamicTable::with_capacity(64);
        table.add(entry("name", "value"));
        assert_eq!(table.length(), 1);

        table.add(entry("oversized-name", "an-oversized-header-value"));
        assert_eq!(table.length(), 0);
        assert_eq!(table.size(), 0);
    }

    /// UT test cases for `DynamicTable::get_index` and
    /// `DynamicTable::get_index_with_value`.
    ///
    /// # Brief
    /// 1. Creates a `DynamicTable` with duplicate names.
    /// 2. Looks entries up by name and by name plus value.
    /// 3. Checks that the youngest match is returned.
    #[test]
    fn ut_dynamic_table_get_index() {
        let mut table = DynamicTable::with_capacity(4096);
        table.add(entry("name", "first"));
        table.add(entry("other", "second"));
        table.add(entry("name", "third"));

        assert_eq!(table.get_index(b"name"), Some(1));
        assert_eq!(table.get_index(b"other"), Some(2));
        assert_eq!(table.get_index(b"missing"), None);

        assert_eq!(table.get_index_with_value(b"name", b"first"), Some(3));
        assert_eq!(table.get_index_with_value(b"name", b"third"), Some(1));
        assert_eq!(table.get_index_with_value(b"name", b"missing"), None);
    }

    /// UT test cases for `DynamicTable::remove`.
    ///
    /// # Brief
    /// 1. Creates a `DynamicTable` with two entries.
    /// 2. Calls `DynamicTable::remove` repeatedly.
    /// 3. Checks that the oldest entry leaves first.
    #[test]
    fn ut_dynamic_table_remove() {
        let mut table = DynamicTable::with_capacity(4096);
        table.add(entry("old", "1"));
        table.add(entry("new", "2"));

        assert_eq!(table.remove().unwrap().name(), b"old");
        assert_eq!(table.remove().unwrap().name(), b"new");
        assert!(table.remove().is_none());
        assert_eq!(table.size(), 0);
    }

    /// UT test cases for `DynamicTable::set_capacity`.
    ///
    /// # Brief
    /// 1. Creates a `DynamicTable` with three entries.
    /// 2. Shrinks the capacity twice, then to zero.
    /// 3. Checks eviction of the oldest entries, preserved order and the
    ///    final clear.
    #[test]
    fn ut_dynamic_table_set_capacity() {
        let mut table = DynamicTable::with_capacity(200);
        table.add(entry("aaaa", "AAAA"));
        table.add(entry("bbbb", "BBBB"));
        table.add(entry("cccc", "CCCC"));
        assert_eq!(table.size(), 120);

        table.set_capacity(100);
        assert_eq!(table.capacity(), 100);
        assert_eq!(table.length(), 2);
        assert_eq!(table.get_entry(1).unwrap().name(), b"cccc");
        assert_eq!(table.get_entry(2).unwrap().name(), b"bbbb");

        table.set_capacity(0);
        assert_eq!(table.length(), 0);
        assert_eq!(table.size(), 0);
    }

    /// UT test cases for `StaticTable`.
    ///
    /// # Brief
    /// 1. Reads entries across the whole static table range.
    /// 2. Checks the boundary entries and the table length.
    #[test]
    fn ut_static_table() {
        assert_eq!(StaticTable::entry(1), (b":authority" as &[u8], b"" as &[u8]));
        assert_eq!(StaticTable::entry(2), (b":method" as &[u8], b"GET" as &[u8]));
        assert_eq!(StaticTable::entry(4), (b":path" as &[u8], b"/" as &[u8]));
        assert_eq!(
            StaticTable::entry(StaticTable::LENGTH),
            (b"www-authenticate" as &[u8], b"" as &[u8])
        );
        for index in 1..=StaticTable::LENGTH {
            assert!(!StaticTable::entry(index).0.is_empty());
        }
    }
}
