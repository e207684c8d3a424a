// Toccata
// Copyright (c) 2022-2024 The Project Toccata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The cue index: an append-only, positionally addressed array of (time, cluster position)
//! slots. Slots are loaded from a Cues element and synthesized during linear scans; the array is
//! never re-sorted after build.

/// Number of slots the index grows by when full.
const INDEX_CHUNK: usize = 1024;

/// One index slot.
#[derive(Copy, Clone, Debug)]
pub struct IndexEntry {
    /// The time of the cue in microseconds. -1 until known.
    pub time: i64,
    /// The absolute byte position of the cluster.
    pub position: i64,
    /// The track the cue applies to. -1 for a generic cue.
    pub track: i64,
    /// The ordinal of the block within the cluster. -1 if unknown.
    pub block_number: i64,
    /// Whether the cue lands on a keyframe.
    pub key: bool,
}

impl Default for IndexEntry {
    fn default() -> Self {
        IndexEntry { time: 0, position: -1, track: -1, block_number: -1, key: true }
    }
}

/// The cue index of a segment.
#[derive(Debug)]
pub struct SeekIndex {
    slots: Vec<IndexEntry>,
}

impl Default for SeekIndex {
    fn default() -> Self {
        SeekIndex::new()
    }
}

impl SeekIndex {
    pub fn new() -> Self {
        SeekIndex { slots: Vec::with_capacity(INDEX_CHUNK) }
    }

    /// Append a slot, growing the array by a fixed chunk when full.
    pub fn push(&mut self, slot: IndexEntry) {
        if self.slots.len() == self.slots.capacity() {
            self.slots.reserve_exact(INDEX_CHUNK);
        }
        self.slots.push(slot);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// All slots in insertion order.
    pub fn slots(&self) -> &[IndexEntry] {
        &self.slots
    }

    pub fn get(&self, i: usize) -> Option<&IndexEntry> {
        self.slots.get(i)
    }

    pub fn last(&self) -> Option<&IndexEntry> {
        self.slots.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut IndexEntry> {
        self.slots.last_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_growth_beyond_chunk() {
        let mut index = SeekIndex::new();
        for i in 0..2500 {
            index.push(IndexEntry { time: i, position: i * 100, ..Default::default() });
        }
        assert_eq!(index.len(), 2500);
        assert_eq!(index.get(2499).unwrap().time, 2499);

        // Positions are appended in file order and stay that way.
        for pair in index.slots().windows(2) {
            assert!(pair[0].position <= pair[1].position);
        }
    }

    #[test]
    fn verify_backfill_through_last_mut() {
        let mut index = SeekIndex::new();
        index.push(IndexEntry { time: -1, position: 512, ..Default::default() });
        if let Some(slot) = index.last_mut() {
            if slot.time == -1 {
                slot.time = 40_000;
                slot.key = false;
            }
        }
        assert_eq!(index.get(0).unwrap().time, 40_000);
        assert!(!index.get(0).unwrap().key);
    }
}
