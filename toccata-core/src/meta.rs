// Toccata
// Copyright (c) 2022-2024 The Project Toccata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `meta` module defines the metadata sink demuxers publish container metadata to.

use std::collections::HashMap;

/// Well-known metadata fields.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MetaKind {
    Title,
    Album,
    Artist,
    Genre,
    Copyright,
    TrackNumber,
    Description,
    Rating,
    Date,
    Url,
    Publisher,
    EncodedBy,
    TrackTotal,
}

/// A `MetaStore` collects the metadata of one media item.
///
/// Well-known fields are keyed by [`MetaKind`]; anything else is kept as an "extra" under its raw
/// name. Setting a known field twice keeps the first value, matching the first-match-wins policy
/// of the tag mapping tables that feed this store.
#[derive(Debug, Default)]
pub struct MetaStore {
    values: HashMap<MetaKind, String>,
    extra: Vec<(String, String)>,
}

impl MetaStore {
    pub fn new() -> Self {
        MetaStore::default()
    }

    /// Set a well-known field. The first value set for a field wins.
    pub fn set(&mut self, kind: MetaKind, value: &str) {
        self.values.entry(kind).or_insert_with(|| value.to_string());
    }

    /// Get a well-known field.
    pub fn get(&self, kind: MetaKind) -> Option<&str> {
        self.values.get(&kind).map(String::as_str)
    }

    /// Store a field under its raw name.
    pub fn add_extra(&mut self, name: &str, value: &str) {
        self.extra.push((name.to_string(), value.to_string()));
    }

    /// Get all extra fields in insertion order.
    pub fn extras(&self) -> &[(String, String)] {
        &self.extra
    }
}
