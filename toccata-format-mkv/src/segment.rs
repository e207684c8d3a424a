// Toccata
// Copyright (c) 2022-2024 The Project Toccata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The segment model: everything known about one Matroska segment, the preload pass that
//! discovers its top-level elements, deferred loading through SeekHead entries, and the
//! activation of its tracks as elementary streams.

use std::io::{Seek, SeekFrom};

use toccata_core::errors::{Error, Result};
use toccata_core::es::{EsOut, Mtime, StreamCategory};
use toccata_core::io::{MediaSourceStream, ReadBytes};
use toccata_core::meta::{MetaKind, MetaStore};

use crate::codecs::activate_track;
use crate::element_ids::{element_type, ElementType};
use crate::index::{IndexEntry, SeekIndex};
use crate::parser::{EbmlParser, ElementHeader};
use crate::tags::TagData;
use crate::tracks::{parse_tracks, Track};

/// Default timescale: 1,000,000 ns per tick, so one tick is a millisecond.
const DEFAULT_TIMESCALE: u64 = 1_000_000;

/// Maximum number of SeekHead elements followed, to bound malicious cycles.
const SEEKHEAD_RECURSION_CAP: u32 = 10;

/// One chapter of an edition. Chapters nest.
#[derive(Debug, Default)]
pub struct Chapter {
    pub uid: u64,
    /// Start time in microseconds.
    pub time_start: Mtime,
    /// End time in microseconds. -1 if unset.
    pub time_end: Mtime,
    pub enabled: bool,
    pub hidden: bool,
    pub name: Option<String>,
    pub sub_chapters: Vec<Chapter>,
}

/// One edition: an ordered list of chapters.
#[derive(Debug, Default)]
pub struct Edition {
    pub uid: u64,
    pub hidden: bool,
    pub default: bool,
    pub ordered: bool,
    pub chapters: Vec<Chapter>,
}

/// A parsed Matroska segment.
pub struct MatroskaSegment {
    /// The stream the segment is read from. The segment mutates the stream position freely.
    pub(crate) io: MediaSourceStream,
    /// The element cursor over the segment's children.
    pub(crate) parser: EbmlParser,

    /// Nanoseconds per tick. Strictly positive.
    pub timescale: u64,
    /// Duration in ticks, as declared by Info.
    pub duration: Option<f64>,
    pub title: Option<String>,
    pub muxing_application: Option<String>,
    pub writing_application: Option<String>,
    pub segment_filename: Option<String>,
    /// Production date, in nanoseconds relative to 2001-01-01T00:00:00 UTC.
    pub date_utc: Option<i64>,
    pub segment_uid: Option<Box<[u8]>>,
    pub prev_segment_uid: Option<Box<[u8]>>,
    pub next_segment_uid: Option<Box<[u8]>>,
    /// Family UIDs used for multi-segment linking.
    pub families: Vec<Box<[u8]>>,

    /// Byte positions of the discovered top-level elements. -1 when unknown.
    pub seekhead_position: i64,
    pub info_position: i64,
    pub tracks_position: i64,
    pub cues_position: i64,
    pub chapters_position: i64,
    pub attachments_position: i64,
    pub tags_position: i64,
    /// Number of SeekHead elements followed so far.
    pub(crate) seekhead_count: u32,

    pub tracks: Vec<Track>,
    pub editions: Vec<Edition>,
    /// Index of the default edition within `editions`.
    pub default_edition: usize,
    pub tags: Vec<TagData>,
    pub(crate) index: SeekIndex,
    /// Guards against duplicate Cues elements.
    pub(crate) b_cues: bool,
    pub meta: MetaStore,

    /// Byte offset of the first cluster.
    pub start_pos: u64,
    /// Time of the first cluster, in microseconds.
    pub start_time: Mtime,

    /// The cluster currently being extracted from.
    pub(crate) cluster: Option<ElementHeader>,
    pub(crate) cluster_pos: u64,
    /// The current cluster's timecode in ticks, once read.
    pub(crate) cluster_timecode: Option<u64>,
    /// Byte offset of the BlockGroup being walked.
    pub(crate) block_pos: u64,

    /// Byte offset of the segment payload; cue positions are relative to this.
    segment_data_pos: u64,
    preloaded: bool,
}

impl MatroskaSegment {
    /// Create a segment over the given stream. `segment` is the Segment element's header.
    pub(crate) fn new(io: MediaSourceStream, segment: ElementHeader) -> Self {
        MatroskaSegment {
            parser: EbmlParser::of(segment),
            io,
            timescale: DEFAULT_TIMESCALE,
            duration: None,
            title: None,
            muxing_application: None,
            writing_application: None,
            segment_filename: None,
            date_utc: None,
            segment_uid: None,
            prev_segment_uid: None,
            next_segment_uid: None,
            families: Vec::new(),
            seekhead_position: -1,
            info_position: -1,
            tracks_position: -1,
            cues_position: -1,
            chapters_position: -1,
            attachments_position: -1,
            tags_position: -1,
            seekhead_count: 0,
            tracks: Vec::new(),
            editions: Vec::new(),
            default_edition: 0,
            tags: Vec::new(),
            index: SeekIndex::new(),
            b_cues: false,
            meta: MetaStore::new(),
            start_pos: segment.data_pos,
            start_time: 0,
            cluster: None,
            cluster_pos: 0,
            cluster_timecode: None,
            block_pos: 0,
            segment_data_pos: segment.data_pos,
            preloaded: false,
        }
    }

    /// The cue index.
    pub fn index(&self) -> &SeekIndex {
        &self.index
    }

    /// Whether a Cues element has been loaded.
    pub fn cues_loaded(&self) -> bool {
        self.b_cues
    }

    /// Whether `preload` has completed.
    pub fn is_preloaded(&self) -> bool {
        self.preloaded
    }

    /// The current position of the underlying stream.
    pub fn stream_position(&self) -> u64 {
        self.io.pos()
    }

    /// Convert an element position relative to the segment payload into an absolute stream
    /// position.
    pub(crate) fn global_position(&self, relative: u64) -> u64 {
        self.segment_data_pos + relative
    }

    /// Convert a cluster timecode plus a relative block timecode into microseconds.
    pub(crate) fn block_time_to_us(&self, cluster_timecode: u64, relative: i16) -> Mtime {
        let ticks = cluster_timecode as i128 + i128::from(relative);
        ((ticks * self.timescale as i128) / 1000) as Mtime
    }

    /// Discover the segment's top-level elements, parsing each class the first time it is seen
    /// and recording its byte position. Stops at the first cluster.
    ///
    /// Returns `true` on the first successful call, and `false` both when the segment was
    /// already preloaded and when it declares no usable tracks.
    pub fn preload(&mut self) -> Result<bool> {
        if self.preloaded {
            return Ok(false);
        }

        self.parser.reset();

        while let Some(el) = self.parser.get(&mut self.io)? {
            match el.etype {
                ElementType::SeekHead => {
                    // Multiple allowed. Bail at the cap to prevent recursion through cycles.
                    log::debug!("|   + seek head");
                    if self.seekhead_count < SEEKHEAD_RECURSION_CAP {
                        self.seekhead_position = el.pos as i64;
                        self.parse_seek_head(el)?;
                    }
                }
                ElementType::Info => {
                    log::debug!("|   + information");
                    if self.info_position < 0 {
                        self.parse_info(el)?;
                    }
                    self.info_position = el.pos as i64;
                }
                ElementType::Tracks => {
                    log::debug!("|   + tracks");
                    if self.tracks_position < 0 {
                        self.tracks = parse_tracks(&mut self.io, el)?;
                    }
                    if self.tracks.is_empty() {
                        log::error!("no tracks supported");
                        return Ok(false);
                    }
                    self.tracks_position = el.pos as i64;
                }
                ElementType::Cues => {
                    log::debug!("|   + cues");
                    if self.cues_position < 0 {
                        self.load_cues(el)?;
                    }
                    self.cues_position = el.pos as i64;
                }
                ElementType::Cluster => {
                    log::debug!("|   + cluster");
                    self.start_pos = el.pos;
                    self.enter_cluster(el)?;
                    // The cluster timecode defines the segment's start time.
                    self.scan_cluster_timecode()?;
                    if let Some(timecode) = self.cluster_timecode {
                        self.start_time = self.block_time_to_us(timecode, 0);
                    }
                    // Stop pre-parsing the stream; block extraction continues here.
                    break;
                }
                ElementType::Attachments => {
                    log::debug!("|   + attachments");
                    if self.attachments_position < 0 {
                        self.parse_attachments(el)?;
                    }
                    self.attachments_position = el.pos as i64;
                }
                ElementType::Chapters => {
                    log::debug!("|   + chapters");
                    if self.chapters_position < 0 {
                        self.parse_chapters(el)?;
                    }
                    self.chapters_position = el.pos as i64;
                }
                ElementType::Tags => {
                    // Left for on-demand loading through the seek head.
                    log::debug!("|   + tags");
                    self.tags_position = el.pos as i64;
                }
                ElementType::Void | ElementType::Crc32 => (),
                other => log::debug!("|   + preload unknown ({:?})", other),
            }
        }

        self.preloaded = true;
        Ok(true)
    }

    /// Preload this segment if it shares a family UID with an already-preloaded segment.
    pub fn preload_family(&mut self, of_segment: &MatroskaSegment) -> Result<bool> {
        if self.preloaded {
            return Ok(false);
        }
        for family in &self.families {
            if of_segment.families.iter().any(|other| other == family) {
                return self.preload();
            }
        }
        Ok(false)
    }

    /// Whether segment `b` follows segment `a` through the prev/next segment UID chain.
    pub fn compare_segment_uids(a: &MatroskaSegment, b: &MatroskaSegment) -> bool {
        if let (Some(uid), Some(prev)) = (&a.segment_uid, &b.prev_segment_uid) {
            if uid == prev {
                return true;
            }
        }

        let next = match &a.next_segment_uid {
            Some(next) => next,
            None => return false,
        };

        if let Some(uid) = &b.segment_uid {
            if next == uid {
                return true;
            }
        }
        matches!(&b.prev_segment_uid, Some(prev) if next == prev)
    }

    /// Load one element whose position was learned from a SeekHead but whose contents have not
    /// been parsed yet. The stream position is preserved across the call regardless of outcome.
    pub fn load_seekhead_item(&mut self, etype: ElementType, position: u64) -> Result<bool> {
        let saved = self.io.pos();
        let result = self.load_seekhead_item_at(etype, position);
        self.io.seek(SeekFrom::Start(saved))?;
        result
    }

    fn load_seekhead_item_at(&mut self, etype: ElementType, position: u64) -> Result<bool> {
        self.io.seek(SeekFrom::Start(position))?;

        let el = match ElementHeader::read(&mut self.io) {
            Ok(el) if el.etype == etype => el,
            _ => {
                log::error!("cannot load some cues/chapters/tags etc. (broken seekhead or file)");
                return Ok(false);
            }
        };

        match etype {
            ElementType::SeekHead => {
                log::debug!("|   + seek head");
                if self.seekhead_count < SEEKHEAD_RECURSION_CAP {
                    self.seekhead_position = position as i64;
                    self.parse_seek_head(el)?;
                }
                else {
                    log::warn!("ignoring seek head: recursion cap reached");
                }
            }
            ElementType::Info => {
                log::debug!("|   + information");
                if self.info_position < 0 {
                    self.parse_info(el)?;
                }
                self.info_position = position as i64;
            }
            ElementType::Tracks => {
                log::debug!("|   + tracks");
                if self.tracks_position < 0 {
                    self.tracks = parse_tracks(&mut self.io, el)?;
                }
                if self.tracks.is_empty() {
                    log::error!("no tracks supported");
                    return Ok(false);
                }
                self.tracks_position = position as i64;
            }
            ElementType::Cues => {
                log::debug!("|   + cues");
                if self.cues_position < 0 {
                    self.load_cues(el)?;
                }
                self.cues_position = position as i64;
            }
            ElementType::Chapters => {
                log::debug!("|   + chapters");
                if self.chapters_position < 0 {
                    self.parse_chapters(el)?;
                }
                self.chapters_position = position as i64;
            }
            ElementType::Attachments => {
                log::debug!("|   + attachments");
                if self.attachments_position < 0 {
                    self.parse_attachments(el)?;
                }
                self.attachments_position = position as i64;
            }
            ElementType::Tags => {
                log::debug!("|   + tags");
                if self.tags_position < 0 {
                    self.load_tags(el)?;
                }
                self.tags_position = position as i64;
            }
            other => {
                log::debug!("|   + seek head item unknown ({:?})", other);
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Parse a SeekHead element and follow its entries to classes not yet parsed.
    pub(crate) fn parse_seek_head(&mut self, header: ElementHeader) -> Result<()> {
        self.seekhead_count += 1;

        let mut entries = Vec::new();

        let mut it = EbmlParser::of(header);
        while let Some(el) = it.get(&mut self.io)? {
            match el.etype {
                ElementType::Seek => {
                    let mut seek_id = None;
                    let mut seek_position = None;

                    let mut sub = EbmlParser::of(el);
                    while let Some(child) = sub.get(&mut self.io)? {
                        match child.etype {
                            ElementType::SeekId => {
                                // The target ID is stored as raw element ID bytes.
                                let raw = child.read_binary(&mut self.io)?;
                                if raw.len() <= 4 {
                                    let mut id = 0u32;
                                    for &byte in raw.iter() {
                                        id = (id << 8) | u32::from(byte);
                                    }
                                    seek_id = Some(id);
                                }
                            }
                            ElementType::SeekPosition => {
                                seek_position = Some(child.read_uint(&mut self.io)?);
                            }
                            other => log::debug!("|   |   + seek unknown ({:?})", other),
                        }
                    }

                    if let (Some(id), Some(position)) = (seek_id, seek_position) {
                        entries.push((id, position));
                    }
                }
                ElementType::Void | ElementType::Crc32 => (),
                other => log::debug!("|   + seek head unknown ({:?})", other),
            }
        }

        for (id, position) in entries {
            let etype = element_type(id);
            let global = self.global_position(position);

            let known = match etype {
                ElementType::SeekHead => self.seekhead_position,
                ElementType::Info => self.info_position,
                ElementType::Tracks => self.tracks_position,
                ElementType::Cues => self.cues_position,
                ElementType::Chapters => self.chapters_position,
                ElementType::Attachments => self.attachments_position,
                ElementType::Tags => self.tags_position,
                _ => {
                    log::debug!("|   + seek entry to unhandled id 0x{:x}", id);
                    continue;
                }
            };

            // Chained SeekHeads are always followed; the recursion cap bounds cycles.
            if known < 0 || etype == ElementType::SeekHead {
                self.load_seekhead_item(etype, global)?;
            }
            else {
                // First-seen wins: record the position but do not re-parse.
                self.record_position(etype, global as i64);
            }
        }

        Ok(())
    }

    fn record_position(&mut self, etype: ElementType, position: i64) {
        match etype {
            ElementType::SeekHead => self.seekhead_position = position,
            ElementType::Info => self.info_position = position,
            ElementType::Tracks => self.tracks_position = position,
            ElementType::Cues => self.cues_position = position,
            ElementType::Chapters => self.chapters_position = position,
            ElementType::Attachments => self.attachments_position = position,
            ElementType::Tags => self.tags_position = position,
            _ => (),
        }
    }

    /// Parse the Info element.
    pub(crate) fn parse_info(&mut self, header: ElementHeader) -> Result<()> {
        let mut it = EbmlParser::of(header);
        while let Some(el) = it.get(&mut self.io)? {
            match el.etype {
                ElementType::TimestampScale => {
                    let scale = el.read_uint(&mut self.io)?;
                    if scale > 0 {
                        self.timescale = scale;
                    }
                }
                ElementType::Duration => self.duration = Some(el.read_float(&mut self.io)?),
                ElementType::Title => self.title = Some(el.read_string(&mut self.io)?),
                ElementType::MuxingApp => {
                    self.muxing_application = Some(el.read_string(&mut self.io)?);
                }
                ElementType::WritingApp => {
                    self.writing_application = Some(el.read_string(&mut self.io)?);
                }
                ElementType::SegmentFilename => {
                    self.segment_filename = Some(el.read_string(&mut self.io)?);
                }
                ElementType::DateUtc => self.date_utc = Some(el.read_date(&mut self.io)?),
                ElementType::SegmentUid => {
                    self.segment_uid = Some(el.read_binary(&mut self.io)?);
                }
                ElementType::PrevUid => {
                    self.prev_segment_uid = Some(el.read_binary(&mut self.io)?);
                }
                ElementType::NextUid => {
                    self.next_segment_uid = Some(el.read_binary(&mut self.io)?);
                }
                ElementType::SegmentFamily => {
                    self.families.push(el.read_binary(&mut self.io)?);
                }
                ElementType::Void | ElementType::Crc32 => (),
                other => log::debug!("|   |   + info unknown ({:?})", other),
            }
        }
        Ok(())
    }

    /// Load a Cues element into the index. A second Cues within the same segment is rejected.
    pub(crate) fn load_cues(&mut self, header: ElementHeader) -> Result<()> {
        if self.b_cues {
            log::error!("there can be only 1 Cues per segment");
            return Ok(());
        }

        let mut it = EbmlParser::of(header);
        while let Some(el) = it.get(&mut self.io)? {
            match el.etype {
                ElementType::CuePoint => {
                    let mut time = 0;
                    let mut slots: Vec<IndexEntry> = Vec::new();

                    let mut point = EbmlParser::of(el);
                    while let Some(child) = point.get(&mut self.io)? {
                        match child.etype {
                            ElementType::CueTime => {
                                let ticks = child.read_uint(&mut self.io)?;
                                time = ((ticks as i128 * self.timescale as i128) / 1000) as i64;
                            }
                            ElementType::CueTrackPositions => {
                                let mut slot = IndexEntry::default();

                                let mut sub = EbmlParser::of(child);
                                while let Some(field) = sub.get(&mut self.io)? {
                                    match field.etype {
                                        ElementType::CueTrack => {
                                            slot.track = field.read_uint(&mut self.io)? as i64;
                                        }
                                        ElementType::CueClusterPosition => {
                                            let relative = field.read_uint(&mut self.io)?;
                                            slot.position =
                                                self.global_position(relative) as i64;
                                        }
                                        ElementType::CueBlockNumber => {
                                            slot.block_number =
                                                field.read_uint(&mut self.io)? as i64;
                                        }
                                        other => {
                                            log::debug!("|   |   + cue unknown ({:?})", other);
                                        }
                                    }
                                }

                                slots.push(slot);
                            }
                            other => log::debug!("|   + cue point unknown ({:?})", other),
                        }
                    }

                    // One index slot per track positions record.
                    for mut slot in slots {
                        slot.time = time;
                        self.index.push(slot);
                    }
                }
                ElementType::Void | ElementType::Crc32 => (),
                other => log::debug!("|   + cues unknown ({:?})", other),
            }
        }

        self.b_cues = true;
        log::debug!("|   - loading cues done");
        Ok(())
    }

    /// Append a synthetic index slot for the current cluster.
    pub(crate) fn index_append_cluster(&mut self) {
        let time = match self.cluster_timecode {
            Some(timecode) => self.block_time_to_us(timecode, 0),
            None => -1,
        };
        self.index.push(IndexEntry {
            time,
            position: self.cluster_pos as i64,
            track: -1,
            block_number: -1,
            key: true,
        });
    }

    fn parse_chapter_atom(&mut self, header: ElementHeader) -> Result<Chapter> {
        let mut chapter = Chapter { enabled: true, time_end: -1, ..Default::default() };

        let mut it = EbmlParser::of(header);
        while let Some(el) = it.get(&mut self.io)? {
            match el.etype {
                ElementType::ChapterUid => chapter.uid = el.read_uint(&mut self.io)?,
                // Chapter times are in nanoseconds, not ticks.
                ElementType::ChapterTimeStart => {
                    chapter.time_start = el.read_uint(&mut self.io)? as i64 / 1000;
                }
                ElementType::ChapterTimeEnd => {
                    chapter.time_end = el.read_uint(&mut self.io)? as i64 / 1000;
                }
                ElementType::ChapterFlagEnabled => {
                    chapter.enabled = el.read_uint(&mut self.io)? != 0;
                }
                ElementType::ChapterFlagHidden => {
                    chapter.hidden = el.read_uint(&mut self.io)? != 0;
                }
                ElementType::ChapterDisplay => {
                    let mut display = EbmlParser::of(el);
                    while let Some(child) = display.get(&mut self.io)? {
                        match child.etype {
                            ElementType::ChapString => {
                                chapter.name = Some(child.read_string(&mut self.io)?);
                            }
                            ElementType::ChapLanguage | ElementType::ChapCountry => (),
                            other => log::debug!("|   |   + display unknown ({:?})", other),
                        }
                    }
                }
                ElementType::ChapterAtom => {
                    let sub = self.parse_chapter_atom(el)?;
                    chapter.sub_chapters.push(sub);
                }
                other => log::debug!("|   |   + chapter unknown ({:?})", other),
            }
        }

        Ok(chapter)
    }

    /// Parse the Chapters element into the edition list.
    pub(crate) fn parse_chapters(&mut self, header: ElementHeader) -> Result<()> {
        let mut it = EbmlParser::of(header);
        while let Some(el) = it.get(&mut self.io)? {
            match el.etype {
                ElementType::EditionEntry => {
                    let mut edition = Edition::default();

                    let mut entry = EbmlParser::of(el);
                    while let Some(child) = entry.get(&mut self.io)? {
                        match child.etype {
                            ElementType::EditionUid => {
                                edition.uid = child.read_uint(&mut self.io)?;
                            }
                            ElementType::EditionFlagHidden => {
                                edition.hidden = child.read_uint(&mut self.io)? != 0;
                            }
                            ElementType::EditionFlagDefault => {
                                edition.default = child.read_uint(&mut self.io)? != 0;
                            }
                            ElementType::EditionFlagOrdered => {
                                edition.ordered = child.read_uint(&mut self.io)? != 0;
                            }
                            ElementType::ChapterAtom => {
                                let chapter = self.parse_chapter_atom(child)?;
                                edition.chapters.push(chapter);
                            }
                            other => log::debug!("|   |   + edition unknown ({:?})", other),
                        }
                    }

                    if edition.default && self.editions.iter().all(|e| !e.default) {
                        self.default_edition = self.editions.len();
                    }
                    self.editions.push(edition);
                }
                ElementType::Void | ElementType::Crc32 => (),
                other => log::debug!("|   + chapters unknown ({:?})", other),
            }
        }
        Ok(())
    }

    /// Skim the Attachments element. Extraction is left to the enclosing system; only the
    /// position is of interest.
    pub(crate) fn parse_attachments(&mut self, header: ElementHeader) -> Result<()> {
        let mut it = EbmlParser::of(header);
        while let Some(el) = it.get(&mut self.io)? {
            if el.etype == ElementType::AttachedFile {
                let mut file = EbmlParser::of(el);
                while let Some(child) = file.get(&mut self.io)? {
                    if child.etype == ElementType::FileName {
                        log::debug!("|   |   + attachment `{}`", child.read_string(&mut self.io)?);
                    }
                }
            }
        }
        Ok(())
    }

    /// Create the segment's metadata from what preload gathered.
    pub fn information_create(&mut self) {
        if let Some(title) = self.title.clone() {
            self.meta.set(MetaKind::Title, &title);
        }
    }

    /// Activate the segment for playback: register every usable track with the elementary
    /// stream output and rewind to the first cluster.
    pub fn select(&mut self, out: &mut dyn EsOut, start_time: Mtime) -> Result<()> {
        if self.tracks.is_empty() {
            return Err(Error::NoTracks);
        }

        log::debug!("found {} es", self.tracks.len());

        let mut has_default_video = false;
        let mut has_default_audio = false;
        for track in &self.tracks {
            let default = track.enabled && (track.default || track.forced);
            match track.fmt.category {
                StreamCategory::Video => has_default_video |= default,
                StreamCategory::Audio => has_default_audio |= default,
                _ => (),
            }
        }

        for i in 0..self.tracks.len() {
            let track = &mut self.tracks[i];

            if track.fmt.category == StreamCategory::Unknown || track.codec_id.is_none() {
                log::warn!("invalid track[{}, n={}]", i, track.number);
                track.es = None;
                continue;
            }
            else if !has_default_video && track.fmt.category == StreamCategory::Video {
                track.default = true;
                has_default_video = true;
            }
            else if !has_default_audio && track.fmt.category == StreamCategory::Audio {
                track.default = true;
                has_default_audio = true;
            }

            activate_track(track);

            // Navigation streams are not exposed as elementary streams.
            if track.fmt.category == StreamCategory::Button {
                continue;
            }

            track.fmt.priority = if !track.enabled {
                -2
            }
            else if track.forced {
                2
            }
            else if track.default {
                1
            }
            else {
                0
            };

            // Avoid multiple video tracks being selected when alternates exist.
            if track.fmt.category == StreamCategory::Video {
                track.fmt.priority -= 1;
            }

            let handle = out.add(&track.fmt);
            track.es = Some(handle);

            if track.default {
                out.set_es_default(handle);
            }
        }

        out.set_next_display_time(start_time);

        // Reset stream reading to the first cluster of the segment.
        self.io.seek(SeekFrom::Start(self.start_pos))?;
        self.parser.restart_at(self.start_pos);
        self.cluster = None;
        self.cluster_timecode = None;

        Ok(())
    }

    /// Deactivate the segment: delete every live elementary stream and drop the cursor state.
    pub fn unselect(&mut self, out: &mut dyn EsOut) {
        for track in self.tracks.iter_mut() {
            if let Some(handle) = track.es.take() {
                out.del(handle);
            }
        }
        self.parser.reset();
        self.cluster = None;
        self.cluster_timecode = None;
    }
}
