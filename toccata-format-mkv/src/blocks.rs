// Toccata
// Copyright (c) 2022-2024 The Project Toccata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Block payload parsing and the cluster-walking block extractor.

use std::io::{Seek, SeekFrom};

use toccata_core::errors::{decode_error, end_of_stream_error, Result};
use toccata_core::es::Mtime;
use toccata_core::fourcc::CODEC_THEORA;
use toccata_core::io::{BufReader, ReadBytes};

use crate::ebml::{read_signed_vint, read_unsigned_vint};
use crate::element_ids::ElementType;
use crate::parser::ElementHeader;
use crate::segment::MatroskaSegment;

/// The lacing mode of a block.
enum Lacing {
    None,
    Xiph,
    FixedSize,
    Ebml,
}

fn parse_flags(flags: u8) -> Lacing {
    match (flags >> 1) & 0b11 {
        0b00 => Lacing::None,
        0b01 => Lacing::Xiph,
        0b10 => Lacing::FixedSize,
        _ => Lacing::Ebml,
    }
}

fn read_xiph_sizes(reader: &mut BufReader<'_>, num_sizes: usize) -> Result<Vec<u64>> {
    let mut sizes = Vec::with_capacity(num_sizes);
    let mut prefixes = 0u64;
    while sizes.len() < num_sizes {
        let byte = u64::from(reader.read_byte()?);
        if byte == 255 {
            prefixes += 1;
        }
        else {
            sizes.push(prefixes * 255 + byte);
            prefixes = 0;
        }
    }
    Ok(sizes)
}

fn read_ebml_sizes(reader: &mut BufReader<'_>, num_sizes: usize) -> Result<Vec<u64>> {
    let mut sizes: Vec<u64> = Vec::with_capacity(num_sizes);
    for _ in 0..num_sizes {
        match sizes.last().copied() {
            Some(last) => {
                let delta = read_signed_vint(&mut *reader)?;
                let size = (last as i64) + delta;
                if size < 0 {
                    return decode_error("mkv: negative laced frame size");
                }
                sizes.push(size as u64);
            }
            None => sizes.push(read_unsigned_vint(&mut *reader)?),
        }
    }
    Ok(sizes)
}

/// One parsed Block or SimpleBlock payload.
#[derive(Debug)]
pub struct BlockData {
    /// The track number the block belongs to.
    pub track: u64,
    /// The timecode in ticks, relative to the enclosing cluster.
    pub timecode: i16,
    /// The keyframe header bit. Only meaningful for a SimpleBlock.
    pub keyframe: bool,
    /// The discardable header bit. Only meaningful for a SimpleBlock.
    pub discardable: bool,
    /// The frames of the block, de-laced.
    pub frames: Vec<Box<[u8]>>,
    /// The byte position to seek back to for this block: the SimpleBlock element itself, or the
    /// enclosing BlockGroup.
    pub pos: u64,
    /// Whether this was a SimpleBlock.
    pub simple: bool,
}

/// Parse a Block or SimpleBlock payload into its frames.
pub(crate) fn read_block(payload: &[u8], pos: u64, simple: bool) -> Result<BlockData> {
    let mut reader = BufReader::new(payload);

    let track = read_unsigned_vint(&mut reader)?;
    let timecode = reader.read_be_u16()? as i16;
    let flags = reader.read_byte()?;

    let keyframe = simple && (flags & 0x80) != 0;
    let discardable = simple && (flags & 0x01) != 0;

    let mut frames = Vec::new();
    match parse_flags(flags) {
        Lacing::None => {
            frames.push(reader.read_buf_bytes_available_ref().into());
        }
        lacing @ (Lacing::Xiph | Lacing::Ebml) => {
            // The stored count excludes the last frame, whose size is deduced from the block.
            let num_sizes = reader.read_byte()? as usize;
            let sizes = match lacing {
                Lacing::Xiph => read_xiph_sizes(&mut reader, num_sizes)?,
                _ => read_ebml_sizes(&mut reader, num_sizes)?,
            };

            for size in sizes {
                if size > reader.bytes_available() {
                    return decode_error("mkv: laced frame overruns block");
                }
                frames.push(reader.read_buf_bytes_ref(size as usize)?.into());
            }
            frames.push(reader.read_buf_bytes_available_ref().into());
        }
        Lacing::FixedSize => {
            let num_frames = reader.read_byte()? as usize + 1;
            let total = reader.bytes_available() as usize;
            if total % num_frames != 0 {
                return decode_error("mkv: invalid fixed lacing block size");
            }
            let frame_size = total / num_frames;
            for _ in 0..num_frames {
                frames.push(reader.read_buf_bytes_ref(frame_size)?.into());
            }
        }
    }

    Ok(BlockData { track, timecode, keyframe, discardable, frames, pos, simple })
}

/// One block as returned by [`MatroskaSegment::block_get`].
#[derive(Debug)]
pub struct BlockRead {
    /// The parsed block.
    pub block: BlockData,
    /// Index of the owning track in the segment's track list.
    pub track_index: usize,
    /// The inferred keyframe flag.
    pub keyframe: bool,
    /// The inferred discardable flag.
    pub discardable: bool,
    /// The block duration in ticks, when a BlockDuration element was present.
    pub duration: Option<u64>,
    /// The presentation time of the first frame, in microseconds.
    pub pts: Mtime,
    /// The byte position of the enclosing cluster.
    pub cluster_pos: u64,
}

impl MatroskaSegment {
    /// Extract the next block from the segment.
    ///
    /// Walks Cluster, BlockGroup, and SimpleBlock elements from the current position, yielding one
    /// annotated block per call. Returns [`EndOfStream`](toccata_core::errors::Error::EndOfStream)
    /// at the natural end of the segment.
    pub fn block_get(&mut self) -> Result<BlockRead> {
        let mut pending: Option<BlockData> = None;
        let mut block: Option<BlockData> = None;
        let mut keyframe = true;
        let mut discardable = false;
        let mut duration: Option<u64> = None;

        loop {
            // A SimpleBlock stored on the previous iteration hands control back to the caller.
            if let Some(data) = pending.take() {
                match self.finish_block(data, keyframe, discardable, duration)? {
                    Some(read) => return Ok(read),
                    None => {
                        keyframe = true;
                        discardable = false;
                        duration = None;
                        continue;
                    }
                }
            }

            let el = match self.parser.get(&mut self.io)? {
                Some(el) => el,
                None => {
                    // The end of a BlockGroup delivers its block.
                    if let Some(data) = block.take() {
                        match self.finish_block(data, keyframe, discardable, duration)? {
                            Some(read) => return Ok(read),
                            None => {
                                keyframe = true;
                                discardable = false;
                                duration = None;
                                continue;
                            }
                        }
                    }
                    if self.parser.level() > 1 {
                        self.parser.up();
                        continue;
                    }
                    log::warn!("EOF");
                    return end_of_stream_error();
                }
            };

            // Verify that we are still inside our cluster. It can happen with broken files and
            // when seeking without an index.
            if self.parser.level() > 1 {
                if let Some(cluster) = self.cluster {
                    if !self.parser.is_top_present(cluster.pos) {
                        log::warn!("unexpected escape from current cluster");
                        self.cluster = None;
                    }
                }
                if self.cluster.is_none() {
                    continue;
                }
            }

            match self.parser.level() {
                1 => match el.etype {
                    ElementType::Cluster => {
                        self.enter_cluster(el)?;
                    }
                    ElementType::Cues => {
                        log::warn!("found Cues while demuxing");
                        return decode_error("mkv: cues element while extracting blocks");
                    }
                    other => {
                        log::debug!("unknown element {:?} at level 1", other);
                    }
                },
                2 => match el.etype {
                    ElementType::Timestamp => {
                        let timecode = el.read_uint(&mut self.io)?;
                        self.cluster_timecode = Some(timecode);

                        // Add the cluster to the index when it lies beyond the last slot.
                        let beyond = self
                            .index
                            .last()
                            .map_or(true, |slot| slot.position < self.cluster_pos as i64);
                        if beyond {
                            self.index_append_cluster();
                        }
                    }
                    ElementType::SilentTracks => {
                        self.parser.down()?;
                    }
                    ElementType::BlockGroup => {
                        self.block_pos = el.pos;
                        self.parser.down()?;
                    }
                    ElementType::SimpleBlock => {
                        let payload = el.read_binary(&mut self.io)?;
                        pending = Some(read_block(&payload, el.pos, true)?);
                    }
                    ElementType::Position | ElementType::PrevSize | ElementType::Void
                    | ElementType::Crc32 => (),
                    other => {
                        log::debug!("unknown element {:?} at level 2", other);
                    }
                },
                3 => match el.etype {
                    ElementType::Block => {
                        if block.is_none() {
                            let payload = el.read_binary(&mut self.io)?;
                            block = Some(read_block(&payload, self.block_pos, false)?);
                            // Hand the block off while staying inside the group's scope.
                            self.parser.keep();
                        }
                    }
                    ElementType::BlockDuration => {
                        duration = Some(el.read_uint(&mut self.io)?);
                    }
                    ElementType::ReferenceBlock => {
                        let reference = el.read_sint(&mut self.io)?;
                        if keyframe {
                            keyframe = false;
                        }
                        else if reference > 0 {
                            discardable = true;
                        }
                    }
                    ElementType::SilentTrackNumber => {
                        let number = el.read_uint(&mut self.io)?;
                        if let Some(track) =
                            self.tracks.iter_mut().find(|track| track.number == number)
                        {
                            track.silent = true;
                        }
                    }
                    ElementType::DiscardPadding | ElementType::Void | ElementType::Crc32 => (),
                    other => {
                        log::debug!("unknown element {:?} at level 3", other);
                    }
                },
                level => {
                    log::error!("invalid level = {}", level);
                    return decode_error("mkv: element at an impossible level");
                }
            }
        }
    }

    /// Enter a cluster: remember it, reset every track's silent flag, and descend.
    pub(crate) fn enter_cluster(&mut self, el: ElementHeader) -> Result<()> {
        self.cluster = Some(el);
        self.cluster_pos = el.pos;
        self.cluster_timecode = None;
        for track in self.tracks.iter_mut() {
            track.silent = false;
        }
        self.parser.down()
    }

    /// Validate and annotate a parsed block. Returns `None` when the block references a track
    /// that does not exist, in which case it is dropped.
    fn finish_block(
        &mut self,
        data: BlockData,
        keyframe_in: bool,
        discardable_in: bool,
        duration: Option<u64>,
    ) -> Result<Option<BlockRead>> {
        // Check the block's validity to protect against broken files.
        let track_index = match self.tracks.iter().position(|track| track.number == data.track) {
            Some(track_index) => track_index,
            None => {
                log::debug!("block references unknown track {}", data.track);
                return Ok(None);
            }
        };

        let (mut keyframe, discardable) = if data.simple {
            (data.keyframe, data.discardable)
        }
        else {
            (keyframe_in, discardable_in)
        };

        // If the second bit of a Theora frame is set, it is not a keyframe.
        if keyframe && self.tracks[track_index].fmt.codec == Some(CODEC_THEORA) {
            match data.frames.first() {
                Some(frame) if !frame.is_empty() => {
                    if frame[0] & 0x40 != 0 {
                        keyframe = false;
                    }
                }
                _ => keyframe = false,
            }
        }

        // The cluster timecode is usually seen before the first block, but a block may legally
        // precede it. Look ahead for it on demand.
        if self.cluster_timecode.is_none() {
            self.scan_cluster_timecode()?;
        }

        let pts = self.block_time_to_us(self.cluster_timecode.unwrap_or(0), data.timecode);

        // Backfill the newest index slot with the first block's time.
        if let Some(slot) = self.index.last_mut() {
            if slot.time == -1 {
                slot.time = pts;
                slot.key = keyframe;
            }
        }

        Ok(Some(BlockRead {
            cluster_pos: self.cluster_pos,
            track_index,
            keyframe,
            discardable,
            duration,
            pts,
            block: data,
        }))
    }

    /// Look ahead within the current cluster for its Timestamp element, restoring the read
    /// position afterwards.
    pub(crate) fn scan_cluster_timecode(&mut self) -> Result<()> {
        let cluster = match self.cluster {
            Some(cluster) => cluster,
            None => return Ok(()),
        };

        let saved = self.io.pos();
        let end = cluster.end();
        let mut pos = cluster.data_pos;

        loop {
            if let Some(end) = end {
                if pos >= end {
                    break;
                }
            }
            self.io.seek(SeekFrom::Start(pos))?;
            let el = match ElementHeader::read(&mut self.io) {
                Ok(el) => el,
                Err(_) => break,
            };
            if el.etype == ElementType::Timestamp {
                self.cluster_timecode = Some(el.read_uint(&mut self.io)?);
                break;
            }
            // A segment-level class terminates an unknown-size cluster.
            if el.etype.is_top_level() {
                break;
            }
            match el.end() {
                Some(next) => pos = next,
                None => break,
            }
        }

        self.io.seek(SeekFrom::Start(saved))?;
        Ok(())
    }
}
