// Toccata
// Copyright (c) 2022-2024 The Project Toccata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The seek engine: index lookup, cluster rewinding, per-track keyframe search, and the
//! multi-track rendezvous on the earliest usable keyframe.

use std::io::{Seek, SeekFrom};

use toccata_core::errors::Result;
use toccata_core::es::{EsOut, Mtime, StreamCategory};
use toccata_core::io::ReadBytes;

use crate::element_ids::ElementType;
use crate::segment::MatroskaSegment;

/// One per-track seek point: the best keyframe seen so far for the track.
#[derive(Debug)]
struct SeekPoint {
    track_index: usize,
    date: Mtime,
    seek_pos: i64,
    cluster_pos: i64,
}

impl MatroskaSegment {
    /// Discard the cursor and continue reading level-1 elements from `pos`.
    fn restart_parser_at(&mut self, pos: u64) -> Result<()> {
        self.io.seek(SeekFrom::Start(pos))?;
        self.parser.restart_at(pos);
        self.cluster = None;
        self.cluster_timecode = None;
        Ok(())
    }

    /// Linear-scan clusters, appending synthetic index slots, until the stream position reaches
    /// `global_position`. Used when seeking by byte offset in a file with no cues.
    fn index_up_to_position(&mut self, global_position: i64) -> Result<()> {
        // Start from the last known index slot instead of the beginning each time.
        let start = match self.index.last() {
            Some(slot) => slot.position as u64,
            None => self.start_pos,
        };
        self.restart_parser_at(start)?;

        while let Some(el) = self.parser.get(&mut self.io)? {
            if el.etype != ElementType::Cluster {
                continue;
            }

            let beyond =
                self.index.last().map_or(true, |slot| slot.position < el.pos as i64);
            if beyond {
                // Read the cluster's timecode without entering it, then index it.
                self.cluster = Some(el);
                self.cluster_pos = el.pos;
                self.cluster_timecode = None;
                self.scan_cluster_timecode()?;
                self.index_append_cluster();
                self.cluster = None;
            }

            if self.io.pos() >= global_position as u64 {
                break;
            }
        }

        Ok(())
    }

    /// Seek to the target presentation time.
    ///
    /// `date` is the target time in microseconds, `time_offset` the enclosing chapter's time
    /// offset, and `global_position` an optional byte position for the no-cues path (-1 to
    /// disable). Best-effort: on total failure the clock is left unchanged and the next
    /// [`block_get`](MatroskaSegment::block_get) reports the end of the stream.
    pub fn seek(
        &mut self,
        out: &mut dyn EsOut,
        date: Mtime,
        time_offset: Mtime,
        global_position: i64,
    ) -> Result<()> {
        let mut date = date;

        for track in self.tracks.iter_mut() {
            track.last_dts = None;
        }

        if global_position >= 0 {
            // Special case for seeking in files with no cues.
            self.index_up_to_position(global_position)?;
        }

        // Don't try a complex seek when seeking to 0.
        if date == 0 && time_offset == 0 {
            out.set_pcr(0);
            out.set_next_display_time(0);
            self.restart_parser_at(self.start_pos)?;
            return Ok(());
        }

        let mut idx = 0;
        let mut seek_position = self.start_pos as i64;
        let mut seek_time = self.start_time;

        if !self.index.is_empty() {
            let slots = self.index.slots();
            while idx < slots.len() && slots[idx].time + time_offset <= date {
                idx += 1;
            }
            if idx > 0 {
                idx -= 1;
            }
            seek_position = slots[idx].position;
            seek_time = slots[idx].time;
        }

        log::debug!("seek got {} at position {}", seek_time, seek_position);

        self.restart_parser_at(seek_position as u64)?;

        // Select the first category, in priority order, that has tracks to synchronize on.
        let mut points: Vec<SeekPoint> = Vec::new();
        let mut category = StreamCategory::Unknown;
        for wanted in [StreamCategory::Video, StreamCategory::Audio, StreamCategory::Subtitle] {
            for (track_index, track) in self.tracks.iter().enumerate() {
                if track.fmt.category == wanted {
                    points.push(SeekPoint {
                        track_index,
                        date: seek_time,
                        seek_pos: seek_position,
                        cluster_pos: seek_position,
                    });
                }
            }
            if !points.is_empty() {
                category = wanted;
                break;
            }
        }

        // Neither video, audio, nor subtitle tracks: no seek further.
        if points.is_empty() {
            out.set_pcr(date);
            out.set_next_display_time(date);
            return Ok(());
        }

        // Parse until a keyframe at or past the target for every track, backing off to the
        // previous index slot when a cluster turns out to contain no keyframe at all.
        let mut has_key = false;
        loop {
            loop {
                let read = match self.block_get() {
                    Ok(read) => read,
                    Err(_) => {
                        log::warn!("cannot get block EOF?");
                        return Ok(());
                    }
                };

                if read.keyframe && self.tracks[read.track_index].fmt.category == category {
                    if let Some(point) =
                        points.iter_mut().find(|point| point.track_index == read.track_index)
                    {
                        point.date = read.pts;
                        point.seek_pos = read.block.pos as i64;
                        point.cluster_pos = read.cluster_pos as i64;
                        has_key = true;
                    }
                }

                if read.pts >= date {
                    break;
                }
            }

            if has_key || idx == 0 {
                break;
            }

            // No keyframe was found in the cluster: seek to the previous index slot.
            date = time_offset + self.index.get(idx).map_or(0, |slot| slot.time);
            idx -= 1;
            let position = self.index.get(idx).map_or(self.start_pos as i64, |slot| slot.position);
            self.restart_parser_at(position as u64)?;
        }

        // Rewind to the earliest keyframe across the selected tracks.
        let mut min = &points[0];
        for point in &points[1..] {
            if point.date < min.date {
                min = point;
            }
        }

        out.set_pcr(min.date);
        out.set_next_display_time(date);

        let cluster = self.parser.unget(&mut self.io, min.seek_pos as u64, min.cluster_pos as u64)?;
        self.cluster = Some(cluster);
        self.cluster_pos = cluster.pos;
        self.cluster_timecode = None;

        Ok(())
    }
}
