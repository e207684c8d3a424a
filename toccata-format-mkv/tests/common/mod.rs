// Toccata
// Copyright (c) 2022-2024 The Project Toccata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared helpers for demuxer tests: a minimal EBML writer and a capturing elementary-stream
//! sink.

#![allow(dead_code)]

use std::io::Cursor;

use toccata_core::es::{EsFormat, EsHandle, EsOut, Frame, Mtime};
use toccata_core::io::MediaSourceStream;
use toccata_format_mkv::MkvReader;

pub fn write_id(out: &mut Vec<u8>, id: u32) {
    let bytes = id.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    out.extend_from_slice(&bytes[skip..]);
}

fn write_size(out: &mut Vec<u8>, len: usize) {
    if len < 0x7f {
        out.push(0x80 | len as u8);
    }
    else {
        assert!(len < 0x3fff);
        out.push(0x40 | (len >> 8) as u8);
        out.push(len as u8);
    }
}

/// An element with the given payload.
pub fn el(id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    write_id(&mut out, id);
    write_size(&mut out, payload.len());
    out.extend_from_slice(payload);
    out
}

/// An unsigned integer element, minimally encoded.
pub fn uint(id: u32, value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(7);
    el(id, &bytes[skip..])
}

/// An unsigned integer element with a fixed 8-byte payload, so the element length does not
/// depend on the value.
pub fn uint_fixed(id: u32, value: u64) -> Vec<u8> {
    el(id, &value.to_be_bytes())
}

/// A 4-byte float element.
pub fn float4(id: u32, value: f32) -> Vec<u8> {
    el(id, &value.to_be_bytes())
}

/// A string element.
pub fn string(id: u32, value: &str) -> Vec<u8> {
    el(id, value.as_bytes())
}

/// A SimpleBlock element without lacing.
pub fn simple_block(track: u8, timecode: i16, flags: u8, data: &[u8]) -> Vec<u8> {
    let mut payload = vec![0x80 | track];
    payload.extend_from_slice(&timecode.to_be_bytes());
    payload.push(flags);
    payload.extend_from_slice(data);
    el(0xa3, &payload)
}

/// A Block element (for BlockGroups) without lacing.
pub fn block(track: u8, timecode: i16, data: &[u8]) -> Vec<u8> {
    let mut payload = vec![0x80 | track];
    payload.extend_from_slice(&timecode.to_be_bytes());
    payload.push(0x00);
    payload.extend_from_slice(data);
    el(0xa1, &payload)
}

/// A Cluster element with the given timecode (in ticks) and blocks.
pub fn cluster(timecode: u64, blocks: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = uint(0xe7, timecode);
    for b in blocks {
        payload.extend_from_slice(b);
    }
    el(0x1f43b675, &payload)
}

/// An Info element with the given timescale and a fixed duration.
pub fn info(timescale: u64) -> Vec<u8> {
    let mut payload = uint(0x2ad7b1, timescale);
    payload.extend_from_slice(&float4(0x4489, 10_000.0));
    payload.extend_from_slice(&string(0x4d80, "toccata test mux"));
    payload.extend_from_slice(&string(0x5741, "toccata test mux"));
    payload.extend_from_slice(&string(0x7ba9, "Integration Title"));
    el(0x1549a966, &payload)
}

/// A TrackEntry element.
pub fn track_entry(number: u8, track_type: u8, codec_id: &str, extra: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = uint(0xd7, u64::from(number));
    payload.extend_from_slice(&uint(0x73c5, u64::from(number) + 100));
    payload.extend_from_slice(&uint(0x83, u64::from(track_type)));
    payload.extend_from_slice(&string(0x86, codec_id));
    for child in extra {
        payload.extend_from_slice(child);
    }
    el(0xae, &payload)
}

/// A Tracks element.
pub fn tracks(entries: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = Vec::new();
    for entry in entries {
        payload.extend_from_slice(entry);
    }
    el(0x1654ae6b, &payload)
}

/// A Video element with the given frame size.
pub fn video(width: u64, height: u64) -> Vec<u8> {
    let mut payload = uint(0xb0, width);
    payload.extend_from_slice(&uint(0xba, height));
    el(0xe0, &payload)
}

/// An Audio element.
pub fn audio(sampling: f32, output_sampling: Option<f32>, channels: u64) -> Vec<u8> {
    let mut payload = float4(0xb5, sampling);
    if let Some(output) = output_sampling {
        payload.extend_from_slice(&float4(0x78b5, output));
    }
    payload.extend_from_slice(&uint(0x9f, channels));
    el(0xe1, &payload)
}

/// A Cues element: one CuePoint per (time in ticks, track, cluster position relative to the
/// segment payload). Cluster positions are encoded with a fixed width so the element's length
/// does not depend on them.
pub fn cues(points: &[(u64, u8, u64)]) -> Vec<u8> {
    let mut payload = Vec::new();
    for &(time, track, position) in points {
        let mut positions = uint(0xf7, u64::from(track));
        positions.extend_from_slice(&uint_fixed(0xf1, position));

        let mut point = uint(0xb3, time);
        point.extend_from_slice(&el(0xb7, &positions));
        payload.extend_from_slice(&el(0xbb, &point));
    }
    el(0x1c53bb6b, &payload)
}

/// A SeekHead with one entry: (target element id, position relative to the segment payload).
/// Positions are encoded with a fixed width.
pub fn seek_head(target_id: u32, position: u64) -> Vec<u8> {
    let mut target = Vec::new();
    write_id(&mut target, target_id);

    let mut seek = el(0x53ab, &target);
    seek.extend_from_slice(&uint_fixed(0x53ac, position));
    el(0x114d9b74, &el(0x4dbb, &seek))
}

/// The EBML header of a Matroska file.
pub fn ebml_header() -> Vec<u8> {
    el(0x1a45dfa3, &string(0x4282, "matroska"))
}

/// Accumulates segment children and builds the complete file around them. The segment is
/// written with an unknown size.
#[derive(Default)]
pub struct FileBuilder {
    children: Vec<u8>,
}

impl FileBuilder {
    pub fn new() -> Self {
        FileBuilder::default()
    }

    /// Byte offset of the segment payload within the built file.
    pub fn segment_data_offset() -> u64 {
        // EBML header, then the segment's 4-byte id and 1-byte unknown size.
        (ebml_header().len() + 5) as u64
    }

    /// Append one child, returning its offset relative to the segment payload.
    pub fn push(&mut self, bytes: &[u8]) -> u64 {
        let at = self.children.len() as u64;
        self.children.extend_from_slice(bytes);
        at
    }

    /// Absolute file offset of a child previously returned by `push`.
    pub fn absolute(relative: u64) -> u64 {
        Self::segment_data_offset() + relative
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = ebml_header();
        write_id(&mut out, 0x18538067);
        out.push(0xff);
        out.extend_from_slice(&self.children);
        out
    }
}

/// Open a built file.
pub fn open(data: Vec<u8>) -> MkvReader {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)));
    MkvReader::try_new(mss).expect("reader")
}

/// An `EsOut` that records everything the demuxer tells it.
#[derive(Default)]
pub struct CaptureEsOut {
    next_handle: u64,
    pub added: Vec<(EsHandle, EsFormat)>,
    pub deleted: Vec<EsHandle>,
    pub sent: Vec<(EsHandle, Frame)>,
    pub defaults: Vec<EsHandle>,
    pub pcr: Option<Mtime>,
    pub next_display_time: Option<Mtime>,
}

impl CaptureEsOut {
    pub fn new() -> Self {
        CaptureEsOut::default()
    }
}

impl EsOut for CaptureEsOut {
    fn add(&mut self, format: &EsFormat) -> EsHandle {
        let handle = EsHandle(self.next_handle);
        self.next_handle += 1;
        self.added.push((handle, format.clone()));
        handle
    }

    fn del(&mut self, handle: EsHandle) {
        self.deleted.push(handle);
    }

    fn send(&mut self, handle: EsHandle, frame: Frame) {
        self.sent.push((handle, frame));
    }

    fn set_es_default(&mut self, handle: EsHandle) {
        self.defaults.push(handle);
    }

    fn set_pcr(&mut self, pcr: Mtime) {
        self.pcr = Some(pcr);
    }

    fn set_next_display_time(&mut self, time: Mtime) {
        self.next_display_time = Some(time);
    }
}
