// Toccata
// Copyright (c) 2022-2024 The Project Toccata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The level-aware element cursor over a segment.
//!
//! EBML is a strictly nested grammar, so traversal is a cursor plus a stack of open master
//! elements. [`EbmlParser::get`] yields the next child of the innermost open element, [`down`]
//! opens the most recently yielded master, [`up`] closes it, and [`unget`] rebuilds the stack at a
//! remembered (block, cluster) position so extraction can resume mid-stream after a seek.
//!
//! [`down`]: EbmlParser::down
//! [`up`]: EbmlParser::up
//! [`unget`]: EbmlParser::unget

use std::io::{Seek, SeekFrom};

use toccata_core::errors::{decode_error, Error, Result};
use toccata_core::io::ReadBytes;

use crate::ebml::{read_binary, read_date, read_float, read_signed, read_size, read_string, read_tag, read_unsigned};
use crate::element_ids::{element_type, lookup, ElementType, Type};

/// A parsed element header: the element ID, its class, and where its payload lives.
#[derive(Copy, Clone, Debug)]
pub struct ElementHeader {
    /// The element ID, including the length marker.
    pub tag: u32,
    /// The element class.
    pub etype: ElementType,
    /// The position of the first byte of the element.
    pub pos: u64,
    /// The position of the first byte of the payload.
    pub data_pos: u64,
    /// The payload length. `None` for an element of unknown size.
    pub data_len: Option<u64>,
}

impl ElementHeader {
    /// Read one element header at the current stream position.
    pub(crate) fn read<R: ReadBytes>(reader: &mut R) -> Result<ElementHeader> {
        let pos = reader.pos();
        let tag = read_tag(&mut *reader)?;
        let data_len = read_size(&mut *reader)?;
        Ok(ElementHeader { tag, etype: element_type(tag), pos, data_pos: reader.pos(), data_len })
    }

    /// The position one past the last payload byte, if the size is known.
    pub(crate) fn end(&self) -> Option<u64> {
        self.data_len.map(|len| self.data_pos + len)
    }

    /// Whether the element is a master (container) element.
    pub(crate) fn is_master(&self) -> bool {
        matches!(lookup(self.tag), Some((Type::Master, _)))
    }

    /// The payload length, or a decode error for an unknown-size element. Only master elements
    /// may be of unknown size.
    fn bounded_len(&self) -> Result<u64> {
        match self.data_len {
            Some(len) => Ok(len),
            None => decode_error("mkv: primitive element of unknown size"),
        }
    }

    /// Position the reader at the payload. A re-emitted or remembered header may be read from
    /// anywhere in the stream.
    fn prepare<B: ReadBytes + Seek>(&self, reader: &mut B) -> Result<u64> {
        if reader.pos() != self.data_pos {
            reader.seek(SeekFrom::Start(self.data_pos))?;
        }
        self.bounded_len()
    }

    /// Decode the payload as an unsigned integer.
    pub(crate) fn read_uint<B: ReadBytes + Seek>(&self, reader: &mut B) -> Result<u64> {
        let len = self.prepare(reader)?;
        read_unsigned(reader, len)
    }

    /// Decode the payload as a signed integer.
    pub(crate) fn read_sint<B: ReadBytes + Seek>(&self, reader: &mut B) -> Result<i64> {
        let len = self.prepare(reader)?;
        read_signed(reader, len)
    }

    /// Decode the payload as a date.
    pub(crate) fn read_date<B: ReadBytes + Seek>(&self, reader: &mut B) -> Result<i64> {
        let len = self.prepare(reader)?;
        read_date(reader, len)
    }

    /// Decode the payload as a floating point value.
    pub(crate) fn read_float<B: ReadBytes + Seek>(&self, reader: &mut B) -> Result<f64> {
        let len = self.prepare(reader)?;
        read_float(reader, len)
    }

    /// Decode the payload as a UTF-8 string.
    pub(crate) fn read_string<B: ReadBytes + Seek>(&self, reader: &mut B) -> Result<String> {
        let len = self.prepare(reader)?;
        read_string(reader, len)
    }

    /// Read the payload as a binary blob.
    pub(crate) fn read_binary<B: ReadBytes + Seek>(&self, reader: &mut B) -> Result<Box<[u8]>> {
        let len = self.prepare(reader)?;
        read_binary(reader, len)
    }
}

/// `EbmlParser` is the stateful cursor used to walk a master element's descendants.
///
/// The parser holds no reference to the stream; every operation that touches bytes borrows it,
/// so one stream can serve the main cursor and any number of deferred loads.
pub(crate) struct EbmlParser {
    /// Payload start of the base container.
    base_pos: u64,
    /// Payload end of the base container, if its size is known.
    base_end: Option<u64>,
    /// Open master elements, outermost first. `len()` is the current depth below the base.
    stack: Vec<ElementHeader>,
    /// The most recently yielded element.
    current: Option<ElementHeader>,
    /// Position of the next sibling to yield.
    next_pos: u64,
    /// When set, the next `get` re-emits `current` instead of advancing.
    keep: bool,
}

impl EbmlParser {
    /// Create a cursor over the children of a container spanning `[base_pos, base_end)`.
    pub(crate) fn new(base_pos: u64, base_end: Option<u64>) -> Self {
        EbmlParser { base_pos, base_end, stack: Vec::new(), current: None, next_pos: base_pos, keep: false }
    }

    /// Create a cursor over the children of the given master element.
    pub(crate) fn of(header: ElementHeader) -> Self {
        Self::new(header.data_pos, header.end())
    }

    /// The nesting level the cursor yields elements at. Children of the base container are
    /// level 1.
    pub(crate) fn level(&self) -> usize {
        self.stack.len() + 1
    }

    /// Whether an open master element starts at the given position.
    pub(crate) fn is_top_present(&self, pos: u64) -> bool {
        self.stack.iter().any(|frame| frame.pos == pos)
    }

    /// The end of the innermost open scope, if bounded.
    fn scope_end(&self) -> Option<u64> {
        match self.stack.last() {
            Some(frame) => frame.end(),
            None => self.base_end,
        }
    }

    /// Yield the next child of the innermost open element, or `None` when the scope is exhausted.
    ///
    /// Inside an unknown-size scope, the appearance of a segment-level element class closes the
    /// scope implicitly and the element is yielded one level up.
    pub(crate) fn get<B: ReadBytes + Seek>(&mut self, reader: &mut B) -> Result<Option<ElementHeader>> {
        if self.keep {
            self.keep = false;
            return Ok(self.current);
        }

        if let Some(end) = self.scope_end() {
            if self.next_pos >= end {
                return Ok(None);
            }
        }

        if reader.pos() != self.next_pos {
            reader.seek(SeekFrom::Start(self.next_pos))?;
        }

        let header = match ElementHeader::read(reader) {
            Ok(header) => header,
            // A clean end of stream terminates the walk.
            Err(Error::EndOfStream) => return Ok(None),
            Err(err) => return Err(err),
        };

        // An unknown-size master extends until an element of a lower level appears.
        while self.scope_end().is_none() && !self.stack.is_empty() && header.etype.is_top_level() {
            self.stack.pop();
        }

        self.current = Some(header);
        self.next_pos = match header.end() {
            Some(end) => end,
            // An unknown-size element cannot be skipped over; stay at its payload.
            None => header.data_pos,
        };

        Ok(Some(header))
    }

    /// Open the most recently yielded master element. Subsequent `get` calls yield its children.
    pub(crate) fn down(&mut self) -> Result<()> {
        let header = match self.current.take() {
            Some(header) if header.is_master() => header,
            _ => return decode_error("mkv: cannot descend into a non-master element"),
        };
        self.next_pos = header.data_pos;
        self.stack.push(header);
        Ok(())
    }

    /// Close the innermost open element and position at its first following sibling.
    pub(crate) fn up(&mut self) {
        if let Some(frame) = self.stack.pop() {
            if let Some(end) = frame.end() {
                self.next_pos = end;
            }
        }
        self.current = None;
        self.keep = false;
    }

    /// Re-emit the most recently yielded element on the next `get`, leaving the cursor in the
    /// parent's scope. Used to hand a block off to the caller without closing the enclosing
    /// group.
    pub(crate) fn keep(&mut self) {
        if self.current.is_some() {
            self.keep = true;
        }
    }

    /// Rewind to a remembered (block, cluster) pair: rebuild the stack so the cluster at
    /// `cluster_pos` is the open level-1 element and reading continues at `block_pos`. Returns
    /// the cluster's header.
    pub(crate) fn unget<B: ReadBytes + Seek>(
        &mut self,
        reader: &mut B,
        block_pos: u64,
        cluster_pos: u64,
    ) -> Result<ElementHeader> {
        reader.seek(SeekFrom::Start(cluster_pos))?;
        let cluster = ElementHeader::read(reader)?;
        if cluster.etype != ElementType::Cluster {
            return decode_error("mkv: unget position is not a cluster");
        }

        self.stack.clear();
        self.stack.push(cluster);
        self.current = None;
        self.keep = false;
        self.next_pos = block_pos;

        Ok(cluster)
    }

    /// Discard the stack and position at the base container's data start.
    pub(crate) fn reset(&mut self) {
        self.restart_at(self.base_pos);
    }

    /// Discard the stack and position at an arbitrary byte offset within the base container.
    pub(crate) fn restart_at(&mut self, pos: u64) {
        self.stack.clear();
        self.current = None;
        self.keep = false;
        self.next_pos = pos;
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use toccata_core::io::MediaSourceStream;

    use super::*;
    use crate::element_ids::ElementType;

    fn write_id(out: &mut Vec<u8>, id: u32) {
        let bytes = id.to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        out.extend_from_slice(&bytes[skip..]);
    }

    fn el(id: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        write_id(&mut out, id);
        assert!(payload.len() < 127);
        out.push(0x80 | payload.len() as u8);
        out.extend_from_slice(payload);
        out
    }

    fn stream(data: Vec<u8>) -> MediaSourceStream {
        MediaSourceStream::new(Box::new(Cursor::new(data)))
    }

    #[test]
    fn verify_walk_down_up() {
        // Cluster { Timestamp(1), BlockGroup { Block } }, Cluster { Timestamp(2) }
        let block = el(0xa1, &[0x81, 0x00, 0x01, 0x00, 0xaa]);
        let group = el(0xa0, &block);
        let mut c1_payload = el(0xe7, &[1]);
        c1_payload.extend_from_slice(&group);
        let c1 = el(0x1f43b675, &c1_payload);
        let c2 = el(0x1f43b675, &el(0xe7, &[2]));

        let mut data = c1.clone();
        data.extend_from_slice(&c2);
        let mut io = stream(data);
        let mut ep = EbmlParser::new(0, None);

        let cluster = ep.get(&mut io).unwrap().unwrap();
        assert_eq!(cluster.etype, ElementType::Cluster);
        assert_eq!(ep.level(), 1);

        ep.down().unwrap();
        assert_eq!(ep.level(), 2);
        assert!(ep.is_top_present(cluster.pos));

        let ts = ep.get(&mut io).unwrap().unwrap();
        assert_eq!(ts.etype, ElementType::Timestamp);

        let group = ep.get(&mut io).unwrap().unwrap();
        assert_eq!(group.etype, ElementType::BlockGroup);
        ep.down().unwrap();

        let blk = ep.get(&mut io).unwrap().unwrap();
        assert_eq!(blk.etype, ElementType::Block);
        assert!(ep.get(&mut io).unwrap().is_none());

        ep.up();
        assert!(ep.get(&mut io).unwrap().is_none());
        ep.up();

        let next = ep.get(&mut io).unwrap().unwrap();
        assert_eq!(next.etype, ElementType::Cluster);
        assert_eq!(next.pos, c1.len() as u64);
    }

    #[test]
    fn verify_keep_reemits() {
        let data = el(0xe7, &[5]);
        let mut io = stream(data);
        let mut ep = EbmlParser::new(0, None);

        let first = ep.get(&mut io).unwrap().unwrap();
        ep.keep();
        let again = ep.get(&mut io).unwrap().unwrap();
        assert_eq!(first.pos, again.pos);
        assert_eq!(first.tag, again.tag);
        assert!(ep.get(&mut io).unwrap().is_none());
    }

    #[test]
    fn verify_unget_rebuilds_stack() {
        // Two clusters, each holding one timestamp element.
        let c1 = el(0x1f43b675, &el(0xe7, &[1]));
        let c2 = el(0x1f43b675, &el(0xe7, &[2]));
        let mut data = c1.clone();
        data.extend_from_slice(&c2);

        let mut io = stream(data);
        let mut ep = EbmlParser::new(0, None);

        // Walk to the end.
        while ep.get(&mut io).unwrap().is_some() {}

        // Rewind into the first cluster, at its first child.
        let ts_pos = c1.len() as u64 - 3;
        let cluster = ep.unget(&mut io, ts_pos, 0).unwrap();
        assert_eq!(cluster.etype, ElementType::Cluster);
        assert_eq!(ep.level(), 2);

        let ts = ep.get(&mut io).unwrap().unwrap();
        assert_eq!(ts.etype, ElementType::Timestamp);
        assert_eq!(ts.pos, ts_pos);
    }

    #[test]
    fn verify_unknown_size_scope_closes_on_top_level() {
        // An unknown-size cluster followed by a sized cluster.
        let mut data = Vec::new();
        write_id(&mut data, 0x1f43b675);
        data.push(0xff); // unknown size
        data.extend_from_slice(&el(0xe7, &[1]));
        let second_pos = data.len() as u64;
        data.extend_from_slice(&el(0x1f43b675, &el(0xe7, &[2])));

        let mut io = stream(data);
        let mut ep = EbmlParser::new(0, None);

        let first = ep.get(&mut io).unwrap().unwrap();
        assert_eq!(first.etype, ElementType::Cluster);
        assert_eq!(first.data_len, None);
        ep.down().unwrap();

        let ts = ep.get(&mut io).unwrap().unwrap();
        assert_eq!(ts.etype, ElementType::Timestamp);

        // The next element is a cluster: the unknown-size scope closes and it is yielded at
        // level 1.
        let second = ep.get(&mut io).unwrap().unwrap();
        assert_eq!(second.etype, ElementType::Cluster);
        assert_eq!(second.pos, second_pos);
        assert_eq!(ep.level(), 1);
    }
}
