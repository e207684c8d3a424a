// Toccata
// Copyright (c) 2022-2024 The Project Toccata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The top-level reader: EBML header validation and Segment discovery.

use std::io::{Seek, SeekFrom};

use toccata_core::errors::{unsupported_error, Error, Result};
use toccata_core::io::MediaSourceStream;

use crate::element_ids::ElementType;
use crate::parser::{EbmlParser, ElementHeader};
use crate::segment::MatroskaSegment;

/// The EBML header magic of a Matroska or WebM stream.
pub const MKV_MARKER: [u8; 4] = [0x1a, 0x45, 0xdf, 0xa3];

/// Quick signature check for format probing.
pub fn is_mkv_marker(marker: [u8; 4]) -> bool {
    marker == MKV_MARKER
}

/// A Matroska / WebM reader: the validated EBML header plus the stream's first segment.
pub struct MkvReader {
    /// The segment holding all media.
    pub segment: MatroskaSegment,
    /// The document type declared by the EBML header, `matroska` or `webm`.
    pub doc_type: String,
}

impl MkvReader {
    /// Attempt to instantiate a reader over the stream: validate the EBML header's DocType and
    /// locate the Segment element. The segment is not preloaded yet.
    pub fn try_new(mut io: MediaSourceStream) -> Result<MkvReader> {
        let ebml = ElementHeader::read(&mut io)?;
        if ebml.etype != ElementType::Ebml {
            return unsupported_error("mkv: missing ebml header");
        }

        let mut doc_type = None;
        let mut it = EbmlParser::of(ebml);
        while let Some(el) = it.get(&mut io)? {
            match el.etype {
                ElementType::DocType => doc_type = Some(el.read_string(&mut io)?),
                ElementType::EbmlVersion
                | ElementType::EbmlReadVersion
                | ElementType::EbmlMaxIdLength
                | ElementType::EbmlMaxSizeLength
                | ElementType::DocTypeVersion
                | ElementType::DocTypeReadVersion
                | ElementType::Void
                | ElementType::Crc32 => (),
                other => log::debug!("+ ebml header unknown ({:?})", other),
            }
        }

        let doc_type = match doc_type {
            Some(doc_type) if matches!(doc_type.as_str(), "matroska" | "webm") => doc_type,
            _ => return unsupported_error("mkv: not a matroska / webm file"),
        };

        if let Some(end) = ebml.end() {
            io.seek(SeekFrom::Start(end))?;
        }

        // The segment should be the next non-global top-level element.
        loop {
            let el = match ElementHeader::read(&mut io) {
                Ok(el) => el,
                Err(Error::EndOfStream) => {
                    return unsupported_error("mkv: missing segment element");
                }
                Err(err) => return Err(err),
            };

            match el.etype {
                ElementType::Segment => {
                    return Ok(MkvReader { segment: MatroskaSegment::new(io, el), doc_type });
                }
                ElementType::Void | ElementType::Crc32 => match el.end() {
                    Some(end) => io.seek(SeekFrom::Start(end)).map(|_| ())?,
                    None => return unsupported_error("mkv: missing segment element"),
                },
                _ => return unsupported_error("mkv: missing segment element"),
            }
        }
    }
}
