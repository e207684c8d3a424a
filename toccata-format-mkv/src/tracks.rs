// Toccata
// Copyright (c) 2022-2024 The Project Toccata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Track model and the parsing of the Tracks element.

use std::io::{Seek, SeekFrom};

use toccata_core::errors::Result;
use toccata_core::es::{EsFormat, EsHandle, Mtime, StreamCategory};
use toccata_core::io::ReadBytes;

use crate::element_ids::ElementType;
use crate::parser::{EbmlParser, ElementHeader};

/// Codec-specific per-track sub-parser state, initialized during activation.
#[derive(Clone, Debug)]
pub enum SubParserState {
    /// RealAudio Cook/ATRAC interleaver parameters.
    Cook { sub_packet_h: u16, frame_size: u16, sub_packet_size: u16 },
}

/// One Matroska track.
#[derive(Debug)]
pub struct Track {
    /// The track number blocks refer to. 1-based, unique within the segment.
    pub number: u64,
    /// The globally unique track identifier.
    pub uid: u64,
    /// The elementary stream descriptor, progressively filled by parsing and activation.
    pub fmt: EsFormat,
    pub enabled: bool,
    pub default: bool,
    pub forced: bool,
    /// The container-level codec identifier, e.g. `V_MPEG4/ISO/AVC`.
    pub codec_id: Option<String>,
    /// The opaque codec initialization blob.
    pub codec_private: Option<Box<[u8]>>,
    pub codec_name: Option<String>,
    pub name: Option<String>,
    pub language: Option<String>,
    /// Default frame duration in nanoseconds. 0 if unset.
    pub default_duration: u64,
    /// The input sample rate, before any SBR doubling recorded in OutputSamplingFrequency.
    pub original_rate: u32,
    /// Frames of this track carry only a DTS (e.g. VfW video).
    pub dts_only: bool,
    /// Frames of this track carry only a PTS (e.g. Theora, VP8).
    pub pts_only: bool,
    /// The track is silent within the current cluster.
    pub silent: bool,
    /// Codec-specific sub-parser state.
    pub sub_parser: Option<SubParserState>,
    /// The live output stream, once the track is activated.
    pub es: Option<EsHandle>,
    /// The DTS of the last delivered frame.
    pub last_dts: Option<Mtime>,
}

impl Default for Track {
    fn default() -> Self {
        Track {
            number: 0,
            uid: 0,
            fmt: EsFormat::new(StreamCategory::Unknown),
            enabled: true,
            default: true,
            forced: false,
            codec_id: None,
            codec_private: None,
            codec_name: None,
            name: None,
            language: None,
            default_duration: 0,
            original_rate: 0,
            dts_only: false,
            pts_only: false,
            silent: false,
            sub_parser: None,
            es: None,
            last_dts: None,
        }
    }
}

fn track_category(track_type: u64) -> StreamCategory {
    match track_type {
        0x01 => StreamCategory::Video,
        0x02 => StreamCategory::Audio,
        0x11 => StreamCategory::Subtitle,
        0x12 => StreamCategory::Button,
        _ => StreamCategory::Unknown,
    }
}

fn parse_video<B: ReadBytes + Seek>(io: &mut B, header: ElementHeader, fmt: &mut EsFormat) -> Result<()> {
    let mut it = EbmlParser::of(header);
    while let Some(el) = it.get(io)? {
        match el.etype {
            ElementType::PixelWidth => fmt.video.width = el.read_uint(io)? as u32,
            ElementType::PixelHeight => fmt.video.height = el.read_uint(io)? as u32,
            ElementType::FrameRate => {
                // Deprecated, but still found in the wild.
                let fps = el.read_float(io)?;
                if fps > 0.0 {
                    fmt.video.frame_rate = (fps * 1000.0).round() as u32;
                    fmt.video.frame_rate_base = 1000;
                }
            }
            ElementType::FlagInterlaced
            | ElementType::StereoMode
            | ElementType::DisplayWidth
            | ElementType::DisplayHeight
            | ElementType::DisplayUnit
            | ElementType::AspectRatioType
            | ElementType::PixelCropBottom
            | ElementType::PixelCropTop
            | ElementType::PixelCropLeft
            | ElementType::PixelCropRight => (),
            other => log::debug!("|   |   |   + unused video element {:?}", other),
        }
    }
    Ok(())
}

fn parse_audio<B: ReadBytes + Seek>(
    io: &mut B,
    header: ElementHeader,
    fmt: &mut EsFormat,
    original_rate: &mut u32,
) -> Result<()> {
    let mut it = EbmlParser::of(header);

    let mut sampling = 8000.0;
    let mut output_sampling = None;
    let mut channels = 1;
    let mut bit_depth = 0;

    while let Some(el) = it.get(io)? {
        match el.etype {
            ElementType::SamplingFrequency => sampling = el.read_float(io)?,
            ElementType::OutputSamplingFrequency => output_sampling = Some(el.read_float(io)?),
            ElementType::Channels => channels = el.read_uint(io)?,
            ElementType::BitDepth => bit_depth = el.read_uint(io)?,
            other => log::debug!("|   |   |   + unused audio element {:?}", other),
        }
    }

    *original_rate = sampling.round() as u32;
    fmt.audio.rate = output_sampling.unwrap_or(sampling).round() as u32;
    fmt.audio.channels = channels as u32;
    fmt.audio.bits_per_sample = bit_depth as u32;
    Ok(())
}

fn parse_track_entry<B: ReadBytes + Seek>(io: &mut B, header: ElementHeader) -> Result<Track> {
    let mut track = Track::default();

    let mut it = EbmlParser::of(header);
    while let Some(el) = it.get(io)? {
        match el.etype {
            ElementType::TrackNumber => track.number = el.read_uint(io)?,
            ElementType::TrackUid => track.uid = el.read_uint(io)?,
            ElementType::TrackType => {
                track.fmt.category = track_category(el.read_uint(io)?);
            }
            ElementType::FlagEnabled => track.enabled = el.read_uint(io)? != 0,
            ElementType::FlagDefault => track.default = el.read_uint(io)? != 0,
            ElementType::FlagForced => track.forced = el.read_uint(io)? != 0,
            ElementType::FlagLacing => (),
            ElementType::DefaultDuration => track.default_duration = el.read_uint(io)?,
            ElementType::Name => track.name = Some(el.read_string(io)?),
            ElementType::Language => track.language = Some(el.read_string(io)?),
            ElementType::CodecId => track.codec_id = Some(el.read_string(io)?),
            ElementType::CodecName => track.codec_name = Some(el.read_string(io)?),
            ElementType::CodecPrivate => track.codec_private = Some(el.read_binary(io)?),
            ElementType::CodecDelay | ElementType::SeekPreRoll => (),
            ElementType::Video => parse_video(io, el, &mut track.fmt)?,
            ElementType::Audio => {
                parse_audio(io, el, &mut track.fmt, &mut track.original_rate)?;
            }
            other => log::debug!("|   |   + unused track element {:?}", other),
        }
    }

    log::debug!(
        "|   |   + track number={} codec={:?} cat={:?}",
        track.number,
        track.codec_id,
        track.fmt.category
    );

    Ok(track)
}

/// Parse a Tracks element into the track list. The reader may be positioned anywhere; it is
/// moved to the element's payload first.
pub(crate) fn parse_tracks<B: ReadBytes + Seek>(io: &mut B, header: ElementHeader) -> Result<Vec<Track>> {
    if io.pos() != header.data_pos {
        io.seek(SeekFrom::Start(header.data_pos))?;
    }

    let mut tracks = Vec::new();
    let mut it = EbmlParser::of(header);
    while let Some(el) = it.get(io)? {
        match el.etype {
            ElementType::TrackEntry => match parse_track_entry(io, el) {
                Ok(track) => tracks.push(track),
                Err(err) => log::warn!("broken track entry skipped ({})", err),
            },
            ElementType::Void | ElementType::Crc32 => (),
            other => log::debug!("|   + unused tracks element {:?}", other),
        }
    }
    Ok(tracks)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use toccata_core::es::StreamCategory;
    use toccata_core::io::MediaSourceStream;

    use super::*;
    use crate::parser::ElementHeader;

    fn el(id: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let bytes = id.to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        out.extend_from_slice(&bytes[skip..]);
        assert!(payload.len() < 127);
        out.push(0x80 | payload.len() as u8);
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn verify_track_entry_parsing() {
        let mut entry = Vec::new();
        entry.extend_from_slice(&el(0xd7, &[2])); // TrackNumber
        entry.extend_from_slice(&el(0x83, &[2])); // TrackType: audio
        entry.extend_from_slice(&el(0x55aa, &[1])); // FlagForced
        entry.extend_from_slice(&el(0x86, b"A_AAC/MPEG4/LC")); // CodecID
        entry.extend_from_slice(&el(0x22b59c, b"fre")); // Language

        // Audio { SamplingFrequency: 22050.0, OutputSamplingFrequency: 44100.0, Channels: 2 }
        let mut audio = Vec::new();
        audio.extend_from_slice(&el(0xb5, &22050.0f32.to_be_bytes()));
        audio.extend_from_slice(&el(0x78b5, &44100.0f32.to_be_bytes()));
        audio.extend_from_slice(&el(0x9f, &[2]));
        entry.extend_from_slice(&el(0xe1, &audio));

        let tracks = el(0x1654ae6b, &el(0xae, &entry));

        let mut io = MediaSourceStream::new(Box::new(Cursor::new(tracks)));
        let header = ElementHeader::read(&mut io).unwrap();
        let tracks = parse_tracks(&mut io, header).unwrap();

        assert_eq!(tracks.len(), 1);
        let tk = &tracks[0];
        assert_eq!(tk.number, 2);
        assert_eq!(tk.fmt.category, StreamCategory::Audio);
        assert!(tk.forced);
        assert!(tk.enabled);
        assert_eq!(tk.codec_id.as_deref(), Some("A_AAC/MPEG4/LC"));
        assert_eq!(tk.language.as_deref(), Some("fre"));
        assert_eq!(tk.original_rate, 22050);
        assert_eq!(tk.fmt.audio.rate, 44100);
        assert_eq!(tk.fmt.audio.channels, 2);
    }
}
