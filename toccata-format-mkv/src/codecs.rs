// Toccata
// Copyright (c) 2022-2024 The Project Toccata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Track activation: translation of container-level codec identifiers and `CodecPrivate` blobs
//! into normalized elementary stream descriptors.

use std::collections::HashMap;

use lazy_static::lazy_static;

use toccata_core::fourcc;
use toccata_core::fourcc::FourCc;

use crate::tracks::{SubParserState, Track};

/// The 13-entry MPEG-4 audio sampling frequency table.
const AAC_SAMPLE_RATES: [u32; 13] =
    [96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350];

lazy_static! {
    /// WAVEFORMATEX wFormatTag to normalized codec mapping.
    static ref WF_TAG_TO_FOURCC: HashMap<u16, FourCc> = {
        let mut tags = HashMap::new();
        tags.insert(0x0001, fourcc::CODEC_PCM_ARAW); // WAVE_FORMAT_PCM
        tags.insert(0x0003, fourcc::CODEC_PCM_ARAW); // WAVE_FORMAT_IEEE_FLOAT
        tags.insert(0x0006, fourcc::CODEC_ALAW);
        tags.insert(0x0007, fourcc::CODEC_MULAW);
        tags.insert(0x0050, fourcc::CODEC_MPGA); // MPEG layer 1/2
        tags.insert(0x0055, fourcc::CODEC_MPGA); // MPEG layer 3
        tags.insert(0x0161, fourcc::CODEC_WMA2);
        tags.insert(0x2000, fourcc::CODEC_A52);
        tags.insert(0x2001, fourcc::CODEC_DTS);
        tags.insert(0x566f, fourcc::CODEC_VORBIS);
        tags
    };
}

#[inline]
fn u16_le(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

#[inline]
fn u32_le(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[inline]
fn u16_be(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

/// Copy the codec private data past `offset` into the descriptor's extradata.
fn fill_extra_data(track: &mut Track, offset: usize) {
    let extra = track.codec_private.as_deref().unwrap_or(&[]);
    if extra.len() > offset {
        track.fmt.extra_data = extra[offset..].to_vec();
    }
}

/// The length of a BITMAPINFOHEADER.
const BITMAPINFOHEADER_LEN: usize = 40;
/// The length of a WAVEFORMATEX up to and including cbSize.
const WAVEFORMATEX_LEN: usize = 18;

fn activate_vfw(track: &mut Track) {
    let extra = track.codec_private.as_deref().unwrap_or(&[]);
    if extra.len() < BITMAPINFOHEADER_LEN {
        log::error!("missing/invalid BITMAPINFOHEADER");
        track.fmt.codec = Some(fourcc::CODEC_UNDF);
    }
    else {
        let bi_size = u32_le(extra, 0) as usize;
        track.fmt.video.width = u32_le(extra, 4);
        track.fmt.video.height = u32_le(extra, 8);
        track.fmt.codec =
            Some(FourCc::new([extra[16], extra[17], extra[18], extra[19]]));

        // Extradata is whatever biSize declares past the header, clamped to the buffer.
        let declared = bi_size.saturating_sub(BITMAPINFOHEADER_LEN);
        let available = extra.len() - BITMAPINFOHEADER_LEN;
        let len = declared.min(available);
        if len > 0 {
            track.fmt.extra_data =
                extra[BITMAPINFOHEADER_LEN..BITMAPINFOHEADER_LEN + len].to_vec();
        }
    }
    track.dts_only = true;
}

fn activate_real_video(track: &mut Track, codec_id: &str) {
    track.fmt.codec = Some(match codec_id {
        "V_REAL/RV10" => fourcc::CODEC_RV10,
        "V_REAL/RV20" => fourcc::CODEC_RV20,
        "V_REAL/RV30" => fourcc::CODEC_RV30,
        _ => fourcc::CODEC_RV40,
    });

    // The frame rate hides in the "VIDO" header when present.
    let extra = track.codec_private.as_deref().unwrap_or(&[]);
    if extra.len() >= 26
        && extra[4..10] == *b"VIDORV"
        && (extra[10] == b'3' || extra[10] == b'4')
        && extra[11] == b'0'
    {
        track.fmt.video.frame_rate = u32::from_be_bytes([extra[22], extra[23], extra[24], extra[25]]);
        track.fmt.video.frame_rate_base = 65536;
    }

    fill_extra_data(track, 26);
    track.dts_only = true;
}

fn activate_quicktime(track: &mut Track) {
    // CodecPrivate is one QuickTime visual sample description box: 32-bit size, the codec
    // fourcc, then the fixed-layout description with the frame size at offsets 32 and 34.
    let extra = track.codec_private.as_deref().unwrap_or(&[]);
    if extra.len() < 36 {
        log::error!("missing/invalid QuickTime sample description");
        track.fmt.codec = Some(fourcc::CODEC_UNDF);
        return;
    }

    track.fmt.codec = Some(FourCc::new([extra[4], extra[5], extra[6], extra[7]]));
    track.fmt.video.width = u32::from(u16_be(extra, 32));
    track.fmt.video.height = u32::from(u16_be(extra, 34));
    track.fmt.extra_data = extra.to_vec();
}

fn activate_acm(track: &mut Track) {
    let extra = track.codec_private.as_deref().unwrap_or(&[]);
    if extra.len() < WAVEFORMATEX_LEN {
        log::error!("missing/invalid WAVEFORMATEX");
        track.fmt.codec = Some(fourcc::CODEC_UNDF);
        return;
    }

    let tag = u16_le(extra, 0);
    let codec = WF_TAG_TO_FOURCC.get(&tag).copied().unwrap_or(fourcc::CODEC_UNDF);
    if codec == fourcc::CODEC_UNDF {
        log::error!("unrecognized wf tag: 0x{:x}", tag);
    }
    track.fmt.codec = Some(codec);

    track.fmt.audio.channels = u32::from(u16_le(extra, 2));
    track.fmt.audio.rate = u32_le(extra, 4);
    track.fmt.audio.bitrate = u32_le(extra, 8).saturating_mul(8);
    track.fmt.audio.block_align = u32::from(u16_le(extra, 12));
    track.fmt.audio.bits_per_sample = u32::from(u16_le(extra, 14));

    let cb_size = u16_le(extra, 16) as usize;
    let available = extra.len() - WAVEFORMATEX_LEN;
    let len = cb_size.min(available);
    if len > 0 {
        track.fmt.extra_data = extra[WAVEFORMATEX_LEN..WAVEFORMATEX_LEN + len].to_vec();
    }
}

fn activate_aac(track: &mut Track, codec_id: &str) {
    track.fmt.codec = Some(fourcc::CODEC_MP4A);

    // Synthesize the two-byte AudioSpecificConfig the decoder expects, with the optional
    // explicit SBR signalling extension.
    let (profile, sbr) = match &codec_id[12..] {
        "MAIN" => (0u8, false),
        "LC" => (1, false),
        "SSR" => (2, false),
        "LC/SBR" => (1, true),
        _ => (3, false),
    };

    let rate_index = AAC_SAMPLE_RATES
        .iter()
        .position(|&rate| rate == track.original_rate)
        .unwrap_or(AAC_SAMPLE_RATES.len()) as u8;

    log::debug!("aac profile={} srate={}", profile, rate_index);

    let channels = track.fmt.audio.channels as u8;

    let mut extra = vec![0u8; if sbr { 5 } else { 2 }];
    extra[0] = ((profile + 1) << 3) | ((rate_index & 0xe) >> 1);
    extra[1] = ((rate_index & 0x1) << 7) | (channels << 3);
    if sbr {
        const SYNC_EXTENSION_TYPE: u16 = 0x2b7;
        let out_index = AAC_SAMPLE_RATES
            .iter()
            .position(|&rate| rate == track.fmt.audio.rate)
            .unwrap_or(AAC_SAMPLE_RATES.len()) as u8;
        extra[2] = (SYNC_EXTENSION_TYPE >> 3) as u8;
        extra[3] = (((SYNC_EXTENSION_TYPE & 0x7) << 5) as u8) | 5;
        extra[4] = (1 << 7) | (out_index << 3);
    }
    track.fmt.extra_data = extra;
}

fn activate_tta(track: &mut Track) {
    track.fmt.codec = Some(fourcc::CODEC_TTA);

    if track.codec_private.as_deref().map_or(0, <[u8]>::len) > 0 {
        fill_extra_data(track, 0);
        return;
    }

    // No codec private data: synthesize a TTA1 file header with an unknown sample count.
    let mut extra = vec![0u8; 30];
    extra[0..4].copy_from_slice(b"TTA1");
    extra[4..6].copy_from_slice(&1u16.to_le_bytes());
    extra[6..8].copy_from_slice(&(track.fmt.audio.channels as u16).to_le_bytes());
    extra[8..10].copy_from_slice(&(track.fmt.audio.bits_per_sample as u16).to_le_bytes());
    extra[10..14].copy_from_slice(&track.fmt.audio.rate.to_le_bytes());
    extra[14..18].copy_from_slice(&0xffff_ffffu32.to_le_bytes());
    track.fmt.extra_data = extra;
}

fn activate_real_audio(track: &mut Track, codec_id: &str) {
    if codec_id == "A_REAL/14_4" {
        track.fmt.codec = Some(fourcc::CODEC_RA_144);
        track.fmt.audio.channels = 1;
        track.fmt.audio.rate = 8000;
        track.fmt.audio.block_align = 0x14;
        return;
    }

    let extra = track.codec_private.as_deref().unwrap_or(&[]);
    if extra.len() <= 28 {
        log::error!("missing RealAudio header");
        track.fmt.codec = Some(fourcc::CODEC_UNDF);
        return;
    }

    if extra[0..3] != *b".ra" {
        log::error!("invalid RealAudio header magic");
        track.fmt.codec = Some(fourcc::CODEC_UNDF);
        return;
    }

    // Fixed big-endian header layout shared by v4 and v5 streams.
    let version = u16_be(extra, 4);
    let sub_packet_h = u16_be(extra, 40);
    let frame_size = u16_be(extra, 42);
    let sub_packet_size = u16_be(extra, 44);

    let codec = match codec_id {
        "A_REAL/COOK" => {
            track.fmt.audio.block_align = u32::from(sub_packet_size);
            fourcc::CODEC_COOK
        }
        "A_REAL/ATRC" => fourcc::CODEC_ATRAC3,
        "A_REAL/28_8" => fourcc::CODEC_RA_288,
        _ => {
            log::error!("unsupported RealAudio codec id `{}`", codec_id);
            track.fmt.codec = Some(fourcc::CODEC_UNDF);
            return;
        }
    };
    track.fmt.codec = Some(codec);

    // The deinterleaver needs the sub-packet geometry before the first block arrives.
    track.sub_parser = Some(SubParserState::Cook { sub_packet_h, frame_size, sub_packet_size });

    match version {
        4 if extra.len() >= 56 => {
            track.fmt.audio.rate = u32::from(u16_be(extra, 48));
            track.fmt.audio.bits_per_sample = u32::from(u16_be(extra, 52));
            track.fmt.audio.channels = u32::from(u16_be(extra, 54));
        }
        5 if extra.len() >= 62 => {
            track.fmt.audio.rate = u32::from(u16_be(extra, 54));
            track.fmt.audio.bits_per_sample = u32::from(u16_be(extra, 58));
            track.fmt.audio.channels = u32::from(u16_be(extra, 60));
        }
        _ => log::warn!("unhandled RealAudio header version {}", version),
    }

    log::debug!(
        "{} channels {} bits {} Hz",
        track.fmt.audio.channels,
        track.fmt.audio.bits_per_sample,
        track.fmt.audio.rate
    );

    fill_extra_data(track, if codec == fourcc::CODEC_RA_288 { 0 } else { 78 });
}

/// Parse the `size: WxH` declaration of a VobSub index.
fn vobsub_size_parse(text: &str) -> Option<(u32, u32)> {
    let line = text.strip_prefix("size:")?.lines().next()?.trim();
    let (width, height) = line.split_once('x')?;
    Some((width.trim().parse().ok()?, height.trim().parse().ok()?))
}

/// Parse the 16-colour `palette:` declaration of a VobSub index.
fn vobsub_palette_parse(text: &str) -> Option<[u32; 16]> {
    let line = text.strip_prefix("palette:")?.lines().next()?;
    let mut palette = [0u32; 16];
    let mut entries = line.split(',');
    for slot in palette.iter_mut() {
        *slot = u32::from_str_radix(entries.next()?.trim(), 16).ok()?;
    }
    Some(palette)
}

fn activate_vobsub(track: &mut Track) {
    track.fmt.codec = Some(fourcc::CODEC_SPU);

    let extra = match track.codec_private.as_deref() {
        Some(extra) if !extra.is_empty() => extra,
        _ => return,
    };
    let text = String::from_utf8_lossy(extra).into_owned();

    match text.find("size:").and_then(|at| vobsub_size_parse(&text[at..])) {
        Some((width, height)) => {
            track.fmt.subs.original_frame_width = width;
            track.fmt.subs.original_frame_height = height;
            log::debug!("original frame size vobsubs: {}x{}", width, height);
        }
        None => log::warn!("reading original frame size for vobsub failed"),
    }

    match text.find("palette:").and_then(|at| vobsub_palette_parse(&text[at..])) {
        Some(colours) => {
            let mut palette = [0u32; 17];
            palette[0] = 0xbeef;
            palette[1..].copy_from_slice(&colours);
            track.fmt.subs.palette = Some(palette);
            log::debug!("vobsub palette read");
        }
        None => log::warn!("reading original palette failed"),
    }
}

fn set_text_subtitles(track: &mut Track, codec: FourCc, encoding: &str) {
    track.fmt.codec = Some(codec);
    track.fmt.subs.encoding = Some(encoding.to_string());
}

/// Apply the codec dispatch table to one track, filling the normalized codec, media parameters,
/// extradata, and timing flags of its descriptor.
///
/// A missing codec identifier leaves the descriptor untouched; the caller treats such tracks as
/// inactive.
pub(crate) fn activate_track(track: &mut Track) {
    let codec_id = match track.codec_id.clone() {
        Some(codec_id) => codec_id,
        None => return,
    };

    match codec_id.as_str() {
        "V_MS/VFW/FOURCC" => activate_vfw(track),
        "V_MPEG1" | "V_MPEG2" => {
            track.fmt.codec = Some(fourcc::CODEC_MPGV);
            fill_extra_data(track, 0);
        }
        id if id.starts_with("V_THEORA") => {
            track.fmt.codec = Some(fourcc::CODEC_THEORA);
            fill_extra_data(track, 0);
            track.pts_only = true;
        }
        id if id.starts_with("V_REAL/RV") => activate_real_video(track, id),
        id if id.starts_with("V_DIRAC") => track.fmt.codec = Some(fourcc::CODEC_DIRAC),
        id if id.starts_with("V_VP8") => {
            track.fmt.codec = Some(fourcc::CODEC_VP8);
            track.pts_only = true;
        }
        "V_MPEG4/MS/V3" => track.fmt.codec = Some(fourcc::CODEC_DIV3),
        id if id.starts_with("V_MPEG4/ISO") => {
            track.fmt.codec = Some(if id == "V_MPEG4/ISO/AVC" {
                fourcc::CODEC_AVC1
            }
            else {
                fourcc::CODEC_MP4V
            });
            fill_extra_data(track, 0);
        }
        "V_QUICKTIME" => activate_quicktime(track),
        "V_MJPEG" => track.fmt.codec = Some(fourcc::CODEC_MJPG),
        "A_MS/ACM" => activate_acm(track),
        "A_MPEG/L1" | "A_MPEG/L2" | "A_MPEG/L3" => track.fmt.codec = Some(fourcc::CODEC_MPGA),
        "A_AC3" => track.fmt.codec = Some(fourcc::CODEC_A52),
        "A_EAC3" => track.fmt.codec = Some(fourcc::CODEC_EAC3),
        "A_DTS" => track.fmt.codec = Some(fourcc::CODEC_DTS),
        "A_MLP" => track.fmt.codec = Some(fourcc::CODEC_MLP),
        "A_TRUEHD" => {
            track.fmt.codec = Some(fourcc::CODEC_TRUEHD);
            track.fmt.packetized = false;
        }
        "A_FLAC" => {
            track.fmt.codec = Some(fourcc::CODEC_FLAC);
            fill_extra_data(track, 0);
        }
        "A_VORBIS" => {
            track.fmt.codec = Some(fourcc::CODEC_VORBIS);
            fill_extra_data(track, 0);
        }
        id if id.starts_with("A_AAC/MPEG2/") || id.starts_with("A_AAC/MPEG4/") => {
            activate_aac(track, id);
        }
        "A_AAC" => {
            track.fmt.codec = Some(fourcc::CODEC_MP4A);
            fill_extra_data(track, 0);
        }
        "A_WAVPACK4" => {
            track.fmt.codec = Some(fourcc::CODEC_WAVPACK);
            fill_extra_data(track, 0);
        }
        "A_TTA1" => activate_tta(track),
        "A_PCM/INT/BIG" | "A_PCM/INT/LIT" | "A_PCM/FLOAT/IEEE" => {
            track.fmt.codec = Some(if codec_id == "A_PCM/INT/BIG" {
                fourcc::CODEC_PCM_TWOS
            }
            else {
                fourcc::CODEC_PCM_ARAW
            });
            track.fmt.audio.block_align =
                (track.fmt.audio.bits_per_sample + 7) / 8 * track.fmt.audio.channels;
        }
        id if id.starts_with("A_REAL/") => activate_real_audio(track, id),
        "S_KATE" => {
            set_text_subtitles(track, fourcc::CODEC_KATE, "UTF-8");
            fill_extra_data(track, 0);
        }
        "S_TEXT/ASCII" => set_text_subtitles(track, fourcc::CODEC_SUBT, "ASCII"),
        "S_TEXT/UTF8" => set_text_subtitles(track, fourcc::CODEC_SUBT, "UTF-8"),
        "S_TEXT/USF" => {
            set_text_subtitles(track, fourcc::CODEC_USF, "UTF-8");
            fill_extra_data(track, 0);
        }
        "S_TEXT/SSA" | "S_TEXT/ASS" | "S_SSA" | "S_ASS" => {
            set_text_subtitles(track, fourcc::CODEC_SSA, "UTF-8");
            fill_extra_data(track, 0);
        }
        "S_VOBSUB" => activate_vobsub(track),
        "S_HDMV/PGS" => track.fmt.codec = Some(fourcc::CODEC_BD_PG),
        "B_VOBBTN" => {
            track.fmt.category = toccata_core::es::StreamCategory::Button;
        }
        other => {
            log::error!("unknown codec id=`{}`", other);
            track.fmt.codec = Some(fourcc::CODEC_UNDF);
        }
    }
}
