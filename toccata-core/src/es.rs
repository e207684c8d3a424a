// Toccata
// Copyright (c) 2022-2024 The Project Toccata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `es` module defines the elementary-stream output interface a demuxer delivers frames to.
//!
//! A demuxer does not decode or present media itself. It describes each track with an [`EsFormat`],
//! registers it with an [`EsOut`] implementation provided by the enclosing player, and then pushes
//! [`Frame`]s to the handle it got back. Clock management (PCR, next display time) flows through
//! the same interface.

use crate::fourcc::FourCc;

/// All timestamps and durations at this interface are expressed in microseconds.
pub type Mtime = i64;

/// The broad class of an elementary stream.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum StreamCategory {
    /// The stream category could not be determined.
    #[default]
    Unknown,
    /// A video stream.
    Video,
    /// An audio stream.
    Audio,
    /// A subtitle stream.
    Subtitle,
    /// A menu/button navigation stream.
    Button,
}

/// Decoded video parameters of an elementary stream.
#[derive(Clone, Debug, Default)]
pub struct VideoParams {
    /// The frame width in pixels.
    pub width: u32,
    /// The frame height in pixels.
    pub height: u32,
    /// Frame rate numerator. 0 if unknown.
    pub frame_rate: u32,
    /// Frame rate denominator.
    pub frame_rate_base: u32,
}

/// Decoded audio parameters of an elementary stream.
#[derive(Clone, Debug, Default)]
pub struct AudioParams {
    /// The number of channels.
    pub channels: u32,
    /// The sample rate in Hz.
    pub rate: u32,
    /// The number of bits per sample.
    pub bits_per_sample: u32,
    /// The block alignment in bytes.
    pub block_align: u32,
    /// The bitrate in bits per second. 0 if unknown.
    pub bitrate: u32,
}

/// Decoded subtitle parameters of an elementary stream.
#[derive(Clone, Debug, Default)]
pub struct SubtitleParams {
    /// The text encoding of the subtitle payloads, if textual.
    pub encoding: Option<String>,
    /// For picture-based subtitles, the width of the original frame.
    pub original_frame_width: u32,
    /// For picture-based subtitles, the height of the original frame.
    pub original_frame_height: u32,
    /// For DVD subpictures, the palette. Slot 0 is the `0xbeef` set-marker, the 16 colour entries
    /// follow in slots 1 through 16.
    pub palette: Option<[u32; 17]>,
}

/// An `EsFormat` describes one elementary stream to the output.
#[derive(Clone, Debug, Default)]
pub struct EsFormat {
    /// The stream category.
    pub category: StreamCategory,
    /// The normalized codec identifier.
    pub codec: Option<FourCc>,
    /// Video parameters. Only meaningful for the video category.
    pub video: VideoParams,
    /// Audio parameters. Only meaningful for the audio category.
    pub audio: AudioParams,
    /// Subtitle parameters. Only meaningful for the subtitle category.
    pub subs: SubtitleParams,
    /// Codec-specific initialization data.
    pub extra_data: Vec<u8>,
    /// Selection priority. Negative values demote the stream, positive values promote it.
    pub priority: i32,
    /// Whether frames of this stream are complete codec packets. Streams that are not packetized
    /// require a packetizer before decoding.
    pub packetized: bool,
}

impl EsFormat {
    /// Create a blank format of the given category. Streams are packetized unless stated
    /// otherwise.
    pub fn new(category: StreamCategory) -> Self {
        EsFormat { category, packetized: true, ..Default::default() }
    }
}

/// An opaque handle to a registered elementary stream.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct EsHandle(pub u64);

/// A single demuxed frame (or laced sub-frame) of one elementary stream.
#[derive(Clone, Debug)]
pub struct Frame {
    /// The presentation timestamp in microseconds. May be invalid for dts-only streams.
    pub pts: Option<Mtime>,
    /// The decode timestamp in microseconds.
    pub dts: Option<Mtime>,
    /// The duration in microseconds. 0 if unknown.
    pub duration: Mtime,
    /// The frame is a random access point.
    pub keyframe: bool,
    /// The frame may be dropped without corrupting future frames.
    pub discardable: bool,
    /// The compressed payload.
    pub data: Box<[u8]>,
}

/// `EsOut` is the elementary-stream sink a demuxer drives.
///
/// Implementations are provided by the enclosing player. The demuxer guarantees it only uses
/// handles returned by `add` and not yet passed to `del`.
pub trait EsOut {
    /// Register an elementary stream, returning a handle for it.
    fn add(&mut self, format: &EsFormat) -> EsHandle;

    /// Unregister an elementary stream.
    fn del(&mut self, handle: EsHandle);

    /// Deliver one frame to a stream.
    fn send(&mut self, handle: EsHandle, frame: Frame);

    /// Mark a stream as the default selection of its category.
    fn set_es_default(&mut self, handle: EsHandle);

    /// Publish the program clock reference, in microseconds.
    fn set_pcr(&mut self, pcr: Mtime);

    /// Announce the presentation time the next displayed frame should have, in microseconds.
    /// Used after seeks so the player can drop late frames.
    fn set_next_display_time(&mut self, time: Mtime);
}
