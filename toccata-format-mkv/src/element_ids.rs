// Toccata
// Copyright (c) 2022-2024 The Project Toccata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;

use lazy_static::lazy_static;

/// The data type of an EBML element.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Type {
    Master,
    Unsigned,
    Signed,
    Binary,
    String,
    Float,
    Date,
}

/// The elements this demuxer dispatches on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ElementType {
    Ebml,
    EbmlVersion,
    EbmlReadVersion,
    EbmlMaxIdLength,
    EbmlMaxSizeLength,
    DocType,
    DocTypeVersion,
    DocTypeReadVersion,
    Crc32,
    Void,
    Segment,
    SeekHead,
    Seek,
    SeekId,
    SeekPosition,
    Info,
    SegmentUid,
    SegmentFilename,
    PrevUid,
    NextUid,
    SegmentFamily,
    TimestampScale,
    Duration,
    DateUtc,
    Title,
    MuxingApp,
    WritingApp,
    Cluster,
    Timestamp,
    Position,
    PrevSize,
    SilentTracks,
    SilentTrackNumber,
    SimpleBlock,
    BlockGroup,
    Block,
    BlockDuration,
    ReferenceBlock,
    DiscardPadding,
    Tracks,
    TrackEntry,
    TrackNumber,
    TrackUid,
    TrackType,
    FlagEnabled,
    FlagDefault,
    FlagForced,
    FlagLacing,
    DefaultDuration,
    Name,
    Language,
    CodecId,
    CodecPrivate,
    CodecName,
    CodecDelay,
    SeekPreRoll,
    Video,
    FlagInterlaced,
    StereoMode,
    PixelWidth,
    PixelHeight,
    PixelCropBottom,
    PixelCropTop,
    PixelCropLeft,
    PixelCropRight,
    DisplayWidth,
    DisplayHeight,
    DisplayUnit,
    AspectRatioType,
    FrameRate,
    Audio,
    SamplingFrequency,
    OutputSamplingFrequency,
    Channels,
    BitDepth,
    Cues,
    CuePoint,
    CueTime,
    CueTrackPositions,
    CueTrack,
    CueClusterPosition,
    CueRelativePosition,
    CueDuration,
    CueBlockNumber,
    Chapters,
    EditionEntry,
    EditionUid,
    EditionFlagHidden,
    EditionFlagDefault,
    EditionFlagOrdered,
    ChapterAtom,
    ChapterUid,
    ChapterStringUid,
    ChapterTimeStart,
    ChapterTimeEnd,
    ChapterFlagEnabled,
    ChapterFlagHidden,
    ChapterDisplay,
    ChapString,
    ChapLanguage,
    ChapCountry,
    Attachments,
    AttachedFile,
    FileDescription,
    FileName,
    FileMediaType,
    FileData,
    FileUid,
    Tags,
    Tag,
    Targets,
    TargetTypeValue,
    TargetType,
    TagTrackUid,
    TagEditionUid,
    TagChapterUid,
    TagAttachmentUid,
    SimpleTag,
    TagName,
    TagLanguage,
    TagDefault,
    TagString,
    TagBinary,
    /// Special type for unknown elements.
    Unknown,
}

impl ElementType {
    /// Whether this element class appears directly under the segment.
    pub(crate) fn is_top_level(&self) -> bool {
        matches!(
            self,
            ElementType::SeekHead
                | ElementType::Info
                | ElementType::Tracks
                | ElementType::Cues
                | ElementType::Chapters
                | ElementType::Attachments
                | ElementType::Tags
                | ElementType::Cluster
        )
    }
}

/// Look up the data type and element type of an element ID.
pub(crate) fn lookup(tag: u32) -> Option<(Type, ElementType)> {
    ELEMENTS.get(&tag).copied()
}

/// Get the element type of an element ID, or `Unknown`.
pub(crate) fn element_type(tag: u32) -> ElementType {
    ELEMENTS.get(&tag).map_or(ElementType::Unknown, |&(_, etype)| etype)
}

lazy_static! {
    static ref ELEMENTS: HashMap<u32, (Type, ElementType)> = {
        let mut elems = HashMap::new();
        elems.insert(0x1a45dfa3, (Type::Master, ElementType::Ebml));
        elems.insert(0x4286, (Type::Unsigned, ElementType::EbmlVersion));
        elems.insert(0x42f7, (Type::Unsigned, ElementType::EbmlReadVersion));
        elems.insert(0x42f2, (Type::Unsigned, ElementType::EbmlMaxIdLength));
        elems.insert(0x42f3, (Type::Unsigned, ElementType::EbmlMaxSizeLength));
        elems.insert(0x4282, (Type::String, ElementType::DocType));
        elems.insert(0x4287, (Type::Unsigned, ElementType::DocTypeVersion));
        elems.insert(0x4285, (Type::Unsigned, ElementType::DocTypeReadVersion));
        elems.insert(0xbf, (Type::Binary, ElementType::Crc32));
        elems.insert(0xec, (Type::Binary, ElementType::Void));
        elems.insert(0x18538067, (Type::Master, ElementType::Segment));
        elems.insert(0x114d9b74, (Type::Master, ElementType::SeekHead));
        elems.insert(0x4dbb, (Type::Master, ElementType::Seek));
        elems.insert(0x53ab, (Type::Binary, ElementType::SeekId));
        elems.insert(0x53ac, (Type::Unsigned, ElementType::SeekPosition));
        elems.insert(0x1549a966, (Type::Master, ElementType::Info));
        elems.insert(0x73a4, (Type::Binary, ElementType::SegmentUid));
        elems.insert(0x7384, (Type::String, ElementType::SegmentFilename));
        elems.insert(0x3cb923, (Type::Binary, ElementType::PrevUid));
        elems.insert(0x3eb923, (Type::Binary, ElementType::NextUid));
        elems.insert(0x4444, (Type::Binary, ElementType::SegmentFamily));
        elems.insert(0x2ad7b1, (Type::Unsigned, ElementType::TimestampScale));
        elems.insert(0x4489, (Type::Float, ElementType::Duration));
        elems.insert(0x4461, (Type::Date, ElementType::DateUtc));
        elems.insert(0x7ba9, (Type::String, ElementType::Title));
        elems.insert(0x4d80, (Type::String, ElementType::MuxingApp));
        elems.insert(0x5741, (Type::String, ElementType::WritingApp));
        elems.insert(0x1f43b675, (Type::Master, ElementType::Cluster));
        elems.insert(0xe7, (Type::Unsigned, ElementType::Timestamp));
        elems.insert(0xa7, (Type::Unsigned, ElementType::Position));
        elems.insert(0xab, (Type::Unsigned, ElementType::PrevSize));
        elems.insert(0x5854, (Type::Master, ElementType::SilentTracks));
        elems.insert(0x58d7, (Type::Unsigned, ElementType::SilentTrackNumber));
        elems.insert(0xa3, (Type::Binary, ElementType::SimpleBlock));
        elems.insert(0xa0, (Type::Master, ElementType::BlockGroup));
        elems.insert(0xa1, (Type::Binary, ElementType::Block));
        elems.insert(0x9b, (Type::Unsigned, ElementType::BlockDuration));
        elems.insert(0xfb, (Type::Signed, ElementType::ReferenceBlock));
        elems.insert(0x75a2, (Type::Signed, ElementType::DiscardPadding));
        elems.insert(0x1654ae6b, (Type::Master, ElementType::Tracks));
        elems.insert(0xae, (Type::Master, ElementType::TrackEntry));
        elems.insert(0xd7, (Type::Unsigned, ElementType::TrackNumber));
        elems.insert(0x73c5, (Type::Unsigned, ElementType::TrackUid));
        elems.insert(0x83, (Type::Unsigned, ElementType::TrackType));
        elems.insert(0xb9, (Type::Unsigned, ElementType::FlagEnabled));
        elems.insert(0x88, (Type::Unsigned, ElementType::FlagDefault));
        elems.insert(0x55aa, (Type::Unsigned, ElementType::FlagForced));
        elems.insert(0x9c, (Type::Unsigned, ElementType::FlagLacing));
        elems.insert(0x23e383, (Type::Unsigned, ElementType::DefaultDuration));
        elems.insert(0x536e, (Type::String, ElementType::Name));
        elems.insert(0x22b59c, (Type::String, ElementType::Language));
        elems.insert(0x86, (Type::String, ElementType::CodecId));
        elems.insert(0x63a2, (Type::Binary, ElementType::CodecPrivate));
        elems.insert(0x258688, (Type::String, ElementType::CodecName));
        elems.insert(0x56aa, (Type::Unsigned, ElementType::CodecDelay));
        elems.insert(0x56bb, (Type::Unsigned, ElementType::SeekPreRoll));
        elems.insert(0xe0, (Type::Master, ElementType::Video));
        elems.insert(0x9a, (Type::Unsigned, ElementType::FlagInterlaced));
        elems.insert(0x53b8, (Type::Unsigned, ElementType::StereoMode));
        elems.insert(0xb0, (Type::Unsigned, ElementType::PixelWidth));
        elems.insert(0xba, (Type::Unsigned, ElementType::PixelHeight));
        elems.insert(0x54aa, (Type::Unsigned, ElementType::PixelCropBottom));
        elems.insert(0x54bb, (Type::Unsigned, ElementType::PixelCropTop));
        elems.insert(0x54cc, (Type::Unsigned, ElementType::PixelCropLeft));
        elems.insert(0x54dd, (Type::Unsigned, ElementType::PixelCropRight));
        elems.insert(0x54b0, (Type::Unsigned, ElementType::DisplayWidth));
        elems.insert(0x54ba, (Type::Unsigned, ElementType::DisplayHeight));
        elems.insert(0x54b2, (Type::Unsigned, ElementType::DisplayUnit));
        elems.insert(0x54b3, (Type::Unsigned, ElementType::AspectRatioType));
        elems.insert(0x2383e3, (Type::Float, ElementType::FrameRate));
        elems.insert(0xe1, (Type::Master, ElementType::Audio));
        elems.insert(0xb5, (Type::Float, ElementType::SamplingFrequency));
        elems.insert(0x78b5, (Type::Float, ElementType::OutputSamplingFrequency));
        elems.insert(0x9f, (Type::Unsigned, ElementType::Channels));
        elems.insert(0x6264, (Type::Unsigned, ElementType::BitDepth));
        elems.insert(0x1c53bb6b, (Type::Master, ElementType::Cues));
        elems.insert(0xbb, (Type::Master, ElementType::CuePoint));
        elems.insert(0xb3, (Type::Unsigned, ElementType::CueTime));
        elems.insert(0xb7, (Type::Master, ElementType::CueTrackPositions));
        elems.insert(0xf7, (Type::Unsigned, ElementType::CueTrack));
        elems.insert(0xf1, (Type::Unsigned, ElementType::CueClusterPosition));
        elems.insert(0xf0, (Type::Unsigned, ElementType::CueRelativePosition));
        elems.insert(0xb2, (Type::Unsigned, ElementType::CueDuration));
        elems.insert(0x5378, (Type::Unsigned, ElementType::CueBlockNumber));
        elems.insert(0x1043a770, (Type::Master, ElementType::Chapters));
        elems.insert(0x45b9, (Type::Master, ElementType::EditionEntry));
        elems.insert(0x45bc, (Type::Unsigned, ElementType::EditionUid));
        elems.insert(0x45bd, (Type::Unsigned, ElementType::EditionFlagHidden));
        elems.insert(0x45db, (Type::Unsigned, ElementType::EditionFlagDefault));
        elems.insert(0x45dd, (Type::Unsigned, ElementType::EditionFlagOrdered));
        elems.insert(0xb6, (Type::Master, ElementType::ChapterAtom));
        elems.insert(0x73c4, (Type::Unsigned, ElementType::ChapterUid));
        elems.insert(0x5654, (Type::String, ElementType::ChapterStringUid));
        elems.insert(0x91, (Type::Unsigned, ElementType::ChapterTimeStart));
        elems.insert(0x92, (Type::Unsigned, ElementType::ChapterTimeEnd));
        elems.insert(0x4598, (Type::Unsigned, ElementType::ChapterFlagEnabled));
        elems.insert(0x98, (Type::Unsigned, ElementType::ChapterFlagHidden));
        elems.insert(0x80, (Type::Master, ElementType::ChapterDisplay));
        elems.insert(0x85, (Type::String, ElementType::ChapString));
        elems.insert(0x437c, (Type::String, ElementType::ChapLanguage));
        elems.insert(0x437e, (Type::String, ElementType::ChapCountry));
        elems.insert(0x1941a469, (Type::Master, ElementType::Attachments));
        elems.insert(0x61a7, (Type::Master, ElementType::AttachedFile));
        elems.insert(0x467e, (Type::String, ElementType::FileDescription));
        elems.insert(0x466e, (Type::String, ElementType::FileName));
        elems.insert(0x4660, (Type::String, ElementType::FileMediaType));
        elems.insert(0x465c, (Type::Binary, ElementType::FileData));
        elems.insert(0x46ae, (Type::Unsigned, ElementType::FileUid));
        elems.insert(0x1254c367, (Type::Master, ElementType::Tags));
        elems.insert(0x7373, (Type::Master, ElementType::Tag));
        elems.insert(0x63c0, (Type::Master, ElementType::Targets));
        elems.insert(0x68ca, (Type::Unsigned, ElementType::TargetTypeValue));
        elems.insert(0x63ca, (Type::String, ElementType::TargetType));
        elems.insert(0x63c5, (Type::Unsigned, ElementType::TagTrackUid));
        elems.insert(0x63c9, (Type::Unsigned, ElementType::TagEditionUid));
        elems.insert(0x63c4, (Type::Unsigned, ElementType::TagChapterUid));
        elems.insert(0x63c6, (Type::Unsigned, ElementType::TagAttachmentUid));
        elems.insert(0x67c8, (Type::Master, ElementType::SimpleTag));
        elems.insert(0x45a3, (Type::String, ElementType::TagName));
        elems.insert(0x447a, (Type::String, ElementType::TagLanguage));
        elems.insert(0x4484, (Type::Unsigned, ElementType::TagDefault));
        elems.insert(0x4487, (Type::String, ElementType::TagString));
        elems.insert(0x4485, (Type::Binary, ElementType::TagBinary));
        elems
    };
}
