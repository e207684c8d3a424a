// Toccata
// Copyright (c) 2022-2024 The Project Toccata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end preload, selection, and block extraction tests over hand-assembled files.

mod common;

use common::*;

use toccata_core::errors::Error;
use toccata_core::es::StreamCategory;
use toccata_core::fourcc;
use toccata_core::meta::MetaKind;

/// A file with one MPEG video track, one MP3 audio track, cues for three clusters, and a few
/// blocks per cluster. Returns the reader plus the absolute positions of the clusters.
fn standard_file() -> (toccata_format_mkv::MkvReader, Vec<u64>) {
    let info = info(1_000_000);
    let track_list = tracks(&[
        track_entry(1, 1, "V_MPEG1", &[video(640, 480)]),
        track_entry(2, 2, "A_MPEG/L3", &[audio(44100.0, None, 2)]),
    ]);

    let clusters = [
        cluster(0, &[simple_block(1, 0, 0x80, &[0x10]), simple_block(2, 5, 0x80, &[0x20])]),
        cluster(
            1000,
            &[
                simple_block(1, 200, 0x80, &[0x11]),
                simple_block(1, 400, 0x00, &[0x12]),
                simple_block(1, 600, 0x00, &[0x13]),
            ],
        ),
        cluster(2000, &[simple_block(1, 0, 0x80, &[0x14])]),
    ];

    // Lay out the head once with placeholder cue positions to learn the cue element's size,
    // which is value-independent.
    let cues_len = cues(&[(0, 1, 0), (1000, 1, 0), (2000, 1, 0)]).len() as u64;
    let head_len = info.len() as u64 + track_list.len() as u64 + cues_len;

    let mut relative = head_len;
    let mut cluster_rel = Vec::new();
    for c in &clusters {
        cluster_rel.push(relative);
        relative += c.len() as u64;
    }

    let cue_list = cues(&[
        (0, 1, cluster_rel[0]),
        (1000, 1, cluster_rel[1]),
        (2000, 1, cluster_rel[2]),
    ]);
    assert_eq!(cue_list.len() as u64, cues_len);

    let mut file = FileBuilder::new();
    file.push(&info);
    file.push(&track_list);
    file.push(&cue_list);
    for c in &clusters {
        file.push(c);
    }

    let absolute: Vec<u64> = cluster_rel.iter().map(|&rel| FileBuilder::absolute(rel)).collect();
    (open(file.build()), absolute)
}

#[test]
fn verify_preload_discovers_top_level_elements() {
    let (mut reader, clusters) = standard_file();
    let segment = &mut reader.segment;

    assert!(segment.preload().unwrap());

    assert!(segment.info_position >= 0);
    assert!(segment.tracks_position >= 0);
    assert!(segment.cues_position >= 0);
    assert_eq!(segment.timescale, 1_000_000);
    assert_eq!(segment.duration, Some(10_000.0));
    assert_eq!(segment.title.as_deref(), Some("Integration Title"));

    assert_eq!(segment.tracks.len(), 2);
    assert_eq!(segment.tracks[0].number, 1);
    assert_eq!(segment.tracks[0].fmt.category, StreamCategory::Video);
    assert_eq!(segment.tracks[0].fmt.video.width, 640);
    assert_eq!(segment.tracks[1].fmt.category, StreamCategory::Audio);

    // Preload stops at the first cluster.
    assert_eq!(segment.start_pos, clusters[0]);
    assert_eq!(segment.start_time, 0);

    // The cue index has one slot per cue point, positions in file order.
    assert!(segment.cues_loaded());
    let index = segment.index();
    assert_eq!(index.len(), 3);
    assert_eq!(index.get(0).unwrap().time, 0);
    assert_eq!(index.get(1).unwrap().time, 1_000_000);
    assert_eq!(index.get(2).unwrap().time, 2_000_000);
    for (slot, &expected) in index.slots().iter().zip(clusters.iter()) {
        assert_eq!(slot.position, expected as i64);
        assert_eq!(slot.track, 1);
    }

    // The title shortcut flows into the metadata.
    segment.information_create();
    assert_eq!(segment.meta.get(MetaKind::Title), Some("Integration Title"));
}

#[test]
fn verify_preload_is_idempotent() {
    let (mut reader, _) = standard_file();
    let segment = &mut reader.segment;

    assert!(segment.preload().unwrap());
    let index_len = segment.index().len();
    let tracks_len = segment.tracks.len();

    // The second call is a no-op and reports so.
    assert!(!segment.preload().unwrap());
    assert_eq!(segment.index().len(), index_len);
    assert_eq!(segment.tracks.len(), tracks_len);
    assert!(segment.is_preloaded());
}

#[test]
fn verify_select_registers_streams() {
    let (mut reader, _) = standard_file();
    let segment = &mut reader.segment;
    segment.preload().unwrap();

    let mut out = CaptureEsOut::new();
    segment.select(&mut out, 0).unwrap();

    assert_eq!(out.added.len(), 2);

    let (video_handle, video_fmt) = &out.added[0];
    assert_eq!(video_fmt.codec, Some(fourcc::CODEC_MPGV));
    // Default video track: priority 1, demoted by 1 to avoid multi-video selection.
    assert_eq!(video_fmt.priority, 0);

    let (_, audio_fmt) = &out.added[1];
    assert_eq!(audio_fmt.codec, Some(fourcc::CODEC_MPGA));
    assert_eq!(audio_fmt.priority, 1);

    // Both tracks are flagged default.
    assert!(out.defaults.contains(video_handle));
    assert_eq!(out.next_display_time, Some(0));

    assert!(segment.tracks[0].es.is_some());
    assert!(segment.tracks[1].es.is_some());
}

#[test]
fn verify_unselect_deletes_streams() {
    let (mut reader, _) = standard_file();
    let segment = &mut reader.segment;
    segment.preload().unwrap();

    let mut out = CaptureEsOut::new();
    segment.select(&mut out, 0).unwrap();
    segment.unselect(&mut out);

    assert_eq!(out.deleted.len(), 2);
    assert!(segment.tracks.iter().all(|track| track.es.is_none()));
}

#[test]
fn verify_block_extraction_order() {
    let (mut reader, clusters) = standard_file();
    let segment = &mut reader.segment;
    segment.preload().unwrap();

    let mut out = CaptureEsOut::new();
    segment.select(&mut out, 0).unwrap();

    // Cluster 1.
    let read = segment.block_get().unwrap();
    assert_eq!(read.block.track, 1);
    assert_eq!(read.pts, 0);
    assert!(read.keyframe);
    assert_eq!(read.cluster_pos, clusters[0]);

    let read = segment.block_get().unwrap();
    assert_eq!(read.block.track, 2);
    assert_eq!(read.pts, 5_000);
    assert_eq!(read.track_index, 1);

    // Cluster 2: pts follows the new cluster timecode; delta frames are not keyframes.
    let read = segment.block_get().unwrap();
    assert_eq!(read.pts, 1_200_000);
    assert!(read.keyframe);
    assert_eq!(read.cluster_pos, clusters[1]);

    let read = segment.block_get().unwrap();
    assert_eq!(read.pts, 1_400_000);
    assert!(!read.keyframe);

    let read = segment.block_get().unwrap();
    assert_eq!(read.pts, 1_600_000);

    // Cluster 3, then end of stream.
    let read = segment.block_get().unwrap();
    assert_eq!(read.pts, 2_000_000);
    assert!(matches!(segment.block_get(), Err(Error::EndOfStream)));
}

#[test]
fn verify_block_group_keyframe_inference() {
    let info = info(1_000_000);
    let track_list = tracks(&[track_entry(1, 1, "V_MPEG1", &[video(320, 240)])]);

    // A keyframe group (no reference), then a P-frame group with a backward reference and a
    // duration, then a B-frame group with a forward (positive) reference.
    let key_group = el(0xa0, &block(1, 0, &[0x41]));

    let mut p_payload = block(1, 40, &[0x42]);
    p_payload.extend_from_slice(&uint(0x9b, 40));
    p_payload.extend_from_slice(&el(0xfb, &[0xff])); // ReferenceBlock: -1
    let p_group = el(0xa0, &p_payload);

    let mut b_payload = block(1, 80, &[0x43]);
    b_payload.extend_from_slice(&el(0xfb, &[0xff])); // ReferenceBlock: -1
    b_payload.extend_from_slice(&el(0xfb, &[0x01])); // ReferenceBlock: +1
    let b_group = el(0xa0, &b_payload);

    let mut file = FileBuilder::new();
    file.push(&info);
    file.push(&track_list);
    file.push(&cluster(0, &[key_group, p_group, b_group]));

    let mut reader = open(file.build());
    let segment = &mut reader.segment;
    segment.preload().unwrap();

    let read = segment.block_get().unwrap();
    assert!(read.keyframe);
    assert!(!read.discardable);
    assert_eq!(read.duration, None);

    let read = segment.block_get().unwrap();
    assert!(!read.keyframe);
    assert!(!read.discardable);
    assert_eq!(read.duration, Some(40));
    assert_eq!(read.pts, 40_000);

    let read = segment.block_get().unwrap();
    assert!(!read.keyframe);
    assert!(read.discardable);
}

#[test]
fn verify_unknown_track_blocks_are_dropped() {
    let info = info(1_000_000);
    let track_list = tracks(&[track_entry(1, 1, "V_MPEG1", &[])]);

    let mut file = FileBuilder::new();
    file.push(&info);
    file.push(&track_list);
    file.push(&cluster(
        0,
        &[simple_block(9, 0, 0x80, &[0xee]), simple_block(1, 10, 0x80, &[0x41])],
    ));

    let mut reader = open(file.build());
    let segment = &mut reader.segment;
    segment.preload().unwrap();

    // The track-9 block is silently discarded.
    let read = segment.block_get().unwrap();
    assert_eq!(read.block.track, 1);
    assert_eq!(read.pts, 10_000);
}

#[test]
fn verify_theora_keyframe_override() {
    let info = info(1_000_000);
    let track_list = tracks(&[track_entry(1, 1, "V_THEORA", &[video(320, 240)])]);

    let mut file = FileBuilder::new();
    file.push(&info);
    file.push(&track_list);
    // Both blocks claim to be keyframes; the second carries the 0x40 inter-frame marker.
    file.push(&cluster(
        0,
        &[simple_block(1, 0, 0x80, &[0x00, 0x01]), simple_block(1, 40, 0x80, &[0x40, 0x01])],
    ));

    let mut reader = open(file.build());
    let segment = &mut reader.segment;
    segment.preload().unwrap();

    let mut out = CaptureEsOut::new();
    segment.select(&mut out, 0).unwrap();

    let read = segment.block_get().unwrap();
    assert!(read.keyframe);

    let read = segment.block_get().unwrap();
    assert!(!read.keyframe);
}

#[test]
fn verify_duplicate_cues_are_ignored() {
    let info = info(1_000_000);
    let track_list = tracks(&[track_entry(1, 1, "V_MPEG1", &[])]);

    let first = cues(&[(0, 1, 0)]);
    let second = cues(&[(5000, 1, 999), (6000, 1, 1999)]);

    let mut file = FileBuilder::new();
    file.push(&info);
    file.push(&track_list);
    file.push(&first);
    file.push(&second);
    file.push(&cluster(0, &[simple_block(1, 0, 0x80, &[0x41])]));

    let mut reader = open(file.build());
    let segment = &mut reader.segment;
    segment.preload().unwrap();

    // Only the first Cues element populated the index.
    assert!(segment.cues_loaded());
    assert_eq!(segment.index().len(), 1);
    assert_eq!(segment.index().get(0).unwrap().time, 0);
}

#[test]
fn verify_cluster_timecode_after_block() {
    let info = info(1_000_000);
    let track_list = tracks(&[track_entry(1, 1, "V_MPEG1", &[])]);

    // The second cluster declares its timecode after its first block.
    let mut late_payload = simple_block(1, 0, 0x80, &[0x42]);
    late_payload.extend_from_slice(&uint(0xe7, 2000));
    let late_cluster = el(0x1f43b675, &late_payload);

    let mut file = FileBuilder::new();
    file.push(&info);
    file.push(&track_list);
    file.push(&cluster(0, &[simple_block(1, 0, 0x80, &[0x41])]));
    file.push(&late_cluster);

    let mut reader = open(file.build());
    let segment = &mut reader.segment;
    segment.preload().unwrap();

    let read = segment.block_get().unwrap();
    assert_eq!(read.pts, 0);

    // The block still gets the cluster's timecode, read on demand.
    let read = segment.block_get().unwrap();
    assert_eq!(read.pts, 2_000_000);
}

#[test]
fn verify_aac_sbr_activation_end_to_end() {
    let info = info(1_000_000);
    let track_list = tracks(&[track_entry(
        1,
        2,
        "A_AAC/MPEG4/LC/SBR",
        &[audio(22050.0, Some(44100.0), 2)],
    )]);

    let mut file = FileBuilder::new();
    file.push(&info);
    file.push(&track_list);
    file.push(&cluster(0, &[simple_block(1, 0, 0x80, &[0x00])]));

    let mut reader = open(file.build());
    let segment = &mut reader.segment;
    segment.preload().unwrap();

    let mut out = CaptureEsOut::new();
    segment.select(&mut out, 0).unwrap();

    let (_, fmt) = &out.added[0];
    assert_eq!(fmt.codec, Some(fourcc::CODEC_MP4A));
    assert_eq!(fmt.audio.rate, 44100);
    assert_eq!(fmt.extra_data, vec![0x13, 0x90, 0x56, 0xe5, 0xa0]);
}

#[test]
fn verify_chapters_parsing() {
    let info = info(1_000_000);
    let track_list = tracks(&[track_entry(1, 1, "V_MPEG1", &[])]);

    // One default edition with a named chapter and a bare one.
    let mut display = el(0x80, &string(0x85, "Intro"));
    let mut atom1 = uint(0x73c4, 1);
    atom1.extend_from_slice(&uint(0x91, 0));
    atom1.extend_from_slice(&uint(0x92, 5_000_000_000));
    atom1.append(&mut display);
    let atom1 = el(0xb6, &atom1);

    let mut atom2 = uint(0x73c4, 2);
    atom2.extend_from_slice(&uint(0x91, 5_000_000_000));
    let atom2 = el(0xb6, &atom2);

    let mut edition = uint(0x45bc, 7);
    edition.extend_from_slice(&uint(0x45db, 1));
    edition.extend_from_slice(&atom1);
    edition.extend_from_slice(&atom2);
    let chapters = el(0x1043a770, &el(0x45b9, &edition));

    let mut file = FileBuilder::new();
    file.push(&info);
    file.push(&track_list);
    file.push(&chapters);
    file.push(&cluster(0, &[simple_block(1, 0, 0x80, &[0x41])]));

    let mut reader = open(file.build());
    let segment = &mut reader.segment;
    segment.preload().unwrap();

    assert!(segment.chapters_position >= 0);
    assert_eq!(segment.editions.len(), 1);
    assert_eq!(segment.default_edition, 0);

    let edition = &segment.editions[0];
    assert_eq!(edition.uid, 7);
    assert!(edition.default);
    assert_eq!(edition.chapters.len(), 2);
    assert_eq!(edition.chapters[0].name.as_deref(), Some("Intro"));
    assert_eq!(edition.chapters[0].time_start, 0);
    assert_eq!(edition.chapters[0].time_end, 5_000_000);
    assert_eq!(edition.chapters[1].time_start, 5_000_000);
    assert_eq!(edition.chapters[1].name, None);
}

#[test]
fn verify_not_matroska_is_rejected() {
    use std::io::Cursor;
    use toccata_core::io::MediaSourceStream;

    // A well-formed EBML header with the wrong DocType.
    let mut data = el(0x1a45dfa3, &string(0x4282, "ogg"));
    data.extend_from_slice(&el(0xec, &[0; 4]));

    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)));
    assert!(toccata_format_mkv::MkvReader::try_new(mss).is_err());
}
