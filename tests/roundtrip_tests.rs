//! End-to-end mux → parse round-trips and handcrafted-file scenarios.

use pretty_assertions::assert_eq;
use webm_io::ebml::{self, ElementHeader};
use webm_io::elements::{self, codec_ids};
use webm_io::{
    AudioTrackConfig, Frame, MuxSession, ParseSession, Result, TrackType, VideoTrackConfig,
    WebmError,
};

const MS: u64 = 1_000_000;

fn collect_frames<'a>(session: &ParseSession<'a>) -> Vec<Frame<'a>> {
    session
        .frames()
        .unwrap()
        .collect::<Result<Vec<_>>>()
        .unwrap()
}

#[test]
fn minimal_vp8_roundtrip() {
    let mut muxer = MuxSession::new();
    let video = muxer
        .add_video_track(VideoTrackConfig::new(640, 480, codec_ids::V_VP8))
        .unwrap();
    muxer
        .write_video_frame(video, &[0x30, 0x00, 0x00], 0, true)
        .unwrap();
    let bytes = muxer.into_bytes().unwrap();

    let session = ParseSession::new(&bytes).unwrap();
    assert_eq!(session.track_count(), 1);

    let track = session.track_info(0).unwrap();
    assert_eq!(track.codec_id, "V_VP8");
    assert_eq!(track.track_type, TrackType::Video);
    let video_info = track.video.as_ref().unwrap();
    assert_eq!(video_info.pixel_width, 640);
    assert_eq!(video_info.pixel_height, 480);

    let frames = collect_frames(&session);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].payload, &[0x30, 0x00, 0x00]);
    assert_eq!(frames[0].timestamp_ns, 0);
    assert!(frames[0].is_keyframe);
}

#[test]
fn two_track_three_second_mix() {
    let mut muxer = MuxSession::new();
    let video = muxer
        .add_video_track(VideoTrackConfig::new(1920, 1080, codec_ids::V_VP9))
        .unwrap();
    let audio = muxer
        .add_audio_track(AudioTrackConfig::new(48_000.0, 2, codec_ids::A_OPUS))
        .unwrap();

    let video_times: Vec<u64> = (0..90).map(|i| i * 33_333_333).collect();
    let audio_times: Vec<u64> = (0..150).map(|i| i * 20_000_000).collect();

    for (i, &ts) in video_times.iter().enumerate() {
        muxer
            .write_video_frame(video, &[0x90, i as u8], ts, i % 30 == 0)
            .unwrap();
    }
    for &ts in &audio_times {
        muxer.write_audio_frame(audio, &[0xA0], ts).unwrap();
    }

    let bytes = muxer.into_bytes().unwrap();
    let session = ParseSession::new(&bytes).unwrap();

    let duration = session.duration_ns().unwrap();
    assert!(
        (2_980_000_000..=3_020_000_000).contains(&duration),
        "duration was {duration}"
    );

    let frames = collect_frames(&session);
    assert_eq!(frames.len(), 240);

    // Timestamps recover to within half a tick of the inputs.
    let recovered_video: Vec<u64> = frames
        .iter()
        .filter(|f| f.track_number == video.track_number())
        .map(|f| f.timestamp_ns)
        .collect();
    let recovered_audio: Vec<u64> = frames
        .iter()
        .filter(|f| f.track_number == audio.track_number())
        .map(|f| f.timestamp_ns)
        .collect();
    assert_eq!(recovered_video.len(), 90);
    assert_eq!(recovered_audio.len(), 150);

    for (got, want) in recovered_video.iter().zip(&video_times) {
        assert!(got.abs_diff(*want) <= MS / 2, "video {got} vs {want}");
    }
    for (got, want) in recovered_audio.iter().zip(&audio_times) {
        assert!(got.abs_diff(*want) <= MS / 2, "audio {got} vs {want}");
    }

    // Keyframe flags survive; audio frames are always keyframes.
    let video_keyframes: Vec<bool> = frames
        .iter()
        .filter(|f| f.track_number == video.track_number())
        .map(|f| f.is_keyframe)
        .collect();
    assert!(video_keyframes[0] && video_keyframes[30] && video_keyframes[60]);
    assert!(!video_keyframes[1]);
    assert!(frames
        .iter()
        .filter(|f| f.track_number == audio.track_number())
        .all(|f| f.is_keyframe));
}

#[test]
fn cluster_boundary_crossing() {
    let mut muxer = MuxSession::new();
    let video = muxer
        .add_video_track(VideoTrackConfig::new(640, 480, codec_ids::V_VP8))
        .unwrap();
    muxer.write_video_frame(video, &[0x01], 0, true).unwrap();
    // 40 s = 40 000 ticks, beyond the signed 16-bit block delta range.
    muxer
        .write_video_frame(video, &[0x02], 40_000_000_000, true)
        .unwrap();
    let bytes = muxer.into_bytes().unwrap();

    let cluster_count = bytes
        .windows(4)
        .filter(|w| w == &[0x1F, 0x43, 0xB6, 0x75])
        .count();
    assert!(cluster_count >= 2, "expected at least two clusters");

    let session = ParseSession::new(&bytes).unwrap();
    let frames = collect_frames(&session);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].timestamp_ns, 0);
    assert_eq!(frames[1].timestamp_ns, 40_000_000_000);
}

#[test]
fn rejected_inputs() {
    // Not an EBML stream.
    assert!(matches!(
        ParseSession::new(&[0x00, 0x00, 0x00, 0x00]),
        Err(WebmError::InvalidHeader(_))
    ));

    // Wrong DocType.
    let mut data = Vec::new();
    let mut content = Vec::new();
    ebml::write_element(&mut content, elements::DOC_TYPE, b"matroska");
    ebml::write_element(&mut data, elements::EBML, &content);
    ebml::write_element(&mut data, elements::SEGMENT, &[]);
    assert!(matches!(
        ParseSession::new(&data),
        Err(WebmError::InvalidHeader(_))
    ));

    // Unknown track handle.
    let mut muxer = MuxSession::new();
    let video = muxer
        .add_video_track(VideoTrackConfig::new(640, 480, codec_ids::V_VP8))
        .unwrap();
    let stray = {
        let mut m = MuxSession::new();
        m.add_video_track(VideoTrackConfig::new(2, 2, codec_ids::V_VP8))
            .unwrap();
        m.add_video_track(VideoTrackConfig::new(2, 2, codec_ids::V_VP8))
            .unwrap()
    };
    assert!(matches!(
        muxer.write_video_frame(stray, &[0x01], 0, true),
        Err(WebmError::InvalidArgument(_))
    ));

    // Backwards timestamp on one track.
    muxer.write_video_frame(video, &[0x01], 100, true).unwrap();
    assert!(matches!(
        muxer.write_video_frame(video, &[0x02], 50, false),
        Err(WebmError::OutOfOrderFrame { .. })
    ));

    // Zero width.
    let mut muxer = MuxSession::new();
    assert!(matches!(
        muxer.add_video_track(VideoTrackConfig::new(0, 480, codec_ids::V_VP8)),
        Err(WebmError::InvalidArgument(_))
    ));
}

// ---------------------------------------------------------------------------
// Handcrafted files
// ---------------------------------------------------------------------------

fn uint_element(id: u32, value: u64) -> Vec<u8> {
    let mut content = Vec::new();
    ebml::write_uint(&mut content, value);
    let mut out = Vec::new();
    ebml::write_element(&mut out, id, &content);
    out
}

fn webm_ebml_header() -> Vec<u8> {
    let mut content = Vec::new();
    content.extend(uint_element(elements::EBML_VERSION, 1));
    content.extend(uint_element(elements::EBML_READ_VERSION, 1));
    content.extend(uint_element(elements::EBML_MAX_ID_LENGTH, 4));
    content.extend(uint_element(elements::EBML_MAX_SIZE_LENGTH, 8));
    let mut doc_type = Vec::new();
    ebml::write_element(&mut doc_type, elements::DOC_TYPE, b"webm");
    content.extend(doc_type);
    content.extend(uint_element(elements::DOC_TYPE_VERSION, 2));
    content.extend(uint_element(elements::DOC_TYPE_READ_VERSION, 2));

    let mut out = Vec::new();
    ebml::write_element(&mut out, elements::EBML, &content);
    out
}

fn vp8_tracks() -> Vec<u8> {
    let mut video = Vec::new();
    video.extend(uint_element(elements::PIXEL_WIDTH, 320));
    video.extend(uint_element(elements::PIXEL_HEIGHT, 240));

    let mut entry = Vec::new();
    entry.extend(uint_element(elements::TRACK_NUMBER, 1));
    entry.extend(uint_element(elements::TRACK_TYPE, 1));
    ebml::write_element(&mut entry, elements::CODEC_ID, b"V_VP8");
    ebml::write_element(&mut entry, elements::VIDEO, &video);

    let mut tracks = Vec::new();
    ebml::write_element(&mut tracks, elements::TRACK_ENTRY, &entry);
    let mut out = Vec::new();
    ebml::write_element(&mut out, elements::TRACKS, &tracks);
    out
}

fn simple_block(track: u64, delta: i16, flags: u8, body: &[u8]) -> Vec<u8> {
    let mut content = Vec::new();
    ebml::write_vint(&mut content, track);
    content.extend_from_slice(&delta.to_be_bytes());
    content.push(flags);
    content.extend_from_slice(body);

    let mut out = Vec::new();
    ebml::write_element(&mut out, elements::SIMPLE_BLOCK, &content);
    out
}

fn cluster(timecode: u64, blocks: &[Vec<u8>]) -> Vec<u8> {
    let mut content = uint_element(elements::TIMECODE, timecode);
    for block in blocks {
        content.extend_from_slice(block);
    }
    let mut out = Vec::new();
    ebml::write_element(&mut out, elements::CLUSTER, &content);
    out
}

#[test]
fn fixed_lacing_three_frames() {
    // Fixed lacing: 1 lacing-count byte + 12 frame bytes, three frames of 4.
    let mut body = vec![2u8];
    body.extend_from_slice(&[1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3]);
    assert_eq!(body.len(), 13);

    let mut data = webm_ebml_header();
    let mut segment = vp8_tracks();
    segment.extend(cluster(25, &[simple_block(1, 0, 0x80 | 0x04, &body)]));
    ebml::write_element(&mut data, elements::SEGMENT, &segment);

    let session = ParseSession::new(&data).unwrap();
    let frames = collect_frames(&session);

    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].payload, &[1, 1, 1, 1]);
    assert_eq!(frames[1].payload, &[2, 2, 2, 2]);
    assert_eq!(frames[2].payload, &[3, 3, 3, 3]);
    for frame in &frames {
        assert_eq!(frame.timestamp_ns, 25 * MS);
    }
}

#[test]
fn void_between_info_and_tracks_is_transparent() {
    let info = {
        let mut content = uint_element(elements::TIMECODE_SCALE, MS);
        let mut muxing_app = Vec::new();
        ebml::write_element(&mut muxing_app, elements::MUXING_APP, b"handcraft");
        content.extend(muxing_app);
        let mut out = Vec::new();
        ebml::write_element(&mut out, elements::INFO, &content);
        out
    };
    let void = {
        let mut out = Vec::new();
        ebml::write_element(&mut out, elements::VOID, &[0xAB; 100]);
        out
    };
    let media = cluster(3, &[simple_block(1, 1, 0x80, &[0x42, 0x43])]);

    let build = |with_void: bool| {
        let mut data = webm_ebml_header();
        let mut segment = info.clone();
        if with_void {
            segment.extend_from_slice(&void);
        }
        segment.extend(vp8_tracks());
        segment.extend_from_slice(&media);
        ebml::write_element(&mut data, elements::SEGMENT, &segment);
        data
    };

    let plain = build(false);
    let padded = build(true);

    let plain_session = ParseSession::new(&plain).unwrap();
    let padded_session = ParseSession::new(&padded).unwrap();

    assert_eq!(plain_session.tracks(), padded_session.tracks());
    assert_eq!(collect_frames(&plain_session), collect_frames(&padded_session));
}

#[test]
fn unknown_length_segment() {
    let mut data = webm_ebml_header();
    // Segment ID with the one-byte unknown-size encoding.
    data.extend_from_slice(&[0x18, 0x53, 0x80, 0x67, 0xFF]);
    data.extend(vp8_tracks());
    data.extend(cluster(0, &[simple_block(1, 0, 0x80, &[0x01])]));
    data.extend(cluster(6, &[simple_block(1, 0, 0x00, &[0x02])]));

    let session = ParseSession::new(&data).unwrap();
    let frames = collect_frames(&session);

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].timestamp_ns, 0);
    assert_eq!(frames[1].timestamp_ns, 6 * MS);
    assert!(!frames[1].is_keyframe);
}

#[test]
fn unknown_length_cluster_ends_at_next_cluster() {
    let mut data = webm_ebml_header();
    data.extend_from_slice(&[0x18, 0x53, 0x80, 0x67, 0xFF]);
    data.extend(vp8_tracks());
    // First cluster with the unknown-size encoding (4-byte form), resolved
    // by the appearance of the second cluster.
    data.extend_from_slice(&[0x1F, 0x43, 0xB6, 0x75, 0x1F, 0xFF, 0xFF, 0xFF]);
    data.extend(uint_element(elements::TIMECODE, 0));
    data.extend(simple_block(1, 0, 0x80, &[0x01]));
    data.extend(cluster(8, &[simple_block(1, 0, 0x80, &[0x02])]));

    let session = ParseSession::new(&data).unwrap();
    let frames = collect_frames(&session);

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].timestamp_ns, 0);
    assert_eq!(frames[1].timestamp_ns, 8 * MS);
}

// ---------------------------------------------------------------------------
// Structural properties of muxer output
// ---------------------------------------------------------------------------

/// Master elements whose payloads are themselves element sequences.
fn is_master(id: u32) -> bool {
    matches!(
        id,
        elements::EBML
            | elements::SEGMENT
            | elements::INFO
            | elements::TRACKS
            | elements::TRACK_ENTRY
            | elements::VIDEO
            | elements::AUDIO
            | elements::CLUSTER
    )
}

/// Walk an element sequence, asserting every declared size exactly tiles
/// its parent. Returns the number of elements visited.
fn check_sizes(data: &[u8], start: usize, end: usize) -> usize {
    let mut visited = 0;
    let mut pos = start;
    while pos < end {
        let header = ElementHeader::parse(data, pos).unwrap();
        let size = header.size.unwrap() as usize;
        let payload_start = pos + header.header_len;
        let payload_end = payload_start + size;
        assert!(payload_end <= end, "element at {pos} overruns its parent");

        visited += 1;
        if is_master(header.id) {
            visited += check_sizes(data, payload_start, payload_end);
        }
        pos = payload_end;
    }
    assert_eq!(pos, end, "children do not tile the parent exactly");
    visited
}

#[test]
fn every_size_field_matches_its_payload() {
    let mut muxer = MuxSession::new();
    let video = muxer
        .add_video_track(
            VideoTrackConfig::new(640, 480, codec_ids::V_VP8)
                .with_name("main")
                .with_language("und")
                .with_default_duration(33_333_333),
        )
        .unwrap();
    let audio = muxer
        .add_audio_track(
            AudioTrackConfig::new(48_000.0, 2, codec_ids::A_OPUS)
                .with_bit_depth(16)
                .with_codec_private(webm_io::OpusCodecPrivate::new(2, 48_000).build()),
        )
        .unwrap();

    for i in 0..20u64 {
        muxer
            .write_video_frame(video, &[0x10; 64], i * 33 * MS, i % 10 == 0)
            .unwrap();
        muxer
            .write_audio_frame(audio, &[0x20; 32], i * 20 * MS)
            .unwrap();
    }
    let bytes = muxer.into_bytes().unwrap();

    let visited = check_sizes(&bytes, 0, bytes.len());
    assert!(visited > 10, "walked only {visited} elements");
}

#[test]
fn duration_matches_largest_timestamp() {
    let mut muxer = MuxSession::new();
    let video = muxer
        .add_video_track(VideoTrackConfig::new(640, 480, codec_ids::V_VP8))
        .unwrap();
    for ts in [0u64, 500 * MS, 1_200 * MS] {
        muxer.write_video_frame(video, &[0x01], ts, true).unwrap();
    }
    let bytes = muxer.into_bytes().unwrap();

    let session = ParseSession::new(&bytes).unwrap();
    assert_eq!(session.duration_ns(), Some(1_200 * MS));
    assert_eq!(session.segment_info().duration, Some(1_200.0));
}

#[test]
fn metadata_roundtrip() {
    let mut muxer = MuxSession::new();
    muxer
        .add_video_track(
            VideoTrackConfig::new(1280, 720, codec_ids::V_AV1).with_name("camera"),
        )
        .unwrap();
    muxer
        .add_audio_track(
            AudioTrackConfig::new(44_100.0, 1, codec_ids::A_VORBIS).with_bit_depth(24),
        )
        .unwrap();
    let bytes = muxer.into_bytes().unwrap();

    let session = ParseSession::new(&bytes).unwrap();
    assert_eq!(session.ebml_header().doc_type, "webm");
    assert_eq!(session.ebml_header().doc_type_version, 2);
    assert_eq!(session.timecode_scale(), MS);
    assert_eq!(
        session.segment_info().muxing_app.as_deref(),
        Some("webm-io")
    );

    assert_eq!(session.track_count(), 2);
    let video = session.track_info(0).unwrap();
    assert_eq!(video.number, 1);
    assert_eq!(video.codec_id, "V_AV1");
    assert_eq!(video.name.as_deref(), Some("camera"));
    assert_eq!(video.default_duration_ns, None);

    let audio = session.track_info(1).unwrap();
    assert_eq!(audio.number, 2);
    assert_eq!(audio.codec_id, "A_VORBIS");
    let audio_info = audio.audio.as_ref().unwrap();
    assert_eq!(audio_info.sampling_frequency, 44_100.0);
    assert_eq!(audio_info.channels, 1);
    assert_eq!(audio_info.bit_depth, Some(24));

    // A zero-frame file parses with no frames and a zero duration.
    let frames = collect_frames(&session);
    assert!(frames.is_empty());
    assert_eq!(session.duration_ns(), Some(0));
}

#[test]
fn mux_parse_timestamp_set_is_stable() {
    // Exact-multiple timestamps round-trip exactly, in write order.
    let mut muxer = MuxSession::new();
    let v = muxer
        .add_video_track(VideoTrackConfig::new(320, 240, codec_ids::V_VP9))
        .unwrap();
    let a = muxer
        .add_audio_track(AudioTrackConfig::new(48_000.0, 2, codec_ids::A_OPUS))
        .unwrap();

    let written: Vec<(u64, u64)> = vec![
        (v.track_number(), 0),
        (a.track_number(), 0),
        (a.track_number(), 20 * MS),
        (v.track_number(), 40 * MS),
        (a.track_number(), 40 * MS),
        (v.track_number(), 80 * MS),
    ];
    for &(track, ts) in &written {
        if track == v.track_number() {
            muxer.write_video_frame(v, &[0x01], ts, ts == 0).unwrap();
        } else {
            muxer.write_audio_frame(a, &[0x02], ts).unwrap();
        }
    }
    let bytes = muxer.into_bytes().unwrap();

    let session = ParseSession::new(&bytes).unwrap();
    let recovered: Vec<(u64, u64)> = collect_frames(&session)
        .iter()
        .map(|f| (f.track_number, f.timestamp_ns))
        .collect();
    assert_eq!(recovered, written);
}
