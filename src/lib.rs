//! # webm-io
//!
//! Reading and writing WebM containers over in-memory byte buffers.
//!
//! WebM is a constrained profile of the Matroska/EBML format carrying VP8,
//! VP9, or AV1 video and Opus or Vorbis audio. This crate provides:
//!
//! - **Parsing**: element-tree traversal of a borrowed byte slice, track and
//!   segment metadata, and a lazy iterator of decoded-ready frames with
//!   absolute timestamps (SimpleBlock and BlockGroup, all lacing modes).
//! - **Muxing**: a segment builder that emits a well-formed WebM byte
//!   vector from caller-supplied encoded frames, with cluster management
//!   and reserved-size back-patching.
//!
//! The codec payloads themselves are opaque; file I/O is the caller's
//! concern on both sides.
//!
//! ## Example: muxing
//!
//! ```
//! use webm_io::{MuxSession, VideoTrackConfig, AudioTrackConfig, codec_ids};
//!
//! let mut muxer = MuxSession::new();
//! let video = muxer.add_video_track(VideoTrackConfig::new(1920, 1080, codec_ids::V_VP9))?;
//! let audio = muxer.add_audio_track(AudioTrackConfig::new(48_000.0, 2, codec_ids::A_OPUS))?;
//!
//! muxer.write_video_frame(video, &[0x30, 0x00, 0x00], 0, true)?;
//! muxer.write_audio_frame(audio, &[0xFC, 0xFF, 0xFE], 0)?;
//!
//! let bytes = muxer.into_bytes()?;
//! assert_eq!(&bytes[..4], &[0x1A, 0x45, 0xDF, 0xA3]);
//! # Ok::<(), webm_io::WebmError>(())
//! ```
//!
//! ## Example: parsing
//!
//! ```
//! # use webm_io::{MuxSession, VideoTrackConfig, codec_ids};
//! # let mut muxer = MuxSession::new();
//! # let video = muxer.add_video_track(VideoTrackConfig::new(640, 480, codec_ids::V_VP8))?;
//! # muxer.write_video_frame(video, &[0x30, 0x00, 0x00], 0, true)?;
//! # let bytes = muxer.into_bytes()?;
//! use webm_io::ParseSession;
//!
//! let session = ParseSession::new(&bytes)?;
//! for track in session.tracks() {
//!     println!("track {}: {}", track.number, track.codec_id);
//! }
//! for frame in session.frames()? {
//!     let frame = frame?;
//!     println!("track {} at {}ns: {} bytes", frame.track_number,
//!         frame.timestamp_ns, frame.payload.len());
//! }
//! # Ok::<(), webm_io::WebmError>(())
//! ```

pub mod demuxer;
pub mod ebml;
pub mod elements;
pub mod error;
pub mod muxer;

pub use demuxer::{
    AudioInfo, Frame, FrameIter, ParseOptions, ParseSession, SegmentInfo, TrackInfo, TrackType,
    VideoInfo,
};
pub use ebml::EbmlHeader;
pub use elements::{codec_ids, is_webm_audio_codec, is_webm_codec, is_webm_video_codec};
pub use error::{Result, WebmError};
pub use muxer::{
    AudioTrackConfig, MuxSession, MuxerConfig, MuxerState, TrackHandle, VideoTrackConfig,
};

/// VP9 CodecPrivate builder (the VP9 codec feature record).
#[derive(Debug, Clone, Default)]
pub struct Vp9CodecPrivate {
    /// Profile (0-3).
    pub profile: u8,
    /// Level.
    pub level: u8,
    /// Bit depth (8, 10, or 12).
    pub bit_depth: u8,
    /// Chroma subsampling mode.
    pub chroma_subsampling: u8,
}

impl Vp9CodecPrivate {
    /// Create a builder with all-zero fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the profile.
    pub fn with_profile(mut self, profile: u8) -> Self {
        self.profile = profile;
        self
    }

    /// Set the level.
    pub fn with_level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    /// Set the bit depth.
    pub fn with_bit_depth(mut self, bit_depth: u8) -> Self {
        self.bit_depth = bit_depth;
        self
    }

    /// Set the chroma subsampling mode.
    pub fn with_chroma_subsampling(mut self, subsampling: u8) -> Self {
        self.chroma_subsampling = subsampling;
        self
    }

    /// Build the CodecPrivate bytes.
    pub fn build(&self) -> Vec<u8> {
        vec![
            self.profile,
            self.level,
            (self.bit_depth << 4) | (self.chroma_subsampling & 0x0F),
        ]
    }
}

/// Opus CodecPrivate builder (the `OpusHead` identification header).
#[derive(Debug, Clone)]
pub struct OpusCodecPrivate {
    /// Number of channels.
    pub channels: u8,
    /// Samples to skip at the start of decode, at 48 kHz.
    pub pre_skip: u16,
    /// Original input sample rate in Hz.
    pub sample_rate: u32,
    /// Output gain in Q7.8 dB.
    pub output_gain: i16,
    /// Channel mapping family.
    pub channel_mapping_family: u8,
}

impl OpusCodecPrivate {
    /// Create a builder for the given channel count and input sample rate.
    pub fn new(channels: u8, sample_rate: u32) -> Self {
        Self {
            channels,
            pre_skip: 0,
            sample_rate,
            output_gain: 0,
            channel_mapping_family: 0,
        }
    }

    /// Set the pre-skip sample count.
    pub fn with_pre_skip(mut self, pre_skip: u16) -> Self {
        self.pre_skip = pre_skip;
        self
    }

    /// Set the output gain.
    pub fn with_output_gain(mut self, gain: i16) -> Self {
        self.output_gain = gain;
        self
    }

    /// Set the channel mapping family.
    pub fn with_channel_mapping_family(mut self, family: u8) -> Self {
        self.channel_mapping_family = family;
        self
    }

    /// Build the CodecPrivate bytes.
    pub fn build(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(19);
        data.extend_from_slice(b"OpusHead");
        data.push(1); // version
        data.push(self.channels);
        data.extend_from_slice(&self.pre_skip.to_le_bytes());
        data.extend_from_slice(&self.sample_rate.to_le_bytes());
        data.extend_from_slice(&self.output_gain.to_le_bytes());
        data.push(self.channel_mapping_family);
        data
    }
}

/// Vorbis CodecPrivate builder.
///
/// Matroska packs the three Vorbis headers into one CodecPrivate blob with
/// a Xiph-laced length prefix for the first two.
#[derive(Debug, Clone)]
pub struct VorbisCodecPrivate {
    /// Identification header packet.
    pub identification_header: Vec<u8>,
    /// Comment header packet.
    pub comment_header: Vec<u8>,
    /// Setup header packet.
    pub setup_header: Vec<u8>,
}

impl VorbisCodecPrivate {
    /// Create a builder from the three raw Vorbis header packets.
    pub fn from_headers(identification: Vec<u8>, comment: Vec<u8>, setup: Vec<u8>) -> Self {
        Self {
            identification_header: identification,
            comment_header: comment,
            setup_header: setup,
        }
    }

    /// Build the CodecPrivate bytes.
    pub fn build(&self) -> Vec<u8> {
        let mut data = Vec::new();
        data.push(2); // packet count - 1

        for header in [&self.identification_header, &self.comment_header] {
            let mut size = header.len();
            while size >= 255 {
                data.push(255);
                size -= 255;
            }
            data.push(size as u8);
        }

        data.extend_from_slice(&self.identification_header);
        data.extend_from_slice(&self.comment_header);
        data.extend_from_slice(&self.setup_header);
        data
    }
}

/// AV1 CodecPrivate builder (the `av1C` configuration record, verbatim).
#[derive(Debug, Clone, Default)]
pub struct Av1CodecPrivate {
    config_record: Vec<u8>,
}

impl Av1CodecPrivate {
    /// Create a builder from an AV1 configuration record.
    pub fn from_config_record(config: Vec<u8>) -> Self {
        Self {
            config_record: config,
        }
    }

    /// Build the CodecPrivate bytes.
    pub fn build(&self) -> Vec<u8> {
        self.config_record.clone()
    }
}
