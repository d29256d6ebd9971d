//! WebM element definitions and the codec registry.
//!
//! Element IDs are the subset of the Matroska specification that the WebM
//! profile uses. IDs include the VINT length marker as part of their value.

// ============================================================================
// EBML Header Elements
// ============================================================================

/// EBML (root of the EBML header).
pub const EBML: u32 = 0x1A45DFA3;
/// EBML Version.
pub const EBML_VERSION: u32 = 0x4286;
/// EBML Read Version.
pub const EBML_READ_VERSION: u32 = 0x42F7;
/// Maximum ID Length.
pub const EBML_MAX_ID_LENGTH: u32 = 0x42F2;
/// Maximum Size Length.
pub const EBML_MAX_SIZE_LENGTH: u32 = 0x42F3;
/// Document Type.
pub const DOC_TYPE: u32 = 0x4282;
/// Document Type Version.
pub const DOC_TYPE_VERSION: u32 = 0x4287;
/// Document Type Read Version.
pub const DOC_TYPE_READ_VERSION: u32 = 0x4285;

// ============================================================================
// Segment Elements
// ============================================================================

/// Segment (main container).
pub const SEGMENT: u32 = 0x18538067;
/// SeekHead (skipped on parse, never emitted).
pub const SEEK_HEAD: u32 = 0x114D9B74;

/// Info (segment information).
pub const INFO: u32 = 0x1549A966;
/// Timecode Scale (nanoseconds per tick).
pub const TIMECODE_SCALE: u32 = 0x2AD7B1;
/// Duration in TimecodeScale units (float).
pub const DURATION: u32 = 0x4489;
/// Muxing Application.
pub const MUXING_APP: u32 = 0x4D80;
/// Writing Application.
pub const WRITING_APP: u32 = 0x5741;

// ============================================================================
// Track Elements
// ============================================================================

/// Tracks container.
pub const TRACKS: u32 = 0x1654AE6B;
/// Track Entry.
pub const TRACK_ENTRY: u32 = 0xAE;
/// Track Number.
pub const TRACK_NUMBER: u32 = 0xD7;
/// Track UID.
pub const TRACK_UID: u32 = 0x73C5;
/// Track Type.
pub const TRACK_TYPE: u32 = 0x83;
/// Flag Enabled.
pub const FLAG_ENABLED: u32 = 0xB9;
/// Flag Default.
pub const FLAG_DEFAULT: u32 = 0x88;
/// Flag Lacing.
pub const FLAG_LACING: u32 = 0x9C;
/// Default Duration (nanoseconds per frame).
pub const DEFAULT_DURATION: u32 = 0x23E383;
/// Track Name.
pub const NAME: u32 = 0x536E;
/// Language (ISO 639-2).
pub const LANGUAGE: u32 = 0x22B59C;
/// Codec ID.
pub const CODEC_ID: u32 = 0x86;
/// Codec Private.
pub const CODEC_PRIVATE: u32 = 0x63A2;

// Track types
/// Video track type.
pub const TRACK_TYPE_VIDEO: u8 = 1;
/// Audio track type.
pub const TRACK_TYPE_AUDIO: u8 = 2;

// ============================================================================
// Video / Audio Track Elements
// ============================================================================

/// Video settings container.
pub const VIDEO: u32 = 0xE0;
/// Pixel Width.
pub const PIXEL_WIDTH: u32 = 0xB0;
/// Pixel Height.
pub const PIXEL_HEIGHT: u32 = 0xBA;

/// Audio settings container.
pub const AUDIO: u32 = 0xE1;
/// Sampling Frequency (float).
pub const SAMPLING_FREQUENCY: u32 = 0xB5;
/// Channels.
pub const CHANNELS: u32 = 0x9F;
/// Bit Depth.
pub const BIT_DEPTH: u32 = 0x6264;

// ============================================================================
// Cluster Elements
// ============================================================================

/// Cluster (container for blocks).
pub const CLUSTER: u32 = 0x1F43B675;
/// Timecode (cluster base in TimecodeScale units).
pub const TIMECODE: u32 = 0xE7;
/// Simple Block.
pub const SIMPLE_BLOCK: u32 = 0xA3;
/// Block Group.
pub const BLOCK_GROUP: u32 = 0xA0;
/// Block.
pub const BLOCK: u32 = 0xA1;
/// Reference Block (signed; presence marks a non-keyframe).
pub const REFERENCE_BLOCK: u32 = 0xFB;

// ============================================================================
// Utility Elements
// ============================================================================

/// Cues (skipped on parse, never emitted).
pub const CUES: u32 = 0x1C53BB6B;
/// Void (padding, skipped anywhere).
pub const VOID: u32 = 0xEC;
/// CRC-32 (skipped).
pub const CRC32: u32 = 0xBF;

// ============================================================================
// Codec Registry
// ============================================================================

/// WebM codec ID strings.
pub mod codec_ids {
    /// VP8 video codec.
    pub const V_VP8: &str = "V_VP8";
    /// VP9 video codec.
    pub const V_VP9: &str = "V_VP9";
    /// AV1 video codec.
    pub const V_AV1: &str = "V_AV1";

    /// Opus audio codec.
    pub const A_OPUS: &str = "A_OPUS";
    /// Vorbis audio codec.
    pub const A_VORBIS: &str = "A_VORBIS";
}

/// The closed set of WebM video codec IDs.
pub const WEBM_VIDEO_CODECS: &[&str] = &[codec_ids::V_VP8, codec_ids::V_VP9, codec_ids::V_AV1];

/// The closed set of WebM audio codec IDs.
pub const WEBM_AUDIO_CODECS: &[&str] = &[codec_ids::A_OPUS, codec_ids::A_VORBIS];

/// Check if a codec ID names a WebM video codec.
pub fn is_webm_video_codec(codec_id: &str) -> bool {
    WEBM_VIDEO_CODECS.contains(&codec_id)
}

/// Check if a codec ID names a WebM audio codec.
pub fn is_webm_audio_codec(codec_id: &str) -> bool {
    WEBM_AUDIO_CODECS.contains(&codec_id)
}

/// Check if a codec ID is in the WebM registry at all.
pub fn is_webm_codec(codec_id: &str) -> bool {
    is_webm_video_codec(codec_id) || is_webm_audio_codec(codec_id)
}

/// Get a human-readable name for an element ID.
pub fn element_name(id: u32) -> &'static str {
    match id {
        EBML => "EBML",
        EBML_VERSION => "EBMLVersion",
        EBML_READ_VERSION => "EBMLReadVersion",
        EBML_MAX_ID_LENGTH => "EBMLMaxIDLength",
        EBML_MAX_SIZE_LENGTH => "EBMLMaxSizeLength",
        DOC_TYPE => "DocType",
        DOC_TYPE_VERSION => "DocTypeVersion",
        DOC_TYPE_READ_VERSION => "DocTypeReadVersion",
        SEGMENT => "Segment",
        SEEK_HEAD => "SeekHead",
        INFO => "Info",
        TIMECODE_SCALE => "TimecodeScale",
        DURATION => "Duration",
        MUXING_APP => "MuxingApp",
        WRITING_APP => "WritingApp",
        TRACKS => "Tracks",
        TRACK_ENTRY => "TrackEntry",
        TRACK_NUMBER => "TrackNumber",
        TRACK_UID => "TrackUID",
        TRACK_TYPE => "TrackType",
        DEFAULT_DURATION => "DefaultDuration",
        NAME => "Name",
        LANGUAGE => "Language",
        CODEC_ID => "CodecID",
        CODEC_PRIVATE => "CodecPrivate",
        VIDEO => "Video",
        PIXEL_WIDTH => "PixelWidth",
        PIXEL_HEIGHT => "PixelHeight",
        AUDIO => "Audio",
        SAMPLING_FREQUENCY => "SamplingFrequency",
        CHANNELS => "Channels",
        BIT_DEPTH => "BitDepth",
        CLUSTER => "Cluster",
        TIMECODE => "Timecode",
        SIMPLE_BLOCK => "SimpleBlock",
        BLOCK_GROUP => "BlockGroup",
        BLOCK => "Block",
        REFERENCE_BLOCK => "ReferenceBlock",
        CUES => "Cues",
        VOID => "Void",
        CRC32 => "CRC-32",
        _ => "Unknown",
    }
}
