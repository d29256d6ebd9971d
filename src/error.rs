//! Error types for WebM parsing and muxing.

use thiserror::Error;

/// Errors produced by WebM parsing and muxing operations.
#[derive(Error, Debug)]
pub enum WebmError {
    /// Not an EBML stream, wrong DocType, or unsupported version.
    #[error("invalid WebM header: {0}")]
    InvalidHeader(String),

    /// Premature end of buffer while reading a VINT, element header, or payload.
    #[error("truncated stream at offset {offset}")]
    Truncated {
        /// Byte offset where more data was expected.
        offset: usize,
    },

    /// Zero first byte, or reserved unknown-length encoding where not allowed.
    #[error("invalid VINT at offset {offset}")]
    InvalidVint {
        /// Byte offset of the offending VINT.
        offset: usize,
    },

    /// Required child missing or child out of permitted order.
    #[error("invalid structure: {0}")]
    InvalidStructure(String),

    /// Two TrackEntry records share a TrackNumber.
    #[error("duplicate track number {0}")]
    DuplicateTrackNumber(u64),

    /// Frame iteration was requested but the file declares no tracks.
    #[error("no Tracks element seen before the first cluster")]
    MissingTracks,

    /// A caller-supplied codec ID is not in the WebM codec registry.
    #[error("codec '{0}' is not in the WebM codec registry")]
    UnsupportedCodec(String),

    /// Lacing byte count inconsistent with the block payload size.
    #[error("invalid lacing: {0}")]
    InvalidLacing(String),

    /// Block delta produces an absolute timestamp below zero (strict mode).
    #[error("negative timestamp: cluster timecode {cluster_timecode} + block delta {delta}")]
    NegativeTimestamp {
        /// Cluster base timecode in TimecodeScale units.
        cluster_timecode: u64,
        /// Signed block-relative delta.
        delta: i16,
    },

    /// A frame timestamp went backwards on a single track.
    #[error("frame timestamp {timestamp_ns}ns precedes {last_ns}ns on track {track}")]
    OutOfOrderFrame {
        /// Track number the frame was written to.
        track: u64,
        /// Rejected timestamp in nanoseconds.
        timestamp_ns: u64,
        /// Last accepted timestamp on the same track.
        last_ns: u64,
    },

    /// An element's actual size does not fit its reserved size field.
    #[error("element size {actual} does not fit a {width}-byte reserved size field")]
    SizeFieldOverflow {
        /// The size that was to be encoded.
        actual: u64,
        /// Reserved field width in bytes.
        width: usize,
    },

    /// Empty payload, zero dimensions, unknown track handle, or misuse of a session.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for WebM operations.
pub type Result<T> = std::result::Result<T, WebmError>;
