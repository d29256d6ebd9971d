//! WebM parse session and frame iteration.
//!
//! [`ParseSession`] walks the element tree of an in-memory WebM buffer in a
//! single forward pass: EBML header, then Segment metadata (Info, Tracks) up
//! to the first Cluster. [`FrameIter`] then lazily yields decoded-ready
//! frames from the clusters; pulling one frame never parses a later cluster.

use crate::ebml::{self, EbmlHeader, ElementHeader, SUPPORTED_DOC_TYPE_READ_VERSION};
use crate::elements::*;
use crate::error::{Result, WebmError};
use std::collections::{HashMap, VecDeque};
use std::ops::Range;
use tracing::{debug, trace};

/// Default timecode scale (1 millisecond in nanoseconds).
pub const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;

/// Lacing modes, from bits 2..1 of the block flags byte.
mod lacing {
    /// Single frame per block.
    pub const NONE: u8 = 0;
    /// Xiph-style 255-run length prefixes.
    pub const XIPH: u8 = 1;
    /// All frames share one size.
    pub const FIXED: u8 = 2;
    /// First length as a VINT, then signed VINT deltas.
    pub const EBML: u8 = 3;
}

/// Parser options.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    strict_timestamps: bool,
}

impl ParseOptions {
    /// Create options with defaults (lenient timestamps).
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, a block whose delta produces an absolute timestamp below
    /// zero fails with [`WebmError::NegativeTimestamp`] instead of being
    /// clamped to zero.
    pub fn strict_timestamps(mut self, strict: bool) -> Self {
        self.strict_timestamps = strict;
        self
    }
}

/// Track kind within the WebM profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackType {
    /// Video track (TrackType 1).
    Video,
    /// Audio track (TrackType 2).
    Audio,
}

/// Video-specific track settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoInfo {
    /// Pixel width.
    pub pixel_width: u32,
    /// Pixel height.
    pub pixel_height: u32,
}

/// Audio-specific track settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioInfo {
    /// Sampling frequency in Hz.
    pub sampling_frequency: f64,
    /// Number of channels.
    pub channels: u32,
    /// Bits per sample, if declared.
    pub bit_depth: Option<u32>,
}

// Matroska defaults apply when a track omits the Audio element entirely.
impl Default for AudioInfo {
    fn default() -> Self {
        Self {
            sampling_frequency: 8000.0,
            channels: 1,
            bit_depth: None,
        }
    }
}

/// One parsed TrackEntry.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    /// Track number (unique within the file).
    pub number: u64,
    /// Video or audio.
    pub track_type: TrackType,
    /// Codec ID string. Unknown codecs pass through untouched; consumers
    /// decide what to do with them.
    pub codec_id: String,
    /// Codec initialization data, if present.
    pub codec_private: Option<Vec<u8>>,
    /// Track name.
    pub name: Option<String>,
    /// Language (ISO 639-2).
    pub language: Option<String>,
    /// Nominal frame duration in nanoseconds.
    pub default_duration_ns: Option<u64>,
    /// Video settings; always present on video tracks.
    pub video: Option<VideoInfo>,
    /// Audio settings; always present on audio tracks.
    pub audio: Option<AudioInfo>,
}

/// Parsed SegmentInfo fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentInfo {
    /// Nanoseconds per timecode tick.
    pub timecode_scale: u64,
    /// Segment duration in timecode ticks, if declared.
    pub duration: Option<f64>,
    /// Muxing application string.
    pub muxing_app: Option<String>,
    /// Writing application string.
    pub writing_app: Option<String>,
}

impl Default for SegmentInfo {
    fn default() -> Self {
        Self {
            timecode_scale: DEFAULT_TIMECODE_SCALE,
            duration: None,
            muxing_app: None,
            writing_app: None,
        }
    }
}

impl SegmentInfo {
    /// Segment duration in nanoseconds, if declared and non-negative.
    pub fn duration_ns(&self) -> Option<u64> {
        self.duration
            .filter(|d| *d >= 0.0)
            .map(|d| (d * self.timecode_scale as f64) as u64)
    }
}

/// One elementary-stream frame yielded by [`FrameIter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Track the frame belongs to.
    pub track_number: u64,
    /// Absolute presentation timestamp in nanoseconds.
    pub timestamp_ns: u64,
    /// The codec-level payload, borrowed from the input buffer.
    pub payload: &'a [u8],
    /// Keyframe flag. Advisory for audio; inferred from the absence of a
    /// ReferenceBlock for BlockGroup frames.
    pub is_keyframe: bool,
}

/// A parse session over a borrowed WebM byte buffer.
///
/// Construction walks the EBML header and all Segment metadata before the
/// first cluster. Frames are pulled afterwards through [`ParseSession::frames`].
pub struct ParseSession<'a> {
    data: &'a [u8],
    options: ParseOptions,
    ebml_header: EbmlHeader,
    info: SegmentInfo,
    tracks: Vec<TrackInfo>,
    by_number: HashMap<u64, usize>,
    segment_end: usize,
    clusters_start: usize,
}

impl<'a> ParseSession<'a> {
    /// Parse the metadata of a WebM buffer.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        Self::with_options(data, ParseOptions::default())
    }

    /// Parse with explicit options.
    pub fn with_options(data: &'a [u8], options: ParseOptions) -> Result<Self> {
        let (ebml_header, pos) = parse_ebml_header(data)?;
        let (segment_payload, segment_end) = locate_segment(data, pos)?;

        let mut info = SegmentInfo::default();
        let mut info_seen = false;
        let mut tracks = Vec::new();
        let mut by_number = HashMap::new();

        let mut pos = segment_payload;
        let mut clusters_start = segment_end;
        while pos < segment_end {
            let header = ElementHeader::parse(data, pos)?;
            if header.id == CLUSTER {
                clusters_start = pos;
                break;
            }
            let (id, payload, next) = known_size_child(data, pos, &header, segment_end)?;
            match id {
                INFO => {
                    info = parse_info(data, payload)?;
                    info_seen = true;
                }
                TRACKS => {
                    parse_tracks(data, payload, &mut tracks, &mut by_number)?;
                }
                SEEK_HEAD | CUES | VOID | CRC32 => {
                    trace!(id, size = payload.len(), "skipping element");
                }
                _ => {
                    trace!(id, size = payload.len(), "skipping unknown element");
                }
            }
            pos = next;
        }

        debug!(
            doc_type_version = ebml_header.doc_type_version,
            timecode_scale = info.timecode_scale,
            tracks = tracks.len(),
            info_seen,
            "segment metadata parsed"
        );

        Ok(Self {
            data,
            options,
            ebml_header,
            info,
            tracks,
            by_number,
            segment_end,
            clusters_start,
        })
    }

    /// The parsed EBML document header.
    pub fn ebml_header(&self) -> &EbmlHeader {
        &self.ebml_header
    }

    /// The parsed SegmentInfo.
    pub fn segment_info(&self) -> &SegmentInfo {
        &self.info
    }

    /// Nanoseconds per timecode tick.
    pub fn timecode_scale(&self) -> u64 {
        self.info.timecode_scale
    }

    /// Declared duration in nanoseconds, if any.
    pub fn duration_ns(&self) -> Option<u64> {
        self.info.duration_ns()
    }

    /// Number of tracks, in file order.
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Track by file-order index.
    pub fn track_info(&self, index: usize) -> Option<&TrackInfo> {
        self.tracks.get(index)
    }

    /// Track by its TrackNumber.
    pub fn track_by_number(&self, number: u64) -> Option<&TrackInfo> {
        self.by_number.get(&number).map(|&i| &self.tracks[i])
    }

    /// All tracks, in file order.
    pub fn tracks(&self) -> &[TrackInfo] {
        &self.tracks
    }

    /// A lazy iterator over all frames, in file order.
    ///
    /// Fails with [`WebmError::MissingTracks`] when no Tracks element
    /// appeared before the first cluster.
    pub fn frames(&self) -> Result<FrameIter<'a>> {
        if self.tracks.is_empty() {
            return Err(WebmError::MissingTracks);
        }
        Ok(FrameIter {
            data: self.data,
            pos: self.clusters_start,
            segment_end: self.segment_end,
            timecode_scale: self.info.timecode_scale,
            strict: self.options.strict_timestamps,
            in_cluster: false,
            cluster_end: 0,
            cluster_unknown_size: false,
            cluster_timecode: None,
            pending: VecDeque::new(),
            finished: false,
        })
    }
}

/// Lazy pull-model frame iterator over the Segment's clusters.
pub struct FrameIter<'a> {
    data: &'a [u8],
    pos: usize,
    segment_end: usize,
    timecode_scale: u64,
    strict: bool,
    in_cluster: bool,
    cluster_end: usize,
    cluster_unknown_size: bool,
    cluster_timecode: Option<u64>,
    pending: VecDeque<Frame<'a>>,
    finished: bool,
}

impl<'a> Iterator for FrameIter<'a> {
    type Item = Result<Frame<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(frame) = self.pending.pop_front() {
            return Some(Ok(frame));
        }
        if self.finished {
            return None;
        }
        match self.advance() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl<'a> FrameIter<'a> {
    fn advance(&mut self) -> Result<Option<Frame<'a>>> {
        loop {
            if !self.in_cluster && !self.enter_next_cluster()? {
                return Ok(None);
            }
            if let Some(frame) = self.next_block_in_cluster()? {
                return Ok(Some(frame));
            }
            self.in_cluster = false;
        }
    }

    /// Scan forward for the next Cluster element.
    fn enter_next_cluster(&mut self) -> Result<bool> {
        while self.pos < self.segment_end {
            let header = ElementHeader::parse(self.data, self.pos)?;
            if header.id == CLUSTER {
                let payload_start = self.pos + header.header_len;
                match header.size {
                    Some(size) => {
                        let end = payload_start.checked_add(size as usize).filter(|&e| {
                            e <= self.data.len()
                        });
                        self.cluster_end = end.ok_or(WebmError::Truncated {
                            offset: self.data.len(),
                        })?;
                        self.cluster_unknown_size = false;
                    }
                    None => {
                        // Resolved by scanning for the next sibling ID.
                        self.cluster_end = self.segment_end;
                        self.cluster_unknown_size = true;
                    }
                }
                trace!(offset = self.pos, "entering cluster");
                self.pos = payload_start;
                self.in_cluster = true;
                self.cluster_timecode = None;
                return Ok(true);
            }

            let (id, payload, next) = known_size_child(self.data, self.pos, &header, self.segment_end)?;
            trace!(id, size = payload.len(), "skipping non-cluster element");
            self.pos = next;
        }
        Ok(false)
    }

    /// Yield the next block-bearing child of the current cluster, if any.
    fn next_block_in_cluster(&mut self) -> Result<Option<Frame<'a>>> {
        while self.pos < self.cluster_end {
            let header = ElementHeader::parse(self.data, self.pos)?;

            if self.cluster_unknown_size && is_segment_level(header.id) {
                // The unknown-size cluster ends where the next sibling starts.
                return Ok(None);
            }

            let (id, payload, next) =
                known_size_child(self.data, self.pos, &header, self.cluster_end)?;
            self.pos = next;

            match id {
                TIMECODE => {
                    self.cluster_timecode = Some(ebml::read_uint(&self.data[payload]));
                }
                SIMPLE_BLOCK => {
                    let mut frames = self.parse_block(payload, None)?;
                    if let Some(first) = frames.pop_front() {
                        self.pending.append(&mut frames);
                        return Ok(Some(first));
                    }
                }
                BLOCK_GROUP => {
                    let mut frames = self.parse_block_group(payload)?;
                    if let Some(first) = frames.pop_front() {
                        self.pending.append(&mut frames);
                        return Ok(Some(first));
                    }
                }
                _ => {}
            }
        }
        Ok(None)
    }

    /// Decode a SimpleBlock or Block payload into one or more frames.
    ///
    /// `keyframe_override` is `Some` for Block (in BlockGroup), whose flags
    /// byte carries no keyframe bit.
    fn parse_block(
        &self,
        payload: Range<usize>,
        keyframe_override: Option<bool>,
    ) -> Result<VecDeque<Frame<'a>>> {
        let block = &self.data[payload.clone()];
        let (track_number, vint_len) = ebml::read_vint(block, 0)?;
        if block.len() < vint_len + 3 {
            return Err(WebmError::InvalidStructure(
                "block header too small".to_string(),
            ));
        }

        let delta = i16::from_be_bytes([block[vint_len], block[vint_len + 1]]);
        let flags = block[vint_len + 2];
        let lacing_mode = (flags >> 1) & 0x03;
        let keyframe = keyframe_override.unwrap_or(flags & 0x80 != 0);

        let cluster_timecode = self.cluster_timecode.ok_or_else(|| {
            WebmError::InvalidStructure("cluster block before Timecode".to_string())
        })?;

        let base = cluster_timecode.min(i64::MAX as u64) as i64;
        let abs_ticks = base.saturating_add(delta as i64);
        if abs_ticks < 0 && self.strict {
            return Err(WebmError::NegativeTimestamp {
                cluster_timecode,
                delta,
            });
        }
        let timestamp_ns = (abs_ticks.max(0) as u64).saturating_mul(self.timecode_scale);

        let body = payload.start + vint_len + 3..payload.end;

        let mut frames = VecDeque::new();
        if lacing_mode == lacing::NONE {
            frames.push_back(Frame {
                track_number,
                timestamp_ns,
                payload: &self.data[body],
                is_keyframe: keyframe,
            });
            return Ok(frames);
        }

        for (i, range) in laced_frame_ranges(self.data, body, lacing_mode)?
            .into_iter()
            .enumerate()
        {
            frames.push_back(Frame {
                track_number,
                timestamp_ns,
                payload: &self.data[range],
                is_keyframe: keyframe && i == 0,
            });
        }
        Ok(frames)
    }

    /// Decode a BlockGroup: its Block, with keyframe-ness inferred from the
    /// absence of a ReferenceBlock child. Other children are skipped.
    fn parse_block_group(&self, payload: Range<usize>) -> Result<VecDeque<Frame<'a>>> {
        let mut block_range: Option<Range<usize>> = None;
        let mut has_reference = false;

        let mut pos = payload.start;
        while pos < payload.end {
            let (id, child, next) = read_child(self.data, pos, payload.end)?;
            match id {
                BLOCK => block_range = Some(child),
                REFERENCE_BLOCK => has_reference = true,
                _ => {}
            }
            pos = next;
        }

        match block_range {
            Some(range) => self.parse_block(range, Some(!has_reference)),
            None => Ok(VecDeque::new()),
        }
    }
}

/// Element IDs that terminate an unknown-size cluster.
fn is_segment_level(id: u32) -> bool {
    matches!(id, CLUSTER | INFO | TRACKS | SEEK_HEAD | CUES)
}

/// Read a known-size child and bound it to its parent.
fn read_child(data: &[u8], pos: usize, end: usize) -> Result<(u32, Range<usize>, usize)> {
    let (id, payload, next) = ebml::read_element(data, pos)?;
    if next > end {
        return Err(WebmError::InvalidStructure(format!(
            "{} element overruns its parent",
            element_name(id)
        )));
    }
    Ok((id, payload, next))
}

/// Like [`read_child`] but starting from an already-parsed header, rejecting
/// unknown-size children (only Segment and Cluster may use that encoding).
fn known_size_child(
    data: &[u8],
    pos: usize,
    header: &ElementHeader,
    end: usize,
) -> Result<(u32, Range<usize>, usize)> {
    if header.size.is_none() {
        return Err(WebmError::InvalidStructure(format!(
            "unknown-length {} element",
            element_name(header.id)
        )));
    }
    read_child(data, pos, end)
}

/// Parse and validate the EBML document header.
fn parse_ebml_header(data: &[u8]) -> Result<(EbmlHeader, usize)> {
    let (id, payload, next) = ebml::read_element(data, 0)
        .map_err(|_| WebmError::InvalidHeader("not an EBML stream".to_string()))?;
    if id != EBML {
        return Err(WebmError::InvalidHeader("not an EBML stream".to_string()));
    }

    let mut header = EbmlHeader {
        version: 1,
        read_version: 1,
        max_id_length: 4,
        max_size_length: 8,
        doc_type: "matroska".to_string(),
        doc_type_version: 1,
        doc_type_read_version: 1,
    };

    let mut pos = payload.start;
    while pos < payload.end {
        let (id, child, child_next) = read_child(data, pos, payload.end)?;
        let bytes = &data[child.clone()];
        match id {
            EBML_VERSION => header.version = ebml::read_uint(bytes),
            EBML_READ_VERSION => header.read_version = ebml::read_uint(bytes),
            EBML_MAX_ID_LENGTH => header.max_id_length = ebml::read_uint(bytes),
            EBML_MAX_SIZE_LENGTH => header.max_size_length = ebml::read_uint(bytes),
            DOC_TYPE => header.doc_type = ebml::read_string(bytes)?,
            DOC_TYPE_VERSION => header.doc_type_version = ebml::read_uint(bytes),
            DOC_TYPE_READ_VERSION => header.doc_type_read_version = ebml::read_uint(bytes),
            _ => {}
        }
        pos = child_next;
    }

    if header.doc_type != "webm" {
        return Err(WebmError::InvalidHeader(format!(
            "DocType is '{}', expected 'webm'",
            header.doc_type
        )));
    }
    if header.doc_type_read_version > SUPPORTED_DOC_TYPE_READ_VERSION {
        return Err(WebmError::InvalidHeader(format!(
            "DocTypeReadVersion {} exceeds supported level {}",
            header.doc_type_read_version, SUPPORTED_DOC_TYPE_READ_VERSION
        )));
    }
    if header.max_id_length > 4 || header.max_size_length > 8 {
        return Err(WebmError::InvalidHeader(format!(
            "EBMLMaxIDLength {} / EBMLMaxSizeLength {} out of range",
            header.max_id_length, header.max_size_length
        )));
    }

    Ok((header, next))
}

/// Find the Segment element after the EBML header.
///
/// Returns the Segment payload start and its resolved end: the declared end
/// for a known size, the end of the buffer for the unknown-length encoding.
fn locate_segment(data: &[u8], mut pos: usize) -> Result<(usize, usize)> {
    loop {
        let header = ElementHeader::parse(data, pos)?;
        match header.id {
            SEGMENT => {
                let payload_start = pos + header.header_len;
                let end = match header.size {
                    Some(size) => {
                        let end = payload_start
                            .checked_add(size as usize)
                            .filter(|&e| e <= data.len());
                        end.ok_or(WebmError::Truncated { offset: data.len() })?
                    }
                    None => data.len(),
                };
                return Ok((payload_start, end));
            }
            VOID | CRC32 => {
                let (_, _, next) = known_size_child(data, pos, &header, data.len())?;
                pos = next;
            }
            _ => {
                return Err(WebmError::InvalidStructure(format!(
                    "expected Segment, found {}",
                    element_name(header.id)
                )));
            }
        }
    }
}

/// Parse the Info element.
fn parse_info(data: &[u8], payload: Range<usize>) -> Result<SegmentInfo> {
    let mut info = SegmentInfo::default();

    let mut pos = payload.start;
    while pos < payload.end {
        let (id, child, next) = read_child(data, pos, payload.end)?;
        let bytes = &data[child.clone()];
        match id {
            TIMECODE_SCALE => {
                let scale = ebml::read_uint(bytes);
                if scale == 0 {
                    return Err(WebmError::InvalidStructure(
                        "TimecodeScale must be positive".to_string(),
                    ));
                }
                info.timecode_scale = scale;
            }
            DURATION => info.duration = Some(ebml::read_float(bytes)),
            MUXING_APP => info.muxing_app = Some(ebml::read_string(bytes)?),
            WRITING_APP => info.writing_app = Some(ebml::read_string(bytes)?),
            _ => {}
        }
        pos = next;
    }

    Ok(info)
}

/// Parse the Tracks element into `tracks`, preserving file order.
fn parse_tracks(
    data: &[u8],
    payload: Range<usize>,
    tracks: &mut Vec<TrackInfo>,
    by_number: &mut HashMap<u64, usize>,
) -> Result<()> {
    let mut pos = payload.start;
    let mut any_entry = false;
    while pos < payload.end {
        let (id, child, next) = read_child(data, pos, payload.end)?;
        if id == TRACK_ENTRY {
            any_entry = true;
            let track = parse_track_entry(data, child)?;
            if by_number.insert(track.number, tracks.len()).is_some() {
                return Err(WebmError::DuplicateTrackNumber(track.number));
            }
            trace!(number = track.number, codec = %track.codec_id, "track parsed");
            tracks.push(track);
        }
        pos = next;
    }

    if !any_entry {
        return Err(WebmError::InvalidStructure(
            "Tracks with no TrackEntry".to_string(),
        ));
    }
    Ok(())
}

/// Parse one TrackEntry.
fn parse_track_entry(data: &[u8], payload: Range<usize>) -> Result<TrackInfo> {
    let mut number = None;
    let mut raw_type = None;
    let mut codec_id = None;
    let mut codec_private = None;
    let mut name = None;
    let mut language = None;
    let mut default_duration_ns = None;
    let mut video = None;
    let mut audio = None;

    let mut pos = payload.start;
    while pos < payload.end {
        let (id, child, next) = read_child(data, pos, payload.end)?;
        let bytes = &data[child.clone()];
        match id {
            TRACK_NUMBER => number = Some(ebml::read_uint(bytes)),
            TRACK_TYPE => raw_type = Some(ebml::read_uint(bytes)),
            CODEC_ID => codec_id = Some(ebml::read_string(bytes)?),
            CODEC_PRIVATE => codec_private = Some(bytes.to_vec()),
            NAME => name = Some(ebml::read_string(bytes)?),
            LANGUAGE => language = Some(ebml::read_string(bytes)?),
            DEFAULT_DURATION => default_duration_ns = Some(ebml::read_uint(bytes)),
            VIDEO => video = Some(parse_video_settings(data, child)?),
            AUDIO => audio = Some(parse_audio_settings(data, child)?),
            _ => {}
        }
        pos = next;
    }

    let number = number
        .ok_or_else(|| WebmError::InvalidStructure("TrackEntry missing TrackNumber".to_string()))?;
    if number == 0 {
        return Err(WebmError::InvalidStructure(
            "TrackNumber must be positive".to_string(),
        ));
    }

    // TrackType is read directly; a missing or out-of-profile value is a
    // structural error, never inferred from the codec ID.
    let raw_type = raw_type
        .ok_or_else(|| WebmError::InvalidStructure("TrackEntry missing TrackType".to_string()))?;
    let track_type = match raw_type as u8 {
        TRACK_TYPE_VIDEO => TrackType::Video,
        TRACK_TYPE_AUDIO => TrackType::Audio,
        other => {
            return Err(WebmError::InvalidStructure(format!(
                "TrackType {other} is outside the WebM profile"
            )));
        }
    };

    let codec_id = codec_id
        .ok_or_else(|| WebmError::InvalidStructure("TrackEntry missing CodecID".to_string()))?;

    match track_type {
        TrackType::Video => {
            let v: &VideoInfo = video.as_ref().ok_or_else(|| {
                WebmError::InvalidStructure("video track missing Video element".to_string())
            })?;
            if v.pixel_width == 0 || v.pixel_height == 0 {
                return Err(WebmError::InvalidStructure(
                    "video track with zero pixel dimensions".to_string(),
                ));
            }
            audio = None;
        }
        TrackType::Audio => {
            let a = audio.get_or_insert_with(AudioInfo::default);
            if a.sampling_frequency <= 0.0 || a.channels == 0 {
                return Err(WebmError::InvalidStructure(
                    "audio track with invalid sampling frequency or channels".to_string(),
                ));
            }
            video = None;
        }
    }

    Ok(TrackInfo {
        number,
        track_type,
        codec_id,
        codec_private,
        name,
        language,
        default_duration_ns,
        video,
        audio,
    })
}

fn parse_video_settings(data: &[u8], payload: Range<usize>) -> Result<VideoInfo> {
    let mut video = VideoInfo {
        pixel_width: 0,
        pixel_height: 0,
    };

    let mut pos = payload.start;
    while pos < payload.end {
        let (id, child, next) = read_child(data, pos, payload.end)?;
        let bytes = &data[child.clone()];
        match id {
            PIXEL_WIDTH => video.pixel_width = ebml::read_uint(bytes) as u32,
            PIXEL_HEIGHT => video.pixel_height = ebml::read_uint(bytes) as u32,
            _ => {}
        }
        pos = next;
    }

    Ok(video)
}

fn parse_audio_settings(data: &[u8], payload: Range<usize>) -> Result<AudioInfo> {
    let mut audio = AudioInfo::default();

    let mut pos = payload.start;
    while pos < payload.end {
        let (id, child, next) = read_child(data, pos, payload.end)?;
        let bytes = &data[child.clone()];
        match id {
            SAMPLING_FREQUENCY => audio.sampling_frequency = ebml::read_float(bytes),
            CHANNELS => audio.channels = ebml::read_uint(bytes) as u32,
            BIT_DEPTH => audio.bit_depth = Some(ebml::read_uint(bytes) as u32),
            _ => {}
        }
        pos = next;
    }

    Ok(audio)
}

/// Split a laced block body into per-frame ranges.
fn laced_frame_ranges(
    data: &[u8],
    body: Range<usize>,
    lacing_mode: u8,
) -> Result<Vec<Range<usize>>> {
    let buf = &data[body.clone()];
    if buf.is_empty() {
        return Err(WebmError::InvalidLacing(
            "no data after block header".to_string(),
        ));
    }

    let frame_count = buf[0] as usize + 1;
    if frame_count == 1 {
        // Single-frame lacing carries no size fields at all.
        return Ok(vec![body.start + 1..body.end]);
    }

    let lace_data = &buf[1..];
    let (sizes, consumed) = match lacing_mode {
        lacing::XIPH => parse_xiph_sizes(lace_data, frame_count)?,
        lacing::EBML => parse_ebml_sizes(lace_data, frame_count)?,
        lacing::FIXED => {
            if lace_data.len() % frame_count != 0 {
                return Err(WebmError::InvalidLacing(format!(
                    "{} bytes not divisible into {} fixed-size frames",
                    lace_data.len(),
                    frame_count
                )));
            }
            (vec![lace_data.len() / frame_count; frame_count - 1], 0)
        }
        _ => unreachable!("lacing mode is two bits"),
    };

    // The first `frame_count - 1` sizes are explicit; the last frame is the
    // remainder of the body.
    let mut start = body.start + 1 + consumed;
    let used: usize = sizes.iter().sum();
    if start + used > body.end {
        return Err(WebmError::InvalidLacing(format!(
            "laced frame sizes total {} but only {} bytes remain",
            used,
            body.end - start
        )));
    }

    let mut ranges = Vec::with_capacity(frame_count);
    for size in sizes {
        ranges.push(start..start + size);
        start += size;
    }
    ranges.push(start..body.end);
    Ok(ranges)
}

/// Xiph lacing: each of the first n-1 sizes is a run of bytes summed until
/// one below 0xFF terminates it.
fn parse_xiph_sizes(data: &[u8], frame_count: usize) -> Result<(Vec<usize>, usize)> {
    let mut sizes = Vec::with_capacity(frame_count - 1);
    let mut offset = 0;

    for _ in 0..frame_count - 1 {
        let mut size = 0usize;
        loop {
            let byte = *data.get(offset).ok_or_else(|| {
                WebmError::InvalidLacing("Xiph lacing ran out of size bytes".to_string())
            })?;
            offset += 1;
            size += byte as usize;
            if byte < 0xFF {
                break;
            }
        }
        sizes.push(size);
    }

    Ok((sizes, offset))
}

/// EBML lacing: the first size is an unsigned VINT, each subsequent one a
/// signed VINT delta added to the previous.
fn parse_ebml_sizes(data: &[u8], frame_count: usize) -> Result<(Vec<usize>, usize)> {
    let mut sizes = Vec::with_capacity(frame_count - 1);

    let (first, mut offset) = ebml::read_vint(data, 0)?;
    sizes.push(first as usize);

    let mut prev = first as i64;
    for _ in 1..frame_count - 1 {
        let (raw, len) = ebml::read_vint(data, offset)?;
        offset += len;
        prev += vint_to_signed_delta(raw, len);
        if prev < 0 {
            return Err(WebmError::InvalidLacing(
                "EBML lacing produced a negative frame size".to_string(),
            ));
        }
        sizes.push(prev as usize);
    }

    Ok((sizes, offset))
}

/// EBML-style sign decoding: raw value minus `(1 << (7 * len - 1)) - 1`.
fn vint_to_signed_delta(value: u64, vint_len: usize) -> i64 {
    let bias = (1i64 << (7 * vint_len - 1)) - 1;
    value as i64 - bias
}
