//! WebM mux session.
//!
//! [`MuxSession`] assembles a complete WebM byte vector in memory: EBML
//! header, Segment with a reserved 8-byte size field, SegmentInfo with a
//! reserved Duration, Tracks, then a sequence of Clusters holding
//! SimpleBlocks. Every reserved size is recorded as an `(offset, width)`
//! pair when emitted and rewritten with an exact-width VINT at finalize.

use crate::ebml::{self, EbmlHeader};
use crate::elements::{self, *};
use crate::error::{Result, WebmError};
use tracing::{debug, trace};

/// Default timecode scale (1 millisecond in nanoseconds).
pub const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;

/// Default soft cap on cluster duration, in timecode ticks (5 s at 1 ms).
pub const DEFAULT_MAX_CLUSTER_TICKS: u64 = 5_000;

/// Reserved width of the Segment size field.
const SEGMENT_SIZE_WIDTH: usize = 8;

/// Reserved width of each Cluster size field.
const CLUSTER_SIZE_WIDTH: usize = 4;

/// Track numbers are encoded as one-byte VINTs in SimpleBlocks.
const MAX_TRACKS: u64 = 126;

/// Muxer configuration.
#[derive(Debug, Clone)]
pub struct MuxerConfig {
    /// Nanoseconds per timecode tick.
    pub timecode_scale: u64,
    /// Soft cap on cluster duration, in ticks. Must not exceed 32 767, the
    /// largest block-relative delta a cluster can address.
    pub max_cluster_ticks: u64,
    /// MuxingApp string written to SegmentInfo.
    pub muxing_app: String,
    /// WritingApp string written to SegmentInfo.
    pub writing_app: String,
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            timecode_scale: DEFAULT_TIMECODE_SCALE,
            max_cluster_ticks: DEFAULT_MAX_CLUSTER_TICKS,
            muxing_app: "webm-io".to_string(),
            writing_app: "webm-io".to_string(),
        }
    }
}

impl MuxerConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timecode scale (nanoseconds per tick).
    pub fn with_timecode_scale(mut self, scale: u64) -> Self {
        self.timecode_scale = scale;
        self
    }

    /// Set the soft cap on cluster duration, in ticks.
    pub fn with_max_cluster_ticks(mut self, ticks: u64) -> Self {
        self.max_cluster_ticks = ticks;
        self
    }

    /// Set the MuxingApp string.
    pub fn with_muxing_app(mut self, app: impl Into<String>) -> Self {
        self.muxing_app = app.into();
        self
    }

    /// Set the WritingApp string.
    pub fn with_writing_app(mut self, app: impl Into<String>) -> Self {
        self.writing_app = app.into();
        self
    }
}

/// Video track declaration.
#[derive(Debug, Clone)]
pub struct VideoTrackConfig {
    /// Pixel width.
    pub pixel_width: u32,
    /// Pixel height.
    pub pixel_height: u32,
    /// Codec ID; must be in the video codec registry.
    pub codec_id: String,
    /// Codec initialization data.
    pub codec_private: Option<Vec<u8>>,
    /// Nominal frame duration in nanoseconds.
    pub default_duration_ns: Option<u64>,
    /// Track name.
    pub name: Option<String>,
    /// Language (ISO 639-2).
    pub language: Option<String>,
}

impl VideoTrackConfig {
    /// Declare a video track.
    pub fn new(pixel_width: u32, pixel_height: u32, codec_id: impl Into<String>) -> Self {
        Self {
            pixel_width,
            pixel_height,
            codec_id: codec_id.into(),
            codec_private: None,
            default_duration_ns: None,
            name: None,
            language: None,
        }
    }

    /// Set codec initialization data.
    pub fn with_codec_private(mut self, data: Vec<u8>) -> Self {
        self.codec_private = Some(data);
        self
    }

    /// Set the nominal frame duration in nanoseconds.
    pub fn with_default_duration(mut self, duration_ns: u64) -> Self {
        self.default_duration_ns = Some(duration_ns);
        self
    }

    /// Set the frame rate (stored as a default duration).
    pub fn with_frame_rate(mut self, fps: f64) -> Self {
        self.default_duration_ns = Some((1_000_000_000.0 / fps) as u64);
        self
    }

    /// Set the track name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the track language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Audio track declaration.
#[derive(Debug, Clone)]
pub struct AudioTrackConfig {
    /// Sampling frequency in Hz.
    pub sampling_frequency: f64,
    /// Number of channels.
    pub channels: u32,
    /// Codec ID; must be in the audio codec registry.
    pub codec_id: String,
    /// Codec initialization data (required in practice for Opus and Vorbis).
    pub codec_private: Option<Vec<u8>>,
    /// Bits per sample.
    pub bit_depth: Option<u32>,
    /// Track name.
    pub name: Option<String>,
    /// Language (ISO 639-2).
    pub language: Option<String>,
}

impl AudioTrackConfig {
    /// Declare an audio track.
    pub fn new(sampling_frequency: f64, channels: u32, codec_id: impl Into<String>) -> Self {
        Self {
            sampling_frequency,
            channels,
            codec_id: codec_id.into(),
            codec_private: None,
            bit_depth: None,
            name: None,
            language: None,
        }
    }

    /// Set codec initialization data.
    pub fn with_codec_private(mut self, data: Vec<u8>) -> Self {
        self.codec_private = Some(data);
        self
    }

    /// Set the bit depth.
    pub fn with_bit_depth(mut self, bit_depth: u32) -> Self {
        self.bit_depth = Some(bit_depth);
        self
    }

    /// Set the track name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the track language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Opaque handle to a registered track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackHandle(u64);

impl TrackHandle {
    /// The TrackNumber this handle maps to.
    pub fn track_number(self) -> u64 {
        self.0
    }
}

/// Mux session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxerState {
    /// No tracks registered yet.
    Idle,
    /// Tracks registered, nothing emitted.
    TracksOpen,
    /// Headers emitted, frames accepted.
    FramesAccepted,
    /// Output complete.
    Finalized,
}

#[derive(Debug, Clone)]
enum TrackSettings {
    Video(VideoTrackConfig),
    Audio(AudioTrackConfig),
}

#[derive(Debug, Clone)]
struct RegisteredTrack {
    number: u64,
    settings: TrackSettings,
    last_timestamp_ns: Option<u64>,
}

/// A reserved size field awaiting its back-patch.
#[derive(Debug, Clone, Copy)]
struct SizePatch {
    /// Offset of the size field within the output buffer.
    offset: usize,
    /// Reserved width in bytes.
    width: usize,
    /// Offset where the element payload begins.
    payload_start: usize,
}

/// A WebM mux session over an owned output buffer.
pub struct MuxSession {
    buf: Vec<u8>,
    config: MuxerConfig,
    state: MuxerState,
    poisoned: bool,
    tracks: Vec<RegisteredTrack>,
    segment_patch: Option<SizePatch>,
    duration_offset: Option<usize>,
    cluster_patch: Option<SizePatch>,
    cluster_base: u64,
    clusters_written: u64,
    max_timestamp_ns: u64,
    any_frames: bool,
}

impl Default for MuxSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MuxSession {
    /// Create a mux session with default configuration.
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            config: MuxerConfig::default(),
            state: MuxerState::Idle,
            poisoned: false,
            tracks: Vec::new(),
            segment_patch: None,
            duration_offset: None,
            cluster_patch: None,
            cluster_base: 0,
            clusters_written: 0,
            max_timestamp_ns: 0,
            any_frames: false,
        }
    }

    /// Create a mux session with an explicit configuration.
    pub fn with_config(config: MuxerConfig) -> Result<Self> {
        if config.timecode_scale == 0 {
            return Err(WebmError::InvalidArgument(
                "timecode scale must be positive".to_string(),
            ));
        }
        if config.max_cluster_ticks == 0 || config.max_cluster_ticks > i16::MAX as u64 {
            return Err(WebmError::InvalidArgument(format!(
                "cluster cap of {} ticks is outside 1..=32767",
                config.max_cluster_ticks
            )));
        }
        let mut session = Self::new();
        session.config = config;
        Ok(session)
    }

    /// The current session state.
    pub fn state(&self) -> MuxerState {
        self.state
    }

    /// The bytes emitted so far (complete only after [`MuxSession::finalize`]).
    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    /// Register a video track. Valid only before any frame is written.
    pub fn add_video_track(&mut self, config: VideoTrackConfig) -> Result<TrackHandle> {
        self.ensure_usable()?;
        self.ensure_tracks_open()?;

        if config.pixel_width == 0 || config.pixel_height == 0 {
            return Err(WebmError::InvalidArgument(
                "video track dimensions must be positive".to_string(),
            ));
        }
        if !elements::is_webm_video_codec(&config.codec_id) {
            return Err(WebmError::UnsupportedCodec(config.codec_id));
        }

        self.register(TrackSettings::Video(config))
    }

    /// Register an audio track. Valid only before any frame is written.
    pub fn add_audio_track(&mut self, config: AudioTrackConfig) -> Result<TrackHandle> {
        self.ensure_usable()?;
        self.ensure_tracks_open()?;

        if !(config.sampling_frequency > 0.0) || config.channels == 0 {
            return Err(WebmError::InvalidArgument(
                "audio track needs a positive sampling frequency and channel count".to_string(),
            ));
        }
        if !elements::is_webm_audio_codec(&config.codec_id) {
            return Err(WebmError::UnsupportedCodec(config.codec_id));
        }

        self.register(TrackSettings::Audio(config))
    }

    /// Write one encoded video frame.
    ///
    /// Frames on a single track must arrive in non-decreasing timestamp
    /// order; interleaving across tracks is unconstrained and preserved.
    pub fn write_video_frame(
        &mut self,
        handle: TrackHandle,
        payload: &[u8],
        timestamp_ns: u64,
        is_keyframe: bool,
    ) -> Result<()> {
        self.write_frame(handle, payload, timestamp_ns, is_keyframe, true)
    }

    /// Write one encoded audio frame. Audio frames are always keyframes.
    pub fn write_audio_frame(
        &mut self,
        handle: TrackHandle,
        payload: &[u8],
        timestamp_ns: u64,
    ) -> Result<()> {
        self.write_frame(handle, payload, timestamp_ns, true, false)
    }

    /// Close the current cluster, patch all reserved sizes, and return the
    /// complete WebM byte stream. Subsequent calls return the same bytes.
    pub fn finalize(&mut self) -> Result<&[u8]> {
        self.ensure_usable()?;
        if self.state == MuxerState::Finalized {
            return Ok(&self.buf);
        }
        if self.state == MuxerState::Idle {
            return Err(WebmError::InvalidArgument(
                "no tracks registered".to_string(),
            ));
        }

        if let Err(e) = self.finish() {
            self.poisoned = true;
            return Err(e);
        }

        self.state = MuxerState::Finalized;
        debug!(
            bytes = self.buf.len(),
            clusters = self.clusters_written,
            "segment finalized"
        );
        Ok(&self.buf)
    }

    /// Finalize and transfer ownership of the output buffer.
    pub fn into_bytes(mut self) -> Result<Vec<u8>> {
        self.finalize()?;
        Ok(self.buf)
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.poisoned {
            return Err(WebmError::InvalidArgument(
                "session is poisoned by an earlier failure".to_string(),
            ));
        }
        Ok(())
    }

    fn ensure_tracks_open(&self) -> Result<()> {
        match self.state {
            MuxerState::Idle | MuxerState::TracksOpen => Ok(()),
            _ => Err(WebmError::InvalidArgument(
                "cannot add tracks after frames have been written".to_string(),
            )),
        }
    }

    fn register(&mut self, settings: TrackSettings) -> Result<TrackHandle> {
        let number = self.tracks.len() as u64 + 1;
        if number > MAX_TRACKS {
            return Err(WebmError::InvalidArgument(format!(
                "track limit of {MAX_TRACKS} reached"
            )));
        }

        self.tracks.push(RegisteredTrack {
            number,
            settings,
            last_timestamp_ns: None,
        });
        self.state = MuxerState::TracksOpen;
        Ok(TrackHandle(number))
    }

    fn track_index(&self, handle: TrackHandle) -> Result<usize> {
        let index = handle.0.wrapping_sub(1) as usize;
        if handle.0 == 0 || index >= self.tracks.len() {
            return Err(WebmError::InvalidArgument(format!(
                "unknown track handle {}",
                handle.0
            )));
        }
        Ok(index)
    }

    fn write_frame(
        &mut self,
        handle: TrackHandle,
        payload: &[u8],
        timestamp_ns: u64,
        is_keyframe: bool,
        expect_video: bool,
    ) -> Result<()> {
        self.ensure_usable()?;
        if self.state == MuxerState::Finalized {
            return Err(WebmError::InvalidArgument(
                "session is finalized".to_string(),
            ));
        }

        let index = self.track_index(handle)?;
        let track = &self.tracks[index];
        let is_video = matches!(track.settings, TrackSettings::Video(_));
        if is_video != expect_video {
            return Err(WebmError::InvalidArgument(format!(
                "track handle {} does not name a {} track",
                handle.0,
                if expect_video { "video" } else { "audio" }
            )));
        }

        if payload.is_empty() {
            return Err(WebmError::InvalidArgument(
                "frame payload is empty".to_string(),
            ));
        }
        if let Some(last) = track.last_timestamp_ns {
            if timestamp_ns < last {
                return Err(WebmError::OutOfOrderFrame {
                    track: track.number,
                    timestamp_ns,
                    last_ns: last,
                });
            }
        }

        // From here on bytes are emitted; a failure leaves the buffer in an
        // inconsistent state, so it poisons the session.
        if let Err(e) = self.emit_frame(index, payload, timestamp_ns, is_keyframe) {
            self.poisoned = true;
            return Err(e);
        }
        Ok(())
    }

    fn emit_frame(
        &mut self,
        index: usize,
        payload: &[u8],
        timestamp_ns: u64,
        is_keyframe: bool,
    ) -> Result<()> {
        if self.state != MuxerState::FramesAccepted {
            self.write_headers()?;
            self.state = MuxerState::FramesAccepted;
        }

        let ticks = self.ticks_for(timestamp_ns);
        let needs_new_cluster = match self.cluster_patch {
            None => true,
            Some(_) => {
                let delta = ticks as i128 - self.cluster_base as i128;
                delta > i16::MAX as i128
                    || delta < i16::MIN as i128
                    || delta >= self.config.max_cluster_ticks as i128
            }
        };
        if needs_new_cluster {
            self.close_cluster()?;
            self.start_cluster(ticks)?;
        }

        let delta = (ticks as i128 - self.cluster_base as i128) as i16;
        let track_number = self.tracks[index].number;

        let mut content = Vec::with_capacity(payload.len() + 4);
        ebml::write_vint(&mut content, track_number);
        content.extend_from_slice(&delta.to_be_bytes());
        // Keyframe bit only; this muxer never produces lacing.
        content.push(if is_keyframe { 0x80 } else { 0x00 });
        content.extend_from_slice(payload);
        ebml::write_element(&mut self.buf, SIMPLE_BLOCK, &content);

        self.tracks[index].last_timestamp_ns = Some(timestamp_ns);
        self.max_timestamp_ns = self.max_timestamp_ns.max(timestamp_ns);
        self.any_frames = true;
        Ok(())
    }

    /// Convert nanoseconds to timecode ticks, rounding to the nearest tick.
    fn ticks_for(&self, timestamp_ns: u64) -> u64 {
        let scale = self.config.timecode_scale;
        (timestamp_ns / scale) + u64::from(timestamp_ns % scale >= scale.div_ceil(2))
    }

    fn write_headers(&mut self) -> Result<()> {
        self.write_ebml_header();

        // Segment with an 8-byte reserved size field.
        ebml::write_element_id(&mut self.buf, SEGMENT);
        let offset = self.buf.len();
        let placeholder = ebml::encode_vint_exact(0, SEGMENT_SIZE_WIDTH)?;
        self.buf.extend_from_slice(&placeholder[..SEGMENT_SIZE_WIDTH]);
        self.segment_patch = Some(SizePatch {
            offset,
            width: SEGMENT_SIZE_WIDTH,
            payload_start: self.buf.len(),
        });

        self.write_segment_info();
        self.write_tracks();
        Ok(())
    }

    fn write_ebml_header(&mut self) {
        let header = EbmlHeader::webm();

        let mut content = Vec::new();
        write_uint_element(&mut content, EBML_VERSION, header.version);
        write_uint_element(&mut content, EBML_READ_VERSION, header.read_version);
        write_uint_element(&mut content, EBML_MAX_ID_LENGTH, header.max_id_length);
        write_uint_element(&mut content, EBML_MAX_SIZE_LENGTH, header.max_size_length);
        write_string_element(&mut content, DOC_TYPE, &header.doc_type);
        write_uint_element(&mut content, DOC_TYPE_VERSION, header.doc_type_version);
        write_uint_element(&mut content, DOC_TYPE_READ_VERSION, header.doc_type_read_version);

        ebml::write_element(&mut self.buf, EBML, &content);
    }

    fn write_segment_info(&mut self) {
        let mut content = Vec::new();
        write_uint_element(&mut content, TIMECODE_SCALE, self.config.timecode_scale);
        write_string_element(&mut content, MUXING_APP, &self.config.muxing_app);
        write_string_element(&mut content, WRITING_APP, &self.config.writing_app);

        // Reserved 8-byte float Duration, patched at finalize.
        let duration_field = content.len() + 3;
        ebml::write_element_id(&mut content, DURATION);
        content.push(0x88);
        ebml::write_float(&mut content, 0.0);

        ebml::write_element_id(&mut self.buf, INFO);
        ebml::write_vint(&mut self.buf, content.len() as u64);
        self.duration_offset = Some(self.buf.len() + duration_field);
        self.buf.extend_from_slice(&content);
    }

    fn write_tracks(&mut self) {
        let mut content = Vec::new();
        for track in &self.tracks {
            let mut entry = Vec::new();
            write_uint_element(&mut entry, TRACK_NUMBER, track.number);
            write_uint_element(&mut entry, TRACK_UID, track.number);

            match &track.settings {
                TrackSettings::Video(cfg) => {
                    write_uint_element(&mut entry, TRACK_TYPE, TRACK_TYPE_VIDEO as u64);
                    write_track_flags(&mut entry);
                    write_string_element(&mut entry, CODEC_ID, &cfg.codec_id);
                    if let Some(data) = &cfg.codec_private {
                        ebml::write_element(&mut entry, CODEC_PRIVATE, data);
                    }
                    if let Some(duration) = cfg.default_duration_ns {
                        write_uint_element(&mut entry, DEFAULT_DURATION, duration);
                    }
                    if let Some(name) = &cfg.name {
                        write_string_element(&mut entry, NAME, name);
                    }
                    if let Some(language) = &cfg.language {
                        write_string_element(&mut entry, LANGUAGE, language);
                    }

                    let mut video = Vec::new();
                    write_uint_element(&mut video, PIXEL_WIDTH, cfg.pixel_width as u64);
                    write_uint_element(&mut video, PIXEL_HEIGHT, cfg.pixel_height as u64);
                    ebml::write_element(&mut entry, VIDEO, &video);
                }
                TrackSettings::Audio(cfg) => {
                    write_uint_element(&mut entry, TRACK_TYPE, TRACK_TYPE_AUDIO as u64);
                    write_track_flags(&mut entry);
                    write_string_element(&mut entry, CODEC_ID, &cfg.codec_id);
                    if let Some(data) = &cfg.codec_private {
                        ebml::write_element(&mut entry, CODEC_PRIVATE, data);
                    }
                    if let Some(name) = &cfg.name {
                        write_string_element(&mut entry, NAME, name);
                    }
                    if let Some(language) = &cfg.language {
                        write_string_element(&mut entry, LANGUAGE, language);
                    }

                    let mut audio = Vec::new();
                    write_float_element(&mut audio, SAMPLING_FREQUENCY, cfg.sampling_frequency);
                    write_uint_element(&mut audio, CHANNELS, cfg.channels as u64);
                    if let Some(depth) = cfg.bit_depth {
                        write_uint_element(&mut audio, BIT_DEPTH, depth as u64);
                    }
                    ebml::write_element(&mut entry, AUDIO, &audio);
                }
            }

            ebml::write_element(&mut content, TRACK_ENTRY, &entry);
        }

        ebml::write_element(&mut self.buf, TRACKS, &content);
    }

    fn start_cluster(&mut self, base: u64) -> Result<()> {
        trace!(base, "opening cluster");
        ebml::write_element_id(&mut self.buf, CLUSTER);
        let offset = self.buf.len();
        let placeholder = ebml::encode_vint_exact(0, CLUSTER_SIZE_WIDTH)?;
        self.buf.extend_from_slice(&placeholder[..CLUSTER_SIZE_WIDTH]);
        let payload_start = self.buf.len();

        write_uint_element(&mut self.buf, TIMECODE, base);

        self.cluster_patch = Some(SizePatch {
            offset,
            width: CLUSTER_SIZE_WIDTH,
            payload_start,
        });
        self.cluster_base = base;
        self.clusters_written += 1;
        Ok(())
    }

    fn close_cluster(&mut self) -> Result<()> {
        if let Some(patch) = self.cluster_patch.take() {
            let actual = self.buf.len() - patch.payload_start;
            patch_size(&mut self.buf, patch, actual as u64)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.state == MuxerState::TracksOpen {
            // Zero-frame file: headers only.
            self.write_headers()?;
        }
        self.close_cluster()?;

        if let Some(offset) = self.duration_offset.take() {
            let ticks = if self.any_frames {
                self.max_timestamp_ns as f64 / self.config.timecode_scale as f64
            } else {
                0.0
            };
            self.buf[offset..offset + 8].copy_from_slice(&ticks.to_bits().to_be_bytes());
        }

        if let Some(patch) = self.segment_patch.take() {
            let actual = self.buf.len() - patch.payload_start;
            patch_size(&mut self.buf, patch, actual as u64)?;
        }
        Ok(())
    }
}

/// Rewrite a reserved size field with an exact-width VINT.
fn patch_size(buf: &mut [u8], patch: SizePatch, actual: u64) -> Result<()> {
    let bytes = ebml::encode_vint_exact(actual, patch.width)?;
    buf[patch.offset..patch.offset + patch.width].copy_from_slice(&bytes[..patch.width]);
    Ok(())
}

fn write_uint_element(buf: &mut Vec<u8>, id: u32, value: u64) {
    let mut content = Vec::new();
    ebml::write_uint(&mut content, value);
    ebml::write_element(buf, id, &content);
}

fn write_float_element(buf: &mut Vec<u8>, id: u32, value: f64) {
    let mut content = Vec::new();
    ebml::write_float(&mut content, value);
    ebml::write_element(buf, id, &content);
}

fn write_string_element(buf: &mut Vec<u8>, id: u32, value: &str) {
    ebml::write_element(buf, id, value.as_bytes());
}

/// FlagEnabled, FlagDefault, FlagLacing, fixed for every track this muxer
/// writes (lacing is never produced).
fn write_track_flags(buf: &mut Vec<u8>) {
    write_uint_element(buf, FLAG_ENABLED, 1);
    write_uint_element(buf, FLAG_DEFAULT, 1);
    write_uint_element(buf, FLAG_LACING, 0);
}
