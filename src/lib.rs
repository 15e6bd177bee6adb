//! Shorts Factory assembles narrated vertical short videos from a declarative script.
//!
//! A run reads a `script.json` of segments (narration text plus image hints), then:
//!
//! - Synthesizes narration per segment through a primary/fallback TTS chain
//! - Plans a center-cropped image slideshow over each segment's duration
//! - Burns in subtitle chunks timed by weighted character counts
//! - Mixes an optional ambient bed under the narration
//! - Streams the composed frames and audio into `ffmpeg` as an H.264/AAC MP4
//!
//! The entry point is [`Pipeline::run`] with a [`RenderJob`].
#![forbid(unsafe_code)]

mod assets;
mod foundation;

pub(crate) mod audio;
pub(crate) mod config;
pub(crate) mod narration;
pub(crate) mod script;
pub(crate) mod subtitle;
pub(crate) mod timeline;
pub(crate) mod visual;
/// Frame sinks: in-memory and `ffmpeg`.
pub mod encode;
/// Timeline to frames.
pub mod render;
/// End-to-end orchestration.
pub mod pipeline;

pub use crate::foundation::core::{Canvas, Fps, FrameIndex, cumulative_spans};
pub use crate::foundation::error::{FactoryError, FactoryResult, ProviderError};
pub use crate::foundation::temp::ScopedArtifact;

pub use crate::assets::decode::{image_dimensions, load_premul_rgba};
pub use crate::assets::media::{
    AudioPcm, MIX_SAMPLE_RATE, decode_audio_f32_stereo, is_ffmpeg_on_path,
};
pub use crate::assets::resolve::{AssetResolver, Resolution};
pub use crate::audio::ambient::{
    AmbientSource, AmbientTrack, SfxProvider, SfxRequest, obtain_ambient, reconcile,
};
pub use crate::config::{
    AmbientConfig, Credentials, ELEVENLABS_API_KEY_ENV, NarrationConfig, PipelineConfig,
    ProviderRole, SubtitleConfig, VoiceConfig, parse_hex_color,
};
pub use crate::encode::ffmpeg::FfmpegSink;
pub use crate::encode::sink::{AudioInputConfig, FrameRGBA, FrameSink, InMemorySink, SinkConfig};
pub use crate::narration::NarrationProvider;
pub use crate::narration::edge::EdgeTtsProvider;
pub use crate::narration::elevenlabs::{ElevenLabsClient, ElevenLabsNarrator};
pub use crate::narration::synth::NarrationSynthesizer;
pub use crate::pipeline::{
    ClipSummary, PROJECT_OUTPUT_FILE, PROJECT_SCRIPT_FILE, Pipeline, RenderJob, RunSummary,
};
pub use crate::render::{RenderOptions, RenderStats, render_timeline};
pub use crate::script::{Script, Segment, SegmentEntry};
pub use crate::subtitle::chunker::{
    SubtitleChunk, allocate_durations, build_subtitle_track, char_weight, chunk_text,
    chunk_weight,
};
pub use crate::subtitle::raster::{SubtitleRenderer, locate_font};
pub use crate::timeline::{OmissionCause, SegmentOutcome, Timeline, TimelineClip, assemble};
pub use crate::visual::frame::{black_frame, over_in_place, render_slice_frame};
pub use crate::visual::plan::{
    CropRect, PlannedImage, VisualSlice, build_plan, center_crop, measure_images,
};
