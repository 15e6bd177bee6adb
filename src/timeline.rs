use std::ops::Range;

use tracing::{info, warn};

use crate::assets::media::AudioPcm;
use crate::foundation::core::{Fps, cumulative_spans};
use crate::foundation::error::{FactoryError, FactoryResult};
use crate::subtitle::chunker::SubtitleChunk;
use crate::visual::plan::VisualSlice;

/// One segment's finished audio/visual unit.
#[derive(Clone, Debug)]
pub struct TimelineClip {
    /// Script position.
    pub index: usize,
    pub id: Option<String>,
    /// Decoded narration, not yet padded with the pause.
    pub narration: AudioPcm,
    /// Narration plus the inter-segment pause.
    pub duration_sec: f64,
    pub slices: Vec<VisualSlice>,
    /// Empty when subtitles are disabled.
    pub subtitles: Vec<SubtitleChunk>,
}

impl TimelineClip {
    pub fn audio_duration_sec(&self) -> f64 {
        self.narration.duration_sec()
    }

    /// Index of the slice on screen at clip-local time `t`.
    pub fn slice_at(&self, t: f64) -> usize {
        self.slices
            .iter()
            .rposition(|s| s.start_sec <= t)
            .unwrap_or(0)
    }

    /// Index of the subtitle chunk on screen at clip-local time `t`.
    pub fn subtitle_at(&self, t: f64) -> Option<usize> {
        if self.subtitles.is_empty() {
            return None;
        }
        let mut end = 0.0;
        for (i, c) in self.subtitles.iter().enumerate() {
            end += c.duration_sec;
            if t < end {
                return Some(i);
            }
        }
        Some(self.subtitles.len() - 1)
    }
}

/// Why a segment is missing from the timeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OmissionCause {
    InvalidSegment(String),
    NoImages,
    Synthesis(String),
    Media(String),
}

impl std::fmt::Display for OmissionCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSegment(r) => write!(f, "invalid segment: {r}"),
            Self::NoImages => write!(f, "no resolvable images"),
            Self::Synthesis(r) => write!(f, "narration failed: {r}"),
            Self::Media(r) => write!(f, "media error: {r}"),
        }
    }
}

impl From<FactoryError> for OmissionCause {
    fn from(err: FactoryError) -> Self {
        match err {
            FactoryError::Synthesis(m) => Self::Synthesis(m),
            FactoryError::AssetNotFound(_) => Self::NoImages,
            FactoryError::Validation(m) => Self::InvalidSegment(m),
            other => Self::Media(other.to_string()),
        }
    }
}

/// Result of preparing one segment.
#[derive(Clone, Debug)]
pub enum SegmentOutcome {
    Ready(TimelineClip),
    Omitted { index: usize, cause: OmissionCause },
}

impl SegmentOutcome {
    pub fn index(&self) -> usize {
        match self {
            Self::Ready(c) => c.index,
            Self::Omitted { index, .. } => *index,
        }
    }
}

/// Ordered clips ready to render.
#[derive(Clone, Debug)]
pub struct Timeline {
    pub clips: Vec<TimelineClip>,
    pub omitted: Vec<(usize, OmissionCause)>,
}

impl Timeline {
    pub fn total_duration_sec(&self) -> f64 {
        self.clips.iter().map(|c| c.duration_sec).sum()
    }

    fn durations(&self) -> Vec<f64> {
        self.clips.iter().map(|c| c.duration_sec).collect()
    }

    /// Frame range of every clip; boundaries come from cumulative seconds.
    pub fn clip_frame_spans(&self, fps: Fps) -> Vec<Range<u64>> {
        cumulative_spans(&self.durations(), fps.as_f64())
    }

    /// Sample-frame range of every clip at `sample_rate`.
    pub fn clip_sample_spans(&self, sample_rate: u32) -> Vec<Range<u64>> {
        cumulative_spans(&self.durations(), f64::from(sample_rate))
    }

    pub fn total_frames(&self, fps: Fps) -> u64 {
        self.clip_frame_spans(fps).last().map_or(0, |r| r.end)
    }

    pub fn total_samples(&self, sample_rate: u32) -> u64 {
        self.clip_sample_spans(sample_rate).last().map_or(0, |r| r.end)
    }
}

/// Join per-segment outcomes in script order, dropping omissions.
///
/// Fails with [`FactoryError::NoAssemblableContent`] when nothing survives.
pub fn assemble(mut outcomes: Vec<SegmentOutcome>) -> FactoryResult<Timeline> {
    outcomes.sort_by_key(SegmentOutcome::index);
    let mut clips = Vec::new();
    let mut omitted = Vec::new();
    for outcome in outcomes {
        match outcome {
            SegmentOutcome::Ready(clip) => clips.push(clip),
            SegmentOutcome::Omitted { index, cause } => {
                warn!(segment = index, %cause, "segment omitted");
                omitted.push((index, cause));
            }
        }
    }
    if clips.is_empty() {
        return Err(FactoryError::no_content(format!(
            "all {} segment(s) were omitted",
            omitted.len()
        )));
    }
    let timeline = Timeline { clips, omitted };
    info!(
        clips = timeline.clips.len(),
        omitted = timeline.omitted.len(),
        duration_sec = timeline.total_duration_sec(),
        "timeline assembled"
    );
    Ok(timeline)
}
