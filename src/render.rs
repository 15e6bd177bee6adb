//! Frame-by-frame rendering of an assembled timeline into a [`FrameSink`].

use std::path::PathBuf;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::audio::ambient::AmbientTrack;
use crate::audio::mix::{build_narration_track, clamp_in_place, mix_additive, write_mix_to_f32le_file};
use crate::encode::sink::{AudioInputConfig, FrameRGBA, FrameSink, SinkConfig};
use crate::foundation::core::{Canvas, Fps, FrameIndex};
use crate::foundation::error::FactoryResult;
use crate::foundation::temp::ScopedArtifact;
use crate::subtitle::raster::SubtitleRenderer;
use crate::timeline::{Timeline, TimelineClip};
use crate::visual::frame::{black_frame, over_in_place, render_slice_frame};

/// Fixed output parameters for one render.
#[derive(Clone, Debug)]
pub struct RenderOptions {
    pub canvas: Canvas,
    pub fps: Fps,
    pub sample_rate: u32,
    pub ambient_gain: f32,
    /// Where the mixed `f32le` stream is written for the encoder.
    pub audio_path: PathBuf,
    pub keep_intermediates: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderStats {
    pub frames: u64,
    pub audio_frames: u64,
}

/// Mix the soundtrack, then compose and push every frame of `timeline`.
///
/// The sink is aborted on any failure after it has been started.
pub fn render_timeline(
    timeline: &Timeline,
    ambient: Option<&AmbientTrack>,
    subtitles: Option<&mut SubtitleRenderer>,
    opts: &RenderOptions,
    sink: &mut dyn FrameSink,
) -> FactoryResult<RenderStats> {
    let audio_frames = timeline.total_samples(opts.sample_rate);
    let mut mix = build_narration_track(timeline, opts.sample_rate);
    if let Some(track) = ambient {
        let bed = track.reconcile(audio_frames, opts.ambient_gain);
        debug!(source = %track.source.path().display(), "mixing ambient track");
        mix_additive(&mut mix, &bed);
    }
    clamp_in_place(&mut mix);

    let audio_file = ScopedArtifact::new(&opts.audio_path).with_keep(opts.keep_intermediates);
    write_mix_to_f32le_file(&mix, audio_file.path())?;
    drop(mix);

    sink.begin(SinkConfig {
        width: opts.canvas.width,
        height: opts.canvas.height,
        fps: opts.fps,
        audio: Some(AudioInputConfig {
            path: audio_file.path().to_path_buf(),
            sample_rate: opts.sample_rate,
            channels: 2,
        }),
    })?;

    match push_frames(timeline, subtitles, opts, sink) {
        Ok(frames) => {
            sink.end()?;
            info!(frames, audio_frames, "render finished");
            Ok(RenderStats {
                frames,
                audio_frames,
            })
        }
        Err(e) => {
            sink.abort();
            Err(e)
        }
    }
}

fn push_frames(
    timeline: &Timeline,
    mut subtitles: Option<&mut SubtitleRenderer>,
    opts: &RenderOptions,
    sink: &mut dyn FrameSink,
) -> FactoryResult<u64> {
    let spans = timeline.clip_frame_spans(opts.fps);
    let mut pushed = 0u64;
    for (clip, span) in timeline.clips.iter().zip(spans) {
        let slice_frames = prepare_slices(clip, opts.canvas);
        let mut overlays: Vec<Option<Option<Vec<u8>>>> = vec![None; clip.subtitles.len()];
        let mut frame = FrameRGBA {
            width: opts.canvas.width,
            height: opts.canvas.height,
            data: Vec::new(),
        };
        let mut shown: Option<(usize, Option<usize>)> = None;

        for f in span.clone() {
            let t = opts.fps.frames_to_secs(f - span.start);
            let key = (clip.slice_at(t), clip.subtitle_at(t));
            if shown != Some(key) {
                frame.data.clone_from(&slice_frames[key.0]);
                if let (Some(chunk), Some(renderer)) = (key.1, subtitles.as_deref_mut()) {
                    let overlay = overlays[chunk]
                        .get_or_insert_with(|| rasterize(renderer, clip, chunk));
                    if let Some(px) = overlay {
                        over_in_place(&mut frame.data, px)?;
                    }
                }
                shown = Some(key);
            }
            sink.push_frame(FrameIndex(f), &frame)?;
            pushed += 1;
        }
        debug!(segment = clip.index, frames = span.end - span.start, "clip rendered");
    }
    Ok(pushed)
}

fn prepare_slices(clip: &TimelineClip, canvas: Canvas) -> Vec<Vec<u8>> {
    let mut frames: Vec<Vec<u8>> = clip
        .slices
        .par_iter()
        .map(|slice| {
            render_slice_frame(slice).unwrap_or_else(|e| {
                warn!(
                    segment = clip.index,
                    path = %slice.image.path.display(),
                    error = %e,
                    "slice image failed to render; showing black"
                );
                black_frame(canvas)
            })
        })
        .collect();
    if frames.is_empty() {
        frames.push(black_frame(canvas));
    }
    frames
}

fn rasterize(renderer: &mut SubtitleRenderer, clip: &TimelineClip, chunk: usize) -> Option<Vec<u8>> {
    let text = &clip.subtitles[chunk].text;
    match renderer.render(text) {
        Ok(px) => Some(px),
        Err(e) => {
            warn!(segment = clip.index, chunk, error = %e, "subtitle failed to render; skipping");
            None
        }
    }
}
