//! End-to-end orchestration: script -> per-segment preparation -> timeline -> ambient -> MP4.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt as _;
use tracing::{debug, info, instrument, warn};

use crate::assets::media::{AudioPcm, MIX_SAMPLE_RATE, decode_audio_f32_stereo};
use crate::assets::resolve::AssetResolver;
use crate::audio::ambient::{AmbientTrack, SfxProvider, SfxRequest, obtain_ambient};
use crate::config::PipelineConfig;
use crate::encode::ffmpeg::FfmpegSink;
use crate::foundation::error::{FactoryError, FactoryResult};
use crate::foundation::temp::ScopedArtifact;
use crate::narration::elevenlabs::ElevenLabsClient;
use crate::narration::synth::NarrationSynthesizer;
use crate::render::{RenderOptions, render_timeline};
use crate::script::{Script, Segment, SegmentEntry};
use crate::subtitle::chunker::build_subtitle_track;
use crate::subtitle::raster::{SubtitleRenderer, locate_font};
use crate::timeline::{OmissionCause, SegmentOutcome, TimelineClip, assemble};
use crate::visual::plan::{build_plan, measure_images};

/// Script file name inside a project directory.
pub const PROJECT_SCRIPT_FILE: &str = "script.json";
/// Output file name inside a project directory.
pub const PROJECT_OUTPUT_FILE: &str = "final_video.mp4";
const WORK_DIR_NAME: &str = ".shorts-factory-work";

/// Where to read the script and write the video.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderJob {
    pub script_path: PathBuf,
    pub output_path: PathBuf,
    /// Set in project mode.
    pub project_dir: Option<PathBuf>,
}

impl RenderJob {
    pub fn from_project_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            script_path: dir.join(PROJECT_SCRIPT_FILE),
            output_path: dir.join(PROJECT_OUTPUT_FILE),
            project_dir: Some(dir),
        }
    }

    pub fn explicit(script: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            script_path: script.into(),
            output_path: output.into(),
            project_dir: None,
        }
    }

    /// Validate a command invocation: either a project directory alone, or a script plus an
    /// output path.
    pub fn from_invocation(
        project_dir: Option<PathBuf>,
        script: Option<PathBuf>,
        output: Option<PathBuf>,
    ) -> FactoryResult<Self> {
        let job = match (project_dir, script, output) {
            (Some(dir), None, None) => {
                if !dir.is_dir() {
                    return Err(FactoryError::usage(format!(
                        "project directory '{}' does not exist",
                        dir.display()
                    )));
                }
                Self::from_project_dir(dir)
            }
            (None, Some(script), Some(output)) => Self::explicit(script, output),
            (Some(_), _, _) => {
                return Err(FactoryError::usage(
                    "PROJECT_DIR cannot be combined with --script/--output",
                ));
            }
            (None, Some(_), None) => {
                return Err(FactoryError::usage("--script requires --output"));
            }
            (None, None, Some(_)) => {
                return Err(FactoryError::usage("--output requires --script"));
            }
            (None, None, None) => {
                return Err(FactoryError::usage(
                    "expected PROJECT_DIR or --script <file> --output <file>",
                ));
            }
        };
        if !job.script_path.is_file() {
            return Err(FactoryError::usage(format!(
                "script '{}' not found",
                job.script_path.display()
            )));
        }
        Ok(job)
    }

    fn script_dir(&self) -> PathBuf {
        self.script_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Project assets directory: `<project>/assets`, or `<script dir>/assets` without a project.
    pub fn assets_dir(&self) -> PathBuf {
        match &self.project_dir {
            Some(dir) => dir.join("assets"),
            None => self.script_dir().join("assets"),
        }
    }

    /// Directory for intermediate narration and mix files, next to the output.
    pub fn work_dir(&self) -> PathBuf {
        self.output_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(WORK_DIR_NAME)
    }

    fn resolver(&self) -> AssetResolver {
        let project_assets = self.project_dir.as_ref().map(|_| self.assets_dir());
        AssetResolver::for_job(&self.script_path, project_assets.as_deref())
    }
}

/// What a successful run produced.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub output_path: PathBuf,
    /// Script indices of the segments in the video, in order.
    pub rendered: Vec<usize>,
    pub omitted: Vec<(usize, OmissionCause)>,
    /// Per-segment layout, parallel to `rendered`.
    pub clips: Vec<ClipSummary>,
    pub duration_sec: f64,
    pub frames: u64,
}

/// How one rendered segment was laid out.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipSummary {
    pub index: usize,
    pub duration_sec: f64,
    /// Resolved image of each slice, in display order.
    pub images: Vec<PathBuf>,
    pub slice_secs: Vec<f64>,
}

/// Immutable per-run context shared by segment preparation.
struct SegmentContext<'a> {
    config: &'a PipelineConfig,
    synthesizer: &'a NarrationSynthesizer,
    resolver: &'a AssetResolver,
    assets_dir: &'a Path,
    work_dir: &'a Path,
    subtitles: bool,
}

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    synthesizer: Arc<NarrationSynthesizer>,
    sfx: Option<Arc<dyn SfxProvider>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("synthesizer", &self.synthesizer)
            .field("sfx", &self.sfx.is_some())
            .finish()
    }
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        synthesizer: NarrationSynthesizer,
        sfx: Option<Arc<dyn SfxProvider>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            synthesizer: Arc::new(synthesizer),
            sfx,
        }
    }

    /// Wire providers from configuration. One ElevenLabs client serves both narration and
    /// ambient generation; without a credential neither is constructed.
    pub fn from_config(config: PipelineConfig) -> FactoryResult<Self> {
        config.validate()?;
        let elevenlabs = match &config.credentials.elevenlabs_api_key {
            Some(key) => Some(Arc::new(ElevenLabsClient::new(
                key.clone(),
                config.narration.elevenlabs_base_url.clone(),
            )?)),
            None => None,
        };
        let synthesizer = NarrationSynthesizer::from_config(&config, elevenlabs.clone());
        let sfx = elevenlabs.map(|c| c as Arc<dyn SfxProvider>);
        Ok(Self::new(config, synthesizer, sfx))
    }

    #[instrument(skip_all, fields(script = %job.script_path.display()))]
    pub async fn run(&self, job: &RenderJob) -> FactoryResult<RunSummary> {
        let cfg = self.config.as_ref();
        let fps = cfg.fps()?;
        let script = Script::load(&job.script_path)?;
        info!(
            segments = script.entries.len(),
            output = %job.output_path.display(),
            "script loaded"
        );

        let resolver = job.resolver();
        let assets_dir = job.assets_dir();
        let work_dir = job.work_dir();
        tokio::fs::create_dir_all(&work_dir).await.map_err(|e| {
            FactoryError::validation(format!(
                "create work directory '{}': {e}",
                work_dir.display()
            ))
        })?;

        let subtitles = cfg.subtitles.enabled && {
            let found = locate_font(&cfg.subtitles.font_candidates).is_some();
            if !found {
                warn!("no subtitle font available; subtitles disabled");
            }
            found
        };

        let ctx = SegmentContext {
            config: cfg,
            synthesizer: self.synthesizer.as_ref(),
            resolver: &resolver,
            assets_dir: &assets_dir,
            work_dir: &work_dir,
            subtitles,
        };
        let prepared: Vec<(SegmentOutcome, Option<ScopedArtifact>)> =
            futures::stream::iter(script.entries.iter().cloned())
                .map(|entry| ctx.prepare(entry))
                .buffered(cfg.max_concurrent_segments)
                .collect()
                .await;
        let (outcomes, narration_files): (Vec<_>, Vec<_>) = prepared.into_iter().unzip();

        let result = self
            .finish(job, &script, &resolver, &assets_dir, &work_dir, outcomes, subtitles)
            .await;
        drop(narration_files);
        if !cfg.keep_intermediates {
            // Only removes the directory when nothing else was left in it.
            let _ = std::fs::remove_dir(&work_dir);
        }
        let summary = result?;
        if summary.omitted.is_empty() {
            info!(
                rendered = summary.rendered.len(),
                omitted = 0,
                duration_sec = summary.duration_sec,
                frames = summary.frames,
                fps = fps.as_f64(),
                "video written to {}",
                summary.output_path.display()
            );
        } else {
            let omitted: Vec<usize> = summary.omitted.iter().map(|(i, _)| *i).collect();
            warn!(
                rendered = summary.rendered.len(),
                omitted = summary.omitted.len(),
                omitted_segments = ?omitted,
                duration_sec = summary.duration_sec,
                "video written to {} with omitted segments",
                summary.output_path.display()
            );
        }
        Ok(summary)
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        job: &RenderJob,
        script: &Script,
        resolver: &AssetResolver,
        assets_dir: &Path,
        work_dir: &Path,
        outcomes: Vec<SegmentOutcome>,
        subtitles: bool,
    ) -> FactoryResult<RunSummary> {
        let cfg = self.config.as_ref();
        let timeline = assemble(outcomes)?;

        let ambient = if cfg.ambient.enabled {
            let cache_path = assets_dir.join(&cfg.ambient.cache_file_name);
            let request = SfxRequest::from_config(&cfg.ambient);
            let source = obtain_ambient(
                script.bgm_path.as_deref(),
                resolver,
                &cache_path,
                self.sfx.as_deref(),
                &request,
                cfg.provider_timeout(),
            )
            .await;
            match source {
                Some(source) => {
                    let path = source.path().to_path_buf();
                    match decode_blocking(path).await {
                        Ok(pcm) => {
                            info!(path = %source.path().display(), duration_sec = pcm.duration_sec(), "ambient track ready");
                            Some(AmbientTrack { source, pcm })
                        }
                        Err(e) => {
                            warn!(error = %e, "ambient track could not be decoded; continuing without background");
                            None
                        }
                    }
                }
                None => None,
            }
        } else {
            debug!("ambient track disabled");
            None
        };

        let opts = RenderOptions {
            canvas: cfg.frame,
            fps: cfg.fps()?,
            sample_rate: MIX_SAMPLE_RATE,
            ambient_gain: cfg.ambient.gain,
            audio_path: work_dir.join("mix.f32le"),
            keep_intermediates: cfg.keep_intermediates,
        };
        let subtitle_cfg = cfg.subtitles.clone();
        let output_path = job.output_path.clone();
        let rendered: Vec<usize> = timeline.clips.iter().map(|c| c.index).collect();
        let clips: Vec<ClipSummary> = timeline
            .clips
            .iter()
            .map(|c| ClipSummary {
                index: c.index,
                duration_sec: c.duration_sec,
                images: c.slices.iter().map(|s| s.image.path.clone()).collect(),
                slice_secs: c.slices.iter().map(|s| s.duration_sec).collect(),
            })
            .collect();
        let omitted = timeline.omitted.clone();
        let duration_sec = timeline.total_duration_sec();

        let stats = tokio::task::spawn_blocking(move || {
            let mut renderer = if subtitles {
                match SubtitleRenderer::from_config(&subtitle_cfg, opts.canvas) {
                    Ok(r) => Some(r),
                    Err(e) => {
                        warn!(error = %e, "subtitle font unusable; subtitles disabled");
                        None
                    }
                }
            } else {
                None
            };
            let mut sink = FfmpegSink::new(output_path);
            render_timeline(
                &timeline,
                ambient.as_ref(),
                renderer.as_mut(),
                &opts,
                &mut sink,
            )
        })
        .await
        .map_err(|e| FactoryError::encoding(format!("render task failed: {e}")))??;

        Ok(RunSummary {
            output_path: job.output_path.clone(),
            rendered,
            omitted,
            clips,
            duration_sec,
            frames: stats.frames,
        })
    }
}

impl SegmentContext<'_> {
    async fn prepare(&self, entry: SegmentEntry) -> (SegmentOutcome, Option<ScopedArtifact>) {
        let segment = match entry {
            SegmentEntry::Valid(s) => s,
            SegmentEntry::Invalid { index, reason } => {
                return (
                    SegmentOutcome::Omitted {
                        index,
                        cause: OmissionCause::InvalidSegment(reason),
                    },
                    None,
                );
            }
        };
        let index = segment.index;
        let mut narration_file = None;
        let outcome = match self.build_clip(segment, &mut narration_file).await {
            Ok(clip) => SegmentOutcome::Ready(clip),
            Err(cause) => SegmentOutcome::Omitted { index, cause },
        };
        (outcome, narration_file)
    }

    async fn build_clip(
        &self,
        segment: Segment,
        narration_file: &mut Option<ScopedArtifact>,
    ) -> Result<TimelineClip, OmissionCause> {
        let index = segment.index;
        let context = format!("segment {index}");

        // Images resolve before any provider call.
        let resolved: Vec<PathBuf> = segment
            .images
            .iter()
            .filter_map(|hint| self.resolver.resolve_logged(hint, &context))
            .collect();
        if resolved.is_empty() {
            return Err(OmissionCause::NoImages);
        }
        let images = tokio::task::spawn_blocking(move || measure_images(resolved))
            .await
            .map_err(|e| OmissionCause::Media(format!("image probe task failed: {e}")))?;
        if images.is_empty() {
            return Err(OmissionCause::NoImages);
        }

        let audio_path = match self.pregenerated_narration(&segment) {
            Some(p) => {
                debug!(segment = index, path = %p.display(), "using pre-generated narration");
                p
            }
            None => {
                let path = self.work_dir.join(format!("voice_{index}.mp3"));
                let guard = narration_file.insert(
                    ScopedArtifact::new(&path).with_keep(self.config.keep_intermediates),
                );
                self.synthesizer
                    .synthesize(&segment.text, guard.path())
                    .await?
            }
        };

        let pcm = decode_blocking(audio_path).await?;
        let duration_sec = pcm.duration_sec() + self.config.segment_pause_sec;
        let slices = build_plan(&images, duration_sec, self.config.frame);
        let subtitles = if self.subtitles {
            build_subtitle_track(&segment.text, self.config.subtitles.max_chars, duration_sec)
        } else {
            Vec::new()
        };
        info!(
            segment = index,
            duration_sec,
            images = slices.len(),
            subtitle_chunks = subtitles.len(),
            "segment prepared"
        );
        Ok(TimelineClip {
            index,
            id: segment.id,
            narration: pcm,
            duration_sec,
            slices,
            subtitles,
        })
    }

    /// `<assets>/<id>.mp3`, when the segment has an id and the file is there.
    fn pregenerated_narration(&self, segment: &Segment) -> Option<PathBuf> {
        let id = segment.id.as_deref()?;
        let p = self.assets_dir.join(format!("{id}.mp3"));
        std::fs::metadata(&p)
            .is_ok_and(|m| m.is_file() && m.len() > 0)
            .then_some(p)
    }
}

async fn decode_blocking(path: PathBuf) -> FactoryResult<AudioPcm> {
    tokio::task::spawn_blocking(move || decode_audio_f32_stereo(&path, MIX_SAMPLE_RATE))
        .await
        .map_err(|e| FactoryError::media(format!("audio decode task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_mode_paths() {
        let job = RenderJob::from_project_dir("/p");
        assert_eq!(job.script_path, PathBuf::from("/p/script.json"));
        assert_eq!(job.output_path, PathBuf::from("/p/final_video.mp4"));
        assert_eq!(job.assets_dir(), PathBuf::from("/p/assets"));
        assert_eq!(job.work_dir(), PathBuf::from("/p/.shorts-factory-work"));
    }

    #[test]
    fn explicit_mode_paths() {
        let job = RenderJob::explicit("/s/script.json", "out.mp4");
        assert_eq!(job.assets_dir(), PathBuf::from("/s/assets"));
        assert_eq!(job.work_dir(), PathBuf::from("./.shorts-factory-work"));
    }

    #[test]
    fn invocation_modes_are_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let p = || Some(dir.path().to_path_buf());
        let s = || Some(PathBuf::from("script.json"));
        let o = || Some(PathBuf::from("out.mp4"));
        for (a, b, c) in [
            (None, None, None),
            (p(), s(), o()),
            (p(), None, o()),
            (None, s(), None),
            (None, None, o()),
        ] {
            let err = RenderJob::from_invocation(a, b, c).unwrap_err();
            assert!(err.is_usage(), "{err}");
        }
    }

    #[test]
    fn project_needs_script_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = RenderJob::from_invocation(Some(dir.path().to_path_buf()), None, None)
            .unwrap_err();
        assert!(err.is_usage());
        std::fs::write(dir.path().join("script.json"), "{}").unwrap();
        let job = RenderJob::from_invocation(Some(dir.path().to_path_buf()), None, None).unwrap();
        assert_eq!(job.project_dir.as_deref(), Some(dir.path()));
    }

    #[test]
    fn missing_project_dir_is_usage_error() {
        let err =
            RenderJob::from_invocation(Some(PathBuf::from("/no/such/project")), None, None)
                .unwrap_err();
        assert!(err.is_usage());
    }
}
