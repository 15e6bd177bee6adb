//! Background bed: pick or generate a track, then fit it to the timeline.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::assets::media::AudioPcm;
use crate::assets::resolve::AssetResolver;
use crate::config::AmbientConfig;
use crate::foundation::error::{FactoryError, FactoryResult, ProviderError};

/// Sound-effect generation request, serialized as the provider's JSON body.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SfxRequest {
    pub text: String,
    pub duration_seconds: f64,
    pub prompt_influence: f64,
}

impl SfxRequest {
    pub fn from_config(cfg: &AmbientConfig) -> Self {
        Self {
            text: cfg.prompt.clone(),
            duration_seconds: cfg.duration_sec,
            prompt_influence: cfg.prompt_influence,
        }
    }
}

/// Generates an ambient clip from a text prompt.
#[async_trait::async_trait]
pub trait SfxProvider: Send + Sync {
    async fn generate(&self, req: &SfxRequest) -> Result<Vec<u8>, ProviderError>;
}

/// Where the background track came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AmbientSource {
    /// The script's `bgm_path`.
    Declared(PathBuf),
    /// A previously generated per-project track.
    Cached(PathBuf),
    /// Generated during this run and written to the cache.
    Generated(PathBuf),
}

impl AmbientSource {
    pub fn path(&self) -> &Path {
        match self {
            Self::Declared(p) | Self::Cached(p) | Self::Generated(p) => p,
        }
    }
}

fn non_empty_file(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}

/// Pick the background track for a run.
///
/// A declared `bgm_path` always wins; if it cannot be resolved the run has no background. Without
/// a declaration the per-project cache is reused, and only when it is absent is the generator
/// called (once, bounded by `timeout`), its output persisted through a temporary sibling and a
/// rename.
pub async fn obtain_ambient(
    declared: Option<&str>,
    resolver: &AssetResolver,
    cache_path: &Path,
    generator: Option<&dyn SfxProvider>,
    request: &SfxRequest,
    timeout: Duration,
) -> Option<AmbientSource> {
    if let Some(hint) = declared {
        return match resolver.resolve_logged(hint, "bgm_path") {
            Some(p) => Some(AmbientSource::Declared(p)),
            None => {
                warn!(%hint, "declared background track not found; continuing without background");
                None
            }
        };
    }

    if non_empty_file(cache_path) {
        debug!(path = %cache_path.display(), "reusing cached ambient track");
        return Some(AmbientSource::Cached(cache_path.to_path_buf()));
    }

    let Some(generator) = generator else {
        info!("no ambient generator available; continuing without background");
        return None;
    };
    match generate_into_cache(generator, request, cache_path, timeout).await {
        Ok(p) => Some(AmbientSource::Generated(p)),
        Err(e) => {
            warn!(error = %e, "ambient generation failed; continuing without background");
            None
        }
    }
}

async fn generate_into_cache(
    generator: &dyn SfxProvider,
    request: &SfxRequest,
    cache_path: &Path,
    timeout: Duration,
) -> FactoryResult<PathBuf> {
    let bytes = tokio::time::timeout(timeout, generator.generate(request))
        .await
        .map_err(|_| ProviderError::Timeout(timeout))??;
    if bytes.is_empty() {
        return Err(ProviderError::EmptyOutput("ambient generator returned no bytes".to_owned()).into());
    }
    if let Some(parent) = cache_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file_name = cache_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| FactoryError::validation("ambient cache path has no file name"))?;
    let tmp = cache_path.with_file_name(format!(".{file_name}.partial"));
    tokio::fs::write(&tmp, &bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, cache_path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    info!(path = %cache_path.display(), bytes = bytes.len(), "ambient track generated and cached");
    Ok(cache_path.to_path_buf())
}

/// Decoded background track.
#[derive(Clone, Debug)]
pub struct AmbientTrack {
    pub source: AmbientSource,
    pub pcm: AudioPcm,
}

impl AmbientTrack {
    /// Scale by `gain`, then loop or trim to exactly `total_frames` sample frames.
    pub fn reconcile(&self, total_frames: u64, gain: f32) -> Vec<f32> {
        reconcile(&self.pcm, total_frames, gain)
    }
}

/// Loop (`out[i] = src[i mod len]`) or trim `pcm` to `total_frames`, after applying `gain`.
pub fn reconcile(pcm: &AudioPcm, total_frames: u64, gain: f32) -> Vec<f32> {
    let ch = usize::from(pcm.channels.max(1));
    let total = total_frames as usize * ch;
    let src_frames = pcm.frames() as usize;
    if src_frames == 0 {
        return vec![0.0; total];
    }
    let scaled: Vec<f32> = pcm.interleaved_f32[..src_frames * ch]
        .iter()
        .map(|s| s * gain)
        .collect();
    let period = src_frames * ch;
    if total <= period {
        return scaled[..total].to_vec();
    }
    let mut out = Vec::with_capacity(total);
    while out.len() < total {
        let take = (total - out.len()).min(period);
        out.extend_from_slice(&scaled[..take]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize) -> AudioPcm {
        AudioPcm {
            sample_rate: 100,
            channels: 2,
            interleaved_f32: (0..frames * 2).map(|i| (i / 2) as f32 / frames as f32).collect(),
        }
    }

    #[test]
    fn loops_sample_exact_to_fill() {
        // 3 s source, 10 s timeline at 100 Hz.
        let src = ramp(300);
        let out = reconcile(&src, 1000, 0.2);
        assert_eq!(out.len(), 1000 * 2);
        for i in 0..1000 {
            let expected = src.interleaved_f32[(i % 300) * 2] * 0.2;
            assert_eq!(out[i * 2], expected);
            assert_eq!(out[i * 2 + 1], expected);
        }
        // Continuity at loop points: restart at the first source sample.
        assert_eq!(out[300 * 2], src.interleaved_f32[0] * 0.2);
        assert_eq!(out[600 * 2], src.interleaved_f32[0] * 0.2);
    }

    #[test]
    fn trims_when_longer() {
        let src = ramp(500);
        let out = reconcile(&src, 120, 1.0);
        assert_eq!(out.len(), 240);
        assert_eq!(out[..], src.interleaved_f32[..240]);
    }

    #[test]
    fn equal_length_is_untouched_apart_from_gain() {
        let src = ramp(50);
        let out = reconcile(&src, 50, 0.5);
        assert_eq!(out.len(), src.interleaved_f32.len());
        assert_eq!(out[99], src.interleaved_f32[99] * 0.5);
    }

    #[test]
    fn empty_source_yields_silence() {
        let out = reconcile(&AudioPcm::silent(100, 2), 10, 0.2);
        assert_eq!(out, vec![0.0; 20]);
    }

    #[test]
    fn request_body_matches_provider_fields() {
        let body = serde_json::to_value(SfxRequest::from_config(&AmbientConfig::default())).unwrap();
        assert_eq!(body["text"], "calm ambient background soundscape");
        assert_eq!(body["duration_seconds"], 22.0);
        assert_eq!(body["prompt_influence"], 0.3);
    }

    #[tokio::test]
    async fn missing_declared_track_means_no_background() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("ambient.mp3");
        std::fs::write(&cache, b"cached").unwrap();
        let resolver = AssetResolver::new(vec![dir.path().to_path_buf()]);
        let got = obtain_ambient(
            Some("missing-bgm.mp3"),
            &resolver,
            &cache,
            None,
            &SfxRequest::from_config(&AmbientConfig::default()),
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn declared_track_wins_over_cache() {
        let dir = tempfile::tempdir().unwrap();
        let bgm = dir.path().join("bgm.mp3");
        std::fs::write(&bgm, b"bgm").unwrap();
        let cache = dir.path().join("ambient.mp3");
        std::fs::write(&cache, b"cached").unwrap();
        let resolver = AssetResolver::new(vec![dir.path().to_path_buf()]);
        let got = obtain_ambient(
            Some("bgm.mp3"),
            &resolver,
            &cache,
            None,
            &SfxRequest::from_config(&AmbientConfig::default()),
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(got, Some(AmbientSource::Declared(bgm)));
    }

    #[tokio::test]
    async fn no_generator_and_no_cache_means_no_background() {
        let dir = tempfile::tempdir().unwrap();
        let got = obtain_ambient(
            None,
            &AssetResolver::default(),
            &dir.path().join("ambient.mp3"),
            None,
            &SfxRequest::from_config(&AmbientConfig::default()),
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(got, None);
    }
}
