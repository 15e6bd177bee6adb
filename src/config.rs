//! Run configuration.
//!
//! Everything the pipeline needs to know beyond the script itself is loaded once into an
//! immutable [`PipelineConfig`]: frame geometry, pacing, subtitle style, ambient bed parameters,
//! voices and provider credentials. Every field has a default, so a partial TOML file (or none at
//! all) is valid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::{FactoryError, FactoryResult};

/// Environment variable carrying the premium narration/SFX credential.
pub const ELEVENLABS_API_KEY_ENV: &str = "ELEVENLABS_API_KEY";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Output frame; every slice is cropped and resized to exactly this size.
    pub frame: Canvas,
    pub fps: u32,
    /// Silence appended to each segment's narration.
    pub segment_pause_sec: f64,
    pub max_concurrent_segments: usize,
    pub provider_timeout_sec: u64,
    pub keep_intermediates: bool,
    pub subtitles: SubtitleConfig,
    pub ambient: AmbientConfig,
    pub narration: NarrationConfig,
    #[serde(skip)]
    pub credentials: Credentials,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame: Canvas {
                width: 1080,
                height: 1920,
            },
            fps: 24,
            segment_pause_sec: 0.5,
            max_concurrent_segments: 3,
            provider_timeout_sec: 120,
            keep_intermediates: false,
            subtitles: SubtitleConfig::default(),
            ambient: AmbientConfig::default(),
            narration: NarrationConfig::default(),
            credentials: Credentials::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleConfig {
    pub enabled: bool,
    /// Character budget per chunk, counted in Unicode scalar values.
    pub max_chars: usize,
    /// Font files tried in order; the first readable one is used.
    pub font_candidates: Vec<PathBuf>,
    pub font_size_px: f32,
    pub fill_color: String,
    pub stroke_color: String,
    pub stroke_width_px: u32,
    /// Wrap width as a fraction of the frame width.
    pub max_width_ratio: f64,
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_chars: 12,
            font_candidates: vec![
                PathBuf::from("/System/Library/Fonts/AppleSDGothicNeo.ttc"),
                PathBuf::from("/usr/share/fonts/opentype/noto/NotoSansCJK-Bold.ttc"),
                PathBuf::from("/usr/share/fonts/noto-cjk/NotoSansCJK-Bold.ttc"),
                PathBuf::from("/usr/share/fonts/truetype/nanum/NanumGothicBold.ttf"),
                PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf"),
            ],
            font_size_px: 60.0,
            fill_color: "#FFD700".to_owned(),
            stroke_color: "#000000".to_owned(),
            stroke_width_px: 4,
            max_width_ratio: 0.8,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientConfig {
    pub enabled: bool,
    /// Linear attenuation applied before looping/trimming.
    pub gain: f32,
    pub prompt: String,
    pub duration_sec: f64,
    pub prompt_influence: f64,
    pub cache_file_name: String,
}

impl Default for AmbientConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gain: 0.2,
            prompt: "calm ambient background soundscape".to_owned(),
            duration_sec: 22.0,
            prompt_influence: 0.3,
            cache_file_name: "ambient.mp3".to_owned(),
        }
    }
}

/// Which slot of the fallback chain a provider occupies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderRole {
    Primary,
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceConfig {
    pub provider: ProviderRole,
    pub voice_id: String,
    #[serde(default)]
    pub model_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    pub primary: VoiceConfig,
    pub fallback: VoiceConfig,
    pub elevenlabs_base_url: String,
    pub edge_tts_binary: String,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            primary: VoiceConfig {
                provider: ProviderRole::Primary,
                voice_id: "8MwPLtBplylvbrksiBOC".to_owned(),
                model_id: Some("eleven_multilingual_v2".to_owned()),
            },
            fallback: VoiceConfig {
                provider: ProviderRole::Fallback,
                voice_id: "ko-KR-InJoonNeural".to_owned(),
                model_id: None,
            },
            elevenlabs_base_url: "https://api.elevenlabs.io".to_owned(),
            edge_tts_binary: "edge-tts".to_owned(),
        }
    }
}

/// Provider secrets. Never serialized, never printed.
#[derive(Clone, Default)]
pub struct Credentials {
    pub elevenlabs_api_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field(
                "elevenlabs_api_key",
                &self.elevenlabs_api_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Credentials {
    /// Read credentials from the process environment. Blank values count as absent.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let elevenlabs_api_key = lookup(ELEVENLABS_API_KEY_ENV)
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty());
        Self { elevenlabs_api_key }
    }
}

impl PipelineConfig {
    /// Load from an optional TOML file, then attach credentials from the environment.
    pub fn load(path: Option<&Path>) -> FactoryResult<Self> {
        let mut cfg = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p).map_err(|e| {
                    FactoryError::validation(format!("read config '{}': {e}", p.display()))
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        cfg.credentials = Credentials::from_env();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_str(text: &str) -> FactoryResult<Self> {
        let cfg: Self =
            toml::from_str(text).map_err(|e| FactoryError::serde(format!("config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> FactoryResult<()> {
        let Canvas { width, height } = self.frame;
        if width == 0 || height == 0 {
            return Err(FactoryError::validation("frame width/height must be > 0"));
        }
        if width % 2 != 0 || height % 2 != 0 {
            return Err(FactoryError::validation(
                "frame width/height must be even for yuv420p output",
            ));
        }
        if width > u32::from(u16::MAX) || height > u32::from(u16::MAX) {
            return Err(FactoryError::validation("frame width/height exceed 65535"));
        }
        if self.fps == 0 {
            return Err(FactoryError::validation("fps must be > 0"));
        }
        if !self.segment_pause_sec.is_finite() || self.segment_pause_sec < 0.0 {
            return Err(FactoryError::validation(
                "segment_pause_sec must be finite and >= 0",
            ));
        }
        if self.max_concurrent_segments == 0 {
            return Err(FactoryError::validation(
                "max_concurrent_segments must be > 0",
            ));
        }
        if self.provider_timeout_sec == 0 {
            return Err(FactoryError::validation("provider_timeout_sec must be > 0"));
        }
        let s = &self.subtitles;
        if s.max_chars == 0 {
            return Err(FactoryError::validation("subtitles.max_chars must be > 0"));
        }
        if !s.font_size_px.is_finite() || s.font_size_px <= 0.0 {
            return Err(FactoryError::validation(
                "subtitles.font_size_px must be finite and > 0",
            ));
        }
        if !s.max_width_ratio.is_finite() || s.max_width_ratio <= 0.0 || s.max_width_ratio > 1.0 {
            return Err(FactoryError::validation(
                "subtitles.max_width_ratio must be in (0, 1]",
            ));
        }
        parse_hex_color(&s.fill_color)?;
        parse_hex_color(&s.stroke_color)?;
        let a = &self.ambient;
        if !a.gain.is_finite() || a.gain < 0.0 {
            return Err(FactoryError::validation(
                "ambient.gain must be finite and >= 0",
            ));
        }
        if !a.duration_sec.is_finite() || a.duration_sec <= 0.0 {
            return Err(FactoryError::validation(
                "ambient.duration_sec must be finite and > 0",
            ));
        }
        if !(0.0..=1.0).contains(&a.prompt_influence) {
            return Err(FactoryError::validation(
                "ambient.prompt_influence must be in [0, 1]",
            ));
        }
        if a.cache_file_name.trim().is_empty() {
            return Err(FactoryError::validation(
                "ambient.cache_file_name must be non-empty",
            ));
        }
        if self.narration.primary.provider != ProviderRole::Primary
            || self.narration.fallback.provider != ProviderRole::Fallback
        {
            return Err(FactoryError::validation(
                "narration.primary/fallback must declare matching provider roles",
            ));
        }
        Ok(())
    }

    pub fn fps(&self) -> FactoryResult<Fps> {
        Fps::new(self.fps, 1)
    }

    pub fn provider_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.provider_timeout_sec)
    }
}

/// Parse `#RRGGBB` or `#RRGGBBAA` into straight RGBA8.
pub fn parse_hex_color(s: &str) -> FactoryResult<[u8; 4]> {
    let hex = s.strip_prefix('#').unwrap_or(s);
    if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
        return Err(FactoryError::validation(format!(
            "color '{s}' must be #RRGGBB or #RRGGBBAA"
        )));
    }
    let byte = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16)
            .map_err(|_| FactoryError::validation(format!("color '{s}' is not valid hex")))
    };
    let a = if hex.len() == 8 { byte(6)? } else { 255 };
    Ok([byte(0)?, byte(2)?, byte(4)?, a])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = PipelineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.frame.width, 1080);
        assert_eq!(cfg.frame.height, 1920);
        assert_eq!(cfg.fps, 24);
        assert_eq!(cfg.subtitles.max_chars, 12);
        assert!((cfg.ambient.gain - 0.2).abs() < 1e-6);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = PipelineConfig::from_toml_str(
            r#"
fps = 30

[frame]
width = 720
height = 1280

[ambient]
gain = 0.1
"#,
        )
        .unwrap();
        assert_eq!(cfg.fps, 30);
        assert_eq!(cfg.frame.width, 720);
        assert!((cfg.ambient.gain - 0.1).abs() < 1e-6);
        assert_eq!(cfg.ambient.cache_file_name, "ambient.mp3");
        assert_eq!(cfg.narration.fallback.voice_id, "ko-KR-InJoonNeural");
    }

    #[test]
    fn rejects_odd_frames_and_bad_values() {
        assert!(PipelineConfig::from_toml_str("[frame]\nwidth = 1081\nheight = 1920\n").is_err());
        assert!(PipelineConfig::from_toml_str("fps = 0\n").is_err());
        assert!(PipelineConfig::from_toml_str("max_concurrent_segments = 0\n").is_err());
        assert!(PipelineConfig::from_toml_str("[subtitles]\nmax_chars = 0\n").is_err());
        assert!(PipelineConfig::from_toml_str("[ambient]\ngain = -1.0\n").is_err());
        assert!(PipelineConfig::from_toml_str("[subtitles]\nfill_color = \"gold\"\n").is_err());
    }

    #[test]
    fn unknown_syntax_is_serde_error() {
        let err = PipelineConfig::from_toml_str("fps = \"fast\"").unwrap_err();
        assert!(matches!(err, FactoryError::Serde(_)));
    }

    #[test]
    fn blank_credential_is_absent() {
        let c = Credentials::from_lookup(|_| Some("   ".to_owned()));
        assert!(c.elevenlabs_api_key.is_none());
        let c = Credentials::from_lookup(|_| Some(" sk-123 ".to_owned()));
        assert_eq!(c.elevenlabs_api_key.as_deref(), Some("sk-123"));
        assert!(!format!("{c:?}").contains("sk-123"));
    }

    #[test]
    fn hex_colors() {
        assert_eq!(parse_hex_color("#FFD700").unwrap(), [255, 215, 0, 255]);
        assert_eq!(parse_hex_color("00000080").unwrap(), [0, 0, 0, 128]);
        assert!(parse_hex_color("#FFF").is_err());
        assert!(parse_hex_color("#GG0000").is_err());
    }
}
