use std::path::Path;

use crate::foundation::error::{FactoryError, FactoryResult};

/// Sample rate of every PCM buffer the pipeline mixes.
pub const MIX_SAMPLE_RATE: u32 = 48_000;

/// Interleaved `f32` PCM. The pipeline always decodes to stereo at [`MIX_SAMPLE_RATE`].
#[derive(Clone, Debug, PartialEq)]
pub struct AudioPcm {
    pub sample_rate: u32,
    pub channels: u16,
    pub interleaved_f32: Vec<f32>,
}

impl AudioPcm {
    pub fn silent(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            interleaved_f32: Vec::new(),
        }
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> u64 {
        if self.channels == 0 {
            return 0;
        }
        (self.interleaved_f32.len() / usize::from(self.channels)) as u64
    }

    pub fn duration_sec(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }
}

/// Whether the `ffmpeg` binary can be launched.
pub fn is_ffmpeg_on_path() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

/// Decode any audio file ffmpeg understands into interleaved stereo `f32` at `sample_rate`.
///
/// Blocking; callers on the async runtime should wrap this in `spawn_blocking`.
pub fn decode_audio_f32_stereo(path: &Path, sample_rate: u32) -> FactoryResult<AudioPcm> {
    let out = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            "2",
            "-ar",
            &sample_rate.to_string(),
            "pipe:1",
        ])
        .output()
        .map_err(|e| FactoryError::media(format!("failed to run ffmpeg for audio decode: {e}")))?;

    if !out.status.success() {
        let msg = String::from_utf8_lossy(&out.stderr);
        return Err(FactoryError::media(format!(
            "ffmpeg audio decode failed for '{}': {}",
            path.display(),
            msg.trim()
        )));
    }

    let interleaved_f32 = pcm_from_f32le_bytes(&out.stdout)?;
    let pcm = AudioPcm {
        sample_rate,
        channels: 2,
        interleaved_f32,
    };
    if pcm.frames() == 0 {
        return Err(FactoryError::media(format!(
            "'{}' decoded to zero audio samples",
            path.display()
        )));
    }
    Ok(pcm)
}

fn pcm_from_f32le_bytes(bytes: &[u8]) -> FactoryResult<Vec<f32>> {
    if !bytes.len().is_multiple_of(4) {
        return Err(FactoryError::media(
            "decoded audio byte length is not aligned to f32 samples",
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
