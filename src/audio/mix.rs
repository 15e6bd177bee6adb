use std::path::Path;

use crate::foundation::error::{FactoryError, FactoryResult};
use crate::timeline::Timeline;

/// Lay every clip's narration at its sample span, leaving the pause (and any rounding slack)
/// silent. Output is interleaved stereo covering exactly the timeline.
pub(crate) fn build_narration_track(timeline: &Timeline, sample_rate: u32) -> Vec<f32> {
    const CH: usize = 2;
    let spans = timeline.clip_sample_spans(sample_rate);
    let total = spans.last().map_or(0, |r| r.end) as usize;
    let mut out = vec![0.0f32; total * CH];
    for (clip, span) in timeline.clips.iter().zip(spans) {
        let start = span.start as usize * CH;
        let len = (span.end - span.start) as usize * CH;
        let src = &clip.narration.interleaved_f32;
        let n = len.min(src.len());
        out[start..start + n].copy_from_slice(&src[..n]);
    }
    out
}

/// Add `src` onto `dst` sample by sample (up to the shorter length).
pub(crate) fn mix_additive(dst: &mut [f32], src: &[f32]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d += *s;
    }
}

pub(crate) fn clamp_in_place(samples: &mut [f32]) {
    for s in samples {
        *s = s.clamp(-1.0, 1.0);
    }
}

/// Write interleaved `f32` PCM samples to raw little-endian `.f32le` file.
pub(crate) fn write_mix_to_f32le_file(
    samples_interleaved: &[f32],
    out_path: &Path,
) -> FactoryResult<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            FactoryError::encoding(format!(
                "failed to create audio mix output directory '{}': {e}",
                parent.display()
            ))
        })?;
    }

    let mut bytes = Vec::<u8>::with_capacity(samples_interleaved.len() * 4);
    for &sample in samples_interleaved {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    std::fs::write(out_path, bytes).map_err(|e| {
        FactoryError::encoding(format!(
            "failed to write mixed audio file '{}': {e}",
            out_path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::media::AudioPcm;
    use crate::timeline::TimelineClip;

    fn clip(index: usize, narration_frames: usize, duration_sec: f64) -> TimelineClip {
        TimelineClip {
            index,
            id: None,
            narration: AudioPcm {
                sample_rate: 10,
                channels: 2,
                interleaved_f32: vec![0.5; narration_frames * 2],
            },
            duration_sec,
            slices: Vec::new(),
            subtitles: Vec::new(),
        }
    }

    #[test]
    fn narration_is_placed_with_trailing_silence() {
        let t = Timeline {
            clips: vec![clip(0, 5, 1.0), clip(1, 3, 0.5)],
            omitted: Vec::new(),
        };
        let out = build_narration_track(&t, 10);
        assert_eq!(out.len(), 15 * 2);
        assert!(out[..10].iter().all(|&s| s == 0.5));
        assert!(out[10..20].iter().all(|&s| s == 0.0));
        assert!(out[20..26].iter().all(|&s| s == 0.5));
        assert!(out[26..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn overlong_narration_is_truncated_to_span() {
        let t = Timeline {
            clips: vec![clip(0, 20, 1.0)],
            omitted: Vec::new(),
        };
        assert_eq!(build_narration_track(&t, 10).len(), 20);
    }

    #[test]
    fn mixing_adds_then_clamps() {
        let mut a = vec![0.9, -0.9, 0.1];
        mix_additive(&mut a, &[0.5, -0.5]);
        clamp_in_place(&mut a);
        assert_eq!(a, vec![1.0, -1.0, 0.1]);
    }

    #[test]
    fn f32le_file_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mix.f32le");
        write_mix_to_f32le_file(&[1.0, -0.25], &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(f32::from_le_bytes(bytes[4..8].try_into().unwrap()), -0.25);
    }
}
