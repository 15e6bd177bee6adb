use crate::foundation::error::{FactoryError, FactoryResult};

/// Zero-based output frame index.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    pub num: u32,
    pub den: u32, // must be > 0
}

impl Fps {
    pub fn new(num: u32, den: u32) -> FactoryResult<Self> {
        if den == 0 {
            return Err(FactoryError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(FactoryError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    pub fn frame_duration_secs(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }

    pub fn frames_to_secs(self, frames: u64) -> f64 {
        (frames as f64) * self.frame_duration_secs()
    }
}

/// Target frame in pixels. All visual material is normalized to this size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn aspect_ratio(self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }

    /// Byte length of one tightly packed RGBA8 frame.
    pub fn rgba_len(self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Split a sequence of durations into contiguous `[start, end)` index ranges at `rate` units per
/// second. Boundaries are rounded from cumulative seconds, so rounding never accumulates and the
/// ranges always tile `0..round(total * rate)`.
pub fn cumulative_spans(durations: &[f64], rate: f64) -> Vec<std::ops::Range<u64>> {
    let mut spans = Vec::with_capacity(durations.len());
    let mut cum = 0.0f64;
    let mut start = 0u64;
    for d in durations {
        cum += d.max(0.0);
        let end = (cum * rate).round().max(0.0) as u64;
        let end = end.max(start);
        spans.push(start..end);
        start = end;
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_rejects_zero() {
        assert!(Fps::new(0, 1).is_err());
        assert!(Fps::new(24, 0).is_err());
        let fps = Fps::new(24, 1).unwrap();
        assert_eq!(fps.as_f64(), 24.0);
        assert!((fps.frames_to_secs(12) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn spans_tile_without_drift() {
        let durations = vec![1.0 / 3.0; 30];
        let spans = cumulative_spans(&durations, 24.0);
        assert_eq!(spans.first().unwrap().start, 0);
        for w in spans.windows(2) {
            assert_eq!(w[0].end, w[1].start);
        }
        assert_eq!(spans.last().unwrap().end, 240);
    }

    #[test]
    fn canvas_ratio() {
        let c = Canvas {
            width: 1080,
            height: 1920,
        };
        assert!((c.aspect_ratio() - 0.5625).abs() < 1e-12);
        assert_eq!(c.rgba_len(), 1080 * 1920 * 4);
    }
}
