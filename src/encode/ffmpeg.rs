use std::io::{Read, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use tracing::{debug, warn};

use crate::assets::media::is_ffmpeg_on_path;
use crate::encode::sink::{FrameRGBA, FrameSink, SinkConfig};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{FactoryError, FactoryResult};

/// Streams raw frames into the system `ffmpeg` and muxes an H.264/AAC MP4.
///
/// The output file is removed if encoding fails or the sink is aborted, so a failed run never
/// leaves a truncated container behind.
pub struct FfmpegSink {
    out_path: PathBuf,
    bg_rgba: [u8; 3],

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,

    scratch: Vec<u8>,
    cfg: Option<SinkConfig>,
    last_idx: Option<FrameIndex>,
}

impl FfmpegSink {
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: out_path.into(),
            bg_rgba: [0, 0, 0],
            child: None,
            stdin: None,
            stderr_drain: None,
            scratch: Vec::new(),
            cfg: None,
            last_idx: None,
        }
    }

    fn command(&self, cfg: &SinkConfig) -> FactoryResult<Command> {
        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &format!("{}/{}", cfg.fps.num, cfg.fps.den),
            "-i",
            "pipe:0",
        ]);

        match cfg.audio.as_ref() {
            Some(audio) => {
                if audio.sample_rate == 0 || audio.channels == 0 {
                    return Err(FactoryError::encoding(
                        "audio sample_rate and channels must be non-zero",
                    ));
                }
                cmd.args([
                    "-f",
                    "f32le",
                    "-ar",
                    &audio.sample_rate.to_string(),
                    "-ac",
                    &audio.channels.to_string(),
                    "-i",
                ])
                .arg(&audio.path)
                .args(["-c:a", "aac", "-b:a", "192k"]);
            }
            None => {
                cmd.arg("-an");
            }
        }
        cmd.args([
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ]);
        cmd.arg(&self.out_path);
        Ok(cmd)
    }

    fn discard_output(&self) {
        match std::fs::remove_file(&self.out_path) {
            Ok(()) => debug!(path = %self.out_path.display(), "removed partial output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.out_path.display(), error = %e, "failed to remove partial output"),
        }
    }

    fn finish(&mut self) -> FactoryResult<()> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| FactoryError::encoding("ffmpeg sink not started"))?;

        let status = child
            .wait()
            .map_err(|e| FactoryError::encoding(format!("failed to wait for ffmpeg: {e}")))?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| FactoryError::encoding("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| FactoryError::encoding(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };

        if !status.success() {
            return Err(FactoryError::encoding(format!(
                "ffmpeg exited with status {}: {}",
                status,
                String::from_utf8_lossy(&stderr_bytes).trim()
            )));
        }
        Ok(())
    }
}

impl FrameSink for FfmpegSink {
    fn begin(&mut self, cfg: SinkConfig) -> FactoryResult<()> {
        if cfg.fps.num == 0 || cfg.fps.den == 0 {
            return Err(FactoryError::encoding("fps must be non-zero"));
        }
        if cfg.width == 0 || cfg.height == 0 {
            return Err(FactoryError::encoding("frame width/height must be non-zero"));
        }
        if !cfg.width.is_multiple_of(2) || !cfg.height.is_multiple_of(2) {
            return Err(FactoryError::encoding(
                "frame width/height must be even (required for yuv420p)",
            ));
        }
        ensure_parent_dir(&self.out_path)?;
        if !is_ffmpeg_on_path() {
            return Err(FactoryError::encoding(
                "ffmpeg is required for MP4 encoding, but was not found on PATH",
            ));
        }

        let mut child = self.command(&cfg)?.spawn().map_err(|e| {
            FactoryError::encoding(format!("failed to spawn ffmpeg: {e}"))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| FactoryError::encoding("failed to open ffmpeg stdin"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| FactoryError::encoding("failed to open ffmpeg stderr"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        debug!(
            width = cfg.width,
            height = cfg.height,
            fps = cfg.fps.as_f64(),
            audio = cfg.audio.is_some(),
            out = %self.out_path.display(),
            "ffmpeg started"
        );
        self.scratch = vec![0u8; cfg.width as usize * cfg.height as usize * 4];
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.cfg = Some(cfg);
        self.last_idx = None;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> FactoryResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| FactoryError::encoding("ffmpeg sink not started"))?;
        if let Some(last) = self.last_idx
            && idx.0 <= last.0
        {
            return Err(FactoryError::encoding(
                "ffmpeg sink received out-of-order frame index",
            ));
        }
        self.last_idx = Some(idx);

        if frame.width != cfg.width || frame.height != cfg.height {
            return Err(FactoryError::encoding(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.width, cfg.height
            )));
        }
        flatten_premul_to_opaque(&mut self.scratch, &frame.data, self.bg_rgba)?;

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| FactoryError::encoding("ffmpeg sink is already finalized"))?;
        stdin
            .write_all(&self.scratch)
            .map_err(|e| FactoryError::encoding(format!("failed to write frame to ffmpeg: {e}")))
    }

    fn end(&mut self) -> FactoryResult<()> {
        let result = self.finish();
        self.cfg = None;
        if result.is_err() {
            self.discard_output();
        }
        result
    }

    fn abort(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(handle) = self.stderr_drain.take() {
            let _ = handle.join();
        }
        self.cfg = None;
        self.discard_output();
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.abort();
        }
    }
}

/// Composite premultiplied RGBA8 over an opaque background color.
fn flatten_premul_to_opaque(dst: &mut [u8], src_premul: &[u8], bg: [u8; 3]) -> FactoryResult<()> {
    if dst.len() != src_premul.len() || !dst.len().is_multiple_of(4) {
        return Err(FactoryError::encoding(
            "frame data size does not match width*height*4",
        ));
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src_premul.chunks_exact(4)) {
        let inv = 255u16 - u16::from(s[3]);
        for c in 0..3 {
            let v = u16::from(s[c]) + mul_div255(u16::from(bg[c]), inv);
            d[c] = v.min(255) as u8;
        }
        d[3] = 255;
    }
    Ok(())
}

fn mul_div255(x: u16, y: u16) -> u16 {
    ((u32::from(x) * u32::from(y) + 127) / 255) as u16
}

pub fn ensure_parent_dir(path: &Path) -> FactoryResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            FactoryError::encoding(format!(
                "failed to create output directory '{}': {e}",
                parent.display()
            ))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::Fps;

    #[test]
    fn transparent_pixels_become_background() {
        let mut dst = vec![0u8; 4];
        flatten_premul_to_opaque(&mut dst, &[0, 0, 0, 0], [10, 20, 30]).unwrap();
        assert_eq!(dst, vec![10, 20, 30, 255]);
    }

    #[test]
    fn opaque_pixels_pass_through() {
        let mut dst = vec![0u8; 4];
        flatten_premul_to_opaque(&mut dst, &[1, 2, 3, 255], [10, 20, 30]).unwrap();
        assert_eq!(dst, vec![1, 2, 3, 255]);
    }

    #[test]
    fn odd_dimensions_are_rejected_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FfmpegSink::new(dir.path().join("out.mp4"));
        let err = sink
            .begin(SinkConfig {
                width: 63,
                height: 96,
                fps: Fps::new(12, 1).unwrap(),
                audio: None,
            })
            .unwrap_err();
        assert!(matches!(err, FactoryError::Encoding(_)));
    }

    #[test]
    fn encodes_a_short_clip_and_aborts_cleanly() {
        if !is_ffmpeg_on_path() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let cfg = SinkConfig {
            width: 16,
            height: 16,
            fps: Fps::new(12, 1).unwrap(),
            audio: None,
        };
        let frame = FrameRGBA {
            width: 16,
            height: 16,
            data: vec![255; 16 * 16 * 4],
        };

        let out = dir.path().join("ok.mp4");
        let mut sink = FfmpegSink::new(&out);
        sink.begin(cfg.clone()).unwrap();
        for i in 0..6 {
            sink.push_frame(FrameIndex(i), &frame).unwrap();
        }
        sink.end().unwrap();
        assert!(std::fs::metadata(&out).unwrap().len() > 0);

        let aborted = dir.path().join("aborted.mp4");
        let mut sink = FfmpegSink::new(&aborted);
        sink.begin(cfg).unwrap();
        sink.push_frame(FrameIndex(0), &frame).unwrap();
        sink.abort();
        assert!(!aborted.exists());
    }
}
