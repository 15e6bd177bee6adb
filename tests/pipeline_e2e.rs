use std::path::Path;
use std::time::Duration;

use shorts_factory::{
    Canvas, FactoryError, NarrationProvider, NarrationSynthesizer, OmissionCause, Pipeline,
    PipelineConfig, ProviderError, ProviderRole, RenderJob, is_ffmpeg_on_path,
};

/// Writes a short sine tone; fails for any text containing `FAIL`.
struct ToneNarrator;

#[async_trait::async_trait]
impl NarrationProvider for ToneNarrator {
    fn name(&self) -> &str {
        "tone"
    }

    fn role(&self) -> ProviderRole {
        ProviderRole::Fallback
    }

    async fn synthesize(&self, text: &str, out_path: &Path) -> Result<(), ProviderError> {
        if text.contains("FAIL") {
            return Err(ProviderError::Command("scripted failure".to_owned()));
        }
        write_tone(out_path, 0.3)
            .await
            .map_err(|e| ProviderError::Command(e.to_string()))
    }
}

async fn write_tone(path: &Path, secs: f64) -> anyhow::Result<()> {
    let status = tokio::process::Command::new("ffmpeg")
        .args([
            "-v",
            "error",
            "-y",
            "-f",
            "lavfi",
            "-i",
            &format!("sine=frequency=440:duration={secs}"),
            "-f",
            "wav",
        ])
        .arg(path)
        .status()
        .await?;
    anyhow::ensure!(status.success(), "ffmpeg tone generation failed");
    Ok(())
}

fn encoder_available() -> bool {
    if !is_ffmpeg_on_path() {
        return false;
    }
    std::process::Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .output()
        .map(|o| {
            let s = String::from_utf8_lossy(&o.stdout);
            s.contains("libx264") && s.contains(" aac ")
        })
        .unwrap_or(false)
}

fn small_config() -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.frame = Canvas {
        width: 64,
        height: 96,
    };
    cfg.fps = 12;
    cfg.subtitles.enabled = false;
    cfg.ambient.enabled = false;
    cfg.provider_timeout_sec = 30;
    cfg
}

fn pipeline() -> Pipeline {
    let synth = NarrationSynthesizer::new(None, Box::new(ToneNarrator), Duration::from_secs(30));
    Pipeline::new(small_config(), synth, None)
}

fn write_png(path: &Path, w: u32, h: u32, px: [u8; 4]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    image::RgbaImage::from_pixel(w, h, image::Rgba(px))
        .save(path)
        .unwrap();
}

#[tokio::test]
async fn two_segments_render_in_order() {
    if !encoder_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    write_png(&dir.path().join("assets/a.png"), 120, 80, [200, 30, 30, 255]);
    write_png(&dir.path().join("assets/b.png"), 40, 100, [30, 30, 200, 255]);
    std::fs::write(
        dir.path().join("script.json"),
        r#"{"segments":[
            {"text":"첫 번째 장면입니다.","image_path":"a.png"},
            {"text":"두 번째 장면입니다.","image_paths":["b.png","a.png"]}
        ]}"#,
    )
    .unwrap();

    let job = RenderJob::from_project_dir(dir.path());
    let summary = pipeline().run(&job).await.unwrap();

    assert_eq!(summary.rendered, vec![0, 1]);
    assert_eq!(summary.clips.len(), 2);
    assert_eq!(summary.clips[1].slice_secs.len(), 2);
    assert!(summary.omitted.is_empty());
    assert!((summary.duration_sec - 1.6).abs() < 0.1, "{}", summary.duration_sec);
    assert!(summary.frames > 0);
    assert!(std::fs::metadata(dir.path().join("final_video.mp4")).unwrap().len() > 0);
    assert!(!dir.path().join(".shorts-factory-work").exists());
}

#[tokio::test]
async fn failed_segment_is_omitted_and_the_rest_keep_order() {
    if !encoder_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    write_png(&dir.path().join("img.png"), 64, 96, [10, 200, 10, 255]);
    let script = dir.path().join("script.json");
    std::fs::write(
        &script,
        r#"{"segments":[
            {"text":"A","image_path":"img.png"},
            {"text":"B FAIL","image_path":"img.png"},
            {"text":"C","image_path":"img.png"}
        ]}"#,
    )
    .unwrap();
    let out = dir.path().join("out").join("video.mp4");

    let job = RenderJob::explicit(&script, &out);
    let summary = pipeline().run(&job).await.unwrap();

    assert_eq!(summary.rendered, vec![0, 2]);
    assert_eq!(summary.omitted.len(), 1);
    assert_eq!(summary.omitted[0].0, 1);
    assert!(matches!(summary.omitted[0].1, OmissionCause::Synthesis(_)));
    assert!(out.exists());
}

#[tokio::test]
async fn pregenerated_narration_bypasses_providers() {
    if !encoder_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    write_png(&dir.path().join("assets/img.png"), 64, 96, [90, 90, 90, 255]);
    write_tone(&dir.path().join("assets/intro.mp3"), 0.5).await.unwrap();
    std::fs::write(
        dir.path().join("script.json"),
        r#"{"segments":[{"id":"intro","text":"FAIL if synthesized","image_path":"img.png"}]}"#,
    )
    .unwrap();

    let summary = pipeline()
        .run(&RenderJob::from_project_dir(dir.path()))
        .await
        .unwrap();
    assert_eq!(summary.rendered, vec![0]);
    assert!((summary.duration_sec - 1.0).abs() < 0.1, "{}", summary.duration_sec);
}

#[tokio::test]
async fn unresolvable_image_leaves_survivors_the_whole_segment() {
    if !encoder_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    write_png(&dir.path().join("assets/a.png"), 64, 96, [200, 30, 30, 255]);
    write_png(&dir.path().join("assets/b.png"), 64, 96, [30, 30, 200, 255]);
    std::fs::write(
        dir.path().join("script.json"),
        r#"{"segments":[{"text":"세 장 중 하나는 없습니다.","image_paths":["a.png","missing.png","b.png"]}]}"#,
    )
    .unwrap();

    let summary = pipeline()
        .run(&RenderJob::from_project_dir(dir.path()))
        .await
        .unwrap();
    assert_eq!(summary.rendered, vec![0]);
    assert!(summary.omitted.is_empty());

    let clip = &summary.clips[0];
    let names: Vec<_> = clip
        .images
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.png", "b.png"]);
    assert_eq!(clip.slice_secs.len(), 2);
    let covered: f64 = clip.slice_secs.iter().sum();
    assert!((covered - clip.duration_sec).abs() < 1e-9, "{covered} vs {}", clip.duration_sec);
    assert!((clip.slice_secs[0] - clip.slice_secs[1]).abs() < 1e-9);
    assert!((clip.duration_sec - 0.8).abs() < 0.1, "{}", clip.duration_sec);
}

#[tokio::test]
async fn nothing_assemblable_writes_no_container() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("script.json"),
        r#"{"segments":[{"text":"no pictures here"}]}"#,
    )
    .unwrap();

    let err = pipeline()
        .run(&RenderJob::from_project_dir(dir.path()))
        .await
        .unwrap_err();
    assert!(matches!(err, FactoryError::NoAssemblableContent(_)), "{err}");
    assert!(!dir.path().join("final_video.mp4").exists());
    assert!(!dir.path().join(".shorts-factory-work").exists());
}

