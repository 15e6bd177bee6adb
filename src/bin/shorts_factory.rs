use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use shorts_factory::{Pipeline, PipelineConfig, RenderJob};

/// Assemble a narrated vertical short video from a script.
///
/// Either pass a project directory (`script.json` and `assets/` inside, written to
/// `final_video.mp4`), or `--script` together with `--output`.
#[derive(Parser, Debug)]
#[command(name = "shorts-factory", version)]
struct Cli {
    /// Project directory containing `script.json`.
    project_dir: Option<PathBuf>,

    /// Script JSON (explicit mode).
    #[arg(long)]
    script: Option<PathBuf>,

    /// Output MP4 path (explicit mode).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Pipeline configuration TOML.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Do not burn in subtitles.
    #[arg(long)]
    no_subtitles: bool,

    /// Do not mix a background track.
    #[arg(long)]
    no_ambient: bool,

    /// Keep synthesized narration and the audio mix next to the output.
    #[arg(long)]
    keep_intermediates: bool,

    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let job = match RenderJob::from_invocation(
        cli.project_dir.clone(),
        cli.script.clone(),
        cli.output.clone(),
    ) {
        Ok(job) => job,
        Err(e) => {
            eprintln!("shorts-factory: {e}");
            eprintln!("usage: shorts-factory <PROJECT_DIR> | --script <FILE> --output <FILE>");
            return ExitCode::from(2);
        }
    };

    match run(&cli, &job).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: &Cli, job: &RenderJob) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut config = PipelineConfig::load(cli.config.as_deref()).with_context(|| {
        match &cli.config {
            Some(p) => format!("load config '{}'", p.display()),
            None => "load default config".to_owned(),
        }
    })?;
    if cli.no_subtitles {
        config.subtitles.enabled = false;
    }
    if cli.no_ambient {
        config.ambient.enabled = false;
    }
    if cli.keep_intermediates {
        config.keep_intermediates = true;
    }

    let pipeline = Pipeline::from_config(config).context("set up providers")?;
    let summary = pipeline
        .run(job)
        .await
        .with_context(|| format!("render '{}'", job.script_path.display()))?;

    eprintln!("wrote {}", summary.output_path.display());
    Ok(())
}
