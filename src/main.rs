mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, DownloadArgs, TranscriptArgs};
use std::future::Future;
use std::io::Write;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use youtube_pipeline_lib::downloader::tools::ToolManager;
use youtube_pipeline_lib::{
    DownloadRequest, PipelineOrchestrator, ProgressHub, RequestId, Settings, TranscriptOutcome,
    TranscriptRequest,
};

fn download_request(url: &str, args: &DownloadArgs) -> DownloadRequest {
    let mut request = DownloadRequest::new(url);
    if let Some(format) = &args.format {
        request = request.with_format(format.clone());
    }
    if let Some(mode) = args.mode {
        request = request.with_mode(mode);
    }
    if args.gpu {
        request = request.with_gpu(true);
    }
    if let Some(name) = &args.name {
        request = request.with_file_name(name.clone());
    }
    request
}

fn transcript_request(url: &str, args: &TranscriptArgs) -> TranscriptRequest {
    let mut request = TranscriptRequest::new(url);
    if !args.lang.is_empty() {
        request = request.with_languages(args.lang.clone());
    }
    if let Some(context) = &args.context {
        request = request.with_context(context.clone());
    }
    request
}

/// Drive `op` while rendering download progress; Ctrl-C cancels `ids`
async fn with_progress<T>(hub: ProgressHub, ids: &[RequestId], show: bool, op: impl Future<Output = T>) -> T {
    tokio::pin!(op);
    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            out = &mut op => {
                if show {
                    eprintln!();
                }
                return out;
            }
            _ = ticker.tick(), if show => {
                if let Some(sample) = ids.iter().find_map(|id| hub.snapshot(*id)) {
                    let mb = sample.bytes_downloaded as f64 / 1_048_576.0;
                    match sample.percent() {
                        Some(pct) => eprint!("\r📥 {:5.1}% ({:.1} MB)", pct, mb),
                        None => eprint!("\r📥 {:.1} MB", mb),
                    }
                    let _ = std::io::stderr().flush();
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupted, cancelling");
                for id in ids {
                    hub.cancel(*id);
                }
            }
        }
    }
}

fn print_transcript(outcome: &TranscriptOutcome) {
    match outcome {
        TranscriptOutcome::Ready(t) => {
            eprintln!("📝 {} captions ({}), {} lines", t.language_tag, t.origin, t.lines.len());
            println!("{}", t.text);
        }
        TranscriptOutcome::Empty => eprintln!("No captions available"),
    }
}

fn check_tools(settings: &Settings) -> Result<()> {
    println!("Checking external tools...\n");

    let mut all_ok = true;
    for tool in ToolManager::new(settings.tools.clone()).get_all_tools() {
        let status = if tool.is_available { "✓" } else { "✗" };
        all_ok &= tool.is_available;

        print!("{} {}", status, tool.name);
        if let Some(version) = &tool.version {
            print!(" ({})", version);
        }
        if let Some(path) = &tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
        Ok(())
    } else {
        anyhow::bail!("some required tools are missing")
    }
}

async fn run(cli: Cli, mut settings: Settings) -> Result<()> {
    match cli.command {
        Commands::Tools => check_tools(&settings),

        Commands::Formats { url, json } => {
            let orchestrator = PipelineOrchestrator::from_settings(settings)?;
            let formats = orchestrator
                .list_formats(&url)
                .await
                .with_context(|| format!("failed to list formats for {}", url))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&formats)?);
            } else {
                for f in &formats {
                    println!("{:>6}  {}", f.id, f.display_label());
                }
            }
            Ok(())
        }

        Commands::Download { url, args } => {
            if let Some(dir) = &args.output {
                settings = settings.with_output_dir(dir.clone());
            }
            let orchestrator = PipelineOrchestrator::from_settings(settings)?;
            let request = download_request(&url, &args);
            let artifact = with_progress(
                orchestrator.progress(),
                &[request.id],
                true,
                orchestrator.acquire_and_mux(&request),
            )
            .await
            .with_context(|| format!("download of {} failed", url))?;
            println!("{}", artifact.path.display());
            Ok(())
        }

        Commands::Transcript { url, args } => {
            let orchestrator = PipelineOrchestrator::from_settings(settings)?;
            let request = transcript_request(&url, &args);
            let outcome = with_progress(
                orchestrator.progress(),
                &[request.id],
                false,
                orchestrator.extract_transcript(&request),
            )
            .await
            .with_context(|| format!("transcript of {} failed", url))?;
            print_transcript(&outcome);
            Ok(())
        }

        Commands::Run {
            url,
            download,
            transcript,
        } => {
            if let Some(dir) = &download.output {
                settings = settings.with_output_dir(dir.clone());
            }
            let orchestrator = PipelineOrchestrator::from_settings(settings)?;
            let dl = download_request(&url, &download);
            let tr = transcript_request(&url, &transcript);
            let (artifact, outcome) = with_progress(
                orchestrator.progress(),
                &[dl.id, tr.id],
                true,
                orchestrator.run_all(&dl, &tr),
            )
            .await;

            // Report both before failing
            let outcome = outcome.with_context(|| format!("transcript of {} failed", url));
            if let Ok(outcome) = &outcome {
                print_transcript(outcome);
            }
            let artifact = artifact.with_context(|| format!("download of {} failed", url))?;
            println!("{}", artifact.path.display());
            outcome.map(|_| ())
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;

    // RUST_LOG wins over the configured level
    let default_level = if cli.verbose {
        "debug".to_string()
    } else {
        settings.logging.level.clone()
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli, settings))
}
