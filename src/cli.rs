use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use youtube_pipeline_lib::MuxMode;

#[derive(Parser)]
#[command(name = "youtube-pipeline")]
#[command(author, version, about = "Download, mux and transcribe YouTube videos")]
pub struct Cli {
    /// Path to config file (defaults to $YTP_CONFIG)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone)]
pub struct DownloadArgs {
    /// Encoding id from `formats`; best mp4 video when omitted
    #[arg(short, long)]
    pub format: Option<String>,

    /// copy keeps the video bitstream, transcode re-encodes it
    #[arg(short, long)]
    pub mode: Option<MuxMode>,

    /// Use NVENC when transcoding
    #[arg(long)]
    pub gpu: bool,

    /// Directory for the finished file (overrides output.dir)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// File name for the finished video
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Args, Clone)]
pub struct TranscriptArgs {
    /// Preferred caption languages, in order
    #[arg(short, long, value_delimiter = ',')]
    pub lang: Vec<String>,

    /// Store the transcript under this key
    #[arg(long)]
    pub context: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List available video encodings, one per resolution
    Formats {
        url: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Download video and audio and mux them into one file
    Download {
        url: String,

        #[command(flatten)]
        args: DownloadArgs,
    },

    /// Build a punctuated transcript from the video's captions
    Transcript {
        url: String,

        #[command(flatten)]
        args: TranscriptArgs,
    },

    /// Download and transcribe concurrently
    Run {
        url: String,

        #[command(flatten)]
        download: DownloadArgs,

        #[command(flatten)]
        transcript: TranscriptArgs,
    },

    /// Check that yt-dlp and ffmpeg are available
    Tools,
}
