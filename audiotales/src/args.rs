use std::path::PathBuf;

use clap::{Parser, Subcommand};
use url::Url;

/// AudioTales story writer and reader
#[derive(Debug, Parser)]
#[command(name = "audiotales", about = "Write illustrated children's stories and read them aloud")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = tales_config::DEFAULT_CONFIG_FILE, env = "AUDIOTALES_CONFIG")]
    pub config: PathBuf,

    /// Log filter, overriding the configured one
    #[arg(long, env = "RUST_LOG")]
    pub log: Option<String>,

    /// Override the web app base URL
    #[arg(long, env = "AUDIOTALES_URL")]
    pub base_url: Option<Url>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write and illustrate a new story, printing progress as it happens
    Generate {
        /// What the story should be about
        #[arg(short, long)]
        prompt: String,

        /// Number of pages (1 to 10)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=10))]
        pages: Option<u32>,

        /// Directory the web app writes the story into
        #[arg(long)]
        path: Option<String>,
    },

    /// Read a story aloud, page by page
    Read {
        /// Story title as listed by `audiotales stories`
        #[arg(short, long)]
        title: String,

        /// Page to start from (1-based)
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        page: u32,

        /// Narrator voice
        #[arg(long)]
        voice: Option<String>,

        /// Narration speed (0.25 to 4.0)
        #[arg(long)]
        speed: Option<f64>,
    },

    /// List generated stories
    Stories,

    /// List narrator voices offered by the speech service
    Voices,
}
