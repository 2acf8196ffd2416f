//! page-reader-rs: reads an e-reader window aloud, page by page.

mod config;
mod estimator;
mod history;
mod notifier;
mod ocr;
mod pager;
mod reader;
mod speech;
mod text;
mod window;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::estimator::DurationEstimator;
use crate::history::PageLog;
use crate::notifier::Notifier;
use crate::ocr::{TesseractEngine, TextExtractor};
use crate::pager::PageTurner;
use crate::reader::{ReaderSettings, ReadingLoop};
use crate::speech::{SpeechClient, SpeechServer, VoiceCatalog};
use crate::window::DesktopCapture;

#[derive(Parser, Debug)]
#[command(name = "page-reader-rs", about = "Read an e-reader window aloud")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start reading (default)
    Run(RunArgs),

    /// Discover the speech server's voices
    Voices {
        /// Show the saved catalog instead of querying the server
        #[arg(long)]
        cached: bool,

        /// Only show voices whose name or locale contains this text
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Print a Markdown report of pages read
    Report {
        /// YYYY-MM-DD or "today"
        #[arg(short, long, default_value = "today")]
        date: String,

        /// List dates that have a page log
        #[arg(long)]
        list: bool,
    },
}

#[derive(clap::Args, Debug, Default)]
struct RunArgs {
    /// Substring of the reader window title
    #[arg(long)]
    title: Option<String>,

    /// Speech server voice
    #[arg(long)]
    voice: Option<String>,

    /// Speaking rate multiplier
    #[arg(long)]
    rate: Option<String>,

    /// Speech volume
    #[arg(long)]
    volume: Option<String>,

    /// Don't use the TCP speech server
    #[arg(long)]
    no_tcp: bool,

    /// Keep waiting for the window instead of failing
    #[arg(long)]
    wait_for_window: bool,
}

impl RunArgs {
    fn apply(self, config: &mut Config) {
        if let Some(title) = self.title {
            config.window.title = title;
        }
        if let Some(voice) = self.voice {
            config.tts.voice = voice;
        }
        if let Some(rate) = self.rate {
            config.tts.rate = rate;
        }
        if let Some(volume) = self.volume {
            config.tts.volume = volume;
        }
        if self.no_tcp {
            config.tts.use_tcp = false;
        }
        if self.wait_for_window {
            config.reading.wait_for_window = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = Config::load(args.config.as_deref());

    match args.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(run_args) => {
            run_args.apply(&mut config);
            run(config).await?;
        }
        Command::Voices { cached, filter } => voices(&config, cached, filter.as_deref()).await,
        Command::Report { date, list } => {
            let log = PageLog::new(config.history.resolved_dir());
            if list {
                for date in log.list_available_dates() {
                    println!("{date}");
                }
            } else {
                println!("{}", log.generate_report(&date));
            }
        }
    }

    Ok(())
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("page-reader-rs starting");
    info!("Target window: '{}'", config.window.title);

    let server = Arc::new(SpeechServer::new(&config.tts));
    let speaker = Arc::new(SpeechClient::new(
        &config.tts,
        server.clone(),
        config.voices.resolved_catalog_path(),
    ));
    let extractor = TextExtractor::new(Arc::new(TesseractEngine::new(&config.ocr)));

    let estimator = DurationEstimator::new(config.reading.base_wpm);
    info!("Pacing at {} wpm", estimator.base_wpm());

    let mut reader = ReadingLoop::new(
        ReaderSettings::from_config(&config),
        Arc::new(DesktopCapture::new()),
        extractor,
        speaker,
        Arc::new(PageTurner::new(&config.pager)),
        estimator,
    );
    if config.history.enabled {
        reader = reader.with_page_log(PageLog::new(config.history.resolved_dir()));
    }

    let follower = tokio::spawn(
        Notifier::new(config.feedback.notifications).follow(reader.subscribe()),
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, stopping after the current page");
                cancel.cancel();
            }
        }
    });

    let result = reader.run(cancel).await;

    if server.is_running().await {
        server.stop().await;
    } else {
        debug!("Speech server state at exit: {}", server.state().await);
    }
    drop(reader);
    let _ = follower.await;

    let summary = result?;
    info!(
        "Session finished: {} pages read, {} empty cycles",
        summary.pages_read, summary.empty_cycles
    );
    Ok(())
}

async fn voices(config: &Config, cached: bool, filter: Option<&str>) {
    let path = config.voices.resolved_catalog_path();

    let catalog = if cached {
        VoiceCatalog::load(&path)
    } else {
        let server = Arc::new(SpeechServer::new(&config.tts));
        let client = SpeechClient::new(&config.tts, server.clone(), path);
        let catalog = client.list_voices(config.voice_list_timeout()).await;
        server.stop().await;
        catalog
    };

    let shown = match filter {
        Some(query) => catalog.filter(query),
        None => catalog.voices().iter().collect(),
    };
    for voice in shown {
        let marker = if voice.name == config.tts.voice { "*" } else { " " };
        println!("{marker} [{}] {}", voice.index, voice.label());
    }

    if !catalog.is_empty() && catalog.find(&config.tts.voice).is_none() {
        warn!("Configured voice '{}' is not in the catalog", config.tts.voice);
    }

    if cached {
        println!("Voices cached: {}", catalog.len());
    } else {
        println!("Voices added: {}", catalog.len());
    }
}
