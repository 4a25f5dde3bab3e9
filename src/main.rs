//! S3G Thumbnailer
//!
//! Entry point for the thumbnail service: backfills missing thumbnails and
//! follows the media bucket's notifications.

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use s3g_thumbnailer::cli::{Args, Commands};
use s3g_thumbnailer::config::Config;
use s3g_thumbnailer::generator::{ThumbnailGenerator, thumbnail_key};
use s3g_thumbnailer::notify::{SqsNotificationSource, Subscription};
use s3g_thumbnailer::reconciler::Reconciler;
use s3g_thumbnailer::service::ThumbnailService;
use s3g_thumbnailer::store::{ObjectStore, S3ObjectStore};
use s3g_thumbnailer::transcoder::{Transcoder, TranscoderFactory};

const DEFAULT_CONFIG_FILE: &str = "thumbnailer.toml";

/// Components shared by the commands that talk to the buckets
struct App {
    config: Config,
    transcoder: Arc<dyn Transcoder>,
    generator: ThumbnailGenerator,
    reconciler: Reconciler,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        // Writing the template needs neither a valid config nor logging
        Commands::InitConfig { output } => {
            Config::default().save_to_file(&output)?;
            println!("Default configuration written to {}", output.display());
        }
        Commands::Run => App::load(args.config.as_deref(), args.verbose).await?.run().await?,
        Commands::Backfill => App::load(args.config.as_deref(), args.verbose).await?.backfill().await?,
        Commands::Missing => App::load(args.config.as_deref(), args.verbose).await?.missing().await?,
        Commands::Generate { key, etag } => {
            App::load(args.config.as_deref(), args.verbose)
                .await?
                .generate(&key, etag)
                .await?
        }
    }

    Ok(())
}

impl App {
    async fn load(config_path: Option<&Path>, verbose: bool) -> Result<Self> {
        let config = load_config(config_path)?;

        // Setup logging to both console and file
        setup_logging(verbose || config.develop_mode)?;
        info!("Starting S3G thumbnailer");

        // Missing settings are fatal before anything is touched
        config.validate()?;

        let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::from_config(&config.store).await);
        let transcoder: Arc<dyn Transcoder> =
            Arc::from(TranscoderFactory::create_default(config.tools.clone()));

        tokio::fs::create_dir_all(&config.thumbnail.work_dir).await?;

        let generator = ThumbnailGenerator::new(
            store.clone(),
            transcoder.clone(),
            &config.store.media_bucket,
            &config.store.thumbnail_bucket,
            config.thumbnail.size,
            &config.thumbnail.work_dir,
        );
        let reconciler = Reconciler::new(
            store,
            &config.store.media_bucket,
            &config.store.thumbnail_bucket,
        );

        Ok(Self {
            config,
            transcoder,
            generator,
            reconciler,
        })
    }

    async fn run(self) -> Result<()> {
        let queue_url = self.config.require_queue_url()?;
        self.transcoder.check_availability().await?;

        let source = SqsNotificationSource::from_config(
            &self.config.store,
            &self.config.notifications,
            queue_url,
        )
        .await?;

        let cancel = CancellationToken::new();
        tokio::spawn(shutdown_signal(cancel.clone()));

        let subscription = Subscription::new(
            Box::new(source),
            &self.config.store.media_bucket,
            &self.config.notifications.event_prefix,
            cancel,
        );

        let mut service = ThumbnailService::new(self.generator, self.reconciler);
        service.run(subscription).await;
        info!("Shutdown complete");
        Ok(())
    }

    async fn backfill(self) -> Result<()> {
        self.transcoder.check_availability().await?;

        let report = self.reconciler.backfill(&self.generator).await?;
        println!(
            "{} missing, {} generated, {} failed",
            report.missing,
            report.generated,
            report.failed.len()
        );
        for key in &report.failed {
            println!("  failed: {}", key);
        }
        Ok(())
    }

    async fn missing(self) -> Result<()> {
        let mut keys: Vec<String> = self
            .reconciler
            .find_missing_thumbnails()
            .await?
            .into_iter()
            .collect();
        keys.sort();

        if keys.is_empty() {
            println!("Every media object has a thumbnail.");
        } else {
            for key in &keys {
                println!("{}", key);
            }
            info!("{} thumbnails missing", keys.len());
        }
        Ok(())
    }

    async fn generate(self, key: &str, etag: Option<String>) -> Result<()> {
        let etag = etag.unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        self.generator.generate(key, &etag).await?;
        println!(
            "Thumbnail written to {}/{}",
            self.config.store.thumbnail_bucket,
            thumbnail_key(key)
        );
        Ok(())
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            // Try to load the config file from current directory first
            if Path::new(DEFAULT_CONFIG_FILE).exists() {
                Config::from_file(DEFAULT_CONFIG_FILE)?
            } else {
                Config::default()
            }
        }
    };

    config.apply_env()?;
    Ok(config)
}

/// Cancel `token` on Ctrl-C or SIGTERM.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown requested, finishing current item");
    token.cancel();
}

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = std::env::current_dir()?.join(".s3g").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "thumbnailer.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}
