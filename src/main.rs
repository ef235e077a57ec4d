//! p2pfs - Main entry point
//!
//! Runs one file sharing peer: serve, publish or search from the command line.

use anyhow::{Context, Result};
use p2pfs::{Application, CliArgs, Command, Config, DirectoryOverlay, MetaInfo, PublishOutcome, ShareError};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Set up panic handler for unexpected errors
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();
        match panic_info.location() {
            Some(location) => error!(
                "PANIC occurred at {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            ),
            None => error!("PANIC occurred at unknown location"),
        }
        let payload = panic_info.payload();
        if let Some(s) = payload.downcast_ref::<&str>() {
            error!("Panic message: {}", s);
        } else if let Some(s) = payload.downcast_ref::<String>() {
            error!("Panic message: {}", s);
        } else {
            error!("Panic message: unknown");
        }
        error!("Backtrace:\n{:?}", backtrace);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_panic_handler();

    let args = CliArgs::parse_args();
    init_logging(&args);
    info!("p2pfs starting");
    debug!("CLI arguments: {:?}", args);

    let config = Config::from_args(&args).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let overlay = DirectoryOverlay::open(config.overlay_dir.clone())
        .await
        .context("Failed to open overlay")?;
    let mut app = Application::new(config, Arc::new(overlay)).context("Failed to create peer")?;

    match args.command {
        Command::Serve { publish_all } => {
            app.start().await.context("Failed to start content server")?;
            if publish_all {
                for (name, outcome) in app.publish_all().await? {
                    report_publish(&name, outcome);
                }
            }
            serve_until_interrupted(&mut app).await?;
        }
        Command::Publish { name, serve } => {
            app.start().await.context("Failed to start content server")?;
            let outcome = app.publish(&name).await;
            let published = outcome.as_ref().map(|o| o.is_success()).unwrap_or(false);
            report_publish(&name, outcome);
            if serve && published {
                serve_until_interrupted(&mut app).await?;
            } else {
                app.stop().await;
            }
        }
        Command::Search { field, term, download } => {
            let Some(info) = app.search(field.as_str(), &term).await else {
                println!("No results for {} = {:?}", field.as_str(), term);
                return Ok(());
            };
            display_result(&info);

            if download {
                let results = app.download(info.url_list(), &info.files).await;
                let mut failed = 0;
                for file in &info.files {
                    if results.get(&file.name).copied().unwrap_or(false) {
                        println!("Downloaded {} to {}", file.name, app.config().download_dir.display());
                    } else {
                        println!("Failed to download {}", file.name);
                        failed += 1;
                    }
                }
                if failed > 0 {
                    return Err(ShareError::transfer_error(format!("{} file(s) could not be downloaded", failed)).into());
                }
            }
        }
    }

    info!("p2pfs finished");
    Ok(())
}

/// Initialize logging based on verbosity settings
fn init_logging(args: &CliArgs) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.is_verbose() {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }

    debug!("Logging initialized successfully");
}

/// Serve until Ctrl-C, then shut the content server down
async fn serve_until_interrupted(app: &mut Application) -> Result<()> {
    println!("Serving at {} (Ctrl-C to stop)", app.provider_url());
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    info!("Interrupted, shutting down");
    app.stop().await;
    Ok(())
}

/// Print the result of publishing one file
fn report_publish(name: &str, outcome: Result<PublishOutcome>) {
    match outcome {
        Ok(PublishOutcome::Published { cid, writes }) => {
            println!("Published {} as {} ({} records)", name, cid, writes.len());
        }
        Ok(PublishOutcome::AlreadyPublished { cid }) => {
            println!("{} is already published as {}", name, cid);
        }
        Ok(PublishOutcome::Failed { cid, writes }) => {
            let failed: Vec<&str> = writes.iter().filter(|w| !w.succeeded).map(|w| w.key.as_str()).collect();
            warn!("Publish of {} incomplete", name);
            println!("Publishing {} as {} was incomplete; failed records: {:?}", name, cid, failed);
        }
        Err(e) => {
            error!("Failed to publish {}: {:#}", name, e);
            println!("Failed to publish {}: {}", name, e);
        }
    }
}

/// Display a search result
fn display_result(info: &MetaInfo) {
    let field = |name: &str| info.metadata.get(name).unwrap_or("").to_string();
    println!("File Name: {}", field("filename"));
    println!("Artist: {}", field("artist"));
    println!("Song Title: {}", field("title"));
    println!("Album: {}", field("album"));
    println!("Files:");
    for file in &info.files {
        println!("  {} ({})", file.name, file.cid);
    }
    println!("Providers:");
    for url in info.url_list() {
        println!("  {}", url);
    }
}
