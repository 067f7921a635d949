//! Standalone capture server binary
//!
//! ```bash
//! # Serve captures with the default config
//! article-contents-server
//!
//! # Use a specific config file
//! article-contents-server --config /path/to/config.toml
//!
//! # Print every stored capture as JSON and exit
//! article-contents-server --dump
//! ```

use article_contents::{
    load_study_data, ArticleContentsStudy, CaptureRecord, CaptureServer, Config, Database,
    MessageRouter, RecordingRegistrar,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct Args {
    config_path: Option<PathBuf>,
    dump: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        config_path: None,
        dump: false,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = iter
                    .next()
                    .ok_or("--config requires a path argument")?;
                args.config_path = Some(PathBuf::from(path));
            }
            "--dump" | "-d" => args.dump = true,
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args()?;

    let (config, config_source) = match &args.config_path {
        Some(path) => Config::load_from_path(path.clone()),
        None => Config::load(),
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
    config_source.log();

    let database = Database::open(&config.storage.db_path)?;

    if args.dump {
        let data = load_study_data(&database).await?;
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    let router = Arc::new(MessageRouter::new());
    let study = ArticleContentsStudy::new(
        database,
        Arc::clone(&router),
        Arc::new(RecordingRegistrar::new()),
    );

    study.run_study(config.study.clone()).await?;

    study.register_listener(|record: &CaptureRecord| {
        info!("Captured {} ({} chars) from tab {}", record.url, record.text.len(), record.tab_id);
        Ok(())
    });

    let server = CaptureServer::new(config.server.clone(), router);
    info!("Database: {:?}", config.storage.db_path);

    // Handle shutdown gracefully
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                eprintln!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    // Clean up socket file
    if server.socket_path().exists() {
        std::fs::remove_file(server.socket_path())?;
    }

    Ok(())
}
