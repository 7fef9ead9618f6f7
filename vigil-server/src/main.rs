use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};
use vigil_core::chat::{ChatClient, SlackChatClient};
use vigil_core::VigilConfig;

use vigil_server::http;
use vigil_server::subsystems::reporter::{self, ReporterDeps};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "vigil.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Init logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Load config
    let config = match VigilConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Connect to DB
    let pool = match vigil_core::db::create_pool(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match vigil_core::db::health_check(&pool).await {
            Ok(v) => println!("✅ PostgreSQL connected: {}", v),
            Err(e) => {
                println!("❌ PostgreSQL connection failed: {}", e);
                std::process::exit(1);
            }
        }

        println!("✅ Vigil DB health check passed");
        return Ok(());
    }

    // Missing credentials are fatal at startup, never per-tick
    let generator = match reporter::create_generator(&config) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Failed to initialize generation client: {}", e);
            std::process::exit(1);
        }
    };

    let chat: Option<Arc<dyn ChatClient>> = if config.chat.enabled {
        match SlackChatClient::new(None) {
            Ok(c) => Some(Arc::new(c)),
            Err(e) => {
                eprintln!("Chat is enabled but the chat client failed to initialize: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        None
    };

    let deps = ReporterDeps {
        pool: pool.clone(),
        config: config.clone(),
        generator,
        chat,
    };

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    // Spawn HTTP REST API server if enabled
    if config.http.enabled {
        let http_deps = deps.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = http::start_http_server(http_deps, http_shutdown).await {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    // The reporting loop is the foreground task; it returns on shutdown
    reporter::run_reporting_loop(deps, tx.subscribe()).await;

    Ok(())
}
