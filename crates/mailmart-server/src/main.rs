mod config;
mod middleware;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use mailmart_bot::{Bot, BotConfig};
use mailmart_db::Database;
use mailmart_gateway::dispatcher::Dispatcher;

use crate::config::Config;
use crate::routes::AppStateInner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mailmart=debug,mailmart_bot=debug,mailmart_db=debug,mailmart_gateway=debug,tower_http=debug"
                    .into()
            }),
        )
        .init();

    // Config
    let config = Config::from_env()?;
    if !config.bridge_token_is_usable() {
        eprintln!("FATAL: MAILMART_BRIDGE_TOKEN is unset or still a placeholder.");
        eprintln!("       The messaging bridge authenticates with this token.");
        eprintln!("       Set it in your .env file and restart.");
        std::process::exit(1);
    }

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);
    info!("Ledger opened at {}", config.db_path.display());

    let bot = Bot::new(
        db,
        BotConfig {
            admin_id: config.admin_id,
            channel_link: config.channel_link.clone(),
            max_credit: config.max_credit,
        },
    );
    let dispatcher = Dispatcher::new();

    // Promote the admin and queue the greeting for the first bridge
    let ready = bot.startup().await?;
    dispatcher.publish_all(ready);
    info!("Admin {} promoted", config.admin_id);

    let state = Arc::new(AppStateInner {
        bot,
        dispatcher,
        bridge_token: config.bridge_token.clone(),
    });

    let app = routes::router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Mailmart listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
