use clap::Parser;
use funnel_core::config::StoreBackend;
use funnel_core::FunnelConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use funnel_server::http::{self, HttpState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "funnel.toml")]
    config: String,

    /// Print which integrations are configured and exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = match FunnelConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    if args.health {
        return health_report(&config).await;
    }

    if config.webhook.secret().is_none() {
        tracing::warn!("ELEVENLABS_WEBHOOK_SECRET is not set; webhook requests will be rejected");
    }

    let state = HttpState::from_config(config)?;

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                let _ = shutdown_tx.send(());
            }
            Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    http::start_http_server(state, tx.subscribe()).await?;

    Ok(())
}

async fn health_report(config: &FunnelConfig) -> anyhow::Result<()> {
    let mark = |ok: bool| if ok { "✅" } else { "❌" };
    let has_key = |key: &Option<String>| key.as_deref().is_some_and(|k| !k.is_empty());

    println!("{} Webhook secret", mark(config.webhook.secret().is_some()));
    println!(
        "{} Store ({:?} backend)",
        mark(config.store.is_configured()),
        config.store.backend
    );
    println!("{} EmailJS", mark(config.email.is_configured()));
    println!("{} Slack webhook", mark(config.chat.is_configured()));
    println!("{} OpenAI API key", mark(has_key(&config.openai.api_key)));
    println!("{} Gemini API key", mark(has_key(&config.gemini.api_key)));

    if config.store.backend == StoreBackend::Postgres {
        let pool = funnel_core::db::create_lazy_pool(&config.store)?;
        match funnel_core::db::health_check(&pool).await {
            Ok(v) => println!("✅ PostgreSQL connected: {}", v),
            Err(e) => {
                println!("❌ PostgreSQL connection failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    if config.webhook.secret().is_none() {
        std::process::exit(1);
    }

    println!("✅ Funnel health check passed");
    Ok(())
}
