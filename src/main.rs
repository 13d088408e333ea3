use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;

use phq_screen::analysis::{
    BackgroundAnalyzer, EmotionClassifier, LexiconClassifier, NeutralClassifier,
    SuicideRiskClassifier,
};
use phq_screen::config::ScreeningConfig;
use phq_screen::console;
use phq_screen::dashboard::{DashboardRouteState, SharedStateStore, dashboard_routes, spawn_poller};
use phq_screen::error::ConfigError;
use phq_screen::llm::{LlmConfig, RetryPolicy, create_provider};
use phq_screen::screening::ScreeningSession;

const USAGE: &str = "usage: phq-screen [chat|dashboard|serve]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = ScreeningConfig::from_env().context("invalid configuration")?;
    let store = Arc::new(SharedStateStore::new(config.state_path.clone()));
    let mode = std::env::args().nth(1).unwrap_or_else(|| "chat".to_string());

    eprintln!("PHQ Screen v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Shared state: {}", config.state_path.display());

    match mode.as_str() {
        "chat" => chat(config, store).await,
        "dashboard" => {
            serve_in_background(&config, store.clone());
            watch_dashboard(&config, store).await
        }
        "serve" => serve(&config, store).await,
        other => anyhow::bail!("unknown command '{other}'\n{USAGE}"),
    }
}

async fn chat(config: ScreeningConfig, store: Arc<SharedStateStore>) -> anyhow::Result<()> {
    let key_var = config.backend.api_key_var();
    let api_key = std::env::var(key_var)
        .map_err(|_| ConfigError::MissingEnvVar(key_var.to_string()))
        .with_context(|| format!("export {key_var}=... to chat"))?;

    let llm = create_provider(&LlmConfig {
        backend: config.backend,
        api_key: secrecy::SecretString::from(api_key),
        model: config.model.clone(),
        retry: RetryPolicy::default(),
    })?;

    let (emotion, risk): (Arc<dyn EmotionClassifier>, Arc<dyn SuicideRiskClassifier>) =
        if config.analysis_enabled {
            let lexicon = Arc::new(LexiconClassifier::default_rules()?);
            (lexicon.clone(), lexicon)
        } else {
            (Arc::new(NeutralClassifier), Arc::new(NeutralClassifier))
        };
    let analyzer = BackgroundAnalyzer::new(emotion, risk, store.clone(), config.analysis_enabled);

    eprintln!("   Model: {}", config.model);
    eprintln!(
        "   Analysis: {}",
        if analyzer.is_enabled() { "enabled" } else { "disabled" }
    );
    eprintln!("   Type 'quit' to leave.\n");

    let session = ScreeningSession::new(llm, store, analyzer, &config);
    let mut stdout = std::io::stdout();
    console::run_chat(&session, console::stdin_lines(), &mut stdout).await?;
    Ok(())
}

/// Print a fresh dashboard each time the polled view changes.
async fn watch_dashboard(config: &ScreeningConfig, store: Arc<SharedStateStore>) -> anyhow::Result<()> {
    let (mut rx, _poller) = spawn_poller(store, config.poll_interval);
    loop {
        rx.changed().await.context("dashboard poller stopped")?;
        match rx.borrow_and_update().as_ref() {
            Some(view) => println!("{}\n", view.render_text()),
            None => println!("No active session.\n"),
        }
    }
}

fn dashboard_app(store: Arc<SharedStateStore>) -> axum::Router {
    dashboard_routes(DashboardRouteState { store }).layer(CorsLayer::permissive())
}

async fn serve(config: &ScreeningConfig, store: Arc<SharedStateStore>) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", config.dashboard_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind dashboard port {addr}"))?;
    eprintln!("   Dashboard API: http://{addr}/api/dashboard\n");
    tracing::info!(port = config.dashboard_port, "Dashboard server started");
    axum::serve(listener, dashboard_app(store)).await?;
    Ok(())
}

fn serve_in_background(config: &ScreeningConfig, store: Arc<SharedStateStore>) {
    let config = config.clone();
    tokio::spawn(async move {
        if let Err(e) = serve(&config, store).await {
            tracing::error!(error = %e, "Dashboard server failed");
        }
    });
}
