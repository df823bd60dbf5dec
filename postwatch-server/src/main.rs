use std::{io::Write, path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use postwatch_core::{
    Catalog, CatalogBuilder, ChannelSubscriber, Dispatcher, LifecycleController,
    RemoteStore, TeardownReport, build_registry,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use postwatch_server::{
    AppState,
    drive::{
        DriveClient, OAuthTokenSource,
        auth::{ClientSecrets, exchange_code, save_token},
    },
    infra::{
        config::{Config, ConfigLoader, ConfigLoaderOptions, ConfigWarnings},
        shutdown::{ShutdownReason, wait_for_shutdown},
        startup::{ProdStartupHooks, StartupHooks},
    },
    pipeline::PipelineRefresher,
    routes,
};

#[derive(Parser, Debug)]
#[command(name = "postwatch-server")]
#[command(
    version,
    about = "Republishes Drive-hosted posts whenever their documents change"
)]
struct Cli {
    #[command(flatten)]
    serve: ServeArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args, Debug, Clone)]
struct ServeArgs {
    /// Path to a postwatch.toml configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a .env file loaded before reading the environment
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Override the listen address
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port
    #[arg(long, short)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Subscribe to every post and serve notifications (default)
    Serve,
    /// List the posts that would be watched, then exit without subscribing
    Catalog,
    /// Authorize read-only Drive access once and write the token file
    Auth,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.serve)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(config).await,
        Command::Catalog => run_catalog(config).await,
        Command::Auth => run_auth(config).await,
    }
}

fn load_config(args: &ServeArgs) -> Result<Config> {
    let load = ConfigLoader::with_options(ConfigLoaderOptions {
        config_path: args.config.clone(),
        env_file: args.env_file.clone(),
    })
    .load()
    .context("failed to load configuration")?;

    log_config_warnings(&load.warnings);

    let mut config = load.config;
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    info!(
        config_path = ?config.metadata.config_path,
        env_file_loaded = config.metadata.env_file_loaded,
        root_folder = %config.drive.root_folder,
        callback_address = %config.channels.callback_address,
        "configuration loaded"
    );
    Ok(config)
}

fn log_config_warnings(warnings: &ConfigWarnings) {
    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => warn!(hint = %hint, "{}", warning.message),
            None => warn!("{}", warning.message),
        }
    }
}

async fn connect_drive(config: &Config) -> Result<Arc<dyn RemoteStore>> {
    let http = DriveClient::http_client(&config.drive)?;
    let tokens = OAuthTokenSource::from_files(
        http.clone(),
        &config.drive.credentials_path,
        &config.drive.token_path,
    )
    .await
    .context("failed to load drive credentials")?;
    let client = DriveClient::new(http, &config.drive, Arc::new(tokens))?;
    Ok(Arc::new(client))
}

async fn build_catalog(config: &Config, store: Arc<dyn RemoteStore>) -> Result<Catalog> {
    let catalog = CatalogBuilder::new(store, config.catalog_options())
        .build()
        .await
        .context("failed to enumerate posts")?;
    for skipped in &catalog.skipped {
        warn!(path = %skipped.path, reason = ?skipped.reason, "skipped post folder");
    }
    Ok(catalog)
}

async fn run_catalog(config: Config) -> Result<()> {
    let store = connect_drive(&config).await?;
    let catalog = build_catalog(&config, store).await?;

    let mut out = std::io::stdout().lock();
    for resource in &catalog.resources {
        let asset = resource
            .asset
            .as_ref()
            .map(|asset| asset.name.as_str())
            .unwrap_or("-");
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            resource.key,
            resource.filename(),
            resource.content_type(),
            asset
        )?;
    }
    info!(posts = catalog.len(), skipped = catalog.skipped.len(), "catalog listed");
    Ok(())
}

async fn run_auth(config: Config) -> Result<()> {
    let secrets = ClientSecrets::from_file(&config.drive.credentials_path)
        .await
        .context("failed to load drive client credentials")?;
    let consent_url = secrets.consent_url("state-token")?;

    {
        let mut out = std::io::stdout().lock();
        writeln!(out, "Go to the following link in your browser, then type the code:")?;
        writeln!(out, "{consent_url}")?;
        out.flush()?;
    }

    let mut code = String::new();
    std::io::stdin()
        .read_line(&mut code)
        .context("failed to read authorization code")?;

    let http = DriveClient::http_client(&config.drive)?;
    let token = exchange_code(&http, &secrets, &code)
        .await
        .context("failed to exchange authorization code")?;
    save_token(&config.drive.token_path, &token).await?;

    info!(token_path = %config.drive.token_path.display(), "saved drive token");
    Ok(())
}

async fn run_server(config: Config) -> Result<()> {
    let config = Arc::new(config);
    let store = connect_drive(&config).await?;
    let catalog = build_catalog(&config, store.clone()).await?;

    let subscriber = ChannelSubscriber::new(store.clone(), config.channel_options());
    let (registry, report) = build_registry(&catalog, &subscriber).await;
    for (resource, err) in &report.failed {
        warn!(post = %resource.key, error = %err, "post is not watched");
    }
    if report.subscribed == 0 {
        warn!("no posts are watched; the server will only answer health checks");
    }
    let registry = Arc::new(registry);

    let refresher = Arc::new(PipelineRefresher::new(store.clone(), config.pipeline.clone()));
    let dispatcher = Dispatcher::new(registry.clone(), refresher)
        .with_guard(config.debounce_guard())
        .with_refresh_timeout(config.dispatch.refresh_timeout);
    let lifecycle = Arc::new(LifecycleController::new(registry, store));

    let state = AppState::new(config.clone(), dispatcher, lifecycle);
    ProdStartupHooks.run(&state).await?;

    let listener = tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| {
            format!("failed to bind {}:{}", config.server.host, config.server.port)
        })?;
    let addr = listener.local_addr()?;
    info!(%addr, channels = state.registry().len(), "listening for push notifications");

    axum::serve(listener, routes::create_app(state.clone()))
        .with_graceful_shutdown(wait_for_shutdown(state.shutdown.clone()))
        .await
        .context("server error")?;

    drain_tasks(&state).await;

    let report = match state.shutdown.reason() {
        Some(ShutdownReason::Teardown(report)) => report,
        // Interrupted without /api/stop: channels are still open.
        _ => state.lifecycle.stop_all().await,
    };
    finish(report)
}

async fn drain_tasks(state: &AppState) {
    state.tasks.close();
    let grace = state.config.shutdown.grace;
    info!(
        in_flight = state.tasks.len(),
        grace_secs = grace.as_secs(),
        "waiting for refreshes to finish"
    );
    if tokio::time::timeout(grace, state.tasks.wait()).await.is_err() {
        warn!(abandoned = state.tasks.len(), "refreshes still running at shutdown");
    }
}

fn finish(report: TeardownReport) -> Result<()> {
    if report.all_stopped() {
        info!(stopped = report.stopped.len(), "exiting");
        return Ok(());
    }
    for failure in &report.failures {
        error!(
            channel_id = %failure.channel_id,
            post = %failure.post,
            error = %failure.error,
            "channel left open"
        );
    }
    bail!(
        "{} of {} channels could not be stopped",
        report.failures.len(),
        report.attempted
    )
}
