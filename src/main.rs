use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use klippd::auth::CookieCredentials;
use klippd::pipeline::YtDlpFetcher;
use klippd::resolver::YtDlpProbe;
use klippd::scheduler::CleanupPolicy;
use klippd::server::{self, AppState};
use klippd::ytdlp::YtDlp;
use klippd::{utils, ArtifactStore, CleanupScheduler, ClipPipeline, Cli, Commands, Config, MediaResolver};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    match cli.command {
        Commands::Serve { host, port, work_dir } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(work_dir) = work_dir {
                config.clip.work_dir = work_dir;
            }
            config.validate()?;

            serve(config).await?;
        }
        Commands::Cleanup { work_dir, max_age_secs } => {
            let config = load_config(cli.config.as_deref())?;
            let store = Arc::new(ArtifactStore::new(work_dir.unwrap_or(config.clip.work_dir)));
            let policy = CleanupPolicy {
                max_age_secs: max_age_secs.unwrap_or(config.cleanup.max_age_secs),
                ..config.cleanup
            };

            let report = CleanupScheduler::new(store.clone(), policy)
                .sweep()
                .await
                .with_context(|| format!("Failed to sweep {}", store.root().display()))?;

            for name in &report.removed {
                tracing::debug!("Removed {}", name);
            }
            println!("Removed {} file(s) from {}", report.removed.len(), store.root().display());
            if report.failed > 0 {
                eprintln!("Failed to remove {} file(s)", report.failed);
            }
        }
        Commands::Config { show, init } => {
            let path = cli
                .config
                .clone()
                .or_else(Config::config_path)
                .unwrap_or_else(|| PathBuf::from("config.yaml"));

            if init {
                Config::default().save_to(&path)?;
                println!("Wrote default configuration to {}", path.display());
            } else if show {
                load_config(cli.config.as_deref())?.display();
            } else {
                println!("Configuration file: {}", path.display());
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "klippd=debug,tower_http=debug"
    } else {
        "klippd=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn serve(config: Config) -> Result<()> {
    // Missing tools are reported but not fatal; /status shows them too
    let missing_deps = utils::check_dependencies(&config.tools.yt_dlp, &config.tools.ffmpeg);
    for dep in &missing_deps {
        tracing::warn!("Dependency not found: {}", dep);
    }

    let cookies = CookieCredentials::load_from_env(&config.auth.cookies_env, &config.cookies_path())?;
    match &cookies {
        Some(c) if c.is_valid() => tracing::info!("Using cookies from {}", c.path().display()),
        Some(c) => tracing::warn!("Cookie file {} does not look like Netscape format", c.path().display()),
        None => tracing::info!("No cookies configured, requests will be anonymous"),
    }

    let yt_dlp = YtDlp::new(config.tools.yt_dlp.clone(), config.tool_timeout());
    if let Some(version) = yt_dlp.version().await {
        tracing::info!("Using yt-dlp {}", version);
    }

    let probe = YtDlpProbe::new(yt_dlp.clone()).with_cookies(cookies.clone());
    let fetcher = YtDlpFetcher::new(yt_dlp, config.transcode_options());
    let store = Arc::new(ArtifactStore::new(config.clip.work_dir.clone()));

    let pipeline = ClipPipeline::new(
        MediaResolver::new(Arc::new(probe)),
        Arc::new(fetcher),
        store.clone(),
    )
    .with_cookies(cookies);

    let scheduler = CleanupScheduler::new(store, config.cleanup);
    scheduler.clone().spawn();

    let state = AppState::new(Arc::new(pipeline), scheduler, config.tools.clone());
    let app = server::create_router(state, &config.server.cors_origins);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Klippd listening on http://{}", addr);
    tracing::info!("Working directory: {}", config.clip.work_dir.display());

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
