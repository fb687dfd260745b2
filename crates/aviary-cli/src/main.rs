//! Aviary server binary: flag parsing, tracing init, runtime bootstrap.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use aviary_gateway::{run_gateway_server, AppState, GatewayConfig};
use aviary_roster::HttpAccountLinker;
use aviary_supervisor::SupervisorConfig;

#[derive(Debug, Parser)]
#[command(name = "aviaryd", about = "Multi-tenant bot hosting control plane")]
struct Cli {
    /// Address the HTTP control plane binds to.
    #[arg(long, default_value = "127.0.0.1:8750")]
    bind: SocketAddr,

    /// Root directory for the record database and per-tenant bot storage.
    #[arg(long, env = "AVIARY_STATE_DIR", default_value = ".aviary")]
    state_dir: PathBuf,

    /// Template directory cloned for every new bot instance.
    #[arg(long, env = "AVIARY_TEMPLATE_DIR", default_value = "bot-template")]
    template_dir: PathBuf,

    /// Base URL of the external account-linking service.
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    friend_api_base: String,

    /// Hard timeout for account-linking calls, in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    friend_api_timeout_ms: u64,

    /// Entry-point file expected inside every bot instance directory.
    #[arg(long, default_value = "main.py")]
    bot_entry_point: String,

    /// Interpreter used to launch the entry point; pass an empty string to
    /// execute the entry point directly.
    #[arg(long, default_value = "python3")]
    bot_launcher: String,

    /// Grace interval between spawning a bot and probing its liveness.
    #[arg(long, default_value_t = 2_000)]
    start_grace_ms: u64,

    /// Bounded wait for graceful bot termination before escalating.
    #[arg(long, default_value_t = 3_000)]
    stop_timeout_ms: u64,

    /// Reserved administrator login, created at startup when absent.
    #[arg(long, env = "AVIARY_ADMIN_LOGIN", default_value = "warden")]
    admin_login: String,

    /// Administrator key.
    #[arg(long, env = "AVIARY_ADMIN_KEY", default_value = "change-me")]
    admin_key: String,
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let linker = Arc::new(HttpAccountLinker::new(
        cli.friend_api_base.clone(),
        Duration::from_millis(cli.friend_api_timeout_ms),
    )?);
    let supervisor_config = SupervisorConfig {
        entry_point: cli.bot_entry_point.clone(),
        launcher: (!cli.bot_launcher.is_empty()).then(|| cli.bot_launcher.clone()),
        start_grace: Duration::from_millis(cli.start_grace_ms),
        stop_timeout: Duration::from_millis(cli.stop_timeout_ms),
    };
    let config = GatewayConfig {
        bind: cli.bind,
        state_dir: cli.state_dir,
        template_dir: cli.template_dir,
        admin_login: cli.admin_login,
        admin_key: cli.admin_key,
    };

    let state = Arc::new(AppState::new(config, supervisor_config, linker));
    run_gateway_server(state).await
}
