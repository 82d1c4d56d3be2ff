//! BahnCy shell binary.
//!
//! Starts a headless voice shell against the simulated platform with
//! structured logging, reading commands from stdin until EOF, `quit`, or
//! Ctrl+C.

use bahncy_app::config;
use bahncy_app::App;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "bahncy.toml";

/// Picks the config file: first CLI argument, then `BAHNCY_CONFIG_PATH`, then
/// `bahncy.toml` in the working directory.
fn resolve_config_path(
    cli_arg: Option<String>,
    env_var: Option<String>,
) -> (String, &'static str) {
    let non_blank = |value: &String| !value.trim().is_empty();
    if let Some(path) = cli_arg.filter(non_blank) {
        (path, "cli-arg")
    } else if let Some(path) = env_var.filter(non_blank) {
        (path, "env-var")
    } else {
        (DEFAULT_CONFIG_PATH.to_string(), "default")
    }
}

#[tokio::main]
async fn main() {
    let (config_path, config_source) = resolve_config_path(
        std::env::args().nth(1),
        std::env::var("BAHNCY_CONFIG_PATH").ok(),
    );
    let config = config::load_config(Some(&config_path)).expect("failed to load configuration");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr so stdout stays a clean reply channel.
    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    tracing::info!(
        source = config_source,
        path = %config_path,
        agent_id = %config.agent.id,
        "resolved startup configuration path"
    );

    let app = App::new(&config);
    let controller = app.controller.clone();
    let shell = app.into_shell();

    tokio::select! {
        result = shell.run(BufReader::new(tokio::io::stdin()), tokio::io::stdout()) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "shell input failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, ending conversation");
            controller.end().await;
        }
    }

    tracing::info!("bahncy shell shut down");
}
