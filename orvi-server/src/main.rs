use anyhow::{Context, Result};
use clap::Parser;
use orvi_captcha::solver_from_settings;
use orvi_common::observability::{LogConfig, init_logging};
use orvi_config::{OrviConfig, OrviConfigLoader, load_coordinates_file};
use orvi_drivers::orvi_browser::driver::WebDriverSessionFactory;
use orvi_engine::{CoordinateMap, Credentials, EngineDeps, ExecutionService};
use orvi_runtime::{OrviHandle, OrviRuntime};
use orvi_server::{AppState, router};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "orvi-server", about = "Runs declarative browser sequences over HTTP")]
struct Args {
    /// YAML configuration file; missing is fine when everything comes from ORVI_* variables.
    #[arg(long, env = "ORVI_CONFIG", default_value = "orvi.yaml")]
    config: PathBuf,

    /// Listen address, overriding `server.bind`.
    #[arg(long)]
    bind: Option<String>,

    /// Listen port, replacing the port of the bind address.
    #[arg(long)]
    port: Option<u16>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = OrviConfigLoader::new()
        .with_optional_file(&args.config)
        .load()
        .with_context(|| format!("loading {}", args.config.display()))?;

    let mut log = LogConfig::from_settings("orvi-server", &config.logging);
    if args.verbose {
        log.default_filter = "debug".to_string();
    }
    let log_path = init_logging(log)?;
    info!(target: "server.http", log = %log_path.display(), "logging initialised");

    let runtime = OrviRuntime::build("orvi-worker", config.server.worker_threads)?;
    let grace = config.server.shutdown_grace();
    let handle = runtime.handle();
    let result = runtime.block_on(serve(args, config, handle));
    runtime.shutdown(grace);
    result
}

fn bind_address(configured: &str, bind: Option<String>, port: Option<u16>) -> String {
    let base = bind.unwrap_or_else(|| configured.to_string());
    match port {
        Some(port) => {
            let host = base.rsplit_once(':').map_or(base.as_str(), |(host, _)| host);
            format!("{host}:{port}")
        }
        None => base,
    }
}

async fn serve(args: Args, config: OrviConfig, handle: OrviHandle) -> Result<()> {
    let coordinates = match &config.coordinates_file {
        Some(path) => CoordinateMap::new(load_coordinates_file(path)?)
            .with_context(|| format!("coordinate file {}", path.display()))?,
        None => CoordinateMap::default(),
    };
    let credentials = Credentials::from_env().with_overrides(config.credentials.clone());
    let solver = solver_from_settings(&config.captcha)?;

    let service = ExecutionService::new(EngineDeps {
        settings: config.engine.clone(),
        capacity: config.capacity.clone(),
        factory: Arc::new(WebDriverSessionFactory::new(config.browser.clone())),
        solver,
        screenshot_dir: config.artifacts.screenshot_dir.clone(),
        credentials,
        coordinates,
    });
    info!(
        target: "server.http",
        max_sessions = config.capacity.max_sessions,
        screenshots = %config.artifacts.screenshot_dir.display(),
        "engine ready"
    );

    let app = router(AppState::new(service, handle.run_token()));
    let addr = bind_address(&config.server.bind, args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(target: "server.http", addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            handle.shutdown_signal().await;
            info!(target: "server.http", "shutting down");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_flag_replaces_configured_port() {
        assert_eq!(bind_address("0.0.0.0:8000", None, None), "0.0.0.0:8000");
        assert_eq!(bind_address("0.0.0.0:8000", None, Some(9100)), "0.0.0.0:9100");
        assert_eq!(
            bind_address("0.0.0.0:8000", Some("127.0.0.1:7000".into()), Some(7001)),
            "127.0.0.1:7001"
        );
        assert_eq!(bind_address("localhost", None, Some(80)), "localhost:80");
    }
}
