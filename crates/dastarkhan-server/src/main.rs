use std::env;

use dastarkhan_server::ServerBuilder;
use dastarkhan_server::config::loader::{DEFAULT_CONFIG_FILE, load_config};

#[tokio::main]
async fn main() {
    // .env is optional; only report it when it exists but cannot be read
    if let Err(e) = dotenvy::dotenv()
        && !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
    {
        eprintln!("Warning: Failed to load .env file: {e}");
    }

    dastarkhan_server::observability::init_tracing();

    let config_path = resolve_config_path();
    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    tracing::info!(path = %config_path, "Configuration loaded");
    dastarkhan_server::observability::apply_logging_level(&cfg.logging.level);

    let server = match ServerBuilder::new(cfg).build().await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Server initialization failed: {e:#}");
            std::process::exit(2);
        }
    };

    if let Err(err) = server.run().await {
        eprintln!("Server error: {err}");
        std::process::exit(1);
    }
}

/// `--config <path>`, then `DASTARKHAN_CONFIG`, then `dastarkhan.toml`.
fn resolve_config_path() -> String {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config"
            && let Some(path) = args.next()
        {
            return path;
        }
    }

    if let Ok(path) = env::var("DASTARKHAN_CONFIG")
        && !path.is_empty()
    {
        return path;
    }

    DEFAULT_CONFIG_FILE.to_string()
}
