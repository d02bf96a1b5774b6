use tracing::{error, info};

use filevault::{Config, Database, FileService, WebServer};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = filevault::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        filevault::logging::init_console_only(&config.logging.level);
    }

    info!("FileVault - chunked file storage service");

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let db = match Database::open(&config.database.path).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let files = FileService::new(&db, config.files.clone());

    let server = match WebServer::new(&config, files) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to create web server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        error!("Web server error: {}", e);
        std::process::exit(1);
    }
}
