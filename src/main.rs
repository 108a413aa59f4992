use tracing::{error, info};

use stowage::{Config, Database, StaticDirectories};

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
    if let Err(e) = stowage::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        stowage::logging::init_console_only(&config.logging.level);
    }

    info!("stowage - upload intake and file persistence");

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
    match db.schema_version().await {
        Ok(version) => info!("Database ready (schema v{})", version),
        Err(e) => error!("Failed to read schema version: {}", e),
    }

    if let Err(e) = std::fs::create_dir_all(&config.uploads.root) {
        error!("Failed to prepare uploads root {}: {}", config.uploads.root, e);
        std::process::exit(1);
    }
    info!(
        "Uploads go to {} (max {} file(s) of {} bytes per field)",
        config.uploads.root, config.uploads.max_files, config.uploads.max_file_size
    );

    let dirs = StaticDirectories::from_config(&config.static_files);
    for key in dirs.keys() {
        match dirs.resolve(&key) {
            Ok(path) => info!("Static directory {} -> {:?}", key, path),
            Err(e) => error!("{}", e),
        }
    }
}
