use actix_web::{
    http::StatusCode,
    middleware::{Condition, ErrorHandlers, Logger},
    web, App, HttpServer,
};
use clap::Parser;
use env_logger::Env;
use log::info;

use filedock::api::{self, AppState};
use filedock::config::{Args, Config};
use filedock::error::attach_error_detail;
use filedock::size::format_size;
use filedock::store::ensure_directory;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Config::from(args);

    // Create store and staging directories if they don't exist
    ensure_directory(&config.store_dir)?;
    ensure_directory(&config.temp_dir)?;

    let (host, port) = config.bind_addr();
    info!("Starting file server at http://{host}:{port}");
    info!("Store directory: {}", config.store_dir.display());
    info!("Maximum file size: {}", format_size(config.max_file_size));
    if config.allowed_extensions.is_empty() {
        info!("Allowed extensions: any");
    } else {
        info!("Allowed extensions: {}", config.allowed_extensions.join(", "));
    }
    if config.debug {
        info!("Debug mode enabled");
    }

    let debug = config.debug;
    let state = web::Data::new(AppState::new(config));

    HttpServer::new(move || {
        App::new()
            .wrap(Condition::new(
                debug,
                ErrorHandlers::new()
                    .handler(StatusCode::INTERNAL_SERVER_ERROR, attach_error_detail),
            ))
            .wrap(Logger::default())
            .configure(api::configure(state.clone()))
    })
    .bind((host, port))?
    .run()
    .await?;

    info!("Server stopped");
    Ok(())
}
