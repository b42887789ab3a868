mod assets;
mod config;
mod db;
mod detection;
mod error;
mod logging;
mod qa;
mod request_id;
mod routes;
mod storage;

use actix_cors::Cors;
use actix_web::http::header::{self, HeaderName};
use actix_web::{web, App, HttpServer};
use assets::asset_service::AssetService;
use config::Settings;
use db::asset_repository::AssetRepository;
use detection::adapter::DetectionAdapter;
use detection::annotate::Annotator;
use detection::backends::load_detector;
use detection::draw::Draw;
use request_id::RequestIdMiddleware;
use routes::{configure_routes, not_found};
use storage::local_storage::LocalStorage;

fn startup_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::other(format!("{}: {}", context, err))
}

/// Browser clients may send their own `X-Request-ID` and read it back.
fn cors() -> Cors {
    let request_id_header = HeaderName::from_static(request_id::REQUEST_ID_HEADER);
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE, request_id_header.clone()])
        .expose_headers(vec![request_id_header])
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let settings = Settings::load().map_err(|e| startup_error("Invalid configuration", e))?;
    logging::init(&settings.app_name);

    if let Ok(current_dir) = std::env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    settings
        .ensure_dirs()
        .map_err(|e| startup_error("Failed to prepare data directories", e))?;

    let db_repo = AssetRepository::connect(&settings.database_url)
        .await
        .map_err(|e| startup_error("Failed to open asset database", e))?;
    db_repo
        .migrate()
        .await
        .map_err(|e| startup_error("Failed to create assets table", e))?;
    match db_repo.count_assets().await {
        Ok(count) => log::info!("Asset store ready with {} assets", count),
        Err(e) => log::warn!("Could not count stored assets: {}", e),
    }

    let storage = LocalStorage::new(settings.upload_dir.clone(), settings.max_upload_bytes);
    let asset_service = AssetService::new(db_repo, storage);

    // Loaded once; every worker shares the same handle.
    let detector = load_detector(&settings).map_err(|e| {
        log::error!("Failed to load model at startup: {}", e);
        startup_error("Model loading failed", e)
    })?;
    log::info!(
        "Loaded {} detector ({})",
        detector.model_name(),
        settings.model_backend
    );

    let draw = Draw::from_font_path(settings.font_path.as_deref())
        .map_err(|e| startup_error("Failed to load label font", e))?;
    if settings.font_path.is_none() {
        log::warn!("FONT_PATH not set, annotated images will have boxes without labels");
    }
    let annotator = Annotator::new(settings.output_dir.clone(), draw);
    log::info!(
        "Writing annotated images under {}",
        annotator.output_dir().display()
    );

    let asset_service = web::Data::new(asset_service);
    let adapter = web::Data::new(DetectionAdapter::new(detector, annotator));

    if settings.enable_debug_endpoint {
        log::warn!("Debug detection endpoint is enabled");
    }

    let bind_address = settings.bind_address();
    log::info!("Starting server on {}", bind_address);

    let output_dir = settings.output_dir.clone();
    let enable_debug = settings.enable_debug_endpoint;

    HttpServer::new(move || {
        App::new()
            .wrap(RequestIdMiddleware)
            .wrap(cors())
            .app_data(asset_service.clone())
            .app_data(adapter.clone())
            .configure(|cfg| configure_routes(cfg, output_dir.clone(), enable_debug))
            .default_service(web::to(not_found))
    })
    .bind(&bind_address)?
    .run()
    .await
}
