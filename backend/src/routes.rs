use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures::TryStreamExt;
use shared::{AskRequest, DetectRequest, HealthResponse, IngestResponse};
use std::path::{Path, PathBuf};

use crate::assets::asset_service::{AssetError, AssetService};
use crate::db::models::Asset;
use crate::detection::adapter::DetectionAdapter;
use crate::error::ApiError;
use crate::qa::answer::answer_stub;
use crate::request_id::RequestId;

const UPLOAD_FIELD: &str = "file";
const ASSET_TYPE: &str = "video_or_image";
const FALLBACK_FILENAME: &str = "upload";

pub fn configure_routes(cfg: &mut web::ServiceConfig, output_dir: PathBuf, enable_debug: bool) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        ApiError::BadRequest(format!("Invalid JSON body: {}", err)).into()
    }))
    .service(web::resource("/health").route(web::get().to(health)))
    .service(web::resource("/ingest").route(web::post().to(ingest)))
    .service(web::resource("/detect").route(web::post().to(detect)))
    .service(web::resource("/ask").route(web::post().to(ask)));

    if enable_debug {
        cfg.service(web::resource("/detect/debug").route(web::post().to(detect_debug)));
    }

    cfg.service(Files::new("/artifacts", output_dir));
}

/// Fallback for unmatched routes so 404s carry the same `{"detail": ...}` body.
pub async fn not_found() -> Result<HttpResponse, ApiError> {
    Err(ApiError::NotFound("Not Found".to_string()))
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse { ok: true })
}

struct Upload {
    filename: String,
    content_type: Option<String>,
    data: Vec<u8>,
}

async fn read_upload(payload: &mut Multipart, limit: usize) -> Result<Option<Upload>, ApiError> {
    let bad_multipart = |e: actix_multipart::MultipartError| {
        ApiError::BadRequest(format!("Invalid multipart payload: {}", e))
    };

    let mut upload = None;
    while let Some(mut field) = payload.try_next().await.map_err(bad_multipart)? {
        if upload.is_some() || field.name() != Some(UPLOAD_FIELD) {
            while field.try_next().await.map_err(bad_multipart)?.is_some() {}
            continue;
        }

        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .filter(|name| !name.is_empty())
            .unwrap_or(FALLBACK_FILENAME)
            .to_string();
        let content_type = field.content_type().map(|mime| mime.to_string());

        let mut data = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(bad_multipart)? {
            if data.len() + chunk.len() > limit {
                return Err(AssetError::TooLarge {
                    size: data.len() + chunk.len(),
                    limit,
                }
                .into());
            }
            data.extend_from_slice(&chunk);
        }

        upload = Some(Upload {
            filename,
            content_type,
            data,
        });
    }
    Ok(upload)
}

async fn ingest(
    request_id: RequestId,
    asset_service: web::Data<AssetService>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let upload = read_upload(&mut payload, asset_service.max_upload_bytes())
        .await?
        .ok_or_else(|| ApiError::BadRequest(format!("{} required", UPLOAD_FIELD)))?;

    let asset = asset_service
        .ingest(
            &request_id,
            &upload.data,
            &upload.filename,
            upload.content_type.as_deref(),
        )
        .await?;

    Ok(HttpResponse::Ok().json(IngestResponse {
        asset_id: asset.id,
        asset_type: ASSET_TYPE.to_string(),
        path: asset.local_path,
        created_at: asset.created_at,
    }))
}

/// Resolves the requested asset before any model work happens.
async fn find_asset(
    request_id: &RequestId,
    asset_service: &AssetService,
    asset_id: Option<String>,
) -> Result<Asset, ApiError> {
    let asset_id = asset_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("asset_id required".to_string()))?;

    match asset_service.get_asset(&asset_id).await? {
        Some(asset) => Ok(asset),
        None => {
            log::info!(request_id = request_id.as_str(), asset_id = asset_id.as_str(); "Asset not found");
            Err(ApiError::NotFound("asset not found".to_string()))
        }
    }
}

async fn detect(
    request_id: RequestId,
    asset_service: web::Data<AssetService>,
    adapter: web::Data<DetectionAdapter>,
    body: web::Json<DetectRequest>,
) -> Result<HttpResponse, ApiError> {
    let asset = find_asset(&request_id, &asset_service, body.into_inner().asset_id).await?;

    let response = web::block(move || {
        adapter.detect(&request_id, Path::new(&asset.local_path), &asset.id)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(response))
}

async fn detect_debug(
    request_id: RequestId,
    asset_service: web::Data<AssetService>,
    adapter: web::Data<DetectionAdapter>,
    body: web::Json<DetectRequest>,
) -> Result<HttpResponse, ApiError> {
    let asset = find_asset(&request_id, &asset_service, body.into_inner().asset_id).await?;

    let response = web::block(move || {
        adapter.debug_detect(&request_id, Path::new(&asset.local_path), &asset.id)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(response))
}

async fn ask(request_id: RequestId, body: web::Json<AskRequest>) -> Result<HttpResponse, ApiError> {
    let AskRequest { asset_id, question } = body.into_inner();
    let (Some(asset_id), Some(question)) = (
        asset_id.filter(|id| !id.is_empty()),
        question.filter(|q| !q.is_empty()),
    ) else {
        return Err(ApiError::BadRequest(
            "asset_id and question required".to_string(),
        ));
    };

    log::info!(request_id = request_id.as_str(), asset_id = asset_id.as_str(); "Answering question with stub");
    Ok(HttpResponse::Ok().json(answer_stub(&asset_id, &question)))
}
