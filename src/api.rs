//! HTTP handlers for `/api` plus the raw store and front-end mounts.

use std::collections::HashSet;
use std::io::Write;

use actix_files::{self as fs, NamedFile};
use actix_multipart::Multipart;
use actix_web::{
    dev::{fn_service, ServiceRequest, ServiceResponse},
    get,
    http::header::{ContentDisposition, DispositionParam, DispositionType},
    post, web, HttpRequest, HttpResponse,
};
use chrono::Utc;
use futures_util::TryStreamExt as _;
use log::{error, info, warn};
use uuid::Uuid;

use crate::archive::{archive_filename, stream_archive, ArchiveEntry};
use crate::config::Config;
use crate::error::ApiError;
use crate::store::{StagedUpload, Store};
use crate::validate::{
    validate_file_list, validate_pagination, validate_upload, PageQuery, PageRequest,
    ValidationError,
};
use crate::{
    BatchResponse, BatchSummary, FileListRequest, FileListResponse, OperationResult,
    PaginationInfo, StoredFile,
};

/// Multipart field carrying uploaded files.
pub const UPLOAD_FIELD: &str = "target_file";

const JSON_LIMIT: usize = 1024 * 1024;

pub struct AppState {
    pub config: Config,
    pub store: Store,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let store = Store::new(config.store_dir.clone());
        Self { config, store }
    }
}

/// Cut one page out of a full listing.
pub fn paginate(files: Vec<StoredFile>, page: usize, limit: usize) -> FileListResponse {
    let total_files = files.len();
    let total_size = files.iter().map(|f| f.size).sum();
    let total_pages = total_files.div_ceil(limit);
    let start = (page - 1).saturating_mul(limit);

    let files = files.into_iter().skip(start).take(limit).collect();
    FileListResponse {
        files,
        pagination: PaginationInfo {
            current_page: page,
            total_pages,
            total_files,
            total_size,
            files_per_page: limit,
            has_next_page: page < total_pages,
            has_prev_page: page > 1,
        },
    }
}

// List stored files, one page at a time
#[get("/files")]
async fn list_files(
    state: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let PageRequest { page, limit } = validate_pagination(&query, &state.config.pagination)?;

    let store = state.store.clone();
    let files = web::block(move || store.list_with_metadata()).await??;

    Ok(HttpResponse::Ok().json(paginate(files, page, limit)))
}

#[derive(Debug, Clone, Copy)]
enum BatchOp {
    Upload,
    Delete,
}

impl BatchOp {
    fn verbs(self) -> (&'static str, &'static str) {
        match self {
            BatchOp::Upload => ("uploaded", "Uploaded"),
            BatchOp::Delete => ("deleted", "Deleted"),
        }
    }
}

/// 200 when every item succeeded, 207 as soon as one failed.
fn batch_response(op: BatchOp, results: Vec<OperationResult>) -> HttpResponse {
    let summary = BatchSummary::of(&results);
    let (verb, capitalized) = op.verbs();

    if summary.failed == 0 {
        HttpResponse::Ok().json(BatchResponse {
            success: true,
            message: format!("Successfully {verb} {} file(s)", summary.total),
            results,
            summary,
        })
    } else {
        HttpResponse::MultiStatus().json(BatchResponse {
            success: false,
            message: format!(
                "{capitalized} {} of {} file(s)",
                summary.succeeded, summary.total
            ),
            results,
            summary,
        })
    }
}

fn multipart_error(e: actix_multipart::MultipartError) -> ApiError {
    ApiError::BadRequest(format!("Invalid multipart payload: {e}"))
}

fn staging_error(e: std::io::Error) -> ApiError {
    ApiError::Internal(format!("failed to stage upload: {e}"))
}

/// Spool every `target_file` field into the staging directory. Nothing
/// touches the store here; a file crossing the size limit aborts the request.
async fn stage_uploads(
    config: &Config,
    payload: &mut Multipart,
) -> Result<Vec<StagedUpload>, ApiError> {
    let mut staged = Vec::new();

    while let Some(mut field) = payload.try_next().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string)
            .unwrap_or_default();
        if filename.is_empty() {
            continue;
        }

        let path = config.temp_dir.join(Uuid::new_v4().to_string());
        let mut upload = StagedUpload {
            name: filename,
            path: path.clone(),
            size: 0,
        };

        let mut f = web::block(move || std::fs::File::create(path))
            .await?
            .map_err(staging_error)?;

        while let Some(chunk) = field.try_next().await.map_err(multipart_error)? {
            upload.size += chunk.len() as u64;
            if upload.size > config.max_file_size {
                return Err(ValidationError::FileTooLarge {
                    name: upload.name.clone(),
                    max: config.max_file_size,
                }
                .into());
            }

            f = web::block(move || f.write_all(&chunk).map(|_| f))
                .await?
                .map_err(staging_error)?;
        }

        staged.push(upload);
    }

    Ok(staged)
}

/// Move staged files into the store one at a time; one failure never stops
/// the rest.
fn persist_all(store: &Store, staged: Vec<StagedUpload>) -> Vec<OperationResult> {
    staged
        .into_iter()
        .map(|upload| match store.persist(&upload) {
            Ok(_) => {
                info!("File \"{}\" uploaded successfully", upload.name);
                OperationResult::succeeded(&upload.name)
            }
            Err(e) => {
                error!("Error uploading file \"{}\": {}", upload.name, e);
                OperationResult::failed(&upload.name, e)
            }
        })
        .collect()
}

// Handle file uploads
#[post("/upload")]
async fn upload_files(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let staged = stage_uploads(&state.config, &mut payload).await?;
    validate_upload(&staged, &state.config)?;

    let store = state.store.clone();
    let results = web::block(move || persist_all(&store, staged)).await?;

    Ok(batch_response(BatchOp::Upload, results))
}

fn delete_all(store: &Store, names: &[String]) -> Vec<OperationResult> {
    names
        .iter()
        .map(|name| match store.delete(name) {
            Ok(()) => OperationResult::succeeded(name),
            Err(e) => {
                error!("Error deleting file \"{name}\": {e}");
                OperationResult::failed(name, e)
            }
        })
        .collect()
}

// Delete a batch of files
#[post("/delete")]
async fn delete_files(
    state: web::Data<AppState>,
    body: web::Json<FileListRequest>,
) -> Result<HttpResponse, ApiError> {
    let names = validate_file_list(body.files.as_deref())?.to_vec();

    let store = state.store.clone();
    let results = web::block(move || delete_all(&store, &names)).await?;

    Ok(batch_response(BatchOp::Delete, results))
}

fn attachment(filename: String) -> ContentDisposition {
    ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![DispositionParam::Filename(filename)],
    }
}

// Download a single file
#[get("/download/{filename}")]
async fn download_file(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let filename = path.into_inner();
    let file_path = state.store.resolve(&filename)?;
    if !state.store.exists(&filename) {
        return Err(ApiError::file_not_found());
    }

    info!("Downloading file: {filename}");
    let named = NamedFile::open_async(&file_path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ApiError::file_not_found(),
        _ => ApiError::Internal(format!("failed to open {}: {e}", file_path.display())),
    })?;

    Ok(named
        .set_content_disposition(attachment(filename))
        .into_response(&req))
}

// Download several files as one zip archive
#[post("/download-bulk")]
async fn download_bulk(
    state: web::Data<AppState>,
    body: web::Json<FileListRequest>,
) -> Result<HttpResponse, ApiError> {
    let names = validate_file_list(body.files.as_deref())?;

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for name in names {
        if !seen.insert(name.as_str()) {
            continue;
        }
        if state.store.exists(name) {
            entries.push(ArchiveEntry {
                name: name.clone(),
                path: state.store.resolve(name)?,
            });
        } else {
            warn!("File not found for bulk download: {name}");
        }
    }

    if entries.is_empty() {
        return Err(ApiError::no_files_found());
    }
    info!("Bulk download: {} file(s) added to archive", entries.len());

    Ok(HttpResponse::Ok()
        .content_type("application/zip")
        .insert_header(attachment(archive_filename(Utc::now())))
        .streaming(stream_archive(entries)))
}

pub async fn not_found() -> Result<HttpResponse, ApiError> {
    Err(ApiError::route_not_found())
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(JSON_LIMIT)
        .error_handler(|err, _req| {
            ApiError::BadRequest(format!("Invalid JSON payload: {err}")).into()
        })
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        ApiError::BadRequest(format!("Invalid query string: {err}")).into()
    })
}

/// Register every route. Used by `main` and by the integration tests.
pub fn configure(state: web::Data<AppState>) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        let store_dir = state.config.store_dir.clone();
        let public_dir = state.config.public_dir.clone();

        cfg.app_data(state)
            .service(
                web::scope("/api")
                    .app_data(json_config())
                    .app_data(query_config())
                    .service(list_files)
                    .service(upload_files)
                    .service(delete_files)
                    .service(download_file)
                    .service(download_bulk),
            )
            // Browse the raw store directory
            .service(fs::Files::new("/store", store_dir).show_files_listing());

        if public_dir.is_dir() {
            cfg.service(
                fs::Files::new("/", public_dir)
                    .index_file("index.html")
                    .default_handler(fn_service(|req: ServiceRequest| async {
                        let (req, _) = req.into_parts();
                        Ok(ServiceResponse::from_err(ApiError::route_not_found(), req))
                    })),
            );
        }

        cfg.default_service(web::to(not_found));
    }
}
