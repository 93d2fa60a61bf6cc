//! The `{"error": ...}` envelope and the status-code policy behind it.

use actix_web::{
    dev::ServiceResponse,
    error::BlockingError,
    http::{header, StatusCode},
    middleware::ErrorHandlerResponse,
    HttpResponse, ResponseError,
};
use log::error;
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::store::StoreError;
use crate::validate::ValidationError;
use crate::ErrorBody;

const GENERIC_SERVER_ERROR: &str = "Internal Server Error";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(&'static str),
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn file_not_found() -> Self {
        ApiError::NotFound("File not found")
    }

    pub fn no_files_found() -> Self {
        ApiError::NotFound("None of the specified files were found")
    }

    pub fn route_not_found() -> Self {
        ApiError::NotFound("Resource not found")
    }

    /// Message safe to show a client. Server-side failures stay generic.
    pub fn public_message(&self) -> String {
        if self.status_code().is_server_error() {
            GENERIC_SERVER_ERROR.to_string()
        } else {
            self.to_string()
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Storage(StoreError::FileNotFound) => StatusCode::NOT_FOUND,
            ApiError::Storage(StoreError::InvalidFilename(_)) => StatusCode::BAD_REQUEST,
            ApiError::Storage(_) | ApiError::Archive(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            error!("Error occurred: {self}");
        }
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.public_message(),
            detail: None,
        })
    }
}

impl From<BlockingError> for ApiError {
    fn from(e: BlockingError) -> Self {
        ApiError::Internal(format!("blocking task failed: {e}"))
    }
}

/// Diagnostic mode: replace the generic 500 body with one that carries the
/// full internal error. Wired through `ErrorHandlers` only when `--debug` is on.
pub fn attach_error_detail<B>(
    res: ServiceResponse<B>,
) -> actix_web::Result<ErrorHandlerResponse<B>> {
    let body = match res.response().error() {
        Some(err) => ErrorBody {
            error: err
                .as_error::<ApiError>()
                .map(ApiError::public_message)
                .unwrap_or_else(|| GENERIC_SERVER_ERROR.to_string()),
            detail: Some(format!("{err}\n{err:?}")),
        },
        None => return Ok(ErrorHandlerResponse::Response(res.map_into_left_body())),
    };

    let (req, res) = res.into_parts();
    let mut res = res.set_body(serde_json::to_string(&body)?);
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    let res = ServiceResponse::new(req, res)
        .map_into_boxed_body()
        .map_into_right_body::<B>();
    Ok(ErrorHandlerResponse::Response(res))
}
