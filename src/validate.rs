//! Stateless request checks. Every check runs before any mutating work.

use serde::Deserialize;
use thiserror::Error;

use crate::config::{Config, PaginationConfig};
use crate::size::format_size;
use crate::store::{is_flat_filename, StagedUpload};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Page number must be greater than 0")]
    InvalidPage,
    #[error("Invalid limit. Allowed values: {}", join(.allowed))]
    InvalidLimit { allowed: Vec<usize> },
    #[error("No files were selected for upload")]
    NoFilesSelected,
    #[error("File {name} exceeds maximum size of {}", human(.max))]
    FileTooLarge { name: String, max: u64 },
    #[error("File type .{extension} is not allowed. Allowed types: {}", join(.allowed))]
    DisallowedExtension {
        extension: String,
        allowed: Vec<String>,
    },
    #[error("No files specified")]
    NoFilesSpecified,
    #[error("Invalid filename detected")]
    InvalidFilename,
}

fn human(bytes: &u64) -> String {
    format_size(*bytes)
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Raw `?page=&limit=` query. Kept as strings so malformed numbers are
/// reported through the same envelope as out-of-range ones.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub fn validate_pagination(
    query: &PageQuery,
    config: &PaginationConfig,
) -> Result<PageRequest, ValidationError> {
    let page = match present(&query.page) {
        None => 1,
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .filter(|p| *p >= 1)
            .ok_or(ValidationError::InvalidPage)? as usize,
    };

    let invalid_limit = || ValidationError::InvalidLimit {
        allowed: config.allowed_limits.clone(),
    };
    let limit = match present(&query.limit) {
        None => config.default_limit,
        Some(raw) => raw.parse::<usize>().map_err(|_| invalid_limit())?,
    };
    if !config.allowed_limits.contains(&limit) {
        return Err(invalid_limit());
    }

    Ok(PageRequest { page, limit })
}

/// All-or-nothing: one bad file rejects the whole batch.
pub fn validate_upload(files: &[StagedUpload], config: &Config) -> Result<(), ValidationError> {
    if files.is_empty() {
        return Err(ValidationError::NoFilesSelected);
    }

    for file in files {
        if !is_flat_filename(&file.name) {
            return Err(ValidationError::InvalidFilename);
        }
        if file.size > config.max_file_size {
            return Err(ValidationError::FileTooLarge {
                name: file.name.clone(),
                max: config.max_file_size,
            });
        }
        if !config.allowed_extensions.is_empty() {
            let extension = file.extension();
            if !config.allowed_extensions.contains(&extension) {
                return Err(ValidationError::DisallowedExtension {
                    extension,
                    allowed: config.allowed_extensions.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Shared by delete and bulk download: a non-empty list of bare filenames.
pub fn validate_file_list(files: Option<&[String]>) -> Result<&[String], ValidationError> {
    let files = files
        .filter(|f| !f.is_empty())
        .ok_or(ValidationError::NoFilesSpecified)?;
    if files.iter().any(|name| !is_flat_filename(name)) {
        return Err(ValidationError::InvalidFilename);
    }
    Ok(files)
}
