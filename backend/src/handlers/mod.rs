//! HTTP request handlers

pub mod health;
pub mod packing;
pub mod products;
pub mod receiving;
pub mod settings;

pub use health::*;
pub use packing::*;
pub use products::*;
pub use receiving::*;
pub use settings::*;

use axum::extract::Multipart;

use crate::error::{AppError, AppResult};

/// File name and contents of the `file` part of a multipart upload
pub(crate) async fn read_upload(mut multipart: Multipart) -> AppResult<(Option<String>, Vec<u8>)> {
    let missing = || AppError::validation("file", "No file uploaded", "Файл не загружен");

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation("file", &e.to_string(), "Файл не загружен"))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::validation("file", &e.to_string(), "Файл не загружен"))?;
        if bytes.is_empty() {
            return Err(missing());
        }
        return Ok((file_name, bytes.to_vec()));
    }

    Err(missing())
}
