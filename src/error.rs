use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use log::error;

use crate::{caption::CaptionError, store::StoreError, views};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("entry not found")]
    NotFound,
    #[error("uploaded file name {0:?} has no usable characters")]
    InvalidFileName(String),
    #[error("uploaded file is not a readable image: {0}")]
    InvalidImage(#[source] image::ImageError),
    #[error("malformed upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("caption generation failed: {0}")]
    Caption(#[from] CaptionError),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("failed to store upload: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[source] StoreError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AppError::NotFound,
            other => AppError::Database(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                "The requested entry does not exist.".to_string(),
            ),
            AppError::InvalidImage(_) => (
                StatusCode::BAD_REQUEST,
                "The uploaded file is not an image we can read.".to_string(),
            ),
            AppError::InvalidFileName(_) => (
                StatusCode::BAD_REQUEST,
                "The uploaded file name cannot be stored.".to_string(),
            ),
            AppError::Multipart(err) => (err.status(), err.body_text()),
            AppError::Caption(_)
            | AppError::Task(_)
            | AppError::Io(_)
            | AppError::Database(_) => {
                error!("request failed: {self}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Something went wrong while handling your request.".to_string(),
                )
            }
        };

        (status, Html(views::error_page(status, &message))).into_response()
    }
}
