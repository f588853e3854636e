pub mod caption;
pub mod config;
pub mod error;
pub mod flash;
pub mod handlers;
pub mod store;
pub mod uploads;
mod views;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::sync::Arc;
use tower_http::services::ServeDir;

use caption::Captioner;
use store::EntryStore;
use uploads::UploadDir;

/// Shared by every request; built once at start.
pub struct AppState {
    pub store: EntryStore,
    pub captioner: Arc<dyn Captioner>,
    pub uploads: UploadDir,
}

pub fn app(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    let stored_images = ServeDir::new(state.uploads.root());

    Router::new()
        .route("/", get(handlers::upload_form).post(handlers::upload))
        .route("/edit/:id", get(handlers::edit_form).post(handlers::edit))
        .route("/gallery", get(handlers::gallery))
        .nest_service("/static", stored_images)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}
