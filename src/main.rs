// Image gallery that captions every upload with a hosted vision model.

use anyhow::Context;
use caption_gallery::{
    caption::{Captioner, GeminiCaptioner},
    config::Config,
    store::EntryStore,
    uploads::UploadDir,
    AppState,
};
use log::info;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().context("invalid configuration (is GEMINI_API_KEY set?)")?;

    let store = EntryStore::open(&config.database_path).with_context(|| {
        format!("failed to open database {}", config.database_path.display())
    })?;
    let uploads = UploadDir::create(&config.upload_dir)
        .await
        .with_context(|| format!("failed to create {}", config.upload_dir.display()))?;
    info!("storing uploads in {}", config.upload_dir.display());

    let captioner = GeminiCaptioner::load(&config.gemini_api_key, &config.caption_model)
        .await
        .with_context(|| format!("failed to load caption model {}", config.caption_model))?;
    info!("captioning with {}", captioner.model_id());

    let state = Arc::new(AppState {
        store,
        captioner: Arc::new(captioner),
        uploads,
    });
    let app = caption_gallery::app(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    info!("server running on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
