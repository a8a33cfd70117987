use std::sync::Arc;

use ltb_core::{
    config::Config,
    pipeline::Pipeline,
    settings::{SettingsStore, SqliteSettingsStore},
};
use ltb_openai::OpenAiBackend;

#[tokio::main]
async fn main() -> Result<(), ltb_core::Error> {
    let cfg = Arc::new(Config::load()?);
    let _log_guard = ltb_core::logging::init("ltb", &cfg.logger_level, cfg.log_sink().as_ref())?;

    let settings: Arc<dyn SettingsStore> =
        Arc::new(SqliteSettingsStore::open(&cfg.database_path)?);
    tracing::info!(path = %cfg.database_path.display(), "settings store opened");

    let backend = Arc::new(OpenAiBackend::new(cfg.request_timeout)?);
    let pipeline = Arc::new(Pipeline::new(backend, cfg.default_base_url.clone()));

    ltb_telegram::router::run_polling(cfg, settings, pipeline)
        .await
        .map_err(|e| ltb_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
