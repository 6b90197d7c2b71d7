use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use parley_api::middleware::require_auth;
use parley_api::state::{AppState, AppStateInner};
use parley_api::storage::LocalObjectStore;
use parley_api::{conversations, messages, users};
use parley_translate::{HttpTranslator, TranslationCache};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    // Config (PARLEY_JWT_SECRET is read by the auth middleware)
    let db_path = std::env::var("PARLEY_DB_PATH").unwrap_or_else(|_| "parley.db".into());
    let host = std::env::var("PARLEY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PARLEY_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let uploads_dir = std::env::var("PARLEY_UPLOADS_DIR").unwrap_or_else(|_| "./uploads".into());
    let public_base_url = std::env::var("PARLEY_PUBLIC_BASE_URL")
        .unwrap_or_else(|_| format!("http://localhost:{}/media", port));
    let translate_url = std::env::var("PARLEY_TRANSLATE_URL").unwrap_or_else(|_| {
        "https://translation.googleapis.com/language/translate/v2".into()
    });
    let translate_api_key = std::env::var("PARLEY_TRANSLATE_API_KEY").unwrap_or_default();

    // Init database
    let db = Arc::new(parley_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let translator = Arc::new(HttpTranslator::new(translate_url, translate_api_key)?);
    let translations = TranslationCache::new(db.clone(), translator);
    let storage = Arc::new(LocalObjectStore::new(
        PathBuf::from(uploads_dir),
        public_base_url,
    ));

    let state: AppState = Arc::new(AppStateInner {
        db,
        translations,
        storage,
    });

    // Routes — everything sits behind the auth provider's JWT.
    let app = Router::new()
        .route("/conversations", post(conversations::create_conversation))
        .route("/conversations", get(conversations::list_conversations))
        .route("/conversations/{conversation_id}", get(conversations::get_conversation))
        .route("/conversations/{conversation_id}/messages", get(messages::get_messages))
        .route("/conversations/{conversation_id}/messages", post(messages::send_message))
        .route("/conversations/{conversation_id}/read", post(messages::mark_read))
        .route("/messages/{message_id}/translation", get(messages::translate_message))
        .route("/users/me", get(users::get_me))
        .route("/users/me", patch(users::update_me))
        .layer(middleware::from_fn(require_auth))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Parley server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
