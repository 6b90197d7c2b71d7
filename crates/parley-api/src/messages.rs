use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use parley_db::models::NewMediaItem;
use parley_types::api::{
    Claims, MarkReadRequest, MessageView, SendMessageRequest, SendMessageResponse,
    TranslationResponse,
};

use crate::error::{ApiError, ApiResult, join_err};
use crate::state::AppState;
use crate::users::resolve_caller;
use crate::views;

pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&state, &claims).await?;

    let text = req.text.unwrap_or_default();
    if text.is_empty() && req.media.is_empty() {
        return Err(ApiError::BadRequest(
            "message needs text or at least one media item".into(),
        ));
    }

    let message_id = Uuid::new_v4();
    let db = state.db.clone();
    let cid = conversation_id.to_string();
    let mid = message_id.to_string();
    let sender_id = caller.id.clone();
    let media: Vec<NewMediaItem> = req
        .media
        .iter()
        .map(|m| NewMediaItem {
            storage_ref: m.storage_ref.clone(),
            kind: m.kind.as_str().to_string(),
            file_name: m.file_name.clone(),
            file_size: m.file_size,
            mime_type: m.mime_type.clone(),
            duration_ms: m.duration_ms,
            width: m.width,
            height: m.height,
        })
        .collect();

    tokio::task::spawn_blocking(move || -> ApiResult<()> {
        if db.get_conversation(&cid)?.is_none() {
            return Err(ApiError::NotFound);
        }
        if !db.is_participant(&cid, &sender_id)? {
            return Err(ApiError::NotAParticipant);
        }
        db.insert_message(&mid, &cid, &sender_id, &text, &media)?;
        Ok(())
    })
    .await
    .map_err(join_err)??;

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse { message_id }),
    ))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&state, &claims).await?;

    let db = state.db.clone();
    let storage = state.storage.clone();
    let cid = conversation_id.to_string();
    let viewer_id = caller.id.clone();

    let messages = tokio::task::spawn_blocking(move || -> ApiResult<Vec<MessageView>> {
        if db.get_conversation(&cid)?.is_none() {
            return Err(ApiError::NotFound);
        }
        if !db.is_participant(&cid, &viewer_id)? {
            return Err(ApiError::NotAParticipant);
        }

        let rows = db.list_messages(&cid)?;
        let message_ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();

        // Batch the joins: attachments per message, one profile per
        // distinct sender.
        let media_rows = db.get_media_for_messages(&message_ids)?;
        let mut media_map: HashMap<String, Vec<_>> = HashMap::new();
        for row in media_rows {
            media_map.entry(row.message_id.clone()).or_default().push(row);
        }

        let mut sender_ids: Vec<String> = rows.iter().map(|r| r.sender_id.clone()).collect();
        sender_ids.sort();
        sender_ids.dedup();
        let senders: HashMap<String, _> = db
            .get_users(&sender_ids)?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();

        let message_views = rows
            .into_iter()
            .map(|row| {
                let sender = match senders.get(&row.sender_id) {
                    Some(user) => views::profile(user, storage.as_ref()),
                    None => {
                        warn!("Unknown sender '{}' on message '{}'", row.sender_id, row.id);
                        views::profile(
                            &parley_db::models::UserRow {
                                id: row.sender_id.clone(),
                                external_id: String::new(),
                                name: "unknown".into(),
                                email: String::new(),
                                avatar_ref: None,
                                preferred_language: None,
                                created_at: String::new(),
                            },
                            storage.as_ref(),
                        )
                    }
                };
                let media = media_map
                    .remove(&row.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|m| views::media_view(m, storage.as_ref()))
                    .collect();
                views::message_view(row, sender, media)
            })
            .collect();

        Ok(message_views)
    })
    .await
    .map_err(join_err)??;

    Ok(Json(messages))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MarkReadRequest>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&state, &claims).await?;

    let db = state.db.clone();
    let cid = conversation_id.to_string();
    let reader_id = caller.id.clone();
    let message_ids: Vec<String> = req.message_ids.iter().map(|id| id.to_string()).collect();

    tokio::task::spawn_blocking(move || -> ApiResult<()> {
        if db.get_conversation(&cid)?.is_none() {
            return Err(ApiError::NotFound);
        }
        if !db.is_participant(&cid, &reader_id)? {
            return Err(ApiError::NotAParticipant);
        }
        db.mark_read(&reader_id, &cid, &message_ids)?;
        Ok(())
    })
    .await
    .map_err(join_err)??;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct TranslationQuery {
    /// Target language code; defaults to the caller's preferred
    /// language.
    pub lang: Option<String>,
}

/// Translated view of one message. Upstream failures degrade to the
/// original text rather than an error — the client always gets
/// something to render.
pub async fn translate_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Query(query): Query<TranslationQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&state, &claims).await?;

    let db = state.db.clone();
    let mid = message_id.to_string();
    let viewer_id = caller.id.clone();

    let message = tokio::task::spawn_blocking(move || -> ApiResult<parley_db::models::MessageRow> {
        let message = db.get_message(&mid)?.ok_or(ApiError::NotFound)?;
        if !db.is_participant(&message.conversation_id, &viewer_id)? {
            return Err(ApiError::NotAParticipant);
        }
        Ok(message)
    })
    .await
    .map_err(join_err)??;

    let language = query
        .lang
        .or_else(|| caller.preferred_language.clone())
        .ok_or_else(|| {
            ApiError::BadRequest("no target language given and none preferred".into())
        })?;

    let response = match state
        .translations
        .get_or_translate(&message.id, &language)
        .await
    {
        Ok(Some(text)) => TranslationResponse {
            message_id,
            language,
            text,
            translated: true,
        },
        Ok(None) => return Err(ApiError::NotFound),
        Err(parley_translate::TranslateError::Unavailable(reason)) => {
            warn!(
                "Translation of message '{}' to '{}' unavailable ({}), serving original",
                message.id, language, reason
            );
            TranslationResponse {
                message_id,
                language,
                text: message.content,
                translated: false,
            }
        }
        Err(parley_translate::TranslateError::Storage(e)) => return Err(ApiError::Database(e)),
    };

    Ok(Json(response))
}
