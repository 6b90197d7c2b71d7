use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parley_db::Database;
use parley_db::keys;
use parley_db::models::ConversationRow;
use parley_types::api::{
    Claims, ConversationSummary, CreateConversationRequest, CreateConversationResponse,
};

use crate::error::{ApiError, ApiResult, join_err};
use crate::state::AppState;
use crate::storage::ObjectStore;
use crate::users::resolve_caller;
use crate::views;

/// Resolve-or-create. Non-group: canonical-key lookup first, so
/// repeated initiation between the same pair converges on one
/// conversation no matter who initiates; the storage layer's unique
/// index covers the window where two callers both miss the lookup.
/// Group: always a fresh conversation.
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateConversationRequest>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&state, &claims).await?;

    if req.participant_ids.is_empty() {
        return Err(ApiError::BadRequest("participant_ids must not be empty".into()));
    }

    let caller_id: Uuid = caller.id.parse().map_err(|_| ApiError::Internal)?;
    let participant_set = keys::participant_set(caller_id, &req.participant_ids);
    if participant_set.len() < 2 {
        return Err(ApiError::BadRequest(
            "a conversation needs at least two participants".into(),
        ));
    }

    let db = state.db.clone();
    let ids: Vec<String> = participant_set.iter().map(|id| id.to_string()).collect();
    let is_group = req.is_group;
    let name = req.name.clone();
    let image = req.image.clone();

    let conversation_id = tokio::task::spawn_blocking(move || -> ApiResult<String> {
        // Every referenced participant must exist.
        let known = db.get_users(&ids)?;
        if known.len() != ids.len() {
            return Err(ApiError::NotFound);
        }

        if is_group {
            let id = db.create_conversation(
                &Uuid::new_v4().to_string(),
                true,
                name.as_deref(),
                image.as_deref(),
                None,
                &ids,
            )?;
            return Ok(id);
        }

        let key = keys::canonical_key(&participant_set);
        if let Some(existing) = db.find_direct_conversation(&key)? {
            return Ok(existing.id);
        }

        let id = db.create_conversation(
            &Uuid::new_v4().to_string(),
            false,
            name.as_deref(),
            image.as_deref(),
            Some(&key),
            &ids,
        )?;
        Ok(id)
    })
    .await
    .map_err(join_err)??;

    Ok((
        StatusCode::CREATED,
        Json(CreateConversationResponse {
            conversation_id: views::parse_uuid(&conversation_id, "conversation id"),
        }),
    ))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&state, &claims).await?;

    let db = state.db.clone();
    let storage = state.storage.clone();
    let viewer_id = caller.id.clone();

    let summaries = tokio::task::spawn_blocking(move || -> ApiResult<Vec<ConversationSummary>> {
        let conversations = db.list_conversations_for_user(&viewer_id)?;

        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            summaries.push(summarize(&db, storage.as_ref(), &viewer_id, conversation)?);
        }

        // Recency ordering: last message time, else creation time;
        // conversation id breaks ties deterministically.
        summaries.sort_by(|a, b| {
            let a_recency = a.last_message.as_ref().map(|m| m.created_at).unwrap_or(a.created_at);
            let b_recency = b.last_message.as_ref().map(|m| m.created_at).unwrap_or(b.created_at);
            b_recency.cmp(&a_recency).then(a.id.cmp(&b.id))
        });

        Ok(summaries)
    })
    .await
    .map_err(join_err)??;

    Ok(Json(summaries))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&state, &claims).await?;

    let db = state.db.clone();
    let storage = state.storage.clone();
    let viewer_id = caller.id.clone();
    let cid = conversation_id.to_string();

    let summary = tokio::task::spawn_blocking(move || -> ApiResult<ConversationSummary> {
        let conversation = db.get_conversation(&cid)?.ok_or(ApiError::NotFound)?;
        if !db.is_participant(&cid, &viewer_id)? {
            return Err(ApiError::NotAParticipant);
        }
        summarize(&db, storage.as_ref(), &viewer_id, conversation)
    })
    .await
    .map_err(join_err)??;

    Ok(Json(summary))
}

/// Join one conversation row with everything the client renders in a
/// list entry: counterpart profiles, display name/image, last message,
/// unread count. Runs on the blocking pool.
fn summarize(
    db: &Database,
    storage: &dyn ObjectStore,
    viewer_id: &str,
    conversation: ConversationRow,
) -> ApiResult<ConversationSummary> {
    let participant_ids = db.participants_of(&conversation.id)?;
    let users = db.get_users(&participant_ids)?;

    let others: Vec<_> = users.iter().filter(|u| u.id != viewer_id).collect();

    let name = if conversation.is_group {
        conversation.name.clone().unwrap_or_else(|| "Unknown".into())
    } else {
        others
            .first()
            .map(|u| u.name.clone())
            .unwrap_or_else(|| "Unknown".into())
    };

    let image_url = if conversation.is_group {
        conversation.image_ref.as_deref().and_then(|r| {
            if r.starts_with("http") {
                Some(r.to_string())
            } else {
                storage.url_for(r)
            }
        })
    } else {
        others
            .first()
            .and_then(|u| views::profile(u, storage).avatar_url)
    };

    let last_message = match db.last_message(&conversation.id)? {
        Some(row) => {
            let sender = users
                .iter()
                .find(|u| u.id == row.sender_id)
                .map(|u| views::profile(u, storage))
                .ok_or_else(|| {
                    ApiError::Database(anyhow::anyhow!(
                        "Sender {} missing from participants of {}",
                        row.sender_id,
                        conversation.id
                    ))
                })?;
            let media = db
                .get_media_for_messages(std::slice::from_ref(&row.id))?
                .into_iter()
                .map(|m| views::media_view(m, storage))
                .collect();
            Some(views::message_view(row, sender, media))
        }
        None => None,
    };

    let unread_count = db.unread_count(viewer_id, &conversation.id)?;

    let profiles = others.iter().map(|u| views::profile(u, storage)).collect();

    Ok(ConversationSummary {
        id: views::parse_uuid(&conversation.id, "conversation id"),
        is_group: conversation.is_group,
        name,
        image_url,
        participants: profiles,
        last_message,
        unread_count,
        created_at: views::parse_timestamp(&conversation.created_at, "conversation"),
    })
}
