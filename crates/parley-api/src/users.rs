use axum::{Extension, Json, extract::State, response::IntoResponse};
use uuid::Uuid;

use parley_db::models::UserRow;
use parley_types::api::{Claims, UpdateUserRequest};

use crate::error::{ApiError, ApiResult, join_err};
use crate::state::{AppState, AppStateInner};
use crate::views;

/// Map the auth provider's identity to the internal user row,
/// provisioning it on first sight. Every handler resolves its caller
/// explicitly through this instead of reading ambient auth state.
pub async fn resolve_caller(state: &AppStateInner, claims: &Claims) -> ApiResult<UserRow> {
    let db = state.db.clone();
    let candidate_id = Uuid::new_v4().to_string();
    let external_id = claims.sub.clone();
    let name = claims.name.clone();
    let email = claims.email.clone().unwrap_or_default();
    let picture = claims.picture.clone();

    let row = tokio::task::spawn_blocking(move || {
        db.resolve_user(
            &candidate_id,
            &external_id,
            &name,
            &email,
            picture.as_deref(),
        )
    })
    .await
    .map_err(join_err)??;

    Ok(row)
}

pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&state, &claims).await?;
    Ok(Json(views::profile(&caller, state.storage.as_ref())))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    let caller = resolve_caller(&state, &claims).await?;

    let db = state.db.clone();
    let user_id = caller.id.clone();
    let language = req.preferred_language.clone();
    tokio::task::spawn_blocking(move || db.set_preferred_language(&user_id, language.as_deref()))
        .await
        .map_err(join_err)??;

    let db = state.db.clone();
    let user_id = caller.id.clone();
    let row = tokio::task::spawn_blocking(move || db.get_user(&user_id))
        .await
        .map_err(join_err)??
        .ok_or(ApiError::NotFound)?;

    Ok(Json(views::profile(&row, state.storage.as_ref())))
}
