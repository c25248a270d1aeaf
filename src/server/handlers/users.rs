//! User directory endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::logging::user_tag;
use crate::model::NewUser;
use crate::server::state::SharedState;
use crate::server::utils::storage_error;

pub async fn list_users_handler(State(state): State<SharedState>) -> Response {
    let st = state.lock().await;
    match st.storage.list_users() {
        Ok(users) => (StatusCode::OK, axum::Json(users)).into_response(),
        Err(e) => storage_error(e),
    }
}

pub async fn create_user_handler(
    State(state): State<SharedState>,
    Json(new_user): Json<NewUser>,
) -> Response {
    let st = state.lock().await;
    match st.storage.create_user(&new_user) {
        Ok(user) => {
            crate::tlog!("created user {} ({})", user_tag(user.id), user.username);
            (StatusCode::CREATED, axum::Json(user)).into_response()
        }
        Err(e) => storage_error(e),
    }
}
