use axum::{extract::State, response::IntoResponse, Json};

use common::storage::vector::VectorStore;

use crate::{api_state::ApiState, error::ApiError};

pub async fn collections(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let collections = VectorStore::list_collections(&state.db).await?;
    Ok(Json(collections))
}
