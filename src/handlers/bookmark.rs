//! Bookmark handlers: list, add (upsert by entity), remove.

use crate::edf::envelope::{first_row, parse_instance_id, quoted, EntityInstancePk};
use crate::edf::SearchRequest;
use crate::error::AppError;
use crate::extractors::Caller;
use crate::response::{created, ok};
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::{json, Value};

const LIST_PAGE_SIZE: u64 = 1000;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListBody {
    #[serde(default)]
    pub entity_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddBody {
    pub entity_type: String,
    pub entity_id: Value,
    #[serde(default)]
    pub entity_desc: Value,
}

#[derive(Debug, Deserialize)]
pub struct RemoveBody {
    pub id: Value,
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn require_user(caller: &Caller) -> Result<String, AppError> {
    caller
        .user_id()
        .map(str::to_string)
        .ok_or_else(|| AppError::Unauthorized("caller identity unknown".into()))
}

/// POST /api/bookmark/list: caller's bookmarks, optionally of one entity type.
pub async fn list(
    caller: Caller,
    State(state): State<AppState>,
    body: Option<Json<ListBody>>,
) -> Result<impl IntoResponse, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let user_id = require_user(&caller)?;
    let mut query = format!("[userPublicId] = {}", quoted(&user_id));
    if let Some(entity_type) = body.entity_type.as_deref().filter(|t| !t.is_empty()) {
        query.push_str(&format!(" AND [entityType] = {}", quoted(entity_type)));
    }
    tracing::info!(entity_type = ?body.entity_type, "bookmark list");
    let request = SearchRequest::new(state.models.bookmark.as_str(), query)
        .order_by("")
        .page(1, LIST_PAGE_SIZE);
    let data = state.client.search(caller.authorization.clone(), &request).await?;
    Ok(ok(data))
}

/// POST /api/bookmark/addBookmark: update the caller's bookmark of this entity, or create one.
pub async fn add(
    caller: Caller,
    State(state): State<AppState>,
    Json(body): Json<AddBody>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = require_user(&caller)?;
    let entity_name = state.models.bookmark.clone();
    let query = format!(
        "[entityType] = {} AND [entityId] = {} AND [userPublicId] = {}",
        quoted(&body.entity_type),
        quoted(&value_text(&body.entity_id)),
        quoted(&user_id)
    );
    let existing = state
        .client
        .search(
            caller.authorization.clone(),
            &SearchRequest::new(entity_name.as_str(), query).order_by("").page(1, 1),
        )
        .await?;
    let object = json!({
        "entityType": body.entity_type,
        "entityId": body.entity_id,
        "entityDesc": body.entity_desc,
        "userPublicId": user_id,
    });

    let existing_id = first_row(&existing)
        .and_then(|row| row.pointer("/entityInstancePk/entityInstanceId"))
        .cloned();
    if let Some(id) = existing_id {
        let instance = json!({
            "entityInstancePk": { "entityName": entity_name, "entityInstanceId": id },
            "object": object,
        });
        let data = state
            .client
            .update_instances(caller.authorization.clone(), vec![instance])
            .await?;
        tracing::info!("bookmark updated");
        return Ok(ok(first_row(&data).cloned().unwrap_or(Value::Null)));
    }

    let instance = json!({ "entityName": entity_name, "object": object });
    let data = state
        .client
        .create_instances(caller.authorization.clone(), vec![instance])
        .await?;
    tracing::info!("bookmark created");
    Ok(created(first_row(&data).cloned().unwrap_or(Value::Null)))
}

/// POST /api/bookmark/removeBookmark: delete by instance id.
pub async fn remove(
    caller: Caller,
    State(state): State<AppState>,
    Json(body): Json<RemoveBody>,
) -> Result<StatusCode, AppError> {
    let id = parse_instance_id(&body.id).ok_or_else(|| AppError::BadRequest("invalid bookmark id".into()))?;
    tracing::info!(id, "bookmark remove");
    let pk = EntityInstancePk {
        entity_name: state.models.bookmark.clone(),
        entity_instance_id: id,
    };
    state.client.delete_instances(caller.authorization.clone(), &[pk]).await?;
    Ok(StatusCode::NO_CONTENT)
}
