//! Widget data: generic entity CRUD for any model, and value suggest
//! (dropdown links search the platform, other fields use lookup lists).

use crate::edf::envelope::{first_row, parse_instance_id, rows};
use crate::edf::{EntityInstancePk, SearchRequest};
use crate::error::AppError;
use crate::extractors::Caller;
use crate::handlers::parse_id_list;
use crate::response::{created, ok};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::cmp::Ordering;

const DROPDOWN_PAGE_SIZE: u64 = 999_999;
const LIST_PAGE_SIZE: u64 = 10;
/// Roles that see every instance even when `userOnly` is requested.
const UNRESTRICTED_ROLES: [&str; 3] = ["admin", "head", "web_admin"];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetSuggestQuery {
    pub q: Option<String>,
    pub model: Option<String>,
    pub field: Option<String>,
    pub is_dropdown_link: Option<String>,
    pub query: Option<String>,
}

fn truthy(flag: Option<&str>) -> bool {
    match flag.map(str::trim) {
        None | Some("") => false,
        Some(v) => !matches!(v.to_lowercase().as_str(), "false" | "0"),
    }
}

fn needle(q: Option<&str>) -> Option<String> {
    q.map(str::trim).filter(|s| !s.is_empty()).map(str::to_lowercase)
}

/// Rows whose `entityDesc` contains `q`, sorted by `name` (unnamed rows last), without the `object` payload.
pub fn dropdown_rows(rows: &[Value], q: Option<&str>) -> Vec<Value> {
    let needle = needle(q);
    let mut out: Vec<Value> = rows
        .iter()
        .filter(|row| match &needle {
            Some(n) => row
                .get("entityDesc")
                .and_then(Value::as_str)
                .map(|d| d.to_lowercase().contains(n.as_str()))
                .unwrap_or(false),
            None => true,
        })
        .cloned()
        .collect();
    // Stable: rows without a name keep their relative order after the named ones.
    out.sort_by(|a, b| {
        let name = |v: &Value| v.get("name").and_then(Value::as_str).map(str::to_string);
        match (name(a), name(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
    for row in &mut out {
        if let Some(obj) = row.as_object_mut() {
            obj.remove("object");
        }
    }
    out
}

/// List values containing `q` (case-insensitive).
pub fn filter_list(values: &[String], q: Option<&str>) -> Vec<String> {
    match needle(q) {
        Some(n) => values.iter().filter(|v| v.to_lowercase().contains(n.as_str())).cloned().collect(),
        None => values.to_vec(),
    }
}

/// GET /api/widget/suggest
pub async fn suggest(
    caller: Caller,
    State(state): State<AppState>,
    Query(params): Query<WidgetSuggestQuery>,
) -> Result<Json<Value>, AppError> {
    let Some(model) = params.model.as_deref().filter(|m| !m.is_empty()) else {
        return Ok(Json(Value::Array(Vec::new())));
    };

    if truthy(params.is_dropdown_link.as_deref()) {
        tracing::info!(model, "dropdown suggest");
        let request = SearchRequest::new(model, params.query.clone().unwrap_or_default())
            .order_by("")
            .page(1, DROPDOWN_PAGE_SIZE)
            .user_login(caller.login());
        let data = state.client.search(caller.authorization.clone(), &request).await?;
        return Ok(Json(Value::Array(dropdown_rows(rows(&data), params.q.as_deref()))));
    }

    let field = params.field.as_deref().unwrap_or_default();
    match state.lists.get(model, field) {
        Some(values) => {
            let found = filter_list(values, params.q.as_deref());
            Ok(Json(Value::Array(found.into_iter().map(Value::String).collect())))
        }
        None => {
            tracing::info!(model, field, "list not found");
            Ok(Json(Value::Array(Vec::new())))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub model: Option<String>,
    pub query: Option<String>,
    pub order_by: Option<String>,
    pub page_number: Option<String>,
    pub page_size: Option<String>,
    pub user_only: Option<String>,
}

fn positive(text: Option<&str>, default: u64) -> u64 {
    text.and_then(|t| t.trim().parse::<u64>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default)
}

fn instance_id(raw: &str) -> Result<i64, AppError> {
    parse_instance_id(&Value::String(raw.to_string()))
        .ok_or_else(|| AppError::BadRequest(format!("invalid instance id {}", raw)))
}

/// GET /api/widget: one page of instances of `model`.
pub async fn list(
    caller: Caller,
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Value>, AppError> {
    let model = params
        .model
        .as_deref()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| AppError::BadRequest("model is required".into()))?;
    let created_by = (params.user_only.as_deref() == Some("true") && !caller.has_any_role(&UNRESTRICTED_ROLES))
        .then(|| vec![caller.login().to_string()]);
    let request = SearchRequest::new(model, params.query.clone().unwrap_or_default())
        .order_by(params.order_by.clone().unwrap_or_default())
        .page(
            positive(params.page_number.as_deref(), 1),
            positive(params.page_size.as_deref(), LIST_PAGE_SIZE),
        )
        .created_by(created_by)
        .user_login(caller.login());
    tracing::info!(model, "widget list");
    let data = state.client.search(caller.authorization.clone(), &request).await?;
    Ok(Json(data))
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
    pub data: NewInstance,
}

#[derive(Debug, Deserialize)]
pub struct NewInstance {
    pub model: String,
    #[serde(default)]
    pub data: Value,
}

/// POST /api/widget: create one instance; answers the created row.
pub async fn create(
    caller: Caller,
    State(state): State<AppState>,
    Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, AppError> {
    let NewInstance { model, data } = body.data;
    tracing::info!(model = %model, "widget create");
    let instance = json!({ "entityName": model, "object": data });
    let data = state
        .client
        .create_instances(caller.authorization.clone(), vec![instance])
        .await?;
    Ok(created(first_row(&data).cloned().unwrap_or(Value::Null)))
}

/// GET /api/widget/:model_name/:model_id
pub async fn get_item(
    caller: Caller,
    State(state): State<AppState>,
    Path((model, id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let pk = EntityInstancePk::new(model, instance_id(&id)?);
    tracing::info!(model = %pk.entity_name, id = pk.entity_instance_id, "widget get");
    let data = state
        .client
        .read_instances(caller.authorization.clone(), caller.login(), &[pk])
        .await?;
    Ok(Json(data))
}

#[derive(Debug, Default, Deserialize)]
pub struct IdsQuery {
    pub ids: Option<String>,
}

/// GET /api/widget/:model_name?ids=[..]
pub async fn get_items(
    caller: Caller,
    State(state): State<AppState>,
    Path(model): Path<String>,
    Query(params): Query<IdsQuery>,
) -> Result<Json<Value>, AppError> {
    let ids = parse_id_list(params.ids.as_deref().unwrap_or_default())?;
    if ids.is_empty() {
        return Err(AppError::BadRequest("ids are required".into()));
    }
    tracing::info!(model = %model, count = ids.len(), "widget get many");
    let pks: Vec<EntityInstancePk> = ids.into_iter().map(|id| EntityInstancePk::new(model.as_str(), id)).collect();
    let data = state
        .client
        .read_instances(caller.authorization.clone(), caller.login(), &pks)
        .await?;
    Ok(Json(data))
}

#[derive(Debug, Deserialize)]
pub struct SaveBody {
    #[serde(default)]
    pub fields: Value,
}

/// PATCH /api/widget/:model_name/:model_id: store `fields` as the instance object.
pub async fn save_item(
    caller: Caller,
    State(state): State<AppState>,
    Path((model, id)): Path<(String, String)>,
    Json(body): Json<SaveBody>,
) -> Result<impl IntoResponse, AppError> {
    let pk = EntityInstancePk::new(model, instance_id(&id)?);
    tracing::info!(model = %pk.entity_name, id = pk.entity_instance_id, "widget save");
    let instance = json!({ "entityInstancePk": pk, "object": body.fields });
    let data = state
        .client
        .update_instances(caller.authorization.clone(), vec![instance])
        .await?;
    Ok(ok(data))
}

/// DELETE /api/widget/:model_name/:model_id
pub async fn delete_item(
    caller: Caller,
    State(state): State<AppState>,
    Path((model, id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let pk = EntityInstancePk::new(model, instance_id(&id)?);
    tracing::info!(model = %pk.entity_name, id = pk.entity_instance_id, "widget delete");
    state.client.delete_instances(caller.authorization.clone(), &[pk]).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dropdown_filters_sorts_and_strips_objects() {
        let rows = vec![
            json!({"name": "b", "entityDesc": "Moscow office", "object": {"x": 1}}),
            json!({"name": "a", "entityDesc": "moscow depot", "object": {"x": 2}}),
            json!({"name": "c", "entityDesc": "Kazan"}),
            json!({"name": "d"}),
        ];
        let out = dropdown_rows(&rows, Some("MOSCOW"));
        assert_eq!(out, vec![json!({"name": "a", "entityDesc": "moscow depot"}), json!({"name": "b", "entityDesc": "Moscow office"})]);
        assert_eq!(dropdown_rows(&rows, None).len(), 4);
    }

    #[test]
    fn unnamed_rows_sort_last_in_original_order() {
        let rows = vec![
            json!({"entityDesc": "x1"}),
            json!({"name": "b"}),
            json!({"entityDesc": "x2"}),
            json!({"name": "a"}),
        ];
        assert_eq!(
            dropdown_rows(&rows, None),
            vec![json!({"name": "a"}), json!({"name": "b"}), json!({"entityDesc": "x1"}), json!({"entityDesc": "x2"})]
        );
    }

    #[test]
    fn list_filter_matches_substring() {
        let values = vec!["Red".to_string(), "Green".to_string(), "Dark red".to_string()];
        assert_eq!(filter_list(&values, Some("red")), vec!["Red", "Dark red"]);
        assert_eq!(filter_list(&values, None).len(), 3);
    }

    #[test]
    fn paging_defaults() {
        assert_eq!(positive(None, 10), 10);
        assert_eq!(positive(Some("0"), 10), 10);
        assert_eq!(positive(Some("x"), 1), 1);
        assert_eq!(positive(Some(" 25 "), 10), 25);
    }

    #[test]
    fn path_ids_accept_json_rows() {
        assert_eq!(instance_id("12").unwrap(), 12);
        assert_eq!(instance_id(r#"{"entityInstancePk":{"entityInstanceId":4}}"#).unwrap(), 4);
        assert!(matches!(instance_id("abc"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn dropdown_flag_truthiness() {
        assert!(truthy(Some("true")));
        assert!(truthy(Some("1")));
        assert!(!truthy(Some("false")));
        assert!(!truthy(Some("")));
        assert!(!truthy(None));
    }
}
