//! Desktops: named sets of layouts with a default one. Changing them needs an editor role.

use crate::edf::envelope::{first_row, parse_instance_id, quoted, row_id, rows};
use crate::edf::{EntityInstancePk, SearchRequest};
use crate::error::AppError;
use crate::extractors::Caller;
use crate::handlers::{object_with_id, timestamp};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use futures::future::{join_all, try_join_all};
use serde::Deserialize;
use serde_json::{json, Map, Value};

const LIST_PAGE_SIZE: u64 = 999;
const LOOKUP_PAGE_SIZE: u64 = 99;
pub const EDITOR_ROLES: [&str; 3] = ["web_admin", "admin", "role.admin"];

fn require_editor(caller: &Caller) -> Result<(), AppError> {
    if caller.has_any_role(&EDITOR_ROLES) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("{} may not change desktops", caller.login())))
    }
}

/// Answer for a request that matched no desktop.
pub fn empty_desktop() -> Value {
    json!({
        "layouts": [],
        "layoutIds": [],
        "name": null,
        "title": null,
        "defaultLayoutId": null,
    })
}

/// GET /api/desktop
pub async fn list(caller: Caller, State(state): State<AppState>) -> Result<Json<Vec<Value>>, AppError> {
    let request = SearchRequest::new(state.models.desktop.as_str(), "")
        .page(1, LIST_PAGE_SIZE)
        .user_login(caller.login());
    let data = state.client.search(caller.authorization.clone(), &request).await?;
    Ok(Json(rows(&data).iter().filter_map(object_with_id).collect()))
}

/// Desktop row by id (number or numeric text) or by name; `None` for blank keys and misses.
async fn find_desktop(state: &AppState, caller: &Caller, key: &Value) -> Result<Option<Value>, AppError> {
    let data = match key {
        Value::Null | Value::Bool(false) => return Ok(None),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        _ => match parse_instance_id(key) {
            Some(id) => {
                let pk = EntityInstancePk::new(state.models.desktop.as_str(), id);
                state
                    .client
                    .read_instances(caller.authorization.clone(), caller.login(), &[pk])
                    .await?
            }
            None => {
                let name = key.as_str().map(str::to_string).unwrap_or_else(|| key.to_string());
                let request = SearchRequest::new(state.models.desktop.as_str(), format!("[name] = {}", quoted(&name)))
                    .page(1, LOOKUP_PAGE_SIZE)
                    .user_login(caller.login());
                state.client.search(caller.authorization.clone(), &request).await?
            }
        },
    };
    Ok(first_row(&data).cloned())
}

/// Layout object with `_id`; unreadable layouts are skipped.
async fn read_layout(state: &AppState, caller: &Caller, id: i64) -> Option<Value> {
    let pk = EntityInstancePk::new(state.models.layout.as_str(), id);
    match state
        .client
        .read_instances(caller.authorization.clone(), caller.login(), &[pk])
        .await
    {
        Ok(data) => first_row(&data).and_then(object_with_id),
        Err(e) => {
            tracing::warn!(id, error = %e, "desktop layout unavailable");
            None
        }
    }
}

/// Distinct layout ids referenced by the desktops, in first-seen order.
pub fn layout_ids(desktops: &[Value]) -> Vec<i64> {
    let mut ids = Vec::new();
    for desktop in desktops {
        let referenced = desktop.pointer("/object/layoutIds").and_then(Value::as_array);
        for id in referenced.into_iter().flatten().filter_map(parse_instance_id) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

#[derive(Debug, Deserialize)]
pub struct DesktopsBody {
    #[serde(default)]
    pub desktops: Value,
}

/// POST /api/desktop/getDesktops: layouts of the named desktops and the first default layout.
pub async fn load(
    caller: Caller,
    State(state): State<AppState>,
    Json(body): Json<DesktopsBody>,
) -> Result<Json<Value>, AppError> {
    let keys = match body.desktops {
        Value::Array(keys) => keys,
        other => vec![other],
    };
    let found: Vec<Value> = try_join_all(keys.iter().map(|key| find_desktop(&state, &caller, key)))
        .await?
        .into_iter()
        .flatten()
        .collect();
    if found.is_empty() {
        tracing::warn!(?keys, "no desktop found");
        return Ok(Json(empty_desktop()));
    }

    let ids = layout_ids(&found);
    let layouts: Vec<Value> = join_all(ids.iter().map(|id| read_layout(&state, &caller, *id)))
        .await
        .into_iter()
        .flatten()
        .collect();
    let default_layout_id = found.iter().find_map(|d| {
        d.pointer("/object/defaultLayoutId")
            .filter(|v| !v.is_null() && v.as_str() != Some(""))
            .and_then(parse_instance_id)
    });
    tracing::info!(desktops = found.len(), layouts = layouts.len(), "desktops loaded");
    Ok(Json(json!({ "layouts": layouts, "defaultLayoutId": default_layout_id })))
}

#[derive(Debug, Deserialize)]
pub struct SaveBody {
    pub data: Map<String, Value>,
}

/// Stored desktop object from the frontend form: `layouts` collapse to `layoutIds`.
pub fn desktop_object(mut desktop: Map<String, Value>, login: &str, now: &str) -> Map<String, Value> {
    let default_layout = desktop
        .get("defaultLayoutId")
        .filter(|v| !v.is_null() && v.as_str() != Some(""))
        .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
        .unwrap_or_default();
    desktop.insert("defaultLayoutId".into(), Value::String(default_layout));
    desktop.insert("whoModified".into(), json!(login));
    desktop.insert("dateModified".into(), json!(now));
    if let Some(Value::Array(layouts)) = desktop.remove("layouts") {
        let ids: Vec<Value> = layouts.iter().map(|l| l.get("_id").cloned().unwrap_or(Value::Null)).collect();
        desktop.insert("layoutIds".into(), Value::Array(ids));
    }
    desktop
}

/// PUT /api/desktop/:desktop_name: update the desktop with this name, or create it.
pub async fn save(
    caller: Caller,
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<SaveBody>,
) -> Result<StatusCode, AppError> {
    require_editor(&caller)?;
    let now = timestamp();
    let mut desktop = desktop_object(body.data, caller.login(), &now);

    let request = SearchRequest::new(state.models.desktop.as_str(), format!("[name] = {}", quoted(&name)))
        .page(1, LIST_PAGE_SIZE)
        .user_login(caller.login());
    let existing = state.client.search(caller.authorization.clone(), &request).await?;

    match first_row(&existing) {
        Some(row) => {
            let id = row_id(row).ok_or_else(|| AppError::Upstream {
                status: None,
                message: format!("desktop {} has no id", name),
            })?;
            for key in ["dateCreated", "whoCreated"] {
                let kept = row.pointer(&format!("/object/{}", key)).cloned().unwrap_or(Value::Null);
                desktop.insert(key.into(), kept);
            }
            let instance = json!({
                "entityInstancePk": EntityInstancePk::new(state.models.desktop.as_str(), id),
                "object": desktop,
            });
            state
                .client
                .update_instances(caller.authorization.clone(), vec![instance])
                .await?;
            tracing::info!(name = %name, id, "desktop updated");
        }
        None => {
            desktop.insert("dateCreated".into(), json!(now));
            desktop.insert("whoCreated".into(), json!(caller.login()));
            let instance = json!({ "entityName": state.models.desktop, "object": desktop });
            state
                .client
                .create_instances(caller.authorization.clone(), vec![instance])
                .await?;
            tracing::info!(name = %name, "desktop created");
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/desktop/:desktop_id
pub async fn delete(
    caller: Caller,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<StatusCode, AppError> {
    require_editor(&caller)?;
    let id = parse_instance_id(&Value::String(raw_id.clone()))
        .ok_or_else(|| AppError::BadRequest(format!("invalid desktop id {}", raw_id)))?;
    let pk = EntityInstancePk::new(state.models.desktop.as_str(), id);
    state.client.delete_instances(caller.authorization.clone(), &[pk]).await?;
    tracing::info!(id, "desktop deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_ids_are_distinct_across_desktops() {
        let desktops = vec![
            json!({"object": {"layoutIds": [{"entityInstancePk": {"entityInstanceId": 1}}, "2"]}}),
            json!({"object": {"layoutIds": [2, 3]}}),
            json!({"object": {}}),
        ];
        assert_eq!(layout_ids(&desktops), vec![1, 2, 3]);
    }

    #[test]
    fn form_layouts_collapse_to_ids() {
        let form = json!({"name": "main", "defaultLayoutId": 7, "layouts": [{"_id": 7, "title": "A"}, {"_id": 9}]});
        let Value::Object(form) = form else { unreachable!() };
        let stored = desktop_object(form, "olga", "2024-01-01T00:00:00Z");
        assert_eq!(stored["defaultLayoutId"], "7");
        assert_eq!(stored["layoutIds"], json!([7, 9]));
        assert_eq!(stored["whoModified"], "olga");
        assert!(!stored.contains_key("layouts"));

        let Value::Object(bare) = json!({"name": "x"}) else { unreachable!() };
        assert_eq!(desktop_object(bare, "olga", "t")["defaultLayoutId"], "");
    }

    #[test]
    fn editors_only() {
        assert!(matches!(require_editor(&Caller::default()), Err(AppError::Forbidden(_))));
    }
}
