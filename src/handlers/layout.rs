//! Layouts and pages. A stored layout lists its child widgets (type `layout`) or
//! blocks (type `page`) by id; the frontend receives the children expanded inline.

use crate::config::ModelNames;
use crate::edf::envelope::{first_row, parse_instance_id, quoted, row_id, rows};
use crate::edf::{EntityInstancePk, SearchRequest};
use crate::error::AppError;
use crate::extractors::Caller;
use crate::handlers::{object_with_id, parse_id_list, timestamp};
use crate::response::created;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use futures::future::{join_all, try_join_all};
use serde::Deserialize;
use serde_json::{json, Value};

const LIST_PAGE_SIZE: u64 = 99_999;
const SLUG_PAGE_SIZE: u64 = 99;
const DRAFT: &str = "draft";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutKind {
    /// Grid of widgets.
    Layout,
    /// Sequence of content blocks.
    Page,
}

impl LayoutKind {
    pub fn of(layout: &Value) -> Option<Self> {
        match layout.get("type").and_then(Value::as_str) {
            Some("layout") => Some(LayoutKind::Layout),
            Some("page") => Some(LayoutKind::Page),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LayoutKind::Layout => "layout",
            LayoutKind::Page => "page",
        }
    }

    /// Stored field holding the child ids.
    pub fn ids_field(self) -> &'static str {
        match self {
            LayoutKind::Layout => "widgetIds",
            LayoutKind::Page => "blockIds",
        }
    }

    /// Frontend field holding the expanded children.
    pub fn items_field(self) -> &'static str {
        match self {
            LayoutKind::Layout => "widgets",
            LayoutKind::Page => "blocks",
        }
    }

    fn child_model(self, models: &ModelNames) -> &str {
        match self {
            LayoutKind::Layout => &models.widget,
            LayoutKind::Page => &models.block,
        }
    }
}

/// Decode a JSON-text field. Missing or empty text is `{}`; non-text values pass through.
pub fn decode_text(value: Option<&Value>) -> Value {
    match value {
        None | Some(Value::Null) => json!({}),
        Some(Value::String(s)) if s.trim().is_empty() => json!({}),
        Some(Value::String(s)) => serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())),
        Some(other) => other.clone(),
    }
}

/// Encode a value as JSON text for storage; absent stays null.
pub fn encode_text(value: Option<&Value>) -> Value {
    match value {
        None | Some(Value::Null) => Value::Null,
        Some(v) => Value::String(v.to_string()),
    }
}

/// Leading integer of a number or text (`"12px"` is 12).
pub fn leading_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            let end = s
                .char_indices()
                .take_while(|&(i, c)| c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+')))
                .count();
            s[..end].parse().ok()
        }
        _ => None,
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.first().and_then(text_of),
        other => Some(other.to_string()),
    }
}

fn non_empty<'a>(layout: &'a Value, key: &str) -> Option<&'a Value> {
    layout
        .get(key)
        .filter(|v| !v.is_null() && v.as_str() != Some(""))
}

/// Frontend form of a stored layout row, without children. `None` when the row has no object.
pub fn layout_view(row: &Value) -> Option<Value> {
    let mut layout = object_with_id(row)?;
    let category = layout.get("layoutCategory").and_then(|c| c.get(0).or(Some(c))).and_then(leading_int);
    layout["layoutCategory"] = category.map_or(Value::Null, |c| json!([c]));
    let parent = layout.get("parentId").and_then(leading_int).filter(|p| *p != 0);
    layout["parentId"] = parent.map_or(Value::Null, Value::from);
    layout["options"] = decode_text(layout.get("options"));
    Some(layout)
}

/// Grid settings arrive as text; the frontend expects integers.
fn normalize_grid(options: &mut Value) {
    let Some(options) = options.as_object_mut() else {
        return;
    };
    for key in ["colNum", "rowHeight"] {
        let n = options.get(key).and_then(leading_int);
        options.insert(key.to_string(), n.map_or(Value::Null, Value::from));
    }
}

/// Child ids referenced by a stored layout object.
pub fn stored_child_ids(object: &Value, kind: LayoutKind) -> Vec<i64> {
    object
        .get(kind.ids_field())
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(parse_instance_id).collect())
        .unwrap_or_default()
}

/// Frontend form of a stored widget or block.
pub fn child_view(kind: LayoutKind, id: i64, object: &Value) -> Value {
    match kind {
        LayoutKind::Layout => {
            let mut widget = decode_text(object.get("data"));
            if !widget.is_object() {
                widget = json!({});
            }
            widget["_id"] = json!(id);
            widget
        }
        LayoutKind::Page => json!({
            "data": decode_text(object.get("data")),
            "options": decode_text(object.get("options")),
            "title": object.get("title").cloned().unwrap_or_else(|| json!("")),
            "type": object.get("type").cloned().unwrap_or_else(|| json!("")),
            "_id": id,
        }),
    }
}

/// Stored form of a frontend widget or block.
pub fn child_object(kind: LayoutKind, item: &Value) -> Value {
    match kind {
        LayoutKind::Layout => json!({ "data": item.to_string() }),
        LayoutKind::Page => json!({
            "options": encode_text(item.get("options")),
            "data": encode_text(item.get("data")),
            "title": item.get("title"),
            "type": item.get("type"),
        }),
    }
}

fn child_id(item: &Value) -> Option<i64> {
    item.get("_id").and_then(parse_instance_id).filter(|id| *id != 0)
}

fn items_of(layout: &Value, kind: LayoutKind) -> Vec<Value> {
    layout
        .get(kind.items_field())
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn ids_text(ids: &[i64]) -> Value {
    Value::Array(ids.iter().map(|id| Value::String(id.to_string())).collect())
}

async fn read_child(state: &AppState, caller: &Caller, kind: LayoutKind, id: i64) -> Result<Value, AppError> {
    let pk = EntityInstancePk::new(kind.child_model(&state.models), id);
    let data = state
        .client
        .read_instances(caller.authorization.clone(), caller.login(), &[pk])
        .await?;
    let object = first_row(&data).and_then(|r| r.get("object")).cloned().unwrap_or(Value::Null);
    Ok(child_view(kind, id, &object))
}

async fn create_child(state: &AppState, caller: &Caller, kind: LayoutKind, item: &Value) -> Result<i64, AppError> {
    let instance = json!({
        "entityName": kind.child_model(&state.models),
        "object": child_object(kind, item),
    });
    let data = state
        .client
        .create_instances(caller.authorization.clone(), vec![instance])
        .await?;
    first_row(&data).and_then(row_id).ok_or_else(|| AppError::Upstream {
        status: None,
        message: format!("{} created without an id", kind.child_model(&state.models)),
    })
}

/// Update a child that has an id, create one that has none.
async fn save_child(state: &AppState, caller: &Caller, kind: LayoutKind, item: &Value) -> Result<i64, AppError> {
    let Some(id) = child_id(item) else {
        return create_child(state, caller, kind, item).await;
    };
    let instance = json!({
        "entityInstancePk": EntityInstancePk::new(kind.child_model(&state.models), id),
        "object": child_object(kind, item),
    });
    state
        .client
        .update_instances(caller.authorization.clone(), vec![instance])
        .await?;
    Ok(id)
}

/// Best-effort removal of children; failures are logged only.
async fn discard_children(state: &AppState, caller: &Caller, kind: LayoutKind, ids: &[i64]) {
    if ids.is_empty() {
        return;
    }
    let model = kind.child_model(&state.models);
    let pks: Vec<EntityInstancePk> = ids.iter().map(|id| EntityInstancePk::new(model, *id)).collect();
    if let Err(e) = state.client.delete_instances(caller.authorization.clone(), &pks).await {
        tracing::error!(model, ?ids, error = %e, "could not delete layout children");
    }
}

fn layout_pk(state: &AppState, id: i64) -> EntityInstancePk {
    EntityInstancePk::new(state.models.layout.as_str(), id)
}

fn layout_id(raw: &str) -> Result<i64, AppError> {
    parse_instance_id(&Value::String(raw.to_string()))
        .ok_or_else(|| AppError::BadRequest(format!("invalid layout id {}", raw)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub ids: Option<String>,
}

/// GET /api/layout?ids=1,2: the listed layouts, or all of them.
pub async fn list(
    caller: Caller,
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<Value>>, AppError> {
    let ids = parse_id_list(params.ids.as_deref().unwrap_or_default())?;
    let data = if ids.is_empty() {
        let request = SearchRequest::new(state.models.layout.as_str(), "")
            .page(1, LIST_PAGE_SIZE)
            .user_login(caller.login());
        state.client.search(caller.authorization.clone(), &request).await?
    } else {
        let pks: Vec<EntityInstancePk> = ids.iter().map(|id| layout_pk(&state, *id)).collect();
        state
            .client
            .read_instances(caller.authorization.clone(), caller.login(), &pks)
            .await?
    };
    let layouts: Vec<Value> = rows(&data).iter().filter_map(layout_view).collect();
    tracing::info!(count = layouts.len(), "layout list");
    Ok(Json(layouts))
}

/// GET /api/layout/:layout: by numeric id, otherwise by slug; children expanded.
pub async fn load(
    caller: Caller,
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, AppError> {
    tracing::info!(layout = %key, "layout load");
    let data = match key.trim().parse::<i64>() {
        Ok(id) => {
            state
                .client
                .read_instances(caller.authorization.clone(), caller.login(), &[layout_pk(&state, id)])
                .await?
        }
        Err(_) => {
            let request = SearchRequest::new(state.models.layout.as_str(), format!("[slug] = {}", quoted(&key)))
                .page(1, SLUG_PAGE_SIZE)
                .user_login(caller.login());
            state.client.search(caller.authorization.clone(), &request).await?
        }
    };
    let row = first_row(&data).cloned().unwrap_or(Value::Null);
    let mut layout = layout_view(&row).ok_or_else(|| AppError::NotFound(format!("layout {}", key)))?;

    if let Some(kind) = LayoutKind::of(&layout) {
        let ids = stored_child_ids(&row["object"], kind);
        let children = try_join_all(ids.iter().map(|id| read_child(&state, &caller, kind, *id))).await?;
        layout[kind.ids_field()] = json!(ids);
        layout[kind.items_field()] = Value::Array(children);
        if kind == LayoutKind::Layout {
            normalize_grid(&mut layout["options"]);
        }
    }
    Ok(Json(layout))
}

#[derive(Debug, Deserialize)]
pub struct LayoutBody {
    pub data: Value,
}

fn require_object(layout: &Value) -> Result<(), AppError> {
    if layout.is_object() {
        Ok(())
    } else {
        Err(AppError::BadRequest("data must be a layout object".into()))
    }
}

/// POST /api/layout: create the children, then the layout as a draft.
/// If anything fails the children created so far are removed again.
pub async fn create(
    caller: Caller,
    State(state): State<AppState>,
    Json(body): Json<LayoutBody>,
) -> Result<impl IntoResponse, AppError> {
    let layout = body.data;
    require_object(&layout)?;
    let kind = LayoutKind::of(&layout).unwrap_or(LayoutKind::Layout);
    let items = items_of(&layout, kind);

    let mut ids = Vec::with_capacity(items.len());
    let mut failure = None;
    for result in join_all(items.iter().map(|item| create_child(&state, &caller, kind, item))).await {
        match result {
            Ok(id) => ids.push(id),
            Err(e) => {
                failure.get_or_insert(e);
            }
        }
    }
    if let Some(e) = failure {
        discard_children(&state, &caller, kind, &ids).await;
        return Err(e);
    }

    let mut object = json!({
        "dateCreated": timestamp(),
        "whoCreated": caller.login(),
        "layoutCategory": non_empty(&layout, "layoutCategory").and_then(text_of).map(|c| json!([c])),
        "id": null,
        "parentId": non_empty(&layout, "parentId").and_then(text_of),
        "type": kind.as_str(),
        "slug": layout.get("slug"),
        "title": layout.get("title").cloned().unwrap_or_else(|| json!("")),
        "status": DRAFT,
        "options": encode_text(layout.get("options")),
    });
    object[kind.ids_field()] = ids_text(&ids);

    let instance = json!({ "entityName": state.models.layout, "object": object });
    let data = match state
        .client
        .create_instances(caller.authorization.clone(), vec![instance])
        .await
    {
        Ok(data) => data,
        Err(e) => {
            tracing::error!(error = %e, "layout create failed");
            discard_children(&state, &caller, kind, &ids).await;
            return Err(e);
        }
    };

    let row = first_row(&data).cloned().unwrap_or(Value::Null);
    let mut layout_out = row.get("object").filter(|o| o.is_object()).cloned().unwrap_or(object);
    layout_out["_id"] = row_id(&row).map_or(Value::Null, Value::from);
    layout_out["options"] = decode_text(layout_out.get("options"));
    let children: Vec<Value> = items
        .iter()
        .zip(&ids)
        .map(|(item, id)| with_id(item.clone(), *id))
        .collect();
    layout_out[kind.items_field()] = Value::Array(children);
    tracing::info!(id = ?row_id(&row), kind = kind.as_str(), "layout created");
    Ok(created(layout_out))
}

fn with_id(mut item: Value, id: i64) -> Value {
    if let Some(obj) = item.as_object_mut() {
        obj.insert("_id".into(), json!(id));
    }
    item
}

/// PUT /api/layout/:layout_id: upsert the children in parallel, store the layout,
/// then drop children it no longer references.
pub async fn update(
    caller: Caller,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Json(body): Json<LayoutBody>,
) -> Result<Json<Value>, AppError> {
    let id = layout_id(&raw_id)?;
    let layout = body.data;
    require_object(&layout)?;
    let kind = LayoutKind::of(&layout).ok_or_else(|| AppError::BadRequest("type must be 'layout' or 'page'".into()))?;
    let items = items_of(&layout, kind);

    let ids = try_join_all(items.iter().map(|item| save_child(&state, &caller, kind, item))).await?;
    let items: Vec<Value> = items.into_iter().zip(&ids).map(|(item, id)| with_id(item, *id)).collect();

    let login = caller.login();
    let mut object = json!({
        "dateCreated": layout.get("dateCreated"),
        "dateModified": timestamp(),
        "layoutCategory": non_empty(&layout, "layoutCategory").and_then(text_of).map(|c| json!([c])),
        "whoCreated": non_empty(&layout, "whoCreated").cloned().unwrap_or_else(|| json!(login)),
        "whoModified": login,
        "parentId": non_empty(&layout, "parentId").and_then(text_of),
        "type": kind.as_str(),
        "slug": layout.get("slug"),
        "title": layout.get("title").cloned().unwrap_or_else(|| json!("")),
        "status": non_empty(&layout, "status").cloned().unwrap_or_else(|| json!(DRAFT)),
        "options": encode_text(layout.get("options")),
    });
    object[kind.ids_field()] = ids_text(&ids);

    let instance = json!({ "entityInstancePk": layout_pk(&state, id), "object": object });
    let data = state
        .client
        .update_instances(caller.authorization.clone(), vec![instance])
        .await?;

    let orphaned: Vec<i64> = stored_child_ids(&layout, kind)
        .into_iter()
        .filter(|old| !ids.contains(old))
        .collect();
    discard_children(&state, &caller, kind, &orphaned).await;

    let mut updated = first_row(&data)
        .and_then(|r| r.get("object"))
        .filter(|o| o.is_object())
        .cloned()
        .unwrap_or(object);
    updated[kind.items_field()] = Value::Array(items);
    updated["_id"] = json!(id);
    tracing::info!(id, kind = kind.as_str(), removed = orphaned.len(), "layout updated");
    Ok(Json(updated))
}

/// DELETE /api/layout/:layout_id: the layout's widgets and blocks first, then the layout.
pub async fn delete(
    caller: Caller,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = layout_id(&raw_id)?;
    let data = state
        .client
        .read_instances(caller.authorization.clone(), caller.login(), &[layout_pk(&state, id)])
        .await?;
    if let Some(object) = first_row(&data).and_then(|r| r.get("object")) {
        for kind in [LayoutKind::Layout, LayoutKind::Page] {
            let children = stored_child_ids(object, kind);
            if children.is_empty() {
                continue;
            }
            let model = kind.child_model(&state.models);
            let pks: Vec<EntityInstancePk> = children.iter().map(|c| EntityInstancePk::new(model, *c)).collect();
            state.client.delete_instances(caller.authorization.clone(), &pks).await?;
        }
    }
    state
        .client
        .delete_instances(caller.authorization.clone(), &[layout_pk(&state, id)])
        .await?;
    tracing::info!(id, "layout deleted");
    Ok(StatusCode::NO_CONTENT)
}
