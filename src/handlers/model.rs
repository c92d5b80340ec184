//! Entity model handlers: name suggest, model description, process step models.

use crate::edf::envelope::{first_row, parse_instance_id, quoted, row_id, rows};
use crate::edf::{EntityInstancePk, SearchRequest};
use crate::error::AppError;
use crate::extractors::Caller;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;

const ACTIVITY_MODEL: &str = "EDF_ActivityModel";
const PROCESS: &str = "EDF_Process";
const POOL_MODEL: &str = "EDF_PoolModel";
const ENTITY_IN_MODEL: &str = "EDF_ActivityEntityInModel";
const ENTITY_OUT_MODEL: &str = "EDF_ActivityEntityOutModel";
const PROCESS_ENTITY_INSTANCE: &str = "EDF_ProcessEntityInstance";
const SEQUENCE_FLOW_MODEL: &str = "EDF_SequenceFlowModel";
const STEP_SEARCH_PAGE_SIZE: u64 = 999;

#[derive(Debug, Deserialize)]
pub struct SuggestQuery {
    pub q: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModelEntry {
    pub name: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

/// Frontend widget type for a model name.
pub fn model_kind(name: &str) -> &'static str {
    match name {
        "EDF_PoolModel" => "ACTION",
        "EDF_ProcessStep" => "STEP",
        "SUPP_Новость" => "NEWS",
        "BAAS_Price" => "PRICE",
        "WEB_HTML" => "HTML",
        _ => "MODEL",
    }
}

/// Model entries whose name contains `q` (case-insensitive); all entries when `q` is empty.
pub fn filter_models(names: &[String], q: Option<&str>) -> Vec<ModelEntry> {
    let needle = q.map(str::trim).filter(|s| !s.is_empty()).map(str::to_lowercase);
    names
        .iter()
        .filter(|name| match &needle {
            Some(n) => name.to_lowercase().contains(n.as_str()),
            None => true,
        })
        .map(|name| ModelEntry {
            name: name.clone(),
            title: name.clone(),
            kind: model_kind(name),
        })
        .collect()
}

/// GET /api/model?q=: known model names. A failed refill serves the previous names.
pub async fn suggest(State(state): State<AppState>, Query(query): Query<SuggestQuery>) -> Json<Vec<ModelEntry>> {
    if let Err(e) = state.model_names.refill(&state.client).await {
        tracing::warn!(error = %e, "serving cached model names");
    }
    let names = state.model_names.snapshot();
    tracing::info!(total = names.len(), q = ?query.q, "model suggest");
    Json(filter_models(&names, query.q.as_deref()))
}

#[derive(Debug, Deserialize)]
pub struct ModelQuery {
    pub model: Option<String>,
}

/// Tag every field that has a lookup list with `tags.isListField = true`.
pub fn mark_list_fields(model: &mut Value, list_fields: &HashSet<&str>) {
    let Some(fields) = model.get_mut("fields").and_then(Value::as_array_mut) else {
        return;
    };
    for field in fields {
        let has_list = field
            .get("name")
            .and_then(Value::as_str)
            .map(|n| list_fields.contains(n))
            .unwrap_or(false);
        if !has_list {
            continue;
        }
        match field.get_mut("tags") {
            Some(Value::Object(tags)) => {
                tags.insert("isListField".into(), Value::Bool(true));
            }
            _ => {
                field["tags"] = json!({ "isListField": true });
            }
        }
    }
}

/// GET /api/model/model?model=: model description with list fields tagged.
pub async fn model(
    caller: Caller,
    State(state): State<AppState>,
    Query(query): Query<ModelQuery>,
) -> Result<Json<Value>, AppError> {
    let name = query
        .model
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("model is required".into()))?;
    tracing::info!(model = %name, "model description");
    let data = state
        .client
        .entity_descriptions(caller.authorization.clone(), caller.login(), caller.is_super_user(), &[name.as_str()])
        .await?;
    let mut model = first_row(&data)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("model {}", name)))?;
    if let Some(fields) = state.lists.fields(&name) {
        let list_fields: HashSet<&str> = fields.keys().map(String::as_str).collect();
        mark_list_fields(&mut model, &list_fields);
    }
    Ok(Json(model))
}

async fn describe(state: &AppState, caller: &Caller, model: &str) -> Result<Value, AppError> {
    state
        .client
        .entity_descriptions(caller.authorization.clone(), caller.login(), caller.is_super_user(), &[model])
        .await
}

fn description<'a>(data: &'a Value, model: &str) -> Result<&'a Value, AppError> {
    first_row(data).ok_or_else(|| AppError::NotFound(format!("model {}", model)))
}

fn name_field(data: &Value, model: &str) -> Result<Value, AppError> {
    description(data, model)?
        .get("fields")
        .and_then(Value::as_array)
        .and_then(|fields| fields.iter().find(|f| f.get("name").and_then(Value::as_str) == Some("name")))
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("name field of {}", model)))
}

/// GET /api/model/stepListModel: process step model extended with pool, step and role names.
pub async fn step_list_model(caller: Caller, State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let process_step = describe(&state, &caller, "EDF_ProcessStep").await?;
    let pool = describe(&state, &caller, POOL_MODEL).await?;
    let activity = describe(&state, &caller, ACTIVITY_MODEL).await?;
    let lane = describe(&state, &caller, "EDF_LaneModel").await?;

    let mut step = description(&process_step, "EDF_ProcessStep")?.clone();
    let pool_name = name_field(&pool, POOL_MODEL)?;
    let mut step_name = name_field(&activity, ACTIVITY_MODEL)?;
    let mut role = name_field(&lane, "EDF_LaneModel")?;
    step_name["name"] = json!("stepName");
    role["name"] = json!("role");

    let fields = step
        .get_mut("fields")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| AppError::NotFound("fields of EDF_ProcessStep".into()))?;
    let base = fields.len();
    for (offset, mut field) in [pool_name, step_name, role].into_iter().enumerate() {
        field["order"] = json!(base + offset + 1);
        fields.push(field);
    }
    Ok(Json(step))
}

/// Object of the single instance `model#id`; null when the platform returns no row.
async fn read_object(state: &AppState, caller: &Caller, model: &str, id: i64) -> Result<Value, AppError> {
    let data = state
        .client
        .read_instances(caller.authorization.clone(), caller.login(), &[EntityInstancePk::new(model, id)])
        .await?;
    Ok(first_row(&data).and_then(|r| r.get("object")).cloned().unwrap_or(Value::Null))
}

async fn search_rows(
    state: &AppState,
    caller: &Caller,
    model: &str,
    query: String,
    page_size: u64,
) -> Result<Vec<Value>, AppError> {
    let request = SearchRequest::new(model, query)
        .order_by("")
        .page(1, page_size)
        .user_login(caller.login());
    let data = state.client.search(caller.authorization.clone(), &request).await?;
    Ok(rows(&data).to_vec())
}

fn query_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepModelQuery {
    pub step_id: Option<String>,
    pub process_id: Option<String>,
    pub flow_node_id: Option<String>,
}

/// Entity model attached to a process step, with the process's instance of it.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityModelRef {
    pub model_name: Value,
    pub instance_id: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepModel {
    pub flow_node_id: Option<String>,
    pub activity_model_name: Value,
    pub step_id: Option<String>,
    pub process_id: i64,
    pub pool_model_id: Option<i64>,
    pub pool_model_name: Value,
    pub activity_documentation: Value,
    pub in_entity_models: Vec<EntityModelRef>,
    pub out_entity_models: Vec<EntityModelRef>,
}

/// Entity models linked to the activity, each resolved to the process's instance of that model.
async fn step_entities(
    state: &AppState,
    caller: &Caller,
    link_model: &str,
    activity_pk: &str,
    process_id: i64,
) -> Result<Vec<EntityModelRef>, AppError> {
    let links = search_rows(state, caller, link_model, format!("activityPk={}", activity_pk), STEP_SEARCH_PAGE_SIZE).await?;
    try_join_all(links.iter().map(|link| async move {
        let model_name = link.pointer("/object/entityName").cloned().unwrap_or(Value::Null);
        let query = format!(
            "processPk={} AND entityName={}",
            process_id,
            quoted(&query_text(&model_name))
        );
        let instances = search_rows(state, caller, PROCESS_ENTITY_INSTANCE, query, STEP_SEARCH_PAGE_SIZE).await?;
        let instance_id = instances
            .first()
            .and_then(|r| r.pointer("/object/entityInstanceId"))
            .cloned()
            .unwrap_or(Value::Null);
        Ok::<_, AppError>(EntityModelRef { model_name, instance_id })
    }))
    .await
}

/// GET /api/model/stepModel?stepId=&processId=&flowNodeId=: activity, pool, and the
/// input/output entity instances of one step of a running process.
pub async fn step_model(
    caller: Caller,
    State(state): State<AppState>,
    Query(params): Query<StepModelQuery>,
) -> Result<Json<StepModel>, AppError> {
    let parse = |name: &str, raw: Option<&str>| {
        raw.and_then(|r| parse_instance_id(&Value::String(r.to_string())))
            .ok_or_else(|| AppError::BadRequest(format!("{} is required", name)))
    };
    let flow_node_id = parse("flowNodeId", params.flow_node_id.as_deref())?;
    let process_id = parse("processId", params.process_id.as_deref())?;
    tracing::info!(flow_node_id, process_id, "step model");

    let (activity, process) = futures::try_join!(
        read_object(&state, &caller, ACTIVITY_MODEL, flow_node_id),
        read_object(&state, &caller, PROCESS, process_id),
    )?;
    let pool_model_id = process.get("poolPk").and_then(row_id);
    let pool = match pool_model_id {
        Some(id) => read_object(&state, &caller, POOL_MODEL, id).await?,
        None => Value::Null,
    };

    let activity_pk = activity.get("pk").map(query_text).unwrap_or_default();
    let (in_entity_models, out_entity_models) = futures::try_join!(
        step_entities(&state, &caller, ENTITY_IN_MODEL, &activity_pk, process_id),
        step_entities(&state, &caller, ENTITY_OUT_MODEL, &activity_pk, process_id),
    )?;

    Ok(Json(StepModel {
        flow_node_id: params.flow_node_id,
        activity_model_name: activity.get("name").cloned().unwrap_or(Value::Null),
        step_id: params.step_id,
        process_id,
        pool_model_id,
        pool_model_name: pool.get("name").cloned().unwrap_or(Value::Null),
        activity_documentation: activity.get("documentation").cloned().unwrap_or_else(|| json!([])),
        in_entity_models,
        out_entity_models,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepByEventBody {
    pub start_event_pk: Value,
}

/// POST /api/model/stepModelByEventPk: description of the output model of the
/// activity that follows a start event.
pub async fn step_model_by_event_pk(
    caller: Caller,
    State(state): State<AppState>,
    Json(body): Json<StepByEventBody>,
) -> Result<Json<Value>, AppError> {
    let event_id = parse_instance_id(&body.start_event_pk)
        .ok_or_else(|| AppError::BadRequest("startEventPk is required".into()))?;
    let flows = search_rows(
        &state,
        &caller,
        SEQUENCE_FLOW_MODEL,
        format!("[sourceRef]={}", quoted(&event_id.to_string())),
        1,
    )
    .await?;
    let activity_id = flows
        .first()
        .and_then(|f| f.pointer("/object/targetRef"))
        .and_then(parse_instance_id)
        .ok_or_else(|| AppError::NotFound(format!("sequence flow from event {}", event_id)))?;

    let activity = read_object(&state, &caller, ACTIVITY_MODEL, activity_id).await?;
    if activity.as_object().map_or(true, |o| o.is_empty()) {
        tracing::warn!(activity_id, "activity model not found");
        return Err(AppError::NotFound(format!("activity model {}", activity_id)));
    }
    let activity_pk = activity.get("pk").map(query_text).unwrap_or_default();
    let outputs = search_rows(
        &state,
        &caller,
        ENTITY_OUT_MODEL,
        format!("activityModelId={}", activity_pk),
        STEP_SEARCH_PAGE_SIZE,
    )
    .await?;
    let model = outputs
        .first()
        .and_then(|r| r.pointer("/object/entityName"))
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| AppError::NotFound(format!("output model of activity {}", activity_id)))?
        .to_string();
    tracing::info!(event_id, activity_id, model = %model, "step model by event");
    let data = describe(&state, &caller, &model).await?;
    Ok(Json(description(&data, &model)?.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_model_names() {
        assert_eq!(model_kind("EDF_PoolModel"), "ACTION");
        assert_eq!(model_kind("EDF_ProcessStep"), "STEP");
        assert_eq!(model_kind("WEB_HTML"), "HTML");
        assert_eq!(model_kind("Anything"), "MODEL");
    }

    #[test]
    fn filter_is_case_insensitive_substring() {
        let names = vec!["WEB_Widget".to_string(), "EDF_PoolModel".to_string(), "web_page".to_string()];
        let hits = filter_models(&names, Some("web"));
        assert_eq!(hits.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(), ["WEB_Widget", "web_page"]);
        assert_eq!(filter_models(&names, None).len(), 3);
        assert_eq!(filter_models(&names, Some("  ")).len(), 3);
    }

    #[test]
    fn list_fields_get_tagged() {
        let mut model = json!({
            "fields": [
                {"name": "city", "tags": {"hidden": false}},
                {"name": "country"},
                {"name": "street"}
            ]
        });
        let lists: HashSet<&str> = ["city", "country"].into_iter().collect();
        mark_list_fields(&mut model, &lists);
        assert_eq!(model["fields"][0]["tags"], json!({"hidden": false, "isListField": true}));
        assert_eq!(model["fields"][1]["tags"], json!({"isListField": true}));
        assert!(model["fields"][2].get("tags").is_none());
    }
}
