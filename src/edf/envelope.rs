//! Wire types of the EDF platform API. Every entity operation answers with `{status, data}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status code the platform uses when an addressed entity instance does not exist.
pub const NOT_FOUND_CODE: &str = "ERROR_ENTITY_INSTANCE_NOT_FOUND";
pub const STATUS_SUCCESS: &str = "SUCCESS";

#[derive(Clone, Debug, Default, Deserialize)]
pub struct EnvelopeStatus {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

impl EnvelopeStatus {
    pub fn is_success(&self) -> bool {
        self.kind.as_deref() == Some(STATUS_SUCCESS)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub status: EnvelopeStatus,
    #[serde(default)]
    pub data: Value,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub entity_name: String,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
    /// Restrict results to instances created by these logins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Vec<String>>,
}

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paging {
    pub page_number: u64,
    pub page_size: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_login: Option<String>,
    pub search_params: SearchParams,
    pub paging: Paging,
}

impl SearchRequest {
    pub fn new(entity_name: impl Into<String>, query: impl Into<String>) -> Self {
        SearchRequest {
            user_login: None,
            search_params: SearchParams {
                entity_name: entity_name.into(),
                query: query.into(),
                order_by: None,
                created_by: None,
            },
            paging: Paging {
                page_number: 1,
                page_size: 1,
            },
        }
    }

    pub fn page(mut self, page_number: u64, page_size: u64) -> Self {
        self.paging = Paging { page_number, page_size };
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.search_params.order_by = Some(order_by.into());
        self
    }

    pub fn created_by(mut self, logins: Option<Vec<String>>) -> Self {
        self.search_params.created_by = logins;
        self
    }

    pub fn user_login(mut self, login: impl Into<String>) -> Self {
        self.user_login = Some(login.into());
        self
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagingInfo {
    #[serde(default)]
    pub total_rows: Option<u64>,
}

/// `data` of a search response.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub rows: Vec<Value>,
    #[serde(default)]
    pub paging: PagingInfo,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityInstancePk {
    pub entity_name: String,
    pub entity_instance_id: i64,
}

impl EntityInstancePk {
    pub fn new(entity_name: impl Into<String>, entity_instance_id: i64) -> Self {
        EntityInstancePk {
            entity_name: entity_name.into(),
            entity_instance_id,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TokenRequest {
    pub client_id: String,
    pub client_secret: String,
    pub grant_type: &'static str,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token_type: String,
    pub access_token: String,
    /// Remaining token endpoint fields (`refresh_token`, `expires_in`, ...), passed through to the caller.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl TokenResponse {
    /// Value for the `Authorization` header, e.g. `Bearer eyJ...`.
    pub fn bearer(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

/// Rows of a search/read/create/update `data` payload.
pub fn rows(data: &Value) -> &[Value] {
    data.get("rows").and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

/// First row of a `data` payload, if any.
pub fn first_row(data: &Value) -> Option<&Value> {
    rows(data).first()
}

/// Quote a value for the platform query language.
pub fn quoted(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Entity instance id from a number, a numeric string, a row object, or a JSON-encoded row.
pub fn parse_instance_id(id: &Value) -> Option<i64> {
    match id {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                serde_json::from_str::<Value>(s)
                    .ok()
                    .filter(Value::is_object)
                    .and_then(|v| parse_instance_id(&v))
            })
        }
        Value::Object(_) => id.pointer("/entityInstancePk/entityInstanceId").and_then(parse_instance_id),
        _ => None,
    }
}

/// Id of the instance a row (or a stored link) points to.
pub fn row_id(row: &Value) -> Option<i64> {
    row.pointer("/entityInstancePk/entityInstanceId").and_then(parse_instance_id)
}
