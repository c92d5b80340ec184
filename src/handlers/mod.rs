//! HTTP handlers for auth, entity models, bookmarks, widgets, layouts, and desktops.

pub mod auth;
pub mod bookmark;
pub mod desktop;
pub mod layout;
pub mod model;
pub mod widget;

use crate::error::AppError;
use serde_json::Value;

/// Audit timestamp stored in `dateCreated` / `dateModified`.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Ids from a query parameter: `1,2,3` or a JSON array `[1,"2",{"entityInstancePk":...}]`.
pub fn parse_id_list(text: &str) -> Result<Vec<i64>, AppError> {
    let text = text.trim();
    let items: Vec<Value> = if text.starts_with('[') {
        serde_json::from_str(text).map_err(|e| AppError::BadRequest(format!("invalid ids: {}", e)))?
    } else {
        text.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Value::String(s.to_string()))
            .collect()
    };
    items
        .iter()
        .map(|v| crate::edf::envelope::parse_instance_id(v).ok_or_else(|| AppError::BadRequest(format!("invalid id {}", v))))
        .collect()
}

/// A row's `object` with the instance id added as `_id`; `None` for rows without an object.
pub fn object_with_id(row: &Value) -> Option<Value> {
    let mut object = row.get("object").filter(|o| o.as_object().is_some_and(|m| !m.is_empty()))?.clone();
    object["_id"] = row.pointer("/entityInstancePk/entityInstanceId").cloned().unwrap_or(Value::Null);
    Some(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_lists_accept_csv_and_json() {
        assert_eq!(parse_id_list("1, 2,3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_id_list(r#"[4, "5"]"#).unwrap(), vec![4, 5]);
        assert_eq!(parse_id_list("").unwrap(), Vec::<i64>::new());
        assert!(matches!(parse_id_list("1,x"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn rows_without_object_are_skipped() {
        let row = json!({"entityInstancePk": {"entityName": "WEB_Desktop", "entityInstanceId": 3}, "object": {"name": "main"}});
        assert_eq!(object_with_id(&row), Some(json!({"name": "main", "_id": 3})));
        assert_eq!(object_with_id(&json!({"object": {}})), None);
        assert_eq!(object_with_id(&json!({})), None);
    }
}
