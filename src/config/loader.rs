//! Load settings from the process environment (after `.env`) or any key lookup.

use crate::config::types::{Environment, ModelNames, ServiceAccount, Settings};
use crate::error::ConfigError;
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_USER: &str = "admin";
pub const DEFAULT_LISTS_PATH: &str = "lists";

/// Read `.env` if present, then build settings from the environment.
pub fn load_from_env() -> Result<Settings, ConfigError> {
    dotenvy::dotenv().ok();
    load_with(|key| std::env::var(key).ok())
}

/// Build settings from an arbitrary lookup. Empty values count as unset.
pub fn load_with<F>(lookup: F) -> Result<Settings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let edf_uri = get("EDF_URI").ok_or(ConfigError::Missing("EDF_URI"))?;
    let client_secret = get("EDF_DEFAULT_PASSWORD").ok_or(ConfigError::Missing("EDF_DEFAULT_PASSWORD"))?;
    let port = match get("PORT") {
        Some(p) => p.parse::<u16>().map_err(|e| ConfigError::Invalid {
            var: "PORT",
            reason: e.to_string(),
        })?,
        None => DEFAULT_PORT,
    };
    let reauth_on_400 = match get("EDF_REAUTH_ON_400") {
        Some(v) => parse_bool(&v).ok_or_else(|| ConfigError::Invalid {
            var: "EDF_REAUTH_ON_400",
            reason: format!("expected true or false, got {}", v),
        })?,
        None => false,
    };
    let env: Environment = get("APP_ENV")
        .or_else(|| get("NODE_ENV"))
        .map(|s| s.parse().unwrap_or(Environment::Development))
        .unwrap_or(Environment::Development);

    let defaults = ModelNames::default();
    let models = ModelNames {
        widget: get("EDF_WIDGET_MODEL").unwrap_or(defaults.widget),
        block: get("EDF_BLOCK_MODEL").unwrap_or(defaults.block),
        layout: get("EDF_LAYOUT_MODEL").unwrap_or(defaults.layout),
        desktop: get("EDF_DESKTOP_MODEL").unwrap_or(defaults.desktop),
        bookmark: get("EDF_BOOKMARK_MODEL").unwrap_or(defaults.bookmark),
    };

    Ok(Settings {
        env,
        bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".into()),
        port,
        edf_uri: edf_uri.trim_end_matches('/').to_string(),
        service_account: ServiceAccount {
            client_id: get("EDF_DEFAULT_USER").unwrap_or_else(|| DEFAULT_USER.into()),
            client_secret,
        },
        lists_path: PathBuf::from(get("EDF_LISTS_PATH").unwrap_or_else(|| DEFAULT_LISTS_PATH.into())),
        reauth_on_400,
        models,
    })
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_apply_when_optional_vars_unset() {
        let s = load_with(lookup(&[("EDF_URI", "http://edf:8080/api/"), ("EDF_DEFAULT_PASSWORD", "pw")])).unwrap();
        assert_eq!(s.edf_uri, "http://edf:8080/api");
        assert_eq!(s.port, DEFAULT_PORT);
        assert_eq!(s.service_account.client_id, "admin");
        assert_eq!(s.lists_path, PathBuf::from("lists"));
        assert!(!s.reauth_on_400);
        assert_eq!(s.env, Environment::Development);
        assert_eq!(s.models.bookmark, "WEB_Bookmark");
    }

    #[test]
    fn missing_uri_is_reported() {
        let err = load_with(lookup(&[("EDF_DEFAULT_PASSWORD", "pw")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("EDF_URI")));
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = load_with(lookup(&[
            ("EDF_URI", "http://edf"),
            ("EDF_DEFAULT_PASSWORD", "pw"),
            ("PORT", "http"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "PORT", .. }));
    }

    #[test]
    fn node_env_production_is_honoured() {
        let s = load_with(lookup(&[
            ("EDF_URI", "http://edf"),
            ("EDF_DEFAULT_PASSWORD", "pw"),
            ("NODE_ENV", "production"),
            ("EDF_REAUTH_ON_400", "true"),
        ]))
        .unwrap();
        assert_eq!(s.env, Environment::Production);
        assert!(s.reauth_on_400);
    }
}
