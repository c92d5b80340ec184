//! Settings validation before startup.

use crate::config::Settings;
use crate::error::ConfigError;

pub fn validate(settings: &Settings) -> Result<(), ConfigError> {
    let uri = settings.edf_uri.to_lowercase();
    if !(uri.starts_with("http://") || uri.starts_with("https://")) {
        return Err(ConfigError::Invalid {
            var: "EDF_URI",
            reason: format!("expected an http(s) URL, got '{}'", settings.edf_uri),
        });
    }
    if settings.service_account.client_id.is_empty() {
        return Err(ConfigError::Validation("service account user must not be empty".into()));
    }
    if settings.service_account.client_secret.is_empty() {
        return Err(ConfigError::Validation("service account password must not be empty".into()));
    }
    if settings.port == 0 {
        return Err(ConfigError::Invalid {
            var: "PORT",
            reason: "port must be non-zero".into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_with;

    fn settings(uri: &str) -> Settings {
        let uri = uri.to_string();
        load_with(move |k| match k {
            "EDF_URI" => Some(uri.clone()),
            "EDF_DEFAULT_PASSWORD" => Some("secret".into()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn accepts_http_uri() {
        assert!(validate(&settings("https://edf.local/api")).is_ok());
    }

    #[test]
    fn rejects_non_http_uri() {
        let err = validate(&settings("edf.local")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "EDF_URI", .. }));
    }

    #[test]
    fn rejects_empty_password() {
        let mut s = settings("http://edf.local");
        s.service_account.client_secret.clear();
        assert!(matches!(validate(&s), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_port_zero() {
        let mut s = settings("http://edf.local");
        s.port = 0;
        assert!(matches!(validate(&s), Err(ConfigError::Invalid { var: "PORT", .. })));
    }
}
