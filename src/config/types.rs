//! Runtime settings: platform endpoint, service account, lookup lists, HTTP listener.

use std::path::PathBuf;

/// Deployment environment. Production hides diagnostic details from error bodies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        })
    }
}

/// Service-account credentials used to obtain the default access token.
#[derive(Clone)]
pub struct ServiceAccount {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

/// Entity model names of the web-frontend objects stored on the platform.
#[derive(Clone, Debug)]
pub struct ModelNames {
    pub widget: String,
    pub block: String,
    pub layout: String,
    pub desktop: String,
    pub bookmark: String,
}

impl Default for ModelNames {
    fn default() -> Self {
        ModelNames {
            widget: "WEB_Widget".into(),
            block: "WEB_Block".into(),
            layout: "WEB_Layout".into(),
            desktop: "WEB_Desktop".into(),
            bookmark: "WEB_Bookmark".into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub env: Environment,
    pub bind_addr: String,
    pub port: u16,
    /// Base URL of the platform API, without trailing slash.
    pub edf_uri: String,
    pub service_account: ServiceAccount,
    pub lists_path: PathBuf,
    /// Treat HTTP 400 like 401 when deciding to re-authenticate.
    pub reauth_on_400: bool,
    pub models: ModelNames,
}

impl Settings {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}
