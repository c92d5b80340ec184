//! EDF backend-for-frontend: authenticated platform client, session, model-name cache,
//! lookup lists, and the REST surface consumed by the web frontend.

pub mod cache;
pub mod config;
pub mod edf;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod lists;
pub mod response;
pub mod routes;
pub mod session;
pub mod startup;
pub mod state;

pub use cache::{ModelNameCache, RefillOutcome};
pub use config::{load_from_env, Settings};
pub use edf::{EdfClient, EdfTransport, HttpTransport};
pub use error::{AppError, ConfigError};
pub use lists::{load_lists, LookupLists};
pub use routes::{api_routes, common_routes, router};
pub use session::{Session, SessionStatus};
pub use startup::{app, bootstrap, serve};
pub use state::AppState;
