use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(super) api: ApiSettings,
    pub(super) rubric: RubricSettings,
    pub(super) sheet: SheetSettings,
    pub(super) telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub(crate) struct ApiSettings {
    pub(crate) base_url: String,
    pub(crate) canvas_prefix: String,
    pub(crate) scope: String,
    pub(crate) credentials: ApiCredentials,
    pub(crate) token_path: String,
    pub(crate) max_attempts: u32,
    pub(crate) retry_base_delay_ms: u64,
    pub(crate) timeout_seconds: u64,
}

/// How the API gateway authenticates outbound calls.
#[derive(Debug, Clone)]
pub(crate) enum ApiCredentials {
    ClientCredentials { client_id: String, client_secret: String },
    StaticToken { client_id: Option<String>, token: String },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RubricSettings {
    pub(crate) account_id: u64,
    pub(crate) rubric_id: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct SheetSettings {
    pub(crate) service_account_file: PathBuf,
    pub(crate) spreadsheet_id: String,
    pub(crate) worksheet_name: String,
    pub(crate) api_base_url: String,
    pub(crate) course_id_column: String,
}

#[derive(Debug, Clone)]
pub(crate) struct TelemetrySettings {
    pub(crate) log_level: String,
    pub(crate) json: bool,
    pub(crate) metrics_textfile: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("missing required secret for {0}")]
    MissingSecret(&'static str),
}

impl ApiCredentials {
    pub(crate) fn client_id(&self) -> Option<&str> {
        match self {
            Self::ClientCredentials { client_id, .. } => Some(client_id),
            Self::StaticToken { client_id, .. } => client_id.as_deref(),
        }
    }
}
