use std::path::PathBuf;

use super::parsing::{
    env_optional, env_or_default, env_required, parse_bool, parse_u32, parse_u64, trim_slashes,
};
use super::types::{
    ApiCredentials, ApiSettings, ConfigError, RubricSettings, Settings, SheetSettings,
    TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let base_url = env_required("API_BASE_URL")?.trim_end_matches('/').to_string();
        let canvas_prefix = trim_slashes(&env_or_default("CANVAS_URL_PREFIX", "aa/CanvasAdmin"));
        let scope = env_or_default("API_SCOPE", "canvasreadonly canvasadmin");
        let token_path = trim_slashes(&env_or_default("API_TOKEN_PATH", "um/oauth2/token"));
        let max_attempts =
            parse_u32("API_MAX_ATTEMPTS", env_or_default("API_MAX_ATTEMPTS", "3"))?;
        let retry_base_delay_ms = parse_u64(
            "API_RETRY_BASE_DELAY_MS",
            env_or_default("API_RETRY_BASE_DELAY_MS", "1000"),
        )?;
        let timeout_seconds =
            parse_u64("API_TIMEOUT_SECONDS", env_or_default("API_TIMEOUT_SECONDS", "60"))?;

        let credentials = match env_optional("API_ACCESS_TOKEN") {
            Some(token) => {
                ApiCredentials::StaticToken { client_id: env_optional("API_CLIENT_ID"), token }
            }
            None => ApiCredentials::ClientCredentials {
                client_id: env_optional("API_CLIENT_ID")
                    .ok_or(ConfigError::MissingSecret("API_CLIENT_ID"))?,
                client_secret: env_optional("API_CLIENT_SECRET")
                    .ok_or(ConfigError::MissingSecret("API_CLIENT_SECRET"))?,
            },
        };

        let account_id = parse_u64("RUBRIC_ACCOUNT_ID", env_required("RUBRIC_ACCOUNT_ID")?)?;
        let rubric_id = parse_u64("RUBRIC_ID", env_required("RUBRIC_ID")?)?;

        let service_account_file = PathBuf::from(env_required("GOOGLE_SERVICE_ACCOUNT_FILE")?);
        let spreadsheet_id = env_required("SPREADSHEET_ID")?;
        let worksheet_name = env_or_default("WORKSHEET_NAME", "Sheet1");
        let sheets_api_base_url =
            env_or_default("SHEETS_API_BASE_URL", "https://sheets.googleapis.com/v4")
                .trim_end_matches('/')
                .to_string();
        let course_id_column = env_or_default("COURSE_ID_COLUMN", "Course ID");

        let log_level = env_or_default("LOG_LEVEL", "info");
        let json = env_optional("LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let metrics_textfile = env_optional("METRICS_TEXTFILE").map(PathBuf::from);

        let settings = Self {
            api: ApiSettings {
                base_url,
                canvas_prefix,
                scope,
                credentials,
                token_path,
                max_attempts,
                retry_base_delay_ms,
                timeout_seconds,
            },
            rubric: RubricSettings { account_id, rubric_id },
            sheet: SheetSettings {
                service_account_file,
                spreadsheet_id,
                worksheet_name,
                api_base_url: sheets_api_base_url,
                course_id_column,
            },
            telemetry: TelemetrySettings { log_level, json, metrics_textfile },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn rubric(&self) -> &RubricSettings {
        &self.rubric
    }

    pub(crate) fn sheet(&self) -> &SheetSettings {
        &self.sheet
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api.base_url.starts_with("http://") || self.api.base_url.starts_with("https://"))
        {
            return Err(ConfigError::InvalidValue {
                field: "API_BASE_URL",
                value: self.api.base_url.clone(),
            });
        }

        if self.api.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "API_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        if self.api.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "API_TIMEOUT_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.sheet.course_id_column.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "COURSE_ID_COLUMN",
                value: String::from("<empty>"),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
impl Settings {
    pub(crate) fn for_tests(api_base_url: &str, sheets_base_url: &str) -> Self {
        Self {
            api: ApiSettings {
                base_url: api_base_url.trim_end_matches('/').to_string(),
                canvas_prefix: "aa/CanvasAdmin".to_string(),
                scope: "canvasadmin".to_string(),
                credentials: ApiCredentials::StaticToken {
                    client_id: Some("test-client".to_string()),
                    token: "test-token".to_string(),
                },
                token_path: "um/oauth2/token".to_string(),
                max_attempts: 3,
                retry_base_delay_ms: 0,
                timeout_seconds: 5,
            },
            rubric: RubricSettings { account_id: 1, rubric_id: 555 },
            sheet: SheetSettings {
                service_account_file: PathBuf::from("service-account.json"),
                spreadsheet_id: "sheet-123".to_string(),
                worksheet_name: "Sheet1".to_string(),
                api_base_url: sheets_base_url.trim_end_matches('/').to_string(),
                course_id_column: "Course ID".to_string(),
            },
            telemetry: TelemetrySettings {
                log_level: "info".to_string(),
                json: false,
                metrics_textfile: None,
            },
        }
    }

    pub(crate) fn with_api(mut self, api: ApiSettings) -> Self {
        self.api = api;
        self
    }

    pub(crate) fn with_sheet(mut self, sheet: SheetSettings) -> Self {
        self.sheet = sheet;
        self
    }

    pub(crate) fn with_telemetry(mut self, telemetry: TelemetrySettings) -> Self {
        self.telemetry = telemetry;
        self
    }
}
