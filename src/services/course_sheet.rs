use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use time::OffsetDateTime;

use crate::core::config::Settings;
use crate::services::course_table::CourseTable;

const SHEETS_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets.readonly";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECONDS: i64 = 3600;

#[async_trait]
pub(crate) trait CourseSource: Send + Sync {
    async fn fetch_table(&self) -> Result<CourseTable>;
}

#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug, Clone)]
pub(crate) struct GoogleSheetSource {
    client: Client,
    key: ServiceAccountKey,
    spreadsheet_id: String,
    worksheet_name: String,
    api_base_url: String,
}

impl GoogleSheetSource {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let sheet = settings.sheet();
        let path = &sheet.service_account_file;
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read service account file {}", path.display()))?;
        let key: ServiceAccountKey = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid service account JSON in {}", path.display()))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build Sheets HTTP client")?;

        Ok(Self {
            client,
            key,
            spreadsheet_id: sheet.spreadsheet_id.clone(),
            worksheet_name: sheet.worksheet_name.clone(),
            api_base_url: sheet.api_base_url.clone(),
        })
    }

    fn signed_assertion(&self) -> Result<String> {
        let signing_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .context("Service account private key is not a valid RSA PEM")?;
        let iat = OffsetDateTime::now_utc().unix_timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: SHEETS_READONLY_SCOPE,
            aud: &self.key.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECONDS,
        };

        encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
            .context("Failed to sign service account assertion")
    }

    async fn access_token(&self) -> Result<String> {
        let assertion = self.signed_assertion()?;
        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .context("Failed to call Google token endpoint")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Google token endpoint returned status {status}: {body}");
        }

        let token: TokenResponse =
            response.json().await.context("Google token endpoint returned malformed body")?;
        Ok(token.access_token)
    }

    fn values_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.api_base_url)
            .with_context(|| format!("Invalid Sheets API base URL {}", self.api_base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Sheets API base URL cannot carry a path"))?
            .pop_if_empty()
            .extend([
                "spreadsheets",
                self.spreadsheet_id.as_str(),
                "values",
                self.worksheet_name.as_str(),
            ]);
        Ok(url)
    }
}

#[async_trait]
impl CourseSource for GoogleSheetSource {
    async fn fetch_table(&self) -> Result<CourseTable> {
        let token = self.access_token().await?;
        let url = self.values_url()?;

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(&[("majorDimension", "ROWS")])
            .send()
            .await
            .context("Failed to call Sheets values API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Sheets values API returned status {status}: {body}");
        }

        let range: ValueRange =
            response.json().await.context("Sheets values API returned malformed body")?;
        tracing::info!(
            spreadsheet_id = %self.spreadsheet_id,
            worksheet = %self.worksheet_name,
            rows = range.values.len(),
            "Fetched course worksheet"
        );

        Ok(CourseTable::from_values(range.values))
    }
}
