use std::sync::{Mutex, MutexGuard, OnceLock};

use async_trait::async_trait;

use crate::core::config::Settings;
use crate::services::canvas_api::CanvasApiClient;
use crate::services::course_sheet::CourseSource;
use crate::services::course_table::CourseTable;

pub(crate) const TEST_SERVICE_ACCOUNT_KEY: &str = include_str!("testdata/service_account_key.pem");

/// Serializes tests that read or write process environment variables.
pub(crate) fn env_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Settings pointing both the Canvas gateway and the Sheets API at `base_url`,
/// with a static token and no retry delay.
pub(crate) fn settings(base_url: &str) -> Settings {
    Settings::for_tests(base_url, base_url)
}

pub(crate) fn canvas_client(base_url: &str) -> CanvasApiClient {
    CanvasApiClient::from_settings(&settings(base_url)).expect("canvas client")
}

pub(crate) struct StaticCourseSource {
    table: CourseTable,
}

impl StaticCourseSource {
    pub(crate) fn new(columns: &[&str], rows: &[&[&str]]) -> Self {
        Self::from_table(CourseTable {
            columns: columns.iter().map(|item| item.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|item| item.to_string()).collect())
                .collect(),
        })
    }

    pub(crate) fn from_table(table: CourseTable) -> Self {
        Self { table }
    }
}

#[async_trait]
impl CourseSource for StaticCourseSource {
    async fn fetch_table(&self) -> anyhow::Result<CourseTable> {
        Ok(self.table.clone())
    }
}
