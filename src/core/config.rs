mod parsing;
mod settings;
mod types;

pub(crate) use types::{ApiCredentials, RubricSettings, Settings};

#[cfg(test)]
pub(crate) use types::{ApiSettings, SheetSettings, TelemetrySettings};
