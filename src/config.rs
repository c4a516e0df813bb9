use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, ServiceError};

/// Timeout applied to every outbound API call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fixed pause between consecutive submissions, to stay under the ERP's
/// rate limits. There is no retry or backoff beyond this.
pub const REQUEST_DELAY: Duration = Duration::from_millis(500);

/// Runtime configuration, sourced from the environment (optionally seeded
/// from a `.env` file).
#[derive(Debug, Clone)]
pub struct Config {
    /// Saturn API endpoint. All operations POST to this single URL.
    pub url: String,
    /// Content-Type header sent with every request.
    pub content_type: String,
    /// Authorization header sent with every request.
    pub authorization: String,
    /// Our contractor id; the `delivered` command fetches invoices
    /// addressed to it.
    pub contractor_id: i64,
    /// Page size for invoice listing requests.
    pub page_size: u32,
    /// Path of the debug log file.
    pub log_file: PathBuf,
    /// Warehouse substituted when a delivery record carries no usable
    /// destination warehouse id.
    pub fallback_warehouse_id: i64,
}

impl Config {
    /// Load configuration, reading a `.env` file first if one is present.
    /// Fails fast when `URL` or `AUTHORIZATION` is absent so no request is
    /// ever attempted without credentials.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Build configuration from already-populated environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            url: required("URL")?,
            content_type: string_or(var("CONTENT_TYPE"), "application/json"),
            authorization: required("AUTHORIZATION")?,
            contractor_id: parsed_or(var("CONTRACTOR_ID"), 248_824),
            page_size: parsed_or(var("PAGE_SIZE"), 200),
            log_file: PathBuf::from(string_or(var("LOG_FILE"), "invoice_service.log")),
            fallback_warehouse_id: parsed_or(var("FALLBACK_WAREHOUSE_ID"), 1_085_300),
        })
    }

    /// Authorization value safe for terminal output.
    pub fn masked_authorization(&self) -> String {
        mask(&self.authorization)
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &'static str) -> Result<String> {
    var(name).ok_or(ServiceError::MissingEnv(name))
}

fn string_or(raw: Option<String>, default: &str) -> String {
    raw.unwrap_or_else(|| default.to_string())
}

/// Parse an override, falling back to the default when the value is absent
/// or not a valid number.
fn parsed_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn mask(value: &str) -> String {
    if value.chars().count() <= 8 {
        return "********".to_string();
    }
    let prefix: String = value.chars().take(8).collect();
    format!("{prefix}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_or_accepts_valid_numbers() {
        assert_eq!(parsed_or(Some("42".to_string()), 7i64), 42);
        assert_eq!(parsed_or(Some(" 42 ".to_string()), 7i64), 42);
    }

    #[test]
    fn parsed_or_falls_back_on_garbage() {
        assert_eq!(parsed_or(Some("many".to_string()), 200u32), 200);
        assert_eq!(parsed_or(None, 200u32), 200);
    }

    #[test]
    fn string_or_prefers_the_override() {
        assert_eq!(string_or(Some("text/json".into()), "application/json"), "text/json");
        assert_eq!(string_or(None, "application/json"), "application/json");
    }

    #[test]
    fn mask_never_reveals_short_tokens() {
        assert_eq!(mask("secret"), "********");
        assert_eq!(mask("Bearer 0123456789abcdef"), "Bearer 0…");
    }
}
