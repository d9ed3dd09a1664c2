use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::Value;
use visio_contracts::config::Settings;

#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: HttpClient,
    api_base: String,
    api_key: Option<String>,
    timeout_s: f64,
    max_retries: usize,
    retry_backoff_s: f64,
}

impl HttpTransport {
    pub fn new(settings: &Settings, api_key: Option<String>) -> Self {
        Self {
            http: HttpClient::new(),
            api_base: settings.api_base.clone(),
            api_key,
            timeout_s: settings.request_timeout_s,
            max_retries: settings.transport_retries,
            retry_backoff_s: settings.retry_backoff_s,
        }
    }

    pub fn endpoint(&self, model: &str, method: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{model_path}:{method}", self.api_base)
    }

    pub fn post_json(
        &self,
        provider: &str,
        endpoint: &str,
        payload: &Value,
        warnings: &mut Vec<String>,
    ) -> Result<Value> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        for attempt in 0..=self.max_retries {
            let response = self
                .http
                .post(endpoint)
                .query(&[("key", api_key)])
                .timeout(Duration::from_secs_f64(self.timeout_s))
                .json(payload)
                .send();

            match response {
                Ok(ok) => return response_json_or_error(provider, ok),
                Err(raw) => {
                    let err = anyhow::Error::new(raw).context(format!("{provider} request failed"));
                    if !is_retryable_transport_error(&err) || attempt >= self.max_retries {
                        return Err(err);
                    }
                    tracing::debug!(provider, attempt, "retrying after transport failure");
                    push_unique_warning(
                        warnings,
                        format!(
                            "{provider} transport retry {}/{} after transient request failure.",
                            attempt + 1,
                            self.max_retries
                        ),
                    );
                    let delay_s = self.retry_backoff_s * (attempt as f64 + 1.0);
                    thread::sleep(Duration::from_secs_f64(delay_s));
                }
            }
        }

        unreachable!("transport retry loop always returns a response or error")
    }
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            api_error_message(&body).unwrap_or_else(|| truncate_text(&body, 512))
        );
    }
    serde_json::from_str(&body).with_context(|| format!("{provider} returned invalid JSON payload"))
}

fn api_error_message(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    parsed
        .get("error")?
        .get("message")?
        .as_str()
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(|message| truncate_text(message, 512))
}

fn is_retryable_transport_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .map(|reqwest_err| reqwest_err.is_timeout() || reqwest_err.is_connect())
            .unwrap_or(false)
    })
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() || parts.last().map(String::as_str) == Some(trimmed) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    truncate_text(&parts.join(": "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub(crate) fn push_unique_warning(warnings: &mut Vec<String>, message: String) {
    if message.trim().is_empty() || warnings.contains(&message) {
        return;
    }
    warnings.push(message);
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use visio_contracts::config::Settings;

    use super::{api_error_message, error_chain_text, push_unique_warning, truncate_text, HttpTransport};

    #[test]
    fn endpoint_prefixes_models_path_once() {
        let transport = HttpTransport::new(&Settings::default(), None);
        assert_eq!(
            transport.endpoint("imagen-4.0-generate-001", "predict"),
            "https://generativelanguage.googleapis.com/v1beta/models/imagen-4.0-generate-001:predict"
        );
        assert_eq!(
            transport.endpoint("models/gemini-2.5-flash-image", "generateContent"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
    }

    #[test]
    fn missing_api_key_fails_before_network() {
        let transport = HttpTransport::new(&Settings::default(), None);
        let mut warnings = Vec::new();
        let err = transport
            .post_json("Imagen", "http://127.0.0.1:9/none", &serde_json::json!({}), &mut warnings)
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert_eq!(err, "GEMINI_API_KEY or GOOGLE_API_KEY not set");
    }

    #[test]
    fn api_error_message_reads_google_error_shape() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(api_error_message(body).as_deref(), Some("API key not valid."));
        assert_eq!(api_error_message("<html>oops</html>"), None);
    }

    #[test]
    fn error_chain_text_skips_duplicates() {
        let err = anyhow!("connection reset")
            .context("connection reset")
            .context("Gemini request failed");
        assert_eq!(
            error_chain_text(&err, 200),
            "Gemini request failed: connection reset"
        );
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }

    #[test]
    fn warnings_are_deduplicated() {
        let mut warnings = Vec::new();
        push_unique_warning(&mut warnings, "a".to_string());
        push_unique_warning(&mut warnings, "a".to_string());
        push_unique_warning(&mut warnings, " ".to_string());
        assert_eq!(warnings, vec!["a".to_string()]);
    }
}
