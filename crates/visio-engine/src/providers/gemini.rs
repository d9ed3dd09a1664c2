use anyhow::{bail, Result};
use serde_json::{json, Map, Value};
use visio_contracts::models::ImageRef;

use super::{ImageProvider, ProviderGenerateRequest, ProviderGenerateResponse};
use crate::transport::{push_unique_warning, HttpTransport};

pub(crate) const NO_CANDIDATES_MESSAGE: &str =
    "No images were generated. The prompt may have been blocked.";

pub struct GeminiProvider {
    transport: HttpTransport,
}

impl GeminiProvider {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }

    fn build_payload(request: &ProviderGenerateRequest) -> Value {
        let mut parts = Vec::new();
        if let Some(source) = request.source.as_ref() {
            parts.push(json!({
                "inlineData": {
                    "data": source.base64,
                    "mimeType": source.mime_type,
                }
            }));
        }
        parts.push(json!({ "text": request.prompt }));

        let mut generation_config = Map::new();
        generation_config.insert("responseModalities".to_string(), json!(["IMAGE", "TEXT"]));
        // With a source image the model keeps the source framing.
        if request.source.is_none() {
            if let Some(ratio) = request.aspect_ratio {
                generation_config.insert(
                    "imageConfig".to_string(),
                    json!({ "aspectRatio": ratio.as_str() }),
                );
            }
        }

        json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": generation_config,
        })
    }

    fn extract_images(response_payload: &Value, warnings: &mut Vec<String>) -> Result<Vec<ImageRef>> {
        let candidates = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let Some(first) = candidates.first() else {
            if let Some(reason) = response_payload
                .get("promptFeedback")
                .and_then(|feedback| feedback.get("blockReason"))
                .and_then(Value::as_str)
            {
                tracing::info!(reason, "Gemini blocked the prompt");
            }
            bail!(NO_CANDIDATES_MESSAGE);
        };

        let parts = first
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut out = Vec::new();
        for part in parts {
            let inline = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object);
            let Some(inline) = inline else {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    push_unique_warning(warnings, format!("Gemini said: {}", text.trim()));
                }
                continue;
            };
            let data = inline
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            let mime = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
                .unwrap_or("image/png");
            out.push(ImageRef::from_payload(mime, data));
        }
        Ok(out)
    }
}

impl ImageProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &ProviderGenerateRequest) -> Result<ProviderGenerateResponse> {
        let mut warnings = Vec::new();
        let endpoint = self.transport.endpoint(&request.model, "generateContent");
        let payload = Self::build_payload(request);
        let response_payload = self
            .transport
            .post_json("Gemini", &endpoint, &payload, &mut warnings)?;
        let images = Self::extract_images(&response_payload, &mut warnings)?;
        Ok(ProviderGenerateResponse { images, warnings })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use visio_contracts::models::{AspectRatio, UploadedImage};

    use super::{GeminiProvider, NO_CANDIDATES_MESSAGE};
    use crate::providers::ProviderGenerateRequest;

    fn edit_request() -> ProviderGenerateRequest {
        ProviderGenerateRequest {
            model: "gemini-2.5-flash-image".to_string(),
            prompt: "add a rainbow".to_string(),
            n: 1,
            aspect_ratio: Some(AspectRatio::Square),
            source: Some(UploadedImage::new("SRC", "image/webp")),
        }
    }

    #[test]
    fn payload_puts_image_before_instruction() {
        let payload = GeminiProvider::build_payload(&edit_request());
        let parts = &payload["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["data"], json!("SRC"));
        assert_eq!(parts[0]["inlineData"]["mimeType"], json!("image/webp"));
        assert_eq!(parts[1]["text"], json!("add a rainbow"));
        assert_eq!(
            payload["generationConfig"]["responseModalities"],
            json!(["IMAGE", "TEXT"])
        );
        assert!(payload["generationConfig"].get("imageConfig").is_none());
    }

    #[test]
    fn text_only_payload_requests_aspect_ratio() {
        let mut request = edit_request();
        request.source = None;
        request.aspect_ratio = Some(AspectRatio::Portrait9x16);
        let payload = GeminiProvider::build_payload(&request);
        assert_eq!(payload["contents"][0]["parts"].as_array().map(Vec::len), Some(1));
        assert_eq!(
            payload["generationConfig"]["imageConfig"]["aspectRatio"],
            json!("9:16")
        );
    }

    #[test]
    fn extract_keeps_images_and_skips_text() -> anyhow::Result<()> {
        let response = json!({
            "candidates": [
                {"content": {"parts": [
                    {"text": "Here is your edit."},
                    {"inlineData": {"mimeType": "image/png", "data": "AAAA"}},
                    {"inline_data": {"mime_type": "image/jpeg", "data": "BBBB"}},
                    {"inlineData": {"mimeType": "image/png", "data": ""}},
                ]}},
                {"content": {"parts": [{"inlineData": {"mimeType": "image/png", "data": "CCCC"}}]}},
            ]
        });
        let mut warnings = Vec::new();
        let images = GeminiProvider::extract_images(&response, &mut warnings)?;
        let rendered: Vec<&str> = images.iter().map(|image| image.as_str()).collect();
        assert_eq!(
            rendered,
            vec!["data:image/png;base64,AAAA", "data:image/jpeg;base64,BBBB"]
        );
        assert_eq!(warnings, vec!["Gemini said: Here is your edit.".to_string()]);
        Ok(())
    }

    #[test]
    fn text_only_candidate_yields_empty_list() -> anyhow::Result<()> {
        let response = json!({"candidates": [{"content": {"parts": [{"text": "I can't do that."}]}}]});
        let images = GeminiProvider::extract_images(&response, &mut Vec::new())?;
        assert!(images.is_empty());
        Ok(())
    }

    #[test]
    fn missing_candidates_is_an_error() {
        let response = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let err = GeminiProvider::extract_images(&response, &mut Vec::new())
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert_eq!(err, NO_CANDIDATES_MESSAGE);
    }
}
