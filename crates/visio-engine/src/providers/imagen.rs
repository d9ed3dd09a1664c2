use anyhow::Result;
use serde_json::{json, Map, Value};
use visio_contracts::models::{ImageRef, MAX_IMAGES_PER_REQUEST};

use super::{ImageProvider, ProviderGenerateRequest, ProviderGenerateResponse};
use crate::transport::{push_unique_warning, HttpTransport};

const OUTPUT_MIME: &str = "image/jpeg";

pub struct ImagenProvider {
    transport: HttpTransport,
}

impl ImagenProvider {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }

    fn build_payload(request: &ProviderGenerateRequest, warnings: &mut Vec<String>) -> Value {
        let sample_count = request.n.clamp(1, MAX_IMAGES_PER_REQUEST);
        if sample_count != request.n {
            push_unique_warning(
                warnings,
                format!("Imagen sampleCount clamped to {sample_count}."),
            );
        }
        if request.source.is_some() {
            push_unique_warning(
                warnings,
                "Imagen ignores source images; generating from the prompt only.".to_string(),
            );
        }
        let mut parameters = Map::new();
        parameters.insert("sampleCount".to_string(), json!(sample_count));
        parameters.insert("outputMimeType".to_string(), json!(OUTPUT_MIME));
        if let Some(ratio) = request.aspect_ratio {
            parameters.insert("aspectRatio".to_string(), json!(ratio.as_str()));
        }
        json!({
            "instances": [{ "prompt": request.prompt }],
            "parameters": parameters,
        })
    }

    fn extract_predictions(response_payload: &Value) -> Vec<ImageRef> {
        let predictions = response_payload
            .get("predictions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut out = Vec::new();
        for row in predictions {
            let Some(obj) = row.as_object() else {
                continue;
            };
            let nested = obj
                .get("image")
                .or_else(|| obj.get("generatedImage"))
                .and_then(Value::as_object);
            let source = match obj
                .get("bytesBase64Encoded")
                .or_else(|| obj.get("bytes_base64_encoded"))
            {
                Some(_) => Some(obj),
                None => nested,
            };
            let Some(source) = source else {
                continue;
            };
            let data = source
                .get("bytesBase64Encoded")
                .or_else(|| source.get("bytes_base64_encoded"))
                .or_else(|| source.get("imageBytes"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            let mime = source
                .get("mimeType")
                .or_else(|| source.get("mime_type"))
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
                .unwrap_or(OUTPUT_MIME);
            out.push(ImageRef::from_payload(mime, data));
        }
        out
    }
}

impl ImageProvider for ImagenProvider {
    fn name(&self) -> &str {
        "imagen"
    }

    fn generate(&self, request: &ProviderGenerateRequest) -> Result<ProviderGenerateResponse> {
        let mut warnings = Vec::new();
        let endpoint = self.transport.endpoint(&request.model, "predict");
        let payload = Self::build_payload(request, &mut warnings);
        let response_payload = self
            .transport
            .post_json("Imagen", &endpoint, &payload, &mut warnings)?;
        Ok(ProviderGenerateResponse {
            images: Self::extract_predictions(&response_payload),
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use visio_contracts::models::{AspectRatio, UploadedImage};

    use super::ImagenProvider;
    use crate::providers::ProviderGenerateRequest;

    fn request(n: u8) -> ProviderGenerateRequest {
        ProviderGenerateRequest {
            model: "imagen-4.0-generate-001".to_string(),
            prompt: "a lighthouse at dusk".to_string(),
            n,
            aspect_ratio: Some(AspectRatio::Landscape16x9),
            source: None,
        }
    }

    #[test]
    fn payload_carries_count_ratio_and_jpeg_output() {
        let mut warnings = Vec::new();
        let payload = ImagenProvider::build_payload(&request(3), &mut warnings);
        assert_eq!(payload["instances"][0]["prompt"], json!("a lighthouse at dusk"));
        assert_eq!(payload["parameters"]["sampleCount"], json!(3));
        assert_eq!(payload["parameters"]["aspectRatio"], json!("16:9"));
        assert_eq!(payload["parameters"]["outputMimeType"], json!("image/jpeg"));
        assert!(warnings.is_empty());
    }

    #[test]
    fn payload_clamps_and_warns() {
        let mut warnings = Vec::new();
        let mut req = request(9);
        req.source = Some(UploadedImage::new("AAAA", "image/png"));
        let payload = ImagenProvider::build_payload(&req, &mut warnings);
        assert_eq!(payload["parameters"]["sampleCount"], json!(4));
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn predictions_become_data_refs() {
        let response = json!({
            "predictions": [
                {"bytesBase64Encoded": "AAAA", "mimeType": "image/jpeg"},
                {"image": {"imageBytes": "BBBB"}},
                {"raiFilteredReason": "blocked"},
                "junk",
            ]
        });
        let images = ImagenProvider::extract_predictions(&response);
        let rendered: Vec<&str> = images.iter().map(|image| image.as_str()).collect();
        assert_eq!(
            rendered,
            vec!["data:image/jpeg;base64,AAAA", "data:image/jpeg;base64,BBBB"]
        );
    }

    #[test]
    fn missing_predictions_yield_no_images() {
        assert!(ImagenProvider::extract_predictions(&json!({})).is_empty());
    }
}
