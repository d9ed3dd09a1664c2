use std::collections::BTreeMap;

use anyhow::Result;
use visio_contracts::models::{AspectRatio, ImageRef, UploadedImage};

mod dryrun;
mod gemini;
mod imagen;

pub use dryrun::DryrunProvider;
pub use gemini::GeminiProvider;
pub use imagen::ImagenProvider;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderGenerateRequest {
    pub model: String,
    pub prompt: String,
    pub n: u8,
    pub aspect_ratio: Option<AspectRatio>,
    pub source: Option<UploadedImage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProviderGenerateResponse {
    pub images: Vec<ImageRef>,
    pub warnings: Vec<String>,
}

pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &ProviderGenerateRequest) -> Result<ProviderGenerateResponse>;
}

#[derive(Default)]
pub struct ImageProviderRegistry {
    providers: BTreeMap<String, Box<dyn ImageProvider>>,
}

impl ImageProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: ImageProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Box::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<&dyn ImageProvider> {
        self.providers.get(name).map(|provider| provider.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

pub fn provider_for_model(model: &str) -> &'static str {
    let lowered = model.trim().trim_start_matches("models/").to_ascii_lowercase();
    if lowered.starts_with("dryrun") {
        "dryrun"
    } else if lowered.starts_with("imagen") {
        "imagen"
    } else {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::{provider_for_model, DryrunProvider, ImageProviderRegistry};

    #[test]
    fn models_route_by_family() {
        assert_eq!(provider_for_model("imagen-4.0-generate-001"), "imagen");
        assert_eq!(provider_for_model("models/Imagen-3.0"), "imagen");
        assert_eq!(provider_for_model("gemini-2.5-flash-image"), "gemini");
        assert_eq!(provider_for_model("dryrun-image-1"), "dryrun");
    }

    #[test]
    fn registry_looks_up_by_name() {
        let mut registry = ImageProviderRegistry::new();
        registry.register(DryrunProvider);
        assert!(registry.get("dryrun").is_some());
        assert!(registry.get("imagen").is_none());
        assert_eq!(registry.names(), vec!["dryrun".to_string()]);
    }
}
