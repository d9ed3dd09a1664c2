use anyhow::{bail, Result};
use visio_contracts::config::{api_key, Settings};
use visio_contracts::models::{GenerationConfig, ImageRef, UploadedImage};

use crate::error::GenerationFailure;
use crate::providers::{
    provider_for_model, DryrunProvider, GeminiProvider, ImageProviderRegistry, ImagenProvider,
    ProviderGenerateRequest,
};
use crate::transport::{error_chain_text, HttpTransport};

const EMPTY_PROMPT_RESULT: &str = "No images were generated. The prompt may have been blocked.";
const EMPTY_EDIT_RESULT: &str = "The model did not return any images. The prompt may have been blocked or the model couldn't fulfill the request.";

pub trait ImageGenerator: Send + Sync {
    fn generate_from_prompt(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<Vec<ImageRef>, GenerationFailure>;

    fn generate_from_image_and_prompt(
        &self,
        prompt: &str,
        image: &UploadedImage,
    ) -> Result<Vec<ImageRef>, GenerationFailure>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRoute {
    pub provider: String,
    pub model: String,
}

impl ProviderRoute {
    pub fn for_model(model: &str) -> Self {
        Self {
            provider: provider_for_model(model).to_string(),
            model: model.to_string(),
        }
    }
}

pub struct ImageGenerationClient {
    providers: ImageProviderRegistry,
    prompt_route: ProviderRoute,
    edit_route: ProviderRoute,
}

impl ImageGenerationClient {
    pub fn new(
        providers: ImageProviderRegistry,
        prompt_route: ProviderRoute,
        edit_route: ProviderRoute,
    ) -> Self {
        Self {
            providers,
            prompt_route,
            edit_route,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let mut providers = ImageProviderRegistry::new();
        providers.register(DryrunProvider);
        let transport = HttpTransport::new(settings, api_key());
        providers.register(ImagenProvider::new(transport.clone()));
        providers.register(GeminiProvider::new(transport));

        let (prompt_route, edit_route) = if settings.dryrun {
            (
                ProviderRoute::for_model("dryrun-image-1"),
                ProviderRoute::for_model("dryrun-edit-1"),
            )
        } else {
            (
                ProviderRoute::for_model(&settings.image_model),
                ProviderRoute::for_model(&settings.edit_model),
            )
        };
        Self::new(providers, prompt_route, edit_route)
    }

    pub fn prompt_route(&self) -> &ProviderRoute {
        &self.prompt_route
    }

    pub fn edit_route(&self) -> &ProviderRoute {
        &self.edit_route
    }

    fn dispatch(
        &self,
        route: &ProviderRoute,
        request: ProviderGenerateRequest,
        empty_message: &str,
    ) -> Result<Vec<ImageRef>, GenerationFailure> {
        self.run(route, &request, empty_message).map_err(|err| {
            let detail = error_chain_text(&err, 600);
            tracing::error!(provider = %route.provider, model = %route.model, error = %detail, "image generation failed");
            GenerationFailure::wrap(&detail)
        })
    }

    fn run(
        &self,
        route: &ProviderRoute,
        request: &ProviderGenerateRequest,
        empty_message: &str,
    ) -> Result<Vec<ImageRef>> {
        let Some(provider) = self.providers.get(&route.provider) else {
            bail!("image provider '{}' is not registered", route.provider);
        };
        let response = provider.generate(request)?;
        for warning in &response.warnings {
            tracing::warn!(provider = provider.name(), "{warning}");
        }
        if response.images.is_empty() {
            bail!("{empty_message}");
        }
        tracing::info!(
            provider = provider.name(),
            images = response.images.len(),
            "generation finished"
        );
        Ok(response.images)
    }
}

impl ImageGenerator for ImageGenerationClient {
    fn generate_from_prompt(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<Vec<ImageRef>, GenerationFailure> {
        let request = ProviderGenerateRequest {
            model: self.prompt_route.model.clone(),
            prompt: prompt.to_string(),
            n: config.number_of_images,
            aspect_ratio: Some(config.aspect_ratio),
            source: None,
        };
        self.dispatch(&self.prompt_route, request, EMPTY_PROMPT_RESULT)
    }

    fn generate_from_image_and_prompt(
        &self,
        prompt: &str,
        image: &UploadedImage,
    ) -> Result<Vec<ImageRef>, GenerationFailure> {
        let request = ProviderGenerateRequest {
            model: self.edit_route.model.clone(),
            prompt: prompt.to_string(),
            n: 1,
            aspect_ratio: None,
            source: Some(image.clone()),
        };
        self.dispatch(&self.edit_route, request, EMPTY_EDIT_RESULT)
    }
}
