use std::io::Cursor;

use anyhow::{Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};
use visio_contracts::models::{AspectRatio, ImageRef};

use super::{ImageProvider, ProviderGenerateRequest, ProviderGenerateResponse};

const LONG_EDGE: u32 = 256;

pub struct DryrunProvider;

impl ImageProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &ProviderGenerateRequest) -> Result<ProviderGenerateResponse> {
        let source_dims = request
            .source
            .as_ref()
            .and_then(|source| source.to_ref().decode().ok())
            .and_then(|bytes| image::load_from_memory(&bytes).ok())
            .map(|decoded| (decoded.width(), decoded.height()));
        let (width, height) = source_dims.unwrap_or_else(|| {
            request
                .aspect_ratio
                .unwrap_or(AspectRatio::Square)
                .dimensions(LONG_EDGE)
        });
        let source_seed = request
            .source
            .as_ref()
            .map(|source| source.base64.as_str())
            .unwrap_or_default();

        let mut images = Vec::new();
        for idx in 0..request.n.max(1) {
            let (r, g, b) = color_from_prompt(&request.prompt, source_seed, idx);
            let bytes = encode_png(&RgbImage::from_pixel(width, height, Rgb([r, g, b])))?;
            images.push(ImageRef::from_bytes("image/png", &bytes));
        }

        Ok(ProviderGenerateResponse {
            images,
            warnings: Vec::new(),
        })
    }
}

fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .context("failed to encode dryrun image")?;
    Ok(out.into_inner())
}

fn color_from_prompt(prompt: &str, source: &str, idx: u8) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(source.as_bytes());
    hasher.update([idx]);
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}
