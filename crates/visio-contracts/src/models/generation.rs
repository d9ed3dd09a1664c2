use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const MAX_IMAGES_PER_REQUEST: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "3:4")]
    Portrait3x4,
    #[serde(rename = "4:3")]
    Landscape4x3,
    #[serde(rename = "9:16")]
    Portrait9x16,
    #[serde(rename = "16:9")]
    Landscape16x9,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Portrait3x4,
        AspectRatio::Landscape4x3,
        AspectRatio::Portrait9x16,
        AspectRatio::Landscape16x9,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Landscape16x9 => "16:9",
        }
    }

    fn parts(&self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1, 1),
            AspectRatio::Portrait3x4 => (3, 4),
            AspectRatio::Landscape4x3 => (4, 3),
            AspectRatio::Portrait9x16 => (9, 16),
            AspectRatio::Landscape16x9 => (16, 9),
        }
    }

    pub fn dimensions(&self, long_edge: u32) -> (u32, u32) {
        let (w, h) = self.parts();
        if w >= h {
            (long_edge, (long_edge * h / w).max(1))
        } else {
            ((long_edge * w / h).max(1), long_edge)
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace('/', ":");
        match normalized.as_str() {
            "square" => return Ok(AspectRatio::Square),
            "portrait" | "tall" => return Ok(AspectRatio::Portrait9x16),
            "landscape" | "wide" => return Ok(AspectRatio::Landscape16x9),
            _ => {}
        }
        AspectRatio::ALL
            .into_iter()
            .find(|ratio| ratio.as_str() == normalized)
            .ok_or_else(|| {
                let allowed = AspectRatio::ALL
                    .iter()
                    .map(AspectRatio::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Unsupported aspect ratio '{}'; expected one of {allowed}.", raw.trim())
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredGenerationConfig")]
pub struct GenerationConfig {
    pub number_of_images: u8,
    pub aspect_ratio: AspectRatio,
}

// Stored configs may carry any integer count; it is clamped on the way in.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredGenerationConfig {
    number_of_images: i64,
    #[serde(default)]
    aspect_ratio: AspectRatio,
}

impl From<StoredGenerationConfig> for GenerationConfig {
    fn from(stored: StoredGenerationConfig) -> Self {
        let count = stored
            .number_of_images
            .clamp(1, i64::from(MAX_IMAGES_PER_REQUEST));
        Self::new(u8::try_from(count).unwrap_or(1), stored.aspect_ratio)
    }
}

impl GenerationConfig {
    pub fn new(number_of_images: u8, aspect_ratio: AspectRatio) -> Self {
        Self {
            number_of_images: number_of_images.clamp(1, MAX_IMAGES_PER_REQUEST),
            aspect_ratio,
        }
    }

    pub fn for_edit(&self) -> Self {
        Self::new(1, self.aspect_ratio)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::new(1, AspectRatio::Square)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{AspectRatio, GenerationConfig};

    #[test]
    fn config_clamps_image_count() {
        assert_eq!(GenerationConfig::new(0, AspectRatio::Square).number_of_images, 1);
        assert_eq!(GenerationConfig::new(9, AspectRatio::Square).number_of_images, 4);
        assert_eq!(GenerationConfig::new(3, AspectRatio::Square).number_of_images, 3);
    }

    #[test]
    fn config_serializes_with_wire_names() -> anyhow::Result<()> {
        let config = GenerationConfig::new(2, AspectRatio::Landscape16x9);
        assert_eq!(
            serde_json::to_value(config)?,
            json!({"numberOfImages": 2, "aspectRatio": "16:9"})
        );
        Ok(())
    }

    #[test]
    fn stored_counts_are_clamped_on_load() -> anyhow::Result<()> {
        let low: GenerationConfig =
            serde_json::from_value(json!({"numberOfImages": 0, "aspectRatio": "3:4"}))?;
        let high: GenerationConfig =
            serde_json::from_value(json!({"numberOfImages": 9, "aspectRatio": "1:1"}))?;
        let huge: GenerationConfig =
            serde_json::from_value(json!({"numberOfImages": 300, "aspectRatio": "1:1"}))?;
        let negative: GenerationConfig =
            serde_json::from_value(json!({"numberOfImages": -2, "aspectRatio": "1:1"}))?;
        assert_eq!(low, GenerationConfig::new(1, AspectRatio::Portrait3x4));
        assert_eq!(high.number_of_images, 4);
        assert_eq!(huge.number_of_images, 4);
        assert_eq!(negative.number_of_images, 1);
        Ok(())
    }

    #[test]
    fn aspect_ratio_parses_aliases_and_slashes() {
        assert_eq!("4/3".parse::<AspectRatio>(), Ok(AspectRatio::Landscape4x3));
        assert_eq!(" Portrait ".parse::<AspectRatio>(), Ok(AspectRatio::Portrait9x16));
        assert!("2:1".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn dimensions_keep_long_edge() {
        assert_eq!(AspectRatio::Landscape16x9.dimensions(256), (256, 144));
        assert_eq!(AspectRatio::Portrait3x4.dimensions(256), (192, 256));
        assert_eq!(AspectRatio::Square.dimensions(64), (64, 64));
    }
}
