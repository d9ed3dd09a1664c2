use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::models::{extension_for_mime, ImageRef};

#[derive(Debug, Clone)]
pub struct ImagePreview {
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub dimensions: Option<(u32, u32)>,
}

impl ImagePreview {
    pub fn open(reference: &ImageRef) -> Result<Self> {
        let bytes = reference.decode()?;
        let mime_type = reference.mime_type().unwrap_or("image/jpeg").to_string();
        let dimensions = image::load_from_memory(&bytes)
            .ok()
            .map(|decoded| (decoded.width(), decoded.height()));
        Ok(Self {
            mime_type,
            bytes,
            dimensions,
        })
    }

    pub fn describe(&self) -> String {
        let size = match self.dimensions {
            Some((width, height)) => format!("{width}x{height}"),
            None => "unknown size".to_string(),
        };
        format!("{} image, {size}, {} bytes", self.mime_type, self.bytes.len())
    }

    pub fn download_file_name(&self, unix_millis: i64) -> String {
        format!(
            "ai-generated-image-{unix_millis}.{}",
            extension_for_mime(&self.mime_type)
        )
    }

    // Writes the image into `dir`, named after the current time. Existing
    // files are never overwritten.
    pub fn download(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let mut unix_millis = chrono::Utc::now().timestamp_millis();
        let mut path = dir.join(self.download_file_name(unix_millis));
        while path.exists() {
            unix_millis += 1;
            path = dir.join(self.download_file_name(unix_millis));
        }
        std::fs::write(&path, &self.bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb, RgbImage};

    use super::ImagePreview;
    use crate::models::ImageRef;

    fn png_ref(width: u32, height: u32) -> anyhow::Result<ImageRef> {
        let image = RgbImage::from_pixel(width, height, Rgb([10, 20, 30]));
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageFormat::Png)?;
        Ok(ImageRef::from_bytes("image/png", bytes.get_ref()))
    }

    #[test]
    fn preview_reports_dimensions() -> anyhow::Result<()> {
        let preview = ImagePreview::open(&png_ref(12, 7)?)?;
        assert_eq!(preview.dimensions, Some((12, 7)));
        assert!(preview.describe().starts_with("image/png image, 12x7"));
        Ok(())
    }

    #[test]
    fn download_names_file_by_time_and_mime() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let preview = ImagePreview::open(&png_ref(4, 4)?)?;
        assert_eq!(preview.download_file_name(17), "ai-generated-image-17.png");

        let path = preview.download(&temp.path().join("out"))?;
        let name = path.file_name().and_then(|name| name.to_str()).unwrap_or("");
        assert!(name.starts_with("ai-generated-image-"));
        assert!(name.ends_with(".png"));
        assert_eq!(std::fs::read(path)?, preview.bytes);
        Ok(())
    }

    #[test]
    fn repeated_downloads_do_not_overwrite() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let preview = ImagePreview::open(&png_ref(2, 2)?)?;
        let first = preview.download(temp.path())?;
        let second = preview.download(temp.path())?;
        assert_ne!(first, second);
        assert_eq!(std::fs::read_dir(temp.path())?.count(), 2);
        Ok(())
    }

    #[test]
    fn undecodable_payload_still_downloads() -> anyhow::Result<()> {
        let preview = ImagePreview::open(&ImageRef::from_bytes("image/jpeg", b"not really"))?;
        assert_eq!(preview.dimensions, None);
        assert_eq!(preview.download_file_name(1), "ai-generated-image-1.jpeg");
        Ok(())
    }

    #[test]
    fn malformed_reference_fails_to_open() {
        assert!(ImagePreview::open(&ImageRef::new("data:image/png;base64")).is_err());
    }
}
