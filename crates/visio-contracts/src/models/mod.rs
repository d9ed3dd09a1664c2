mod generation;
mod history;
mod image_ref;

pub use generation::{AspectRatio, GenerationConfig, MAX_IMAGES_PER_REQUEST};
pub use history::HistoryItem;
pub use image_ref::{ImageRef, UploadedImage};

pub(crate) use image_ref::extension_for_mime;
