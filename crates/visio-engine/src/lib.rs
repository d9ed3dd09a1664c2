pub mod client;
pub mod error;
pub mod providers;
pub mod session;
mod transport;

pub use client::{ImageGenerationClient, ImageGenerator, ProviderRoute};
pub use error::{
    GenerationFailure, SubmitRejected, ValidationError, UNEXPECTED_ERROR_FALLBACK,
    UNKNOWN_GENERATION_ERROR,
};
pub use session::{PendingGeneration, SessionController, SessionPhase, SubmitOutcome};
pub use transport::HttpTransport;
