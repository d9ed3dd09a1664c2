use thiserror::Error;
use visio_contracts::quota::QuotaLimit;

pub const UNKNOWN_GENERATION_ERROR: &str = "An unknown error occurred while generating images.";
pub const UNEXPECTED_ERROR_FALLBACK: &str = "An unexpected error occurred.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct GenerationFailure {
    message: String,
}

impl GenerationFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn wrap(detail: &str) -> Self {
        let detail = detail.trim();
        if detail.is_empty() {
            return Self::new(UNKNOWN_GENERATION_ERROR);
        }
        Self::new(format!("Failed to generate images: {detail}"))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Prompt is empty.")]
    EmptyPrompt,
    #[error("You have reached your generation limit of {limit}. Please enter a new coupon code to continue.")]
    LimitReached { limit: QuotaLimit },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitRejected {
    #[error("A generation is already in progress.")]
    Busy,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}
