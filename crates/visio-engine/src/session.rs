use std::sync::{Arc, Weak};

use chrono::Utc;
use uuid::Uuid;
use visio_contracts::events::{EventWriter, GenerationMode, SessionEvent};
use visio_contracts::models::{AspectRatio, GenerationConfig, HistoryItem, ImageRef, UploadedImage};
use visio_contracts::quota::{CouponRejected, QuotaLimit, QuotaState};
use visio_contracts::store::{KeyValueStorage, PersistentStore};
use visio_contracts::suggest::clamp_prompt;

use crate::client::ImageGenerator;
use crate::error::{GenerationFailure, SubmitRejected, ValidationError, UNEXPECTED_ERROR_FALLBACK};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    InFlight,
    Success,
    Failed,
}

/// The one generation currently allowed to run. Handed out by
/// [`SessionController::begin`] and resolved by [`SessionController::finish`]
/// or [`SessionController::abandon`]. Dropping it also releases the session.
#[must_use = "an in-flight generation must be finished"]
#[derive(Debug)]
pub struct PendingGeneration {
    prompt: String,
    config: GenerationConfig,
    source: Option<UploadedImage>,
    live: Arc<()>,
}

impl PendingGeneration {
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn source(&self) -> Option<&UploadedImage> {
        self.source.as_ref()
    }

    pub fn mode(&self) -> GenerationMode {
        if self.source.is_some() {
            GenerationMode::Edit
        } else {
            GenerationMode::Prompt
        }
    }

    pub fn run(&self, generator: &dyn ImageGenerator) -> Result<Vec<ImageRef>, GenerationFailure> {
        match self.source.as_ref() {
            Some(source) => generator.generate_from_image_and_prompt(&self.prompt, source),
            None => generator.generate_from_prompt(&self.prompt, &self.config),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Succeeded(HistoryItem),
    Failed(String),
    Rejected(SubmitRejected),
}

pub struct SessionController<S: KeyValueStorage> {
    store: PersistentStore<S>,
    history: Vec<HistoryItem>,
    quota: QuotaState,
    prompt: String,
    config: GenerationConfig,
    uploaded_image: Option<UploadedImage>,
    images: Vec<ImageRef>,
    error: Option<String>,
    phase: SessionPhase,
    in_flight: Weak<()>,
    events: Option<EventWriter>,
}

impl<S: KeyValueStorage> SessionController<S> {
    pub fn load(store: PersistentStore<S>) -> Self {
        let snapshot = store.load_snapshot();
        Self {
            store,
            history: snapshot.history,
            quota: snapshot.quota,
            prompt: String::new(),
            config: GenerationConfig::default(),
            uploaded_image: None,
            images: Vec::new(),
            error: None,
            phase: SessionPhase::Idle,
            in_flight: Weak::new(),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self.emit(SessionEvent::SessionStarted {
            history_items: self.history.len(),
            count: self.quota.count,
            limit: self.quota.limit.to_string(),
        });
        self
    }

    pub fn phase(&self) -> SessionPhase {
        if self.phase == SessionPhase::InFlight && !self.is_in_flight() {
            return SessionPhase::Idle;
        }
        self.phase
    }

    // In flight only while the ticket from `begin` is still alive.
    pub fn is_in_flight(&self) -> bool {
        self.phase == SessionPhase::InFlight && self.in_flight.strong_count() > 0
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn uploaded_image(&self) -> Option<&UploadedImage> {
        self.uploaded_image.as_ref()
    }

    pub fn images(&self) -> &[ImageRef] {
        &self.images
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn history(&self) -> &[HistoryItem] {
        &self.history
    }

    pub fn quota(&self) -> &QuotaState {
        &self.quota
    }

    pub fn store(&self) -> &PersistentStore<S> {
        &self.store
    }

    pub fn set_prompt(&mut self, prompt: &str) {
        self.prompt = clamp_prompt(prompt).to_string();
    }

    pub fn set_image_count(&mut self, count: u8) {
        self.config = GenerationConfig::new(count, self.config.aspect_ratio);
    }

    pub fn set_aspect_ratio(&mut self, ratio: AspectRatio) {
        self.config = GenerationConfig::new(self.config.number_of_images, ratio);
    }

    pub fn attach_image(&mut self, image: UploadedImage) {
        self.uploaded_image = Some(image);
    }

    pub fn detach_image(&mut self) -> Option<UploadedImage> {
        self.uploaded_image.take()
    }

    pub fn begin(
        &mut self,
        prompt: &str,
        config: GenerationConfig,
        image: Option<UploadedImage>,
    ) -> Result<PendingGeneration, SubmitRejected> {
        if self.is_in_flight() {
            self.emit_rejected(&SubmitRejected::Busy);
            return Err(SubmitRejected::Busy);
        }
        if self.phase == SessionPhase::InFlight {
            tracing::warn!("previous generation was dropped without finishing");
            self.phase = SessionPhase::Idle;
        }
        if prompt.trim().is_empty() {
            return Err(ValidationError::EmptyPrompt.into());
        }
        if !self.quota.can_generate() {
            let rejected = ValidationError::LimitReached {
                limit: self.quota.limit,
            };
            self.error = Some(rejected.to_string());
            let rejected = SubmitRejected::from(rejected);
            self.emit_rejected(&rejected);
            return Err(rejected);
        }

        let config = if image.is_some() {
            config.for_edit()
        } else {
            config
        };
        let pending = PendingGeneration {
            prompt: prompt.to_string(),
            config,
            source: image,
            live: Arc::new(()),
        };
        self.in_flight = Arc::downgrade(&pending.live);
        self.phase = SessionPhase::InFlight;
        self.error = None;
        self.images.clear();
        self.emit(SessionEvent::GenerationStarted {
            prompt: pending.prompt.clone(),
            mode: pending.mode(),
            number_of_images: pending.config.number_of_images,
            aspect_ratio: pending.config.aspect_ratio.to_string(),
        });
        Ok(pending)
    }

    pub fn finish(
        &mut self,
        pending: PendingGeneration,
        outcome: Result<Vec<ImageRef>, GenerationFailure>,
    ) -> SubmitOutcome {
        match outcome {
            Ok(images) => {
                let item = HistoryItem {
                    id: Uuid::new_v4().to_string(),
                    prompt: pending.prompt,
                    images: images.clone(),
                    config: pending.config,
                    timestamp: Utc::now().timestamp_millis(),
                    source_image: pending.source.as_ref().map(UploadedImage::to_ref),
                };
                self.images = images;
                self.quota.record_generation();
                self.history.insert(0, item.clone());
                self.store.save_history(&self.history);
                self.store.save_quota(&self.quota);
                self.phase = SessionPhase::Success;
                self.emit(SessionEvent::GenerationSucceeded {
                    history_id: item.id.clone(),
                    images: item.images.len(),
                    count: self.quota.count,
                });
                SubmitOutcome::Succeeded(item)
            }
            Err(failure) => {
                let message = if failure.message().trim().is_empty() {
                    UNEXPECTED_ERROR_FALLBACK.to_string()
                } else {
                    failure.message().to_string()
                };
                self.images.clear();
                self.error = Some(message.clone());
                self.phase = SessionPhase::Failed;
                self.emit(SessionEvent::GenerationFailed {
                    message: message.clone(),
                });
                SubmitOutcome::Failed(message)
            }
        }
    }

    pub fn abandon(&mut self, pending: PendingGeneration) {
        drop(pending);
        self.in_flight = Weak::new();
        self.phase = SessionPhase::Idle;
        self.emit(SessionEvent::GenerationFailed {
            message: "generation abandoned".to_string(),
        });
    }

    pub fn submit(
        &mut self,
        generator: &dyn ImageGenerator,
        prompt: &str,
        config: GenerationConfig,
        image: Option<UploadedImage>,
    ) -> SubmitOutcome {
        let pending = match self.begin(prompt, config, image) {
            Ok(pending) => pending,
            Err(rejected) => return SubmitOutcome::Rejected(rejected),
        };
        let outcome = pending.run(generator);
        self.finish(pending, outcome)
    }

    pub fn submit_current(&mut self, generator: &dyn ImageGenerator) -> SubmitOutcome {
        let prompt = self.prompt.clone();
        let image = self.uploaded_image.clone();
        self.submit(generator, &prompt, self.config, image)
    }

    pub fn redeem_coupon(&mut self, code: &str) -> Result<QuotaLimit, CouponRejected> {
        match self.quota.redeem(code) {
            Ok(limit) => {
                self.store.save_quota(&self.quota);
                self.emit(SessionEvent::CouponApplied {
                    limit: limit.to_string(),
                });
                Ok(limit)
            }
            Err(err) => {
                self.emit(SessionEvent::CouponRejected);
                Err(err)
            }
        }
    }

    pub fn select_history_item(&mut self, index: usize) -> Option<&HistoryItem> {
        let item = self.history.get(index)?;
        self.prompt = item.prompt.clone();
        self.images.clear();
        self.error = None;
        self.uploaded_image = match item.source_image.as_ref() {
            Some(source) => {
                let restored = source.to_uploaded_image();
                if restored.is_none() {
                    tracing::warn!(history_id = %item.id, "invalid source image format in history item");
                }
                restored
            }
            None => None,
        };
        self.history.get(index)
    }

    pub fn gallery(&self) -> Vec<&ImageRef> {
        self.history.iter().flat_map(|item| item.images.iter()).collect()
    }

    fn emit_rejected(&self, rejected: &SubmitRejected) {
        self.emit(SessionEvent::GenerationRejected {
            reason: rejected.to_string(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        if let Err(err) = events.emit(&event) {
            tracing::warn!(path = %events.path().display(), error = %err, "failed to append session event");
        }
    }
}
