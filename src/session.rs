//! Session state machine.
//!
//! ```text
//!            valid file                analyze               Ok
//!   Idle ───────────────▶ Ready ───────────────▶ Requesting ─────▶ Success
//!    ▲                      ▲                        │  Err
//!    │ invalid file         │ valid file (any phase) └──────▶ Failed
//!    └──────────────────────┴─────────────── analyze again from Success/Failed
//! ```
//!
//! Every selection and every analysis trigger bumps a generation counter.
//! An [`AnalysisTicket`] carries the generation it was issued under, and its
//! [`Completion`] is only applied if that generation is still current. A
//! response that arrives after the user picked another file is therefore
//! discarded rather than attached to the wrong image.
//!
//! The session never performs I/O. The caller takes the ticket, runs the
//! analysis (see [`crate::analyze::run_analysis`]) and hands the completion
//! back through [`Session::finish`].

use crate::error::{AnalysisFailure, SessionError, ValidationError};
use crate::pipeline::ingest::{validate, FileCandidate, ImageAsset};
use crate::pipeline::llm::AnalysisResult;
use crate::progress::{NoopObserver, ObserverHandle};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const MSG_INVALID_FILE: &str = "Please upload a valid image file.";
pub const MSG_NO_IMAGE: &str = "Please upload an image before submitting.";
pub const MSG_ANALYSIS_FAILED: &str = "Failed to analyze image. Please try again.";
pub const MSG_READ_FAILED: &str = "Could not read the selected image. Please try again.";
pub const STATUS_ANALYZING: &str = "Analyzing your embryo image...";

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    Idle,
    Ready,
    Requesting,
    Success,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Ready => "ready",
            Phase::Requesting => "requesting",
            Phase::Success => "success",
            Phase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Permission to run one analysis for one asset.
#[derive(Debug, Clone)]
pub struct AnalysisTicket {
    pub generation: u64,
    pub asset: ImageAsset,
}

/// The outcome of a ticket, handed back to [`Session::finish`].
#[derive(Debug)]
pub struct Completion {
    pub generation: u64,
    pub outcome: Result<AnalysisResult, AnalysisFailure>,
}

/// What [`Session::finish`] did with a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied(Phase),
    Discarded { stale: u64, current: u64 },
}

/// One user's working state: the current image, the last result and the
/// message shown to them.
pub struct Session {
    phase: Phase,
    asset: Option<ImageAsset>,
    result: Option<AnalysisResult>,
    message: Option<String>,
    diagnostic: Option<String>,
    generation: u64,
    observer: ObserverHandle,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("phase", &self.phase)
            .field("asset", &self.asset.as_ref().map(|a| a.name.as_str()))
            .field("has_result", &self.result.is_some())
            .field("message", &self.message)
            .field("generation", &self.generation)
            .finish()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            asset: None,
            result: None,
            message: None,
            diagnostic: None,
            generation: 0,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: ObserverHandle) -> Self {
        self.observer = observer;
        self
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn asset(&self) -> Option<&ImageAsset> {
        self.asset.as_ref()
    }

    /// Present iff the phase is [`Phase::Success`].
    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    /// The message to show the user, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Underlying error text of the last failure, for logs and `status`.
    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Transient status line shown while a call is outstanding.
    pub fn status_line(&self) -> Option<&'static str> {
        (self.phase == Phase::Requesting).then_some(STATUS_ANALYZING)
    }

    pub fn can_export(&self) -> bool {
        self.phase == Phase::Success && self.result.is_some()
    }

    // ── Transitions ──────────────────────────────────────────────────────

    fn set_phase(&mut self, to: Phase) {
        let from = self.phase;
        self.phase = to;
        if from != to {
            debug!("Session phase {} -> {}", from, to);
            self.observer.on_phase_change(from, to);
        }
    }

    fn set_message(&mut self, message: &str) {
        self.message = Some(message.to_string());
        self.observer.on_message(message);
    }

    /// Offer a file. A valid image replaces the held asset and moves to
    /// `Ready`; anything else clears the asset and returns to `Idle`.
    ///
    /// Either way any outstanding ticket becomes stale.
    pub fn select_file(&mut self, candidate: FileCandidate) -> Result<&ImageAsset, ValidationError> {
        self.generation += 1;
        self.result = None;
        self.diagnostic = None;

        match validate(candidate) {
            Ok(asset) => {
                info!("Selected '{}' ({})", asset.name, asset.mime);
                self.message = None;
                self.set_phase(Phase::Ready);
                Ok(self.asset.insert(asset))
            }
            Err(e) => {
                warn!("Rejected selection: {}", e);
                self.asset = None;
                self.set_message(MSG_INVALID_FILE);
                self.set_phase(Phase::Idle);
                Err(e)
            }
        }
    }

    /// Start an analysis of the held asset.
    ///
    /// Refused while one is already running, and when there is nothing to
    /// analyse. Neither refusal changes the phase.
    pub fn begin_analysis(&mut self) -> Result<AnalysisTicket, SessionError> {
        if self.phase == Phase::Requesting {
            debug!("Analysis already in flight (#{})", self.generation);
            return Err(SessionError::AnalysisInFlight {
                generation: self.generation,
            });
        }

        let asset = match &self.asset {
            Some(asset) => asset.clone(),
            None => {
                self.set_message(MSG_NO_IMAGE);
                return Err(SessionError::NoImage);
            }
        };

        self.generation += 1;
        self.result = None;
        self.message = None;
        self.diagnostic = None;
        self.set_phase(Phase::Requesting);
        info!("Analysis #{} started for '{}'", self.generation, asset.name);

        Ok(AnalysisTicket {
            generation: self.generation,
            asset,
        })
    }

    /// Apply a completion if it belongs to the current generation.
    pub fn finish(&mut self, completion: Completion) -> Transition {
        if completion.generation != self.generation || self.phase != Phase::Requesting {
            warn!(
                "Discarding response for analysis #{} (current #{})",
                completion.generation, self.generation
            );
            self.observer
                .on_stale_response(completion.generation, self.generation);
            return Transition::Discarded {
                stale: completion.generation,
                current: self.generation,
            };
        }

        match completion.outcome {
            Ok(result) => {
                info!(
                    "Analysis #{} succeeded ({} chars)",
                    completion.generation,
                    result.markdown.len()
                );
                self.result = Some(result);
                self.set_phase(Phase::Success);
            }
            Err(failure) => {
                warn!("Analysis #{} failed: {}", completion.generation, failure);
                let message = match failure {
                    AnalysisFailure::Read(_) => MSG_READ_FAILED,
                    AnalysisFailure::Analysis(_) => MSG_ANALYSIS_FAILED,
                };
                self.diagnostic = Some(failure.to_string());
                self.set_message(message);
                self.set_phase(Phase::Failed);
            }
        }
        Transition::Applied(self.phase)
    }
}
