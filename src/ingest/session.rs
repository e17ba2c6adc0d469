//! One upload page: selection, drop zone, and the analysis it triggers.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::analysis::{AnalysisOrchestrator, AnalysisResult, RequestState, SideInputs};
use crate::config::AppConfig;
use crate::error::AnalysisError;
use crate::ingest::{DropZone, DropZoneAction, DropZoneEvent, DropZoneState, Selection};
use crate::media::{CandidateFile, PreviewRef, ResourcePool, Validation, validate};

/// Options supplied by whoever mounts the page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageOptions {
    /// Send the user to the landing page once, on the first visit
    pub redirect_on_first_visit: bool,
    /// Preview shown while nothing is selected; never released by the session
    pub initial_preview: Option<String>,
}

/// How an analysis attempt ended, when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Completed(Box<AnalysisResult>),
    /// Another analysis was already running; the trigger was ignored
    Ignored,
    /// The selection changed while the request was in flight
    Stale { generation: u64 },
}

/// What the platform layer must do after a drop zone event.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneResponse {
    pub suppress_default: bool,
    pub open_picker: bool,
    /// Result of selecting a dropped payload, when there was a drop
    pub selection: Option<Result<u64, AnalysisError>>,
}

/// State of one upload page for one browsing session.
pub struct UploadSession {
    selection: RefCell<Selection>,
    drop_zone: Rc<RefCell<DropZone>>,
    orchestrator: AnalysisOrchestrator,
    last_error: RefCell<Option<AnalysisError>>,
    reset_key: Cell<u64>,
    redirect_pending: Cell<bool>,
}

impl UploadSession {
    /// Create a session. `build` receives the drop zone the orchestrator
    /// must disable while a request is pending.
    pub fn new<F>(pool: Rc<dyn ResourcePool>, options: PageOptions, build: F) -> Self
    where
        F: FnOnce(Rc<RefCell<DropZone>>) -> AnalysisOrchestrator,
    {
        let drop_zone = Rc::new(RefCell::new(DropZone::new()));
        let orchestrator = build(Rc::clone(&drop_zone));

        Self {
            selection: RefCell::new(Selection::new(pool, options.initial_preview)),
            drop_zone,
            orchestrator,
            last_error: RefCell::new(None),
            reset_key: Cell::new(0),
            redirect_pending: Cell::new(options.redirect_on_first_visit),
        }
    }

    /// Create a session talking to the endpoint named in `config`.
    pub fn from_app_config(
        pool: Rc<dyn ResourcePool>,
        options: PageOptions,
        config: &AppConfig,
    ) -> Self {
        Self::new(pool, options, |zone| {
            AnalysisOrchestrator::from_app_config(config, zone)
        })
    }

    /// Whether the landing redirect is still owed. Returns true at most once.
    pub fn take_redirect(&self) -> bool {
        self.redirect_pending.replace(false)
    }

    /// Feed one drop zone event through the state machine, selecting a
    /// dropped payload if there is one.
    pub fn handle_drop_zone_event(&self, event: DropZoneEvent) -> ZoneResponse {
        let outcome = self.drop_zone.borrow_mut().handle(event);

        let mut response = ZoneResponse {
            suppress_default: outcome.suppress_default,
            open_picker: false,
            selection: None,
        };
        match outcome.action {
            DropZoneAction::None => {}
            DropZoneAction::OpenPicker => response.open_picker = true,
            DropZoneAction::Validate(candidate) => {
                response.selection = Some(self.select(candidate));
            }
        }
        response
    }

    /// Apply a drop whose payload is still being read.
    ///
    /// The zone leaves its drag phase now. Returns whether the zone accepted
    /// the drop; if it did, the payload is offered through
    /// [`select`](Self::select) once it has been read.
    pub fn begin_drop(&self) -> bool {
        let outcome = self
            .drop_zone
            .borrow_mut()
            .handle(DropZoneEvent::Drop(None));
        matches!(outcome.action, DropZoneAction::Validate(_))
    }

    /// Offer a candidate from the picker or a drop.
    ///
    /// A rejected candidate leaves the current selection and preview alone.
    /// An accepted one supersedes the current selection and cancels any
    /// request made for it.
    pub fn select(&self, candidate: Option<CandidateFile>) -> Result<u64, AnalysisError> {
        let file = match validate(candidate) {
            Validation::Accepted(file) => file,
            Validation::Rejected(reason) => return Err(self.record(reason.into())),
        };

        self.orchestrator.cancel();
        let replaced = self.selection.borrow_mut().replace(file);
        match replaced {
            Ok(generation) => {
                self.last_error.replace(None);
                Ok(generation)
            }
            Err(e) => Err(self.record(AnalysisError::InvalidInput(e.to_string()))),
        }
    }

    /// Clear the selection and its preview.
    pub fn remove_image(&self) -> u64 {
        self.orchestrator.cancel();
        self.last_error.replace(None);
        self.selection.borrow_mut().clear()
    }

    /// Analyze the current selection.
    ///
    /// On success the selection is cleared and the reset key advances so the
    /// input surface can be reset. A busy trigger yields
    /// [`SessionOutcome::Ignored`]; an answer for a superseded selection
    /// yields [`SessionOutcome::Stale`].
    pub async fn analyze(&self, inputs: SideInputs) -> Result<SessionOutcome, AnalysisError> {
        let (file, generation) = {
            let selection = self.selection.borrow();
            (selection.file().cloned(), selection.generation())
        };

        let outcome = self.orchestrator.submit(file.as_ref(), inputs).await;

        if matches!(outcome, Err(AnalysisError::Busy)) {
            return Ok(SessionOutcome::Ignored);
        }
        if !self.selection.borrow().is_current(generation) {
            log::info!("Discarding analysis for superseded selection {}", generation);
            return Ok(SessionOutcome::Stale { generation });
        }

        match outcome {
            Ok(result) => {
                self.selection.borrow_mut().clear();
                self.reset_key.set(self.reset_key.get() + 1);
                self.last_error.replace(None);
                Ok(SessionOutcome::Completed(Box::new(result)))
            }
            Err(e) => Err(self.record(e)),
        }
    }

    /// Analyze with side inputs still in their form encoding.
    ///
    /// A date that does not parse is recorded like any other validation
    /// error and nothing is submitted.
    pub async fn analyze_form(
        &self,
        crossing_date: Option<&str>,
    ) -> Result<SessionOutcome, AnalysisError> {
        let inputs = SideInputs::from_form(crossing_date).map_err(|e| self.record(e))?;
        self.analyze(inputs).await
    }

    /// Cancel any request and release the preview.
    pub fn teardown(&self) {
        self.orchestrator.cancel();
        self.selection.borrow_mut().clear();
    }

    /// Record an error raised outside the session, such as a failed file
    /// read or an unparsable side input, as the error shown to the user.
    pub fn record_error(&self, err: AnalysisError) -> AnalysisError {
        self.record(err)
    }

    fn record(&self, err: AnalysisError) -> AnalysisError {
        log::warn!("⚠️ {}", err.user_message());
        self.last_error.replace(Some(err.clone()));
        err
    }

    pub fn drop_zone_state(&self) -> DropZoneState {
        self.drop_zone.borrow().state()
    }

    pub fn request_state(&self) -> RequestState {
        self.orchestrator.state()
    }

    pub fn orchestrator(&self) -> &AnalysisOrchestrator {
        &self.orchestrator
    }

    pub fn selected_file_name(&self) -> Option<String> {
        self.selection
            .borrow()
            .file()
            .map(|file| file.name().to_string())
    }

    /// URL of the preview currently shown, and whether the session owns it.
    pub fn preview(&self) -> Option<(String, bool)> {
        self.selection.borrow().preview().map(|preview| match preview {
            PreviewRef::Owned(url) => (url.to_string(), true),
            PreviewRef::External(url) => (url.to_string(), false),
        })
    }

    pub fn generation(&self) -> u64 {
        self.selection.borrow().generation()
    }

    pub fn last_error(&self) -> Option<AnalysisError> {
        self.last_error.borrow().clone()
    }

    /// Advances each time a completed analysis resets the input surface.
    pub fn reset_key(&self) -> u64 {
        self.reset_key.get()
    }

    /// Whether the analyze trigger should be offered.
    pub fn can_analyze(&self) -> bool {
        self.selection.borrow().file().is_some()
            && !self.orchestrator.is_pending()
            && self.last_error.borrow().is_none()
    }
}

impl std::fmt::Debug for UploadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSession")
            .field("selection", &self.selection)
            .field("drop_zone", &self.drop_zone)
            .field("orchestrator", &self.orchestrator)
            .field("reset_key", &self.reset_key.get())
            .finish()
    }
}
