//! Single-flight submission of one image to the analysis service.
//!
//! [`AnalysisOrchestrator::submit`] runs these steps in order:
//!
//! 1. reject while another request is pending (`Busy`)
//! 2. require a file (`MissingInput`)
//! 3. reject a crossing date later than today (`InvalidInput`)
//! 4. require a configured endpoint (`Configuration`)
//! 5. enter `Pending` and disable the drop zone
//! 6. encode the body and make exactly one transport call, bounded by the
//!    request timeout and abortable through [`AnalysisOrchestrator::cancel`]
//! 7. classify the outcome, leave `Pending`, re-enable the drop zone
//!
//! Steps 1-4 are local and never touch the request state.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use chrono::NaiveDate;
use futures::future::{AbortHandle, AbortRegistration, Abortable};
use web_time::Instant;

use crate::analysis::deadline;
use crate::analysis::{
    AnalysisRequest, AnalysisResponse, AnalysisResult, AnalysisTransport, HttpTransport,
    RasterRef, ResponseContract, ResultAssembly, TransportResponse, extract_error_message,
};
use crate::clock::{Clock, SystemClock, days_between};
use crate::config::{AppConfig, ClientConfig};
use crate::constants::ANALYSIS_ID_PREFIX;
use crate::error::{AnalysisError, ErrorKind, Result};
use crate::ingest::DropZone;
use crate::media::MediaFile;

/// Lifecycle of the most recent request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestState {
    #[default]
    Idle,
    Pending,
    Succeeded,
    Failed(ErrorKind),
}

/// Optional inputs submitted alongside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SideInputs {
    /// Date the melon was crossed; must not be in the future
    pub crossing_date: Option<NaiveDate>,
}

impl SideInputs {
    pub fn with_crossing_date(date: NaiveDate) -> Self {
        Self {
            crossing_date: Some(date),
        }
    }

    /// Build side inputs from form text. An absent or blank date means none.
    pub fn from_form(crossing_date: Option<&str>) -> Result<Self> {
        match crossing_date.map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some(raw) => parse_crossing_date(raw).map(Self::with_crossing_date),
        }
    }
}

/// Parse a `YYYY-MM-DD` crossing date.
pub fn parse_crossing_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
        AnalysisError::InvalidInput(format!("crossing date '{}' is not YYYY-MM-DD: {}", raw, e))
    })
}

struct Backend {
    transport: Box<dyn AnalysisTransport>,
    contract: ResponseContract,
    request_timeout: Duration,
}

/// Turns a validated file into at most one outstanding request.
pub struct AnalysisOrchestrator {
    backend: std::result::Result<Backend, AnalysisError>,
    clock: Box<dyn Clock>,
    drop_zone: Rc<RefCell<DropZone>>,
    state: Cell<RequestState>,
    abort: RefCell<Option<AbortHandle>>,
}

impl AnalysisOrchestrator {
    /// Create an orchestrator sending through `transport`.
    ///
    /// Contract and timeout are taken from `config`; the transport is expected
    /// to already target its endpoint.
    pub fn new(
        transport: Box<dyn AnalysisTransport>,
        config: &ClientConfig,
        drop_zone: Rc<RefCell<DropZone>>,
    ) -> Self {
        Self {
            backend: Ok(Backend {
                transport,
                contract: config.contract,
                request_timeout: config.request_timeout,
            }),
            clock: Box::new(SystemClock),
            drop_zone,
            state: Cell::new(RequestState::Idle),
            abort: RefCell::new(None),
        }
    }

    /// Create an orchestrator from application settings.
    ///
    /// If the endpoint cannot be resolved the orchestrator is still created;
    /// every submit then fails with the configuration error.
    pub fn from_app_config(config: &AppConfig, drop_zone: Rc<RefCell<DropZone>>) -> Self {
        Self::from_client_config(config.client_config(), drop_zone)
    }

    /// Create an orchestrator from already resolved client settings, or the
    /// error resolving them produced.
    pub fn from_client_config(
        client: Result<ClientConfig>,
        drop_zone: Rc<RefCell<DropZone>>,
    ) -> Self {
        let backend = client.and_then(|client| {
            let contract = client.contract;
            let request_timeout = client.request_timeout;
            log::info!(
                "🔗 Analysis endpoint {} (contract: {}, timeout: {:?})",
                client.endpoint,
                contract.name(),
                request_timeout
            );
            Ok(Backend {
                transport: Box::new(HttpTransport::new(client)?),
                contract,
                request_timeout,
            })
        });

        if let Err(e) = &backend {
            log::error!("❌ {}", e);
        }

        Self {
            backend,
            clock: Box::new(SystemClock),
            drop_zone,
            state: Cell::new(RequestState::Idle),
            abort: RefCell::new(None),
        }
    }

    /// Replace the clock used for date validation and ids.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn state(&self) -> RequestState {
        self.state.get()
    }

    pub fn is_pending(&self) -> bool {
        self.state.get() == RequestState::Pending
    }

    /// Abort the in-flight request, if any. The pending submit resolves to
    /// `Cancelled`.
    pub fn cancel(&self) -> bool {
        match self.abort.borrow().as_ref() {
            Some(handle) => {
                log::info!("🛑 Cancelling in-flight analysis");
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Submit `file` for analysis.
    pub async fn submit(
        &self,
        file: Option<&MediaFile>,
        inputs: SideInputs,
    ) -> Result<AnalysisResult> {
        if self.is_pending() {
            log::debug!("Analysis already in progress, ignoring submit");
            return Err(AnalysisError::Busy);
        }

        let file = file.ok_or(AnalysisError::MissingInput)?;
        let days_after_crossing = self.days_after_crossing(inputs.crossing_date)?;
        let backend = self.backend.as_ref().map_err(Clone::clone)?;

        let guard = PendingGuard::enter(&self.state, &self.drop_zone, &self.abort);
        let started = Instant::now();
        log::info!("🔬 Submitting {} for analysis", file.name());

        let request = AnalysisRequest::encode(file);

        let call = Abortable::new(
            deadline::within(backend.request_timeout, backend.transport.post_json(&request)),
            guard.registration(),
        );
        let answer = call.await;

        let outcome = match answer {
            Err(_aborted) => Err(AnalysisError::Cancelled),
            Ok(Err(deadline::Elapsed)) => Err(AnalysisError::transport(
                None,
                format!(
                    "no response from the analysis service within {}s",
                    backend.request_timeout.as_secs()
                ),
            )),
            Ok(Ok(sent)) => sent.and_then(|response| {
                self.interpret(response, backend.contract, file, &request, days_after_crossing)
            }),
        };

        match &outcome {
            Ok(result) => log::info!(
                "✅ Analysis {} finished in {:.2?}",
                result.id(),
                started.elapsed()
            ),
            Err(e) => log::warn!(
                "❌ Analysis of {} failed after {:.2?}: {}",
                file.name(),
                started.elapsed(),
                e
            ),
        }

        guard.finish(&outcome);
        outcome
    }

    fn days_after_crossing(&self, date: Option<NaiveDate>) -> Result<Option<i64>> {
        let Some(date) = date else {
            return Ok(None);
        };

        let today = self.clock.today();
        if date > today {
            return Err(AnalysisError::InvalidInput(format!(
                "crossing date {} is after today ({})",
                date, today
            )));
        }
        Ok(Some(days_between(date, today)))
    }

    fn interpret(
        &self,
        response: TransportResponse,
        contract: ResponseContract,
        file: &MediaFile,
        request: &AnalysisRequest,
        days_after_crossing: Option<i64>,
    ) -> Result<AnalysisResult> {
        if !response.is_success() {
            return Err(AnalysisError::transport(
                Some(response.status),
                extract_error_message(&response.body, response.status, &response.status_text),
            ));
        }

        let parsed = AnalysisResponse::parse(&response.body, contract)?;
        let id = format!("{}{}", ANALYSIS_ID_PREFIX, self.clock.now_millis());
        let input = RasterRef::encoded(file.media_type(), request.image_data());

        Ok(ResultAssembly::new(id, file.name(), input)
            .days_after_crossing(days_after_crossing)
            .build(parsed))
    }
}

impl std::fmt::Debug for AnalysisOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisOrchestrator")
            .field("configured", &self.backend.is_ok())
            .field("state", &self.state.get())
            .finish()
    }
}

/// Holds `Pending` for the duration of one request.
///
/// Every way out, including the submit future being dropped, leaves
/// `Pending`, forgets the abort handle, and re-enables the drop zone.
struct PendingGuard<'a> {
    state: &'a Cell<RequestState>,
    drop_zone: &'a RefCell<DropZone>,
    abort: &'a RefCell<Option<AbortHandle>>,
}

impl<'a> PendingGuard<'a> {
    fn enter(
        state: &'a Cell<RequestState>,
        drop_zone: &'a RefCell<DropZone>,
        abort: &'a RefCell<Option<AbortHandle>>,
    ) -> Self {
        state.set(RequestState::Pending);
        drop_zone.borrow_mut().set_disabled(true);
        Self {
            state,
            drop_zone,
            abort,
        }
    }

    /// Arm cancellation for this request.
    fn registration(&self) -> AbortRegistration {
        let (handle, registration) = AbortHandle::new_pair();
        *self.abort.borrow_mut() = Some(handle);
        registration
    }

    fn finish<T>(self, outcome: &Result<T>) {
        self.state.set(match outcome {
            Ok(_) => RequestState::Succeeded,
            Err(e) => RequestState::Failed(e.kind()),
        });
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.state.get() == RequestState::Pending {
            log::debug!("Analysis dropped while pending");
            self.state.set(RequestState::Failed(ErrorKind::Cancelled));
        }
        self.abort.borrow_mut().take();
        self.drop_zone.borrow_mut().set_disabled(false);
    }
}
