//! Browser entry point and the JavaScript-facing upload page.

use std::rc::Rc;

use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::analysis::{AnalysisResult, RequestState};
use crate::config::AppConfig;
use crate::error::AnalysisError;
use crate::ingest::{
    DropZoneEvent, DropZoneState, Key, LeaveTarget, PageOptions, SessionOutcome, UploadSession,
    ZoneResponse,
};
use crate::media::BrowserUrlPool;
use crate::wasm_file;

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();

    let level = AppConfig::load_from_local_storage()
        .unwrap_or_default()
        .preferences
        .log_level
        .to_level_filter()
        .to_level()
        .unwrap_or(log::Level::Error);
    if console_log::init_with_level(level).is_err() {
        web_sys::console::log_1(&"MELA: logger already initialised".into());
    }

    log::info!("🍈 MELA WASM starting...");
}

/// Result fields as the display layer reads them.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResultView {
    id: String,
    file_name: String,
    mesh_density: String,
    branch_points: u32,
    mesh_uniformity: f64,
    quality_score: Option<f64>,
    circularity: Option<f64>,
    days_after_crossing: Option<i64>,
    input_image_url: Option<String>,
    detection_image_url: Option<String>,
    estimated_mesh_image_url: Option<String>,
    contour_image_url: Option<String>,
    branch_vis_image_url: Option<String>,
    summary: String,
}

impl ResultView {
    fn new(result: &AnalysisResult) -> Result<Self, AnalysisError> {
        let url = |image: Option<&crate::analysis::RasterRef>| {
            image.map(|image| image.to_data_url()).transpose()
        };

        Ok(Self {
            id: result.id().to_string(),
            file_name: result.file_name().to_string(),
            mesh_density: result.mesh_density_label(),
            branch_points: result.branch_points(),
            mesh_uniformity: result.mesh_uniformity(),
            quality_score: result.quality_score(),
            circularity: result.circularity(),
            days_after_crossing: result.days_after_crossing(),
            input_image_url: url(result.input_image())?,
            detection_image_url: url(result.detection_image())?,
            estimated_mesh_image_url: url(result.estimated_mesh_image())?,
            contour_image_url: url(result.contour_image())?,
            branch_vis_image_url: url(result.branch_vis_image())?,
            summary: result.summary().to_string(),
        })
    }
}

/// The upload page, driven by DOM event handlers.
#[wasm_bindgen]
pub struct MelaPage {
    session: Rc<UploadSession>,
}

#[wasm_bindgen]
impl MelaPage {
    #[wasm_bindgen(constructor)]
    pub fn new(redirect_on_first_visit: bool, initial_preview: Option<String>) -> MelaPage {
        let config = AppConfig::load_from_local_storage().unwrap_or_default();
        let options = PageOptions {
            redirect_on_first_visit,
            initial_preview,
        };
        MelaPage {
            session: Rc::new(UploadSession::from_app_config(
                Rc::new(BrowserUrlPool),
                options,
                &config,
            )),
        }
    }

    /// Persist the analysis endpoint for pages mounted from now on.
    /// Rejects an address that does not resolve to a usable client config.
    pub fn save_endpoint(url: &str) -> Result<(), JsValue> {
        let mut config = AppConfig::load_from_local_storage().unwrap_or_default();
        config.endpoint.url = Some(url.trim().to_string());
        config.client_config().map_err(|e| rejection(&e))?;
        config
            .save_to_local_storage()
            .map_err(|e| rejection(&AnalysisError::from(e)))
    }

    /// True exactly once if the page was mounted with a first-visit redirect.
    pub fn take_redirect(&self) -> bool {
        self.session.take_redirect()
    }

    /// Returns whether the event default must be prevented.
    pub fn drag_enter(&self) -> bool {
        self.dispatch(DropZoneEvent::DragEnter).suppress_default
    }

    pub fn drag_over(&self) -> bool {
        self.dispatch(DropZoneEvent::DragOver).suppress_default
    }

    /// `left_zone` is false when the related target is inside the zone.
    pub fn drag_leave(&self, left_zone: bool) -> bool {
        let target = if left_zone {
            LeaveTarget::Outside
        } else {
            LeaveTarget::Descendant
        };
        self.dispatch(DropZoneEvent::DragLeave(target)).suppress_default
    }

    /// Handle a drop. The zone leaves its drag phase at once; the file is
    /// read asynchronously and then selected. A failed read is recorded as
    /// the last error.
    pub fn drop_file(&self, file: Option<web_sys::File>) -> bool {
        let Some(file) = file else {
            return self.dispatch(DropZoneEvent::Drop(None)).suppress_default;
        };
        if !self.session.begin_drop() {
            return true;
        }

        let session = Rc::clone(&self.session);
        wasm_bindgen_futures::spawn_local(async move {
            match wasm_file::read_candidate(&file).await {
                Ok(candidate) => {
                    // A rejection is recorded as the session's last error
                    let _ = session.select(Some(candidate));
                }
                Err(e) => {
                    session.record_error(AnalysisError::InvalidInput(format!(
                        "could not read '{}': {:?}",
                        file.name(),
                        e
                    )));
                }
            }
        });
        true
    }

    pub fn click(&self) -> bool {
        let response = self.dispatch(DropZoneEvent::Click);
        response.open_picker
    }

    /// Handle a `keydown` on the zone. Returns whether the default must be prevented.
    pub fn key_down(&self, key: &str) -> bool {
        self.dispatch(DropZoneEvent::Key(Key::from_dom(key))).suppress_default
    }

    /// Apply a finished picker interaction. Returns whether one was pending.
    pub fn poll_picker(&self) -> bool {
        match wasm_file::take_picked_file() {
            Some(Some(candidate)) => {
                // A rejection is recorded as the session's last error
                let _ = self.session.select(Some(candidate));
                true
            }
            Some(None) => true,
            None => false,
        }
    }

    pub fn remove_image(&self) {
        self.session.remove_image();
    }

    pub fn preview_url(&self) -> Option<String> {
        self.session.preview().map(|(url, _)| url)
    }

    pub fn drop_zone_state(&self) -> String {
        match self.session.drop_zone_state() {
            DropZoneState::Idle => "idle",
            DropZoneState::DragOver => "drag-over",
            DropZoneState::Disabled => "disabled",
        }
        .to_string()
    }

    pub fn is_loading(&self) -> bool {
        self.session.request_state() == RequestState::Pending
    }

    pub fn can_analyze(&self) -> bool {
        self.session.can_analyze()
    }

    pub fn last_error(&self) -> Option<String> {
        self.session.last_error().map(|e| e.user_message())
    }

    /// Kind of the last error: `validation`, `busy`, `configuration`,
    /// `transport`, `malformed-response` or `cancelled`.
    pub fn last_error_kind(&self) -> Option<String> {
        self.session.last_error().map(|e| e.kind().name().to_string())
    }

    pub fn reset_key(&self) -> f64 {
        self.session.reset_key() as f64
    }

    /// Analyze the selection. `crossing_date` is `YYYY-MM-DD` or empty.
    ///
    /// Resolves to the result as a JSON string, or `null` when the trigger
    /// was ignored or the answer is stale. Rejects with `{kind, message}`.
    pub fn analyze(&self, crossing_date: Option<String>) -> js_sys::Promise {
        let session = Rc::clone(&self.session);
        wasm_bindgen_futures::future_to_promise(async move {
            let outcome = session
                .analyze_form(crossing_date.as_deref())
                .await
                .map_err(|e| rejection(&e))?;

            match outcome {
                SessionOutcome::Completed(result) => {
                    let view = ResultView::new(&result).map_err(|e| rejection(&e))?;
                    let json = serde_json::to_string(&view)
                        .map_err(|e| rejection(&AnalysisError::from(e)))?;
                    Ok(JsValue::from_str(&json))
                }
                SessionOutcome::Ignored | SessionOutcome::Stale { .. } => Ok(JsValue::NULL),
            }
        })
    }

    /// Cancel any request and release the preview.
    pub fn teardown(&self) {
        self.session.teardown();
    }
}

impl MelaPage {
    fn dispatch(&self, event: DropZoneEvent) -> ZoneResponse {
        let response = self.session.handle_drop_zone_event(event);
        if response.open_picker {
            if let Err(e) = wasm_file::open_image_picker() {
                log::error!("Failed to open file picker: {:?}", e);
            }
        }
        response
    }
}

/// Convert an error into the `{kind, message}` object a promise rejects with.
fn rejection(err: &AnalysisError) -> JsValue {
    serde_json::to_string(&err.report())
        .ok()
        .and_then(|json| js_sys::JSON::parse(&json).ok())
        .unwrap_or_else(|| JsValue::from_str(&err.user_message()))
}
