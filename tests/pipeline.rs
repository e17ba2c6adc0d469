//! End-to-end tests of the submit pipeline against a scripted transport.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::NaiveDate;

use mela::analysis::{
    AnalysisOrchestrator, AnalysisRequest, AnalysisTransport, RasterRef, RequestState,
    ResponseContract, SideInputs, TransportResponse,
};
use mela::clock::FixedClock;
use mela::config::ClientConfig;
use mela::error::{AnalysisError, ErrorKind, Result};
use mela::ingest::{DropZone, DropZoneState, PageOptions, SessionOutcome, UploadSession};
use mela::media::{CandidateFile, MediaFile, MemoryPool, validate};

const METRICS_BODY: &str = r#"{
    "density": 78.4,
    "branch_points": 164,
    "mesh_uniformity": 0.71,
    "quality_score": null,
    "input_image": "aW5wdXQtZWNobw==",
    "plotted_image": "ZGV0ZWN0aW9u",
    "mask_image": "bWVzaA==",
    "branch_vis_image": "YnJhbmNoZXM="
}"#;

enum Reply {
    Now(u16, &'static str),
    After(Duration, u16, &'static str),
    Never,
}

#[derive(Default)]
struct ScriptedTransport {
    replies: RefCell<VecDeque<Reply>>,
    requests: RefCell<Vec<AnalysisRequest>>,
    calls: Cell<usize>,
}

impl ScriptedTransport {
    fn new(replies: Vec<Reply>) -> Rc<Self> {
        Rc::new(Self {
            replies: RefCell::new(replies.into()),
            ..Self::default()
        })
    }

    fn calls(&self) -> usize {
        self.calls.get()
    }
}

struct Shared(Rc<ScriptedTransport>);

#[async_trait(?Send)]
impl AnalysisTransport for Shared {
    async fn post_json(&self, request: &AnalysisRequest) -> Result<TransportResponse> {
        let script = &self.0;
        script.calls.set(script.calls.get() + 1);
        script.requests.borrow_mut().push(request.clone());

        let reply = script.replies.borrow_mut().pop_front();
        match reply {
            Some(Reply::Now(status, body)) => Ok(TransportResponse::new(status, "", body)),
            Some(Reply::After(delay, status, body)) => {
                tokio::time::sleep(delay).await;
                Ok(TransportResponse::new(status, "", body))
            }
            Some(Reply::Never) => futures::future::pending().await,
            None => Err(AnalysisError::transport(None, "connection refused")),
        }
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
}

fn client(contract: ResponseContract) -> ClientConfig {
    ClientConfig::new("https://mesh.example.org/analyze")
        .unwrap()
        .with_contract(contract)
        .with_timeout(Duration::from_secs(30))
}

fn orchestrator(
    transport: &Rc<ScriptedTransport>,
    contract: ResponseContract,
) -> (Rc<RefCell<DropZone>>, AnalysisOrchestrator) {
    let zone = Rc::new(RefCell::new(DropZone::new()));
    let orchestrator = AnalysisOrchestrator::new(
        Box::new(Shared(transport.clone())),
        &client(contract),
        zone.clone(),
    )
    .with_clock(FixedClock::at_date(today()));
    (zone, orchestrator)
}

fn session(transport: &Rc<ScriptedTransport>) -> (Rc<MemoryPool>, UploadSession) {
    let pool = Rc::new(MemoryPool::new());
    let transport = transport.clone();
    let session = UploadSession::new(pool.clone(), PageOptions::default(), move |zone| {
        AnalysisOrchestrator::new(
            Box::new(Shared(transport)),
            &client(ResponseContract::Auto),
            zone,
        )
        .with_clock(FixedClock::at_date(today()))
    });
    (pool, session)
}

fn melon(name: &str) -> CandidateFile {
    CandidateFile::new(name, Some("image/jpeg".into()), b"fake jpeg bytes".to_vec())
}

fn media(name: &str) -> MediaFile {
    validate(Some(melon(name))).into_result().unwrap()
}

#[tokio::test(start_paused = true)]
async fn second_submit_while_pending_is_busy() {
    let transport = ScriptedTransport::new(vec![Reply::After(
        Duration::from_secs(2),
        200,
        METRICS_BODY,
    )]);
    let (zone, orchestrator) = orchestrator(&transport, ResponseContract::Auto);
    let file = media("melon.jpg");

    let (first, second) = futures::join!(
        orchestrator.submit(Some(&file), SideInputs::default()),
        async {
            assert_eq!(orchestrator.state(), RequestState::Pending);
            assert_eq!(zone.borrow().state(), DropZoneState::Disabled);
            orchestrator.submit(Some(&file), SideInputs::default()).await
        }
    );

    assert!(first.is_ok());
    assert_eq!(second.unwrap_err(), AnalysisError::Busy);
    assert_eq!(transport.calls(), 1);
    assert_eq!(orchestrator.state(), RequestState::Succeeded);
    assert_eq!(zone.borrow().state(), DropZoneState::Idle);
}

#[tokio::test]
async fn metrics_response_keeps_images_verbatim() {
    let transport = ScriptedTransport::new(vec![Reply::Now(200, METRICS_BODY)]);
    let (_, orchestrator) = orchestrator(&transport, ResponseContract::Auto);
    let file = media("melon.jpg");

    let result = orchestrator
        .submit(Some(&file), SideInputs::default())
        .await
        .unwrap();

    assert_eq!(result.file_name(), "melon.jpg");
    assert_eq!(result.mesh_density(), 78.4);
    assert_eq!(result.branch_points(), 164);
    assert_eq!(result.mesh_uniformity(), 0.71);
    assert_eq!(result.quality_score(), None);
    assert_eq!(result.days_after_crossing(), None);
    assert_eq!(
        result.input_image().and_then(RasterRef::base64),
        Some("aW5wdXQtZWNobw==")
    );
    assert_eq!(
        result.detection_image().and_then(RasterRef::base64),
        Some("ZGV0ZWN0aW9u")
    );
    assert_eq!(
        result.estimated_mesh_image().and_then(RasterRef::base64),
        Some("bWVzaA==")
    );
    assert_eq!(
        result.branch_vis_image().and_then(RasterRef::base64),
        Some("YnJhbmNoZXM=")
    );

    let sent = transport.requests.borrow();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].filename(), "melon.jpg");
    assert_eq!(
        sent[0].image_data(),
        base64::engine::general_purpose::STANDARD.encode(b"fake jpeg bytes")
    );
}

#[tokio::test]
async fn mask_response_is_decoded_to_grayscale() {
    let transport = ScriptedTransport::new(vec![Reply::Now(200, "[[0,255],[128,64]]")]);
    let (_, orchestrator) = orchestrator(&transport, ResponseContract::Mask);
    let file = media("melon.jpg");

    let result = orchestrator
        .submit(Some(&file), SideInputs::with_crossing_date(today()))
        .await
        .unwrap();

    let raster = result
        .estimated_mesh_image()
        .and_then(RasterRef::raster)
        .unwrap();
    assert_eq!((raster.width(), raster.height()), (2, 2));
    assert_eq!(raster.pixel(0), Some([0, 0, 0, 255]));
    assert_eq!(raster.pixel(1), Some([255, 255, 255, 255]));
    assert_eq!(raster.pixel(2), Some([128, 128, 128, 255]));
    assert_eq!(raster.pixel(3), Some([64, 64, 64, 255]));

    // the service does not echo the input, so the submitted payload stands in
    assert_eq!(
        result.input_image(),
        Some(&RasterRef::encoded(
            "image/jpeg",
            base64::engine::general_purpose::STANDARD.encode(b"fake jpeg bytes")
        ))
    );
    assert_eq!(result.days_after_crossing(), Some(0));
}

#[tokio::test]
async fn ragged_mask_fails_as_malformed() {
    let transport = ScriptedTransport::new(vec![Reply::Now(200, "[[1,2,3],[4,5]]")]);
    let (zone, orchestrator) = orchestrator(&transport, ResponseContract::Auto);

    let err = orchestrator
        .submit(Some(&media("melon.jpg")), SideInputs::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::MalformedMatrix(_)));
    assert_eq!(
        orchestrator.state(),
        RequestState::Failed(ErrorKind::MalformedResponse)
    );
    assert!(!zone.borrow().is_disabled());
}

#[tokio::test]
async fn future_crossing_date_never_reaches_the_network() {
    let transport = ScriptedTransport::new(vec![Reply::Now(200, METRICS_BODY)]);
    let (_, orchestrator) = orchestrator(&transport, ResponseContract::Auto);

    let tomorrow = today().succ_opt().unwrap();
    let err = orchestrator
        .submit(
            Some(&media("melon.jpg")),
            SideInputs::with_crossing_date(tomorrow),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(transport.calls(), 0);
    assert_eq!(orchestrator.state(), RequestState::Idle);

    let earlier = NaiveDate::from_ymd_opt(2024, 5, 22).unwrap();
    let result = orchestrator
        .submit(
            Some(&media("melon.jpg")),
            SideInputs::with_crossing_date(earlier),
        )
        .await
        .unwrap();
    assert_eq!(result.days_after_crossing(), Some(40));
}

#[tokio::test]
async fn error_message_is_taken_from_nested_body() {
    let transport = ScriptedTransport::new(vec![Reply::Now(
        502,
        r#"{"statusCode": 502, "body": "{\"error\": \"segmentation model unavailable\"}"}"#,
    )]);
    let (_, orchestrator) = orchestrator(&transport, ResponseContract::Auto);

    let err = orchestrator
        .submit(Some(&media("melon.jpg")), SideInputs::default())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        AnalysisError::transport(Some(502), "segmentation model unavailable")
    );
    assert!(err.is_retryable());

    // a manual retry is a fresh submit with its own single call
    let err = orchestrator
        .submit(Some(&media("melon.jpg")), SideInputs::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn unanswered_request_times_out_as_transport_error() {
    let transport = ScriptedTransport::new(vec![Reply::Never]);
    let (zone, orchestrator) = orchestrator(&transport, ResponseContract::Auto);

    let err = orchestrator
        .submit(Some(&media("melon.jpg")), SideInputs::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::Transport { status: None, .. }));
    assert_eq!(orchestrator.state(), RequestState::Failed(ErrorKind::Transport));
    assert_eq!(zone.borrow().state(), DropZoneState::Idle);
}

#[tokio::test(start_paused = true)]
async fn cancel_aborts_pending_request() {
    let transport = ScriptedTransport::new(vec![Reply::Never]);
    let (_, orchestrator) = orchestrator(&transport, ResponseContract::Auto);
    let file = media("melon.jpg");

    let (outcome, cancelled) = futures::join!(
        orchestrator.submit(Some(&file), SideInputs::default()),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            orchestrator.cancel()
        }
    );

    assert!(cancelled);
    assert_eq!(outcome.unwrap_err(), AnalysisError::Cancelled);
    assert_eq!(orchestrator.state(), RequestState::Failed(ErrorKind::Cancelled));
    assert!(!orchestrator.cancel());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_submit_marks_it_cancelled() {
    let transport = ScriptedTransport::new(vec![Reply::Never]);
    let (zone, orchestrator) = orchestrator(&transport, ResponseContract::Auto);
    let file = media("melon.jpg");

    let submit = orchestrator.submit(Some(&file), SideInputs::default());
    let _ = tokio::time::timeout(Duration::from_millis(5), submit).await;

    assert_eq!(orchestrator.state(), RequestState::Failed(ErrorKind::Cancelled));
    assert_eq!(zone.borrow().state(), DropZoneState::Idle);
}

#[tokio::test(start_paused = true)]
async fn answer_for_superseded_selection_is_discarded() {
    let transport = ScriptedTransport::new(vec![
        Reply::After(Duration::from_secs(1), 200, METRICS_BODY),
        Reply::Now(200, METRICS_BODY),
    ]);
    let (pool, session) = session(&transport);
    session.select(Some(melon("first.jpg"))).unwrap();

    let (outcome, _) = futures::join!(session.analyze(SideInputs::default()), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        session.select(Some(melon("second.jpg"))).unwrap()
    });

    assert_eq!(outcome.unwrap(), SessionOutcome::Stale { generation: 1 });
    assert_eq!(session.selected_file_name().as_deref(), Some("second.jpg"));
    assert_eq!(session.reset_key(), 0);
    assert_eq!(session.last_error(), None);
    assert_eq!(pool.live_count(), 1);

    let SessionOutcome::Completed(result) = session.analyze(SideInputs::default()).await.unwrap()
    else {
        panic!("expected the second selection to complete");
    };
    assert_eq!(result.file_name(), "second.jpg");
    assert_eq!(session.reset_key(), 1);
    assert_eq!(pool.live_count(), 0);
    assert_eq!(pool.created_count(), pool.revoked_count());
}

#[tokio::test]
async fn transport_failure_keeps_selection_for_retry() {
    let transport = ScriptedTransport::new(vec![]);
    let (pool, session) = session(&transport);
    session.select(Some(melon("melon.jpg"))).unwrap();

    let err = session.analyze(SideInputs::default()).await.unwrap_err();
    assert_eq!(err, AnalysisError::transport(None, "connection refused"));
    assert_eq!(session.last_error(), Some(err));
    assert_eq!(session.selected_file_name().as_deref(), Some("melon.jpg"));
    assert_eq!(pool.live_count(), 1);
    assert!(!session.can_analyze());
}
