//! Ingestion: the drop zone, the current selection, and the upload session
//! that ties them to the analysis orchestrator.

pub mod drop_zone;
pub mod selection;
pub mod session;

pub use drop_zone::{
    DropZone, DropZoneAction, DropZoneEvent, DropZoneOutcome, DropZoneState, Key, LeaveTarget,
};
pub use selection::Selection;
pub use session::{PageOptions, SessionOutcome, UploadSession, ZoneResponse};
