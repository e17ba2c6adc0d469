//! Local media handling: accepting candidate files and owning their previews.

pub mod preview;
pub mod validator;

#[cfg(target_arch = "wasm32")]
pub use preview::BrowserUrlPool;
pub use preview::{
    MemoryPool, ObjectUrl, PoolHandle, PreviewError, PreviewRef, PreviewResourceManager,
    ResourcePool,
};
pub use validator::{CandidateFile, MediaFile, RejectReason, Validation, validate};
