//! MELA - Melon mesh analysis client
//!
//! Selects an image, previews it, submits it to a remote analysis service and
//! turns the answer (structured metrics or a raw mask matrix) into an
//! immutable [`analysis::AnalysisResult`] for display. Runs natively and in
//! the browser.

pub mod analysis;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod ingest;
pub mod media;

pub use analysis::{AnalysisOrchestrator, AnalysisResult, RasterRef, SideInputs};
pub use error::{AnalysisError, ErrorKind};
pub use ingest::{PageOptions, UploadSession};

#[cfg(target_arch = "wasm32")]
mod wasm_file;

// WASM entry point
#[cfg(target_arch = "wasm32")]
mod wasm;

#[cfg(target_arch = "wasm32")]
pub use wasm::*;
