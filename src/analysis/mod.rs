//! Analysis request pipeline: encoding, transport, response decoding, results.

pub mod deadline;
pub mod orchestrator;
pub mod request;
pub mod response;
pub mod result;
pub mod transport;

pub use orchestrator::{AnalysisOrchestrator, RequestState, SideInputs, parse_crossing_date};
pub use request::AnalysisRequest;
pub use response::{AnalysisResponse, MetricsPayload, ResponseContract, extract_error_message};
pub use result::{AnalysisResult, RasterRef, ResultAssembly};
pub use transport::{AnalysisTransport, HttpTransport, TransportResponse};
