pub mod generation_flow;
pub mod grading_flow;
pub mod request_ctx;

pub use generation_flow::{GenerationOrchestrator, TEMPLATE_FALLBACK_MODEL};
pub use grading_flow::{parse_grading, EssayGrader};
pub use request_ctx::{RequestCtx, RequestKind};
