pub mod loaders;
pub mod question;
pub mod result;

pub use loaders::{load_all_request_files, load_request_file, RequestFile};
pub use question::{
    Difficulty, GenerationRequest, GradingRequest, Question, QuestionKind, QuestionSource,
    QuestionType,
};
pub use result::{Concept, DropReason, DroppedBlock, EssayScore, GenerationMetadata, GenerationResult};
