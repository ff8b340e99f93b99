pub mod concept_extractor;
pub mod fallback_generator;
pub mod prompt_builder;
pub mod quality_scorer;
pub mod response_parser;
pub mod warn_writer;

pub use concept_extractor::{contains_term, ConceptExtractor};
pub use fallback_generator::FallbackGenerator;
pub use prompt_builder::{PromptBuilder, PromptSpec};
pub use quality_scorer::QualityScorer;
pub use response_parser::{ParseOutcome, ResponseParser};
pub use warn_writer::WarnWriter;
