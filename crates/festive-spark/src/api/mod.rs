// api/mod.rs -- Generation pipeline and the content-idea API (Layer 4).

pub mod content_idea;
pub mod pipeline;
pub mod result;

pub use content_idea::{ContentIdea, ContentIdeaGenerator, Technique};
pub use pipeline::{Pipeline, PipelineBuilder, StageHook};
pub use result::{GenerationResult, Stage};
