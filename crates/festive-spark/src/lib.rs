// festive-spark: Layers 2–4 -- validation, prompt rendering, backends, generation pipeline
#![allow(clippy::result_large_err)]

pub mod api;
pub mod backends;
pub mod default_generator;
pub mod middleware;
pub mod parse;
pub mod prompt;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod util;
pub mod validator;

// --- Curated re-exports from festive-spark-types (Layer 1) ---
pub use festive_spark_types::{
    // Backend trait
    Backend,
    BackendCause,
    BackendPayload,
    BackendRequest,
    BackendResponse,
    // Config
    BackendTimeout,
    BoxFuture,
    // Errors
    Error,
    ErrorKind,
    // Schema
    FieldSpec,
    FieldType,
    FieldViolation,
    FinishReason,
    // Request/Response
    GenerationRequest,
    InputSpec,
    OutputSpec,
    RetryPolicy,
    Spec,
    Usage,
    ValidationError,
    Violation,
};

// --- High-level API (Layer 4) ---
pub use api::content_idea::{CONTENT_IDEA_TEMPLATE, pipeline_builder};
pub use api::{
    ContentIdea, ContentIdeaGenerator, GenerationResult, Pipeline, PipelineBuilder, Stage,
    StageHook, Technique,
};

// Default generator functions at crate root.
#[cfg(any(test, feature = "testing"))]
pub use default_generator::reset_default_generator;
pub use default_generator::{generate_content_idea, get_default_generator, set_default_generator};

// Building blocks.
pub use middleware::{LoggingMiddleware, Middleware, Next};
pub use parse::{JsonOutputParser, LabeledTextParser, OutputParser, ParseError};
pub use prompt::PromptTemplate;
pub use util::retry::with_retry;
pub use validator::{Validated, validate};

// Backends at crate root (behind feature flags).
#[cfg(feature = "gemini")]
pub use backends::gemini::GeminiBackend;
#[cfg(feature = "openai-compat")]
pub use backends::openai_compat::OpenAICompatibleBackend;

/// Re-exported so callers can cancel a generation without a direct
/// `tokio-util` dependency.
pub use tokio_util::sync::CancellationToken;
