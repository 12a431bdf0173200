// api/content_idea.rs -- Festival x brand x insight content ideas.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use festive_spark_types::{
    Backend, Error, FieldSpec, GenerationRequest, InputSpec, OutputSpec, Spec,
};

use crate::middleware::LoggingMiddleware;

use super::pipeline::{Pipeline, PipelineBuilder};
use super::result::GenerationResult;

/// Prompt for a single branded content idea.
pub const CONTENT_IDEA_TEMPLATE: &str = "You are a creative marketing expert. Generate a branded content idea based on the provided festival, brand, and insight.

  Festival: {{{festival}}}
  Brand: {{{brand}}}
  Insight: {{{insight}}}

  The content idea should connect a festival emotion or ritual to a brand tension or benefit using one of these three techniques: Contrast, Harmony, or Subversion.

  Return the idea, format, visual cue, copy line, and a rationale. The rationale must explain the connection and explicitly state which technique (Contrast, Harmony, or Subversion) was used.";

/// `festival` 3-50, `brand` 2-50, `insight` 10-200 characters, all required.
pub fn input_spec() -> Result<InputSpec, Error> {
    Spec::new(vec![
        FieldSpec::string("festival")
            .length(3, 50)
            .describe("The festival or special day."),
        FieldSpec::string("brand")
            .length(2, 50)
            .describe("The brand name."),
        FieldSpec::string("insight")
            .length(10, 200)
            .describe("The insight about the target audience."),
    ])
}

/// Five required, non-empty strings.
pub fn output_spec() -> Result<OutputSpec, Error> {
    Spec::new(vec![
        FieldSpec::string("idea")
            .min_length(1)
            .describe("The generated content idea."),
        FieldSpec::string("format")
            .min_length(1)
            .describe("The format of the content (e.g., video, image, text)."),
        FieldSpec::string("visualCue")
            .min_length(1)
            .describe("A visual cue for the content."),
        FieldSpec::string("copyLine")
            .min_length(1)
            .describe("A copy line for the content."),
        FieldSpec::string("rationale").min_length(1).describe(
            "An explanation of how the idea connects the festival, brand, and insight, \
             and which technique (Contrast, Harmony, or Subversion) was used.",
        ),
    ])
}

/// Pipeline builder preloaded with the content-idea specs and template.
///
/// Add middleware, a parser or generation options before calling `build()`.
pub fn pipeline_builder(backend: Arc<dyn Backend>) -> Result<PipelineBuilder, Error> {
    Ok(Pipeline::builder()
        .input_spec(input_spec()?)
        .output_spec(output_spec()?)
        .template(CONTENT_IDEA_TEMPLATE)
        .backend(backend))
}

/// How an idea relates the festival to the brand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Technique {
    Contrast,
    Harmony,
    Subversion,
}

impl Technique {
    pub const ALL: [Technique; 3] = [Self::Contrast, Self::Harmony, Self::Subversion];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contrast => "Contrast",
            Self::Harmony => "Harmony",
            Self::Subversion => "Subversion",
        }
    }

    /// The technique named earliest in `text`, matched case-insensitively as a
    /// whole word.
    pub fn mentioned_in(text: &str) -> Option<Technique> {
        let lower = text.to_lowercase();
        Self::ALL
            .iter()
            .filter_map(|t| find_word(&lower, &t.as_str().to_lowercase()).map(|pos| (pos, *t)))
            .min_by_key(|(pos, _)| *pos)
            .map(|(_, t)| t)
    }
}

impl std::fmt::Display for Technique {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn find_word(haystack: &str, word: &str) -> Option<usize> {
    let is_word_char = |c: Option<char>| c.is_some_and(char::is_alphanumeric);
    haystack.match_indices(word).map(|(pos, _)| pos).find(|&pos| {
        let before = haystack[..pos].chars().next_back();
        let after = haystack[pos + word.len()..].chars().next();
        !is_word_char(before) && !is_word_char(after)
    })
}

/// A validated content idea.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentIdea {
    idea: String,
    format: String,
    visual_cue: String,
    copy_line: String,
    rationale: String,
}

impl ContentIdea {
    /// Read an idea out of a result produced by a content-idea pipeline.
    pub fn from_result(result: &GenerationResult) -> Result<Self, Error> {
        result.deserialize()
    }

    pub fn idea(&self) -> &str {
        &self.idea
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn visual_cue(&self) -> &str {
        &self.visual_cue
    }

    pub fn copy_line(&self) -> &str {
        &self.copy_line
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    /// The technique the rationale names, if any.
    pub fn technique(&self) -> Option<Technique> {
        Technique::mentioned_in(&self.rationale)
    }
}

/// Generates content ideas through one shared pipeline.
#[derive(Debug)]
pub struct ContentIdeaGenerator {
    pipeline: Pipeline,
}

impl ContentIdeaGenerator {
    /// A generator over `backend` with request/response logging.
    pub fn new(backend: Arc<dyn Backend>) -> Result<Self, Error> {
        let pipeline = pipeline_builder(backend)?
            .middleware(Arc::new(LoggingMiddleware))
            .build()?;
        Ok(Self { pipeline })
    }

    /// Wrap a pipeline built from `pipeline_builder`.
    ///
    /// Fails with `Configuration` if the pipeline's output spec is not the
    /// content-idea output spec.
    pub fn from_pipeline(pipeline: Pipeline) -> Result<Self, Error> {
        if **pipeline.output_spec() != output_spec()? {
            return Err(Error::configuration(
                "Pipeline output spec does not describe a content idea",
            ));
        }
        Ok(Self { pipeline })
    }

    /// A generator over the backend selected by environment variables.
    /// See `backends::from_env`.
    pub fn from_env() -> Result<Self, Error> {
        Self::new(crate::backends::from_env()?)
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub async fn generate_content_idea(
        &self,
        festival: &str,
        brand: &str,
        insight: &str,
    ) -> Result<ContentIdea, Error> {
        let result = self
            .pipeline
            .generate(Self::request(festival, brand, insight))
            .await?;
        Self::finish(&result)
    }

    /// As `generate_content_idea`, abandoning the call when `token` is cancelled.
    pub async fn generate_content_idea_with_cancel(
        &self,
        festival: &str,
        brand: &str,
        insight: &str,
        token: &CancellationToken,
    ) -> Result<ContentIdea, Error> {
        let result = self
            .pipeline
            .generate_with_cancel(Self::request(festival, brand, insight), token)
            .await?;
        Self::finish(&result)
    }

    fn request(festival: &str, brand: &str, insight: &str) -> GenerationRequest {
        GenerationRequest::new()
            .field("festival", festival)
            .field("brand", brand)
            .field("insight", insight)
    }

    fn finish(result: &GenerationResult) -> Result<ContentIdea, Error> {
        let idea = ContentIdea::from_result(result)?;
        if idea.technique().is_none() {
            tracing::debug!(
                request_id = %result.request_id,
                "Rationale does not name a technique"
            );
        }
        Ok(idea)
    }
}
