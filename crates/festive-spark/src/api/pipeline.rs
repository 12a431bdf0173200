// api/pipeline.rs -- The generation pipeline (Layer 4).
//
// validate input -> render prompt -> one backend call -> parse -> validate
// output. Invalid input never reaches the backend; invalid output never
// reaches the caller.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use festive_spark_types::{
    Backend, BackendRequest, Error, GenerationRequest, InputSpec, OutputSpec,
};

use crate::middleware::{Middleware, run_chain};
use crate::parse::{JsonOutputParser, OutputParser};
use crate::prompt::PromptTemplate;
use crate::validator::validate;

use super::result::{GenerationResult, Stage};

/// Observer called on every stage transition.
pub type StageHook = Arc<dyn Fn(Stage) + Send + Sync>;

/// A configured generation pipeline.
///
/// Immutable once built and safe to share across tasks: every field is either
/// owned read-only data or an `Arc` to a `Send + Sync` collaborator. Each call
/// to `generate` is independent.
pub struct Pipeline {
    input_spec: Arc<InputSpec>,
    output_spec: Arc<OutputSpec>,
    template: PromptTemplate,
    backend: Arc<dyn Backend>,
    parser: Arc<dyn OutputParser>,
    middleware: Vec<Arc<dyn Middleware>>,
    system: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    stage_hook: Option<StageHook>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn input_spec(&self) -> &Arc<InputSpec> {
        &self.input_spec
    }

    pub fn output_spec(&self) -> &Arc<OutputSpec> {
        &self.output_spec
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Run one generation.
    ///
    /// # Errors
    /// - `InvalidInput` with every violated input field; the backend is not called.
    /// - `BackendFailure` for transport problems and refusals.
    /// - `InvalidOutput` when the answer cannot be parsed or violates the
    ///   output spec. `raw_text` holds what the backend said.
    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationResult, Error> {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.generate_as(request, &request_id).await
    }

    /// Like `generate`, but gives up with `Abort` once `token` is cancelled.
    ///
    /// An already-cancelled token fails before anything else runs. Cancelling
    /// mid-flight drops the in-progress backend call and ends in `Failed`.
    pub async fn generate_with_cancel(
        &self,
        request: GenerationRequest,
        token: &CancellationToken,
    ) -> Result<GenerationResult, Error> {
        if token.is_cancelled() {
            return Err(Error::abort());
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        tokio::select! {
            result = self.generate_as(request, &request_id) => result,
            _ = token.cancelled() => {
                tracing::debug!(request_id = %request_id, "Generation cancelled");
                self.enter(Stage::Failed, &request_id);
                Err(Error::abort())
            }
        }
    }

    async fn generate_as(
        &self,
        request: GenerationRequest,
        request_id: &str,
    ) -> Result<GenerationResult, Error> {
        let result = self.run(request, request_id).await;
        match &result {
            Ok(_) => self.enter(Stage::Succeeded, request_id),
            Err(err) => {
                tracing::debug!(request_id = %request_id, error = %err, "Generation failed");
                self.enter(Stage::Failed, request_id);
            }
        }
        result
    }

    async fn run(
        &self,
        request: GenerationRequest,
        request_id: &str,
    ) -> Result<GenerationResult, Error> {
        self.enter(Stage::ValidatingInput, request_id);
        let input = validate(&self.input_spec, request.fields()).map_err(Error::invalid_input)?;

        self.enter(Stage::Rendering, request_id);
        let prompt = self.template.render(&input);

        self.enter(Stage::AwaitingBackend, request_id);
        let backend_request = BackendRequest::new(prompt, self.output_spec.clone())
            .request_id(request_id)
            .system(self.system.clone())
            .temperature(self.temperature)
            .max_tokens(self.max_tokens);
        let backend = self.backend.as_ref();
        let response = run_chain(&self.middleware, backend_request, move |req| {
            backend.complete(req)
        })
        .await?;

        self.enter(Stage::ValidatingOutput, request_id);
        let parsed = self
            .parser
            .parse(&response.payload, &self.output_spec)
            .map_err(|e| {
                tracing::warn!(
                    request_id = %request_id,
                    backend = %response.backend,
                    reason = %e,
                    "Backend output could not be parsed"
                );
                Error::unparseable_output(e.message, e.raw_text)
            })?;
        let output = validate(&self.output_spec, &parsed).map_err(|violations| {
            tracing::warn!(
                request_id = %request_id,
                backend = %response.backend,
                fields = ?violations.fields(),
                "Backend output failed validation"
            );
            Error::invalid_output(violations, Some(response.payload.raw_text()))
        })?;

        Ok(GenerationResult::new(output, &response, request_id))
    }

    fn enter(&self, stage: Stage, request_id: &str) {
        tracing::debug!(request_id = %request_id, stage = %stage, "Pipeline stage");
        if let Some(hook) = &self.stage_hook {
            hook(stage);
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("input_fields", &self.input_spec.field_names().collect::<Vec<_>>())
            .field("output_fields", &self.output_spec.field_names().collect::<Vec<_>>())
            .field("backend", &self.backend.name())
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

/// Builder for `Pipeline`.
#[derive(Default)]
pub struct PipelineBuilder {
    input_spec: Option<Arc<InputSpec>>,
    output_spec: Option<Arc<OutputSpec>>,
    template: Option<String>,
    backend: Option<Arc<dyn Backend>>,
    parser: Option<Arc<dyn OutputParser>>,
    middleware: Vec<Arc<dyn Middleware>>,
    system: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    stage_hook: Option<StageHook>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input_spec(mut self, spec: impl Into<Arc<InputSpec>>) -> Self {
        self.input_spec = Some(spec.into());
        self
    }

    pub fn output_spec(mut self, spec: impl Into<Arc<OutputSpec>>) -> Self {
        self.output_spec = Some(spec.into());
        self
    }

    /// Template source with `{{field}}` placeholders. Parsed by `build()`.
    pub fn template(mut self, source: impl Into<String>) -> Self {
        self.template = Some(source.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Output parser. Defaults to `JsonOutputParser`.
    pub fn parser(mut self, parser: Arc<dyn OutputParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Register a middleware. Requests pass through in registration order.
    pub fn middleware(mut self, mw: Arc<dyn Middleware>) -> Self {
        self.middleware.push(mw);
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn on_stage(mut self, hook: impl Fn(Stage) + Send + Sync + 'static) -> Self {
        self.stage_hook = Some(Arc::new(hook));
        self
    }

    /// Build the pipeline.
    ///
    /// Fails with `Configuration` when a spec, the template or the backend is
    /// missing, when the template does not parse, when it names a field the
    /// input spec lacks, or when the output spec is empty.
    pub fn build(self) -> Result<Pipeline, Error> {
        let input_spec = self
            .input_spec
            .ok_or_else(|| Error::configuration("Pipeline needs an input spec"))?;
        let output_spec = self
            .output_spec
            .ok_or_else(|| Error::configuration("Pipeline needs an output spec"))?;
        if output_spec.is_empty() {
            return Err(Error::configuration(
                "Output spec must declare at least one field",
            ));
        }
        let source = self
            .template
            .ok_or_else(|| Error::configuration("Pipeline needs a prompt template"))?;
        let template = PromptTemplate::parse(&source)?;
        template.check_against(&input_spec)?;
        let backend = self
            .backend
            .ok_or_else(|| Error::configuration("Pipeline needs a backend"))?;

        Ok(Pipeline {
            input_spec,
            output_spec,
            template,
            backend,
            parser: self.parser.unwrap_or_else(|| Arc::new(JsonOutputParser)),
            middleware: self.middleware,
            system: self.system,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stage_hook: self.stage_hook,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use festive_spark_types::{BackendCause, ErrorKind, FieldSpec, Spec, Violation};
    use serde_json::json;

    use crate::parse::LabeledTextParser;
    use crate::testing::{MockBackend, make_structured_response, make_text_response};

    fn input_spec() -> Spec {
        Spec::new(vec![
            FieldSpec::string("topic").length(3, 20),
            FieldSpec::string("audience").optional(),
        ])
        .unwrap()
    }

    fn output_spec() -> Spec {
        Spec::new(vec![
            FieldSpec::string("headline").min_length(1),
            FieldSpec::enumeration("format", ["video", "image", "text"]),
        ])
        .unwrap()
    }

    fn pipeline(backend: Arc<MockBackend>) -> Pipeline {
        Pipeline::builder()
            .input_spec(input_spec())
            .output_spec(output_spec())
            .template("Write about {{topic}} for {{audience}}.")
            .backend(backend)
            .build()
            .unwrap()
    }

    fn request(topic: &str) -> GenerationRequest {
        GenerationRequest::new().field("topic", topic)
    }

    #[tokio::test]
    async fn test_generate_success_structured() {
        let backend = Arc::new(MockBackend::new("mock").with_response(
            make_structured_response(json!({"headline": " Glow ", "format": "Video"}), "mock"),
        ));
        let result = pipeline(backend.clone())
            .generate(request("lamps"))
            .await
            .unwrap();
        assert_eq!(result.get_str("headline"), Some("Glow"));
        assert_eq!(result.get_str("format"), Some("video"));
        assert_eq!(result.backend, "mock");
        assert!(!result.request_id.is_empty());

        let sent = &backend.recorded_requests()[0];
        assert_eq!(sent.prompt, "Write about lamps for .");
        assert_eq!(sent.request_id, result.request_id);
        assert_eq!(sent.output_spec.len(), 2);
    }

    #[tokio::test]
    async fn test_generate_success_from_text() {
        let backend = Arc::new(MockBackend::new("mock").with_response(make_text_response(
            "```json\n{\"headline\": \"Glow\", \"format\": \"text\"}\n```",
            "mock",
        )));
        let result = pipeline(backend).generate(request("lamps")).await.unwrap();
        assert_eq!(result.get_str("headline"), Some("Glow"));
    }

    #[tokio::test]
    async fn test_invalid_input_never_calls_backend() {
        let backend = Arc::new(MockBackend::new("mock"));
        let err = pipeline(backend.clone())
            .generate(request("x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
        assert!(!err.retryable);
        assert!(err.is_caller_fixable());
        assert_eq!(err.violated_fields(), vec!["topic"]);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_output_field_is_invalid_output() {
        let backend = Arc::new(MockBackend::new("mock").with_response(make_structured_response(
            json!({"headline": "Glow"}),
            "mock",
        )));
        let err = pipeline(backend).generate(request("lamps")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidOutput);
        assert!(err.retryable);
        assert_eq!(err.violated_fields(), vec!["format"]);
        assert_eq!(
            err.violations.as_ref().unwrap().violations[0].violation,
            Violation::Missing
        );
        assert!(err.raw_text.unwrap().contains("Glow"));
    }

    #[tokio::test]
    async fn test_unparseable_output_is_invalid_output() {
        let backend = Arc::new(
            MockBackend::new("mock").with_response(make_text_response("Sorry, no idea.", "mock")),
        );
        let err = pipeline(backend).generate(request("lamps")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidOutput);
        assert!(err.violations.is_none());
        assert_eq!(err.raw_text.as_deref(), Some("Sorry, no idea."));
    }

    #[tokio::test]
    async fn test_backend_failure_propagates() {
        let backend = Arc::new(
            MockBackend::new("mock").with_error(Error::refusal("mock", "blocked by policy")),
        );
        let err = pipeline(backend).generate(request("lamps")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::BackendFailure);
        assert_eq!(err.cause, Some(BackendCause::Refusal));
    }

    #[tokio::test]
    async fn test_stage_hook_sees_full_walk() {
        let stages: Arc<Mutex<Vec<Stage>>> = Arc::default();
        let seen = stages.clone();
        let backend = Arc::new(MockBackend::new("mock").with_response(
            make_structured_response(json!({"headline": "Glow", "format": "image"}), "mock"),
        ));
        let p = Pipeline::builder()
            .input_spec(input_spec())
            .output_spec(output_spec())
            .template("{{topic}}")
            .backend(backend)
            .on_stage(move |s| seen.lock().unwrap().push(s))
            .build()
            .unwrap();
        p.generate(request("lamps")).await.unwrap();
        assert_eq!(
            *stages.lock().unwrap(),
            vec![
                Stage::ValidatingInput,
                Stage::Rendering,
                Stage::AwaitingBackend,
                Stage::ValidatingOutput,
                Stage::Succeeded,
            ]
        );

        stages.lock().unwrap().clear();
        p.generate(request("")).await.unwrap_err();
        assert_eq!(
            *stages.lock().unwrap(),
            vec![Stage::ValidatingInput, Stage::Failed]
        );
    }

    #[tokio::test]
    async fn test_request_options_reach_backend() {
        let backend = Arc::new(MockBackend::new("mock").with_response(
            make_structured_response(json!({"headline": "Glow", "format": "image"}), "mock"),
        ));
        let p = Pipeline::builder()
            .input_spec(input_spec())
            .output_spec(output_spec())
            .template("{{topic}}")
            .backend(backend.clone())
            .system("You are terse.")
            .temperature(0.4)
            .max_tokens(300)
            .build()
            .unwrap();
        p.generate(request("lamps")).await.unwrap();
        let sent = &backend.recorded_requests()[0];
        assert_eq!(sent.system.as_deref(), Some("You are terse."));
        assert_eq!(sent.temperature, Some(0.4));
        assert_eq!(sent.max_tokens, Some(300));
    }

    #[tokio::test]
    async fn test_labeled_text_parser_option() {
        let backend = Arc::new(MockBackend::new("mock").with_response(make_text_response(
            "Headline: Glow\nFormat: Image",
            "mock",
        )));
        let p = Pipeline::builder()
            .input_spec(input_spec())
            .output_spec(output_spec())
            .template("{{topic}}")
            .backend(backend)
            .parser(Arc::new(LabeledTextParser))
            .build()
            .unwrap();
        let result = p.generate(request("lamps")).await.unwrap();
        assert_eq!(result.get_str("format"), Some("image"));
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_aborts_without_backend_call() {
        let backend = Arc::new(MockBackend::new("mock"));
        let token = CancellationToken::new();
        token.cancel();
        let err = pipeline(backend.clone())
            .generate_with_cancel(request("lamps"), &token)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Abort);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_flight_aborts() {
        let backend = Arc::new(
            MockBackend::new("mock")
                .with_delay(Duration::from_secs(30))
                .with_response(make_structured_response(
                    json!({"headline": "Glow", "format": "image"}),
                    "mock",
                )),
        );
        let p = pipeline(backend.clone());
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });
        let err = p
            .generate_with_cancel(request("lamps"), &token)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Abort);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_flight_ends_in_failed_stage() {
        let backend = Arc::new(
            MockBackend::new("mock")
                .with_delay(Duration::from_secs(30))
                .with_response(make_structured_response(
                    json!({"headline": "Glow", "format": "image"}),
                    "mock",
                )),
        );
        let stages = Arc::new(Mutex::new(Vec::new()));
        let seen = stages.clone();
        let p = Pipeline::builder()
            .input_spec(input_spec())
            .output_spec(output_spec())
            .template("Write about {{topic}}.")
            .backend(backend)
            .on_stage(move |stage| seen.lock().unwrap().push(stage))
            .build()
            .unwrap();
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let err = p
            .generate_with_cancel(request("lamps"), &token)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Abort);
        assert_eq!(
            *stages.lock().unwrap(),
            vec![
                Stage::ValidatingInput,
                Stage::Rendering,
                Stage::AwaitingBackend,
                Stage::Failed
            ]
        );
    }

    #[test]
    fn test_build_rejects_incomplete_configuration() {
        let backend: Arc<dyn Backend> = Arc::new(MockBackend::new("mock"));

        let missing_backend = Pipeline::builder()
            .input_spec(input_spec())
            .output_spec(output_spec())
            .template("{{topic}}")
            .build()
            .unwrap_err();
        assert!(missing_backend.message.contains("backend"));

        let unknown_placeholder = Pipeline::builder()
            .input_spec(input_spec())
            .output_spec(output_spec())
            .template("{{topic}} {{brand}}")
            .backend(backend.clone())
            .build()
            .unwrap_err();
        assert_eq!(unknown_placeholder.kind, ErrorKind::Configuration);
        assert!(unknown_placeholder.message.contains("brand"));

        let broken_template = Pipeline::builder()
            .input_spec(input_spec())
            .output_spec(output_spec())
            .template("{{topic")
            .backend(backend.clone())
            .build()
            .unwrap_err();
        assert_eq!(broken_template.kind, ErrorKind::Configuration);

        let empty_output = Pipeline::builder()
            .input_spec(input_spec())
            .output_spec(Spec::new(vec![]).unwrap())
            .template("{{topic}}")
            .backend(backend)
            .build()
            .unwrap_err();
        assert_eq!(empty_output.kind, ErrorKind::Configuration);
    }

    #[test]
    fn test_pipeline_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Pipeline>();
    }
}
