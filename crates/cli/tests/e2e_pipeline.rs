//! End-to-end tests for Talewright narration runs.
//!
//! These wire the real pipeline runner, registry, LLM stages, unified
//! inference client and streaming wrapper together, with scripted
//! providers and transports standing in for the network.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use talewright_core::{
    CancellationToken, FailureKind, GenerationMetadata, GenerationRequest, GenerationResponse,
    HttpRequest, HttpResponse, HttpTransport, ProviderError, StreamingResponse,
    TextGenerationService, Transform, TransportError,
};
use talewright_inference::{
    ClientOptions, InferenceProvider, RetryDelay, UnifiedInferenceClient, UnifiedTextService,
};
use talewright_llm::prompts;
use talewright_pipeline::{
    Annotate, CollectedText, PipelineDefinition, PipelineRunResult, PipelineRunner,
    PipelineStatus, StageRegistry, TextCollectingSink, TextInput, TextSource,
};
use talewright_providers::{StreamContext, StreamPrompt, TokenStreamService};
use talewright_story::{StoryState, annotations};
use talewright_telemetry::InMemoryMetrics;

// ── Scripted text service ───────────────────────────────────────────────

/// Answers by which stage built the prompt.
struct StoryTeller {
    fail: bool,
    prompts: Mutex<Vec<String>>,
}

impl StoryTeller {
    fn new() -> Self {
        Self {
            fail: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn offline() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl TextGenerationService for StoryTeller {
    fn name(&self) -> &str {
        "storyteller"
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        _cancel: &CancellationToken,
    ) -> Result<GenerationResponse, ProviderError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        if self.fail {
            return Err(ProviderError::Network("connection refused".into()));
        }

        let prompt = request.prompt.as_str();
        let text = if prompt.starts_with(prompts::REWRITE_INSTRUCTIONS) {
            "You step into the smoky tavern, lantern in hand. Mira watches from the bar."
        } else if prompt.starts_with(prompts::SUMMARY_INSTRUCTIONS) {
            "The hero entered the tavern carrying a lantern and met Mira."
        } else if prompt.starts_with(prompts::INVENTORY_INSTRUCTIONS) {
            r#"{"inventoryUpdates":[{"operation":"upsert","item":{"id":"lantern","displayName":"Brass Lantern","quantity":1,"provenance":{"transformName":"model","confidence":0.8}}}]}"#
        } else if prompt.starts_with(prompts::CHARACTER_INSTRUCTIONS) {
            r#"{"charactersToUpsert":[{"id":"mira","displayName":"Mira","aliases":["the barkeep"],"provenance":{"transformName":"model","confidence":0.9}}]}"#
        } else {
            panic!("unexpected prompt: {prompt}");
        };

        Ok(GenerationResponse {
            text: text.to_string(),
            metadata: GenerationMetadata::default(),
        })
    }
}

// ── Scripted transport ──────────────────────────────────────────────────

/// Replies by URL substring; the last reply of a route repeats.
#[derive(Default)]
struct ScriptedHttp {
    routes: Mutex<Vec<(String, VecDeque<HttpResponse>)>>,
    stream_lines: Mutex<Option<Vec<Vec<u8>>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttp {
    fn route(self, url_part: &str, response: HttpResponse) -> Self {
        {
            let mut routes = self.routes.lock().unwrap();
            match routes.iter_mut().find(|(part, _)| part == url_part) {
                Some((_, queue)) => queue.push_back(response),
                None => routes.push((url_part.to_string(), VecDeque::from([response]))),
            }
        }
        self
    }

    fn streaming(self, chunks: Vec<&str>) -> Self {
        *self.stream_lines.lock().unwrap() =
            Some(chunks.into_iter().map(|c| c.as_bytes().to_vec()).collect());
        self
    }

    fn calls_to(&self, url_part: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.contains(url_part))
            .count()
    }
}

#[async_trait::async_trait]
impl HttpTransport for ScriptedHttp {
    async fn send(
        &self,
        request: HttpRequest,
        _cancel: &CancellationToken,
    ) -> Result<HttpResponse, TransportError> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);
        let mut routes = self.routes.lock().unwrap();
        let (_, queue) = routes
            .iter_mut()
            .find(|(part, _)| url.contains(part.as_str()))
            .ok_or_else(|| TransportError::Network(format!("no route for {url}")))?;
        Ok(if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue[0].clone()
        })
    }

    async fn send_streaming(
        &self,
        request: HttpRequest,
        _cancel: &CancellationToken,
    ) -> Result<StreamingResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        let chunks = self
            .stream_lines
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| TransportError::Network("no scripted stream".into()))?;
        Ok(StreamingResponse {
            status: 200,
            headers: Vec::new(),
            body: futures::stream::iter(chunks.into_iter().map(Ok)).boxed(),
        })
    }
}

struct NoDelay;

#[async_trait::async_trait]
impl RetryDelay for NoDelay {
    async fn wait(
        &self,
        _delay: std::time::Duration,
        _cancel: &CancellationToken,
    ) -> Result<(), talewright_core::InferenceError> {
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn registry_with(service: Arc<dyn TextGenerationService>) -> StageRegistry {
    let mut registry = StageRegistry::builtin();
    talewright_llm::register_stages(&mut registry, service);
    registry
}

fn turn(
    registry: &StageRegistry,
    input: TextInput,
    stages: &[&str],
) -> PipelineDefinition<CollectedText> {
    let mut transforms: Vec<Box<dyn Transform>> = vec![
        Box::new(Annotate::new(annotations::SESSION_ID, "harbor-town").unwrap()),
        Box::new(Annotate::new(annotations::TURN_INDEX, "3").unwrap()),
    ];
    transforms.extend(registry.build_all(stages).unwrap());
    PipelineDefinition::new(TextSource::new(input), TextCollectingSink::new())
        .with_transforms(transforms)
}

async fn run(definition: &PipelineDefinition<CollectedText>) -> PipelineRunResult<CollectedText> {
    PipelineRunner::new()
        .run(definition, &CancellationToken::new())
        .await
}

fn final_state(collected: &CollectedText) -> StoryState {
    let metadata = collected.last_metadata.as_ref().expect("metadata");
    let json = metadata
        .annotation(annotations::STORY_STATE_JSON)
        .expect("story state");
    StoryState::from_json(json).expect("valid state")
}

// ── Pipeline runs ───────────────────────────────────────────────────────

#[tokio::test]
async fn narration_turn_builds_story_state() {
    let teller = Arc::new(StoryTeller::new());
    let registry = registry_with(teller.clone());
    let definition = turn(
        &registry,
        TextInput::Pieces(vec![
            "You enter the tavern ".into(),
            "holding a lantern.".into(),
        ]),
        &[
            "accumulate:max_chunks=2",
            "rewrite",
            "summarize",
            "track-inventory",
            "track-characters",
        ],
    );

    let result = run(&definition).await;
    assert_eq!(result.outcome.status, PipelineStatus::Completed);

    let collected = result.result.unwrap();
    assert_eq!(collected.chunk_count, 1);
    assert!(collected.text.starts_with("You step into the smoky tavern"));

    let metadata = collected.last_metadata.as_ref().unwrap();
    assert_eq!(
        annotations::original_text(metadata),
        Some("You enter the tavern holding a lantern.")
    );
    assert_eq!(annotations::turn_index(metadata), Some(3));

    let state = final_state(&collected);
    assert_eq!(state.session_id, "harbor-town");
    assert_eq!(state.version, 3);
    assert_eq!(
        state.summary.as_deref(),
        Some("The hero entered the tavern carrying a lantern and met Mira.")
    );
    assert_eq!(state.item("lantern").unwrap().display_name, "Brass Lantern");
    let mira = state.character("mira").unwrap();
    assert_eq!(mira.aliases, vec!["the barkeep".to_string()]);
    assert_eq!(teller.calls(), 4);
}

#[tokio::test]
async fn provider_outage_degrades_to_pass_through() {
    let teller = Arc::new(StoryTeller::offline());
    let registry = registry_with(teller.clone());
    let definition = turn(
        &registry,
        TextInput::Complete("The rain does not stop.".into()),
        &["rewrite", "summarize", "track-inventory"],
    );

    let result = run(&definition).await;
    assert!(result.outcome.is_completed());

    let collected = result.result.unwrap();
    assert_eq!(collected.text, "The rain does not stop.");
    let state = final_state(&collected);
    assert_eq!(state.version, 0);
    assert_eq!(state.summary, None);
    assert_eq!(teller.calls(), 3);
}

#[tokio::test]
async fn canceled_run_reports_canceled() {
    let registry = registry_with(Arc::new(StoryTeller::new()));
    let definition = turn(&registry, TextInput::Complete("x".into()), &["summarize"]);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = PipelineRunner::new().run(&definition, &cancel).await;
    assert_eq!(result.outcome.status, PipelineStatus::Canceled);
    assert!(result.result.is_none());
}

#[tokio::test]
async fn bytes_without_decode_is_a_type_mismatch() {
    let teller = Arc::new(StoryTeller::new());
    let registry = registry_with(teller.clone());
    let definition = PipelineDefinition::new(
        TextSource::new(TextInput::Bytes {
            chunks: vec![b"hello".to_vec()],
            encoding: Some("utf-8".into()),
        }),
        TextCollectingSink::new(),
    )
    .with_transforms(registry.build_all(&["summarize"]).unwrap());

    let result = run(&definition).await;
    assert_eq!(result.outcome.failure_kind, FailureKind::TypeMismatch);
    assert_eq!(teller.calls(), 0);
}

// ── Unified client behind pipeline stages ───────────────────────────────

fn unified(transport: Arc<ScriptedHttp>, model: &str) -> Arc<dyn TextGenerationService> {
    let client = UnifiedInferenceClient::new(transport, ClientOptions::default())
        .with_retry_delay(Arc::new(NoDelay));
    Arc::new(UnifiedTextService::new(
        Arc::new(client),
        InferenceProvider::HuggingFace,
        model,
    ))
}

#[tokio::test]
async fn unified_client_backs_summary_stage() {
    let transport = Arc::new(
        ScriptedHttp::default()
            .route(
                "huggingface.co/api/models/",
                HttpResponse::new(200, r#"{"pipeline_tag":"text-generation"}"#),
            )
            .route("/models/storyteller", HttpResponse::new(503, "loading"))
            .route(
                "/models/storyteller",
                HttpResponse::new(200, r#"[{"generated_text":"A quiet night at the inn."}]"#),
            ),
    );
    let registry = registry_with(unified(transport.clone(), "storyteller"));
    let definition = turn(
        &registry,
        TextInput::Complete("You rest at the inn.".into()),
        &["summarize"],
    );

    let result = run(&definition).await;
    let state = final_state(&result.result.unwrap());
    assert_eq!(state.summary.as_deref(), Some("A quiet night at the inn."));
    assert_eq!(state.version, 1);
    assert_eq!(transport.calls_to("api-inference.huggingface.co/models/storyteller"), 2);
}

#[tokio::test]
async fn unsupported_model_leaves_narration_untouched() {
    let transport = Arc::new(ScriptedHttp::default().route(
        "huggingface.co/api/models/",
        HttpResponse::new(200, r#"{"pipeline_tag":"text-to-image"}"#),
    ));
    let registry = registry_with(unified(transport.clone(), "painter"));
    let definition = turn(
        &registry,
        TextInput::Complete("A mural covers the wall.".into()),
        &["rewrite", "summarize"],
    );

    let result = run(&definition).await;
    assert!(result.outcome.is_completed());
    let collected = result.result.unwrap();
    assert_eq!(collected.text, "A mural covers the wall.");
    assert_eq!(final_state(&collected).version, 0);
    assert_eq!(transport.calls_to("api-inference"), 0);
    assert_eq!(transport.calls_to("huggingface.co/api/models/"), 1);
}

// ── Streaming ───────────────────────────────────────────────────────────

#[tokio::test]
async fn streamed_tokens_arrive_in_order_with_metrics() {
    let transport = Arc::new(ScriptedHttp::default().streaming(vec![
        "{\"content\":\"Once \",\"isFinal\":false}\n{\"content\":\"upon \"",
        ",\"isFinal\":false}\n\n",
        "{\"content\":\"a time.\",\"isFinal\":true}",
    ]));
    let metrics = Arc::new(InMemoryMetrics::new());
    let service = TokenStreamService::new(transport, metrics.clone());

    let tokens: Vec<_> = service
        .stream(
            StreamPrompt::new("Tell a story"),
            StreamContext::new("http://localhost:9000/stream"),
            CancellationToken::new(),
        )
        .collect()
        .await;

    let tokens: Vec<_> = tokens.into_iter().map(|t| t.unwrap()).collect();
    let text: String = tokens.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(text, "Once upon a time.");
    assert!(tokens.last().unwrap().is_final);

    let snapshot = metrics.snapshot();
    let stats = snapshot.provider("stream").unwrap();
    assert_eq!(stats.requests, 1);
    assert_eq!(stats.successes, 1);
    assert!(stats.bytes_sent > 0);
    assert!(stats.bytes_received > 0);
}
