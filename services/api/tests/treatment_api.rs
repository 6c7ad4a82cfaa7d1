//! Router-level tests for the treatment endpoints, driven through `oneshot`
//! with scripted generation and speech services.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api_lib::web::{app, rest::DEFAULT_QUESTIONNAIRE, AppState};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use futures::stream;
use physio_coach_core::{
    AudioStream, NarratorOptions, PlanGeneratorOptions, PortError, PortResult,
    TextGenerationService, TextToSpeechService, DEFAULT_EXEMPT_FIELDS,
};
use serde_json::{json, Value};
use tower::util::ServiceExt;
use tracing_subscriber::fmt::MakeWriter;

const SCENARIO_A: &str = r#"Here is your plan:
```json
{"exercise":"Neck stretch","intro":"Hi","steps":{"1":{"action":"Tilt neck to left","description":"Slowly tilt your head left."}},"outro":"Done"}
```"#;

/// Always replies with the same text and records the prompts it receives.
struct FixedGenerator {
    reply: PortResult<String>,
    prompts: Mutex<Vec<String>>,
}

impl FixedGenerator {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn failing(error: PortError) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(error),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl TextGenerationService for FixedGenerator {
    async fn complete(&self, prompt: &str) -> PortResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone()
    }
}

/// Never answers.
struct StalledGenerator;

#[async_trait]
impl TextGenerationService for StalledGenerator {
    async fn complete(&self, _prompt: &str) -> PortResult<String> {
        std::future::pending().await
    }
}

/// "Synthesizes" `ID3:` followed by the text, unless the text is listed in `fail_on`.
#[derive(Default)]
struct FakeSpeech {
    fail_on: Vec<String>,
}

#[async_trait]
impl TextToSpeechService for FakeSpeech {
    async fn synthesize(&self, text: &str) -> PortResult<AudioStream> {
        if self.fail_on.iter().any(|t| t == text) {
            return Err(PortError::Remote("simulated speech outage".to_string()));
        }
        let chunks = vec![
            Ok(Bytes::from_static(b"ID3:")),
            Ok(Bytes::from(text.to_string())),
        ];
        Ok(Box::pin(stream::iter(chunks)))
    }
}

fn router(generator: Arc<dyn TextGenerationService>, speech: FakeSpeech) -> Router {
    let narrator_options = NarratorOptions {
        timeout: Duration::from_secs(5),
        concurrency: 2,
        exempt_fields: DEFAULT_EXEMPT_FIELDS
            .iter()
            .map(|f| f.to_string())
            .collect::<HashSet<_>>(),
    };
    let plan_options = PlanGeneratorOptions {
        timeout: Duration::from_secs(5),
        max_attempts: 2,
    };
    let state = AppState::new(generator, Arc::new(speech), plan_options, narrator_options);
    app(Arc::new(state))
}

fn post_treatment(body: &'static str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/treatment")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn decode_audio(value: &Value) -> String {
    let encoded = value.as_str().expect("audio must be a base64 string");
    String::from_utf8(BASE64.decode(encoded).unwrap()).unwrap()
}

/// Collects formatted log output in memory.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test]
async fn root_reports_service_is_up() {
    let app = router(FixedGenerator::replying(SCENARIO_A), FakeSpeech::default());
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({"status": "success", "message": "Hello there!"})
    );
}

#[tokio::test]
async fn treatment_returns_narrated_plan() {
    let app = router(FixedGenerator::replying(SCENARIO_A), FakeSpeech::default());

    let response = app
        .oneshot(post_treatment(r#"{"questionnaire":"My neck hurts"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
    let body = json_body(response).await;
    assert_eq!(body["exercise"], "Neck stretch");
    assert_eq!(decode_audio(&body["intro_audio"]), "ID3:Hi");
    assert_eq!(decode_audio(&body["outro_audio"]), "ID3:Done");
    assert_eq!(
        decode_audio(&body["steps"]["1"]["description_audio"]),
        "ID3:Slowly tilt your head left."
    );
    assert!(body.get("exercise_audio").is_none());
    assert!(body["steps"]["1"].get("action_audio").is_none());
    assert_eq!(body["steps"]["1"]["action"], "Tilt neck to left");
}

#[tokio::test]
async fn audio_sibling_follows_its_field() {
    let app = router(FixedGenerator::replying(SCENARIO_A), FakeSpeech::default());

    let response = app.oneshot(post_treatment("{}")).await.unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    let intro = text.find("\"intro\"").unwrap();
    let intro_audio = text.find("\"intro_audio\"").unwrap();
    let steps = text.find("\"steps\"").unwrap();
    assert!(intro < intro_audio && intro_audio < steps);
}

#[tokio::test]
async fn completion_log_records_elapsed_time_as_a_field() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);
    let app = router(FixedGenerator::replying(SCENARIO_A), FakeSpeech::default());

    let response = app.oneshot(post_treatment("{}")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let output = logs.contents();
    let line = output
        .lines()
        .find(|line| line.contains("Treatment plan ready."))
        .unwrap_or_else(|| panic!("no completion line in:\n{output}"));
    assert!(line.contains("elapsed_ms="), "line was: {line}");
    assert!(line.contains("steps=1"), "line was: {line}");
}

#[tokio::test]
async fn missing_questionnaire_uses_placeholder() {
    let generator = FixedGenerator::replying(SCENARIO_A);
    let app = router(generator.clone(), FakeSpeech::default());

    let response = app.oneshot(post_treatment("")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let prompts = generator.prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains(DEFAULT_QUESTIONNAIRE));
}

#[tokio::test]
async fn invalid_json_body_is_bad_request() {
    let app = router(FixedGenerator::replying(SCENARIO_A), FakeSpeech::default());

    let response = app.oneshot(post_treatment("{not json")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn reply_without_fenced_block_is_bad_gateway() {
    let app = router(
        FixedGenerator::replying("Sorry, I cannot help with that."),
        FakeSpeech::default(),
    );

    let response = app.oneshot(post_treatment("{}")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
    let body = json_body(response).await;
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("fenced"));
}

#[tokio::test]
async fn malformed_payload_reports_decode_detail() {
    let app = router(
        FixedGenerator::replying("```json {\"a\":1,} ```"),
        FakeSpeech::default(),
    );

    let response = app.oneshot(post_treatment("{}")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = json_body(response).await;
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("trailing comma"), "message was: {message}");
}

#[tokio::test]
async fn failed_narration_names_the_field_and_returns_no_plan() {
    let speech = FakeSpeech {
        fail_on: vec!["Slowly tilt your head left.".to_string()],
    };
    let app = router(FixedGenerator::replying(SCENARIO_A), speech);

    let response = app.oneshot(post_treatment("{}")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = json_body(response).await;
    assert!(body.get("intro_audio").is_none());
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("steps.1.description"), "message was: {message}");
}

#[tokio::test]
async fn remote_failure_is_bad_gateway() {
    let app = router(
        FixedGenerator::failing(PortError::Remote("model unavailable".to_string())),
        FakeSpeech::default(),
    );

    let response = app.oneshot(post_treatment("{}")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test(start_paused = true)]
async fn stalled_generation_is_gateway_timeout() {
    let app = router(Arc::new(StalledGenerator), FakeSpeech::default());

    let response = app.oneshot(post_treatment("{}")).await.unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn preflight_is_no_content_with_cors_headers() {
    let app = router(FixedGenerator::replying(SCENARIO_A), FakeSpeech::default());
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/treatment")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert!(headers[header::ACCESS_CONTROL_ALLOW_METHODS]
        .to_str()
        .unwrap()
        .contains("POST"));
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
}
