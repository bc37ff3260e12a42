//! End-to-end tests of the HTTP API against an in-memory pattern store

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

use pattern_forge::generator::{GenerationRequest, Generator};
use pattern_forge::server::{router, ServerState};
use pattern_forge::{Config, FallbackOrchestrator, GenerationError, SqlitePatternStore};

/// Canned generator that counts its calls
#[derive(Default)]
struct StubGenerator {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl Generator for StubGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<Value, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(GenerationError::Api { status: 503, body: "upstream down".into() });
        }
        Ok(match request {
            GenerationRequest::Documentation(_) => json!({ "text": "/** Foo */" }),
            GenerationRequest::CodeGeneration(_) => json!({ "code": "class Sword {}", "explanation": "a sword" }),
            GenerationRequest::CodeFix(r) => json!({ "code": r.code, "explanation": "nothing to fix" }),
            GenerationRequest::FeatureAddition(r) => json!({ "files": r.files, "explanation": "done", "logs": [] }),
            GenerationRequest::IdeaGeneration(_) => json!({
                "ideas": [{ "title": "Asteroid Miner", "description": "Mine asteroids for ore" }],
                "inspirations": []
            }),
            GenerationRequest::IdeaExpansion(_) => json!({ "expandedIdea": { "summary": "expanded" } }),
        })
    }
}

fn app(generator: Arc<StubGenerator>) -> Router {
    app_with_config(generator, &Config::default())
}

fn app_with_config(generator: Arc<StubGenerator>, config: &Config) -> Router {
    let store = Arc::new(SqlitePatternStore::in_memory().unwrap());
    let forge = FallbackOrchestrator::new(store, generator, config);
    router(ServerState::new(forge))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

#[tokio::test]
async fn test_identical_docs_request_is_served_from_pattern() {
    let generator = Arc::new(StubGenerator::default());
    let app = app(generator.clone());
    let body = json!({ "code": "class Foo {}", "language": "java", "style": "javadoc" });

    let (status, first) = call(&app, "POST", "/api/docs", Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["text"], "/** Foo */");

    let (status, second) = call(&app, "POST", "/api/docs", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second, first);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

    let (_, metrics) = call(&app, "GET", "/api/metrics", None).await;
    assert_eq!(metrics["totalRequests"], 2);
    assert_eq!(metrics["patternMatches"], 1);
    assert_eq!(metrics["apiCalls"], 1);
    assert_eq!(metrics["estimatedTokensSaved"], 2000);
}

#[tokio::test]
async fn test_ideas_against_empty_store_generate_and_store() {
    let generator = Arc::new(StubGenerator::default());
    let app = app(generator.clone());

    let (status, ideas) = call(
        &app,
        "POST",
        "/api/ideas",
        Some(json!({ "theme": "space", "complexity": "medium" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ideas["ideas"][0]["title"], "Asteroid Miner");
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

    let (status, summary) = call(&app, "GET", "/api/patterns", None).await;
    assert_eq!(status, StatusCode::OK);
    let ideas_row = summary
        .as_array()
        .unwrap()
        .iter()
        .find(|row| row["kind"] == "idea_generation")
        .unwrap();
    assert_eq!(ideas_row["totalPatterns"], 1);
    assert_eq!(ideas_row["totalUses"], 0);
    assert_eq!(ideas_row["meanSuccessRate"], 100.0);
}

#[tokio::test]
async fn test_similar_but_not_close_enough_ideas_fall_back() {
    let generator = Arc::new(StubGenerator::default());
    let app = app(generator.clone());

    for theme in ["build a space mining mod", "build a space exploration mod"] {
        let (status, _) = call(
            &app,
            "POST",
            "/api/ideas",
            Some(json!({ "theme": theme, "complexity": "medium" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_generation_failure_maps_to_bad_gateway() {
    let generator = Arc::new(StubGenerator { fail: true, ..Default::default() });
    let app = app(generator);

    let (status, body) = call(
        &app,
        "POST",
        "/api/code",
        Some(json!({ "prompt": "a sword", "language": "java" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("503"));
}

#[tokio::test]
async fn test_feature_failure_returns_original_files() {
    let generator = Arc::new(StubGenerator { fail: true, ..Default::default() });
    let app = app(generator);
    let files = json!([{ "path": "Main.java", "content": "class Main {}" }]);

    let (status, body) = call(
        &app,
        "POST",
        "/api/features",
        Some(json!({ "files": files, "featureDescription": "add a logger" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["files"][0]["content"], "class Main {}");
}

#[tokio::test]
async fn test_blank_expand_title_is_bad_request() {
    let generator = Arc::new(StubGenerator::default());
    let app = app(generator.clone());

    let (status, _) = call(
        &app,
        "POST",
        "/api/ideas/expand",
        Some(json!({ "title": "", "description": "floating islands" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_outcome_reporting() {
    let generator = Arc::new(StubGenerator::default());
    let app = app(generator);

    let (status, _) = call(
        &app,
        "POST",
        "/api/patterns/ideas/missing-id/outcome",
        Some(json!({ "outcome": "failure" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        "POST",
        "/api/patterns/widgets/some-id/outcome",
        Some(json!({ "outcome": "success" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status() {
    let app = app(Arc::new(StubGenerator::default()));
    let (status, body) = call(&app, "GET", "/api/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["matching_enabled"], true);
}

#[tokio::test]
async fn test_status_reports_disabled_matching() {
    let mut config = Config::default();
    config.matching.enabled = false;
    let generator = Arc::new(StubGenerator::default());
    let app = app_with_config(generator.clone(), &config);

    let (_, body) = call(&app, "GET", "/api/status", None).await;
    assert_eq!(body["matching_enabled"], false);

    let docs = json!({ "code": "class Foo {}", "language": "java", "style": "javadoc" });
    call(&app, "POST", "/api/docs", Some(docs.clone())).await;
    call(&app, "POST", "/api/docs", Some(docs)).await;
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_fix_is_not_served_from_a_different_program() {
    let generator = Arc::new(StubGenerator::default());
    let app = app(generator.clone());

    let (_, foo) = call(
        &app,
        "POST",
        "/api/fix",
        Some(json!({
            "code": "class Foo { void a() { int x = ; } }",
            "errors": ["';' expected"],
            "language": "java"
        })),
    )
    .await;
    assert_eq!(foo["code"], "class Foo { void a() { int x = ; } }");

    let (status, bar) = call(
        &app,
        "POST",
        "/api/fix",
        Some(json!({
            "code": "class Bar { void b() { y.go(); } }",
            "errors": ["cannot find symbol y"],
            "language": "java"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bar["code"], "class Bar { void b() { y.go(); } }");
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
}
