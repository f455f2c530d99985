use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use metrics_exporter_prometheus::PrometheusBuilder;
use query_server::{app, state::AppState};
use search_core::EmbeddingIndex;
use serde_json::{Value, json};
use tower::ServiceExt;

fn seeded_index() -> EmbeddingIndex {
    let mut index = EmbeddingIndex::new();
    let rows: [(&str, [f32; 3]); 7] = [
        ("animals10/embedding/cane/c1.json", [1.0, 0.0, 0.0]),
        ("animals10/embedding/cane/c2.json", [0.9, 0.1, 0.0]),
        ("animals10/embedding/gatto/g1.json", [0.0, 1.0, 0.0]),
        ("animals10/embedding/gatto/g2.json", [0.1, 0.9, 0.0]),
        ("animals10/embedding/ragno/r1.json", [0.0, 0.0, 1.0]),
        ("animals10/embedding/ragno/r2.json", [0.0, 0.1, 0.9]),
        ("animals10/embedding/pecora/p1.json", [0.5, 0.5, 0.5]),
    ];
    for (file, row) in rows {
        index.upsert(file.to_string(), &row).expect("seed");
    }
    index
}

fn seeded_state() -> AppState {
    AppState::for_tests().with_index(seeded_index())
}

fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .expect("request")
}

async fn body_text(res: axum::response::Response) -> String {
    let bytes = to_bytes(res.into_body(), 1024 * 1024).await.expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf8")
}

#[tokio::test]
async fn health_returns_plain_ok() {
    let res = app::router(seeded_state())
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-correlation-id"));
    assert_eq!(body_text(res).await, "OK");
}

#[tokio::test]
async fn query_returns_top_five_cosine_matches() {
    let body = json!({"embedding": [1.0, 0.05, 0.0]}).to_string();
    let res = app::router(seeded_state())
        .oneshot(post("/query", body))
        .await
        .expect("response");
    assert_eq!(res.status(), StatusCode::OK);

    let parsed: Value = serde_json::from_str(&body_text(res).await).expect("json");
    let matches = parsed["matches"].as_array().expect("matches");
    assert_eq!(matches.len(), 5);
    assert_eq!(matches[0]["file"], "animals10/embedding/cane/c1.json");
    assert_eq!(matches[1]["file"], "animals10/embedding/cane/c2.json");
    assert!(matches[0]["similarity"].as_f64().expect("score") > 0.99);
    assert!(matches[0].get("distance").is_none());
}

#[tokio::test]
async fn query_honors_top_k_and_euclidean_metric() {
    let body = json!({"embedding": [0.0, 0.0, 1.0], "top_k": 2, "metric": "euclidean"}).to_string();
    let res = app::router(seeded_state())
        .oneshot(post("/query", body))
        .await
        .expect("response");
    assert_eq!(res.status(), StatusCode::OK);

    let parsed: Value = serde_json::from_str(&body_text(res).await).expect("json");
    let matches = parsed["matches"].as_array().expect("matches");
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0]["file"], "animals10/embedding/ragno/r1.json");
    assert_eq!(matches[0]["distance"], 0.0);
}

#[tokio::test]
async fn query_rejects_malformed_json() {
    let res = app::router(seeded_state())
        .oneshot(post("/query", "{not json"))
        .await
        .expect("response");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(res).await, "Invalid JSON");

    let res = app::router(seeded_state())
        .oneshot(post("/query", json!({"vector": [1.0]}).to_string()))
        .await
        .expect("response");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(res).await, "Invalid JSON");
}

#[tokio::test]
async fn query_rejects_dimension_mismatch() {
    let res = app::router(seeded_state())
        .oneshot(post("/query", json!({"embedding": [1.0, 2.0]}).to_string()))
        .await
        .expect("response");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(res).await, "Embedding size mismatch");
}

#[tokio::test]
async fn upsert_inserts_then_replaces_and_is_queryable() {
    let state = seeded_state();
    let router = app::router(state.clone());

    let res = router
        .clone()
        .oneshot(post(
            "/upsert",
            json!({"file": "animals10/embedding/mucca/m1.json", "embedding": [0.0, -1.0, 0.0]})
                .to_string(),
        ))
        .await
        .expect("response");
    assert_eq!(res.status(), StatusCode::OK);
    let parsed: Value = serde_json::from_str(&body_text(res).await).expect("json");
    assert_eq!(parsed["inserted"], true);
    assert_eq!(parsed["total"], 8);

    let res = router
        .clone()
        .oneshot(post(
            "/upsert",
            json!({"file": "animals10/embedding/mucca/m1.json", "embedding": [0.0, -2.0, 0.0]})
                .to_string(),
        ))
        .await
        .expect("response");
    let parsed: Value = serde_json::from_str(&body_text(res).await).expect("json");
    assert_eq!(parsed["inserted"], false);
    assert_eq!(parsed["total"], 8);

    let res = router
        .oneshot(post(
            "/query",
            json!({"embedding": [0.0, -1.0, 0.0], "top_k": 1}).to_string(),
        ))
        .await
        .expect("response");
    let parsed: Value = serde_json::from_str(&body_text(res).await).expect("json");
    assert_eq!(parsed["matches"][0]["file"], "animals10/embedding/mucca/m1.json");
}

#[tokio::test]
async fn upsert_rejects_mismatch_and_empty_vectors() {
    let res = app::router(seeded_state())
        .oneshot(post(
            "/upsert",
            json!({"file": "x.json", "embedding": [1.0]}).to_string(),
        ))
        .await
        .expect("response");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(res).await, "Embedding size mismatch");

    let res = app::router(seeded_state())
        .oneshot(post(
            "/upsert",
            json!({"file": "x.json", "embedding": []}).to_string(),
        ))
        .await
        .expect("response");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(res).await, "Empty embedding");
}

#[tokio::test]
async fn upsert_persists_under_embedding_dir_when_enabled() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut state = seeded_state();
    state.embedding_dir = tmp.path().to_path_buf();
    state.persist_upserts = true;

    let target = tmp.path().join("lupo/w1.json");
    let res = app::router(state)
        .oneshot(post(
            "/upsert",
            json!({"file": target.display().to_string(), "embedding": [0.25, 0.5, 0.75]})
                .to_string(),
        ))
        .await
        .expect("response");
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        indexer::read_embedding(&target).expect("persisted"),
        vec![0.25, 0.5, 0.75]
    );
}

#[tokio::test]
async fn token_is_required_when_configured() {
    let mut state = seeded_state();
    state.api_token = Some("secret-token".to_string());
    let router = app::router(state);

    let res = router
        .clone()
        .oneshot(post("/query", json!({"embedding": [1.0, 0.0, 0.0]}).to_string()))
        .await
        .expect("response");
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .method("POST")
        .uri("/query")
        .header("content-type", "application/json")
        .header("x-api-token", "secret-token")
        .body(Body::from(json!({"embedding": [1.0, 0.0, 0.0]}).to_string()))
        .expect("request");
    let res = router.oneshot(req).await.expect("response");
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn correlation_id_is_echoed_back() {
    let req = Request::builder()
        .uri("/health")
        .header("x-correlation-id", "abc-123")
        .body(Body::empty())
        .expect("request");
    let res = app::router(seeded_state())
        .oneshot(req)
        .await
        .expect("response");
    assert_eq!(
        res.headers()
            .get("x-correlation-id")
            .and_then(|v| v.to_str().ok()),
        Some("abc-123")
    );
}

#[tokio::test]
async fn empty_index_answers_with_no_matches() {
    let res = app::router(AppState::for_tests())
        .oneshot(post("/query", json!({"embedding": [1.0, 2.0]}).to_string()))
        .await
        .expect("response");
    assert_eq!(res.status(), StatusCode::OK);
    let parsed: Value = serde_json::from_str(&body_text(res).await).expect("json");
    assert_eq!(parsed["matches"], json!([]));
}

#[tokio::test]
async fn health_reports_unavailable_while_shutting_down() {
    let state = seeded_state();
    state.begin_shutdown();
    let res = app::router(state)
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn upsert_requires_token_when_configured() {
    let mut state = seeded_state();
    state.api_token = Some("secret-token".to_string());
    let body = json!({"file": "x.json", "embedding": [1.0, 1.0, 1.0]}).to_string();

    let res = app::router(state.clone())
        .oneshot(post("/upsert", body.clone()))
        .await
        .expect("response");
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(state.index.read().await.len(), 7);

    let req = Request::builder()
        .method("POST")
        .uri("/upsert")
        .header("content-type", "application/json")
        .header("x-api-token", "secret-token")
        .body(Body::from(body))
        .expect("request");
    let res = app::router(state.clone()).oneshot(req).await.expect("response");
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(state.index.read().await.len(), 8);
}

#[tokio::test]
async fn overflowing_values_are_rejected_on_both_routes() {
    let state = seeded_state();

    let res = app::router(state.clone())
        .oneshot(post(
            "/upsert",
            r#"{"file": "z.json", "embedding": [1e39, 0.0, 0.0]}"#,
        ))
        .await
        .expect("response");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(res).await, "Non-finite embedding value");
    assert!(state.index.read().await.row("z.json").is_none());

    let res = app::router(state.clone())
        .oneshot(post("/query", r#"{"embedding": [0.0, -1e39, 0.0]}"#))
        .await
        .expect("response");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(res).await, "Non-finite embedding value");

    let res = app::router(state)
        .oneshot(post("/query", json!({"embedding": [1.0, 0.0, 0.0]}).to_string()))
        .await
        .expect("response");
    let parsed: Value = serde_json::from_str(&body_text(res).await).expect("json");
    assert_eq!(parsed["matches"][0]["file"], "animals10/embedding/cane/c1.json");
}

#[tokio::test]
async fn failed_persist_leaves_index_untouched() {
    let tmp = tempfile::tempdir().expect("tempdir");
    std::fs::write(tmp.path().join("blocked"), b"not a directory").expect("write");
    let mut state = seeded_state();
    state.embedding_dir = tmp.path().to_path_buf();
    state.persist_upserts = true;

    let target = tmp.path().join("blocked/w1.json");
    let res = app::router(state.clone())
        .oneshot(post(
            "/upsert",
            json!({"file": target.display().to_string(), "embedding": [0.25, 0.5, 0.75]})
                .to_string(),
        ))
        .await
        .expect("response");
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let index = state.index.read().await;
    assert_eq!(index.len(), 7);
    assert!(index.row(&target.display().to_string()).is_none());
}

#[tokio::test]
async fn metrics_endpoint_renders_request_counters() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let mut state = seeded_state();
    state.metrics = recorder.handle();
    let _guard = metrics::set_default_local_recorder(&recorder);
    let router = app::router(state);

    let res = router
        .clone()
        .oneshot(post("/query", json!({"embedding": [1.0, 0.0, 0.0]}).to_string()))
        .await
        .expect("response");
    assert_eq!(res.status(), StatusCode::OK);

    let res = router
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(res.status(), StatusCode::OK);
    let text = body_text(res).await;
    assert!(text.contains("imgvec_http_requests_total"));
    assert!(text.contains(r#"route="/query""#));
    assert!(text.contains("imgvec_queries_total 1"));
    assert!(text.contains("imgvec_index_rows 7"));
}
