mod common;

use common::Fixture;
use serde_json::Value;

/// Serve the router on an ephemeral port and return its base URL.
async fn spawn_server(fixture: &Fixture) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = eduimg::server::router(fixture.engine());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn get(url: &str) -> (u16, Value) {
    let resp = reqwest::get(url).await.unwrap();
    let status = resp.status().as_u16();
    let body: Value = resp.json().await.unwrap();
    (status, body)
}

#[tokio::test]
async fn test_health() {
    let fixture = Fixture::new();
    let base = spawn_server(&fixture).await;

    let (status, body) = get(&format!("{}/health", base)).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_get_images_returns_all_backends() {
    let fixture = Fixture::new();
    let base = spawn_server(&fixture).await;

    let (status, body) = get(&format!("{}/get-images?query=force&k=2", base)).await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["query"], "force");

    let results = body["results"].as_object().unwrap();
    assert_eq!(results.len(), 4);
    for name in ["bge", "bm25_with_stopwords", "bm25_without_stopwords"] {
        let variants = results[name].as_object().unwrap();
        assert_eq!(variants.len(), 5, "{}", name);
        assert!(variants.values().all(|list| list.as_array().unwrap().len() == 2));
    }
    let clip = results["clip"].as_array().unwrap();
    assert_eq!(clip.len(), 2);
    assert_eq!(clip[0]["topic"], "Force");
}

#[tokio::test]
async fn test_get_images_default_k() {
    let fixture = Fixture::new();
    let base = spawn_server(&fixture).await;

    let (status, body) = get(&format!("{}/get-images?query=water", base)).await;
    assert_eq!(status, 200);
    assert_eq!(body["results"]["clip"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_get_images_bad_parameters() {
    let fixture = Fixture::new();
    let base = spawn_server(&fixture).await;

    for path in [
        "/get-images",
        "/get-images?query=force&k=0",
        "/get-images?query=force&k=-3",
        "/get-images?query=force&k=abc",
    ] {
        let (status, body) = get(&format!("{}{}", base, path)).await;
        assert_eq!(status, 400, "{}: {}", path, body);
        assert_eq!(body["error"]["code"], "bad_request", "{}", path);
        assert!(body["error"]["message"].is_string());
    }
}

#[tokio::test]
async fn test_blank_query_is_answered() {
    let fixture = Fixture::new();
    let base = spawn_server(&fixture).await;

    for (raw, echoed) in [("", ""), ("%20%20", "  ")] {
        let (status, body) = get(&format!("{}/get-images?query={}&k=2", base, raw)).await;
        assert_eq!(status, 200, "query={:?}: {}", raw, body);
        assert_eq!(body["query"], echoed);
        let results = body["results"].as_object().unwrap();
        assert_eq!(results.len(), 4);
        // Nothing matches, so lexical lists fall back to corpus order.
        let bm25 = &results["bm25_with_stopwords"]["1"];
        assert_eq!(bm25.as_array().unwrap().len(), 2);
        assert_eq!(bm25[0]["topic"], "Force");
        assert_eq!(bm25[1]["subtopic"], "Friction");
    }
}

#[tokio::test]
async fn test_large_k_returns_whole_corpus() {
    let fixture = Fixture::new();
    let base = spawn_server(&fixture).await;

    let (status, body) = get(&format!("{}/get-images?query=force&k=1000", base)).await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["results"]["clip"].as_array().unwrap().len(), 6);
    let bge = body["results"]["bge"].as_object().unwrap();
    assert!(bge.values().all(|list| list.as_array().unwrap().len() == 6));
}

#[tokio::test]
async fn test_single_backend_query() {
    let fixture = Fixture::new();
    let base = spawn_server(&fixture).await;

    let (status, body) = get(&format!("{}/backends/bge?query=force&k=2&variant=3", base)).await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["backend"], "bge");
    let list = body["results"].as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert!(list.iter().all(|d| d["topic"] == "Force" && d["structure"] == 3));

    // No variant: one list per variant.
    let (status, body) =
        get(&format!("{}/backends/bm25_with_stopwords?query=force", base)).await;
    assert_eq!(status, 200);
    assert_eq!(body["results"].as_object().unwrap().len(), 5);
}

#[tokio::test]
async fn test_single_backend_errors() {
    let fixture = Fixture::new();
    let base = spawn_server(&fixture).await;

    let (status, body) = get(&format!("{}/backends/tfidf?query=force", base)).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, body) = get(&format!("{}/backends/bge?query=force&variant=9", base)).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_backend_listing_tracks_loaded_handles() {
    let fixture = Fixture::new();
    let base = spawn_server(&fixture).await;

    let (status, body) = get(&format!("{}/backends", base)).await;
    assert_eq!(status, 200);
    let backends = body["backends"].as_array().unwrap();
    assert_eq!(backends.len(), 4);
    assert!(backends.iter().all(|b| b["loaded"] == false));

    get(&format!("{}/backends/bge?query=force&variant=2", base)).await;

    let (_, body) = get(&format!("{}/backends", base)).await;
    let bge = body["backends"]
        .as_array()
        .unwrap()
        .iter()
        .find(|b| b["name"] == "bge")
        .unwrap()
        .clone();
    assert_eq!(bge["loaded"], true);
    assert_eq!(bge["has_variants"], true);
    assert_eq!(bge["loaded_variants"], serde_json::json!([2]));
}

#[tokio::test]
async fn test_missing_artifacts_still_return_200() {
    let fixture = Fixture::new();
    std::fs::remove_dir_all(&fixture.config.artifacts.bge_dir).unwrap();
    let base = spawn_server(&fixture).await;

    let (status, body) = get(&format!("{}/get-images?query=force", base)).await;
    assert_eq!(status, 200);
    let bge = body["results"]["bge"].as_object().unwrap();
    assert_eq!(bge.len(), 5);
    assert!(bge.values().all(|list| list.as_array().unwrap().is_empty()));
    assert_eq!(body["results"]["clip"].as_array().unwrap().len(), 1);
}
