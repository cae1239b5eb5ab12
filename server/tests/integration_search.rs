use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use docindex::extract::ExtractedPage;
use docindex::{compute_tf_idf, IndexWriter, QueryEngine, Store, Tokenizer};
use http_body_util::BodyExt;
use serde_json::Value;
use std::fs;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

fn build_tiny_index(pages: &std::path::Path) -> QueryEngine {
    let tokenizer = Arc::new(Tokenizer::new());
    let store = Store::temporary().unwrap();
    let writer = IndexWriter::new(store.clone(), tokenizer.clone());
    // "rust" is denser in doc 0/0 than in 0/1; "cargo" only in 0/1
    writer.index_document("0/0", "www.example.com/rust", &ExtractedPage::plain("Rust Notes", "rust rust systems")).unwrap();
    writer.index_document("0/1", "www.example.com/learn", &ExtractedPage::plain("Learning", "learning rust with cargo today")).unwrap();
    writer.index_document("0/2", "www.example.com/go", &ExtractedPage::plain("Go", "goroutines")).unwrap();
    compute_tf_idf(&store).unwrap();

    fs::create_dir_all(pages.join("0")).unwrap();
    fs::write(pages.join("0/0"), "<html><title>Rust Notes</title></html>").unwrap();
    QueryEngine::new(store, tokenizer)
}

fn app() -> (Router, TempDir) {
    let pages = tempdir().unwrap();
    let engine = build_tiny_index(pages.path());
    (server::router(engine, pages.path().to_path_buf()), pages)
}

async fn call(app: Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    call(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let (app, _pages) = app();
    let (status, body) = get(app, "/search?q=rust").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 2);
    assert_eq!(arr[0]["doc_id"], "0/0");
    assert_eq!(arr[1]["doc_id"], "0/1");
    assert_eq!(arr[0]["tag"], "title");
    assert_eq!(json["total_hits"], 2);
}

#[tokio::test]
async fn unknown_terms_yield_empty_results() {
    let (app, _pages) = app();
    let (status, body) = get(app, "/search?q=zzqx").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["results"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn form_post_renders_links() {
    let (app, _pages) = app();
    let req = Request::post("/")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("search_input=rust+cargo"))
        .unwrap();
    let (status, body) = call(app, req).await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("href=\"/pages/0/1\""));
    assert!(!html.contains("href=\"/pages/0/2\""));
}

#[tokio::test]
async fn pages_are_served_raw() {
    let (app, _pages) = app();
    let (status, body) = get(app.clone(), "/pages/0/0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"<html><title>Rust Notes</title></html>");

    let (status, _) = get(app.clone(), "/pages/0/9").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(app, "/pages/0/..%2F..%2Fsecret").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
