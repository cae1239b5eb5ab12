use anyhow::Result;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Form, Json, Router,
};
use docindex::{QueryEngine, SearchHit, Store, Tokenizer};
use serde::{Deserialize, Serialize};
use std::path::{Component, PathBuf};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Deserialize)]
pub struct SearchForm {
    #[serde(default)]
    pub search_input: String,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QueryEngine>,
    /// Directory holding the raw pages, addressed by document id.
    pub pages_root: PathBuf,
}

pub fn build_app(db_dir: &str, pages_root: &str) -> Result<Router> {
    let store = Store::open(db_dir)?;
    if store.needs_ranking()? {
        tracing::warn!(db_dir, "index has documents added since the last tf-idf pass; run `indexer rank`");
    }
    let engine = QueryEngine::new(store, Arc::new(Tokenizer::new()));
    Ok(router(engine, PathBuf::from(pages_root)))
}

pub fn router(engine: QueryEngine, pages_root: PathBuf) -> Router {
    let app_state = AppState { engine: Arc::new(engine), pages_root };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/", get(index_page).post(index_search))
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/pages/*path", get(page_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    tracing::error!(error = %format!("{e:#}"), "query failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "search failed".into())
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let start = std::time::Instant::now();
    let results = state.engine.search(&params.q).map_err(internal)?;
    let elapsed = start.elapsed();
    Ok(Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_hits: results.len(), results }))
}

async fn index_page() -> Html<String> {
    Html(render_page("", &[]))
}

async fn index_search(
    State(state): State<AppState>,
    Form(form): Form<SearchForm>,
) -> Result<Html<String>, (StatusCode, String)> {
    let query = form.search_input.trim();
    let results = if query.is_empty() { Vec::new() } else { state.engine.search(query).map_err(internal)? };
    Ok(Html(render_page(query, &results)))
}

/// Raw bytes of a stored page. Only plain relative paths are served.
pub async fn page_handler(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    let rel = PathBuf::from(&path);
    if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
        return (StatusCode::BAD_REQUEST, "invalid page path").into_response();
    }
    match tokio::fs::read(state.pages_root.join(&rel)).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], Body::from(bytes)).into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not found").into_response(),
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "failed to read page");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to read page").into_response()
        }
    }
}

fn render_page(query: &str, results: &[SearchHit]) -> String {
    let mut html = String::from("<!doctype html><html><head><meta charset=\"utf-8\"><title>Search</title></head><body>");
    html.push_str("<form method=\"post\" action=\"/\"><input type=\"text\" name=\"search_input\" value=\"");
    html.push_str(&escape_html(query));
    html.push_str("\"><button type=\"submit\">Search</button></form>");
    if !query.is_empty() {
        html.push_str(&format!("<p>{} results</p><ol>", results.len()));
        for hit in results {
            let title = if hit.title.is_empty() { hit.url.as_str() } else { hit.title.as_str() };
            html.push_str(&format!(
                "<li><a href=\"/pages/{}\">{}</a><br><small>{}</small></li>",
                escape_html(&hit.doc_id),
                escape_html(title),
                escape_html(&hit.url)
            ));
        }
        html.push_str("</ol>");
    }
    html.push_str("</body></html>");
    html
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
