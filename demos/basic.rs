//! Minimal tsu-toolkit example: strict JSON, uploads, downloads.
//!
//! Run with:
//!   RUST_LOG=info,tsu_toolkit=debug cargo run --example basic
//!
//! Try:
//!   curl -X POST http://localhost:3000/articles \
//!        -H 'content-type: application/json' \
//!        -d '{"title":"Hello World"}'
//!   curl -X POST http://localhost:3000/articles -d '{"title":1}'
//!   curl -F 'file=@logo.png' http://localhost:3000/upload
//!   curl -OJ http://localhost:3000/download/<stored name>
//!
//! Ctrl-C drains in-flight requests for up to ten seconds.

use std::time::Duration;

use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use tsu_toolkit::{CancellationToken, IntoResponse, Request, Response, Server, Tools, download_static_file, slugify};

const UPLOAD_DIR: &str = "./uploads";

#[derive(Deserialize)]
struct NewArticle {
    title: String,
}

#[derive(Serialize)]
struct Article {
    title: String,
    slug: String,
}

#[tokio::main]
async fn main() -> Result<(), tsu_toolkit::Error> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let tools = Tools::builder()
        .max_file_size(5 * 1024 * 1024)
        .allowed_file_types(["image/png", "image/jpeg", "image/gif"])
        .max_json_size(16 * 1024)
        .build();

    let app = move |req: Request| {
        let tools = tools.clone();
        async move { route(tools, req).await }
    };

    Server::bind("0.0.0.0:3000", app)
        .run(CancellationToken::new(), Duration::from_secs(10), None)
        .await
}

async fn route(tools: Tools, req: Request) -> Response {
    let method = req.method().clone();
    let path = req.path().to_owned();

    if method == Method::GET {
        if let Some(name) = path.strip_prefix("/download/") {
            return download_static_file(UPLOAD_DIR, name, name).await.into_response();
        }
    }

    match (&method, path.as_str()) {
        (&Method::POST, "/articles") => create_article(&tools, req).await,
        (&Method::POST, "/upload") => upload(&tools, req).await,
        _ => Response::builder().status(StatusCode::NOT_FOUND).text("404 page not found"),
    }
}

// POST /articles → 201 {"title":…,"slug":…}
//
// Decode failures come back as 400 with a message naming the bad field.
async fn create_article(tools: &Tools, mut req: Request) -> Response {
    let input: NewArticle = match tools.read_json(&mut req).await {
        Ok(v) => v,
        Err(e) => return tools.error_json(&e, Some(e.status())).into_response(),
    };

    let slug = match slugify(&input.title) {
        Ok(s) => s,
        Err(e) => return tools.error_json(&e, None).into_response(),
    };

    tools
        .write_json(StatusCode::CREATED, &Article { title: input.title, slug }, None)
        .into_response()
}

// POST /upload (multipart) → 201 [{"originalFileName":…,"newFileName":…,"fileSize":…}]
async fn upload(tools: &Tools, mut req: Request) -> Response {
    match tools.upload_files(&mut req, UPLOAD_DIR, true).await {
        Ok(files) => tools.write_json(StatusCode::CREATED, &files, None).into_response(),
        Err(e) => e.error.into_response(),
    }
}
