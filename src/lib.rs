//! # tsu-toolkit
//!
//! Server-side helpers for hyper services.
//!
//! - **Strict JSON codec.** Size-bounded body reads, a single JSON value per
//!   body, unknown keys rejected, and every failure mapped to a stable
//!   message ([`JsonError`]).
//! - **Multipart uploads.** Streamed to disk, sniffed before writing,
//!   optional random renaming ([`Tools::upload_files`]).
//! - **Server lifecycle.** HTTP/1 and HTTP/2, optional TLS, shutdown on a
//!   signal or a cancellation token, with a bounded drain ([`Server::run`]).
//! - Small utilities: [`slugify`], [`random_string`],
//!   [`download_static_file`], [`push_json_to_remote`].
//!
//! Logging goes through `tracing`; install a subscriber in the binary to see
//! it.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use http::StatusCode;
//! use serde::{Deserialize, Serialize};
//! use tokio_util::sync::CancellationToken;
//! use tsu_toolkit::{IntoResponse, Request, Server, Tools};
//!
//! #[derive(Deserialize)]
//! struct NewUser { name: String }
//!
//! #[derive(Serialize)]
//! struct User { id: u64, name: String }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tsu_toolkit::Error> {
//!     let tools = Tools::builder().max_json_size(64 * 1024).build();
//!
//!     let app = move |mut req: Request| {
//!         let tools = tools.clone();
//!         async move {
//!             let new: NewUser = match tools.read_json(&mut req).await {
//!                 Ok(v) => v,
//!                 Err(e) => return e.into_response(),
//!             };
//!             let user = User { id: 1, name: new.name };
//!             tools.write_json(StatusCode::CREATED, &user, None).into_response()
//!         }
//!     };
//!
//!     Server::bind("0.0.0.0:3000", app)
//!         .run(CancellationToken::new(), Duration::from_secs(30), None)
//!         .await
//! }
//! ```

pub mod body;
mod config;
mod error;
pub mod fs;
mod handler;
mod json;
mod remote;
mod request;
mod response;
mod server;
pub mod sniff;
mod strings;
pub mod tls;
mod upload;

pub use config::{DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_JSON_SIZE, Tools, ToolsBuilder, ToolsConfig};
pub use error::Error;
pub use fs::{create_dir_if_not_exists, download_static_file};
pub use handler::Handler;
pub use json::{ErrorTemplate, JsonError, JsonResponse, decode_strict};
pub use remote::push_json_to_remote;
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use server::Server;
pub use strings::{RANDOM_ALPHABET, random_string, slugify};
pub use upload::{UploadError, UploadedFile};

pub use tokio_util::sync::CancellationToken;
