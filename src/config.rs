//! Toolkit configuration.
//!
//! [`Tools`] is resolved once, defaults included, and never written to
//! afterwards, so one value can be cloned into every handler and used from
//! concurrent requests.
//!
//! ```rust
//! use tsu_toolkit::Tools;
//!
//! let tools = Tools::builder()
//!     .max_file_size(5 * 1024 * 1024)
//!     .allowed_file_types(["image/png", "image/jpeg"])
//!     .max_json_size(64 * 1024)
//!     .build();
//!
//! assert_eq!(tools.max_json_size(), 64 * 1024);
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::Error;
use crate::json::ErrorTemplate;

/// Upload size bound used when none is configured: 1 GiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// JSON body bound used when none is configured: 1 MiB.
pub const DEFAULT_MAX_JSON_SIZE: usize = 1024 * 1024;

/// Resolved toolkit configuration and the entry point for the JSON codec and
/// the upload pipeline.
#[derive(Clone)]
pub struct Tools {
    max_file_size: u64,
    allowed_file_types: Vec<String>,
    max_json_size: usize,
    allow_unknown_fields: bool,
    error_template: Option<Arc<dyn ErrorTemplate>>,
}

impl Tools {
    /// All defaults: 1 GiB uploads of any type, 1 MiB strict JSON bodies.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ToolsBuilder {
        ToolsBuilder { config: ToolsConfig::default(), error_template: None }
    }

    /// Builds from a deserialized [`ToolsConfig`]. Zero limits fall back to
    /// the defaults.
    pub fn from_config(config: ToolsConfig) -> Self {
        ToolsBuilder { config, error_template: None }.build()
    }

    pub fn max_file_size(&self) -> u64 { self.max_file_size }
    pub fn allowed_file_types(&self) -> &[String] { &self.allowed_file_types }
    pub fn max_json_size(&self) -> usize { self.max_json_size }
    pub fn allow_unknown_fields(&self) -> bool { self.allow_unknown_fields }

    pub fn error_template(&self) -> Option<&dyn ErrorTemplate> {
        self.error_template.as_deref()
    }
}

impl Default for Tools {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for Tools {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tools")
            .field("max_file_size", &self.max_file_size)
            .field("allowed_file_types", &self.allowed_file_types)
            .field("max_json_size", &self.max_json_size)
            .field("allow_unknown_fields", &self.allow_unknown_fields)
            .field("error_template", &self.error_template.is_some())
            .finish()
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Fluent builder for [`Tools`]. Obtain via [`Tools::builder()`].
pub struct ToolsBuilder {
    config: ToolsConfig,
    error_template: Option<Arc<dyn ErrorTemplate>>,
}

impl ToolsBuilder {
    /// Per-file upload bound in bytes. `0` means the 1 GiB default.
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    /// Sniffed content types accepted by uploads, compared
    /// case-insensitively. Empty accepts everything.
    pub fn allowed_file_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_file_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// JSON body bound in bytes. `0` means the 1 MiB default.
    pub fn max_json_size(mut self, bytes: usize) -> Self {
        self.config.max_json_size = bytes;
        self
    }

    pub fn allow_unknown_fields(mut self, allow: bool) -> Self {
        self.config.allow_unknown_fields = allow;
        self
    }

    pub fn error_template(mut self, template: impl ErrorTemplate + 'static) -> Self {
        self.error_template = Some(Arc::new(template));
        self
    }

    pub fn build(self) -> Tools {
        let ToolsConfig { max_file_size, allowed_file_types, max_json_size, allow_unknown_fields } = self.config;

        Tools {
            max_file_size: if max_file_size == 0 { DEFAULT_MAX_FILE_SIZE } else { max_file_size },
            allowed_file_types,
            max_json_size: if max_json_size == 0 { DEFAULT_MAX_JSON_SIZE } else { max_json_size },
            allow_unknown_fields,
            error_template: self.error_template,
        }
    }
}

// ── File configuration ────────────────────────────────────────────────────────

/// The serializable part of the configuration, e.g. a `[uploads]` table in
/// an application's TOML file:
///
/// ```toml
/// max_file_size = 10485760
/// allowed_file_types = ["image/png", "image/gif"]
/// max_json_size = 65536
/// allow_unknown_fields = false
/// ```
///
/// Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    pub max_file_size: u64,
    pub allowed_file_types: Vec<String>,
    pub max_json_size: usize,
    pub allow_unknown_fields: bool,
}

impl ToolsConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }
}
