//! Typed client for the SendGrid administrative API.
//!
//! # Overview
//! Covers API keys, transactional templates and template versions, plus a
//! wrapper that retries calls the provider rejected with 429 until a
//! caller-supplied deadline.
//!
//! # Design
//! - `SendGridClient` holds a config and a `Transport`, nothing more. Each
//!   operation is one round trip.
//! - Each operation also exists as `build_*` / `parse_*`, so a host can run
//!   the HTTP exchange itself.
//! - Status checks differ per resource on purpose; see `error::StatusGate`.
//! - Required fields are validated before any request is built.
//! - `UreqTransport` (feature `ureq`, default) is a ready-made blocking
//!   transport.

pub mod api_keys;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod retry;
pub mod template_versions;
pub mod templates;
#[cfg(feature = "ureq")]
pub mod transport;
pub mod types;

pub use client::SendGridClient;
pub use config::{ClientConfig, ConfigError};
pub use error::{ApiError, StatusGate, ValidationError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError};
pub use retry::{retry_on_rate_limit, CancellationToken, Deadline, RetryPolicy, MIN_DELAY};
#[cfg(feature = "ureq")]
pub use transport::UreqTransport;
pub use types::{ApiKey, Generation, Template, TemplateList, TemplateVersion, IMPLICIT_SCOPES};
