//! Open Library search client
//!
//! Issues a single GET per search and normalizes the loosely-typed upstream
//! `docs` entries into [`BookRecord`]s.

use async_trait::async_trait;
use reqwest::{Client, Url};
use rust_mcp_sdk::macros;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use tracing::{debug, warn};

use crate::errors::UpstreamError;

pub const UNKNOWN_AUTHOR: &str = "Unknown";

#[derive(Debug, Clone, Serialize, PartialEq, Eq, macros::JsonSchema)]
pub struct BookRecord {
    pub title: String,
    /// Author names joined with ", ", or "Unknown" when the entry lists none.
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_publish_year: Option<Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edition_count: Option<Number>,
}

/// One upstream `docs` entry. Every field is read loosely so a malformed value only
/// degrades its own field.
#[derive(Debug, Default, Deserialize)]
struct RawDoc {
    #[serde(default)]
    title: Option<Value>,
    #[serde(default)]
    author_name: Option<Value>,
    #[serde(default)]
    first_publish_year: Option<Value>,
    #[serde(default)]
    edition_count: Option<Value>,
}

#[async_trait]
pub trait BookSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<BookRecord>, UpstreamError>;
}

#[derive(Debug, Clone)]
pub struct OpenLibraryClient {
    http: Client,
    base_url: Option<Url>,
}

impl OpenLibraryClient {
    pub fn new(base_url: Option<Url>) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self { http, base_url })
    }
}

#[async_trait]
impl BookSearch for OpenLibraryClient {
    async fn search(&self, query: &str) -> Result<Vec<BookRecord>, UpstreamError> {
        let base_url = self.base_url.as_ref().ok_or_else(|| {
            UpstreamError::Unavailable("OPENLIBRARY_URL is not configured".to_string())
        })?;
        let url = search_url(base_url, query);
        debug!(url = %url, "querying book search upstream");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| UpstreamError::Unavailable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "book search upstream returned non-success status");
        }

        let body: Value = response.json().await.map_err(|err| {
            if err.is_decode() {
                UpstreamError::Format(err.to_string())
            } else {
                UpstreamError::Unavailable(err.to_string())
            }
        })?;

        map_search_response(&body)
    }
}

/// Appends `q=<query>` to `base`, keeping any query pairs already present.
pub fn search_url(base: &Url, query: &str) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut().append_pair("q", query);
    url
}

pub fn map_search_response(body: &Value) -> Result<Vec<BookRecord>, UpstreamError> {
    let docs = match body.get("docs") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(docs)) => docs,
        Some(other) => {
            return Err(UpstreamError::Format(format!(
                "unexpected `docs` shape: expected an array, got {}",
                json_kind(other)
            )))
        }
    };

    Ok(docs
        .iter()
        .map(|doc| map_doc(RawDoc::deserialize(doc).unwrap_or_default()))
        .collect())
}

fn map_doc(doc: RawDoc) -> BookRecord {
    BookRecord {
        title: match doc.title {
            None => String::new(),
            Some(title) => text_of(&title),
        },
        author: match doc.author_name {
            Some(Value::Array(names)) => names
                .iter()
                .map(text_of)
                .collect::<Vec<_>>()
                .join(", "),
            Some(Value::String(name)) if !name.is_empty() => name,
            _ => UNKNOWN_AUTHOR.to_string(),
        },
        first_publish_year: number_of(doc.first_publish_year),
        edition_count: number_of(doc.edition_count),
    }
}

/// Strings as-is, `null` as empty, anything else as its JSON text.
fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn number_of(value: Option<Value>) -> Option<Number> {
    match value {
        Some(Value::Number(number)) => Some(number),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
