use std::error::Error;
use std::time::Duration;

use fanout_core::observer::TracingObserver;
use fanout_core::{BoundedMapper, MapperConfig};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub(crate) enum FetchError {
    #[error("Request Error - {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Status Error - {url} returned {status}")]
    Status { url: String, status: StatusCode },
}

/// A JSON document fetched from `url`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Document {
    pub url: String,
    pub body: Value,
}

impl Document {
    /// One line describing the document: its `name` field when it has one (with the names of its
    /// `types` for Pokémon-style documents), otherwise its shape.
    pub(crate) fn describe(&self) -> String {
        let Some(name) = self.body.get("name").and_then(Value::as_str) else {
            return match &self.body {
                Value::Object(map) => format!("object with {} keys", map.len()),
                Value::Array(items) => format!("array of {} items", items.len()),
                other => other.to_string(),
            };
        };

        let types: Vec<&str> = self
            .body
            .get("types")
            .and_then(Value::as_array)
            .map(|types| {
                types
                    .iter()
                    .filter_map(|t| t.pointer("/type/name").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();

        if types.is_empty() {
            name.to_string()
        } else {
            format!("{name} ({})", types.join(", "))
        }
    }
}

async fn fetch_json(client: Client, url: String) -> Result<Document, FetchError> {
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|source| FetchError::Request {
            url: url.clone(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status { url, status });
    }

    let body = response
        .json::<Value>()
        .await
        .map_err(|source| FetchError::Request {
            url: url.clone(),
            source,
        })?;
    Ok(Document { url, body })
}

/// Fetches every url, at most `cfg.concurrency` at a time, and logs a line per document.
pub(crate) async fn run(
    cfg: &MapperConfig,
    urls: Vec<String>,
) -> Result<Vec<Document>, Box<dyn Error>> {
    let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
    let mapper = BoundedMapper::new(cfg)?.with_observer(TracingObserver::named("fetch"));

    let documents = mapper
        .map(urls, move |url: String| fetch_json(client.clone(), url))
        .await?;

    for document in &documents {
        info!(url = %document.url, document = %document.describe(), "Fetched document");
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn document(body: Value) -> Document {
        Document {
            url: "http://localhost/doc".to_string(),
            body,
        }
    }

    #[test]
    fn test_describe_named_document() {
        let doc = document(json!({
            "name": "bulbasaur",
            "types": [
                {"slot": 1, "type": {"name": "grass"}},
                {"slot": 2, "type": {"name": "poison"}}
            ]
        }));
        assert_eq!(doc.describe(), "bulbasaur (grass, poison)");

        let doc = document(json!({"name": "ditto", "weight": 40}));
        assert_eq!(doc.describe(), "ditto");
    }

    #[test]
    fn test_describe_anonymous_document() {
        assert_eq!(
            document(json!({"a": 1, "b": 2})).describe(),
            "object with 2 keys"
        );
        assert_eq!(document(json!([1, 2, 3])).describe(), "array of 3 items");
        assert_eq!(document(json!(42)).describe(), "42");
    }

    #[tokio::test]
    async fn test_unreachable_url_fails_the_call() {
        let cfg = MapperConfig::default();
        // grab a free port and release it so that nothing listens there
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let err = run(&cfg, vec![format!("http://{addr}/")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Request Error"));
    }
}
