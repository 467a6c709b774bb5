//! Long-term similarity index: trait plus HTTP and in-process implementations.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{AiError, Result};
use crate::http_client::build_http_client;

const VECTOR_BACKEND: &str = "vector";

/// A similarity search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongTermHit {
    pub key: String,
    pub text: String,
    /// Higher is more similar.
    pub score: f32,
}

#[async_trait]
pub trait LongTermIndex: Send + Sync {
    /// Insert or replace `key`.
    async fn upsert(&self, key: &str, text: &str, metadata: Value) -> Result<()>;

    /// Up to `top_k` entries most similar to `text`, best first.
    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<LongTermHit>>;
}

/// Process-local index scored by token overlap.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    entries: RwLock<BTreeMap<String, IndexedText>>,
}

#[derive(Debug, Clone)]
struct IndexedText {
    text: String,
    metadata: Value,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn metadata(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).map(|e| e.metadata.clone())
    }
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Jaccard similarity of the two token sets.
fn overlap_score(query: &HashSet<String>, doc: &HashSet<String>) -> f32 {
    if query.is_empty() || doc.is_empty() {
        return 0.0;
    }
    let shared = query.intersection(doc).count();
    let union = query.union(doc).count();
    shared as f32 / union as f32
}

#[async_trait]
impl LongTermIndex for InMemoryIndex {
    async fn upsert(&self, key: &str, text: &str, metadata: Value) -> Result<()> {
        self.entries.write().insert(
            key.to_string(),
            IndexedText {
                text: text.to_string(),
                metadata,
            },
        );
        Ok(())
    }

    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<LongTermHit>> {
        let query = tokens(text);
        let mut hits: Vec<LongTermHit> = self
            .entries
            .read()
            .iter()
            .filter_map(|(key, entry)| {
                let score = overlap_score(&query, &tokens(&entry.text));
                (score > 0.0).then(|| LongTermHit {
                    key: key.clone(),
                    text: entry.text.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.key.cmp(&b.key)));
        hits.truncate(top_k);
        Ok(hits)
    }
}

/// REST client for an external similarity service with one collection per
/// project.
pub struct HttpVectorIndex {
    client: Client,
    base_url: String,
    collection: String,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Vec<Vec<Option<String>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<f32>>>,
}

impl HttpVectorIndex {
    pub fn new(base_url: impl Into<String>, project_id: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: build_http_client(Duration::from_secs(timeout_secs))?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: Self::collection_name(project_id),
            timeout_secs,
        })
    }

    pub fn collection_name(project_id: &str) -> String {
        format!("tierflow-{project_id}")
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/collections/{}/{}",
            self.base_url, self.collection, action
        )
    }

    async fn post(&self, action: &str, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.endpoint(action))
            .json(body)
            .send()
            .await
            .map_err(|e| AiError::from_reqwest(VECTOR_BACKEND, self.timeout_secs, e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AiError::Http {
                backend: VECTOR_BACKEND.to_string(),
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl LongTermIndex for HttpVectorIndex {
    async fn upsert(&self, key: &str, text: &str, metadata: Value) -> Result<()> {
        let body = json!({
            "ids": [key],
            "documents": [text],
            "metadatas": [metadata],
        });
        self.post("upsert", &body).await?;
        tracing::debug!(collection = %self.collection, key, "Upserted long-tier entry");
        Ok(())
    }

    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<LongTermHit>> {
        let body = json!({
            "query_texts": [text],
            "n_results": top_k,
        });
        let response = self.post("query", &body).await?;
        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| AiError::from_reqwest(VECTOR_BACKEND, self.timeout_secs, e))?;

        let ids = parsed.ids.into_iter().next().unwrap_or_default();
        let documents = parsed.documents.into_iter().next().unwrap_or_default();
        let distances = parsed
            .distances
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();

        Ok(ids
            .into_iter()
            .enumerate()
            .map(|(i, key)| LongTermHit {
                key,
                text: documents.get(i).cloned().flatten().unwrap_or_default(),
                // Distance 0 is an exact match.
                score: distances.get(i).map_or(0.0, |d| 1.0 / (1.0 + d.max(0.0))),
            })
            .take(top_k)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_in_memory_ranks_by_overlap() {
        let index = InMemoryIndex::new();
        index
            .upsert("p::a::1", "queue architecture with retries", json!({}))
            .await
            .unwrap();
        index
            .upsert("p::a::2", "lunch menu for friday", json!({}))
            .await
            .unwrap();
        index
            .upsert("p::a::3", "queue design", json!({"agent": "a"}))
            .await
            .unwrap();

        let hits = index.query("queue architecture", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].key, "p::a::1");
        assert_eq!(hits[1].key, "p::a::3");
        assert_eq!(index.metadata("p::a::3"), Some(json!({"agent": "a"})));
    }

    #[tokio::test]
    async fn test_in_memory_upsert_replaces_and_truncates() {
        let index = InMemoryIndex::new();
        index.upsert("k", "alpha", json!({})).await.unwrap();
        index.upsert("k", "beta", json!({})).await.unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.query("alpha", 3).await.unwrap().is_empty());
        assert_eq!(index.query("beta", 0).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_http_index_upsert_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/tierflow-demo/upsert"))
            .and(body_json(json!({
                "ids": ["demo::writer::1"],
                "documents": ["text"],
                "metadatas": [{"agent": "writer"}],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/collections/tierflow-demo/query"))
            .and(body_json(json!({"query_texts": ["text"], "n_results": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ids": [["demo::writer::1"]],
                "documents": [["text"]],
                "distances": [[0.0]],
            })))
            .mount(&server)
            .await;

        let index = HttpVectorIndex::new(server.uri(), "demo", 5).unwrap();
        assert_eq!(index.collection(), "tierflow-demo");
        index
            .upsert("demo::writer::1", "text", json!({"agent": "writer"}))
            .await
            .unwrap();
        let hits = index.query("text", 2).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "text");
        assert!((hits[0].score - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_http_index_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;

        let index = HttpVectorIndex::new(server.uri(), "demo", 5).unwrap();
        let err = index.upsert("k", "t", json!({})).await.unwrap_err();
        assert!(matches!(err, AiError::Http { status: 500, .. }));
    }
}
