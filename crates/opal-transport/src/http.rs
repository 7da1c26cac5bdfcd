//! Stateless HTTP fallback client.
//!
//! Used when the socket is unavailable and for non-real-time operations
//! (bulk ingestion, index maintenance). Paths mirror the backend's v2 API.

use opal_core::error::{OpalError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A prompt record submitted through bulk ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRecord {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Request body for `POST /api/v2/prompts/bulk-ingest/`.
#[derive(Debug, Clone, Serialize)]
pub struct BulkIngestRequest<'a> {
    pub prompts: &'a [PromptRecord],
    pub batch_id: String,
    pub generate_embeddings: bool,
    pub update_search_index: bool,
}

/// One hit returned by the search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub score: f32,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Clone, Deserialize)]
struct SuggestionsResponse {
    #[serde(default)]
    suggestions: Vec<String>,
}

/// Client for the `/api/v2` fallback endpoints.
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    /// Creates a client for the given base URL (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Submits one batch of prompts for ingestion.
    pub async fn bulk_ingest(
        &self,
        prompts: &[PromptRecord],
        batch_id: impl Into<String>,
    ) -> Result<()> {
        let path = "/api/v2/prompts/bulk-ingest/";
        let body = BulkIngestRequest {
            prompts,
            batch_id: batch_id.into(),
            generate_embeddings: true,
            update_search_index: true,
        };
        self.client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .map_err(|e| http_error(path, e))?
            .error_for_status()
            .map_err(|e| http_error(path, e))?;
        Ok(())
    }

    /// Vector-backed prompt search.
    pub async fn search(&self, query: &str, max_results: u32) -> Result<Vec<SearchHit>> {
        let path = "/api/v2/search/prompts";
        let response = self
            .client
            .get(self.url(path))
            .query(&[
                ("q", query),
                ("use_vector", "true"),
                ("max_results", &max_results.to_string()),
            ])
            .send()
            .await
            .map_err(|e| http_error(path, e))?
            .error_for_status()
            .map_err(|e| http_error(path, e))?
            .json::<SearchResponse>()
            .await
            .map_err(|e| http_error(path, e))?;
        Ok(response.results)
    }

    /// Intent analysis for a raw user input.
    pub async fn analyze_intent(&self, user_input: &str) -> Result<Value> {
        let path = "/api/v2/ai/analyze-intent/";
        let response = self
            .client
            .post(self.url(path))
            .json(&serde_json::json!({ "user_input": user_input }))
            .send()
            .await
            .map_err(|e| http_error(path, e))?
            .error_for_status()
            .map_err(|e| http_error(path, e))?
            .json::<Value>()
            .await
            .map_err(|e| http_error(path, e))?;
        Ok(response)
    }

    /// Completion suggestions for a partial input.
    pub async fn suggestions(&self, partial: &str, limit: u32) -> Result<Vec<String>> {
        let path = "/api/v2/ai/suggestions";
        let response = self
            .client
            .get(self.url(path))
            .query(&[("partial", partial), ("limit", &limit.to_string())])
            .send()
            .await
            .map_err(|e| http_error(path, e))?
            .error_for_status()
            .map_err(|e| http_error(path, e))?
            .json::<SuggestionsResponse>()
            .await
            .map_err(|e| http_error(path, e))?;
        Ok(response.suggestions)
    }

    /// Triggers a search-index optimization pass.
    pub async fn optimize_index(&self) -> Result<()> {
        let path = "/api/v2/admin/optimize-search-index/";
        self.client
            .post(self.url(path))
            .send()
            .await
            .map_err(|e| http_error(path, e))?
            .error_for_status()
            .map_err(|e| http_error(path, e))?;
        Ok(())
    }
}

fn http_error(path: &str, err: reqwest::Error) -> OpalError {
    OpalError::remote(path, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_ingest_request_shape() {
        let prompts = vec![PromptRecord {
            id: "p1".to_string(),
            title: "t".to_string(),
            content: "c".to_string(),
            tags: vec!["tag".to_string()],
        }];
        let body = BulkIngestRequest {
            prompts: &prompts,
            batch_id: "batch-1".to_string(),
            generate_embeddings: true,
            update_search_index: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["batch_id"], "batch-1");
        assert_eq!(json["prompts"][0]["id"], "p1");
        assert_eq!(json["generate_embeddings"], true);
    }

    #[test]
    fn test_search_response_tolerates_missing_fields() {
        let response: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(response.results.is_empty());

        let response: SearchResponse = serde_json::from_str(
            r#"{"results": [{"id": "1", "title": "a", "content": "b"}]}"#,
        )
        .unwrap();
        assert_eq!(response.results[0].score, 0.0);
    }
}
