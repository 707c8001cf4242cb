use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use super::Embedder;
use crate::{
    config::API_KEY_ENV_VAR,
    error::{Error, Result},
};

const PROVIDER: &str = "google";

pub const DEFAULT_BASE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta";

/// Output dimension of `models/text-embedding-004`.
pub const DEFAULT_DIMENSION: usize = 768;

/// Largest number of texts the batch endpoint accepts per request.
const MAX_BATCH: usize = 100;

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: TaskType,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

/// Embeddings from the Google Generative Language API.
///
/// The API key is read once at construction; a missing key only fails when
/// an embedding is actually requested, so indexes can still be opened and
/// inspected without credentials.
pub struct RemoteEmbedder {
    model: String,
    api_key: Option<String>,
    base_url: String,
    dimension: usize,
    output_dimensionality: Option<usize>,
    client: reqwest::blocking::Client,
}

impl RemoteEmbedder {
    /// Create an embedder for `model`, taking the key from `GOOGLE_API_KEY`.
    ///
    /// Model names without the `models/` prefix get one.
    pub fn from_env(model: &str) -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV_VAR)
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::new(model, api_key)
    }

    pub fn new(model: &str, api_key: Option<String>) -> Result<Self> {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        let client = reqwest::blocking::Client::builder().build()?;
        Ok(Self {
            model,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            dimension: DEFAULT_DIMENSION,
            output_dimensionality: None,
            client,
        })
    }

    /// Request vectors of `dimension` values instead of the model default.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self.output_dimensionality = Some(dimension);
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| Error::Embedding {
            provider: PROVIDER,
            message: format!("{API_KEY_ENV_VAR} is not set"),
        })
    }

    fn request<'a>(
        &'a self,
        text: &'a str,
        task_type: TaskType,
    ) -> EmbedContentRequest<'a> {
        EmbedContentRequest {
            model: &self.model,
            content: Content {
                parts: [Part { text }],
            },
            task_type,
            output_dimensionality: self.output_dimensionality,
        }
    }

    fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<R> {
        let key = self.api_key()?;
        let url = format!("{}/{}:{method}", self.base_url, self.model);
        let response = self
            .client
            .post(url)
            .query(&[("key", key)])
            .json(body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::Embedding {
                provider: PROVIDER,
                message: format!("{method} returned {status}: {body}"),
            });
        }
        Ok(response.json()?)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|t| self.request(t, TaskType::RetrievalDocument))
                .collect(),
        };
        let response: BatchEmbedResponse =
            self.post("batchEmbedContents", &body)?;

        if response.embeddings.len() != texts.len() {
            return Err(Error::Embedding {
                provider: PROVIDER,
                message: format!(
                    "requested {} embeddings, received {}",
                    texts.len(),
                    response.embeddings.len()
                ),
            });
        }
        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }
}

impl std::fmt::Debug for RemoteEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteEmbedder")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

impl Embedder for RemoteEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> Result<usize> {
        Ok(self.dimension)
    }

    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH) {
            debug!(model = %self.model, batch = batch.len(), "embedding batch");
            embeddings.extend(self.embed_batch(batch)?);
        }
        Ok(embeddings)
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let body = self.request(text, TaskType::RetrievalQuery);
        let response: EmbedContentResponse =
            self.post("embedContent", &body)?;
        Ok(response.embedding.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_name_gets_prefix() {
        let embedder = RemoteEmbedder::new("text-embedding-004", None).unwrap();
        assert_eq!(embedder.model_id(), "models/text-embedding-004");
        assert_eq!(embedder.dimension().unwrap(), DEFAULT_DIMENSION);
    }

    #[test]
    fn missing_key_fails_at_first_call() {
        let embedder =
            RemoteEmbedder::new("models/text-embedding-004", None).unwrap();
        let err = embedder.embed_query("hello").unwrap_err();
        assert!(matches!(err, Error::Embedding { .. }), "{err}");
    }

    #[test]
    fn empty_document_list_makes_no_request() {
        let embedder =
            RemoteEmbedder::new("models/text-embedding-004", None).unwrap();
        assert!(embedder.embed_documents(&[]).unwrap().is_empty());
    }

    #[test]
    fn request_body_uses_api_field_names() {
        let embedder = RemoteEmbedder::new("models/text-embedding-004", None)
            .unwrap()
            .with_dimension(256);
        let body = serde_json::to_value(
            embedder.request("hi", TaskType::RetrievalDocument),
        )
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "models/text-embedding-004",
                "content": { "parts": [{ "text": "hi" }] },
                "taskType": "RETRIEVAL_DOCUMENT",
                "outputDimensionality": 256,
            })
        );
    }
}
