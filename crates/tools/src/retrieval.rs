use ea_domain::trace::TraceEvent;
use ea_domain::{Error, EvidenceRecord, Result};
use serde::Deserialize;
use serde_json::json;

/// HTTP client for the (opaque) knowledge-base retrieval RPC and the
/// (opaque) medical-department classifier RPC it falls back to when the
/// caller doesn't name explicit dataset IDs.
pub struct RetrievalClient {
    http: reqwest::Client,
    retrieval_base_url: String,
    classifier_base_url: String,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    #[serde(default)]
    dataset_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RetrievalResponseItem {
    id: IdValue,
    title: String,
    #[serde(alias = "content")]
    full_content: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Int(i64),
    Str(String),
}

impl IdValue {
    fn into_string(self) -> String {
        match self {
            IdValue::Int(n) => n.to_string(),
            IdValue::Str(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RetrievalResponse {
    #[serde(default)]
    results: Vec<RetrievalResponseItem>,
}

impl RetrievalClient {
    pub fn new(retrieval_base_url: impl Into<String>, classifier_base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            retrieval_base_url: retrieval_base_url.into(),
            classifier_base_url: classifier_base_url.into(),
        }
    }

    /// Infer dataset IDs from the question via the department classifier.
    ///
    /// Open question resolved (see `DESIGN.md`): a classifier failure of
    /// any kind — connect error, non-2xx, malformed body — is recoverable.
    /// It falls back to an empty dataset scope (search everything on the
    /// retrieval side) rather than failing the tool call, but the fallback
    /// is always logged so it stays visible to operators.
    async fn classify_datasets(&self, question: &str, session_id: &str) -> Vec<String> {
        let url = format!("{}/classify", self.classifier_base_url.trim_end_matches('/'));
        let outcome = self
            .http
            .post(&url)
            .json(&json!({ "question": question }))
            .send()
            .await;

        match outcome {
            Ok(resp) if resp.status().is_success() => match resp.json::<ClassifyResponse>().await {
                Ok(c) => return c.dataset_ids,
                Err(e) => self.log_classifier_fallback(session_id, &format!("malformed response: {e}")),
            },
            Ok(resp) => {
                self.log_classifier_fallback(session_id, &format!("status {}", resp.status()))
            }
            Err(e) => self.log_classifier_fallback(session_id, &e.to_string()),
        }
        Vec::new()
    }

    fn log_classifier_fallback(&self, session_id: &str, reason: &str) {
        tracing::warn!(session_id, reason, "department classifier unavailable, falling back to all datasets");
        TraceEvent::ClassifierFallback {
            session_id: session_id.to_string(),
            reason: reason.to_string(),
        }
        .emit();
    }

    pub async fn retrieve(
        &self,
        query: &str,
        dataset_ids: Option<Vec<String>>,
        top_k: Option<u32>,
        session_id: &str,
    ) -> Result<Vec<EvidenceRecord>> {
        let dataset_ids = match dataset_ids {
            Some(ids) => ids,
            None => self.classify_datasets(query, session_id).await,
        };

        let url = format!("{}/retrieve", self.retrieval_base_url.trim_end_matches('/'));
        let body = json!({
            "query": query,
            "dataset_ids": dataset_ids,
            "top_k": top_k.unwrap_or(5),
        });

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::ToolExecutionError {
                tool: "knowledge_retrieval".into(),
                message: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(Error::ToolExecutionError {
                tool: "knowledge_retrieval".into(),
                message: format!("retrieval backend returned {}", resp.status()),
            });
        }

        let parsed: RetrievalResponse = resp.json().await.map_err(|e| Error::ToolExecutionError {
            tool: "knowledge_retrieval".into(),
            message: format!("malformed retrieval response: {e}"),
        })?;

        Ok(parsed
            .results
            .into_iter()
            .map(|r| EvidenceRecord::new(r.id.into_string(), r.title, r.full_content))
            .collect())
    }
}
