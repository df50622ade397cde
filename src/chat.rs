//! RAG chat assembly.
//!
//! Persists the turn, retrieves context chunks by vector search, composes
//! the prompt and hands it to the model caller. Retrieval failures degrade
//! to an uncontexted prompt; a failed model call surfaces to the caller.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::config::ConfigService;
use crate::core::errors::ApiError;
use crate::embeddings::{EmbeddingService, DEFAULT_EMBED_DIM};
use crate::llm::ModelCaller;
use crate::search::{resolve_top_k, search, SearchHit};
use crate::store::{SqliteStore, StoredMessage};

const MAX_CONTEXT_CHUNKS: usize = 6;
const HISTORY_TURNS: i64 = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub content: String,
    pub model: Option<String>,
    pub conversation_id: Option<String>,
    pub collection_id: Option<String>,
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub conversation_id: String,
    pub sources: Vec<SearchHit>,
}

#[derive(Clone)]
pub struct ChatService {
    store: SqliteStore,
    embedder: Arc<EmbeddingService>,
    llm: ModelCaller,
    config: ConfigService,
}

impl ChatService {
    pub fn new(
        store: SqliteStore,
        embedder: Arc<EmbeddingService>,
        llm: ModelCaller,
        config: ConfigService,
    ) -> Self {
        Self {
            store,
            embedder,
            llm,
            config,
        }
    }

    pub async fn chat(&self, request: ChatRequest) -> Result<ChatReply, ApiError> {
        let content = request.content.trim();
        if content.is_empty() {
            return Err(ApiError::BadRequest("no content".to_string()));
        }

        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.config.default_model());
        let conversation_id = request
            .conversation_id
            .clone()
            .unwrap_or_else(|| format!("conv_{}", Uuid::new_v4()));

        // History is loaded before the new turn is stored so the prompt
        // does not repeat the current message.
        let history = self
            .store
            .recent_messages(&conversation_id, HISTORY_TURNS)
            .await?;
        self.store
            .add_message(&conversation_id, "user", content)
            .await?;

        let (context, sources) = self.retrieve_context(&request, content, &model).await;
        let prompt = compose_prompt(&history, &context, content);

        let response = self.llm.call(&prompt, &model).await?;
        self.store
            .add_message(&conversation_id, "assistant", &response)
            .await?;

        Ok(ChatReply {
            response,
            conversation_id,
            sources,
        })
    }

    async fn retrieve_context(
        &self,
        request: &ChatRequest,
        content: &str,
        model: &str,
    ) -> (String, Vec<SearchHit>) {
        let query = self.embedder.embed(content, DEFAULT_EMBED_DIM, model).await;
        let top_k = resolve_top_k(request.top_k);

        let hits = match search(
            &self.store,
            &query,
            top_k,
            request.collection_id.as_deref(),
        )
        .await
        {
            Ok(hits) => hits,
            Err(err) => {
                tracing::warn!(error = %err, "retrieval failed, continuing without context");
                return (String::new(), Vec::new());
            }
        };

        let mut pieces = Vec::new();
        for hit in hits.iter().take(MAX_CONTEXT_CHUNKS) {
            match self.store.get_chunk(&hit.chunk_id).await {
                Ok(Some(chunk)) => pieces.push(chunk.text),
                Ok(None) => {
                    tracing::warn!(chunk_id = %hit.chunk_id, "hit references missing chunk");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to load chunk text");
                }
            }
        }

        (pieces.join("\n\n"), hits)
    }
}

fn compose_prompt(history: &[StoredMessage], context: &str, content: &str) -> String {
    let mut prompt = String::new();

    for message in history {
        let speaker = if message.role == "user" {
            "User"
        } else {
            "Assistant"
        };
        prompt.push_str(&format!("{}: {}\n", speaker, message.content));
    }
    if !context.is_empty() {
        prompt.push_str(&format!("Context:\n{}\n", context));
    }
    prompt.push_str(&format!("User: {}", content));

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::test_store;

    fn message(role: &str, content: &str) -> StoredMessage {
        StoredMessage {
            message_id: "m".to_string(),
            role: role.to_string(),
            content: content.to_string(),
            created_at: String::new(),
        }
    }

    #[test]
    fn prompt_orders_history_context_and_question() {
        let history = vec![message("user", "hi"), message("assistant", "hello")];
        let prompt = compose_prompt(&history, "doc snippet", "what now?");
        assert_eq!(
            prompt,
            "User: hi\nAssistant: hello\nContext:\ndoc snippet\nUser: what now?"
        );
    }

    #[test]
    fn prompt_without_history_or_context_is_just_the_question() {
        assert_eq!(compose_prompt(&[], "", "solo question"), "User: solo question");
    }

    fn offline_chat_service(store: SqliteStore, dir: &std::path::Path) -> ChatService {
        let endpoints = crate::core::config::RuntimeEndpoints {
            embed_url: "http://127.0.0.1:1/api/embeddings".to_string(),
            model_url: "http://127.0.0.1:1/run".to_string(),
            model_cmd: "vyre-no-such-binary".to_string(),
        };
        ChatService::new(
            store,
            Arc::new(EmbeddingService::new(
                endpoints.embed_url.clone(),
                endpoints.model_cmd.clone(),
            )),
            ModelCaller::new(&endpoints),
            ConfigService::new(&dir.join("config.json")),
        )
    }

    #[tokio::test]
    async fn empty_content_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let service = offline_chat_service(test_store().await, dir.path());

        let err = service
            .chat(ChatRequest {
                content: "   ".to_string(),
                model: None,
                conversation_id: None,
                collection_id: None,
                top_k: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn failed_model_call_still_persists_the_user_turn() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store().await;
        let service = offline_chat_service(store.clone(), dir.path());

        let err = service
            .chat(ChatRequest {
                content: "anyone there?".to_string(),
                model: None,
                conversation_id: Some("conv_t".to_string()),
                collection_id: None,
                top_k: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ModelCallFailed(_)));

        let messages = store.conversation_messages("conv_t").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }
}
