pub mod rules;

use log::{ info, warn };
use std::sync::Arc;

use crate::config::prompt::PromptConfig;
use crate::llm::chat::{ CompletionRequest, CompletionService };

pub const SERVICE_FAILURE_REPLY: &str = "I apologize, but I encountered an error. Please check your API key and try again. \
For now, I can provide basic responses about library hours, programming concepts, and study tips.";

/// Turns a query into exactly one reply. Holds no per-session state; the
/// caller passes the session's credential on every call.
#[derive(Clone)]
pub struct QueryResolver {
    service: Arc<dyn CompletionService>,
    prompts: Arc<PromptConfig>,
}

impl QueryResolver {
    pub fn new(service: Arc<dyn CompletionService>, prompts: Arc<PromptConfig>) -> Self {
        Self { service, prompts }
    }

    pub fn prompts(&self) -> &PromptConfig {
        &self.prompts
    }

    /// Never fails. Service errors degrade to [`SERVICE_FAILURE_REPLY`].
    pub async fn resolve(&self, query: &str, credential: Option<&str>) -> String {
        match credential {
            Some(key) => self.resolve_remote(query, key).await,
            None => rules::fallback_reply(query),
        }
    }

    async fn resolve_remote(&self, query: &str, credential: &str) -> String {
        let request = CompletionRequest {
            system: self.prompts.system_instruction.clone(),
            user: query.to_string(),
        };
        match self.service.complete(credential, &request).await {
            Ok(content) => {
                info!("Completion received ({} chars)", content.len());
                content
            }
            Err(e) => {
                warn!("Completion request failed: {}", e);
                SERVICE_FAILURE_REPLY.to_string()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::llm::chat::ClientError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records calls and answers with a fixed outcome.
    pub(crate) struct FakeService {
        pub reply: Option<String>,
        pub calls: Mutex<Vec<(String, CompletionRequest)>>,
    }

    impl FakeService {
        pub(crate) fn answering(reply: &str) -> Arc<Self> {
            Arc::new(Self { reply: Some(reply.to_string()), calls: Mutex::new(Vec::new()) })
        }

        pub(crate) fn failing() -> Arc<Self> {
            Arc::new(Self { reply: None, calls: Mutex::new(Vec::new()) })
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionService for FakeService {
        async fn complete(
            &self,
            credential: &str,
            request: &CompletionRequest
        ) -> Result<String, ClientError> {
            self.calls.lock().unwrap().push((credential.to_string(), request.clone()));
            self.reply.clone().ok_or(ClientError::EmptyCompletion)
        }

        fn get_model(&self) -> String {
            "fake".to_string()
        }

        fn get_base_url(&self) -> String {
            "http://fake".to_string()
        }
    }

    pub(crate) fn resolver_with(service: Arc<FakeService>) -> QueryResolver {
        QueryResolver::new(service, Arc::new(PromptConfig::default()))
    }

    #[tokio::test]
    async fn library_hours_without_credential() {
        let service = FakeService::failing();
        let reply = resolver_with(service.clone()).resolve("What are the library hours?", None).await;
        assert!(reply.contains("Monday-Friday: 7:00 AM - 11:00 PM"));
        assert!(reply.contains("Saturday: 9:00 AM - 9:00 PM"));
        assert!(reply.contains("Sunday: 10:00 AM - 10:00 PM"));
        assert_eq!(service.call_count(), 0);
    }

    #[tokio::test]
    async fn study_schedule_without_credential() {
        let reply = resolver_with(FakeService::failing())
            .resolve("Help me create a study schedule for finals", None).await;
        assert!(reply.contains("study schedule template"));
        assert!(reply.contains("Week before finals"));
    }

    #[tokio::test]
    async fn recursion_without_credential() {
        let reply = resolver_with(FakeService::failing())
            .resolve("Explain the concept of recursion in programming", None).await;
        let lower = reply.to_lowercase();
        assert!(lower.contains("base case"));
        assert!(lower.contains("recursive case"));
    }

    #[tokio::test]
    async fn unmatched_query_is_echoed() {
        let reply = resolver_with(FakeService::failing()).resolve("What is the weather today?", None).await;
        assert!(reply.contains("\"What is the weather today?\""));
        assert!(reply.contains("Could you be more specific"));
    }

    #[tokio::test]
    async fn fallback_is_deterministic_and_non_empty() {
        let resolver = resolver_with(FakeService::failing());
        for query in ["library", "study schedule", "recursion", "anything else", "x"] {
            let first = resolver.resolve(query, None).await;
            let second = resolver.resolve(query, None).await;
            assert!(!first.is_empty());
            assert_eq!(first, second);
        }
    }

    #[tokio::test]
    async fn credential_delegates_to_service() {
        let service = FakeService::answering("The library closes at 11 PM.");
        let resolver = resolver_with(service.clone());

        let reply = resolver.resolve("When does the library close?", Some("pplx-abc")).await;
        assert_eq!(reply, "The library closes at 11 PM.");

        let calls = service.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "pplx-abc");
        assert_eq!(calls[0].1.user, "When does the library close?");
        assert!(calls[0].1.system.contains("helpful assistant"));
    }

    #[tokio::test]
    async fn service_failure_becomes_apology() {
        let service = FakeService::failing();
        let reply = resolver_with(service.clone()).resolve("What are the library hours?", Some("pplx")).await;
        assert_eq!(reply, SERVICE_FAILURE_REPLY);
        assert_eq!(service.call_count(), 1);
    }
}
