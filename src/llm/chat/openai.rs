use async_trait::async_trait;
use log::{ debug, info };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };

use super::{ ClientError, CompletionRequest, CompletionService };
use crate::llm::{ LlmConfig, LlmType, SamplingConfig };

const PERPLEXITY_URL: &str = "https://api.perplexity.ai/chat/completions";
const PERPLEXITY_MODEL: &str = "llama-3.1-sonar-small-128k-online";
const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const OPENAI_MODEL: &str = "gpt-4o-mini";

/// Chat-completions client. The bearer credential is supplied per call since
/// it belongs to the session, not to the process.
pub struct OpenAICompatibleClient {
    http: HttpClient,
    llm_type: LlmType,
    model: String,
    base_url: String,
    sampling: SamplingConfig,
}

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    frequency_penalty: f32,
    presence_penalty: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    return_images: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    return_related_questions: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    search_recency_filter: Option<&'a str>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAICompatibleClient {
    pub fn new(
        llm_type: LlmType,
        model: Option<String>,
        base_url: Option<String>,
        sampling: SamplingConfig
    ) -> Result<Self, ClientError> {
        let (default_url, default_model) = match llm_type {
            LlmType::Perplexity => (PERPLEXITY_URL, PERPLEXITY_MODEL),
            LlmType::OpenAI => (OPENAI_URL, OPENAI_MODEL),
        };
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = HttpClient::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            llm_type,
            model: model.unwrap_or_else(|| default_model.to_string()),
            base_url: base_url.unwrap_or_else(|| default_url.to_string()),
            sampling,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ClientError> {
        Self::new(
            config.llm_type,
            config.completion_model.clone(),
            config.base_url.clone(),
            config.sampling.clone()
        )
    }

    fn build_request<'a>(&'a self, request: &'a CompletionRequest) -> OpenAIChatRequest<'a> {
        let perplexity = self.llm_type == LlmType::Perplexity;
        OpenAIChatRequest {
            model: &self.model,
            messages: vec![
                OpenAIMessage { role: "system", content: &request.system },
                OpenAIMessage { role: "user", content: &request.user }
            ],
            temperature: self.sampling.temperature,
            top_p: self.sampling.top_p,
            max_tokens: self.sampling.max_tokens,
            frequency_penalty: self.sampling.frequency_penalty,
            presence_penalty: self.sampling.presence_penalty,
            return_images: perplexity.then_some(false),
            return_related_questions: perplexity.then_some(false),
            search_recency_filter: perplexity.then_some("month"),
        }
    }
}

#[async_trait]
impl CompletionService for OpenAICompatibleClient {
    async fn complete(
        &self,
        credential: &str,
        request: &CompletionRequest
    ) -> Result<String, ClientError> {
        let auth = HeaderValue::from_str(&format!("Bearer {}", credential)).map_err(|e|
            ClientError::InvalidCredential(e.to_string())
        )?;
        let req = self.build_request(request);

        info!("Sending completion request to {} (model {})", self.base_url, self.model);
        let resp = self.http.post(&self.base_url).header(AUTHORIZATION, auth).json(&req).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Status(status));
        }

        let body = resp.bytes().await?;
        debug!("Completion response: {} bytes", body.len());
        let parsed: OpenAIResponse = serde_json::from_slice(&body)?;

        parsed.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ClientError::EmptyCompletion)
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> String {
        self.base_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{ AsyncReadExt, AsyncWriteExt };
    use tokio::net::{ TcpListener, TcpStream };
    use tokio::task::JoinHandle;

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let lower = line.to_ascii_lowercase();
                        lower
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Serves one canned HTTP response and hands back the raw request it saw.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });
        (format!("http://{}/chat/completions", addr), handle)
    }

    fn client(llm_type: LlmType, url: String) -> OpenAICompatibleClient {
        OpenAICompatibleClient::new(llm_type, None, Some(url), SamplingConfig::default()).unwrap()
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: "You are a helpful campus assistant.".to_string(),
            user: "Where is the library?".to_string(),
        }
    }

    #[tokio::test]
    async fn returns_first_choice_verbatim() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"choices":[{"message":{"role":"assistant","content":"  North wing, floor 2.\n"}},{"message":{"content":"ignored"}}]}"#
        ).await;

        let reply = client(LlmType::Perplexity, url).complete("pplx-test", &request()).await.unwrap();
        assert_eq!(reply, "  North wing, floor 2.\n");

        let raw = server.await.unwrap().to_ascii_lowercase();
        assert!(raw.starts_with("post /chat/completions"));
        assert!(raw.contains("authorization: bearer pplx-test"));
        assert!(raw.contains(r#""model":"llama-3.1-sonar-small-128k-online""#));
        assert!(raw.contains(r#""temperature":0.2"#));
        assert!(raw.contains(r#""max_tokens":1000"#));
        assert!(raw.contains(r#""search_recency_filter":"month""#));
        assert!(raw.contains(r#""role":"system""#));
        assert!(raw.contains(r#""content":"where is the library?""#));
    }

    #[tokio::test]
    async fn openai_requests_omit_provider_extras() {
        let (url, server) = serve_once("200 OK", r#"{"choices":[{"message":{"content":"ok"}}]}"#).await;

        let reply = client(LlmType::OpenAI, url).complete("sk-test", &request()).await.unwrap();
        assert_eq!(reply, "ok");

        let raw = server.await.unwrap();
        assert!(raw.contains(r#""model":"gpt-4o-mini""#));
        assert!(!raw.contains("search_recency_filter"));
        assert!(!raw.contains("return_images"));
    }

    #[tokio::test]
    async fn non_success_status_is_error() {
        let (url, _server) = serve_once("401 Unauthorized", r#"{"error":"bad key"}"#).await;
        let err = client(LlmType::Perplexity, url).complete("wrong", &request()).await.unwrap_err();
        assert!(matches!(err, ClientError::Status(s) if s.as_u16() == 401));
    }

    #[tokio::test]
    async fn malformed_payload_is_decode_error() {
        let (url, _server) = serve_once("200 OK", r#"{"result":"no choices here"}"#).await;
        let err = client(LlmType::Perplexity, url).complete("pplx", &request()).await.unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }

    #[tokio::test]
    async fn empty_choices_is_empty_completion() {
        let (url, _server) = serve_once("200 OK", r#"{"choices":[]}"#).await;
        let err = client(LlmType::Perplexity, url).complete("pplx", &request()).await.unwrap_err();
        assert!(matches!(err, ClientError::EmptyCompletion));
    }

    #[tokio::test]
    async fn null_content_is_empty_completion() {
        let (url, _server) = serve_once("200 OK", r#"{"choices":[{"message":{"content":null}}]}"#).await;
        let err = client(LlmType::Perplexity, url).complete("pplx", &request()).await.unwrap_err();
        assert!(matches!(err, ClientError::EmptyCompletion));
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{}/chat/completions", addr);
        let err = client(LlmType::Perplexity, url).complete("pplx", &request()).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }

    #[tokio::test]
    async fn header_unsafe_credential_is_rejected_before_sending() {
        let c = client(LlmType::Perplexity, "http://127.0.0.1:9/unused".to_string());
        let err = c.complete("bad\nkey", &request()).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidCredential(_)));
    }

    #[test]
    fn defaults_follow_provider() {
        let c = OpenAICompatibleClient::new(LlmType::Perplexity, None, None, SamplingConfig::default()).unwrap();
        assert_eq!(c.get_base_url(), PERPLEXITY_URL);
        assert_eq!(c.get_model(), PERPLEXITY_MODEL);
    }
}
