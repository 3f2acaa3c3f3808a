use clap::{ Parser, ValueEnum };

use crate::llm::{ LlmConfig, LlmType, SamplingConfig };

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Serve chat sessions over WebSocket
    Server,
    /// Chat on stdin/stdout
    Repl,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Run as a WebSocket server or an interactive terminal chat
    #[arg(long, env = "ASSISTANT_MODE", value_enum, default_value = "server")]
    pub mode: Mode,

    // --- Completion Provider Args ---
    /// Completion provider (perplexity, openai)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "perplexity")]
    pub chat_llm_type: LlmType,

    /// Full chat-completions endpoint URL. Defaults to the provider's public endpoint.
    #[arg(long, env = "CHAT_BASE_URL")]
    pub chat_base_url: Option<String>,

    /// Credential preloaded into every session. Empty means each session is asked for one.
    #[arg(long, env = "CHAT_API_KEY", default_value = "", hide_env_values = true)]
    pub chat_api_key: String,

    /// Model name (e.g., llama-3.1-sonar-small-128k-online). Defaults per provider.
    #[arg(long, env = "CHAT_MODEL")]
    pub chat_model: Option<String>,

    // --- Sampling Args ---
    #[arg(long, env = "CHAT_TEMPERATURE", default_value = "0.2")]
    pub temperature: f32,

    #[arg(long, env = "CHAT_TOP_P", default_value = "0.9")]
    pub top_p: f32,

    #[arg(long, env = "CHAT_MAX_TOKENS", default_value = "1000")]
    pub max_tokens: u32,

    #[arg(long, env = "CHAT_FREQUENCY_PENALTY", default_value = "1.0")]
    pub frequency_penalty: f32,

    #[arg(long, env = "CHAT_PRESENCE_PENALTY", default_value = "0.0")]
    pub presence_penalty: f32,

    // --- Session Args ---
    /// Start sessions ready for rule-based replies instead of asking for a credential.
    #[arg(long, env = "SKIP_CREDENTIAL_PROMPT", default_value = "false")]
    pub skip_credential_prompt: bool,

    /// Path to a JSON prompt file overriding the built-in system instruction and greeting.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    // --- Server Args ---
    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// New WebSocket connections accepted per second across all peers.
    #[arg(long, env = "CONNECTIONS_PER_SECOND", default_value = "10")]
    pub connections_per_second: u32,
}

impl Args {
    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            llm_type: self.chat_llm_type,
            completion_model: self.chat_model.clone(),
            base_url: self.chat_base_url.clone(),
            sampling: SamplingConfig {
                temperature: self.temperature,
                top_p: self.top_p,
                max_tokens: self.max_tokens,
                frequency_penalty: self.frequency_penalty,
                presence_penalty: self.presence_penalty,
            },
        }
    }

    pub fn preset_credential(&self) -> Option<&str> {
        Some(self.chat_api_key.as_str()).filter(|k| !k.trim().is_empty())
    }
}
