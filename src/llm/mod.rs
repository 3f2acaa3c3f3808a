pub mod chat;
use serde::{ Deserialize, Serialize };
use std::str::FromStr;
use std::fmt;

/// Completion providers speaking the OpenAI-compatible chat-completions format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    Perplexity,
    OpenAI,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseLlmTypeError {
    message: String,
}

impl fmt::Display for ParseLlmTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseLlmTypeError {}
impl FromStr for LlmType {
    type Err = ParseLlmTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "perplexity" => Ok(LlmType::Perplexity),
            "openai" => Ok(LlmType::OpenAI),
            _ =>
                Err(ParseLlmTypeError {
                    message: format!("Invalid LLM type: '{}'", s),
                }),
        }
    }
}

impl fmt::Display for LlmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmType::Perplexity => write!(f, "perplexity"),
            LlmType::OpenAI => write!(f, "openai"),
        }
    }
}

/// Low-randomness, bounded-length sampling sent with every completion.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: 0.9,
            max_tokens: 1000,
            frequency_penalty: 1.0,
            presence_penalty: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub llm_type: LlmType,
    pub completion_model: Option<String>,
    pub base_url: Option<String>,
    pub sampling: SamplingConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_llm_type_case_insensitively() {
        assert_eq!("Perplexity".parse::<LlmType>(), Ok(LlmType::Perplexity));
        assert_eq!("OPENAI".parse::<LlmType>(), Ok(LlmType::OpenAI));
    }

    #[test]
    fn rejects_unknown_llm_type() {
        let err = "ollama".parse::<LlmType>().unwrap_err();
        assert!(err.to_string().contains("ollama"));
    }
}
