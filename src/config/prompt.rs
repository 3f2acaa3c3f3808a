use serde::{ Deserialize, Serialize };
use std::fs;
use std::path::Path;
use std::sync::Arc;
use log::info;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt field '{0}' must not be empty")]
    EmptyField(&'static str),
    #[error("Prompt file IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Prompt JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct QuickQuestion {
    pub question: String,
    pub category: String,
}

/// Text the assistant speaks with. Missing fields in a prompts file fall back
/// to the built-in campus defaults.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PromptConfig {
    pub system_instruction: String,
    pub greeting: String,
    pub credential_notice: String,
    pub quick_questions: Vec<QuickQuestion>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_instruction: "You are CampusConnect AI, a helpful assistant for college students. \
                Provide concise, accurate information about academics, campus life, study tips, \
                and student projects. Be friendly and supportive.".to_string(),
            greeting: "Hello! I am CampusConnect AI. I can help you with:\n\n\
                📚 Academic Questions - Explain concepts, help with assignments\n\
                🏛️ Campus Info - Library hours, event schedules, locations\n\
                📖 Study Help - Summarize notes, create study guides\n\
                💡 Project Ideas - Brainstorm and plan your projects\n\n\
                What would you like to know?".to_string(),
            credential_notice: "API Key Required: Please enter your Perplexity API key to use \
                the AI assistant, or continue without one for basic responses.".to_string(),
            quick_questions: vec![
                QuickQuestion {
                    question: "What are the library hours?".to_string(),
                    category: "Campus Info".to_string(),
                },
                QuickQuestion {
                    question: "Explain the concept of recursion in programming".to_string(),
                    category: "Academic".to_string(),
                },
                QuickQuestion {
                    question: "Help me create a study schedule for finals".to_string(),
                    category: "Study Help".to_string(),
                }
            ],
        }
    }
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        if self.system_instruction.trim().is_empty() {
            return Err(PromptError::EmptyField("system_instruction"));
        }
        if self.greeting.trim().is_empty() {
            return Err(PromptError::EmptyField("greeting"));
        }
        Ok(())
    }
}

/// Loads the prompt set once at start. `None` means built-in defaults.
pub fn load_prompts<P: AsRef<Path>>(path: Option<P>) -> Result<Arc<PromptConfig>, PromptError> {
    let config = match path {
        Some(path) => {
            info!("Loading prompts from {}", path.as_ref().display());
            let file_content = fs::read_to_string(path.as_ref())?;
            serde_json::from_str::<PromptConfig>(&file_content)?
        }
        None => {
            info!("No prompts file given, using built-in prompts");
            PromptConfig::default()
        }
    };
    config.validate()?;
    Ok(Arc::new(config))
}
