use log::info;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::models::chat::Turn;
use crate::resolver::QueryResolver;

/// Bearer key for the completion service. Debug output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// `None` for blank input.
    pub fn new(key: &str) -> Option<Self> {
        let key = key.trim();
        if key.is_empty() {
            None
        } else {
            Some(Self(key.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// Queries are blocked until a key is supplied or the user opts out.
    Prompting,
    Ready,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("query is empty")]
    EmptyQuery,
    #[error("a credential is required before sending queries")]
    CredentialRequired,
    #[error("credential is blank")]
    BlankCredential,
}

/// One conversation: its credential, prompt state and turn log.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    credential: Option<Credential>,
    state: CredentialState,
    turns: Vec<Turn>,
}

impl Session {
    /// Starts `Ready` when a non-blank credential is preconfigured, else `Prompting`.
    pub fn new(greeting: &str, credential: Option<&str>) -> Self {
        let credential = credential.and_then(Credential::new);
        let state = if credential.is_some() {
            CredentialState::Ready
        } else {
            CredentialState::Prompting
        };
        let id = Uuid::new_v4();
        info!("Session {} opened ({:?})", id, state);
        Self { id, credential, state, turns: vec![Turn::assistant(greeting)] }
    }

    pub fn ready_without_credential(greeting: &str) -> Self {
        let mut session = Self::new(greeting, None);
        session.skip_credential();
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> CredentialState {
        self.state
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn set_credential(&mut self, key: &str) -> Result<(), SessionError> {
        let credential = Credential::new(key).ok_or(SessionError::BlankCredential)?;
        self.credential = Some(credential);
        self.state = CredentialState::Ready;
        info!("Session {} credential set", self.id);
        Ok(())
    }

    pub fn skip_credential(&mut self) {
        if self.state == CredentialState::Prompting {
            self.state = CredentialState::Ready;
            info!("Session {} continuing without credential", self.id);
        }
    }

    /// Appends the user turn and exactly one assistant turn, returning the latter.
    pub async fn submit(&mut self, resolver: &QueryResolver, query: &str) -> Result<&Turn, SessionError> {
        if query.trim().is_empty() {
            return Err(SessionError::EmptyQuery);
        }
        if self.state == CredentialState::Prompting {
            return Err(SessionError::CredentialRequired);
        }

        self.turns.push(Turn::user(query));
        let credential = self.credential.as_ref().map(Credential::expose);
        let reply = resolver.resolve(query, credential).await;
        self.turns.push(Turn::assistant(reply));

        Ok(&self.turns[self.turns.len() - 1])
    }
}

/// How new sessions start: a credential preloaded by the operator, and whether
/// the credential prompt is skipped when none is available.
#[derive(Debug, Clone, Default)]
pub struct SessionPolicy {
    pub preset_credential: Option<String>,
    pub skip_prompt: bool,
}

impl SessionPolicy {
    /// A credential presented by the client takes precedence over the preset one.
    pub fn open(&self, greeting: &str, presented: Option<&str>) -> Session {
        let credential = presented
            .filter(|k| !k.trim().is_empty())
            .or(self.preset_credential.as_deref());
        match credential {
            None if self.skip_prompt => Session::ready_without_credential(greeting),
            credential => Session::new(greeting, credential),
        }
    }
}

pub fn format_transcript(turns: &[Turn]) -> String {
    let mut result = String::new();
    for turn in turns {
        result.push_str(&format!("[{}] {}: {}\n", turn.created_at.format("%H:%M:%S"), turn.role, turn.text));
    }
    result
}
