use serde::{ Serialize, Deserialize };
use uuid::Uuid;

use crate::config::prompt::QuickQuestion;

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "chat")] Chat {
        content: String,
    },
    #[serde(rename = "set_credential")] SetCredential {
        key: String,
    },
    #[serde(rename = "skip_credential")]
    SkipCredential,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "welcome")] Welcome {
        session_id: Uuid,
        greeting: String,
        quick_questions: Vec<QuickQuestion>,
        credential_required: bool,
    },
    #[serde(rename = "response")] Response {
        content: String,
        timestamp: i64,
    },
    #[serde(rename = "credential_required")] CredentialRequired {
        message: String,
    },
    #[serde(rename = "credential_accepted")] CredentialAccepted {
        message: String,
    },
    #[serde(rename = "error")] Error {
        message: String,
    },
    #[serde(rename = "processing")]
    Processing,
}
