use async_trait::async_trait;

use crate::beverage::BeverageKind;
use crate::error_handling::types::AssistantError;
use crate::session_management::chat::format_duration;

/// Who said a prior line of the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub speaker: Speaker,
    pub text: String,
}

/// One request to the barista.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantRequest {
    /// Persona plus session facts: break length, beverage, cup of the day.
    pub context: String,
    pub message: String,
    /// Earlier turns of the current session, oldest first.
    pub history: Vec<ChatTurn>,
}

impl AssistantRequest {
    pub fn context_for(duration_secs: u32, kind: BeverageKind, cup_number: u64) -> String {
        format!(
            "You are a cool, humorous, and chill barista at a virtual coffee shop.\n\
             A customer is taking a {} break with a \"{}\".\n\
             This is their cup #{} today.\n\
             - Keep responses EXTREMELY SHORT (max 1 sentence, under 15 words).\n\
             - Be funny, witty, and a bit dry.\n\
             - If they've had a lot of coffee (more than 3), comment on their jitters.\n\
             - Don't be overly enthusiastic or formal.\n\
             - Just casual banter.",
            format_duration(duration_secs),
            kind.display_name(),
            cup_number
        )
    }

    pub fn opening_line(kind: BeverageKind) -> String {
        format!(
            "I just ordered a {}. Serve it and say something short and funny.",
            kind.display_name()
        )
    }
}

/// The conversational collaborator behind the barista chat.
#[async_trait]
pub trait Assistant: Send + Sync {
    async fn reply(&self, request: AssistantRequest) -> Result<String, AssistantError>;
}
