//! Triage conversation state machine.
//!
//! The core is pure: [`Conversation::handle`] takes an event and returns the
//! effects the caller must carry out (render, show typing, persist the home
//! profile, call the backend). No I/O happens here.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ChatError;
use crate::models::{AssessmentSummary, ConversationMessage, UserContext, UserProfile};
use crate::parser;
use crate::prompts;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConversationState {
    /// First-time, signed-out user without a cached home profile.
    CollectingContext,
    AwaitingProjectDescription,
    /// A backend call is in flight; further user messages are rejected.
    WaitingForModelResponse,
    /// Transient while a reply is checked for a completion marker.
    ReadingResponse,
    AssessmentReady,
    /// The last backend call failed. Accepts a new message like `AwaitingProjectDescription`.
    Errored,
}

#[derive(Debug, Clone)]
pub enum Event {
    UserMessage(String),
    ModelResponse(String),
    ModelFailure(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// The message list changed and should be redrawn.
    Render,
    ShowTyping,
    HideTyping,
    PersistUserContext(UserContext),
    SendConversation {
        messages: Vec<ConversationMessage>,
        context: Option<UserContext>,
    },
    AssessmentReady(AssessmentSummary),
}

/// Snapshot handed to the presentation layer.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub id: Uuid,
    pub state: ConversationState,
    pub messages: Vec<ConversationMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment: Option<AssessmentSummary>,
}

#[derive(Debug, Clone)]
pub struct Conversation {
    id: Uuid,
    state: ConversationState,
    messages: Vec<ConversationMessage>,
    context: Option<UserContext>,
    authenticated: bool,
    assessment: Option<AssessmentSummary>,
}

impl Conversation {
    /// Opens a conversation seeded with the right greeting.
    ///
    /// A signed-in `profile` takes precedence over the cached `context`.
    pub fn start(
        context: Option<UserContext>,
        profile: Option<&UserProfile>,
        now: DateTime<Utc>,
    ) -> Self {
        let authenticated = profile.is_some();
        let context = profile.map(UserProfile::context).or(context);

        let (state, greeting) = if !authenticated && context.is_none() {
            (
                ConversationState::CollectingContext,
                prompts::ONBOARDING_PROMPT.to_string(),
            )
        } else {
            (
                ConversationState::AwaitingProjectDescription,
                prompts::project_prompt(),
            )
        };

        Self {
            id: Uuid::new_v4(),
            state,
            messages: vec![ConversationMessage::assistant(greeting, now)],
            context,
            authenticated,
            assessment: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn context(&self) -> Option<&UserContext> {
        self.context.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// The extracted assessment, available only once a completion marker was seen.
    pub fn assessment(&self) -> Result<&AssessmentSummary, ChatError> {
        self.assessment.as_ref().ok_or(ChatError::NotReady)
    }

    pub fn view(&self) -> ConversationView {
        ConversationView {
            id: self.id,
            state: self.state,
            messages: self.messages.clone(),
            assessment: self.assessment.clone(),
        }
    }

    fn needs_context(&self) -> bool {
        !self.authenticated && self.context.is_none()
    }

    fn idle_state(&self) -> ConversationState {
        if self.needs_context() {
            ConversationState::CollectingContext
        } else {
            ConversationState::AwaitingProjectDescription
        }
    }

    /// Applies one event and returns the effects to execute, in order.
    pub fn handle(&mut self, event: Event, now: DateTime<Utc>) -> Result<Vec<Effect>, ChatError> {
        match event {
            Event::UserMessage(text) => self.on_user_message(text, now),
            Event::ModelResponse(text) => self.on_model_response(text, now),
            Event::ModelFailure(_) => self.on_model_failure(now),
        }
    }

    fn on_user_message(&mut self, text: String, now: DateTime<Utc>) -> Result<Vec<Effect>, ChatError> {
        match self.state {
            ConversationState::WaitingForModelResponse | ConversationState::ReadingResponse => {
                return Err(ChatError::Busy)
            }
            ConversationState::AssessmentReady => return Err(ChatError::AssessmentComplete),
            _ => {}
        }

        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        self.messages.push(ConversationMessage::user(text, now));
        let mut effects = vec![Effect::Render];

        if self.needs_context() {
            let parsed = parser::parse_user_context(text);
            if !parsed.is_empty() {
                let context = self.context.get_or_insert_with(UserContext::default);
                context.merge(parsed);
                effects.push(Effect::PersistUserContext(context.clone()));

                self.messages
                    .push(ConversationMessage::assistant(prompts::context_acknowledgment(), now));
                effects.push(Effect::Render);
                self.state = ConversationState::AwaitingProjectDescription;
                return Ok(effects);
            }
        }

        self.state = ConversationState::WaitingForModelResponse;
        effects.push(Effect::ShowTyping);
        effects.push(Effect::SendConversation {
            messages: self.messages.clone(),
            context: self.context.clone(),
        });
        Ok(effects)
    }

    fn on_model_response(&mut self, text: String, now: DateTime<Utc>) -> Result<Vec<Effect>, ChatError> {
        if self.state != ConversationState::WaitingForModelResponse {
            return Err(ChatError::UnexpectedResponse);
        }

        self.messages.push(ConversationMessage::assistant(text, now));
        self.state = ConversationState::ReadingResponse;
        let mut effects = vec![Effect::HideTyping, Effect::Render];

        let last = self.messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        if parser::is_completion_message(last) {
            let summary = parser::parse_assessment(last);
            self.assessment = Some(summary.clone());
            self.state = ConversationState::AssessmentReady;
            effects.push(Effect::AssessmentReady(summary));
        } else {
            self.state = self.idle_state();
        }
        Ok(effects)
    }

    fn on_model_failure(&mut self, now: DateTime<Utc>) -> Result<Vec<Effect>, ChatError> {
        if self.state != ConversationState::WaitingForModelResponse {
            return Err(ChatError::UnexpectedResponse);
        }

        self.messages
            .push(ConversationMessage::assistant(prompts::APOLOGY_MESSAGE, now));
        self.state = ConversationState::Errored;
        Ok(vec![Effect::HideTyping, Effect::Render])
    }
}
