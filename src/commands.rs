//! Commands exposed to the presentation layer.
//!
//! Each command drives the pure conversation core and carries out the effects
//! it returns. Events emitted through [`crate::state::EventSink`]:
//!
//! - `conversation_updated`: full conversation snapshot after every change
//! - `assistant_typing`: `{ conversationId, typing }`
//! - `assessment_ready`: `{ conversationId, assessment }`
//! - `record_saved`: `{ kind, record }` after a post or assessment is persisted
//! - `specialist_requested`: `{ conversationId, specialistType, assessmentId }`
//! - `conversation_discarded`: `{ conversationId }`

use std::collections::VecDeque;

use chrono::Utc;
use uuid::Uuid;

use crate::config;
use crate::conversation::{Conversation, ConversationState, ConversationView, Effect, Event};
use crate::error::ChatError;
use crate::models::{
    AssessmentSummary, CommunityPost, ConversationMessage, SavedAssessment, UserContext,
};
use crate::records;
use crate::state::AppState;

fn emit_view(state: &AppState, view: &ConversationView) {
    match serde_json::to_value(view) {
        Ok(payload) => state.events.emit("conversation_updated", payload),
        Err(e) => log::error!("Failed to serialize conversation {}: {:?}", view.id, e),
    }
}

fn snapshot(state: &AppState, conversation_id: Uuid) -> Result<ConversationView, ChatError> {
    state
        .conversations
        .get(&conversation_id)
        .map(|conv| conv.view())
        .ok_or(ChatError::ConversationNotFound(conversation_id))
}

fn emit_typing(state: &AppState, conversation_id: Uuid, typing: bool) {
    state.events.emit(
        "assistant_typing",
        serde_json::json!({
            "conversationId": conversation_id.to_string(),
            "typing": typing,
        }),
    );
}

/// Opens a new conversation, greeting with onboarding questions when no profile is known.
pub async fn start_conversation(state: &AppState) -> Result<ConversationView, ChatError> {
    let cached_context = state.data.lock().await.user_context.clone();
    let conversation = Conversation::start(cached_context, state.user.as_ref(), Utc::now());
    let view = conversation.view();
    log::info!(
        "Started conversation {} in state {:?}",
        view.id,
        view.state
    );

    state.conversations.insert(view.id, conversation);
    emit_view(state, &view);
    Ok(view)
}

pub fn get_conversation(state: &AppState, conversation_id: Uuid) -> Result<ConversationView, ChatError> {
    snapshot(state, conversation_id)
}

/// Drops a conversation's in-memory state. Persisted records are untouched.
pub fn discard_conversation(state: &AppState, conversation_id: Uuid) -> bool {
    let removed = state.conversations.remove(&conversation_id).is_some();
    if removed {
        log::info!("Discarded conversation {}", conversation_id);
        state.events.emit(
            "conversation_discarded",
            serde_json::json!({ "conversationId": conversation_id.to_string() }),
        );
    }
    removed
}

/// Submits a user message and runs the turn to completion.
///
/// Returns the state the conversation settled in. A failed backend call is not
/// an error here: it shows up as an apology message and the `Errored` state.
pub async fn send_message(
    state: &AppState,
    conversation_id: Uuid,
    content: String,
) -> Result<ConversationState, ChatError> {
    log::info!("User message for conversation {}", conversation_id);
    let effects = {
        let mut conv = state
            .conversations
            .get_mut(&conversation_id)
            .ok_or(ChatError::ConversationNotFound(conversation_id))?;
        conv.handle(Event::UserMessage(content), Utc::now())?
    };

    run_effects(state, conversation_id, effects).await?;
    Ok(snapshot(state, conversation_id)?.state)
}

async fn run_effects(
    state: &AppState,
    conversation_id: Uuid,
    effects: Vec<Effect>,
) -> Result<(), ChatError> {
    let mut pending: VecDeque<Effect> = effects.into();

    while let Some(effect) = pending.pop_front() {
        match effect {
            Effect::Render => emit_view(state, &snapshot(state, conversation_id)?),
            Effect::ShowTyping => emit_typing(state, conversation_id, true),
            Effect::HideTyping => emit_typing(state, conversation_id, false),
            Effect::PersistUserContext(context) => persist_user_context(state, context).await,
            Effect::SendConversation { messages, context } => {
                let event = call_backend(state, &messages, context.as_ref()).await;
                // The conversation may have been discarded while we waited.
                let mut conv = state
                    .conversations
                    .get_mut(&conversation_id)
                    .ok_or(ChatError::ConversationNotFound(conversation_id))?;
                pending.extend(conv.handle(event, Utc::now())?);
            }
            Effect::AssessmentReady(summary) => {
                log::info!("Assessment ready for conversation {}", conversation_id);
                state.events.emit(
                    "assessment_ready",
                    serde_json::json!({
                        "conversationId": conversation_id.to_string(),
                        "assessment": summary,
                    }),
                );
            }
        }
    }
    Ok(())
}

// Losing the profile only costs the user a repeated question, so failures are logged.
async fn persist_user_context(state: &AppState, context: UserContext) {
    state.data.lock().await.user_context = Some(context.clone());
    let storage = state.storage.lock().await;
    if let Err(e) = storage.save_user_context(&context).await {
        log::warn!("Failed to persist user context: {:?}", e);
    }
}

async fn call_backend(
    state: &AppState,
    messages: &[ConversationMessage],
    context: Option<&UserContext>,
) -> Event {
    let api_key = match config::get_api_key(&state.model_config) {
        Ok(key) => key,
        Err(e) => {
            log::error!("Failed to get API key for '{}': {:?}", state.model_config.name, e);
            return Event::ModelFailure(e.to_string());
        }
    };

    let request = state.api_provider.send_conversation(
        &state.model_config,
        api_key.as_deref(),
        messages,
        context,
        state.request_timeout,
    );

    match tokio::time::timeout(state.request_timeout, request).await {
        Ok(Ok(text)) => Event::ModelResponse(text),
        Ok(Err(e)) => {
            log::error!("Backend request failed: {:?}", e);
            Event::ModelFailure(e.to_string())
        }
        Err(_) => {
            log::error!(
                "Backend request timed out after {:?}",
                state.request_timeout
            );
            Event::ModelFailure("request timed out".to_string())
        }
    }
}

fn ready_assessment(
    state: &AppState,
    conversation_id: Uuid,
) -> Result<(Vec<ConversationMessage>, AssessmentSummary), ChatError> {
    let conv = state
        .conversations
        .get(&conversation_id)
        .ok_or(ChatError::ConversationNotFound(conversation_id))?;
    let summary = conv.assessment()?.clone();
    Ok((conv.messages().to_vec(), summary))
}

fn emit_record<T: serde::Serialize>(state: &AppState, kind: &str, record: &T) {
    state.events.emit(
        "record_saved",
        serde_json::json!({ "kind": kind, "record": record }),
    );
}

/// Shares the assessment with the community, with an optional note on top.
pub async fn request_peer_help(
    state: &AppState,
    conversation_id: Uuid,
    note: Option<String>,
) -> Result<CommunityPost, ChatError> {
    let (_, summary) = ready_assessment(state, conversation_id)?;
    let post = records::build_community_post(
        &summary,
        note.as_deref(),
        &state.author_name(),
        Utc::now(),
    );

    // The cache only changes once the rewrite has landed.
    let mut data = state.data.lock().await;
    let mut posts = Vec::with_capacity(data.posts.len() + 1);
    posts.push(post.clone());
    posts.extend(data.posts.iter().cloned());
    state.storage.lock().await.save_posts(&posts).await?;
    data.posts = posts;
    drop(data);

    log::info!("Shared assessment from {} as post {}", conversation_id, post.id);
    emit_record(state, "post", &post);
    Ok(post)
}

async fn persist_assessment(
    state: &AppState,
    conversation_id: Uuid,
) -> Result<SavedAssessment, ChatError> {
    let (messages, summary) = ready_assessment(state, conversation_id)?;
    let saved = records::build_saved_assessment(&messages, &summary, Utc::now());

    let mut data = state.data.lock().await;
    let mut assessments = data.assessments.clone();
    assessments.push(saved.clone());
    state
        .storage
        .lock()
        .await
        .save_assessments(&assessments)
        .await?;
    data.assessments = assessments;
    drop(data);

    log::info!("Saved assessment {} from conversation {}", saved.id, conversation_id);
    emit_record(state, "assessment", &saved);
    Ok(saved)
}

/// Saves the assessment and hands off to the specialist flow.
pub async fn request_specialist(
    state: &AppState,
    conversation_id: Uuid,
) -> Result<SavedAssessment, ChatError> {
    let saved = persist_assessment(state, conversation_id).await?;
    state.events.emit(
        "specialist_requested",
        serde_json::json!({
            "conversationId": conversation_id.to_string(),
            "specialistType": saved.specialist_type,
            "assessmentId": saved.id.to_string(),
        }),
    );
    Ok(saved)
}

/// Saves the assessment without any hand-off. Saving twice stores two records.
pub async fn save_assessment(
    state: &AppState,
    conversation_id: Uuid,
) -> Result<SavedAssessment, ChatError> {
    persist_assessment(state, conversation_id).await
}

pub async fn list_assessments(state: &AppState) -> Vec<SavedAssessment> {
    state.data.lock().await.assessments.clone()
}

pub async fn list_posts(state: &AppState) -> Vec<CommunityPost> {
    state.data.lock().await.posts.clone()
}
