//! Records created from a finished assessment: community posts and saved
//! assessments, plus the keyword heuristic that picks a specialist.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    AssessmentSummary, CommunityPost, Complexity, ConversationMessage, DiyFeasibility, Role,
    SavedAssessment,
};

pub const FALLBACK_PROJECT: &str = "Home project assessment";
pub const FALLBACK_DIAGNOSIS: &str =
    "Based on your description, this appears to be a home project that requires attention.";
pub const FALLBACK_COMPLEXITY: &str = "Medium";
pub const FALLBACK_DIY: &str = "Partial";

/// Next steps attached to every saved assessment, and shown when the model gave none.
pub const GENERIC_NEXT_STEPS: [&str; 3] = [
    "Document the issue with photos/videos",
    "Get multiple opinions before proceeding",
    "Consider DIY vs professional approach",
];

const TITLE_WORDS: usize = 6;

static SPECIALIST_RULES: &[(&[&str], &str)] = &[
    (&["water", "pipe", "faucet"], "Licensed Plumber"),
    (&["electrical", "wire", "outlet"], "Licensed Electrician"),
    (&["hvac", "heating", "cooling"], "HVAC Technician"),
];

const DEFAULT_SPECIALIST: &str = "General Contractor";

/// Picks a profession from keywords anywhere in the transcript. Plumbing wins over
/// electrical, electrical over HVAC.
pub fn classify_specialist(messages: &[ConversationMessage]) -> &'static str {
    let all_text = messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    SPECIALIST_RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| all_text.contains(k)))
        .map(|(_, specialist)| *specialist)
        .unwrap_or(DEFAULT_SPECIALIST)
}

fn user_messages(messages: &[ConversationMessage]) -> impl Iterator<Item = &ConversationMessage> {
    messages.iter().filter(|m| m.role == Role::User)
}

fn title_from_chat(messages: &[ConversationMessage]) -> String {
    let Some(first) = user_messages(messages).next() else {
        return "Home Repair Issue".to_string();
    };
    let words: Vec<&str> = first.content.split_whitespace().collect();
    let mut title = words.iter().take(TITLE_WORDS).copied().collect::<Vec<_>>().join(" ");
    if words.len() > TITLE_WORDS {
        title.push_str("...");
    }
    title
}

fn description_from_chat(messages: &[ConversationMessage]) -> String {
    user_messages(messages)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn diagnosis_from_chat(messages: &[ConversationMessage]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .map(|m| m.content.clone())
        .unwrap_or_else(|| "Issue requires further assessment".to_string())
}

// More assistant turns means the model had more to go on.
fn confidence_from_chat(messages: &[ConversationMessage]) -> Complexity {
    match messages.iter().filter(|m| m.role == Role::Assistant).count() {
        n if n >= 3 => Complexity::High,
        2 => Complexity::Medium,
        _ => Complexity::Low,
    }
}

/// Materializes a saved assessment from a finished conversation.
pub fn build_saved_assessment(
    messages: &[ConversationMessage],
    summary: &AssessmentSummary,
    now: DateTime<Utc>,
) -> SavedAssessment {
    SavedAssessment {
        id: Uuid::new_v4(),
        title: title_from_chat(messages),
        description: description_from_chat(messages),
        status: "active".to_string(),
        kind: "AI Triage".to_string(),
        date: now,
        ai_complete: true,
        diagnosis: diagnosis_from_chat(messages),
        confidence: confidence_from_chat(messages),
        specialist_type: classify_specialist(messages).to_string(),
        next_steps: GENERIC_NEXT_STEPS.iter().map(|s| s.to_string()).collect(),
        chat_transcript: messages.to_vec(),
        summary: summary.clone(),
    }
}

/// One-line advice derived from the complexity and DIY verdicts, when they call for it.
pub fn guidance(summary: &AssessmentSummary) -> Option<&'static str> {
    match (summary.complexity_level(), summary.diy_feasibility()) {
        (_, Some(DiyFeasibility::No)) => Some("This one is best left to a professional."),
        (Some(Complexity::High), _) => {
            Some("High complexity: get a second opinion before starting.")
        }
        (_, Some(DiyFeasibility::Partial)) => {
            Some("Parts of this are DIY-friendly; plan where a pro takes over.")
        }
        _ => None,
    }
}

/// Renders the assessment as the text block shown in a community post.
pub fn render_summary_block(summary: &AssessmentSummary) -> String {
    let mut block = format!(
        "📋 {}\nComplexity: {} | DIY: {}",
        summary.project.as_deref().unwrap_or("Home Project Assessment"),
        summary.complexity.as_deref().unwrap_or(FALLBACK_COMPLEXITY),
        summary.diy_feasible.as_deref().unwrap_or(FALLBACK_DIY),
    );
    if let Some(price) = &summary.estimated_price {
        block.push_str(&format!(" | {}", price));
    }
    block.push_str("\n\n");
    block.push_str(summary.diagnosis.as_deref().unwrap_or(FALLBACK_DIAGNOSIS));

    if let Some(safety) = &summary.safety_concerns {
        block.push_str(&format!("\n\n⚠️ {}", safety));
    }
    if let Some(steps) = summary.next_steps.as_ref().filter(|s| !s.is_empty()) {
        block.push_str("\n\nNext Steps:");
        for step in steps {
            block.push_str(&format!("\n- {}", step));
        }
    }
    if let Some(specialist) = &summary.specialist_needed {
        block.push_str(&format!("\n\n👨‍🔧 {}", specialist));
    }
    if let Some(advice) = guidance(summary) {
        block.push_str(&format!("\n\n💡 {}", advice));
    }
    block
}

/// Packages the assessment and an optional note into a community post.
pub fn build_community_post(
    summary: &AssessmentSummary,
    note: Option<&str>,
    author: &str,
    now: DateTime<Utc>,
) -> CommunityPost {
    let mut content = String::new();
    if let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) {
        content.push_str(note);
        content.push_str("\n\n");
    }
    content.push_str(&render_summary_block(summary));

    CommunityPost {
        id: Uuid::new_v4(),
        title: summary
            .project
            .clone()
            .unwrap_or_else(|| "Home Project Help Needed".to_string()),
        content,
        author: author.to_string(),
        category: "general".to_string(),
        kind: "question".to_string(),
        date: now,
        likes: 0,
        assessment: summary.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(turns: &[(Role, &str)]) -> Vec<ConversationMessage> {
        let now = Utc::now();
        turns
            .iter()
            .map(|(role, text)| match role {
                Role::User => ConversationMessage::user(*text, now),
                Role::Assistant => ConversationMessage::assistant(*text, now),
            })
            .collect()
    }

    #[test]
    fn test_outlet_classifies_as_electrician() {
        let messages = chat(&[(Role::User, "The outlet in my garage stopped working")]);
        assert_eq!(classify_specialist(&messages), "Licensed Electrician");
    }

    #[test]
    fn test_specialist_priority_order() {
        let both = chat(&[(Role::User, "Water near the outlet and the HVAC unit")]);
        assert_eq!(classify_specialist(&both), "Licensed Plumber");

        let hvac = chat(&[(Role::Assistant, "Your HEATING system needs service")]);
        assert_eq!(classify_specialist(&hvac), "HVAC Technician");

        let other = chat(&[(Role::User, "Squeaky door hinge")]);
        assert_eq!(classify_specialist(&other), "General Contractor");
    }

    #[test]
    fn test_saved_assessment_from_chat() {
        let messages = chat(&[
            (Role::Assistant, "Tell me about your project"),
            (Role::User, "My bathroom sink drains very slowly every morning"),
            (Role::Assistant, "How long has this been going on?"),
            (Role::User, "About a month"),
            (Role::Assistant, "PROJECT ASSESSMENT COMPLETE\n**Diagnosis:** Clogged trap"),
        ]);
        let summary = AssessmentSummary {
            diagnosis: Some("Clogged trap".into()),
            ..Default::default()
        };
        let saved = build_saved_assessment(&messages, &summary, Utc::now());

        assert_eq!(saved.title, "My bathroom sink drains very slowly...");
        assert_eq!(
            saved.description,
            "My bathroom sink drains very slowly every morning About a month"
        );
        assert!(saved.diagnosis.starts_with("PROJECT ASSESSMENT COMPLETE"));
        assert_eq!(saved.confidence, Complexity::High);
        assert_eq!(saved.specialist_type, "General Contractor");
        assert_eq!(saved.next_steps.len(), 3);
        assert_eq!(saved.status, "active");
        assert_eq!(saved.kind, "AI Triage");
        assert_eq!(saved.chat_transcript.len(), 5);
    }

    #[test]
    fn test_short_title_is_not_truncated() {
        let messages = chat(&[(Role::User, "Leaky   faucet")]);
        let saved = build_saved_assessment(&messages, &AssessmentSummary::default(), Utc::now());
        assert_eq!(saved.title, "Leaky faucet");
        assert_eq!(saved.confidence, Complexity::Low);
        assert_eq!(saved.diagnosis, "Issue requires further assessment");
    }

    #[test]
    fn test_community_post_with_note() {
        let summary = AssessmentSummary {
            project: Some("Fix leaky faucet".into()),
            complexity: Some("Low".into()),
            next_steps: Some(vec!["Buy cartridge".into()]),
            ..Default::default()
        };
        let post = build_community_post(&summary, Some("Any tips?"), "jo", Utc::now());
        assert_eq!(post.title, "Fix leaky faucet");
        assert!(post.content.starts_with("Any tips?\n\n📋 Fix leaky faucet"));
        assert!(post.content.contains("Complexity: Low | DIY: Partial"));
        assert!(post.content.contains("- Buy cartridge"));
        assert!(post.content.contains(FALLBACK_DIAGNOSIS));
        assert_eq!(post.author, "jo");
        assert_eq!(post.kind, "question");
    }

    #[test]
    fn test_community_post_without_note_uses_fallback_title() {
        let post = build_community_post(&AssessmentSummary::default(), Some("  "), "jo", Utc::now());
        assert_eq!(post.title, "Home Project Help Needed");
        assert!(post.content.starts_with("📋 Home Project Assessment"));
    }

    #[test]
    fn test_guidance_reads_typed_verdicts() {
        let summary = |complexity: &str, diy: &str| AssessmentSummary {
            complexity: Some(complexity.into()),
            diy_feasible: Some(diy.into()),
            ..Default::default()
        };
        assert_eq!(
            guidance(&summary("Low", "No, needs a permit")),
            Some("This one is best left to a professional.")
        );
        assert_eq!(
            guidance(&summary("High (multi-day)", "Yes")),
            Some("High complexity: get a second opinion before starting.")
        );
        assert_eq!(guidance(&summary("Low", "Yes")), None);
        assert_eq!(guidance(&AssessmentSummary::default()), None);

        let block = render_summary_block(&summary("Medium", "Partial"));
        assert!(block.ends_with("💡 Parts of this are DIY-friendly; plan where a pro takes over."));
    }
}
