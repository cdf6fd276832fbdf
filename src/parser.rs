//! Best-effort text extraction for the triage conversation.
//!
//! Detects completion markers in assistant replies, pulls the labeled
//! assessment fields out of the closing message, and recognises home-profile
//! answers in user messages. Nothing here fails: unrecognised input simply
//! yields empty fields.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::{AssessmentSummary, ConversationMessage, Role, UserContext};

/// Phrases that mark an assistant reply as the finished assessment.
pub const COMPLETION_MARKERS: [&str; 3] = [
    "PROJECT ASSESSMENT COMPLETE",
    "I've completed your project assessment",
    "share this with friends for advice or connect with a professional",
];

// =============================================================================
// Assessment labels
// =============================================================================

fn label_regex(label: &str) -> Regex {
    Regex::new(&format!(r"(?m)\*\*{}:\*\*[ \t]*(.*)$", regex::escape(label)))
        .expect("Invalid label regex")
}

struct LabelPatterns {
    project: Regex,
    diagnosis: Regex,
    complexity: Regex,
    diy_feasible: Regex,
    estimated_price: Regex,
    safety_concerns: Regex,
    specialist_needed: Regex,
}

static LABELS: LazyLock<LabelPatterns> = LazyLock::new(|| LabelPatterns {
    project: label_regex("Project"),
    diagnosis: label_regex("Diagnosis"),
    complexity: label_regex("Complexity"),
    diy_feasible: label_regex("DIY Feasible"),
    estimated_price: label_regex("Estimated Price"),
    safety_concerns: label_regex("Safety Concerns"),
    specialist_needed: label_regex("Specialist Needed"),
});

// Everything after the label up to the next bold marker or the end of the text.
static NEXT_STEPS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\*\*Recommended Next Steps:\*\*(.*?)(?:\*\*|\z)").unwrap()
});

static ORDINAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+[.)]\s*").unwrap());

fn capture_label(re: &Regex, text: &str) -> Option<String> {
    let value = re.captures(text)?.get(1)?.as_str().trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn capture_next_steps(text: &str) -> Option<Vec<String>> {
    let block = NEXT_STEPS_RE.captures(text)?.get(1)?.as_str();
    let steps = block
        .lines()
        .map(|line| ORDINAL_RE.replace(line.trim(), "").trim().to_string())
        .filter(|step| !step.is_empty())
        .collect();
    Some(steps)
}

/// Returns the first completion marker found in `text`, if any.
pub fn completion_marker(text: &str) -> Option<&'static str> {
    COMPLETION_MARKERS
        .iter()
        .copied()
        .find(|marker| text.contains(marker))
}

pub fn is_completion_message(text: &str) -> bool {
    completion_marker(text).is_some()
}

/// True when the most recent assistant message carries a completion marker.
pub fn is_assessment_ready(history: &[ConversationMessage]) -> bool {
    history
        .iter()
        .rev()
        .find(|msg| msg.role == Role::Assistant)
        .is_some_and(|msg| is_completion_message(&msg.content))
}

/// Extracts the labeled assessment fields from an assistant message.
///
/// Each `**Label:** value` line fills one field; labels that are missing
/// leave their field as `None`.
pub fn parse_assessment(text: &str) -> AssessmentSummary {
    let labels = &*LABELS;
    AssessmentSummary {
        project: capture_label(&labels.project, text),
        diagnosis: capture_label(&labels.diagnosis, text),
        complexity: capture_label(&labels.complexity, text),
        diy_feasible: capture_label(&labels.diy_feasible, text),
        estimated_price: capture_label(&labels.estimated_price, text),
        safety_concerns: capture_label(&labels.safety_concerns, text),
        next_steps: capture_next_steps(text),
        specialist_needed: capture_label(&labels.specialist_needed, text),
    }
}

// =============================================================================
// Home profile answers
// =============================================================================

type PhraseRule = (&'static [&'static str], &'static str);

// "townhouse" is checked before the bare "house" fallback so it is not swallowed.
static HOME_TYPE_RULES: &[PhraseRule] = &[
    (&["single-family"], "Single-family house"),
    (&["townhouse"], "Townhouse"),
    (&["apartment", "condo"], "Apartment/Condo"),
    (&["mobile"], "Mobile home"),
    (&["house"], "Single-family house"),
];

static HANDINESS_RULES: &[PhraseRule] = &[
    (&["beginner", "hire professionals"], "Beginner"),
    (&["some experience", "basic repairs"], "Some experience"),
    (&["confident", "most projects"], "Confident DIYer"),
    (&["expert", "complex renovations"], "Expert"),
];

static HOME_AGE_RULES: &[PhraseRule] = &[
    (&["new construction", "0-5 years"], "New construction (0-5 years)"),
    (&["recent", "6-15 years"], "Recent (6-15 years)"),
    (&["established", "16-30 years"], "Established (16-30 years)"),
    (&["older", "30+ years"], "Older (30+ years)"),
];

fn first_rule_match(lowered: &str, rules: &[PhraseRule]) -> Option<String> {
    rules
        .iter()
        .find(|(phrases, _)| phrases.iter().any(|p| lowered.contains(p)))
        .map(|(_, value)| value.to_string())
}

/// Recognises home type, handiness level and home age in a free-form answer.
pub fn parse_user_context(message: &str) -> UserContext {
    let lowered = message.to_lowercase();
    UserContext {
        home_type: first_rule_match(&lowered, HOME_TYPE_RULES),
        handiness_level: first_rule_match(&lowered, HANDINESS_RULES),
        home_age: first_rule_match(&lowered, HOME_AGE_RULES),
        square_footage: None,
    }
}
