//! Canned assistant texts and the system instruction sent with every turn.

use crate::models::UserContext;

const PROJECT_QUESTIONS: &str = "**To give you the best help, please tell me:**
• What exactly are you working on? (be as specific as possible)
• What's your goal with this project?
• Have you started anything yet?
• Are there any challenges or concerns?
• Which room/area is involved?

Take your time describing your project - the more details you provide, the better I can help!";

pub const ONBOARDING_PROMPT: &str = "Hi! I'm your AI home project assistant. To give you the most personalized guidance, I'd like to learn a bit about your home and your experience level.

**Quick questions to help me tailor my recommendations:**

1. **What type of home do you live in?**
   • Single-family house
   • Apartment/Condo
   • Townhouse
   • Mobile home
   • Other

2. **How would you describe your handiness level?**
   • Beginner (I prefer to hire professionals)
   • Some experience (I can handle basic projects)
   • Confident DIYer (I enjoy tackling most projects)
   • Expert (I can handle complex renovations)

3. **How old is your home?**
   • New construction (0-5 years)
   • Recent (6-15 years)
   • Established (16-30 years)
   • Older (30+ years)

Please answer these questions, and then tell me about your home project!";

pub const APOLOGY_MESSAGE: &str = "I apologize, but I'm having trouble processing your request right now. Please try again later.";

/// Greeting for users whose home profile is already known.
pub fn project_prompt() -> String {
    format!(
        "Hi! I'm your AI home project assistant. I'm here to help guide you through your project and provide personalized recommendations.\n\n{}",
        PROJECT_QUESTIONS
    )
}

/// Reply sent after a profile answer was recognised, without asking the model.
pub fn context_acknowledgment() -> String {
    format!(
        "Perfect! I've saved your home information. Now, please tell me about your home project:\n\n{}",
        PROJECT_QUESTIONS
    )
}

fn context_block(context: Option<&UserContext>) -> String {
    let Some(ctx) = context else {
        return "No user profile information available.".to_string();
    };
    let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "unknown".to_string());
    format!(
        "- Home Type: {}\n- Handiness Level: {}\n- Home Age: {}\n- Square Footage: {}",
        field(&ctx.home_type),
        field(&ctx.handiness_level),
        field(&ctx.home_age),
        field(&ctx.square_footage),
    )
}

/// Builds the system instruction, embedding the user's home profile when known.
pub fn system_prompt(context: Option<&UserContext>) -> String {
    format!(
        r#"You are a helpful home project assistant that conducts structured assessments. Your goal is to gather enough information to provide a comprehensive project summary.

**User Context:**
{context}

**CRITICAL: Do NOT provide recommendations or next steps until you have gathered sufficient information.**

**Assessment Process:**
1. **Ask specific follow-up questions** to understand their project completely
2. **Gather essential details** about: scope, timeline, budget, challenges, goals, current state
3. **Only provide assessment** when you have enough information to give accurate guidance
4. **Ask clarifying questions** if the initial description is vague or incomplete

**When you have enough information, provide a structured summary in this exact format:**

**PROJECT ASSESSMENT COMPLETE**

**Project:** [Brief title]
**Diagnosis:** [What the issue/project involves]
**Complexity:** [Low/Medium/High]
**DIY Feasible:** [Yes/No/Partial]
**Estimated Price:** [Cost range, e.g. "$500-1,200" or "Contact for quote"]
**Safety Concerns:** [Any safety issues to address]
**Recommended Next Steps:**
1. [First step]
2. [Second step]
3. [Third step]
**Specialist Needed:** [Type of professional if needed]

**IMPORTANT: When you have enough information, end your response with exactly this text:**
"I've completed your project assessment. You can now share this with friends for advice or connect with a professional."

**Safety First:** Always mention any safety concerns (electrical, gas, structural) and when to turn off utilities."#,
        context = context_block(context)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    #[test]
    fn test_system_prompt_without_context() {
        let prompt = system_prompt(None);
        assert!(prompt.contains("No user profile information available."));
        assert!(!prompt.contains("- Home Type:"));
    }

    #[test]
    fn test_system_prompt_embeds_context() {
        let ctx = UserContext {
            home_type: Some("Townhouse".into()),
            handiness_level: Some("Expert".into()),
            ..Default::default()
        };
        let prompt = system_prompt(Some(&ctx));
        assert!(prompt.contains("- Home Type: Townhouse"));
        assert!(prompt.contains("- Handiness Level: Expert"));
        assert!(prompt.contains("- Home Age: unknown"));
    }

    #[test]
    fn test_canned_texts_do_not_trigger_completion() {
        assert!(!parser::is_completion_message(ONBOARDING_PROMPT));
        assert!(!parser::is_completion_message(&project_prompt()));
        assert!(!parser::is_completion_message(&context_acknowledgment()));
        assert!(!parser::is_completion_message(APOLOGY_MESSAGE));
    }
}
