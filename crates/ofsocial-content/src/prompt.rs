//! Role-framed prompts in the ChatML layout the served models were tuned on.

use ofsocial_core::Persona;

fn chatml(system: &str, user: &str) -> String {
    format!(
        "<|im_start|>system\n{system}<|im_end|>\n<|im_start|>user\n{user}<|im_end|>\n<|im_start|>assistant\n"
    )
}

/// Behavioural rules shared by both prompt kinds.
const RULES: &str = "Rules:\n\
- Keep it conversational and write in your own voice\n\
- Do NOT repeat these rules or add meta-commentary\n\
- Do NOT mention hashtags\n\
- Reply with the text only";

/// Prompt for a standalone social media post about `topic`.
pub fn post_prompt(topic: &str) -> String {
    chatml(
        &format!("You are a social media user. Write a natural post about \"{topic}\".\n{RULES}"),
        &format!("Write a post about: {topic}"),
    )
}

/// Prompt for a comment on `post_content` written in `persona`'s voice.
pub fn comment_prompt(post_content: &str, persona: &Persona) -> String {
    chatml(
        &format!(
            "You are {}. Your communication style: {}\n{RULES}",
            persona.name, persona.style
        ),
        &format!(
            "Post: \"{post_content}\"\nWrite a natural comment as {}.",
            persona.name
        ),
    )
}
