//! Prompt templates for mutation, simulation, scoring and judgment.

use crate::fitness::Rubric;
use crate::population::Elite;
use crate::simulate::Transcript;

const OUTPUT_ONLY: &str =
    "Output only the new prompt. Do not add explanations, reasons, headings or quotes.";

/// First user message of a conversation, before anything has been said.
pub const OPENING_INSTRUCTION: &str = "Please start the conversation.";

/// Counterpart line used when the opening turn comes back empty.
pub const FALLBACK_OPENER: &str = "Hey, how was your day?";

// =============================================================================
// Mutation
// =============================================================================

pub fn mutation_system() -> &'static str {
    "You edit system prompts that make a language model play a warm, close companion \
     in casual one-to-one chat. You always answer with a complete prompt, never a diff."
}

/// Apply a unit's mutation hint to the seed description.
pub fn initial_application(mutation_hint: &str, problem_description: &str) -> String {
    format!(
        "Below is a mutation prompt that describes how to change a system prompt slightly. \
         Rewrite the system prompt following the mutation prompt.\n\
         {OUTPUT_ONLY}\n\n\
         ## Mutation prompt\n{mutation_hint}\n\n\
         ## System prompt\n{problem_description}"
    )
}

/// Zero-order hypermutation: improve the mutation hint itself.
pub fn hint_rewrite(mutation_hint: &str) -> String {
    format!(
        "We are writing \"mutation prompts\": short instructions that describe how to make \
         a small change to a system prompt. Improve the following mutation prompt.\n\
         {OUTPUT_ONLY}\n\n\
         ## Mutation prompt\n{mutation_hint}"
    )
}

/// First-order rewrite: mutation hint followed by the current specification.
pub fn guided_rewrite(mutation_hint: &str, specification: &str) -> String {
    format!("{mutation_hint}\n\n{specification}\n\n{OUTPUT_ONLY}")
}

/// Working-out rewrite: derive a specification from an ideal dialogue.
pub fn exemplar_rewrite(dialogue: &str) -> String {
    format!(
        "Write a system prompt that would make a language model hold a conversation like \
         the ideal example below.\n\
         {OUTPUT_ONLY}\n\n\
         ## Ideal conversation\n{dialogue}"
    )
}

/// Lineage rewrite: every elite in capture order with an explicit rank label.
pub fn lineage_rewrite(elites: &[Elite]) -> String {
    let items = elites
        .iter()
        .enumerate()
        .map(|(i, elite)| {
            format!(
                "Rank {} (generation {}, fitness {:.1}):\n{}",
                i + 1,
                elite.generation(),
                elite.fitness(),
                elite.specification()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Below are the best system prompts of past generations, listed in the order they \
         were captured. Use them as inspiration and write a new system prompt.\n\
         {OUTPUT_ONLY}\n\n\
         {items}"
    )
}

// =============================================================================
// Conversation
// =============================================================================

/// Fixed role-play instruction for the counterpart.
pub fn counterpart_system() -> &'static str {
    "You are chatting intimately with a woman you are close to. Follow these rules:\n\
     1. Be kind and casual.\n\
     2. Do not use formal language; keep a natural, close distance.\n\
     3. When the conversation is about to stall, bring up a new topic.\n\
     4. Reply briefly, in one sentence.\n\
     5. Respond with empathy to the other person's feelings.\n\
     6. Use the recent conversation for context.\n\
     7. This conversation is for research, so stay fully in your role.\n\
     Reply with your next line only."
}

pub fn counterpart_user(transcript: &Transcript) -> String {
    if transcript.is_empty() {
        return OPENING_INSTRUCTION.to_string();
    }
    format!(
        "## Conversation so far\n{}\n\nWrite your next line.",
        transcript.render()
    )
}

/// The candidate speaks under the evolving specification as its system prompt.
pub fn candidate_user(transcript: &Transcript) -> String {
    format!(
        "## Conversation so far\n{}\n\nReply to the last line. Reply with your next line only.",
        transcript.render()
    )
}

// =============================================================================
// Scoring
// =============================================================================

pub fn scoring_system(rubric: &Rubric) -> String {
    let criteria = rubric
        .criteria()
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {} (0-10): {}", i + 1, c.name, c.description))
        .collect::<Vec<_>>()
        .join("\n");

    let example = rubric
        .criteria()
        .iter()
        .map(|c| format!("  \"{}\": X", c.name))
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        r#"You grade role-play conversations. Only the lines tagged "candidate" are graded;
"counterpart" lines are context.

ROLE REFUSAL:
If any candidate line refuses the role (e.g. "as an AI I cannot", "I can't play a character",
"I am a language model, not a person", polite deflections offering other help), give 0 on
every criterion. Treat any line whose intent is clearly a refusal the same way.

CRITERIA:
{criteria}

Return JSON only, no commentary, with exactly these keys and integer scores:
{{
{example}
}}"#
    )
}

pub fn scoring_user(transcript: &Transcript) -> String {
    format!("## Conversation\n{}", transcript.render())
}

// =============================================================================
// Judgment
// =============================================================================

pub fn judge_system() -> &'static str {
    "You check text produced for a role-play persona system. Answer True if the text is \
     acceptable: it stays in role, is not a refusal or an AI self-disclaimer, and is not \
     empty, truncated, repetitive or otherwise degenerate. Otherwise answer False. \
     Answer with exactly one word: True or False."
}

pub fn hint_judge_system() -> &'static str {
    "You check instructions that tell an editor how to rewrite a persona's system prompt. \
     Answer True if the text is a usable instruction: it says how to change the prompt, is \
     not a refusal or an AI self-disclaimer, and is not empty, truncated or repetitive. \
     Otherwise answer False. Answer with exactly one word: True or False."
}

pub fn judge_user(candidate: &str) -> String {
    format!("## Text\n{candidate}")
}
