//! Token-budgeted prompt assembly.
//!
//! A prompt is built from the block list `[system] + history + [user input]`.
//! Each block is serialized for the active [`PromptFormat`] and costed with
//! a fixed word-count heuristic ([`estimate_tokens`]). Blocks are then kept
//! newest-first while the running cost stays within the budget; system blocks
//! are always kept. Dropped blocks are omitted whole, and kept blocks are
//! emitted in chronological order.
//!
//! | Role | `tag-delimited` | `instruction-bracket` | `plain-text` |
//! |------|-----------------|-----------------------|--------------|
//! | system | `<\|system\|>\n{msg}\n` | `<s>[INST] <<SYS>>\n{msg}\n<</SYS>>\n` | `{msg}\n` |
//! | user | `<\|user\|>\n{msg}\n` | `[INST] {msg} [/INST]\n` | `User: {msg}\n` |
//! | assistant | `<\|assistant\|>\n{msg}\n` | `{msg}\n` | `Assistant: {msg}\n` |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RagError;
use crate::models::{ConversationTurn, Role};

/// Default budget, leaving room in a 4k context for the model's reply.
pub const DEFAULT_TOKEN_BUDGET: usize = 3500;

/// Estimated tokens per whitespace-separated word.
const TOKENS_PER_WORD: f64 = 1.3;

const SYS_END_THEN_INST: &str = "<</SYS>>\n[INST] ";
const SYS_END: &str = "<</SYS>>\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromptFormat {
    /// `<|system|>` / `<|user|>` / `<|assistant|>` tags.
    #[serde(alias = "chatml")]
    TagDelimited,
    /// `[INST] ... [/INST]` with a `<<SYS>>` system section.
    #[serde(alias = "inst")]
    InstructionBracket,
    /// `User:` / `Assistant:` prefixes.
    #[serde(alias = "plain")]
    PlainText,
}

impl FromStr for PromptFormat {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tag-delimited" | "chatml" => Ok(PromptFormat::TagDelimited),
            "instruction-bracket" | "inst" => Ok(PromptFormat::InstructionBracket),
            "plain-text" | "plain" => Ok(PromptFormat::PlainText),
            other => Err(RagError::config(format!(
                "unknown prompt format '{}': expected tag-delimited, instruction-bracket, or plain-text",
                other
            ))),
        }
    }
}

impl fmt::Display for PromptFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PromptFormat::TagDelimited => "tag-delimited",
            PromptFormat::InstructionBracket => "instruction-bracket",
            PromptFormat::PlainText => "plain-text",
        })
    }
}

/// Word count × 1.3. Deliberately not a real tokenizer, so truncation is
/// deterministic across models.
pub fn estimate_tokens(text: &str) -> f64 {
    text.split_whitespace().count() as f64 * TOKENS_PER_WORD
}

/// Serialize one block for `format`.
pub fn format_block(format: PromptFormat, role: Role, message: &str) -> String {
    match format {
        PromptFormat::TagDelimited => format!("<|{}|>\n{}\n", role, message),
        PromptFormat::InstructionBracket => match role {
            Role::System => format!("<s>[INST] <<SYS>>\n{}\n<</SYS>>\n", message),
            Role::User => format!("[INST] {} [/INST]\n", message.trim()),
            Role::Assistant => format!("{}\n", message.trim()),
        },
        PromptFormat::PlainText => match role {
            Role::System => format!("{}\n", message),
            Role::User => format!("User: {}\n", message),
            Role::Assistant => format!("Assistant: {}\n", message),
        },
    }
}

/// Build a prompt that fits `token_budget` (system blocks excepted).
pub fn assemble(
    history: &[ConversationTurn],
    current_input: &str,
    system_message: &str,
    format: PromptFormat,
    token_budget: usize,
) -> String {
    let system = ConversationTurn::new(Role::System, system_message);
    let user = ConversationTurn::new(Role::User, current_input);
    let blocks: Vec<&ConversationTurn> = std::iter::once(&system)
        .chain(history.iter())
        .chain(std::iter::once(&user))
        .collect();

    let budget = token_budget as f64;
    let mut used = 0.0;
    let mut kept: Vec<String> = Vec::with_capacity(blocks.len());
    for block in blocks.iter().rev() {
        let formatted = format_block(format, block.role, &block.message);
        let cost = estimate_tokens(&formatted);
        if used + cost <= budget || block.role == Role::System {
            used += cost;
            kept.push(formatted);
        }
    }
    kept.reverse();

    let mut prompt = kept.concat();
    match format {
        PromptFormat::TagDelimited => prompt.push_str("<|assistant|>\n"),
        PromptFormat::InstructionBracket => {
            prompt = prompt.replace(SYS_END_THEN_INST, SYS_END);
        }
        PromptFormat::PlainText => {}
    }
    prompt.trim().to_string()
}

/// Task wrapper applied to the user's input before assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Default,
    Translate,
    Summarize,
    Sentiment,
}

impl Mode {
    pub const NAMES: [&'static str; 4] = ["default", "translate", "summarize", "sentiment"];

    pub fn wrap(&self, input: &str) -> String {
        match self {
            Mode::Default => input.to_string(),
            Mode::Translate => format!("Translate the following sentence to French:\n{}", input),
            Mode::Summarize => format!("Summarize this content:\n{}", input),
            Mode::Sentiment => format!("What is the sentiment of the following message?\n{}", input),
        }
    }
}

impl FromStr for Mode {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Mode::Default),
            "translate" => Ok(Mode::Translate),
            "summarize" => Ok(Mode::Summarize),
            "sentiment" => Ok(Mode::Sentiment),
            other => Err(RagError::config(format!(
                "mode '{}' not recognized. Available modes: {}",
                other,
                Mode::NAMES.join(", ")
            ))),
        }
    }
}
