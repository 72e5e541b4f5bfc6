//! Offline coaching replies.
//!
//! Used whenever the AI provider is unavailable. Rules are checked in order
//! and the first one with a matching keyword wins.

use serde::{Deserialize, Serialize};

/// One turn of a chat transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

pub const SYSTEM_PROMPT: &str = "You are a direct, encouraging personal coach. \
Keep answers short and practical. End with one concrete action the user can take today.";

struct Rule {
    keywords: &'static [&'static str],
    reply: &'static str,
}

const RULES: &[Rule] = &[
    Rule {
        keywords: &["motivat", "lazy", "procrastinat"],
        reply: "Motivation follows action. Pick the smallest version of the task and do it for five minutes right now.",
    },
    Rule {
        keywords: &["stress", "anxious", "anxiety", "overwhelm"],
        reply: "Slow down. Take three deep breaths, write down the one thing that matters most today, and let the rest wait.",
    },
    Rule {
        keywords: &["sleep", "tired", "exhausted"],
        reply: "Energy starts with rest. Set a fixed bedtime tonight and keep screens out of the last half hour.",
    },
    Rule {
        keywords: &["workout", "exercise", "gym", "fitness"],
        reply: "Consistency beats intensity. Schedule your next session now and make it short enough that you cannot skip it.",
    },
    Rule {
        keywords: &["goal", "plan", "focus"],
        reply: "Write the goal as one sentence, then name the first step you can finish today. Clarity is the plan.",
    },
    Rule {
        keywords: &["confiden", "doubt", "fear"],
        reply: "Confidence is built from kept promises. Make one small promise to yourself today and keep it.",
    },
    Rule {
        keywords: &["money", "career", "job", "business"],
        reply: "Progress compounds. Identify the one skill that would move you forward most and spend twenty minutes on it today.",
    },
];

const DEFAULT_REPLY: &str =
    "I hear you. What is the one thing you could do in the next hour that would make today a win?";

/// Deterministic reply for `message`. Matching is case-insensitive.
pub fn fallback_reply(message: &str) -> &'static str {
    let lowered = message.to_lowercase();
    RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|k| lowered.contains(k)))
        .map(|rule| rule.reply)
        .unwrap_or(DEFAULT_REPLY)
}
