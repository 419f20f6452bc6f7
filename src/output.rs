//! Response types returned to the caller.
//!
//! These are the fixed JSON contracts of the service. Field names are
//! camelCase on the wire to match what the browser front-end reads.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Suggestion shown when the model could not be reached or replied garbage.
pub const FALLBACK_SUGGESTION: &str =
    "Sorry, I couldn't analyze the solution right now. Please try again.";

/// Suggestion shown when OCR found no text at all.
pub const NOTHING_READABLE_SUGGESTION: &str =
    "I couldn't find any text in your drawing. Please write your solution on the whiteboard.";

/// Single-item tutoring feedback.
///
/// `suggestion` is never empty; see [`FeedbackResult::fallback`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResult {
    pub is_correct: bool,
    pub suggestion: String,
}

impl FeedbackResult {
    /// Apology returned whenever synthesis fails internally.
    pub fn fallback() -> Self {
        Self {
            is_correct: false,
            suggestion: FALLBACK_SUGGESTION.to_string(),
        }
    }

    /// Successful terminal state for uploads with no recognisable text.
    pub fn nothing_readable() -> Self {
        Self {
            is_correct: false,
            suggestion: NOTHING_READABLE_SUGGESTION.to_string(),
        }
    }
}

/// The three hint categories every extracted question carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    /// A broad hint about what kind of problem this is.
    Info,
    /// A concrete step towards the solution.
    Logic,
    /// How to verify the answer.
    Feedback,
}

impl SuggestionKind {
    pub const ALL: [SuggestionKind; 3] = [Self::Info, Self::Logic, Self::Feedback];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Logic => "logic",
            Self::Feedback => "feedback",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for SuggestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub title: String,
    pub content: String,
}

/// One question extracted from a worksheet.
///
/// Built only by [`crate::pipeline::synthesize`] after validation, so
/// `suggestions` always has exactly [`Question::SUGGESTION_COUNT`] entries
/// and `id` is positive and unique within its list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: u64,
    pub title: String,
    pub suggestions: Vec<Suggestion>,
}

impl Question {
    pub const SUGGESTION_COUNT: usize = 3;
}

/// Ordered questions, serialised as a bare JSON array.
pub type QuestionList = Vec<Question>;
