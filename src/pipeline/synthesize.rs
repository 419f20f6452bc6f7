//! Feedback synthesis: prompt the model and validate its JSON reply.
//!
//! Two modes share one model:
//!
//! * **Tutoring** ([`FeedbackSynthesizer::synthesize_feedback`]) never fails.
//!   A model error, unparseable reply or wrong shape all produce
//!   [`FeedbackResult::fallback`].
//! * **Extraction** ([`FeedbackSynthesizer::synthesize_questions`]) surfaces
//!   failures so the caller can tell "no questions" (`Ok(vec![])`) from
//!   "the model replied garbage" ([`SynthesisError::Schema`]).
//!
//! Replies are cleaned by [`clean_reply`] and parsed into a
//! `serde_json::Value` first, then walked by hand. Walking the value gives
//! errors that name the exact JSON path that failed (`[1].suggestions[2].type`),
//! which is what ends up in the logs when a model drifts from the format.

use crate::clients::TextGenerator;
use crate::error::SynthesisError;
use crate::output::{FeedbackResult, Question, QuestionList, Suggestion, SuggestionKind};
use crate::pipeline::postprocess::clean_reply;
use crate::prompts::{feedback_prompt, questions_prompt};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct FeedbackSynthesizer {
    llm: Arc<dyn TextGenerator>,
}

impl FeedbackSynthesizer {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    /// Tutoring mode. Always returns a usable result.
    pub async fn synthesize_feedback(
        &self,
        text: &str,
        problem_context: Option<&str>,
    ) -> FeedbackResult {
        let prompt = feedback_prompt(text, problem_context);
        let reply = match self.llm.generate(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Feedback generation failed: {}", e);
                return FeedbackResult::fallback();
            }
        };

        match parse_feedback(&reply) {
            Ok(result) => result,
            Err(e) => {
                warn!("{}", e);
                debug!("Rejected feedback reply: {:?}", reply);
                FeedbackResult::fallback()
            }
        }
    }

    /// Extraction mode.
    pub async fn synthesize_questions(&self, text: &str) -> Result<QuestionList, SynthesisError> {
        let prompt = questions_prompt(text);
        let reply = self.llm.generate(&prompt).await?;
        parse_questions(&reply).inspect_err(|e| {
            warn!("{}", e);
            debug!("Rejected questions reply: {:?}", reply);
        })
    }
}

/// Parse and validate a tutoring reply.
pub fn parse_feedback(reply: &str) -> Result<FeedbackResult, SynthesisError> {
    let value = parse_json(reply)?;
    let obj = as_object(&value, "$")?;

    let is_correct = match obj.get("isCorrect") {
        Some(Value::Bool(b)) => *b,
        Some(_) => return Err(SynthesisError::schema("isCorrect", "expected a boolean")),
        None => return Err(SynthesisError::schema("isCorrect", "missing")),
    };
    let suggestion = non_empty_string(obj, "suggestion", "suggestion")?;

    Ok(FeedbackResult {
        is_correct,
        suggestion,
    })
}

/// Parse and validate an extraction reply.
pub fn parse_questions(reply: &str) -> Result<QuestionList, SynthesisError> {
    let value = parse_json(reply)?;
    let items = value
        .as_array()
        .ok_or_else(|| SynthesisError::schema("$", "expected a JSON array"))?;

    let mut seen = HashSet::with_capacity(items.len());
    let mut questions = Vec::with_capacity(items.len());

    for (i, item) in items.iter().enumerate() {
        let path = format!("[{i}]");
        let obj = as_object(item, &path)?;

        let id = obj
            .get("id")
            .and_then(Value::as_u64)
            .filter(|id| *id > 0)
            .ok_or_else(|| SynthesisError::schema(format!("{path}.id"), "expected a positive integer"))?;
        if !seen.insert(id) {
            return Err(SynthesisError::schema(
                format!("{path}.id"),
                format!("duplicate id {id}"),
            ));
        }

        let title = non_empty_string(obj, "title", &format!("{path}.title"))?;
        let suggestions = parse_suggestions(obj.get("suggestions"), &format!("{path}.suggestions"))?;

        questions.push(Question {
            id,
            title,
            suggestions,
        });
    }

    debug!("Validated {} questions", questions.len());
    Ok(questions)
}

fn parse_suggestions(value: Option<&Value>, path: &str) -> Result<Vec<Suggestion>, SynthesisError> {
    let items = value
        .and_then(Value::as_array)
        .ok_or_else(|| SynthesisError::schema(path, "expected an array"))?;
    if items.len() != Question::SUGGESTION_COUNT {
        return Err(SynthesisError::schema(
            path,
            format!(
                "expected exactly {} entries, got {}",
                Question::SUGGESTION_COUNT,
                items.len()
            ),
        ));
    }

    items
        .iter()
        .enumerate()
        .map(|(j, item)| {
            let path = format!("{path}[{j}]");
            let obj = as_object(item, &path)?;
            let kind = obj
                .get("type")
                .and_then(Value::as_str)
                .and_then(SuggestionKind::parse)
                .ok_or_else(|| {
                    SynthesisError::schema(
                        format!("{path}.type"),
                        "expected one of \"info\", \"logic\", \"feedback\"",
                    )
                })?;
            Ok(Suggestion {
                kind,
                title: string_field(obj, "title", &format!("{path}.title"))?,
                content: string_field(obj, "content", &format!("{path}.content"))?,
            })
        })
        .collect()
}

fn parse_json(reply: &str) -> Result<Value, SynthesisError> {
    let cleaned = clean_reply(reply);
    serde_json::from_str(&cleaned).map_err(|e| SynthesisError::schema("$", format!("not valid JSON: {e}")))
}

fn as_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, SynthesisError> {
    value
        .as_object()
        .ok_or_else(|| SynthesisError::schema(path, "expected an object"))
}

fn string_field(obj: &Map<String, Value>, key: &str, path: &str) -> Result<String, SynthesisError> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SynthesisError::schema(path, "expected a string"))
}

fn non_empty_string(obj: &Map<String, Value>, key: &str, path: &str) -> Result<String, SynthesisError> {
    let s = string_field(obj, key, path)?;
    if s.trim().is_empty() {
        return Err(SynthesisError::schema(path, "must not be empty"));
    }
    Ok(s)
}
