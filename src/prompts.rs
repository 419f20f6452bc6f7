//! Prompts for the two synthesis modes.
//!
//! Both builders are pure functions of their inputs so they can be
//! inspected directly in tests without a model. Each prompt ends with an
//! explicit instruction to reply with JSON only; the reply is still passed
//! through [`crate::pipeline::postprocess::strip_code_fences`] because
//! models wrap JSON in fences regardless.

/// Context used when the caller does not describe the assignment.
pub const DEFAULT_PROBLEM_CONTEXT: &str = "a math problem";

/// Build the tutoring-mode prompt (reply: one JSON object).
pub fn feedback_prompt(solution_text: &str, problem_context: Option<&str>) -> String {
    let context = problem_context
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_PROBLEM_CONTEXT);

    format!(
        r#"Act as an expert AI math tutor. A student is working on: "{context}".
Analyze their handwritten work provided as text. Your task is to provide a single, concise piece of feedback.
- If the work is correct so far, praise them and suggest the next logical step.
- If there is a mistake, gently point it out and provide a hint to correct it. Do not give the full answer.
- Keep your feedback to one or two sentences.
- If the input has nothing to do with math, reply with a light-hearted remark and encourage the student to get back to the problem.

The student's work is:
---
{solution_text}
---

Respond ONLY with a JSON object in the following format, with no surrounding text:
{{
    "isCorrect": <boolean, true if the work is correct so far, otherwise false>,
    "suggestion": "<string, your feedback for the student>"
}}"#
    )
}

/// Build the extraction-mode prompt (reply: one JSON array).
pub fn questions_prompt(extracted_text: &str) -> String {
    format!(
        r#"You convert text extracted from an exam or worksheet into structured JSON.

Rules:
- Output MUST be a single valid JSON array and nothing else. No commentary.
- Each element describes one question and has:
    - "id": integer, starting at 1, unique
    - "title": string, the question itself
    - "suggestions": array of EXACTLY 3 objects, in this order:
        1. {{"type": "info", "title": "General Hint", "content": "<broad hint>"}}
        2. {{"type": "logic", "title": "Step to Solve", "content": "<next step>"}}
        3. {{"type": "feedback", "title": "Verification", "content": "<how to check>"}}
- If the text contains no questions, output [].

Example:
[
    {{
        "id": 1,
        "title": "Solve for x: x + 5 = 12",
        "suggestions": [
            {{"type": "info", "title": "Equation Type", "content": "This is a linear equation."}},
            {{"type": "logic", "title": "Step to Solve", "content": "Subtract 5 from both sides."}},
            {{"type": "feedback", "title": "Check Your Work", "content": "Plug the solution back into the equation."}}
        ]
    }}
]

Extracted Text:
---
{extracted_text}
---"#
    )
}
