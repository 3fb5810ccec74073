use ea_domain::message::Message;
use ea_domain::{Error, EvidenceRecord, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured result of a sufficiency judgment: whether the evidence
/// gathered so far answers the question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Judgment {
    pub can_answer: bool,
    pub confidence: f32,
    pub reason: String,
    #[serde(default)]
    pub missing_info: Option<String>,
}

const JUDGE_SYSTEM_PROMPT: &str = "You are a sufficiency judge for a medical evidence-grounded \
question-answering system. Given a question and the evidence gathered so far, decide whether \
the evidence is sufficient to answer the question accurately. Respond with a single JSON object \
of the form {\"can_answer\": bool, \"confidence\": number between 0 and 1, \"reason\": string, \
\"missing_info\": string or null}. Emit only the JSON object, nothing else.";

/// Build the message transcript for one `judge_sufficiency` call. The
/// orchestrator streams this call itself (to emit `judgment_streaming`
/// events per delta); this just builds the prompt.
pub fn build_judge_messages(question: &str, evidence: &[EvidenceRecord]) -> Vec<Message> {
    let evidence_block = if evidence.is_empty() {
        "(no evidence gathered yet)".to_string()
    } else {
        evidence
            .iter()
            .map(|e| format!("[{}] {}: {}", e.id, e.title, e.full_content))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    vec![
        Message::system(JUDGE_SYSTEM_PROMPT),
        Message::user(format!("Question: {question}\n\nEvidence:\n{evidence_block}")),
    ]
}

/// Parse the judge's accumulated text output into a [`Judgment`].
///
/// The model is asked to emit bare JSON but may wrap it in prose or a
/// fenced code block; this tolerates both before giving up.
pub fn parse_judgment(text: &str) -> Result<Judgment> {
    if let Ok(j) = serde_json::from_str::<Judgment>(text.trim()) {
        return Ok(j);
    }

    let candidate = extract_json_object(text).ok_or_else(|| {
        Error::JudgeFailure(format!("no JSON object found in judge output: {text:.200}"))
    })?;

    serde_json::from_str(&candidate)
        .map_err(|e| Error::JudgeFailure(format!("malformed judge JSON: {e}")))
}

fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(text[start..=end].to_string())
}

/// Build the `{question, evidence}` argument object for an explicit
/// `judge_sufficiency` tool call (reachable if the model ever emits one
/// directly, per the closed tool enumeration) and parse it back into the
/// pieces [`build_judge_messages`] needs.
pub fn parse_judge_args(arguments: &Value) -> Result<(String, Vec<EvidenceRecord>)> {
    let question = arguments
        .get("question")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::BadToolArgs {
            tool: "judge_sufficiency".into(),
            message: "missing `question` string".into(),
        })?
        .to_string();

    let evidence = arguments
        .get("evidence")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let id = item.get("id")?.as_str().map(str::to_string).or_else(|| {
                        item.get("id").and_then(Value::as_i64).map(|n| n.to_string())
                    })?;
                    let title = item.get("title")?.as_str()?.to_string();
                    let full_content = item.get("full_content")?.as_str()?.to_string();
                    Some(EvidenceRecord::new(id, title, full_content))
                })
                .collect()
        })
        .unwrap_or_default();

    Ok((question, evidence))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_json() {
        let text = r#"{"can_answer": true, "confidence": 0.9, "reason": "ok"}"#;
        let j = parse_judgment(text).unwrap();
        assert!(j.can_answer);
        assert_eq!(j.confidence, 0.9);
        assert!(j.missing_info.is_none());
    }

    #[test]
    fn parses_json_wrapped_in_prose() {
        let text = "Here is my judgment:\n```json\n{\"can_answer\": false, \"confidence\": 0.2, \
                     \"reason\": \"insufficient\", \"missing_info\": \"dosage info\"}\n```\nThanks.";
        let j = parse_judgment(text).unwrap();
        assert!(!j.can_answer);
        assert_eq!(j.missing_info.as_deref(), Some("dosage info"));
    }

    #[test]
    fn rejects_text_with_no_json() {
        assert!(parse_judgment("I cannot decide.").is_err());
    }

    #[test]
    fn build_judge_messages_includes_question_and_evidence() {
        let evidence = vec![EvidenceRecord::new("1", "Metformin", "first-line therapy")];
        let messages = build_judge_messages("What treats T2D?", &evidence);
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.as_str().contains("Metformin"));
    }

    #[test]
    fn parse_judge_args_round_trips() {
        let args = serde_json::json!({
            "question": "q",
            "evidence": [{"id": 1, "title": "t", "full_content": "c"}],
        });
        let (question, evidence) = parse_judge_args(&args).unwrap();
        assert_eq!(question, "q");
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].id, "1");
    }
}
