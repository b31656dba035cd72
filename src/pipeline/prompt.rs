use super::{Answer, EvalRequest};
use crate::provider::Message;

/// Bumped whenever prompt wording changes, so stale cache entries stop matching
pub const PROMPT_VERSION: &str = "1";

pub fn render_prompt<A: Answer>(request: &EvalRequest) -> String {
    let items = request
        .checklist
        .iter()
        .map(|(key, question)| format!("- {}: {}", key, question))
        .collect::<Vec<_>>()
        .join("\n");

    let mut prompt = format!(
        "{}\n\n{}:\n{}\n\nResume:\n{}\n",
        A::INSTRUCTIONS,
        A::ITEM_LABEL,
        items,
        request.document
    );

    // Keeps repeated samples from being byte-identical requests upstream
    if let Some(repeat) = request.repeat {
        prompt.push_str(&format!("\n(review pass {})\n", repeat + 1));
    }

    prompt
}

/// The conversation for one attempt, including feedback on a rejected reply
pub fn build_messages<A: Answer>(request: &EvalRequest) -> Vec<Message> {
    let mut messages = vec![Message::user(render_prompt::<A>(request))];

    if let Some(feedback) = &request.feedback {
        messages.push(Message::assistant(feedback.raw.clone()));
        messages.push(Message::user(format!(
            "Your previous response could not be used: {}\n\n\
            Reply again with a single JSON object that contains every requested key.",
            feedback.reason
        )));
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::checklist;
    use crate::pipeline::Feedback;
    use crate::provider::Role;
    use std::sync::Arc;

    #[test]
    fn test_prompt_lists_items_in_key_order() {
        let request = EvalRequest::new(checklist(&["b", "a"]), Arc::from("Jane Doe"), None);
        let prompt = render_prompt::<bool>(&request);

        let a = prompt.find("- a: Question a?").unwrap();
        let b = prompt.find("- b: Question b?").unwrap();
        assert!(a < b);
        assert!(prompt.contains("Checklist:"));
        assert!(prompt.contains("Resume:\nJane Doe"));
        assert!(!prompt.contains("review pass"));
    }

    #[test]
    fn test_prompt_marks_repeat() {
        let request = EvalRequest::new(checklist(&["a"]), Arc::from("cv"), Some(2));
        assert!(render_prompt::<bool>(&request).contains("(review pass 3)"));
    }

    #[test]
    fn test_text_prompt_uses_questions_label() {
        let request = EvalRequest::new(checklist(&["a"]), Arc::from("cv"), None);
        assert!(render_prompt::<String>(&request).contains("Questions:"));
    }

    #[test]
    fn test_feedback_appends_turns() {
        let mut request = EvalRequest::new(checklist(&["a"]), Arc::from("cv"), None);
        request.feedback = Some(Feedback {
            raw: "{}".to_string(),
            reason: "missing a".to_string(),
        });

        let messages = build_messages::<bool>(&request);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "{}");
        assert!(messages[2].content.contains("missing a"));
    }
}
