//! Prompt construction for quiz generation, review and titling.
//!
//! Every builder here is a pure function of its input: identical requests
//! produce identical message sequences, with no timestamps or nonces. Tests
//! rely on that to assert on exact prompts without a live model.

use crate::client::Message;
use crate::model::{GenerationRequest, ReviewRequest, OPTION_COUNT};

/// Persona for quiz generation.
pub const QUIZ_SYSTEM_PROMPT: &str = "You are a helpful and expert teacher.";

/// Persona for titling.
pub const TITLE_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Build the instruction for a quiz of `count` questions at `level`.
pub fn quiz_instruction(count: usize, level: &str) -> String {
    format!(
        "You are a teacher. Read the attached PDF (provided as base64) and write a multiple \
choice test with exactly {count} questions based strictly on the content of that document. \
Do NOT ask about PDFs in general; ask only about the information, facts and topics found \
inside this specific document. Each question must have exactly {OPTION_COUNT} options and \
exactly one correct answer, and the answer must repeat the text of the correct option. The \
difficulty of the test should be '{level}'. Respond ONLY with a JSON array of {count} \
questions in this format: [{{ \"question\": \"...\", \"options\": [\"A\", \"B\", \"C\", \"D\"], \
\"answer\": \"A\" }}, ...]"
    )
}

/// Messages for a quiz-generation request.
///
/// Layout:
/// 1. **System** — expert-teacher persona
/// 2. **User** — count, option count and difficulty instructions
/// 3. **User** — the document as an attached content block
pub fn quiz_messages(request: &GenerationRequest) -> Vec<Message> {
    vec![
        Message::system(QUIZ_SYSTEM_PROMPT),
        Message::user(quiz_instruction(
            request.question_count(),
            request.difficulty().as_str(),
        )),
        Message::user_document(request.document().clone()),
    ]
}

/// Messages for a review request: a single user message.
pub fn review_messages(request: &ReviewRequest) -> Vec<Message> {
    let answered = request
        .questions()
        .questions()
        .iter()
        .zip(request.user_answers())
        .enumerate()
        .map(|(i, (q, given))| {
            format!(
                "Q{}: {}\nOptions: {}\nCorrect: {}\nUser: {}",
                i + 1,
                q.question,
                q.options.join(" | "),
                q.answer,
                given
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let prompt = format!(
        "You are an expert tutor. Given the following multiple-choice questions, the user's \
answers, and the correct answers, provide a personalized review of the user's performance. \
Highlight areas for improvement and recommend what the user should learn next. Be specific \
and encouraging.\n\nQuestions and Answers:\n{answered}\n\nRespond ONLY with a valid JSON \
object in this format and nothing else: {{\n  \"review\": \"...\",\n  \"recommendations\": \"...\"\n}}"
    );

    vec![Message::user(prompt)]
}

/// Messages asking for a short quiz title derived from a filename.
pub fn title_messages(filename: &str) -> Vec<Message> {
    vec![
        Message::system(TITLE_SYSTEM_PROMPT),
        Message::user(format!(
            "Generate a max three word title for a quiz based on the file name: {filename}"
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MessageContent, Role};
    use crate::model::{Difficulty, EncodedDocument, Question, Quiz};

    fn request(count: usize, difficulty: Difficulty) -> GenerationRequest {
        let doc = EncodedDocument::new("notes.pdf".into(), "application/pdf".into(), "JVBERg==".into());
        GenerationRequest::new(doc, count, difficulty).unwrap()
    }

    #[test]
    fn quiz_messages_have_three_parts() {
        let msgs = quiz_messages(&request(7, Difficulty::Hard));
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].role, Role::System);
        assert!(msgs[0].render_text().contains("expert teacher"));

        let instruction = msgs[1].render_text();
        assert!(instruction.contains("exactly 7 questions"));
        assert!(instruction.contains("exactly 4 options"));
        assert!(instruction.contains("'hard'"));

        match &msgs[2].content {
            MessageContent::Document(doc) => assert_eq!(doc.payload(), "JVBERg=="),
            other => panic!("expected document block, got {other:?}"),
        }
    }

    #[test]
    fn identical_requests_yield_identical_messages() {
        let a = quiz_messages(&request(4, Difficulty::Medium));
        let b = quiz_messages(&request(4, Difficulty::Medium));
        assert_eq!(a, b);
    }

    #[test]
    fn review_message_embeds_answers_and_sentinel() {
        let quiz = Quiz::from_questions(vec![
            Question {
                question: "2+2?".into(),
                options: vec!["3".into(), "4".into(), "5".into(), "6".into()],
                answer: "4".into(),
            },
            Question {
                question: "Capital of France?".into(),
                options: vec!["Paris".into(), "Rome".into(), "Oslo".into(), "Bern".into()],
                answer: "Paris".into(),
            },
        ])
        .unwrap();
        let req = ReviewRequest::new(quiz, vec![Some("5".into())]);
        let msgs = review_messages(&req);

        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].role, Role::User);
        let text = msgs[0].render_text();
        assert!(text.contains("Q1: 2+2?\nOptions: 3 | 4 | 5 | 6\nCorrect: 4\nUser: 5"));
        assert!(text.contains("Q2: Capital of France?"));
        assert!(text.contains("User: No answer"));
        assert!(text.contains("\"recommendations\""));
    }

    #[test]
    fn title_prompt_mentions_filename() {
        let msgs = title_messages("biology-ch3.pdf");
        assert_eq!(msgs.len(), 2);
        assert!(msgs[1].render_text().ends_with("biology-ch3.pdf"));
    }
}
