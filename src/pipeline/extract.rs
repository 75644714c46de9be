//! Locate and parse the JSON payload inside a free-form model reply.
//!
//! Models asked for "only JSON" still wrap it in prose ("Here are your
//! questions: [...]") or markdown fences. Extraction is deliberately simple:
//! take the span from the first opening bracket to the last closing bracket
//! of the same kind and parse it. Anything smarter would need a stricter
//! prompt contract.
//!
//! [`complete_array_elements`] is the streaming counterpart: it decodes only
//! the array elements that are already closed in a still-growing reply.

use crate::client::OutputSchema;
use crate::error::PipelineFailure;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static RE_ARRAY_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\[.*\]").unwrap());
static RE_OBJECT_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Extract the first bracketed JSON span of the requested shape.
pub fn extract_json(text: &str, schema: OutputSchema) -> Result<Value, PipelineFailure> {
    let re = match schema {
        OutputSchema::Array => &RE_ARRAY_SPAN,
        OutputSchema::Object => &RE_OBJECT_SPAN,
    };
    let (open, close) = schema.brackets();

    let span = re.find(text).ok_or_else(|| {
        PipelineFailure::extraction(format!("no `{open}`…`{close}` span in reply"))
    })?;

    serde_json::from_str(span.as_str())
        .map_err(|e| PipelineFailure::extraction(format!("bracketed span is not valid JSON: {e}")))
}

pub fn extract_array(text: &str) -> Result<Value, PipelineFailure> {
    extract_json(text, OutputSchema::Array)
}

pub fn extract_object(text: &str) -> Result<Value, PipelineFailure> {
    extract_json(text, OutputSchema::Object)
}

/// Decode the closed elements of the first JSON array in a partial reply.
///
/// Scanning starts at the first `[`. Each top-level element counts once its
/// closing bracket (or the following comma, for scalars) has arrived.
/// Decoding stops at the first element that fails to parse, so the result
/// is always a prefix of what a full parse would produce.
pub fn complete_array_elements(text: &str) -> Vec<Value> {
    let Some(start) = text.find('[') else {
        return Vec::new();
    };
    let body = &text[start + 1..];

    let mut elements = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut element_start: Option<usize> = None;

    for (i, c) in body.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                if depth == 0 && element_start.is_none() {
                    element_start = Some(i);
                }
            }
            '{' | '[' => {
                if depth == 0 {
                    element_start = Some(i);
                }
                depth += 1;
            }
            '}' | ']' if depth == 0 => {
                // End of the outer array: flush a trailing scalar, if any.
                if let Some(s) = element_start.take() {
                    if !push_element(&mut elements, &body[s..i]) {
                        return elements;
                    }
                }
                return elements;
            }
            '}' | ']' => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = element_start.take() {
                        if !push_element(&mut elements, &body[s..=i]) {
                            return elements;
                        }
                    }
                }
            }
            ',' if depth == 0 => {
                if let Some(s) = element_start.take() {
                    if !push_element(&mut elements, &body[s..i]) {
                        return elements;
                    }
                }
            }
            c if depth == 0 && element_start.is_none() && !c.is_whitespace() => {
                element_start = Some(i);
            }
            _ => {}
        }
    }

    elements
}

fn push_element(elements: &mut Vec<Value>, raw: &str) -> bool {
    match serde_json::from_str(raw.trim()) {
        Ok(v) => {
            elements.push(v);
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_array_from_prose() {
        let text = r#"Here are your questions: [{"q":1},{"q":2}] Good luck!"#;
        assert_eq!(extract_array(text).unwrap(), json!([{"q":1},{"q":2}]));
    }

    #[test]
    fn extracts_array_inside_markdown_fence() {
        let text = "```json\n[1, 2, 3]\n```";
        assert_eq!(extract_array(text).unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn clean_json_is_returned_unchanged() {
        let x = json!([{"question":"Q","options":["a","b","c","d"],"answer":"a"}]);
        let text = serde_json::to_string(&x).unwrap();
        assert_eq!(extract_array(&text).unwrap(), x);

        let y = json!({"review":"ok","recommendations":"more [practice]"});
        let text = serde_json::to_string(&y).unwrap();
        assert_eq!(extract_object(&text).unwrap(), y);
    }

    #[test]
    fn no_brackets_is_extraction_failure() {
        let err = extract_array("I cannot help with that").unwrap_err();
        assert_eq!(err.stage(), crate::error::FailureStage::Extraction);
        assert!(extract_object("nothing here").is_err());
    }

    #[test]
    fn unparsable_span_is_extraction_failure() {
        let err = extract_array("[not json]").unwrap_err();
        assert!(err.to_string().contains("not valid JSON"), "got: {err}");
    }

    #[test]
    fn greedy_span_covers_trailing_brackets() {
        // First `[` to last `]`: trailing prose with brackets breaks the parse.
        assert!(extract_array("[1, 2] and see [ref]").is_err());
    }

    #[test]
    fn partial_decoder_emits_only_closed_elements() {
        let text = r#"Sure! [{"question":"Q1","options":["a","b","c","d"],"answer":"a"}, {"question":"Q2","opt"#;
        let els = complete_array_elements(text);
        assert_eq!(els.len(), 1);
        assert_eq!(els[0]["question"], "Q1");
    }

    #[test]
    fn partial_decoder_ignores_brackets_inside_strings() {
        let text = r#"[{"question":"What is ] or }?","answer":"x"}, {"question":"\"[\""}"#;
        let els = complete_array_elements(text);
        assert_eq!(els.len(), 2);
        assert_eq!(els[1]["question"], "\"[\"");
    }

    #[test]
    fn partial_decoder_handles_scalars_and_close() {
        assert_eq!(complete_array_elements("[1, 2, 3"), vec![json!(1), json!(2)]);
        assert_eq!(complete_array_elements("[1, 2, 3]"), vec![json!(1), json!(2), json!(3)]);
        assert!(complete_array_elements("no array yet").is_empty());
    }

    #[test]
    fn partial_decoder_is_monotone_over_prefixes() {
        let full = r#"[{"a":1},{"b":[2,3]},{"c":"}"}]"#;
        let mut last = 0;
        for end in 0..=full.len() {
            let n = complete_array_elements(&full[..end]).len();
            assert!(n >= last, "shrunk at {end}");
            last = n;
        }
        assert_eq!(last, 3);
    }
}
