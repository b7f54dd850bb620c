//! Compact renderings used by the analysis history list

use crate::model::Analysis;
use serde_json::Value;

const SUMMARY_CHARS: usize = 80;

fn cut(text: &str) -> String {
    text.chars().take(SUMMARY_CHARS).collect()
}

/// First two lines joined by a space, shortened to 80 chars
pub fn truncate_prompt(prompt: &str) -> String {
    let lines: Vec<&str> = prompt.split('\n').collect();
    let head = lines.iter().take(2).copied().collect::<Vec<_>>().join(" ");
    let long = lines.len() > 2 || head.chars().count() > SUMMARY_CHARS;

    let mut out = cut(&head);
    if long {
        out.push_str("...");
    }
    out
}

/// One-line summary of a stored response
pub fn response_summary(response: Option<&Value>) -> String {
    match response {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => {
            let mut out = cut(s);
            if s.chars().count() > SUMMARY_CHARS {
                out.push_str("...");
            }
            out
        }
        Some(other) => format!("{}...", cut(&other.to_string())),
    }
}

/// Analyses whose prompt contains `query`, ignoring case
pub fn search_prompts<'a>(analyses: &'a [Analysis], query: &str) -> Vec<&'a Analysis> {
    let needle = query.to_lowercase();
    analyses
        .iter()
        .filter(|a| {
            a.prompt
                .as_deref()
                .is_some_and(|p| p.to_lowercase().contains(&needle))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncate_prompt() {
        assert_eq!(truncate_prompt("short"), "short");
        assert_eq!(truncate_prompt("one\ntwo"), "one two");
        assert_eq!(truncate_prompt("one\ntwo\nthree"), "one two...");

        let long = "x".repeat(100);
        let truncated = truncate_prompt(&long);
        assert_eq!(truncated.len(), 83);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_response_summary() {
        assert_eq!(response_summary(Some(&json!("brief"))), "brief");
        assert_eq!(response_summary(None), "");

        let long = json!("y".repeat(90));
        assert_eq!(response_summary(Some(&long)).chars().count(), 83);

        assert_eq!(response_summary(Some(&json!({"a": 1}))), "{\"a\":1}...");
    }

    #[test]
    fn test_search_prompts() {
        let analyses = vec![
            Analysis::new("a1", "Summarize the Contract", json!("r")),
            Analysis::new("a2", "List risks", json!("r")),
            Analysis {
                prompt: None,
                ..Analysis::new("a3", "", json!(null))
            },
        ];

        let hits: Vec<_> = search_prompts(&analyses, "contract")
            .into_iter()
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(hits, vec!["a1"]);
        assert_eq!(search_prompts(&analyses, "").len(), 2);
    }
}
