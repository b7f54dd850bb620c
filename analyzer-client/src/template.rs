//! Prompt templates: binding a selection to the draft, and variable preview

use crate::model::PromptTemplate;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Variables the backend knows how to fill
pub const VARIABLE_HINTS: [&str; 2] = ["{document_content}", "{filename}"];

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(.*?)\}").expect("placeholder pattern is valid"));

/// Resolve the selected template into the draft prompt.
///
/// No selection leaves the draft alone. A selection that is not in the
/// catalog (yet) clears it. Returns whether the draft was written.
pub fn bind_template(
    selected: Option<&str>,
    templates: &[PromptTemplate],
    draft: &mut String,
) -> bool {
    let Some(id) = selected.filter(|id| !id.is_empty()) else {
        return false;
    };

    *draft = templates
        .iter()
        .find(|t| t.id == id)
        .map(|t| t.content.clone())
        .unwrap_or_default();
    true
}

/// Substitute `{name}` placeholders that have a value; unknown ones stay as-is
pub fn render_preview(template: &str, variables: &HashMap<String, String>) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures| match variables.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Parse `key=value` pairs, skipping anything without `=`
pub fn parse_variables<'a>(pairs: impl IntoIterator<Item = &'a str>) -> HashMap<String, String> {
    pairs
        .into_iter()
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .collect()
}
