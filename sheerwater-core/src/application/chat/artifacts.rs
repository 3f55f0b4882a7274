//! Separates chart output meant for people from text meant for the model.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::domain::types::{Artifact, ContentBlock, ContentItem, ToolCallResult};

/// What the model sees in place of a diverted chart.
pub const CHART_PLACEHOLDER: &str = "chart generated successfully";

/// Recognized link fields, most preferred first.
const CHART_LINK_FIELDS: [&str; 3] = ["html_url", "png_url", "chart_url"];

static INLINE_CHART: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"!\[Chart\]\(data:image/[^;]+;base64,[^)]+\)\s*").ok());

/// The chart link carried by a JSON object text, if any.
pub fn extract_chart_url(text: &str) -> Option<String> {
    let Ok(Value::Object(object)) = serde_json::from_str::<Value>(text.trim()) else {
        return None;
    };
    CHART_LINK_FIELDS.iter().find_map(|field| {
        object
            .get(*field)
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
    })
}

/// Removes legacy inline `![Chart](data:image/...)` markdown from stored text.
pub fn strip_inline_charts(text: &str) -> String {
    match INLINE_CHART.as_ref() {
        Some(pattern) => pattern.replace_all(text, "").into_owned(),
        None => text.to_string(),
    }
}

/// Builds the model-facing tool-result block, moving charts to `artifacts`.
pub fn fold_tool_result(result: ToolCallResult, artifacts: &mut Vec<Artifact>) -> ContentBlock {
    let mut parts = Vec::with_capacity(result.content.len());
    for item in result.content {
        match item {
            ContentItem::Text(text) => match extract_chart_url(&text) {
                Some(url) => {
                    artifacts.push(Artifact::url(url));
                    parts.push(CHART_PLACEHOLDER.to_string());
                }
                None => parts.push(text),
            },
            ContentItem::Image { mime_type, data } => {
                artifacts.push(Artifact::inline_image(&mime_type, &data));
                parts.push(CHART_PLACEHOLDER.to_string());
            }
        }
    }
    ContentBlock::ToolResult {
        tool_use_id: result.call_id,
        content: parts.join("\n"),
        is_error: result.is_error,
    }
}
