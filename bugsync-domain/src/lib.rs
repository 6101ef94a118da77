use std::fmt;

use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_DESCRIPTION_LENGTH: usize = 35;
pub const DEFAULT_ANNOTATION_LENGTH: usize = 45;

const DESCRIPTION_PREFIX: &str = "(bw)";
const ISSUE_MARKUP: &str = "Is";
const TRUNCATION_MARKER: &str = "...";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TaskPriority {
    #[serde(rename = "H")]
    High,
    #[serde(rename = "M")]
    Medium,
    #[serde(rename = "L")]
    Low,
}

impl TaskPriority {
    pub fn code(self) -> &'static str {
        match self {
            Self::High => "H",
            Self::Medium => "M",
            Self::Low => "L",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("unknown {service} priority '{value}' on issue {issue}")]
    UnknownPriority {
        service: &'static str,
        issue: String,
        value: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TaskRecord<F> {
    #[serde(flatten)]
    pub fields: F,
    pub description: String,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Comment {
    pub author: String,
    pub text: String,
}

pub fn build_default_description(
    summary: &str,
    url: &str,
    number: impl fmt::Display,
    max_summary_len: usize,
) -> String {
    format!(
        "{DESCRIPTION_PREFIX}{ISSUE_MARKUP}#{number} - {} .. {url}",
        truncate_chars(summary, max_summary_len)
    )
}

pub fn build_annotations(comments: &[Comment], annotation_length: usize) -> Vec<String> {
    comments
        .iter()
        .map(|comment| {
            let text = comment.text.split_whitespace().collect::<Vec<_>>().join(" ");
            let shortened = if text.chars().count() > annotation_length {
                format!("{}{TRUNCATION_MARKER}", truncate_chars(&text, annotation_length))
            } else {
                text
            };
            format!("@{} - {}", comment.author.trim(), shortened)
        })
        .collect()
}

pub fn truncate_chars(value: &str, max_len: usize) -> &str {
    match value.char_indices().nth(max_len) {
        Some((index, _)) => &value[..index],
        None => value,
    }
}
