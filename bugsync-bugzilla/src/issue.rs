use std::sync::OnceLock;

use bugsync_domain::{
    build_default_description, MappingError, TaskPriority, TaskRecord,
    DEFAULT_DESCRIPTION_LENGTH,
};
use regex::Regex;
use serde::Serialize;

use crate::settings::SERVICE_NAME;

static NEEDINFO_FLAG: OnceLock<Regex> = OnceLock::new();

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawBug {
    pub component: String,
    pub priority: String,
    pub status: String,
    pub summary: String,
    pub id: u64,
    // display form, e.g. `needinfo?(me@example.com)`
    pub flags: Vec<String>,
}

impl RawBug {
    pub fn needs_info_from(&self, user: &str) -> bool {
        let regex = NEEDINFO_FLAG
            .get_or_init(|| Regex::new(r"^needinfo\?\((.+)\)$").expect("needinfo flag regex"));
        self.flags.iter().any(|flag| {
            regex
                .captures(flag.trim())
                .and_then(|captures| captures.get(1))
                .is_some_and(|requestee| requestee.as_str().eq_ignore_ascii_case(user))
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IssueExtras {
    pub url: String,
    pub annotations: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TaskFields {
    pub project: String,
    pub priority: TaskPriority,
    pub annotations: Vec<String>,
    #[serde(rename = "bugzillastatus")]
    pub status: String,
    #[serde(rename = "bugzillaurl")]
    pub url: String,
    #[serde(rename = "bugzillasummary")]
    pub summary: String,
    #[serde(rename = "bugzillabugid")]
    pub bug_id: u64,
}

pub fn map_priority(value: &str) -> Option<TaskPriority> {
    let priority = match value.trim().to_ascii_lowercase().as_str() {
        "unspecified" | "normal" | "medium" => TaskPriority::Medium,
        "lowest" | "low" => TaskPriority::Low,
        "high" | "highest" | "urgent" | "immediate" => TaskPriority::High,
        _ => return None,
    };
    Some(priority)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BugzillaIssue {
    record: RawBug,
    extras: IssueExtras,
    description_length: usize,
    tags: Vec<String>,
}

impl BugzillaIssue {
    pub fn new(record: RawBug, extras: IssueExtras) -> Self {
        Self {
            record,
            extras,
            description_length: DEFAULT_DESCRIPTION_LENGTH,
            tags: Vec::new(),
        }
    }

    pub fn with_description_length(mut self, description_length: usize) -> Self {
        self.description_length = description_length;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn record(&self) -> &RawBug {
        &self.record
    }

    pub fn extras(&self) -> &IssueExtras {
        &self.extras
    }

    pub fn priority(&self) -> Result<TaskPriority, MappingError> {
        map_priority(&self.record.priority).ok_or_else(|| MappingError::UnknownPriority {
            service: SERVICE_NAME,
            issue: self.record.id.to_string(),
            value: self.record.priority.clone(),
        })
    }

    pub fn to_taskwarrior(&self) -> Result<TaskFields, MappingError> {
        Ok(TaskFields {
            project: self.record.component.clone(),
            priority: self.priority()?,
            annotations: self.extras.annotations.clone(),
            status: self.record.status.clone(),
            url: self.extras.url.clone(),
            summary: self.record.summary.clone(),
            bug_id: self.record.id,
        })
    }

    pub fn default_description(&self) -> String {
        build_default_description(
            &self.record.summary,
            &self.extras.url,
            self.record.id,
            self.description_length,
        )
    }

    pub fn taskwarrior_record(&self) -> Result<TaskRecord<TaskFields>, MappingError> {
        Ok(TaskRecord {
            fields: self.to_taskwarrior()?,
            description: self.default_description(),
            tags: self.tags.clone(),
        })
    }
}
