pub mod client;
pub mod issue;
pub mod service;
pub mod settings;
pub mod source;
mod telemetry;

pub use client::BugzillaClient;
pub use issue::{map_priority, BugzillaIssue, IssueExtras, RawBug, TaskFields};
pub use service::BugzillaService;
pub use settings::{
    option_key, validate_config, BugzillaSettings, Credential, DEFAULT_OPEN_STATUSES,
    SERVICE_NAME,
};
pub use source::{BugQuery, BugSource, INCLUDE_FIELDS};
