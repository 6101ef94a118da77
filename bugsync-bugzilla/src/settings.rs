use bugsync_config::{normalize_base_uri, ConfigError, GeneralConfig, ServiceSection};
use tracing::warn;

pub const SERVICE_NAME: &str = "bugzilla";

pub const DEFAULT_OPEN_STATUSES: [&str; 10] = [
    "NEW",
    "ASSIGNED",
    "NEEDINFO",
    "ON_DEV",
    "MODIFIED",
    "POST",
    "REOPENED",
    "ON_QA",
    "FAILS_QA",
    "PASSES_QA",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credential {
    ApiKey(String),
    Password(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BugzillaSettings {
    pub target: String,
    pub base_uri: String,
    pub username: String,
    pub credential: Credential,
    pub open_statuses: Vec<String>,
    pub ignore_cc: bool,
    pub include_needinfos: bool,
    pub query_url: Option<String>,
    pub annotation_comments: bool,
    pub add_tags: Vec<String>,
    pub description_length: usize,
    pub annotation_length: usize,
}

pub fn option_key(option: &str) -> String {
    format!("{SERVICE_NAME}.{option}")
}

pub fn validate_config(section: &ServiceSection) -> Result<(), ConfigError> {
    let result = check_required(section);
    if let Err(error) = &result {
        warn!(section = %section.target, %error, "invalid bugzilla configuration");
    }
    result
}

fn check_required(section: &ServiceSection) -> Result<(), ConfigError> {
    for option in ["username", "base_uri"] {
        section.require(&option_key(option))?;
    }
    section.require_either(&option_key("password"), &option_key("api_key"))
}

impl BugzillaSettings {
    pub fn from_section(
        section: &ServiceSection,
        general: &GeneralConfig,
    ) -> Result<Self, ConfigError> {
        if let Some(service) = section.service() {
            if service != SERVICE_NAME {
                return Err(ConfigError::InvalidValue {
                    target: section.target.clone(),
                    key: "service".to_string(),
                    value: service.to_string(),
                    reason: format!("expected '{SERVICE_NAME}'"),
                });
            }
        }
        validate_config(section)?;

        let base_uri_key = option_key("base_uri");
        let raw_base_uri = section.require(&base_uri_key)?;
        let base_uri =
            normalize_base_uri(raw_base_uri).ok_or_else(|| ConfigError::InvalidValue {
                target: section.target.clone(),
                key: base_uri_key.clone(),
                value: raw_base_uri.to_string(),
                reason: "expected a host or URL".to_string(),
            })?;

        let credential = match section.get(&option_key("api_key")) {
            Some(key) => Credential::ApiKey(key.to_string()),
            None => Credential::Password(section.require(&option_key("password"))?.to_string()),
        };

        let mut open_statuses = section.get_list(&option_key("open_statuses"));
        if open_statuses.is_empty() {
            open_statuses = DEFAULT_OPEN_STATUSES.iter().map(|s| s.to_string()).collect();
        }

        Ok(Self {
            target: section.target.clone(),
            base_uri,
            username: section.require(&option_key("username"))?.to_string(),
            credential,
            open_statuses,
            ignore_cc: section.get_bool(&option_key("ignore_cc"), false)?,
            include_needinfos: section.get_bool(&option_key("include_needinfos"), false)?,
            query_url: section.get(&option_key("query_url")).map(str::to_string),
            annotation_comments: section
                .get_bool(&option_key("annotation_comments"), general.annotation_comments)?,
            add_tags: section.get_list(&option_key("add_tags")),
            description_length: section
                .get_usize(&option_key("description_length"), general.description_length)?,
            annotation_length: section
                .get_usize(&option_key("annotation_length"), general.annotation_length)?,
        })
    }

    pub fn bug_url(&self, bug_id: u64) -> String {
        format!("{}/show_bug.cgi?id={bug_id}", self.base_uri)
    }
}
