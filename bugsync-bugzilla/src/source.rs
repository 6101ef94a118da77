use anyhow::{Context, Result};
use bugsync_domain::Comment;
use reqwest::Url;

use crate::issue::RawBug;

pub const INCLUDE_FIELDS: [&str; 6] = ["id", "component", "priority", "status", "summary", "flags"];

/// Remote side of the adapter: anything able to run bug searches.
pub trait BugSource {
    fn query(&self, query: &BugQuery) -> Result<Vec<RawBug>>;

    fn comments(&self, _bug_id: u64) -> Result<Vec<Comment>> {
        Ok(Vec::new())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BugQuery {
    Related {
        username: String,
        open_statuses: Vec<String>,
        ignore_cc: bool,
    },
    NeedInfo {
        username: String,
        open_statuses: Vec<String>,
    },
    // saved search copied from the Bugzilla UI
    Url(String),
}

impl BugQuery {
    pub fn to_params(&self) -> Result<Vec<(String, String)>> {
        let mut params = Vec::new();
        match self {
            Self::Related {
                username,
                open_statuses,
                ignore_cc,
            } => {
                params.push(param("query_format", "advanced"));
                params.push(param("email1", username));
                params.push(param("emailtype1", "equals"));
                let mut roles = vec!["assigned_to", "reporter", "qa_contact"];
                if !*ignore_cc {
                    roles.push("cc");
                }
                params.extend(roles.into_iter().map(|role| param(&format!("email{role}1"), "1")));
                push_statuses(&mut params, open_statuses);
            }
            Self::NeedInfo {
                username,
                open_statuses,
            } => {
                params.push(param("query_format", "advanced"));
                params.push(param("f1", "flagtypes.name"));
                params.push(param("o1", "equals"));
                params.push(param("v1", "needinfo?"));
                params.push(param("f2", "requestees.login_name"));
                params.push(param("o2", "equals"));
                params.push(param("v2", username));
                push_statuses(&mut params, open_statuses);
            }
            Self::Url(url) => {
                let parsed = Url::parse(url)
                    .with_context(|| format!("invalid bugzilla query_url '{url}'"))?;
                params.extend(
                    parsed
                        .query_pairs()
                        .filter(|(key, _)| key != "include_fields")
                        .map(|(key, value)| (key.into_owned(), value.into_owned())),
                );
            }
        }
        params.push(param("include_fields", &INCLUDE_FIELDS.join(",")));
        Ok(params)
    }
}

fn push_statuses(params: &mut Vec<(String, String)>, statuses: &[String]) {
    params.extend(statuses.iter().map(|status| param("bug_status", status)));
}

fn param(key: &str, value: &str) -> (String, String) {
    (key.to_string(), value.to_string())
}
