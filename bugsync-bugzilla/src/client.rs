use std::{collections::BTreeMap, time::Duration};

use anyhow::{bail, Context, Result};
use bugsync_domain::Comment;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::debug;

use crate::{
    issue::RawBug,
    settings::{BugzillaSettings, Credential},
    source::{BugQuery, BugSource},
};

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug, PartialEq, Eq)]
enum AuthMode {
    ApiKey { key: String },
    Login { user: String, password: String },
}

pub struct BugzillaClient {
    base_url: String,
    http: Client,
    auth_mode: AuthMode,
}

#[derive(Deserialize)]
struct BugsPayload {
    #[serde(default)]
    bugs: Vec<BugPayload>,
}

#[derive(Deserialize)]
struct BugPayload {
    id: u64,
    component: Option<String>,
    priority: Option<String>,
    status: Option<String>,
    summary: Option<String>,
    #[serde(default)]
    flags: Vec<FlagPayload>,
}

#[derive(Default, Deserialize)]
struct FlagPayload {
    name: Option<String>,
    status: Option<String>,
    requestee: Option<String>,
}

#[derive(Default, Deserialize)]
struct CommentsPayload {
    #[serde(default)]
    bugs: BTreeMap<String, BugComments>,
}

#[derive(Default, Deserialize)]
struct BugComments {
    #[serde(default)]
    comments: Vec<CommentPayload>,
}

#[derive(Default, Deserialize)]
struct CommentPayload {
    creator: Option<String>,
    text: Option<String>,
}

impl BugzillaClient {
    pub fn from_settings(settings: &BugzillaSettings) -> Result<Self> {
        let auth_mode = match &settings.credential {
            Credential::ApiKey(key) => AuthMode::ApiKey { key: key.clone() },
            Credential::Password(password) => AuthMode::Login {
                user: settings.username.clone(),
                password: password.clone(),
            },
        };

        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .with_context(|| "failed to build Bugzilla HTTP client")?;

        Ok(Self {
            base_url: format!("{}/rest", settings.base_uri),
            http,
            auth_mode,
        })
    }

    fn search(&self, query: &BugQuery) -> Result<Vec<RawBug>> {
        let endpoint = format!("{}/bug", self.base_url);
        let params = query.to_params()?;
        debug!(endpoint = %endpoint, params = params.len(), "running bugzilla search");

        let response = self
            .with_auth(self.http.get(endpoint))
            .query(&params)
            .send()
            .with_context(|| "failed to execute Bugzilla search request")?;

        let payload: BugsPayload = decode(response, "search")?;
        Ok(payload.bugs.into_iter().map(into_raw_bug).collect())
    }

    fn bug_comments(&self, bug_id: u64) -> Result<Vec<Comment>> {
        let endpoint = format!("{}/bug/{}/comment", self.base_url, bug_id);
        let response = self
            .with_auth(self.http.get(endpoint))
            .send()
            .with_context(|| format!("failed to fetch comments for bug {bug_id}"))?;

        let payload: CommentsPayload = decode(response, "comment list")?;
        Ok(into_comments(payload, bug_id))
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_mode {
            AuthMode::ApiKey { key } => request.query(&[("Bugzilla_api_key", key)]),
            AuthMode::Login { user, password } => {
                request.query(&[("Bugzilla_login", user), ("Bugzilla_password", password)])
            }
        }
    }
}

impl BugSource for BugzillaClient {
    fn query(&self, query: &BugQuery) -> Result<Vec<RawBug>> {
        self.search(query)
    }

    fn comments(&self, bug_id: u64) -> Result<Vec<Comment>> {
        self.bug_comments(bug_id)
    }
}

fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().unwrap_or_default();
        bail!(
            "bugzilla {} request failed: status={} body={}",
            what,
            status,
            body
        );
    }

    response
        .json()
        .with_context(|| format!("failed to decode Bugzilla {what} response"))
}

fn into_raw_bug(payload: BugPayload) -> RawBug {
    RawBug {
        component: payload.component.unwrap_or_default(),
        priority: payload.priority.unwrap_or_default(),
        status: payload.status.unwrap_or_default(),
        summary: payload.summary.unwrap_or_default(),
        id: payload.id,
        flags: payload.flags.into_iter().filter_map(flag_display).collect(),
    }
}

fn flag_display(flag: FlagPayload) -> Option<String> {
    let name = flag.name.and_then(non_empty)?;
    let status = flag.status.unwrap_or_default();
    match flag.requestee.and_then(non_empty) {
        Some(requestee) => Some(format!("{name}{status}({requestee})")),
        None => Some(format!("{name}{status}")),
    }
}

fn into_comments(payload: CommentsPayload, bug_id: u64) -> Vec<Comment> {
    let Some(bug) = payload.bugs.into_iter().find_map(|(id, comments)| {
        (id.trim() == bug_id.to_string()).then_some(comments)
    }) else {
        return Vec::new();
    };

    bug.comments
        .into_iter()
        .filter_map(|comment| {
            let text = comment.text.and_then(non_empty)?;
            Some(Comment {
                author: comment
                    .creator
                    .and_then(non_empty)
                    .unwrap_or_else(|| "unknown".to_string()),
                text,
            })
        })
        .collect()
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}
