use std::collections::HashSet;

use anyhow::{Context, Result};
use bugsync_config::{BugsyncConfig, ConfigError};
use bugsync_domain::{build_annotations, TaskRecord};
use tracing::debug;

use crate::{
    client::BugzillaClient,
    issue::{BugzillaIssue, IssueExtras, RawBug, TaskFields},
    settings::BugzillaSettings,
    source::{BugQuery, BugSource},
    telemetry,
};

pub struct BugzillaService<S> {
    settings: BugzillaSettings,
    source: S,
}

impl BugzillaService<BugzillaClient> {
    pub fn connect(config: &BugsyncConfig, target: &str) -> Result<Self> {
        let section = config.section(target)?;
        let settings = BugzillaSettings::from_section(section, &config.general)?;
        let client = BugzillaClient::from_settings(&settings)?;
        Ok(Self::new(settings, client))
    }
}

impl<S: BugSource> BugzillaService<S> {
    pub fn new(settings: BugzillaSettings, source: S) -> Self {
        Self { settings, source }
    }

    pub fn from_config(
        config: &BugsyncConfig,
        target: &str,
        source: S,
    ) -> Result<Self, ConfigError> {
        let section = config.section(target)?;
        let settings = BugzillaSettings::from_section(section, &config.general)?;
        Ok(Self::new(settings, source))
    }

    pub fn settings(&self) -> &BugzillaSettings {
        &self.settings
    }

    pub fn issue_for_record(&self, record: RawBug, extras: IssueExtras) -> BugzillaIssue {
        BugzillaIssue::new(record, extras)
            .with_description_length(self.settings.description_length)
            .with_tags(self.settings.add_tags.clone())
    }

    pub fn issues(&self) -> Result<Vec<TaskRecord<TaskFields>>> {
        let bugs = self.fetch_bugs()?;
        debug!(section = %self.settings.target, count = bugs.len(), "mapping bugzilla records");

        bugs.into_iter()
            .map(|bug| -> Result<TaskRecord<TaskFields>> {
                let extras = IssueExtras {
                    url: self.settings.bug_url(bug.id),
                    annotations: self.annotations(bug.id)?,
                };
                let issue = self.issue_for_record(bug, extras);
                Ok(issue.taskwarrior_record()?)
            })
            .collect()
    }

    fn fetch_bugs(&self) -> Result<Vec<RawBug>> {
        let query = self.primary_query();
        let mut bugs = telemetry::timed("query", &self.settings.target, || {
            self.source.query(&query)
        })
        .with_context(|| format!("[{}] bugzilla query failed", self.settings.target))?;

        if self.settings.include_needinfos {
            let query = BugQuery::NeedInfo {
                username: self.settings.username.clone(),
                open_statuses: self.settings.open_statuses.clone(),
            };
            let needinfos = telemetry::timed("needinfo_query", &self.settings.target, || {
                self.source.query(&query)
            })
            .with_context(|| format!("[{}] bugzilla needinfo query failed", self.settings.target))?;

            let mut seen = bugs.iter().map(|bug| bug.id).collect::<HashSet<_>>();
            bugs.extend(needinfos.into_iter().filter(|bug| {
                bug.needs_info_from(&self.settings.username) && seen.insert(bug.id)
            }));
        }

        Ok(bugs)
    }

    fn primary_query(&self) -> BugQuery {
        match &self.settings.query_url {
            Some(url) => BugQuery::Url(url.clone()),
            None => BugQuery::Related {
                username: self.settings.username.clone(),
                open_statuses: self.settings.open_statuses.clone(),
                ignore_cc: self.settings.ignore_cc,
            },
        }
    }

    fn annotations(&self, bug_id: u64) -> Result<Vec<String>> {
        if !self.settings.annotation_comments {
            return Ok(Vec::new());
        }
        let comments = telemetry::timed("comments", &self.settings.target, || {
            self.source.comments(bug_id)
        })
        .with_context(|| format!("failed to load comments for bug {bug_id}"))?;
        Ok(build_annotations(&comments, self.settings.annotation_length))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use anyhow::{anyhow, Result};
    use bugsync_config::{BugsyncConfig, ConfigError};
    use bugsync_domain::{Comment, MappingError};
    use serde_json::json;

    use super::BugzillaService;
    use crate::{
        issue::{IssueExtras, RawBug},
        source::{BugQuery, BugSource},
    };

    #[derive(Default)]
    struct FakeBugzilla {
        related: Vec<RawBug>,
        needinfos: Vec<RawBug>,
        comments: Vec<Comment>,
        fail: bool,
        queries: RefCell<Vec<BugQuery>>,
    }

    impl FakeBugzilla {
        fn with_record(record: RawBug) -> Self {
            Self {
                related: vec![record],
                ..Self::default()
            }
        }
    }

    impl BugSource for FakeBugzilla {
        fn query(&self, query: &BugQuery) -> Result<Vec<RawBug>> {
            self.queries.borrow_mut().push(query.clone());
            if self.fail {
                return Err(anyhow!("connection refused"));
            }
            match query {
                BugQuery::NeedInfo { .. } => Ok(self.needinfos.clone()),
                _ => Ok(self.related.clone()),
            }
        }

        fn comments(&self, _bug_id: u64) -> Result<Vec<Comment>> {
            Ok(self.comments.clone())
        }
    }

    fn arbitrary_record() -> RawBug {
        RawBug {
            component: "Something".to_string(),
            priority: "urgent".to_string(),
            status: "NEW".to_string(),
            summary: "This is the issue summary".to_string(),
            id: 1234567,
            flags: Vec::new(),
        }
    }

    fn config(extra: &str) -> BugsyncConfig {
        BugsyncConfig::from_yaml_str(&format!(
            "general:\n  targets: [mybz]\nmybz:\n  service: bugzilla\n  bugzilla.base_uri: http://one.com/\n  bugzilla.username: hello\n  bugzilla.password: there\n{extra}"
        ))
        .expect("config")
    }

    fn service(extra: &str, source: FakeBugzilla) -> BugzillaService<FakeBugzilla> {
        BugzillaService::from_config(&config(extra), "mybz", source).expect("service")
    }

    #[test]
    fn produces_full_task_records() {
        let service = service("", FakeBugzilla::with_record(arbitrary_record()));
        let issues = service.issues().expect("issues");

        assert_eq!(issues.len(), 1);
        assert_eq!(
            serde_json::to_value(&issues[0]).expect("json"),
            json!({
                "annotations": [],
                "bugzillabugid": 1234567,
                "bugzillastatus": "NEW",
                "bugzillasummary": "This is the issue summary",
                "bugzillaurl": "http://one.com/show_bug.cgi?id=1234567",
                "description": "(bw)Is#1234567 - This is the issue summary .. http://one.com/show_bug.cgi?id=1234567",
                "priority": "H",
                "project": "Something",
                "tags": [],
            })
        );
    }

    #[test]
    fn passes_extras_through_when_mapping_a_record() {
        let service = service("", FakeBugzilla::default());
        let extras = IssueExtras {
            url: "http://path/to/issue/".to_string(),
            annotations: vec!["Two".to_string()],
        };

        let fields = service
            .issue_for_record(arbitrary_record(), extras.clone())
            .to_taskwarrior()
            .expect("fields");
        assert_eq!(fields.url, extras.url);
        assert_eq!(fields.annotations, extras.annotations);
    }

    #[test]
    fn runs_related_query_by_default() {
        let service = service("  bugzilla.ignore_cc: true\n", FakeBugzilla::default());
        service.issues().expect("issues");

        let queries = service.source.queries.borrow();
        assert_eq!(queries.len(), 1);
        assert!(matches!(
            &queries[0],
            BugQuery::Related { username, ignore_cc: true, .. } if username == "hello"
        ));
    }

    #[test]
    fn uses_saved_search_url_when_configured() {
        let service = service(
            "  bugzilla.query_url: https://one.com/buglist.cgi?product=Core\n",
            FakeBugzilla::default(),
        );
        service.issues().expect("issues");

        let queries = service.source.queries.borrow();
        assert_eq!(
            queries[0],
            BugQuery::Url("https://one.com/buglist.cgi?product=Core".to_string())
        );
    }

    #[test]
    fn merges_needinfo_bugs_without_duplicates() {
        let mut asked = arbitrary_record();
        asked.id = 99;
        asked.flags = vec!["needinfo?(hello)".to_string()];
        let mut duplicate = arbitrary_record();
        duplicate.flags = vec!["needinfo?(hello)".to_string()];
        let mut unrelated = arbitrary_record();
        unrelated.id = 100;
        unrelated.flags = vec!["needinfo?(someone-else)".to_string()];

        let source = FakeBugzilla {
            related: vec![arbitrary_record()],
            needinfos: vec![duplicate, asked, unrelated],
            ..FakeBugzilla::default()
        };
        let service = service("  bugzilla.include_needinfos: true\n", source);

        let ids = service
            .issues()
            .expect("issues")
            .into_iter()
            .map(|issue| issue.fields.bug_id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![1234567, 99]);
    }

    #[test]
    fn annotates_with_comments_and_adds_tags() {
        let source = FakeBugzilla {
            related: vec![arbitrary_record()],
            comments: vec![Comment {
                author: "alice".to_string(),
                text: "Reproduced on the nightly build".to_string(),
            }],
            ..FakeBugzilla::default()
        };
        let service = service(
            "  bugzilla.add_tags: work, bugzilla\n  bugzilla.annotation_length: 10\n",
            source,
        );

        let issues = service.issues().expect("issues");
        assert_eq!(issues[0].fields.annotations, vec!["@alice - Reproduced..."]);
        assert_eq!(issues[0].tags, vec!["work", "bugzilla"]);
    }

    #[test]
    fn skips_comments_when_disabled() {
        let source = FakeBugzilla {
            related: vec![arbitrary_record()],
            comments: vec![Comment {
                author: "alice".to_string(),
                text: "ignored".to_string(),
            }],
            ..FakeBugzilla::default()
        };
        let service = service("  bugzilla.annotation_comments: false\n", source);

        let issues = service.issues().expect("issues");
        assert!(issues[0].fields.annotations.is_empty());
    }

    #[test]
    fn fails_loudly_on_unknown_priority() {
        let mut record = arbitrary_record();
        record.priority = "P1".to_string();
        let service = service("", FakeBugzilla::with_record(record));

        let error = service.issues().expect_err("unknown priority");
        assert!(matches!(
            error.downcast_ref::<MappingError>(),
            Some(MappingError::UnknownPriority { value, .. }) if value == "P1"
        ));
    }

    #[test]
    fn reports_source_failures_with_target() {
        let source = FakeBugzilla {
            fail: true,
            ..FakeBugzilla::default()
        };
        let service = service("", source);

        let error = service.issues().expect_err("query failure");
        assert_eq!(error.to_string(), "[mybz] bugzilla query failed");
        assert!(format!("{error:#}").contains("connection refused"));
    }

    #[test]
    fn rejects_invalid_target_configuration() {
        let config = BugsyncConfig::from_yaml_str(
            "mybz:\n  bugzilla.base_uri: http://one.com/\n  bugzilla.api_key: '123'\n",
        )
        .expect("config");

        let error = BugzillaService::from_config(&config, "mybz", FakeBugzilla::default())
            .err()
            .expect("invalid config");
        assert_eq!(error.to_string(), "[mybz] has no 'bugzilla.username'");

        let error = BugzillaService::from_config(&config, "other", FakeBugzilla::default())
            .err()
            .expect("unknown target");
        assert_eq!(error, ConfigError::UnknownTarget("other".to_string()));
    }

    #[test]
    fn connect_surfaces_config_errors() {
        let config = BugsyncConfig::from_yaml_str("mybz:\n  bugzilla.username: me\n")
            .expect("config");
        let error = BugzillaService::connect(&config, "mybz")
            .err()
            .expect("missing base uri");
        assert!(error.downcast_ref::<ConfigError>().is_some());
    }
}
