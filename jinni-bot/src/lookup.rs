//! HTTP existence checks and reply text.
//!
//! Each reference maps to one URL to probe and one URL to hand back to the
//! channel. They differ only for GitHub, where the REST API is probed and the
//! web page is linked.

use anyhow::{Context, Result};
use reqwest::redirect::Policy;

use crate::classify::Reference;
use crate::config::{BotConfig, Endpoints};

pub struct Resolver {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl Resolver {
    pub fn new(config: &BotConfig) -> Result<Self> {
        // The first response is the answer; a redirect is not a 200.
        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(Policy::none());
        if let Some(timeout) = config.http_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            endpoints: config.endpoints.clone(),
        })
    }

    /// URL whose status decides whether the reference exists.
    pub fn probe_url(&self, reference: &Reference) -> String {
        match reference {
            Reference::GitHub { owner, repo, number } => format!(
                "{}/repos/{owner}/{repo}/issues/{number}",
                self.endpoints.github_api.trim_end_matches('/')
            ),
            other => self.canonical_url(other),
        }
    }

    /// URL posted to the channel.
    pub fn canonical_url(&self, reference: &Reference) -> String {
        let e = &self.endpoints;
        match reference {
            Reference::Ticket { id, .. } => format!("{}{id}", e.bugview),
            Reference::GitHub { owner, repo, number } => format!(
                "{}/{owner}/{repo}/issues/{number}",
                e.github_web.trim_end_matches('/')
            ),
            Reference::Rfd { number } => {
                format!("{}/{number}/README.md", e.rfd.trim_end_matches('/'))
            }
            Reference::Illumos { id } => format!("{}{id}", e.illumos),
        }
    }

    pub fn changelog_url(&self) -> &str {
        &self.endpoints.changelog
    }

    /// GET the probe URL and return the status code. The body is never read.
    pub async fn status(&self, reference: &Reference) -> Result<u16> {
        let url = self.probe_url(reference);
        let mut req = self.http.get(&url);
        if matches!(reference, Reference::GitHub { .. }) {
            req = req.header(reqwest::header::ACCEPT, "application/vnd.github+json");
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;
        Ok(resp.status().as_u16())
    }

    /// What to say for a reference that came back with `status`, if anything.
    pub fn reply_for(&self, reference: &Reference, status: u16) -> Option<String> {
        match (reference, status) {
            (_, 200) => Some(self.canonical_url(reference)),
            // GitHub answers 403 for rate limiting too; don't call that private.
            (Reference::GitHub { .. }, _) => None,
            (_, 403) => Some(format!("Sorry, {reference} is not public.")),
            _ => None,
        }
    }
}
