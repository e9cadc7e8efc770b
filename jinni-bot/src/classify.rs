//! Message classification.
//!
//! Every pattern is applied independently, so one line can yield tickets,
//! GitHub issues, RFDs and illumos bugs at once. Each pattern contributes at
//! most `max_references` matches.

use std::collections::HashSet;
use std::fmt;

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::BotConfig;
use crate::util;

/// Something a chat line pointed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Issue tracker ticket such as `OS-1234`. `pasted` is set when the
    /// ticket ID was the tail of a bugview URL already in the message.
    Ticket { id: String, pasted: bool },
    GitHub { owner: String, repo: String, number: u64 },
    /// Four-digit, zero-padded RFD number.
    Rfd { number: String },
    Illumos { id: u64 },
}

impl Reference {
    /// Holdout key for this reference.
    pub fn key(&self) -> String {
        match self {
            Reference::Ticket { id, .. } => id.clone(),
            Reference::GitHub { owner, repo, number } => format!("{owner}/{repo}#{number}"),
            Reference::Rfd { number } => format!("rfd_{number}"),
            Reference::Illumos { id } => format!("illumos_{id}"),
        }
    }

    pub fn pasted(&self) -> bool {
        matches!(self, Reference::Ticket { pasted: true, .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Reference::Ticket { .. } => "ticket",
            Reference::GitHub { .. } => "github",
            Reference::Rfd { .. } => "rfd",
            Reference::Illumos { .. } => "illumos",
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Ticket { id, .. } => f.write_str(id),
            Reference::GitHub { owner, repo, number } => write!(f, "{owner}/{repo}#{number}"),
            Reference::Rfd { number } => write!(f, "RFD {number}"),
            Reference::Illumos { id } => write!(f, "illumos #{id}"),
        }
    }
}

/// Result of classifying one line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classified {
    pub references: Vec<Reference>,
    pub changelog: bool,
}

impl Classified {
    pub fn is_empty(&self) -> bool {
        self.references.is_empty() && !self.changelog
    }
}

pub struct Classifier {
    ticket: Regex,
    github: Regex,
    rfd: Regex,
    illumos: Regex,
    changelog: Regex,
    max_references: usize,
    github_owner: String,
}

impl Classifier {
    pub fn new(nickname: &str, config: &BotConfig) -> Result<Self> {
        // Accept the bugview URL over either scheme, as users paste both.
        let bugview = config.endpoints.bugview.as_str();
        let bugview = bugview
            .strip_prefix("https://")
            .or_else(|| bugview.strip_prefix("http://"))
            .unwrap_or(bugview);
        let ticket = format!(r"(https?://{})?\b([A-Z]+-\d+)\b", regex::escape(bugview));

        Ok(Self {
            ticket: Regex::new(&ticket).context("ticket pattern")?,
            github: Regex::new(r"\b(?:([\w.-]+)/)?([\w.-]+)#(\d+)\b").context("github pattern")?,
            rfd: Regex::new(r"(?i)\bRFD\s?(\d{1,4})\b").context("rfd pattern")?,
            illumos: Regex::new(r"(?i)\billumos[\s#-]?(\d+)\b").context("illumos pattern")?,
            changelog: Regex::new(&format!(r"(?i)^{}:? changelog", regex::escape(nickname)))
                .context("changelog pattern")?,
            max_references: config.max_references,
            github_owner: config.github_owner.clone(),
        })
    }

    pub fn classify(&self, text: &str) -> Classified {
        Classified {
            references: self.references(text),
            changelog: self.is_changelog(text),
        }
    }

    pub fn is_changelog(&self, text: &str) -> bool {
        self.changelog.is_match(text)
    }

    /// All references in `text`, in pattern order: tickets, GitHub, RFDs, illumos.
    pub fn references(&self, text: &str) -> Vec<Reference> {
        let mut out = Vec::new();
        out.extend(self.tickets(text));
        out.extend(self.github_issues(text));
        out.extend(self.rfds(text));
        out.extend(self.illumos_bugs(text));
        out
    }

    /// A ticket counts as pasted if any bugview URL in the line names it,
    /// so a bare mention next to the pasted link is not looked up either.
    fn tickets(&self, text: &str) -> Vec<Reference> {
        let pasted: HashSet<&str> = self
            .ticket
            .captures_iter(text)
            .filter(|caps| caps.get(1).is_some())
            .filter_map(|caps| caps.get(2).map(|m| m.as_str()))
            .collect();

        self.ticket
            .captures_iter(text)
            .take(self.max_references)
            .map(|caps| {
                let id = &caps[2];
                Reference::Ticket {
                    id: id.to_string(),
                    pasted: pasted.contains(id),
                }
            })
            .collect()
    }

    fn github_issues<'a>(&'a self, text: &'a str) -> impl Iterator<Item = Reference> + 'a {
        self.github
            .captures_iter(text)
            .filter(|caps| !caps[2].eq_ignore_ascii_case("illumos"))
            .filter_map(|caps| {
                let number = caps[3].parse().ok()?;
                let owner = caps
                    .get(1)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_else(|| self.github_owner.clone());
                Some(Reference::GitHub {
                    owner,
                    repo: caps[2].to_string(),
                    number,
                })
            })
            .take(self.max_references)
    }

    fn rfds<'a>(&'a self, text: &'a str) -> impl Iterator<Item = Reference> + 'a {
        self.rfd
            .captures_iter(text)
            .take(self.max_references)
            .map(|caps| Reference::Rfd {
                number: util::rfd_number(&caps[1]),
            })
    }

    fn illumos_bugs<'a>(&'a self, text: &'a str) -> impl Iterator<Item = Reference> + 'a {
        self.illumos
            .captures_iter(text)
            .filter_map(|caps| caps[1].parse().ok())
            .take(self.max_references)
            .map(|id| Reference::Illumos { id })
    }
}
