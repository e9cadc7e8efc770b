//! IRC line parsing and serialization.
//!
//! Format: `[:<prefix>] <command> [<params>] [:<trailing>]`. IRCv3 tags
//! (`@k=v;...`) are accepted and discarded; a bot has no use for them.

use std::fmt;

/// A single parsed IRC line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl Message {
    /// Build an outgoing message with no prefix.
    pub fn new(command: &str, params: Vec<String>) -> Self {
        Self {
            prefix: None,
            command: command.to_string(),
            params,
        }
    }

    /// Parse a raw line. Returns `None` for blank or malformed input.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        if let Some(tagged) = rest.strip_prefix('@') {
            let space = tagged.find(' ')?;
            rest = tagged[space + 1..].trim_start();
        }

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let space = stripped.find(' ')?;
            let prefix = stripped[..space].to_string();
            rest = stripped[space + 1..].trim_start();
            Some(prefix)
        } else {
            None
        };

        let (head, trailing) = match rest.find(" :") {
            Some(pos) => (&rest[..pos], Some(&rest[pos + 2..])),
            None => (rest, None),
        };

        let mut parts = head.split_whitespace();
        let command = parts.next()?.to_ascii_uppercase();
        let mut params: Vec<String> = parts.map(str::to_string).collect();
        if let Some(t) = trailing {
            params.push(t.to_string());
        }

        Some(Self {
            prefix,
            command,
            params,
        })
    }

    /// Nick portion of the prefix (`nick!user@host` → `nick`).
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        let nick = prefix.split('!').next().unwrap_or(prefix);
        if nick.is_empty() { None } else { Some(nick) }
    }

    /// True when the prefix names a user rather than a server.
    pub fn from_user(&self) -> bool {
        self.prefix.as_deref().is_some_and(|p| p.contains('!'))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&self.command)?;
        if let Some((last, init)) = self.params.split_last() {
            for p in init {
                write!(f, " {p}")?;
            }
            // The last of several params is always sent as trailing text.
            if !init.is_empty() || last.is_empty() || last.contains(' ') || last.starts_with(':') {
                write!(f, " :{last}")?;
            } else {
                write!(f, " {last}")?;
            }
        }
        Ok(())
    }
}

/// Strip CR/LF so user-influenced text can never inject a second command.
pub fn sanitize(text: &str) -> String {
    text.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}
