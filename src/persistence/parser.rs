//! Line grammar of project files.
//!
//! A project file is a sequence of `[Type:Name]` section headers, each
//! followed by `key=value` lines, and trailing `|`-separated socket and link
//! records. Blank lines and `#` comments are ignored.

use std::sync::LazyLock;

use regex::Regex;

static SECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[\s*(\w+)\s*:\s*(\w+)\s*\]$").expect("Invalid section regex")
});

/// Kind of a `|`-separated record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Socket served by a machine
    Sock,
    /// Plug attached to a named socket
    Link,
    /// Machine plug on the emulator's user-mode network
    UserLink,
}

impl LinkKind {
    pub fn keyword(self) -> &'static str {
        match self {
            LinkKind::Sock => "sock",
            LinkKind::Link => "link",
            LinkKind::UserLink => "userlink",
        }
    }

    fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "sock" => Some(LinkKind::Sock),
            "link" => Some(LinkKind::Link),
            "userlink" => Some(LinkKind::UserLink),
            _ => None,
        }
    }
}

/// `kind|owner|sockname|model|mac|vlan`; trailing fields may be empty or missing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    pub kind: LinkKind,
    pub owner: String,
    pub sockname: String,
    pub model: String,
    pub mac: String,
    pub vlan: Option<u32>,
}

impl LinkRecord {
    /// Record in its on-disk form
    pub fn to_line(&self) -> String {
        let vlan = self.vlan.map(|v| v.to_string()).unwrap_or_default();
        [
            self.kind.keyword(),
            self.owner.as_str(),
            self.sockname.as_str(),
            self.model.as_str(),
            self.mac.as_str(),
            vlan.as_str(),
        ]
        .join("|")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Section { kind: String, name: String },
    Param(String),
    Link(LinkRecord),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown record type '{0}'")]
    UnknownRecord(String),
    #[error("record without owner")]
    MissingOwner,
    #[error("invalid vlan '{0}'")]
    InvalidVlan(String),
    #[error("unrecognized line")]
    Unrecognized,
}

/// Classify one line. `Ok(None)` is returned for blank lines and comments.
pub fn parse_line(line: &str) -> Result<Option<Record>, ParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    if trimmed.starts_with('[') {
        let caps = SECTION.captures(trimmed).ok_or(ParseError::Unrecognized)?;
        return Ok(Some(Record::Section {
            kind: caps[1].to_string(),
            name: caps[2].to_string(),
        }));
    }

    // A `|` before any `=` marks a record; values may contain `|` themselves
    let pipe = trimmed.find('|');
    let eq = trimmed.find('=');
    match (pipe, eq) {
        (Some(p), Some(e)) if e < p => Ok(Some(Record::Param(trimmed.to_string()))),
        (Some(_), _) => parse_link(trimmed).map(|r| Some(Record::Link(r))),
        (None, Some(_)) => Ok(Some(Record::Param(trimmed.to_string()))),
        (None, None) => Err(ParseError::Unrecognized),
    }
}

fn parse_link(line: &str) -> Result<LinkRecord, ParseError> {
    let mut fields = line.split('|').map(str::trim);
    let keyword = fields.next().unwrap_or_default();
    let kind =
        LinkKind::from_keyword(keyword).ok_or_else(|| ParseError::UnknownRecord(keyword.to_string()))?;

    let owner = fields.next().unwrap_or_default().to_string();
    if owner.is_empty() {
        return Err(ParseError::MissingOwner);
    }
    let sockname = fields.next().unwrap_or_default().to_string();
    let model = fields.next().unwrap_or_default().to_string();
    let mac = fields.next().unwrap_or_default().to_string();
    let vlan = match fields.next().unwrap_or_default() {
        "" => None,
        v => Some(v.parse().map_err(|_| ParseError::InvalidVlan(v.to_string()))?),
    };

    Ok(LinkRecord {
        kind,
        owner,
        sockname,
        model,
        mac,
        vlan,
    })
}
