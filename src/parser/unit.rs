//! Unit text parser.
//!
//! Parses one generated unit (systemd INI syntax: `[Section]` headers and
//! `key=value` lines) into an ordered section tree.  Repeated keys are kept
//! as an ordered sequence per section — systemd list options rely on the
//! declaration order, and `Requires=` resolution downstream does too.
//!
//! No semantic validation happens here.

use log::trace;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One `[Section]` with its entries in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSection {
    /// Section name without the brackets, e.g. `Unit`.
    pub name: String,
    /// `(key, value)` pairs in declaration order; repeated keys repeat here.
    pub entries: Vec<(String, String)>,
}

impl UnitSection {
    /// All values for `key`, in declaration order.
    pub fn values<'a, 'k>(&'a self, key: &'k str) -> impl Iterator<Item = &'a str> {
        self.entries
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First value for `key`, if any.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.values(key).next()
    }
}

/// A parsed unit: its name plus the section tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUnit {
    /// The unit (service) name this text was generated for.
    pub name: String,
    pub sections: Vec<UnitSection>,
}

impl ParsedUnit {
    /// Look up a section by name.  The generator never repeats sections, so
    /// the first match is the section.
    pub fn section(&self, name: &str) -> Option<&UnitSection> {
        self.sections.iter().find(|section| section.name == name)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse raw unit text into a [`ParsedUnit`].
///
/// Blank lines and `#`/`;` comment lines are ignored.  Lines outside any
/// section or without a `=` are skipped with a trace log — the generator
/// produced this text, so anything unexpected is its business, not ours.
pub fn parse_unit(name: &str, content: &str) -> ParsedUnit {
    let mut sections: Vec<UnitSection> = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            sections.push(UnitSection {
                name: line[1..line.len() - 1].to_string(),
                entries: Vec::new(),
            });
            continue;
        }

        let Some(section) = sections.last_mut() else {
            trace!("ignoring line outside any section in unit {name}: {line}");
            continue;
        };

        match line.split_once('=') {
            Some((key, value)) => section
                .entries
                .push((key.trim().to_string(), value.trim().to_string())),
            None => trace!("ignoring line without '=' in unit {name}: {line}"),
        }
    }

    ParsedUnit {
        name: name.to_string(),
        sections,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
