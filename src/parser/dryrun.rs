//! Dry-run output parser.
//!
//! A generator dry-run reports two things at once:
//!
//! - **stdout**: the units it generated, as `---<unit-name>---` markers each
//!   followed by the generated unit text.  These are the valid quadlets.
//! - **stderr**: diagnostics.  The `Loading source unit file <path>` lines
//!   enumerate every file the generator attempted, valid or not; any loaded
//!   path without a generated unit becomes an error-state quadlet.
//!
//! The parser is single-use: it consumes its captured output once and
//! refuses a second `parse()`.

use std::path::Path;

use log::warn;
use regex::Regex;
use uuid::Uuid;

use crate::errors::{QuadletError, QuadletResult};
use crate::model::{Quadlet, QuadletState, QuadletType, QuadletVariant, RunResult};
use crate::parser::extension::quadlet_type_from_path;
use crate::parser::service_kind::{ServiceKind, classify_service_kind};
use crate::parser::unit::{ParsedUnit, parse_unit};

// Matches lines such as
// `quadlet-generator[11695]: Loading source unit file /home/core/.config/containers/systemd/nginx.image`
const STDERR_LOAD_PATTERN: &str = r"Loading source unit file (.+)";

// ---------------------------------------------------------------------------
// DryRunParser
// ---------------------------------------------------------------------------

/// Parses one captured dry-run into the typed quadlet list.
pub struct DryRunParser {
    content: RunResult,
    load_line: Regex,
    parsed: bool,
}

impl DryRunParser {
    pub fn new(content: RunResult) -> Self {
        Self {
            content,
            load_line: Regex::new(STDERR_LOAD_PATTERN).expect("load pattern is valid"),
            parsed: false,
        }
    }

    /// Parse the captured output.
    ///
    /// Returns valid quadlets first (stdout block order), then synthesized
    /// error entries (stderr line order).  A load line without an absolute
    /// path is a format violation that aborts the whole parse — partial
    /// trust in mangled generator output is never granted.
    pub fn parse(&mut self) -> QuadletResult<Vec<Quadlet>> {
        if self.parsed {
            return Err(QuadletError::AlreadyParsed);
        }
        self.parsed = true;

        let (mut quadlets, units) = self.parse_stdout();
        resolve_requires(&mut quadlets, &units);

        let errors = self.parse_stderr(&quadlets)?;
        quadlets.extend(errors);
        Ok(quadlets)
    }

    // -----------------------------------------------------------------------
    // stdout: generated units
    // -----------------------------------------------------------------------

    /// Split stdout into `---<name>---` blocks and build one valid quadlet
    /// per block.  The parsed section trees are returned alongside for the
    /// `Requires=` resolution pass.
    fn parse_stdout(&self) -> (Vec<Quadlet>, Vec<ParsedUnit>) {
        let mut blocks: Vec<(String, Vec<&str>)> = Vec::new();

        for line in self.content.stdout.lines() {
            if let Some(name) = block_marker(line) {
                blocks.push((name.to_string(), Vec::new()));
            } else if let Some((_, lines)) = blocks.last_mut() {
                lines.push(line);
            }
            // Lines before the first marker are preamble; ignore them.
        }

        let mut quadlets = Vec::new();
        let mut units = Vec::new();

        for (service_name, lines) in blocks {
            let text = lines.join("\n").trim().to_string();
            let unit = parse_unit(&service_name, &text);

            let path = unit
                .section("Unit")
                .and_then(|section| section.first("SourcePath"))
                .unwrap_or_default()
                .to_string();

            let kind = match quadlet_type_from_path(&path) {
                Ok(kind) => kind,
                Err(err) => {
                    warn!("skipping generated unit {service_name}: {err}");
                    continue;
                }
            };

            quadlets.push(Quadlet {
                id: Uuid::new_v4(),
                variant: build_variant(kind, &path, Some(&unit)),
                path,
                kind,
                state: QuadletState::Unknown,
                service: Some(service_name),
                requires: Vec::new(),
                content: text,
            });
            units.push(unit);
        }

        (quadlets, units)
    }

    // -----------------------------------------------------------------------
    // stderr: attempted loads
    // -----------------------------------------------------------------------

    /// Synthesize an error-state quadlet for every loaded path that has no
    /// valid entry.
    fn parse_stderr(&self, valid: &[Quadlet]) -> QuadletResult<Vec<Quadlet>> {
        let mut errors = Vec::new();

        for line in self.content.stderr.lines() {
            let Some(captures) = self.load_line.captures(line) else {
                continue;
            };

            let path = captures[1].trim();
            if !Path::new(path).is_absolute() {
                return Err(QuadletError::MalformedLoadLine(line.to_string()));
            }

            if valid.iter().any(|quadlet| quadlet.path == path) {
                continue;
            }

            let kind = match quadlet_type_from_path(path) {
                Ok(kind) => kind,
                Err(err) => {
                    warn!("skipping loaded file {path}: {err}");
                    continue;
                }
            };

            errors.push(Quadlet {
                id: Uuid::new_v4(),
                variant: build_variant(kind, path, None),
                path: path.to_string(),
                kind,
                state: QuadletState::Error,
                // no corresponding service, and requires cannot be detected
                service: None,
                requires: Vec::new(),
                content: String::new(),
            });
        }

        Ok(errors)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Recognize a `---<unit-name>---` marker line; returns the trimmed name.
fn block_marker(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.len() >= 6 && line.starts_with("---") && line.ends_with("---") {
        Some(line[3..line.len() - 3].trim())
    } else {
        None
    }
}

/// Template shape of a quadlet, plus the template's default instance when
/// the generated `[Install]` section is available to read it from.
fn build_variant(kind: QuadletType, path: &str, unit: Option<&ParsedUnit>) -> QuadletVariant {
    let filename = Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path);

    match classify_service_kind(filename, kind.extension()) {
        ServiceKind::Simple => QuadletVariant::Simple,
        ServiceKind::Template { template } => QuadletVariant::Template {
            template,
            default_instance: unit
                .and_then(|unit| unit.section("Install"))
                .and_then(|section| section.first("DefaultInstance"))
                .map(str::to_string),
        },
        ServiceKind::TemplateInstance { template, argument } => {
            QuadletVariant::TemplateInstance { template, argument }
        }
    }
}

/// Map each quadlet's `Requires=` entries onto sibling quadlet ids, in
/// declaration order.  Names that do not match a sibling service are
/// dropped — dependencies on units outside the inventory cannot be
/// represented as ids.
fn resolve_requires(quadlets: &mut [Quadlet], units: &[ParsedUnit]) {
    let services: Vec<(String, Uuid)> = quadlets
        .iter()
        .filter_map(|quadlet| {
            quadlet
                .service
                .clone()
                .map(|service| (service, quadlet.id))
        })
        .collect();

    for (quadlet, unit) in quadlets.iter_mut().zip(units) {
        let Some(section) = unit.section("Unit") else {
            continue;
        };
        for value in section.values("Requires") {
            for name in value.split_whitespace() {
                let Some(&(_, id)) = services.iter().find(|(service, _)| service == name) else {
                    continue;
                };
                if id != quadlet.id && !quadlet.requires.contains(&id) {
                    quadlet.requires.push(id);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
