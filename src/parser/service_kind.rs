//! Template classification of quadlet file names.
//!
//! systemd template naming applies to quadlet files too: an `@` before the
//! extension boundary marks a template.  `web@.container` is the template
//! `web`, `web@1.container` instantiates it with argument `1`, and plain
//! `web.container` is a simple unit.

/// Shape of a quadlet file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceKind {
    Simple,
    Template { template: String },
    TemplateInstance { template: String, argument: String },
}

/// Classify `filename` (no directory components) given its already
/// recognized `extension` (lower-case, without the dot).
pub fn classify_service_kind(filename: &str, extension: &str) -> ServiceKind {
    // Strip the `.{extension}` suffix; the caller classified the extension
    // from this very name, so the suffix is present modulo case.
    let stem = filename
        .get(..filename.len().saturating_sub(extension.len() + 1))
        .unwrap_or(filename);

    let Some(at_pos) = stem.find('@') else {
        return ServiceKind::Simple;
    };

    let template = stem[..at_pos].to_string();
    let argument = &stem[at_pos + 1..];

    if argument.is_empty() {
        ServiceKind::Template { template }
    } else {
        ServiceKind::TemplateInstance {
            template,
            argument: argument.to_string(),
        }
    }
}
