// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Service configuration templates.
//!
//! Templates are plain text files with a fixed set of placeholders written as
//! `{{site_url}}`, `{{user}}`, and `{{group}}`. Placeholders are parsed up
//! front, so a typo in a placeholder name is reported instead of silently
//! leaking into a rendered configuration file.
//!
//! # Manual Edits
//!
//! A rendered file is only regenerated when it is older than its template.
//! This lets the user hand edit a rendered file before upload, and have that
//! edit survive every later deployment until the template itself changes.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{metadata, read_to_string, write},
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, info, instrument};

/// Named placeholder of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// Host-qualified name of the site.
    SiteUrl,

    /// Linux user that owns the site.
    User,

    /// Linux group that owns the site.
    Group,
}

impl Placeholder {
    /// Name of placeholder as written inside template braces.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SiteUrl => "site_url",
            Self::User => "user",
            Self::Group => "group",
        }
    }
}

impl FromStr for Placeholder {
    type Err = ();

    fn from_str(name: &str) -> std::result::Result<Self, Self::Err> {
        match name {
            "site_url" => Ok(Self::SiteUrl),
            "user" => Ok(Self::User),
            "group" => Ok(Self::Group),
            _ => Err(()),
        }
    }
}

impl Display for Placeholder {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{{{{{}}}}}", self.name())
    }
}

/// Values to substitute into placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholders {
    /// Host-qualified site name.
    pub site_url: String,

    /// Linux user that owns the site.
    pub user: String,

    /// Linux group that owns the site.
    pub group: String,
}

impl Placeholders {
    /// Value of placeholder.
    pub fn get(&self, placeholder: Placeholder) -> &str {
        match placeholder {
            Placeholder::SiteUrl => self.site_url.as_str(),
            Placeholder::User => self.user.as_str(),
            Placeholder::Group => self.group.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Slot(Placeholder),
}

/// Parsed service configuration template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Substitute placeholder values into template.
    pub fn render(&self, values: &Placeholders) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Slot(placeholder) => out.push_str(values.get(*placeholder)),
            }
        }

        out
    }

    /// Placeholders used by template in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = Placeholder> + '_ {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Slot(placeholder) => Some(*placeholder),
            Segment::Text(_) => None,
        })
    }
}

impl FromStr for Template {
    type Err = TemplateError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut segments = Vec::new();
        let mut rest = data;
        let mut line = 1;

        while let Some(start) = rest.find("{{") {
            let (text, tail) = rest.split_at(start);
            if !text.is_empty() {
                segments.push(Segment::Text(text.to_string()));
            }
            line += text.matches('\n').count();

            let body = &tail[2..];
            let end = body
                .find("}}")
                .ok_or(TemplateError::Unterminated { line })?;
            let name = &body[..end];
            let placeholder = name
                .trim()
                .parse::<Placeholder>()
                .map_err(|_| TemplateError::UnknownPlaceholder {
                    name: name.trim().to_string(),
                    line,
                })?;
            segments.push(Segment::Slot(placeholder));
            line += name.matches('\n').count();
            rest = &body[end + 2..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }

        Ok(Self { segments })
    }
}

/// Outcome of [`render_if_stale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rendered {
    /// Target was (re)generated from template.
    Generated,

    /// Target is newer than template, and was left alone.
    Kept,
}

/// Render template into target file unless target is newer than template.
///
/// # Errors
///
/// - Return [`TemplateError::Missing`] if template does not exist.
/// - Return [`TemplateError::Parse`] if template contains a bad placeholder.
/// - Return [`TemplateError::Io`] if target cannot be written.
#[instrument(skip(values), level = "debug")]
pub fn render_if_stale(template: &Path, target: &Path, values: &Placeholders) -> Result<Rendered> {
    let template_mtime = metadata(template)
        .and_then(|meta| meta.modified())
        .map_err(|err| TemplateError::Missing {
            source: err,
            path: template.to_path_buf(),
        })?;

    if let Ok(target_mtime) = metadata(target).and_then(|meta| meta.modified()) {
        // INVARIANT: Manual edits made after rendering win over the template.
        if target_mtime >= template_mtime {
            debug!("keep {:?}, it is newer than its template", target.display());
            return Ok(Rendered::Kept);
        }
    }

    let source = read_to_string(template).map_err(|err| TemplateError::Missing {
        source: err,
        path: template.to_path_buf(),
    })?;
    let parsed = source
        .parse::<Template>()
        .map_err(|err| TemplateError::Parse {
            source: Box::new(err),
            path: template.to_path_buf(),
        })?;
    debug!(
        "{:?} uses {:?}",
        template.display(),
        parsed.placeholders().collect::<Vec<_>>()
    );

    if let Some(parent) = target.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        mkdirp::mkdirp(parent).map_err(|err| TemplateError::Io {
            source: err,
            path: parent.to_path_buf(),
        })?;
    }

    write(target, parsed.render(values)).map_err(|err| TemplateError::Io {
        source: err,
        path: target.to_path_buf(),
    })?;
    info!("render {:?} from {:?}", target.display(), template.display());

    Ok(Rendered::Generated)
}

/// Template error types.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// Template file does not exist or cannot be read.
    #[error("missing template {:?}", path.display())]
    Missing {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Placeholder name is not one of the allowed placeholders.
    #[error("unknown placeholder {name:?} on line {line}")]
    UnknownPlaceholder { name: String, line: usize },

    /// Placeholder braces are never closed.
    #[error("unterminated placeholder on line {line}")]
    Unterminated { line: usize },

    /// Template file contains a bad placeholder.
    #[error("failed to parse template {:?}", path.display())]
    Parse {
        #[source]
        source: Box<TemplateError>,
        path: PathBuf,
    },

    /// Rendered file cannot be written.
    #[error("failed to write {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = TemplateError> = std::result::Result<T, E>;
