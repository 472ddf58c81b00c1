//! pip requirement manifest parsing.
//!
//! A manifest is kept as a sequence of logical lines, each remembering the
//! exact text it was parsed from. Serializing an untouched file therefore
//! reproduces it byte for byte; only lines whose requirement is replaced
//! are re-rendered.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use url::Url;

use crate::core::errors::PrefetchError;
use crate::util::fs::read_to_string;

/// `#` at line start or after whitespace begins a comment. A `#` inside a
/// URL (`...#egg=name`) does not.
static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|\s+)#.*$").expect("valid comment regex"));

/// Options that attach to a single requirement rather than the file.
static REQUIREMENT_OPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|\s)--(hash|global-option|install-option|config-settings)\b")
        .expect("valid option regex")
});

static VCS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)(git|hg|svn|bzr)\+[a-z0-9.+-]+:").expect("valid vcs regex")
});

static PLAIN_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)(https?|ftp|file):").expect("valid url regex"));

static PEP508_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)\s*(\[[^\]]*\])?\s*(.*)$")
        .expect("valid name regex")
});

/// Separator between a URL and its environment marker.
static URL_MARKER_SEP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+;\s*").expect("valid marker regex"));

static NAME_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_.]+").expect("valid separator regex"));

const ARCHIVE_EXTENSIONS: &[&str] = &[
    ".tar.gz", ".tar.bz2", ".tar.xz", ".tgz", ".tbz", ".txz", ".tar", ".zip", ".whl",
];

/// Normalize a project name (PEP 503).
pub fn canonicalize_name(name: &str) -> String {
    NAME_SEPARATORS.replace_all(name, "-").to_lowercase()
}

/// Where a requirement is installed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementKind {
    /// `name[extras] <specifier>`, resolved from an index.
    Pypi,
    /// A direct `http(s)`/`ftp` URL.
    Url,
    /// A `vcs+scheme://` reference.
    Vcs,
    /// A local directory, archive or `file:` URL.
    Path,
}

/// A single requirement entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub kind: RequirementKind,
    /// Project name as written, if known.
    pub name: Option<String>,
    pub extras: Vec<String>,
    /// Version specifier for index requirements.
    pub specifier: String,
    pub url: Option<String>,
    pub marker: Option<String>,
    pub hashes: Vec<String>,
    /// Per-requirement options (`--hash=...` included), verbatim.
    options: String,
}

impl Requirement {
    /// Parse the requirement part of a logical line (comment already stripped).
    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        let (spec, options) = match REQUIREMENT_OPTION.find(text) {
            Some(m) => (text[..m.start()].trim(), text[m.start()..].trim()),
            None => (text, ""),
        };
        if spec.is_empty() {
            return Err("missing requirement before options".to_string());
        }

        let mut req = if VCS_URL.is_match(spec) || PLAIN_URL.is_match(spec) {
            Self::parse_bare_url(spec)
        } else if looks_like_path(spec) {
            Self::parse_path(spec)
        } else {
            Self::parse_pep508(spec)?
        };
        req.hashes = parse_hashes(options)?;
        req.options = options.to_string();
        Ok(req)
    }

    fn empty(kind: RequirementKind) -> Self {
        Requirement {
            kind,
            name: None,
            extras: Vec::new(),
            specifier: String::new(),
            url: None,
            marker: None,
            hashes: Vec::new(),
            options: String::new(),
        }
    }

    /// `git+https://host/repo.git@ref#egg=name ; marker`
    fn parse_bare_url(spec: &str) -> Self {
        let (url, marker) = split_url_marker(spec);
        let mut req = Self::empty(url_kind(url));
        if let Some(egg) = fragment_value(url, "egg") {
            // pip tolerates `egg=name[extra]`
            let (name, extras) = egg.split_once('[').unwrap_or((egg.as_str(), ""));
            req.name = Some(name.to_string());
            req.extras = split_extras(extras.trim_end_matches(']'));
        }
        req.url = Some(url.to_string());
        req.marker = marker;
        req
    }

    fn parse_path(spec: &str) -> Self {
        let (path, marker) = match spec.split_once(';') {
            Some((path, marker)) => (path.trim(), Some(marker.trim().to_string())),
            None => (spec, None),
        };
        let mut req = Self::empty(RequirementKind::Path);
        req.url = Some(path.to_string());
        req.marker = marker;
        req
    }

    /// `name[extras] (@ url | specifier) ; marker`
    fn parse_pep508(spec: &str) -> Result<Self, String> {
        let caps = PEP508_NAME
            .captures(spec)
            .ok_or_else(|| format!("invalid requirement: {}", spec))?;
        let name = caps[1].to_string();
        let extras = caps
            .get(2)
            .map(|m| split_extras(m.as_str().trim_start_matches('[').trim_end_matches(']')))
            .unwrap_or_default();
        let rest = caps.get(3).map_or("", |m| m.as_str()).trim();

        if let Some(reference) = rest.strip_prefix('@') {
            let (url, marker) = split_url_marker(reference.trim());
            if url.is_empty() {
                return Err(format!("missing URL after `@` for {}", name));
            }
            let mut req = Self::empty(url_kind(url));
            req.name = Some(name);
            req.extras = extras;
            req.url = Some(url.to_string());
            req.marker = marker;
            return Ok(req);
        }

        let (specifier, marker) = match rest.split_once(';') {
            Some((specifier, marker)) => (specifier.trim(), Some(marker.trim().to_string())),
            None => (rest, None),
        };
        if !specifier.is_empty() && !specifier.starts_with(['<', '>', '=', '!', '~', '(']) {
            return Err(format!("invalid requirement: {}", spec));
        }
        let mut req = Self::empty(RequirementKind::Pypi);
        req.name = Some(name);
        req.extras = extras;
        req.specifier = specifier.to_string();
        req.marker = marker;
        Ok(req)
    }

    /// PEP 503 normalized project name.
    pub fn canonical_name(&self) -> Option<String> {
        self.name.as_deref().map(canonicalize_name)
    }

    /// Whether the entry cannot be served from a package index.
    pub fn is_external(&self) -> bool {
        matches!(self.kind, RequirementKind::Url | RequirementKind::Vcs)
    }

    /// File name the fetcher stores this entry's artifact under.
    ///
    /// VCS entries become `{name}-external-{vcs}commit-{ref}.tar.gz`; URL
    /// entries become `{name}-external-{algo}-{digest}{ext}` when pinned by
    /// hash, else `{name}-external-{basename}`.
    pub fn external_filename(&self) -> Result<String, String> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| "requirement has no URL".to_string())?;
        let name = self.canonical_name().ok_or_else(|| {
            format!("cannot determine package name for {} (add #egg=<name>)", url)
        })?;

        match self.kind {
            RequirementKind::Vcs => {
                let (vcs, _) = url.split_once('+').unwrap_or(("git", url));
                let reference = vcs_ref(url).unwrap_or_else(|| "HEAD".to_string());
                Ok(format!(
                    "{}-external-{}commit-{}.tar.gz",
                    name,
                    vcs.to_lowercase(),
                    sanitize(&reference)
                ))
            }
            RequirementKind::Url => {
                let basename = url_basename(url)
                    .ok_or_else(|| format!("cannot determine file name from {}", url))?;
                let pinned = self
                    .hashes
                    .first()
                    .cloned()
                    .or_else(|| fragment_value(url, "cachito_hash"));
                match pinned.as_deref().and_then(|h| h.split_once(':')) {
                    Some((algo, digest)) => Ok(format!(
                        "{}-external-{}-{}{}",
                        name,
                        sanitize(algo),
                        sanitize(digest),
                        archive_extension(&basename)
                    )),
                    None => Ok(format!("{}-external-{}", name, sanitize(&basename))),
                }
            }
            RequirementKind::Pypi | RequirementKind::Path => {
                Err(format!("{} is not an external requirement", name))
            }
        }
    }

    /// Point the entry at a new location, keeping every other attribute.
    pub fn with_url(&self, url: impl Into<String>) -> Self {
        let mut req = self.clone();
        req.url = Some(url.into());
        req.specifier.clear();
        req
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let extras = if self.extras.is_empty() {
            String::new()
        } else {
            format!("[{}]", self.extras.join(","))
        };

        match (&self.name, &self.url) {
            (Some(name), Some(url)) => write!(f, "{}{} @ {}", name, extras, url)?,
            (Some(name), None) => write!(f, "{}{}{}", name, extras, self.specifier)?,
            (None, Some(url)) => f.write_str(url)?,
            (None, None) => {}
        }
        if let Some(marker) = &self.marker {
            // PEP 508 needs whitespace between a URL and `;`
            write!(f, " ; {}", marker)?;
        }
        if !self.options.is_empty() {
            write!(f, " {}", self.options)?;
        }
        Ok(())
    }
}

/// Which requirement list an include directive adds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    Requirements,
    Constraints,
}

/// Content of a logical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Blank,
    /// A file-wide option such as `--index-url`.
    Option { name: String, value: Option<String> },
    /// `-r` / `-c` directive.
    Include { kind: IncludeKind, path: String },
    /// `-e` local project.
    Editable(String),
    Requirement(Requirement),
}

/// A logical line and the exact text it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// 1-based number of the first physical line.
    pub number: usize,
    raw: String,
    comment: String,
    ending: String,
    pub entry: Entry,
}

impl Line {
    /// The original text, including continuations and the line terminator.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn requirement(&self) -> Option<&Requirement> {
        match &self.entry {
            Entry::Requirement(req) => Some(req),
            _ => None,
        }
    }

    /// Render a replacement requirement, keeping this line's comment and terminator.
    pub fn render_with(&self, requirement: &Requirement) -> String {
        format!("{}{}{}", requirement, self.comment, self.ending)
    }
}

/// A parsed requirements file.
#[derive(Debug, Clone)]
pub struct RequirementsFile {
    path: PathBuf,
    lines: Vec<Line>,
}

impl RequirementsFile {
    /// Read and parse a file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = read_to_string(path)?;
        Ok(Self::parse(&content, path)?)
    }

    /// Parse `content`; `path` is only used in error messages.
    pub fn parse(content: &str, path: &Path) -> Result<Self, PrefetchError> {
        let mut lines = Vec::new();
        let mut physical = content.split_inclusive('\n').enumerate();

        while let Some((index, first)) = physical.next() {
            let number = index + 1;
            let mut raw = first.to_string();
            let mut logical = String::new();
            let mut last = first;

            loop {
                let body = strip_ending(last);
                let Some(continued) = body.strip_suffix('\\') else {
                    logical.push_str(body);
                    break;
                };
                logical.push_str(continued);
                match physical.next() {
                    Some((_, next)) => {
                        raw.push_str(next);
                        last = next;
                    }
                    None => break,
                }
            }

            let ending = last[strip_ending(last).len()..].to_string();
            let (text, comment) = match COMMENT.find(&logical) {
                Some(m) => (&logical[..m.start()], logical[m.start()..].to_string()),
                None => (logical.as_str(), String::new()),
            };

            let entry = parse_entry(text.trim()).map_err(|reason| {
                PrefetchError::InvalidRequirementsFile {
                    path: path.to_path_buf(),
                    line: number,
                    reason,
                }
            })?;

            lines.push(Line {
                number,
                raw,
                comment,
                ending,
                entry,
            });
        }

        Ok(RequirementsFile {
            path: path.to_path_buf(),
            lines,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn requirements(&self) -> impl Iterator<Item = &Requirement> {
        self.lines.iter().filter_map(Line::requirement)
    }

    /// File-wide options, in order.
    pub fn options(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.lines.iter().filter_map(|line| match &line.entry {
            Entry::Option { name, value } => Some((name.as_str(), value.as_deref())),
            _ => None,
        })
    }
}

impl fmt::Display for RequirementsFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.lines.iter().try_for_each(|line| f.write_str(&line.raw))
    }
}

fn parse_entry(text: &str) -> Result<Entry, String> {
    if text.is_empty() {
        return Ok(Entry::Blank);
    }
    if !text.starts_with('-') {
        return Requirement::parse(text).map(Entry::Requirement);
    }

    let (name, value) = split_option(text);
    let required = |value: Option<String>| {
        value
            .filter(|v| !v.is_empty())
            .ok_or_else(|| format!("option {} requires a value", name))
    };

    match name.as_str() {
        "-r" | "--requirement" => Ok(Entry::Include {
            kind: IncludeKind::Requirements,
            path: required(value)?,
        }),
        "-c" | "--constraint" => Ok(Entry::Include {
            kind: IncludeKind::Constraints,
            path: required(value)?,
        }),
        "-e" | "--editable" => {
            let target = required(value)?;
            if VCS_URL.is_match(&target) || (PLAIN_URL.is_match(&target) && !is_file_url(&target)) {
                return Err(format!(
                    "editable requirement {} cannot be served offline",
                    target
                ));
            }
            Ok(Entry::Editable(target))
        }
        _ => Ok(Entry::Option { name, value }),
    }
}

/// Split `--name=value`, `--name value`, `-xvalue` or `-x value`.
fn split_option(text: &str) -> (String, Option<String>) {
    let (head, tail) = match text.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, Some(tail.trim())),
        None => (text, None),
    };

    if head.starts_with("--") {
        return match head.split_once('=') {
            Some((name, value)) => (name.to_string(), Some(value.to_string())),
            None => (head.to_string(), tail.map(str::to_string)),
        };
    }

    // short option: `-r file` or `-rfile`
    let split = head.char_indices().nth(2).map_or(head.len(), |(i, _)| i);
    let (name, attached) = head.split_at(split);
    let value = if attached.is_empty() {
        tail.map(str::to_string)
    } else {
        Some(attached.trim_start_matches('=').to_string())
    };
    (name.to_string(), value)
}

fn parse_hashes(options: &str) -> Result<Vec<String>, String> {
    let mut hashes = Vec::new();
    let mut tokens = options.split_whitespace();
    while let Some(token) = tokens.next() {
        if let Some(value) = token.strip_prefix("--hash=") {
            hashes.push(value.to_string());
        } else if token == "--hash" {
            let value = tokens
                .next()
                .ok_or_else(|| "option --hash requires a value".to_string())?;
            hashes.push(value.to_string());
        }
    }
    if let Some(bad) = hashes.iter().find(|h| !h.contains(':')) {
        return Err(format!("hash {} is not in <algorithm>:<digest> form", bad));
    }
    Ok(hashes)
}

fn strip_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

fn split_extras(extras: &str) -> Vec<String> {
    extras
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect()
}

fn split_url_marker(spec: &str) -> (&str, Option<String>) {
    match URL_MARKER_SEP.find(spec) {
        Some(m) => (
            spec[..m.start()].trim(),
            Some(spec[m.end()..].trim().to_string()),
        ),
        None => (spec.trim(), None),
    }
}

fn url_kind(url: &str) -> RequirementKind {
    if VCS_URL.is_match(url) {
        RequirementKind::Vcs
    } else if is_file_url(url) {
        RequirementKind::Path
    } else {
        RequirementKind::Url
    }
}

fn is_file_url(url: &str) -> bool {
    url.get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("file:"))
}

fn looks_like_path(spec: &str) -> bool {
    spec.starts_with('.')
        || spec.starts_with('/')
        || spec.starts_with('~')
        || spec.contains('\\')
        || (ARCHIVE_EXTENSIONS.iter().any(|ext| spec.ends_with(*ext)) && !spec.contains('@'))
}

fn fragment_value(url: &str, key: &str) -> Option<String> {
    let (_, fragment) = url.split_once('#')?;
    fragment.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key && !v.is_empty()).then(|| v.to_string())
    })
}

/// The revision after the last `@` in the path of a VCS URL.
fn vcs_ref(url: &str) -> Option<String> {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let reference = match Url::parse(without_fragment) {
        Ok(parsed) => parsed
            .path()
            .rsplit_once('@')
            .map(|(_, reference)| reference.to_string()),
        // scp-like `git+git@host:org/repo.git@ref` does not parse as a URL
        Err(_) => without_fragment
            .split_once("://")
            .map_or(without_fragment, |(_, rest)| rest)
            .rsplit_once('@')
            .filter(|(_, reference)| !reference.contains(':'))
            .map(|(_, reference)| reference.to_string()),
    };
    reference.filter(|reference| !reference.is_empty())
}

fn url_basename(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .rev()
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

fn archive_extension(basename: &str) -> &str {
    ARCHIVE_EXTENSIONS
        .iter()
        .find(|ext| basename.ends_with(**ext))
        .copied()
        .or_else(|| basename.rfind('.').map(|i| &basename[i..]))
        .unwrap_or("")
}

/// Keep file-name-safe characters only.
fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
