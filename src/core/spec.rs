//! Package specs - WHAT the user asked to prefetch.
//!
//! A spec names a package type and a directory. Specs are parsed from the
//! command line or JSON, validated up front, and never change afterwards.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::PrefetchError;
use crate::core::unique::Unique;
use crate::util::paths::{normalize_lexically, RootedPath};

/// Supported package ecosystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    Gomod,
    Pip,
}

impl PackageType {
    /// The tag used in specs and outputs.
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageType::Gomod => "gomod",
            PackageType::Pip => "pip",
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gomod" => Ok(PackageType::Gomod),
            "pip" => Ok(PackageType::Pip),
            _ => Err(format!("unknown package type: {}", s)),
        }
    }
}

/// A Go module package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GomodPackageSpec {
    pub path: PathBuf,
}

/// A pip package.
///
/// Without explicit requirement files, the fetcher falls back to
/// `requirements.txt` and `requirements-build.txt` in the package directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipPackageSpec {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements_files: Option<Vec<PathBuf>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements_build_files: Option<Vec<PathBuf>>,
}

/// A package to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PackageSpec {
    Gomod(GomodPackageSpec),
    Pip(PipPackageSpec),
}

impl PackageSpec {
    /// Build a spec from a JSON object with a `type` tag.
    pub fn from_json(value: Value) -> Result<Self, PrefetchError> {
        let invalid = |reason: String| PrefetchError::InvalidPackageSpec {
            spec: value.to_string(),
            reason,
        };

        let Value::Object(mut fields) = value.clone() else {
            return Err(invalid("expected a JSON object".to_string()));
        };
        let tag = match fields.remove("type") {
            Some(Value::String(tag)) => tag,
            Some(other) => return Err(invalid(format!("`type` must be a string, got {}", other))),
            None => return Err(invalid("missing `type`".to_string())),
        };
        let package_type: PackageType = tag.parse().map_err(invalid)?;
        let fields = Value::Object(fields);

        let spec = match package_type {
            PackageType::Gomod => serde_json::from_value(fields).map(PackageSpec::Gomod),
            PackageType::Pip => serde_json::from_value(fields).map(PackageSpec::Pip),
        }
        .map_err(|e| invalid(e.to_string()))?;

        Ok(spec.normalized())
    }

    /// Build a spec from the `type[:path]` shorthand. The path defaults to `.`.
    pub fn from_shorthand(arg: &str) -> Result<Self, PrefetchError> {
        let (tag, path) = arg.split_once(':').unwrap_or((arg, "."));
        let path = if path.is_empty() { "." } else { path };

        let package_type: PackageType =
            tag.trim()
                .parse()
                .map_err(|reason| PrefetchError::InvalidPackageSpec {
                    spec: arg.to_string(),
                    reason,
                })?;
        Ok(PackageSpec::new(package_type, path))
    }

    /// Create a spec with default options.
    pub fn new(package_type: PackageType, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let spec = match package_type {
            PackageType::Gomod => PackageSpec::Gomod(GomodPackageSpec { path }),
            PackageType::Pip => PackageSpec::Pip(PipPackageSpec {
                path,
                requirements_files: None,
                requirements_build_files: None,
            }),
        };
        spec.normalized()
    }

    /// The package type.
    pub fn package_type(&self) -> PackageType {
        match self {
            PackageSpec::Gomod(_) => PackageType::Gomod,
            PackageSpec::Pip(_) => PackageType::Pip,
        }
    }

    /// The package directory.
    pub fn path(&self) -> &Path {
        match self {
            PackageSpec::Gomod(spec) => &spec.path,
            PackageSpec::Pip(spec) => &spec.path,
        }
    }

    /// Resolve the package directory (and requirement files) under `source`.
    pub fn rooted(&self, source: &RootedPath) -> Result<Self, PrefetchError> {
        let mut spec = self.clone();
        match &mut spec {
            PackageSpec::Gomod(gomod) => {
                gomod.path = source.join_within_root(&gomod.path)?;
            }
            PackageSpec::Pip(pip) => {
                pip.path = source.join_within_root(&pip.path)?;
                let package_root = pip.path.clone();
                for files in [&mut pip.requirements_files, &mut pip.requirements_build_files]
                    .into_iter()
                    .flatten()
                {
                    for file in files.iter_mut() {
                        *file = source.join_within_root(package_root.join(&*file))?;
                    }
                }
            }
        }
        Ok(spec)
    }

    fn normalized(mut self) -> Self {
        match &mut self {
            PackageSpec::Gomod(gomod) => gomod.path = normalize_lexically(&gomod.path),
            PackageSpec::Pip(pip) => {
                pip.path = normalize_lexically(&pip.path);
                for files in [&mut pip.requirements_files, &mut pip.requirements_build_files]
                    .into_iter()
                    .flatten()
                {
                    for file in files.iter_mut() {
                        *file = normalize_lexically(file);
                    }
                }
            }
        }
        self
    }
}

impl Unique for PackageSpec {
    type Key = (PackageType, PathBuf);
    const DEDUPE: bool = false;
    const KIND: &'static str = "package";

    fn unique_key(&self) -> Self::Key {
        (self.package_type(), self.path().to_path_buf())
    }
}

/// Parse a `--package` argument: JSON object or `type[:path]`.
pub fn parse_package_arg(arg: &str) -> Result<PackageSpec, PrefetchError> {
    match maybe_load_json(arg)? {
        Some(value) => PackageSpec::from_json(value),
        None => PackageSpec::from_shorthand(arg),
    }
}

/// Parse a `--packagelist` argument: JSON list or comma-separated shorthands.
pub fn parse_package_list(arg: &str) -> Result<Vec<PackageSpec>, PrefetchError> {
    match maybe_load_json(arg)? {
        Some(Value::Array(items)) => items.into_iter().map(PackageSpec::from_json).collect(),
        Some(other) => Err(PrefetchError::InvalidPackageSpec {
            spec: arg.to_string(),
            reason: format!("expected a JSON list, got {}", json_type_name(&other)),
        }),
        None => arg
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PackageSpec::from_shorthand)
            .collect(),
    }
}

fn maybe_load_json(raw: &str) -> Result<Option<Value>, PrefetchError> {
    let trimmed = raw.trim_start();
    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| PrefetchError::InvalidPackageSpec {
            spec: raw.to_string(),
            reason: format!("looks like JSON but is not valid JSON: {}", e),
        })
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_shorthand() {
        let spec = PackageSpec::from_shorthand("pip:./app/../svc/").unwrap();
        assert_eq!(spec.package_type(), PackageType::Pip);
        assert_eq!(spec.path(), Path::new("svc"));

        let spec = PackageSpec::from_shorthand("gomod").unwrap();
        assert_eq!(spec.package_type(), PackageType::Gomod);
        assert_eq!(spec.path(), Path::new("."));
    }

    #[test]
    fn test_unknown_type_is_invalid() {
        let err = PackageSpec::from_shorthand("npm:web").unwrap_err();
        assert!(matches!(err, PrefetchError::InvalidPackageSpec { .. }));

        let err = PackageSpec::from_json(json!({"type": "cargo", "path": "."})).unwrap_err();
        assert!(err.to_string().contains("unknown package type: cargo"));
    }

    #[test]
    fn test_json_spec() {
        let spec = PackageSpec::from_json(json!({
            "type": "pip",
            "path": "svc",
            "requirements_files": ["req/base.txt"],
        }))
        .unwrap();

        match spec {
            PackageSpec::Pip(pip) => {
                assert_eq!(pip.path, PathBuf::from("svc"));
                assert_eq!(pip.requirements_files, Some(vec![PathBuf::from("req/base.txt")]));
                assert_eq!(pip.requirements_build_files, None);
            }
            other => panic!("unexpected spec: {:?}", other),
        }
    }

    #[test]
    fn test_json_spec_rejects_unknown_fields() {
        let err = PackageSpec::from_json(json!({"type": "gomod", "path": ".", "extra": 1}))
            .unwrap_err();
        assert!(matches!(err, PrefetchError::InvalidPackageSpec { .. }));

        let err = PackageSpec::from_json(json!({"path": "."})).unwrap_err();
        assert!(err.to_string().contains("missing `type`"));
    }

    #[test]
    fn test_package_list() {
        let specs = parse_package_list("pip:a, gomod:b").unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].package_type(), PackageType::Gomod);

        let specs = parse_package_list(r#"[{"type": "pip", "path": "a"}]"#).unwrap();
        assert_eq!(specs.len(), 1);

        assert!(parse_package_list(r#"{"type": "pip"}"#).is_err());
        assert!(parse_package_arg("{not json").is_err());
    }

    #[test]
    fn test_rooted_rejects_escape() {
        let tmp = TempDir::new().unwrap();
        let source = RootedPath::new(tmp.path()).unwrap();

        let spec = PackageSpec::new(PackageType::Pip, "../elsewhere");
        let err = spec.rooted(&source).unwrap_err();
        assert!(matches!(err, PrefetchError::PathEscape { .. }));
    }

    #[test]
    fn test_rooted_makes_paths_absolute() {
        let tmp = TempDir::new().unwrap();
        let source = RootedPath::new(tmp.path()).unwrap();

        let spec = PackageSpec::from_json(json!({
            "type": "pip",
            "path": "svc",
            "requirements_files": ["requirements.txt"],
        }))
        .unwrap()
        .rooted(&source)
        .unwrap();

        assert_eq!(spec.path(), source.path().join("svc"));
        match spec {
            PackageSpec::Pip(pip) => assert_eq!(
                pip.requirements_files.unwrap(),
                vec![source.path().join("svc/requirements.txt")]
            ),
            other => panic!("unexpected spec: {:?}", other),
        }
    }

    #[test]
    fn test_equivalent_paths_share_key() {
        let a = PackageSpec::new(PackageType::Pip, "svc");
        let b = PackageSpec::new(PackageType::Pip, "./svc/../svc");
        assert_eq!(a.unique_key(), b.unique_key());
    }
}
