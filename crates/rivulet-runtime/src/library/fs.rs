//! Filesystem definition source.

use std::path::{Path, PathBuf};

use super::{DefinitionSource, TRACING_TARGET};
use crate::definition::OperatorDef;
use crate::error::{Error, Result};

/// File extensions searched, in order.
const EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

/// Reads definitions from files below a root directory.
///
/// A dotted name maps to a nested path: `math.arith.sum` is looked up as
/// `<root>/math/arith/sum.json`, then `.yaml`, then `.yml`.
#[derive(Debug, Clone)]
pub struct FsDefinitionSource {
    root: PathBuf,
}

impl FsDefinitionSource {
    /// Creates a source rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the first existing file for `name`.
    pub fn locate(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.split('.').any(str::is_empty) {
            return Err(Error::resolution(name, "invalid definition name"));
        }

        let base: PathBuf = self.root.join(name.split('.').collect::<PathBuf>());
        EXTENSIONS
            .iter()
            .map(|extension| base.with_extension(extension))
            .find(|path| path.is_file())
            .ok_or_else(|| {
                Error::resolution(
                    name,
                    format!("no definition file at '{}' (.json, .yaml, .yml)", base.display()),
                )
            })
    }
}

impl DefinitionSource for FsDefinitionSource {
    fn read(&self, name: &str) -> Result<OperatorDef> {
        let path = self.locate(name)?;
        tracing::debug!(target: TRACING_TARGET, path = %path.display(), "Loading definition file");

        let content = std::fs::read_to_string(&path).map_err(|e| Error::resolution(name, e))?;
        let is_json = path.extension().is_some_and(|extension| extension == "json");
        if is_json {
            OperatorDef::from_json(&content)
        } else {
            OperatorDef::from_yaml(&content)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_dotted_name_lookup() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("math/arith")).unwrap();
        fs::write(
            dir.path().join("math/arith/sum.yaml"),
            "name: sum\nin:\n  main: { type: number }\n",
        )
        .unwrap();

        let source = FsDefinitionSource::new(dir.path());
        let def = source.read("math.arith.sum").unwrap();
        assert_eq!(def.name, "sum");
        assert!(def.in_ports.contains_key("main"));
    }

    #[test]
    fn test_extension_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("op.json"), r#"{"name": "from_json"}"#).unwrap();
        fs::write(dir.path().join("op.yml"), "name: from_yml\n").unwrap();

        let source = FsDefinitionSource::new(dir.path());
        assert_eq!(source.read("op").unwrap().name, "from_json");

        fs::remove_file(dir.path().join("op.json")).unwrap();
        assert_eq!(source.read("op").unwrap().name, "from_yml");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsDefinitionSource::new(dir.path());
        assert!(matches!(source.read("absent"), Err(Error::Resolution { .. })));
        assert!(matches!(source.read("a..b"), Err(Error::Resolution { .. })));
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        let source = FsDefinitionSource::new(dir.path());
        assert!(matches!(source.read("broken"), Err(Error::Serialization(_))));
    }
}
