//! Source file discovery for the build system.
//!
//! Expands an asset class's source globs against the project root, removes
//! excluded files, and records each file's path relative to its glob base so
//! outputs can mirror the source layout.

use crate::asset::AssetClass;
use crate::build::BuildContext;
use glob::{glob_with, MatchOptions, Pattern};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Error during source discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Invalid glob pattern
    #[error("invalid glob pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

/// A matched source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path to the file
    pub path: PathBuf,
    /// Path relative to the glob base, mirrored under the destination
    pub relative: PathBuf,
}

/// Options shared by discovery, exclusion, and watch matching.
///
/// `*` never crosses a directory separator; `**` does.
pub fn match_options() -> MatchOptions {
    MatchOptions { case_sensitive: true, require_literal_separator: true, require_literal_leading_dot: false }
}

/// Literal directory prefix of a glob pattern, before its first wildcard.
///
/// A pattern without wildcards names a single file; its base is the parent.
pub fn glob_base(pattern: &str) -> PathBuf {
    let parts: Vec<&str> = pattern.split('/').collect();
    let literal = parts.iter().take_while(|p| !p.contains(['*', '?', '[', '{'])).count();
    let keep = if literal == parts.len() { literal.saturating_sub(1) } else { literal };
    parts[..keep].iter().filter(|p| !p.is_empty() && **p != ".").collect()
}

/// Path relative to `root` using `/` separators, or `None` if outside it.
pub fn relative_to_root(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}

/// Compile glob patterns.
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>, DiscoveryError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p)
                .map_err(|source| DiscoveryError::InvalidPattern { pattern: p.clone(), source })
        })
        .collect()
}

/// Whether a root-relative path matches any of the patterns.
pub fn matches_any(patterns: &[Pattern], relative: &str) -> bool {
    let options = match_options();
    patterns.iter().any(|p| p.matches_with(relative, options))
}

/// Whether a file is a stylesheet partial (`_name.scss`), only ever imported.
pub fn is_partial(path: &Path) -> bool {
    path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.starts_with('_'))
}

/// Discover the source files of an asset class.
///
/// Results are deduplicated and sorted by path. Zero matches is not an error.
pub fn discover_sources(
    ctx: &BuildContext,
    class: AssetClass,
) -> Result<Vec<SourceFile>, DiscoveryError> {
    let options = ctx.config().assets.get(class);
    let root = ctx.project_root();
    let excludes = compile_patterns(&options.exclude)?;
    let mut found = BTreeMap::new();

    for pattern in &options.src {
        let base = ctx.resolve_path(&glob_base(pattern));
        let full = if Path::new(pattern).is_absolute() {
            pattern.clone()
        } else {
            format!("{}/{}", Pattern::escape(&root.to_string_lossy()), pattern)
        };

        let entries = glob_with(&full, match_options()).map_err(|source| {
            DiscoveryError::InvalidPattern { pattern: pattern.clone(), source }
        })?;

        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(task = %class, "error reading path: {}", e);
                    continue;
                }
            };
            if !path.is_file() {
                continue;
            }
            if class == AssetClass::Styles && is_partial(&path) {
                continue;
            }
            if let Some(rel) = relative_to_root(root, &path) {
                if matches_any(&excludes, &rel) {
                    continue;
                }
            }

            let relative = match path.strip_prefix(&base) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => PathBuf::from(path.file_name().unwrap_or_default()),
            };
            found.entry(path.clone()).or_insert(SourceFile { path, relative });
        }
    }

    Ok(found.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    fn relatives(files: &[SourceFile]) -> Vec<String> {
        files.iter().map(|f| f.relative.to_string_lossy().replace('\\', "/")).collect()
    }

    #[test]
    fn test_glob_base() {
        assert_eq!(glob_base("app/views/**/*.pug"), PathBuf::from("app/views"));
        assert_eq!(glob_base("app/images/*.png"), PathBuf::from("app/images"));
        assert_eq!(glob_base("./app/fonts/*"), PathBuf::from("app/fonts"));
        assert_eq!(glob_base("app/robots.txt"), PathBuf::from("app"));
        assert_eq!(glob_base("*.js"), PathBuf::new());
    }

    #[test]
    fn test_matches_any_respects_separators() {
        let patterns = compile_patterns(&["app/images/*.png".to_string()]).unwrap();
        assert!(matches_any(&patterns, "app/images/logo.png"));
        assert!(!matches_any(&patterns, "app/images/icons/logo.png"));

        let deep = compile_patterns(&["app/views/**/*.pug".to_string()]).unwrap();
        assert!(matches_any(&deep, "app/views/index.pug"));
        assert!(matches_any(&deep, "app/views/blocks/nav.pug"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = compile_patterns(&["app/[".to_string()]).unwrap_err();
        assert!(err.to_string().contains("app/["));
    }

    #[test]
    fn test_discover_templates_excludes_partials() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "app/views/index.pug");
        touch(dir.path(), "app/views/about/team.pug");
        touch(dir.path(), "app/views/blocks/nav.pug");
        touch(dir.path(), "app/views/layout/base.pug");

        let ctx = BuildContext::new(PipelineConfig::default(), dir.path().to_path_buf());
        let files = discover_sources(&ctx, AssetClass::Templates).unwrap();
        assert_eq!(relatives(&files), vec!["about/team.pug", "index.pug"]);
    }

    #[test]
    fn test_discover_styles_skips_underscore_files() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "app/styles/main.scss");
        touch(dir.path(), "app/styles/_vars.scss");

        let ctx = BuildContext::new(PipelineConfig::default(), dir.path().to_path_buf());
        let files = discover_sources(&ctx, AssetClass::Styles).unwrap();
        assert_eq!(relatives(&files), vec!["main.scss"]);
    }

    #[test]
    fn test_discover_images_is_shallow_and_deduplicated() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "app/images/a.png");
        touch(dir.path(), "app/images/b.svg");
        touch(dir.path(), "app/images/nested/c.png");

        let mut config = PipelineConfig::default();
        config.assets.images.src.push("app/images/*.png".to_string());
        let ctx = BuildContext::new(config, dir.path().to_path_buf());
        let files = discover_sources(&ctx, AssetClass::Images).unwrap();
        assert_eq!(relatives(&files), vec!["a.png", "b.svg"]);
    }

    #[test]
    fn test_discover_empty_is_ok() {
        let dir = TempDir::new().unwrap();
        let ctx = BuildContext::new(PipelineConfig::default(), dir.path().to_path_buf());
        for class in AssetClass::ALL {
            assert!(discover_sources(&ctx, class).unwrap().is_empty());
        }
    }
}
