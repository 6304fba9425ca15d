//! Template compilation transform.

use super::{Asset, Transform};
use crate::template::{compile_str, TemplateOptions};
use std::path::PathBuf;

/// Compile `.pug` views to HTML.
pub struct PugCompile {
    options: TemplateOptions,
}

impl PugCompile {
    /// `basedir` resolves absolute (`/blocks/nav`) include paths.
    pub fn new(pretty: bool, basedir: Option<PathBuf>) -> Self {
        Self { options: TemplateOptions { pretty, basedir } }
    }
}

impl Transform for PugCompile {
    fn name(&self) -> &'static str {
        "pug"
    }

    fn apply(&self, asset: Asset) -> Result<Asset, String> {
        let html =
            compile_str(asset.text()?, &asset.source, &self.options).map_err(|e| e.to_string())?;
        Ok(asset.with_text(html, "html"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_compiles_to_html_extension() {
        let asset = Asset::new(
            PathBuf::from("/app/views/index.pug"),
            PathBuf::from("index.pug"),
            b"p Hello".to_vec(),
        );
        let out = PugCompile::new(false, None).apply(asset).unwrap();
        assert_eq!(out.relative, PathBuf::from("index.html"));
        assert_eq!(out.contents, b"<p>Hello</p>");
    }

    #[test]
    fn test_includes_resolve_relative_to_source() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("blocks")).unwrap();
        fs::write(dir.path().join("blocks/head.pug"), "title Hi").unwrap();

        let asset = Asset::new(
            dir.path().join("index.pug"),
            PathBuf::from("index.pug"),
            b"head\n  include blocks/head".to_vec(),
        );
        let out = PugCompile::new(false, None).apply(asset).unwrap();
        assert_eq!(out.contents, b"<head><title>Hi</title></head>");
    }

    #[test]
    fn test_error_mentions_line() {
        let asset = Asset::new(
            PathBuf::from("views/bad.pug"),
            PathBuf::from("bad.pug"),
            b"div\n  if user".to_vec(),
        );
        let err = PugCompile::new(true, None).apply(asset).unwrap_err();
        assert!(err.contains("views/bad.pug:2:"), "{}", err);
    }
}
