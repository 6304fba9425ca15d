//! Stylesheet transforms: SCSS compilation and vendor prefixing.

use super::{Asset, Transform};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use std::path::PathBuf;

/// Compile SCSS to CSS with `grass`.
///
/// `@import`/`@use` resolve relative to the file first, then the load paths.
pub struct ScssCompile {
    load_paths: Vec<PathBuf>,
}

impl ScssCompile {
    pub fn new(load_paths: Vec<PathBuf>) -> Self {
        Self { load_paths }
    }
}

impl Transform for ScssCompile {
    fn name(&self) -> &'static str {
        "scss"
    }

    fn apply(&self, asset: Asset) -> Result<Asset, String> {
        let mut options = grass::Options::default();
        if let Some(dir) = asset.source.parent() {
            options = options.load_path(dir);
        }
        for path in &self.load_paths {
            options = options.load_path(path);
        }

        let css = grass::from_string(asset.text()?.to_owned(), &options)
            .map_err(|e| e.to_string())?;
        Ok(asset.with_text(css, "css"))
    }
}

/// Add vendor prefixes for the configured browserslist targets with `lightningcss`.
pub struct Autoprefix {
    browsers: Option<Browsers>,
    minify: bool,
}

impl Autoprefix {
    /// Resolve browserslist queries such as `last 2 versions`.
    pub fn new(queries: &[String], minify: bool) -> Result<Self, String> {
        let browsers = Browsers::from_browserslist(queries.iter().map(String::as_str))
            .map_err(|e| format!("invalid browsers query {:?}: {}", queries, e))?;
        Ok(Self { browsers, minify })
    }
}

impl Transform for Autoprefix {
    fn name(&self) -> &'static str {
        "autoprefixer"
    }

    fn apply(&self, asset: Asset) -> Result<Asset, String> {
        let targets = Targets { browsers: self.browsers.clone(), ..Targets::default() };
        let filename = asset.source.to_string_lossy().into_owned();

        let code = {
            let mut sheet = StyleSheet::parse(
                asset.text()?,
                ParserOptions { filename, ..ParserOptions::default() },
            )
            .map_err(|e| e.to_string())?;
            sheet
                .minify(MinifyOptions { targets: targets.clone(), ..MinifyOptions::default() })
                .map_err(|e| e.to_string())?;
            sheet
                .to_css(PrinterOptions {
                    minify: self.minify,
                    targets,
                    ..PrinterOptions::default()
                })
                .map_err(|e| e.to_string())?
                .code
        };

        Ok(asset.with_text(code, "css"))
    }
}
