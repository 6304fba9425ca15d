//! Per-file transforms applied by the asset tasks.
//!
//! Each asset class has an ordered chain of [`Transform`]s. The pipeline
//! feeds every source file through its class's chain and writes the result.
//! A transform only sees bytes in and bytes out; compilers and optimizers
//! stay behind this seam.

pub mod images;
pub mod scripts;
pub mod styles;
pub mod templates;

use crate::asset::AssetClass;
use crate::build::{glob_base, BuildContext};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A file moving through a transform chain.
#[derive(Debug, Clone)]
pub struct Asset {
    /// Absolute path of the source file
    pub source: PathBuf,
    /// Output path relative to the class destination
    pub relative: PathBuf,
    pub contents: Vec<u8>,
}

impl Asset {
    pub fn new(source: PathBuf, relative: PathBuf, contents: Vec<u8>) -> Self {
        Self { source, relative, contents }
    }

    /// Contents as UTF-8 text.
    pub fn text(&self) -> Result<&str, String> {
        std::str::from_utf8(&self.contents).map_err(|e| format!("not valid UTF-8: {}", e))
    }

    /// Replace the contents and give the output path a new extension.
    pub fn with_text(mut self, text: String, extension: &str) -> Self {
        self.contents = text.into_bytes();
        self.relative.set_extension(extension);
        self
    }
}

/// A failure processing one file, recovered at the task boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{task}] {}: {message}", .file.display())]
pub struct TransformError {
    /// Task that raised the error
    pub task: AssetClass,
    /// Source file being processed
    pub file: PathBuf,
    pub message: String,
}

impl TransformError {
    pub fn new(task: AssetClass, file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self { task, file: file.into(), message: message.into() }
    }
}

/// One step of a transform chain.
pub trait Transform: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Transform one file. The error message is reported with the file path.
    fn apply(&self, asset: Asset) -> Result<Asset, String>;
}

/// Ordered transforms for one asset class.
pub struct Chain {
    class: AssetClass,
    steps: Vec<Box<dyn Transform>>,
}

impl Chain {
    pub fn new(class: AssetClass) -> Self {
        Self { class, steps: Vec::new() }
    }

    pub fn then(mut self, step: impl Transform + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn class(&self) -> AssetClass {
        self.class
    }

    /// Names of the steps, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step over an asset.
    pub fn run(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        for step in &self.steps {
            let source = asset.source.clone();
            asset = step.apply(asset).map_err(|message| {
                TransformError::new(self.class, source, format!("{}: {}", step.name(), message))
            })?;
        }
        Ok(asset)
    }
}

/// Build the transform chain of an asset class from the context's config.
///
/// Fails when the configuration cannot produce a working chain, such as an
/// unknown browserslist query or a transpiler that is not installed.
pub fn chain_for(class: AssetClass, ctx: &BuildContext) -> Result<Chain, String> {
    let config = ctx.config();
    let chain = Chain::new(class);

    let chain = match class {
        AssetClass::Templates => {
            let basedir = base_dir(ctx, class);
            chain.then(templates::PugCompile::new(config.templates.pretty, basedir))
        }
        AssetClass::Styles => {
            let mut load_paths = Vec::new();
            if let Some(base) = base_dir(ctx, class) {
                load_paths.push(base);
            }
            chain
                .then(styles::ScssCompile::new(load_paths))
                .then(styles::Autoprefix::new(&config.styles.browsers, config.styles.minify)?)
        }
        AssetClass::Scripts => {
            let chain = match &config.scripts.transpiler {
                Some(argv) => chain.then(scripts::Transpile::new(argv, ctx.project_root())?),
                None => chain,
            };
            if config.scripts.minify {
                chain.then(scripts::Minify)
            } else {
                chain
            }
        }
        AssetClass::Images => chain.then(images::Optimize::new(
            ctx.cache_dir(),
            config.images.jpeg_quality,
        )),
        AssetClass::Fonts => chain,
    };

    Ok(chain)
}

/// Glob base of the class's first source pattern, resolved against the project root.
fn base_dir(ctx: &BuildContext, class: AssetClass) -> Option<PathBuf> {
    let pattern = ctx.config().assets.get(class).src.first()?;
    Some(ctx.resolve_path(&glob_base(pattern)))
}

/// Output path for an asset under its class destination.
pub fn output_path(dest: &Path, asset: &Asset) -> PathBuf {
    dest.join(&asset.relative)
}
