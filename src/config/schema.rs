//! Configuration schema types for `frontpipe.toml`
//!
//! Defines the options table (asset class → source globs and destination)
//! and the per-transform settings, together with their validation rules.

use crate::asset::AssetClass;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Project metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    #[serde(default = "default_name")]
    pub name: String,
    /// Source root (watched in watch mode)
    #[serde(default = "default_src")]
    pub src: PathBuf,
    /// Output root (deleted by clean, served by the dev server)
    #[serde(default = "default_out")]
    pub out: PathBuf,
}

fn default_name() -> String {
    "site".to_string()
}

fn default_src() -> PathBuf {
    PathBuf::from("app")
}

fn default_out() -> PathBuf {
    PathBuf::from("public")
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self { name: default_name(), src: default_src(), out: default_out() }
    }
}

/// Source and destination mapping for one asset class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetOptions {
    /// Glob patterns selecting source files, relative to the project root
    pub src: Vec<String>,
    /// Glob patterns removed from the source set
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Glob patterns that re-trigger this class in watch mode (empty = `src`)
    #[serde(default)]
    pub watch: Vec<String>,
    /// Destination directory, relative to the project root
    pub dest: PathBuf,
}

impl AssetOptions {
    fn new(src: &[&str], dest: &str) -> Self {
        Self {
            src: src.iter().map(|s| s.to_string()).collect(),
            exclude: vec![],
            watch: vec![],
            dest: PathBuf::from(dest),
        }
    }

    fn with_exclude(mut self, exclude: &[&str]) -> Self {
        self.exclude = exclude.iter().map(|s| s.to_string()).collect();
        self
    }

    fn with_watch(mut self, watch: &[&str]) -> Self {
        self.watch = watch.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Patterns used by the watcher, falling back to the source patterns.
    pub fn watch_patterns(&self) -> &[String] {
        if self.watch.is_empty() {
            &self.src
        } else {
            &self.watch
        }
    }
}

/// The options table: one entry per asset class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    #[serde(default = "default_templates")]
    pub templates: AssetOptions,
    #[serde(default = "default_scripts")]
    pub scripts: AssetOptions,
    #[serde(default = "default_styles")]
    pub styles: AssetOptions,
    #[serde(default = "default_images")]
    pub images: AssetOptions,
    #[serde(default = "default_fonts")]
    pub fonts: AssetOptions,
}

fn default_templates() -> AssetOptions {
    AssetOptions::new(&["app/views/**/*.pug"], "public")
        .with_exclude(&["app/views/blocks/**", "app/views/layout/**"])
        .with_watch(&["app/views/**/*.pug"])
}

fn default_scripts() -> AssetOptions {
    AssetOptions::new(&["app/scripts/**/*.js"], "public/scripts")
}

fn default_styles() -> AssetOptions {
    AssetOptions::new(&["app/styles/**/*.scss"], "public/styles")
}

fn default_images() -> AssetOptions {
    AssetOptions::new(
        &[
            "app/images/*.png",
            "app/images/*.jpeg",
            "app/images/*.jpg",
            "app/images/*.gif",
            "app/images/*.svg",
        ],
        "public/images",
    )
}

fn default_fonts() -> AssetOptions {
    AssetOptions::new(&["app/fonts/*"], "public/fonts")
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            templates: default_templates(),
            scripts: default_scripts(),
            styles: default_styles(),
            images: default_images(),
            fonts: default_fonts(),
        }
    }
}

impl AssetsConfig {
    /// Look up the options for an asset class.
    pub fn get(&self, class: AssetClass) -> &AssetOptions {
        match class {
            AssetClass::Templates => &self.templates,
            AssetClass::Scripts => &self.scripts,
            AssetClass::Styles => &self.styles,
            AssetClass::Images => &self.images,
            AssetClass::Fonts => &self.fonts,
        }
    }
}

/// Template compiler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// Emit indented, one-element-per-line HTML
    #[serde(default = "default_true")]
    pub pretty: bool,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self { pretty: true }
    }
}

/// Stylesheet settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylesConfig {
    /// Browserslist queries used for vendor prefixing
    #[serde(default = "default_browsers")]
    pub browsers: Vec<String>,
    /// Minify the emitted CSS
    #[serde(default)]
    pub minify: bool,
}

fn default_browsers() -> Vec<String> {
    vec!["last 2 versions".to_string()]
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self { browsers: default_browsers(), minify: false }
    }
}

/// Script settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Optional external transpiler: program followed by its arguments.
    /// The source is written to its stdin and the result read from stdout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transpiler: Option<Vec<String>>,
    /// Minify the emitted script
    #[serde(default = "default_true")]
    pub minify: bool,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self { transpiler: None, minify: true }
    }
}

/// Image optimizer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// Reuse previously optimized bytes keyed by content hash
    #[serde(default = "default_true")]
    pub cache: bool,
    /// Cache location, relative to the project root
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Re-encoding quality for JPEG files (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".frontpipe-cache/images")
}

fn default_jpeg_quality() -> u8 {
    85
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self { cache: true, cache_dir: default_cache_dir(), jpeg_quality: default_jpeg_quality() }
    }
}

/// Dev server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory to serve (defaults to `project.out`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port(), base_dir: None }
    }
}

/// Watch mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce delay in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u32,
}

fn default_debounce_ms() -> u32 {
    100
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: default_debounce_ms() }
    }
}

/// Build behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Fail the build when any task recovered from a transform error
    #[serde(default)]
    pub strict: bool,
    /// Maximum number of tasks run concurrently
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

fn default_jobs() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self { strict: false, jobs: default_jobs() }
    }
}

fn default_true() -> bool {
    true
}

/// Complete `frontpipe.toml` configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub styles: StylesConfig,
    #[serde(default)]
    pub scripts: ScriptsConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub build: BuildConfig,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "assets.styles.src")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frontpipe.toml: '{}' {}", self.field, self.message)
    }
}

impl PipelineConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.project.name.is_empty() {
            errors.push(ConfigValidationError {
                field: "project.name".to_string(),
                message: "must be a non-empty string".to_string(),
            });
        }

        for class in AssetClass::ALL {
            let options = self.assets.get(class);
            if options.src.is_empty() {
                errors.push(ConfigValidationError {
                    field: format!("assets.{}.src", class),
                    message: "must contain at least one glob pattern".to_string(),
                });
            }

            let lists =
                [("src", &options.src), ("exclude", &options.exclude), ("watch", &options.watch)];
            for (key, list) in lists {
                for pattern in list {
                    if let Err(e) = glob::Pattern::new(pattern) {
                        errors.push(ConfigValidationError {
                            field: format!("assets.{}.{}", class, key),
                            message: format!("invalid glob '{}': {}", pattern, e),
                        });
                    }
                }
            }
        }

        if self.images.jpeg_quality == 0 || self.images.jpeg_quality > 100 {
            errors.push(ConfigValidationError {
                field: "images.jpeg_quality".to_string(),
                message: "must be between 1 and 100".to_string(),
            });
        }

        if let Some(argv) = &self.scripts.transpiler {
            if argv.is_empty() {
                errors.push(ConfigValidationError {
                    field: "scripts.transpiler".to_string(),
                    message: "must name a program when set".to_string(),
                });
            }
        }

        if self.server.port == 0 {
            errors.push(ConfigValidationError {
                field: "server.port".to_string(),
                message: "must be a non-zero port".to_string(),
            });
        }

        if self.build.jobs == 0 {
            errors.push(ConfigValidationError {
                field: "build.jobs".to_string(),
                message: "must be a positive integer".to_string(),
            });
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}
