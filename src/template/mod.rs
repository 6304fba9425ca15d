//! Pug-subset template compiler.
//!
//! Compiles indentation-based `.pug` view files into HTML. Supported:
//!
//! - `doctype`, tags with `#id` / `.class` shorthand and `( … )` attribute lists
//! - inline text, piped text (`|`), block text (`script.`), block expansion (`li: a`)
//! - `//` HTML comments and `//-` silent comments, literal `<html>` lines
//! - `include` (templates are spliced, other files inlined as raw text)
//! - `extends` with `block`, `block append` / `append`, `block prepend` / `prepend`
//!
//! Code lines, mixins, conditionals and iteration are rejected with
//! [`TemplateError::Unsupported`].
//!
//! # Example
//!
//! ```ignore
//! use frontpipe::template::{compile_file, TemplateOptions};
//!
//! let html = compile_file(Path::new("app/views/index.pug"), &TemplateOptions::default())?;
//! ```

mod parser;
mod render;
mod resolve;

pub use parser::{Attr, Block, BlockMode, Document, Element, Node};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Template compilation error
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Malformed template source
    #[error("{}:{}: {}", .file.display(), .line, .message)]
    Syntax { file: PathBuf, line: usize, message: String },
    /// Construct outside the supported subset
    #[error("{}:{}: unsupported construct: {}", .file.display(), .line, .construct)]
    Unsupported { file: PathBuf, line: usize, construct: String },
    /// Template or included file could not be read
    #[error("failed to read {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A template includes or extends itself
    #[error("include cycle through {}", .0.display())]
    Cycle(PathBuf),
    /// Include/extends nesting limit exceeded
    #[error("templates nested deeper than {0} levels")]
    TooDeep(usize),
}

/// Compiler options
#[derive(Debug, Clone)]
pub struct TemplateOptions {
    /// Indent output and place each block element on its own line
    pub pretty: bool,
    /// Root for absolute (`/partials/nav`) include and extends paths
    pub basedir: Option<PathBuf>,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self { pretty: true, basedir: None }
    }
}

/// Compile a template file to HTML.
pub fn compile_file(path: &Path, options: &TemplateOptions) -> Result<String, TemplateError> {
    let nodes = resolve::Resolver::new(options).resolve(path, None)?;
    Ok(render::render(&nodes, options.pretty))
}

/// Compile template source that lives at `path`.
///
/// `path` is used for error messages and to resolve relative includes.
pub fn compile_str(
    source: &str,
    path: &Path,
    options: &TemplateOptions,
) -> Result<String, TemplateError> {
    let nodes = resolve::Resolver::new(options).resolve(path, Some(source))?;
    Ok(render::render(&nodes, options.pretty))
}

/// Parse template source without resolving includes or layouts.
pub fn parse(source: &str, path: &Path) -> Result<Document, TemplateError> {
    parser::parse(source, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(source: &str) -> String {
        compile_str(source, Path::new("test.pug"), &TemplateOptions::default()).unwrap()
    }

    #[test]
    fn test_compile_document() {
        let html = compile(
            "doctype html\nhtml(lang=\"en\")\n  head\n    title Home\n  body\n    h1.title Hello\n",
        );
        assert_eq!(
            html,
            "<!DOCTYPE html>\n<html lang=\"en\">\n  <head>\n    <title>Home</title>\n  </head>\n  <body>\n    <h1 class=\"title\">Hello</h1>\n  </body>\n</html>\n"
        );
    }

    #[test]
    fn test_compile_compact() {
        let options = TemplateOptions { pretty: false, basedir: None };
        let html = compile_str("ul\n  li one\n  li two", Path::new("t.pug"), &options).unwrap();
        assert_eq!(html, "<ul><li>one</li><li>two</li></ul>");
    }

    #[test]
    fn test_error_display_includes_location() {
        let err = compile_str("div\n  - var x = 1", Path::new("page.pug"), &TemplateOptions::default())
            .unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("page.pug:2:"), "{}", message);
        assert!(matches!(err, TemplateError::Unsupported { line: 2, .. }));
    }
}
