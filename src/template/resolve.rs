//! Include and layout resolution.
//!
//! Turns a parsed [`Document`] into a self-contained node list: includes are
//! spliced in, and `extends` chains are walked up to the root layout with
//! block overrides applied along the way.

use super::parser::{self, Block, BlockMode, Document, Node};
use super::{TemplateError, TemplateOptions};
use std::fs;
use std::path::{Path, PathBuf};

/// Maximum include/extends nesting.
pub const MAX_DEPTH: usize = 32;

pub struct Resolver<'a> {
    options: &'a TemplateOptions,
    stack: Vec<PathBuf>,
}

impl<'a> Resolver<'a> {
    pub fn new(options: &'a TemplateOptions) -> Self {
        Self { options, stack: Vec::new() }
    }

    /// Resolve the template at `path`, reading it unless `source` is given.
    pub fn resolve(&mut self, path: &Path, source: Option<&str>) -> Result<Vec<Node>, TemplateError> {
        self.enter(path)?;
        let doc = match source {
            Some(source) => parser::parse(source, path)?,
            None => self.load(path)?,
        };

        let nodes = match doc.extends {
            Some(layout) => {
                let overrides = blocks(self.expand_includes(doc.nodes, path)?);
                self.layout(path, &layout, overrides)?
            }
            None => self.expand_includes(doc.nodes, path)?,
        };

        self.stack.pop();
        Ok(nodes)
    }

    /// Render the layout `target` named by `from`, applying `overrides`.
    fn layout(
        &mut self,
        from: &Path,
        target: &str,
        overrides: Vec<Block>,
    ) -> Result<Vec<Node>, TemplateError> {
        let path = self.reference(from, target, 1)?;
        self.enter(&path)?;
        let doc = self.load(&path)?;
        let mut nodes = self.expand_includes(doc.nodes, &path)?;

        let nodes = match doc.extends {
            Some(parent) => {
                // Intermediate layout: fold overrides into its own blocks and keep climbing
                let mut passthrough = Vec::new();
                for block in overrides {
                    match find_block(&mut nodes, &block.name) {
                        Some(target) => merge_block(target, block),
                        None => passthrough.push(block),
                    }
                }
                let mut own = blocks(nodes);
                own.extend(passthrough);
                self.layout(&path, &parent, own)?
            }
            None => {
                let mut visiting = Vec::new();
                replace_blocks(&mut nodes, &overrides, &mut visiting);
                nodes
            }
        };

        self.stack.pop();
        Ok(nodes)
    }

    fn expand_includes(&mut self, nodes: Vec<Node>, file: &Path) -> Result<Vec<Node>, TemplateError> {
        let mut out = Vec::with_capacity(nodes.len());

        for node in nodes {
            match node {
                Node::Include { path, line } => {
                    let target = self.reference(file, &path, line)?;
                    if is_template(&target) {
                        self.enter(&target)?;
                        let doc = self.load(&target)?;
                        if doc.extends.is_some() {
                            return Err(TemplateError::Syntax {
                                file: file.to_path_buf(),
                                line,
                                message: format!("included template '{}' cannot use extends", path),
                            });
                        }
                        out.extend(self.expand_includes(doc.nodes, &target)?);
                        self.stack.pop();
                    } else {
                        let text = fs::read_to_string(&target)
                            .map_err(|source| TemplateError::Io { path: target.clone(), source })?;
                        out.push(Node::Text(text.trim_end().to_string()));
                    }
                }
                Node::Element(mut el) => {
                    el.children = self.expand_includes(el.children, file)?;
                    out.push(Node::Element(el));
                }
                Node::Block(mut block) => {
                    block.children = self.expand_includes(block.children, file)?;
                    out.push(Node::Block(block));
                }
                other => out.push(other),
            }
        }

        Ok(out)
    }

    /// Resolve an include/extends reference relative to the file naming it.
    fn reference(&self, from: &Path, target: &str, line: usize) -> Result<PathBuf, TemplateError> {
        let mut path = match target.strip_prefix('/') {
            Some(absolute) => match &self.options.basedir {
                Some(basedir) => basedir.join(absolute),
                None => {
                    return Err(TemplateError::Syntax {
                        file: from.to_path_buf(),
                        line,
                        message: format!("absolute path '{}' requires a basedir", target),
                    })
                }
            },
            None => from.parent().unwrap_or_else(|| Path::new("")).join(target),
        };

        if path.extension().is_none() {
            path.set_extension("pug");
        }
        Ok(path)
    }

    fn enter(&mut self, path: &Path) -> Result<(), TemplateError> {
        let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if self.stack.contains(&canonical) {
            return Err(TemplateError::Cycle(path.to_path_buf()));
        }
        if self.stack.len() >= MAX_DEPTH {
            return Err(TemplateError::TooDeep(MAX_DEPTH));
        }
        self.stack.push(canonical);
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<Document, TemplateError> {
        let source = fs::read_to_string(path)
            .map_err(|source| TemplateError::Io { path: path.to_path_buf(), source })?;
        parser::parse(&source, path)
    }
}

fn is_template(path: &Path) -> bool {
    matches!(path.extension().and_then(|e| e.to_str()), Some("pug") | Some("jade"))
}

fn blocks(nodes: Vec<Node>) -> Vec<Block> {
    nodes
        .into_iter()
        .filter_map(|n| match n {
            Node::Block(b) => Some(b),
            _ => None,
        })
        .collect()
}

/// Find a block by name anywhere in a node tree.
fn find_block<'b>(nodes: &'b mut [Node], name: &str) -> Option<&'b mut Block> {
    nodes.iter_mut().find_map(|node| match node {
        Node::Block(b) => {
            if b.name == name {
                Some(b)
            } else {
                find_block(&mut b.children, name)
            }
        }
        Node::Element(el) => find_block(&mut el.children, name),
        _ => None,
    })
}

fn merge_block(target: &mut Block, with: Block) {
    match with.mode {
        BlockMode::Replace => target.children = with.children,
        BlockMode::Append => target.children.extend(with.children),
        BlockMode::Prepend => {
            let mut children = with.children;
            children.append(&mut target.children);
            target.children = children;
        }
    }
}

/// Apply overrides to the named blocks of a root layout.
///
/// `visiting` holds the blocks currently being expanded so that an override
/// containing its own block name is not applied twice.
fn replace_blocks(nodes: &mut [Node], overrides: &[Block], visiting: &mut Vec<String>) {
    for node in nodes {
        match node {
            Node::Block(block) => {
                if visiting.contains(&block.name) {
                    continue;
                }
                let name = block.name.clone();
                for o in overrides.iter().filter(|o| o.name == name) {
                    merge_block(block, o.clone());
                }
                visiting.push(name);
                replace_blocks(&mut block.children, overrides, visiting);
                visiting.pop();
            }
            Node::Element(el) => replace_blocks(&mut el.children, overrides, visiting),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::compile_file;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    fn compact() -> TemplateOptions {
        TemplateOptions { pretty: false, basedir: None }
    }

    #[test]
    fn test_include_template_and_raw_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "blocks/nav.pug", "nav: a(href=\"/\") Home");
        write(dir.path(), "blocks/inline.css", "body { margin: 0 }\n");
        let page = write(
            dir.path(),
            "index.pug",
            "body\n  include blocks/nav\n  style\n    include blocks/inline.css",
        );

        let html = compile_file(&page, &compact()).unwrap();
        assert_eq!(
            html,
            "<body><nav><a href=\"/\">Home</a></nav><style>body { margin: 0 }</style></body>"
        );
    }

    #[test]
    fn test_extends_replace_append_prepend() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "layout/base.pug",
            "html\n  head\n    block head\n      title Site\n  body\n    block content\n    block scripts\n      script(src=\"/a.js\")",
        );
        let page = write(
            dir.path(),
            "index.pug",
            "extends layout/base\nblock content\n  h1 Hi\nappend scripts\n  script(src=\"/b.js\")\nprepend head\n  meta(charset=\"utf-8\")",
        );

        let html = compile_file(&page, &compact()).unwrap();
        assert_eq!(
            html,
            "<html><head><meta charset=\"utf-8\"><title>Site</title></head><body><h1>Hi</h1><script src=\"/a.js\"></script><script src=\"/b.js\"></script></body></html>"
        );
    }

    #[test]
    fn test_multi_level_layouts() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "base.pug", "body\n  block main");
        write(dir.path(), "two-col.pug", "extends base\nblock main\n  aside\n    block side\n  section\n    block body");
        let page = write(dir.path(), "page.pug", "extends two-col\nblock side\n  p S\nblock body\n  p B");

        let html = compile_file(&page, &compact()).unwrap();
        assert_eq!(html, "<body><aside><p>S</p></aside><section><p>B</p></section></body>");
    }

    #[test]
    fn test_unoverridden_block_keeps_default() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "base.pug", "footer\n  block footer\n    p Default");
        let page = write(dir.path(), "page.pug", "extends base");

        let html = compile_file(&page, &compact()).unwrap();
        assert_eq!(html, "<footer><p>Default</p></footer>");
    }

    #[test]
    fn test_include_cycle() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.pug", "div\n  include b");
        write(dir.path(), "b.pug", "p\n  include a");
        let err = compile_file(&dir.path().join("a.pug"), &compact()).unwrap_err();
        assert!(matches!(err, TemplateError::Cycle(_)), "{:?}", err);
    }

    #[test]
    fn test_missing_include() {
        let dir = TempDir::new().unwrap();
        let page = write(dir.path(), "page.pug", "include nope");
        let err = compile_file(&page, &compact()).unwrap_err();
        assert!(matches!(err, TemplateError::Io { .. }));
    }

    #[test]
    fn test_absolute_include_uses_basedir() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "partials/hello.pug", "p hello");
        let page = write(dir.path(), "pages/index.pug", "include /partials/hello");

        let options = TemplateOptions { pretty: false, basedir: Some(dir.path().to_path_buf()) };
        assert_eq!(compile_file(&page, &options).unwrap(), "<p>hello</p>");
        assert!(compile_file(&page, &compact()).is_err());
    }

    #[test]
    fn test_reference_adds_extension() {
        let options = compact();
        let resolver = Resolver::new(&options);
        let path = resolver.reference(Path::new("views/index.pug"), "blocks/nav", 1).unwrap();
        assert_eq!(path, PathBuf::from("views/blocks/nav.pug"));
    }

    #[test]
    fn test_find_block_nested_in_elements() {
        let doc = parser::parse("main\n  section\n    block body\n      p Default", Path::new("t.pug")).unwrap();
        let mut nodes = doc.nodes;

        let found = find_block(&mut nodes, "body").unwrap();
        found.children.clear();
        assert!(find_block(&mut nodes, "body").unwrap().children.is_empty());
        assert!(find_block(&mut nodes, "missing").is_none());
    }

    #[test]
    fn test_replace_blocks_applies_every_override() {
        let mut nodes = parser::parse("div\n  block scripts\n    p a", Path::new("t.pug")).unwrap().nodes;
        let overrides = parser::parse("append scripts\n  p b\nappend scripts\n  p c", Path::new("o.pug"))
            .unwrap()
            .nodes;

        let mut visiting = Vec::new();
        replace_blocks(&mut nodes, &blocks(overrides), &mut visiting);

        let block = find_block(&mut nodes, "scripts").unwrap();
        assert_eq!(block.children.len(), 3);
        assert!(visiting.is_empty());
    }
}
