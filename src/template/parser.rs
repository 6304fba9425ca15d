//! Line-oriented parser producing the template syntax tree.
//!
//! Parsing happens in two passes: source lines are grouped into an
//! indentation tree, then each line is classified and converted to a [`Node`].

use super::TemplateError;
use std::path::Path;

/// A node of the template syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// `doctype html`
    Doctype(String),
    /// A tag with attributes and children
    Element(Element),
    /// Raw text, possibly spanning several lines
    Text(String),
    /// Rendered HTML comment
    Comment(String),
    /// Named block, replaced by layouts
    Block(Block),
    /// Unresolved `include`
    Include { path: String, line: usize },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<Attr>,
    pub children: Vec<Node>,
    pub self_closing: bool,
}

/// An attribute; `value` is already HTML-escaped. `None` renders a boolean attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMode {
    Replace,
    Append,
    Prepend,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: String,
    pub mode: BlockMode,
    pub children: Vec<Node>,
}

/// A parsed template file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    /// Layout named by `extends`
    pub extends: Option<String>,
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone)]
struct Line {
    indent: usize,
    text: String,
    number: usize,
}

#[derive(Debug)]
struct RawNode {
    line: Line,
    children: Vec<RawNode>,
}

/// What follows the tag and its shorthand on an element line.
enum TagRest {
    None,
    Text(String),
    BlockText,
    Expansion(String),
}

enum AttrValue {
    Omit,
    Bool,
    Str(String),
}

/// Parse a template source file into a [`Document`].
pub fn parse(source: &str, file: &Path) -> Result<Document, TemplateError> {
    let parser = Parser { file };
    let lines = parser.split_lines(source)?;
    let mut idx = 0;
    let tree = parser.build_tree(&lines, &mut idx, None)?;
    parser.document(tree)
}

struct Parser<'a> {
    file: &'a Path,
}

impl<'a> Parser<'a> {
    fn syntax(&self, line: usize, message: impl Into<String>) -> TemplateError {
        TemplateError::Syntax { file: self.file.to_path_buf(), line, message: message.into() }
    }

    fn unsupported(&self, line: usize, construct: &str) -> TemplateError {
        TemplateError::Unsupported {
            file: self.file.to_path_buf(),
            line,
            construct: construct.to_string(),
        }
    }

    /// Split source into non-blank lines, joining attribute lists that span lines.
    ///
    /// Lines nested under block text or a comment are kept verbatim.
    fn split_lines(&self, source: &str) -> Result<Vec<Line>, TemplateError> {
        let mut lines = Vec::new();
        let mut iter = source.lines().enumerate();
        // Indent of the line that opened the current text block
        let mut text_block: Option<usize> = None;

        while let Some((i, raw)) = iter.next() {
            let trimmed = raw.trim_end();
            let content = trimmed.trim_start();
            if content.is_empty() {
                continue;
            }

            let indent = trimmed.len() - content.len();
            if let Some(open) = text_block {
                if indent > open {
                    lines.push(Line { indent, text: content.to_string(), number: i + 1 });
                    continue;
                }
                text_block = None;
            }

            let mut text = content.to_string();
            if starts_tag(&text) {
                while attrs_unterminated(&text) {
                    match iter.next() {
                        Some((_, next)) => {
                            text.push(' ');
                            text.push_str(next.trim());
                        }
                        None => return Err(self.syntax(i + 1, "unterminated attribute list")),
                    }
                }
            }

            if self.opens_text_block(&text) {
                text_block = Some(indent);
            }
            lines.push(Line { indent, text, number: i + 1 });
        }

        Ok(lines)
    }

    /// Whether the children of this line are raw text (`p.`, `li: p.`, `//`).
    fn opens_text_block(&self, text: &str) -> bool {
        if text.starts_with("//") {
            return true;
        }
        if !starts_tag(text) {
            return false;
        }
        match self.tag(text, 0) {
            Ok((_, TagRest::BlockText)) => true,
            Ok((_, TagRest::Expansion(inner))) => self.opens_text_block(&inner),
            _ => false,
        }
    }

    fn build_tree(
        &self,
        lines: &[Line],
        idx: &mut usize,
        parent: Option<usize>,
    ) -> Result<Vec<RawNode>, TemplateError> {
        let mut nodes = Vec::new();
        let mut level: Option<usize> = None;

        while *idx < lines.len() {
            let line = &lines[*idx];
            if let Some(p) = parent {
                if line.indent <= p {
                    break;
                }
            }

            match level {
                None => level = Some(line.indent),
                Some(l) if line.indent != l => {
                    return Err(self.syntax(line.number, "inconsistent indentation"));
                }
                _ => {}
            }

            *idx += 1;
            let children = self.build_tree(lines, idx, Some(line.indent))?;
            nodes.push(RawNode { line: line.clone(), children });
        }

        Ok(nodes)
    }

    fn document(&self, tree: Vec<RawNode>) -> Result<Document, TemplateError> {
        let mut doc = Document::default();
        let mut iter = tree.into_iter().peekable();

        if let Some(first) = iter.peek() {
            if let Some(path) = keyword_arg(&first.line.text, "extends") {
                if path.is_empty() {
                    return Err(self.syntax(first.line.number, "extends requires a path"));
                }
                if !first.children.is_empty() {
                    return Err(self.syntax(first.line.number, "extends cannot have children"));
                }
                doc.extends = Some(path.to_string());
                iter.next();
            }
        }

        for raw in iter {
            let nodes = self.convert(&raw)?;
            if doc.extends.is_some() {
                // Only block definitions matter in a template that extends a layout
                doc.nodes.extend(nodes.into_iter().filter(|n| matches!(n, Node::Block(_))));
            } else {
                doc.nodes.extend(nodes);
            }
        }

        Ok(doc)
    }

    fn convert_all(&self, raws: &[RawNode]) -> Result<Vec<Node>, TemplateError> {
        let mut nodes = Vec::new();
        for raw in raws {
            nodes.extend(self.convert(raw)?);
        }
        Ok(nodes)
    }

    fn convert(&self, raw: &RawNode) -> Result<Vec<Node>, TemplateError> {
        let text = raw.line.text.as_str();
        let number = raw.line.number;

        if text.starts_with("//-") {
            return Ok(vec![]);
        }

        if let Some(rest) = text.strip_prefix("//") {
            let mut lines = Vec::new();
            let first = rest.trim();
            if !first.is_empty() {
                lines.push(first.to_string());
            }
            lines.extend(flatten_text(&raw.children));
            return Ok(vec![Node::Comment(lines.join("\n"))]);
        }

        if let Some(kind) = keyword_arg(text, "doctype") {
            self.no_children(raw, "doctype")?;
            let kind = if kind.is_empty() { "html" } else { kind };
            return Ok(vec![Node::Doctype(kind.to_string())]);
        }

        if let Some(rest) = text.strip_prefix('|') {
            self.no_children(raw, "piped text")?;
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            return Ok(vec![Node::Text(rest.to_string())]);
        }

        if text.starts_with('<') {
            let mut nodes = vec![Node::Text(text.to_string())];
            nodes.extend(self.convert_all(&raw.children)?);
            return Ok(nodes);
        }

        if let Some(path) = keyword_arg(text, "include") {
            self.no_children(raw, "include")?;
            if path.is_empty() {
                return Err(self.syntax(number, "include requires a path"));
            }
            return Ok(vec![Node::Include { path: path.to_string(), line: number }]);
        }

        if let Some((name, mode)) = block_header(text) {
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(self.syntax(number, "block requires a single name"));
            }
            let children = self.convert_all(&raw.children)?;
            return Ok(vec![Node::Block(Block { name: name.to_string(), mode, children })]);
        }

        if keyword_arg(text, "extends").is_some() {
            return Err(self.syntax(number, "extends must be the first line of a template"));
        }

        if let Some(construct) = unsupported_construct(text) {
            return Err(self.unsupported(number, construct));
        }

        if !starts_tag(text) {
            return Err(self.syntax(number, format!("unexpected text '{}'", text)));
        }

        Ok(vec![Node::Element(self.element(text, &raw.children, number)?)])
    }

    fn no_children(&self, raw: &RawNode, what: &str) -> Result<(), TemplateError> {
        if raw.children.is_empty() {
            Ok(())
        } else {
            Err(self.syntax(raw.line.number, format!("{} cannot have nested content", what)))
        }
    }

    fn element(
        &self,
        text: &str,
        children: &[RawNode],
        number: usize,
    ) -> Result<Element, TemplateError> {
        let (mut el, rest) = self.tag(text, number)?;

        match rest {
            TagRest::None => el.children = self.convert_all(children)?,
            TagRest::Text(inline) => {
                el.children.push(Node::Text(inline));
                el.children.extend(self.convert_all(children)?);
            }
            TagRest::BlockText => {
                let lines = flatten_text(children);
                if !lines.is_empty() {
                    el.children.push(Node::Text(lines.join("\n")));
                }
            }
            TagRest::Expansion(inner) => {
                if !starts_tag(&inner) {
                    return Err(self.syntax(number, "expected a tag after ':'"));
                }
                el.children.push(Node::Element(self.element(&inner, children, number)?));
            }
        }

        if el.self_closing && !el.children.is_empty() {
            return Err(self.syntax(number, format!("self-closing <{}> cannot have content", el.name)));
        }

        Ok(el)
    }

    /// Parse `tag#id.class(attrs)` and classify what follows it.
    fn tag(&self, text: &str, number: usize) -> Result<(Element, TagRest), TemplateError> {
        let b = text.as_bytes();
        let len = b.len();
        let mut i = 0;
        let mut el = Element::default();

        if b.first().is_some_and(|c| c.is_ascii_alphabetic()) {
            while i < len && is_ident_byte(b[i]) {
                i += 1;
            }
            el.name = text[..i].to_string();
        } else {
            el.name = "div".to_string();
        }

        loop {
            match b.get(i) {
                Some(b'#') => {
                    i += 1;
                    let start = i;
                    while i < len && is_ident_byte(b[i]) {
                        i += 1;
                    }
                    if start == i {
                        return Err(self.syntax(number, "expected an id after '#'"));
                    }
                    set_attr(&mut el.attrs, "id", Some(text[start..i].to_string()));
                }
                Some(b'.') => {
                    i += 1;
                    if i == len {
                        return Ok((el, TagRest::BlockText));
                    }
                    let start = i;
                    while i < len && is_ident_byte(b[i]) {
                        i += 1;
                    }
                    if start == i {
                        return Err(self.syntax(number, "expected a class name after '.'"));
                    }
                    add_class(&mut el.attrs, &text[start..i]);
                }
                Some(b'(') => {
                    let (end, attrs) = self.attributes(text, i + 1, number)?;
                    for attr in attrs {
                        match (attr.name.as_str(), attr.value) {
                            ("class", Some(value)) => add_class(&mut el.attrs, &value),
                            (name, value) => set_attr(&mut el.attrs, name, value),
                        }
                    }
                    i = end;
                }
                Some(b'/') => {
                    el.self_closing = true;
                    i += 1;
                    break;
                }
                _ => break,
            }
        }

        let rest = &text[i..];
        let rest = if rest.is_empty() {
            TagRest::None
        } else if let Some(inner) = rest.strip_prefix(':') {
            let inner = inner.trim_start();
            if inner.is_empty() {
                return Err(self.syntax(number, "expected a tag after ':'"));
            }
            TagRest::Expansion(inner.to_string())
        } else if rest.starts_with('=') || rest.starts_with("!=") {
            return Err(self.unsupported(number, "buffered code"));
        } else if let Some(inline) = rest.strip_prefix(' ') {
            TagRest::Text(inline.to_string())
        } else {
            return Err(self.syntax(number, format!("unexpected '{}' after tag", rest)));
        };

        Ok((el, rest))
    }

    /// Parse an attribute list starting just after `(`.
    ///
    /// Returns the index just past the closing `)` and the parsed attributes.
    fn attributes(
        &self,
        text: &str,
        start: usize,
        number: usize,
    ) -> Result<(usize, Vec<Attr>), TemplateError> {
        let b = text.as_bytes();
        let len = b.len();
        let mut i = start;
        let mut attrs = Vec::new();

        loop {
            while i < len && (b[i].is_ascii_whitespace() || b[i] == b',') {
                i += 1;
            }
            if i >= len {
                return Err(self.syntax(number, "unterminated attribute list"));
            }
            if b[i] == b')' {
                return Ok((i + 1, attrs));
            }

            let (name, next) = if b[i] == b'"' || b[i] == b'\'' {
                self.quoted(text, i, number)?
            } else {
                let name_start = i;
                while i < len && !ends_attr_name(b, i) {
                    i += 1;
                }
                (text[name_start..i].to_string(), i)
            };
            if name.is_empty() {
                return Err(self.syntax(number, "expected an attribute name"));
            }
            i = next;

            while i < len && b[i] == b' ' {
                i += 1;
            }

            let escape = if text[i..].starts_with("!=") {
                i += 2;
                false
            } else if b.get(i) == Some(&b'=') {
                i += 1;
                true
            } else {
                attrs.push(Attr { name, value: None });
                continue;
            };

            while i < len && b[i] == b' ' {
                i += 1;
            }

            let (value, next) = self.attr_value(text, i, number)?;
            i = next;
            if i < len && !(b[i].is_ascii_whitespace() || b[i] == b',' || b[i] == b')') {
                return Err(self.unsupported(number, "attribute expression"));
            }

            match value {
                AttrValue::Omit => {}
                AttrValue::Bool => attrs.push(Attr { name, value: None }),
                AttrValue::Str(s) => {
                    let value = if escape { escape_attr(&s) } else { s };
                    attrs.push(Attr { name, value: Some(value) });
                }
            }
        }
    }

    fn attr_value(
        &self,
        text: &str,
        start: usize,
        number: usize,
    ) -> Result<(AttrValue, usize), TemplateError> {
        let b = text.as_bytes();
        match b.get(start) {
            None => Err(self.syntax(number, "expected an attribute value")),
            Some(b'"') | Some(b'\'') => {
                let (value, end) = self.quoted(text, start, number)?;
                Ok((AttrValue::Str(value), end))
            }
            Some(_) => {
                let mut end = start;
                while end < b.len()
                    && !(b[end].is_ascii_whitespace() || b[end] == b',' || b[end] == b')')
                {
                    end += 1;
                }
                let token = &text[start..end];
                let value = match token {
                    "true" => AttrValue::Bool,
                    "false" | "null" | "undefined" => AttrValue::Omit,
                    t if t.parse::<f64>().is_ok() => AttrValue::Str(t.to_string()),
                    _ => return Err(self.unsupported(number, "attribute expression")),
                };
                Ok((value, end))
            }
        }
    }

    /// Read a quoted string starting at the opening quote.
    fn quoted(
        &self,
        text: &str,
        start: usize,
        number: usize,
    ) -> Result<(String, usize), TemplateError> {
        let quote = text[start..].chars().next().unwrap_or('"');
        let mut value = String::new();
        let mut escaped = false;

        for (offset, c) in text[start + 1..].char_indices() {
            if escaped {
                value.push(c);
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                return Ok((value, start + 1 + offset + 1));
            } else {
                value.push(c);
            }
        }

        Err(self.syntax(number, "unterminated string"))
    }
}

fn is_ident_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'-' || c == b'_'
}

fn ends_attr_name(b: &[u8], i: usize) -> bool {
    match b[i] {
        b'=' | b',' | b')' => true,
        b'!' => b.get(i + 1) == Some(&b'='),
        c => c.is_ascii_whitespace(),
    }
}

/// Whether a line is shaped like an element (`tag`, `#id`, `.class`).
fn starts_tag(text: &str) -> bool {
    let b = text.as_bytes();
    match b.first() {
        Some(c) if c.is_ascii_alphabetic() => true,
        Some(b'.') | Some(b'#') => b.get(1).is_some_and(|c| is_ident_byte(*c)),
        _ => false,
    }
}

/// Whether the attribute list opened by the tag is still open at end of line.
fn attrs_unterminated(text: &str) -> bool {
    let open = match (text.find('('), text.find(' ')) {
        (Some(paren), Some(space)) if paren < space => paren,
        (Some(paren), None) => paren,
        _ => return false,
    };

    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in text[open..].chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}

/// Match `keyword` or `keyword <arg>`, returning the trimmed argument.
fn keyword_arg<'t>(text: &'t str, keyword: &str) -> Option<&'t str> {
    let rest = text.strip_prefix(keyword)?;
    if rest.is_empty() {
        Some("")
    } else if rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

fn block_header(text: &str) -> Option<(&str, BlockMode)> {
    if let Some(rest) = keyword_arg(text, "block") {
        if let Some(name) = keyword_arg(rest, "append") {
            return Some((name, BlockMode::Append));
        }
        if let Some(name) = keyword_arg(rest, "prepend") {
            return Some((name, BlockMode::Prepend));
        }
        return Some((rest, BlockMode::Replace));
    }
    if let Some(name) = keyword_arg(text, "append") {
        return Some((name, BlockMode::Append));
    }
    keyword_arg(text, "prepend").map(|name| (name, BlockMode::Prepend))
}

fn unsupported_construct(text: &str) -> Option<&'static str> {
    if text.starts_with('-') {
        return Some("unbuffered code");
    }
    if text.starts_with('=') || text.starts_with("!=") {
        return Some("buffered code");
    }
    if text.starts_with('+') {
        return Some("mixin call");
    }
    if text.starts_with(':') {
        return Some("filter");
    }
    match text.split_whitespace().next() {
        Some("if") | Some("else") | Some("unless") => Some("conditional"),
        Some("each") | Some("for") | Some("while") => Some("iteration"),
        Some("case") | Some("when") | Some("default") => Some("case"),
        Some("mixin") => Some("mixin"),
        _ => None,
    }
}

/// Flatten nested lines back to text, keeping indentation relative to the shallowest line.
fn flatten_text(raws: &[RawNode]) -> Vec<String> {
    fn collect<'r>(raws: &'r [RawNode], out: &mut Vec<&'r Line>) {
        for raw in raws {
            out.push(&raw.line);
            collect(&raw.children, out);
        }
    }

    let mut lines = Vec::new();
    collect(raws, &mut lines);
    let base = lines.iter().map(|l| l.indent).min().unwrap_or(0);
    lines.iter().map(|l| format!("{}{}", " ".repeat(l.indent - base), l.text)).collect()
}

fn set_attr(attrs: &mut Vec<Attr>, name: &str, value: Option<String>) {
    match attrs.iter_mut().find(|a| a.name == name) {
        Some(existing) => existing.value = value,
        None => attrs.push(Attr { name: name.to_string(), value }),
    }
}

fn add_class(attrs: &mut Vec<Attr>, class: &str) {
    match attrs.iter_mut().find(|a| a.name == "class") {
        Some(Attr { value: Some(existing), .. }) => {
            existing.push(' ');
            existing.push_str(class);
        }
        Some(existing) => existing.value = Some(class.to_string()),
        None => attrs.push(Attr { name: "class".to_string(), value: Some(class.to_string()) }),
    }
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
