//! HTML rendering of resolved template trees.

use super::parser::{Attr, Element, Node};

/// Elements that never have a closing tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose content is whitespace-sensitive and always rendered inline.
const INLINE_CONTENT: &[&str] = &["pre", "textarea"];

const INDENT: &str = "  ";

/// Render nodes to HTML.
///
/// In pretty mode every element starts on its own line, indented two spaces
/// per level. Otherwise no whitespace is added between tags.
pub fn render(nodes: &[Node], pretty: bool) -> String {
    let mut out = String::new();
    let mut renderer = Renderer { out: &mut out, pretty };
    renderer.nodes(nodes, 0);
    out
}

struct Renderer<'a> {
    out: &'a mut String,
    pretty: bool,
}

impl Renderer<'_> {
    fn nodes(&mut self, nodes: &[Node], depth: usize) {
        for node in nodes {
            self.node(node, depth);
        }
    }

    fn node(&mut self, node: &Node, depth: usize) {
        match node {
            Node::Doctype(kind) => {
                let doctype = if kind == "html" {
                    "<!DOCTYPE html>".to_string()
                } else {
                    format!("<!DOCTYPE {}>", kind)
                };
                self.line(depth, &doctype);
            }
            Node::Text(text) if self.pretty => {
                for line in text.lines() {
                    self.line(depth, line);
                }
            }
            Node::Text(text) => self.out.push_str(text),
            Node::Comment(text) => {
                if text.contains('\n') && self.pretty {
                    self.line(depth, "<!--");
                    for line in text.lines() {
                        self.line(depth + 1, line);
                    }
                    self.line(depth, "-->");
                } else {
                    self.line(depth, &format!("<!-- {} -->", text.replace('\n', " ")));
                }
            }
            Node::Element(el) => self.element(el, depth),
            Node::Block(block) => self.nodes(&block.children, depth),
            // Includes are expanded before rendering
            Node::Include { .. } => {}
        }
    }

    fn element(&mut self, el: &Element, depth: usize) {
        let open = open_tag(el);

        if VOID_ELEMENTS.contains(&el.name.as_str()) {
            self.line(depth, &open);
            return;
        }
        if el.self_closing {
            self.line(depth, &format!("{}/>", &open[..open.len() - 1]));
            return;
        }

        let close = format!("</{}>", el.name);
        if !self.pretty {
            self.out.push_str(&open);
            self.nodes(&el.children, depth + 1);
            self.out.push_str(&close);
            return;
        }

        let inline = match el.children.as_slice() {
            [] => Some(String::new()),
            [Node::Text(text)] if !text.contains('\n') => Some(text.clone()),
            _ if INLINE_CONTENT.contains(&el.name.as_str()) => Some(inline_content(&el.children)),
            _ => None,
        };

        match inline {
            Some(content) => self.line(depth, &format!("{}{}{}", open, content, close)),
            None => {
                self.line(depth, &open);
                self.nodes(&el.children, depth + 1);
                self.line(depth, &close);
            }
        }
    }

    fn line(&mut self, depth: usize, text: &str) {
        if self.pretty {
            for _ in 0..depth {
                self.out.push_str(INDENT);
            }
            self.out.push_str(text);
            self.out.push('\n');
        } else {
            self.out.push_str(text);
        }
    }
}

fn open_tag(el: &Element) -> String {
    let mut tag = format!("<{}", el.name);
    for Attr { name, value } in &el.attrs {
        match value {
            Some(value) => tag.push_str(&format!(" {}=\"{}\"", name, value)),
            None => {
                tag.push(' ');
                tag.push_str(name);
            }
        }
    }
    tag.push('>');
    tag
}

fn inline_content(children: &[Node]) -> String {
    let mut out = String::new();
    let mut renderer = Renderer { out: &mut out, pretty: false };
    for child in children {
        if let (Node::Text(_), false) = (child, renderer.out.is_empty()) {
            renderer.out.push('\n');
        }
        renderer.node(child, 0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::parser::Block;
    use crate::template::BlockMode;

    fn el(name: &str, children: Vec<Node>) -> Node {
        Node::Element(Element { name: name.to_string(), children, ..Default::default() })
    }

    fn text(s: &str) -> Node {
        Node::Text(s.to_string())
    }

    #[test]
    fn test_void_elements() {
        let node = Node::Element(Element {
            name: "img".to_string(),
            attrs: vec![Attr { name: "src".to_string(), value: Some("a.png".to_string()) }],
            ..Default::default()
        });
        assert_eq!(render(&[node], false), "<img src=\"a.png\">");
    }

    #[test]
    fn test_boolean_attribute() {
        let node = Node::Element(Element {
            name: "input".to_string(),
            attrs: vec![Attr { name: "checked".to_string(), value: None }],
            ..Default::default()
        });
        assert_eq!(render(&[node], false), "<input checked>");
    }

    #[test]
    fn test_self_closing_custom_element() {
        let node =
            Node::Element(Element { name: "foo".to_string(), self_closing: true, ..Default::default() });
        assert_eq!(render(&[node], false), "<foo/>");
    }

    #[test]
    fn test_empty_element_on_one_line() {
        assert_eq!(render(&[el("div", vec![])], true), "<div></div>\n");
    }

    #[test]
    fn test_mixed_children_are_indented() {
        let node = el("p", vec![text("Hello"), el("b", vec![text("world")])]);
        assert_eq!(render(&[node], true), "<p>\n  Hello\n  <b>world</b>\n</p>\n");
    }

    #[test]
    fn test_pre_stays_inline() {
        let node = el("pre", vec![text("a\n  b")]);
        assert_eq!(render(&[node], true), "<pre>a\n  b</pre>\n");
    }

    #[test]
    fn test_comments() {
        assert_eq!(render(&[Node::Comment("note".to_string())], true), "<!-- note -->\n");
        assert_eq!(
            render(&[Node::Comment("a\nb".to_string())], true),
            "<!--\n  a\n  b\n-->\n"
        );
    }

    #[test]
    fn test_blocks_render_children() {
        let block = Node::Block(Block {
            name: "content".to_string(),
            mode: BlockMode::Replace,
            children: vec![el("main", vec![])],
        });
        assert_eq!(render(&[block], false), "<main></main>");
    }
}
