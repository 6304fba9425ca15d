//! Template compiler integration tests
//!
//! Compiles small view trees from disk, the way the templates task does.

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use frontpipe::template::{compile_file, compile_str, TemplateError, TemplateOptions};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn compact() -> TemplateOptions {
    TemplateOptions { pretty: false, basedir: None }
}

#[test]
fn test_page_with_layout_chain_and_partials() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(
        root,
        "layout/base.pug",
        "doctype html\nhtml\n  head\n    block head\n      title Default\n  body\n    block content\n    block scripts\n      script(src=\"/scripts/main.js\")\n",
    );
    write(
        root,
        "layout/page.pug",
        "extends base\n\nblock content\n  include ../blocks/header\n  main\n    block main\n",
    );
    write(root, "blocks/header.pug", "header.site\n  h1 Site\n");
    write(
        root,
        "about.pug",
        "extends layout/page\n\nblock head\n  title About\n\nblock main\n  p About us\n\nappend scripts\n  script(src=\"/scripts/about.js\")\n",
    );

    let html = compile_file(&root.join("about.pug"), &compact()).unwrap();
    assert_eq!(
        html,
        "<!DOCTYPE html><html><head><title>About</title></head><body>\
         <header class=\"site\"><h1>Site</h1></header><main><p>About us</p></main>\
         <script src=\"/scripts/main.js\"></script><script src=\"/scripts/about.js\"></script>\
         </body></html>"
    );
}

#[test]
fn test_absolute_include_uses_basedir() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "views/blocks/footer.pug", "footer Bye");
    write(root, "views/pages/deep/page.pug", "div\n  include /blocks/footer\n");

    let options = TemplateOptions { pretty: false, basedir: Some(root.join("views")) };
    let html = compile_file(&root.join("views/pages/deep/page.pug"), &options).unwrap();
    assert_eq!(html, "<div><footer>Bye</footer></div>");
}

#[test]
fn test_raw_include_is_inlined() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "snippet.html", "<b>raw</b>\n");
    write(root, "index.pug", "p\n  include snippet.html\n");

    let html = compile_file(&root.join("index.pug"), &compact()).unwrap();
    assert_eq!(html, "<p><b>raw</b></p>");
}

#[test]
fn test_pretty_output() {
    let source = "ul#menu\n  li: a(href=\"/\") Home\n  li: a(href=\"/about\") About\n";
    let html = compile_str(source, Path::new("menu.pug"), &TemplateOptions::default()).unwrap();
    assert_eq!(
        html,
        "<ul id=\"menu\">\n  <li>\n    <a href=\"/\">Home</a>\n  </li>\n  \
         <li>\n    <a href=\"/about\">About</a>\n  </li>\n</ul>\n"
    );
}

#[test]
fn test_mutual_includes_are_a_cycle() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "a.pug", "div\n  include b\n");
    write(root, "b.pug", "span\n  include a\n");

    let err = compile_file(&root.join("a.pug"), &compact()).unwrap_err();
    assert!(matches!(err, TemplateError::Cycle(_)), "{}", err);
}

#[test]
fn test_missing_layout_reports_path() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "page.pug", "extends missing\n\nblock content\n  p x\n");

    let err = compile_file(&root.join("page.pug"), &compact()).unwrap_err();
    assert!(matches!(err, TemplateError::Io { .. }));
    assert!(err.to_string().contains("missing.pug"), "{}", err);
}

#[test]
fn test_unsupported_constructs_report_line() {
    let source = "div\n  each item in items\n    p= item\n";
    let err = compile_str(source, Path::new("list.pug"), &compact()).unwrap_err();
    match err {
        TemplateError::Unsupported { line, construct, .. } => {
            assert_eq!(line, 2);
            assert_eq!(construct, "iteration");
        }
        other => panic!("unexpected error: {}", other),
    }
}
