//! frontpipe - Front-end asset pipeline
//!
//! This library provides functionality to:
//! - Compile Pug templates to HTML
//! - Compile SCSS to vendor-prefixed CSS
//! - Transpile and minify scripts
//! - Optimize images and copy fonts
//! - Rebuild on change and serve the output with live reload

pub mod asset;
pub mod build;
pub mod cli;
pub mod config;
pub mod reload;
pub mod server;
pub mod template;
pub mod transforms;
pub mod watch;
