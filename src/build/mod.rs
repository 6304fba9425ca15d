//! Build pipeline module for frontpipe
//!
//! Runs the asset tasks declared by the options table.
//!
//! # Overview
//!
//! The build pipeline consists of:
//! - **Discovery**: Find source files using the glob patterns of each asset class
//! - **Graph**: Order tasks (`clean` before every transform task)
//! - **Execution**: Run each graph level concurrently, each task feeding its
//!   files through the class's transform chain
//!
//! # Example
//!
//! ```ignore
//! use frontpipe::build::{BuildContext, BuildPipeline};
//! use frontpipe::config::load_config;
//!
//! let config = load_config(None)?;
//! let context = BuildContext::new(config, project_root);
//! let result = BuildPipeline::new(&context).build()?;
//! println!("{}", result.summary());
//! ```

pub mod context;
pub mod discovery;
pub mod graph;
pub mod pipeline;
pub mod result;

pub use context::*;
pub use discovery::*;
pub use graph::*;
pub use pipeline::*;
pub use result::*;
