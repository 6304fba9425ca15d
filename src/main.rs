//! frontpipe - Command-line front-end asset pipeline

use std::process::ExitCode;

use frontpipe::cli;

fn main() -> ExitCode {
    cli::run()
}
