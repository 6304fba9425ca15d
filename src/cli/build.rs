//! Build command implementations (build, clean, single tasks)

use std::process::ExitCode;

use super::{EXIT_ERROR, EXIT_SUCCESS};
use crate::asset::AssetClass;
use crate::build::{BuildContext, BuildPipeline, BuildResult, TaskGraph};

/// Run the build command
pub fn run_build(ctx: &BuildContext) -> ExitCode {
    report(ctx, BuildPipeline::new(ctx).build())
}

/// Run the clean command
pub fn run_clean(ctx: &BuildContext) -> ExitCode {
    report(ctx, BuildPipeline::new(ctx).clean())
}

/// Run the task of one asset class
pub fn run_single(ctx: &BuildContext, class: AssetClass) -> ExitCode {
    report(ctx, BuildPipeline::new(ctx).run(&TaskGraph::single(class)))
}

/// Log the outcome and map it to an exit code.
fn report<E: std::fmt::Display>(
    ctx: &BuildContext,
    result: Result<BuildResult, E>,
) -> ExitCode {
    match result {
        Ok(result) => {
            let ok = result.is_success(ctx.is_strict());
            for line in result.summary().lines() {
                if ok {
                    tracing::info!("{}", line);
                } else {
                    tracing::error!("{}", line);
                }
            }
            if ok {
                ExitCode::from(EXIT_SUCCESS)
            } else {
                ExitCode::from(EXIT_ERROR)
            }
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
