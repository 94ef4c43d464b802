//! Generic pipeline runner

use kiln_core::PipelineConfig;
use tracing::{debug, instrument};

use crate::source;
use crate::steps::{self, PipelineOutcome, StepContext, StepError};

/// Resolve the pipeline's file selection and run every step in order
#[instrument(skip_all, fields(task = ctx.task))]
pub async fn run_pipeline(
    pipeline: &PipelineConfig,
    ctx: &StepContext<'_>,
) -> Result<PipelineOutcome, StepError> {
    let mut outcome = PipelineOutcome::default();
    let mut assets = source::resolve(ctx.root, &pipeline.src)?;
    if assets.is_empty() {
        debug!(task = ctx.task, "no source files matched");
    }

    for step in &pipeline.steps {
        assets = steps::apply(step, assets, ctx, &mut outcome).await?;
    }

    debug!(
        task = ctx.task,
        written = outcome.written.len(),
        warnings = outcome.warnings.len(),
        "pipeline finished"
    );
    Ok(outcome)
}
