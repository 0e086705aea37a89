use crate::apply::{apply_plan, ApplyResult};
use crate::error::RenameError;
use crate::planner::{generate_plan, RenameOptions, RenamePlan};
use crate::timestamp::{ExifTimestampResolver, TimestampResolver};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub plan: RenamePlan,
    pub result: ApplyResult,
}

impl RunReport {
    /// No failed renames and nothing left under a temporary name.
    pub fn is_clean(&self) -> bool {
        self.result.failures.is_empty() && self.result.stranded.is_empty()
    }

    pub fn has_skipped(&self) -> bool {
        !self.plan.skipped.is_empty()
    }
}

/// Renames every resolvable image in `directory` to its sequence name.
pub fn run(directory: &Path, options: &RenameOptions) -> Result<RunReport, RenameError> {
    run_with_resolver(directory, options, &ExifTimestampResolver)
}

pub fn run_with_resolver<R>(
    directory: &Path,
    options: &RenameOptions,
    resolver: &R,
) -> Result<RunReport, RenameError>
where
    R: TimestampResolver + ?Sized,
{
    let plan = generate_plan(directory, options, resolver)?;
    let result = apply_plan(&plan);
    Ok(RunReport { plan, result })
}
