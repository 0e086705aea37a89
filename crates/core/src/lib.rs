mod apply;
mod config;
mod error;
mod planner;
mod renamer;
mod timestamp;

pub use apply::{
    apply_plan, ApplyResult, CollisionMap, RenameFailure, StrandedFile, MAX_TEMP_NAME_ATTEMPTS,
    TEMP_NAME_LEN,
};
pub use config::{
    app_paths, load_config, load_config_from, save_config_to, AppConfig, AppPaths,
};
pub use error::{RenameError, ResolveError};
pub use planner::{
    generate_plan, is_image, target_base, CandidateFile, PlanEntry, PlanStats, RenameOptions,
    RenamePlan, SidecarRename, SkippedFile, SortKey, DEFAULT_DIGITS, DEFAULT_SIDECAR_EXTENSION,
    IMAGE_EXTENSIONS,
};
pub use renamer::{run, run_with_resolver, RunReport};
pub use timestamp::{parse_capture_moment, CaptureMoment, ExifTimestampResolver, TimestampResolver};
