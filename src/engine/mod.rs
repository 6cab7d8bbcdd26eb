mod context;
mod events;
mod runner;
mod source;
mod step;

pub use context::{ExecutionContext, SharedExecutionContext};
pub use events::RunEvent;
pub use runner::{IgnoredStepPolicy, ScenarioRunner};
pub use source::{FeatureRunOptions, ScriptedStepSource, StepSource, run_feature};
pub use step::{
    PendingOutcome, StepDescriptor, StepIgnored, StepInvocation, StepOutcome, StepType,
    format_step_name, ignore,
};

pub(crate) use step::panic_message;
