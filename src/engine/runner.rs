use super::context::{ExecutionContext, SharedExecutionContext};
use super::events::RunEvent;
use super::step::{StepDescriptor, StepOutcome, panic_message};
use crate::error::RunnerError;
use crate::results::{ResultStatus, ScenarioResult, StepResult};
use chrono::Utc;
use futures::FutureExt;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;

/// 무시된 Step 이후 남은 Step의 처리 정책이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoredStepPolicy {
    /// 실패와 동일하게 남은 Step을 NotRun으로 기록한다.
    #[default]
    Abort,
    /// 남은 Step을 계속 실행한다.
    Continue,
}

/// 시나리오 실행 단계를 표현한다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScenarioPhase {
    NotStarted,
    Running,
    Finished,
}

/// 한 시나리오의 Step 목록을 선언 순서대로 실행하는 상태 기계이다.
///
/// `run`이 실행기를 소비하므로 한 인스턴스는 한 번만 실행된다.
#[derive(Debug)]
pub struct ScenarioRunner {
    name: String,
    labels: BTreeSet<String>,
    description: Option<String>,
    ignored_step_policy: IgnoredStepPolicy,
    context: SharedExecutionContext,
    events: Option<UnboundedSender<RunEvent>>,
    phase: ScenarioPhase,
}

impl ScenarioRunner {
    /// 시나리오 이름으로 실행기를 생성한다. Step 간 컨텍스트는 새로 만든다.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeSet::new(),
            description: None,
            ignored_step_policy: IgnoredStepPolicy::default(),
            context: Arc::new(ExecutionContext::new()),
            events: None,
            phase: ScenarioPhase::NotStarted,
        }
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_ignored_step_policy(mut self, policy: IgnoredStepPolicy) -> Self {
        self.ignored_step_policy = policy;
        self
    }

    /// 호스트가 준비한 컨텍스트를 사용한다.
    pub fn with_context(mut self, context: SharedExecutionContext) -> Self {
        self.context = context;
        self
    }

    /// 진행 이벤트를 받을 채널을 연결한다.
    pub fn with_events(mut self, sender: UnboundedSender<RunEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Step 목록을 실행하고 시나리오 결과를 반환한다.
    ///
    /// Step 실패는 결과에 기록될 뿐 오류로 반환되지 않는다.
    /// 오류는 시나리오 이름이 비어 있는 등 호출 계약 위반일 때만 반환된다.
    pub async fn run(
        mut self,
        steps: Vec<StepDescriptor>,
    ) -> Result<ScenarioResult, RunnerError> {
        if self.name.trim().is_empty() {
            return Err(RunnerError::MissingScenarioName);
        }
        self.enter(ScenarioPhase::Running);
        let start_time = Utc::now();
        self.notify(RunEvent::ScenarioStarted {
            scenario: self.name.clone(),
        });
        tracing::info!(scenario = %self.name, steps = steps.len(), "시나리오 실행 시작");

        let mut results = Vec::with_capacity(steps.len());
        let mut halted = false;
        for (index, step) in steps.iter().enumerate() {
            let number = index + 1;
            let result = if halted {
                StepResult::new(number, step.raw_name(), ResultStatus::NotRun)
                    .with_step_type(step.predefined_step_type())
                    .with_parameters(step.parameters().to_vec())
            } else {
                self.mark_step_started(number, step);
                self.execute_step(number, step).await
            };
            halted = halted || self.halts_scenario(result.status());
            self.notify(RunEvent::StepFinished {
                scenario: self.name.clone(),
                step_number: number,
                status: result.status(),
            });
            results.push(result);
        }

        let scenario = ScenarioResult::new(self.name.clone(), start_time, results)
            .with_labels(std::mem::take(&mut self.labels))
            .with_description(self.description.take());
        self.enter(ScenarioPhase::Finished);
        self.notify(RunEvent::ScenarioFinished {
            scenario: self.name.clone(),
            status: scenario.status(),
        });
        tracing::info!(
            scenario = %self.name,
            status = %scenario.status(),
            duration_ms = scenario.duration().as_millis() as u64,
            "시나리오 실행 종료"
        );
        Ok(scenario)
    }

    /// Step 하나를 호출하고 경과 시간과 결과를 기록한다.
    async fn execute_step(&self, number: usize, step: &StepDescriptor) -> StepResult {
        let started = Instant::now();
        let ctx = self.context.clone();
        let outcome = AssertUnwindSafe(async move { step.invoke(ctx).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| StepOutcome::Failure(panic_message(payload)));
        let elapsed = started.elapsed();
        let base = StepResult::new(number, step.raw_name(), status_of(&outcome))
            .with_step_type(step.predefined_step_type())
            .with_parameters(step.parameters().to_vec())
            .with_duration(elapsed);
        match outcome {
            StepOutcome::Success => {
                tracing::debug!(scenario = %self.name, step = number, "Step 성공");
                base
            }
            StepOutcome::Failure(message) => {
                tracing::warn!(scenario = %self.name, step = number, error = %message, "Step 실패");
                base.with_details(message)
            }
            StepOutcome::Ignored(reason) => {
                tracing::debug!(
                    scenario = %self.name,
                    step = number,
                    reason = %reason,
                    "Step 무시"
                );
                base.with_details(reason)
            }
        }
    }

    /// Step이 시작될 때 이벤트를 송신한다.
    fn mark_step_started(&self, number: usize, step: &StepDescriptor) {
        self.notify(RunEvent::StepStarted {
            scenario: self.name.clone(),
            step_number: number,
            step_name: step.display_name(),
        });
    }

    /// 이후 Step을 실행하지 않아야 하는 상태인지 판단한다.
    fn halts_scenario(&self, status: ResultStatus) -> bool {
        match status {
            ResultStatus::Failed => true,
            ResultStatus::Ignored => self.ignored_step_policy == IgnoredStepPolicy::Abort,
            ResultStatus::Passed | ResultStatus::NotRun => false,
        }
    }

    fn enter(&mut self, phase: ScenarioPhase) {
        tracing::trace!(
            scenario = %self.name,
            from = ?self.phase,
            to = ?phase,
            "시나리오 단계 전이"
        );
        self.phase = phase;
    }

    fn notify(&self, event: RunEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }
}

fn status_of(outcome: &StepOutcome) -> ResultStatus {
    match outcome {
        StepOutcome::Success => ResultStatus::Passed,
        StepOutcome::Failure(_) => ResultStatus::Failed,
        StepOutcome::Ignored(_) => ResultStatus::Ignored,
    }
}
