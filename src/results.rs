use crate::engine::StepType;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Step, 시나리오, 기능 결과 상태를 표현한다.
///
/// 선언 순서가 곧 우선순위이다. 부모 상태는 자식 상태의 최댓값이며
/// `NotRun`은 `Passed`보다 낮으므로 우선순위에 영향을 주지 않는다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResultStatus {
    /// 선행 Step 실패 또는 무시로 실행되지 않음.
    NotRun,
    /// 정상 종료.
    Passed,
    /// 무시됨.
    Ignored,
    /// 실패.
    Failed,
}

impl ResultStatus {
    /// 자식 상태 목록을 우선순위에 따라 하나로 접는다.
    ///
    /// 자식이 없으면 `Passed`이다.
    pub fn fold<I>(statuses: I) -> ResultStatus
    where
        I: IntoIterator<Item = ResultStatus>,
    {
        statuses.into_iter().fold(ResultStatus::Passed, ResultStatus::max)
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ResultStatus::NotRun => "NotRun",
            ResultStatus::Passed => "Passed",
            ResultStatus::Ignored => "Ignored",
            ResultStatus::Failed => "Failed",
        };
        f.write_str(text)
    }
}

/// 단일 Step의 실행 결과이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    number: usize,
    raw_name: String,
    step_type: Option<StepType>,
    parameters: Vec<String>,
    status: ResultStatus,
    duration: Option<Duration>,
    details: Option<String>,
}

impl StepResult {
    /// 1 기반 번호와 이름, 상태로 결과를 생성한다.
    pub fn new(number: usize, raw_name: impl Into<String>, status: ResultStatus) -> Self {
        Self {
            number,
            raw_name: raw_name.into(),
            step_type: None,
            parameters: Vec::new(),
            status,
            duration: None,
            details: None,
        }
    }

    pub fn with_step_type(mut self, step_type: Option<StepType>) -> Self {
        self.step_type = step_type;
        self
    }

    pub fn with_parameters(mut self, parameters: Vec<String>) -> Self {
        self.parameters = parameters;
        self
    }

    /// 실행 소요 시간을 설정한다. `NotRun` 결과에는 무시된다.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        if self.status != ResultStatus::NotRun {
            self.duration = Some(duration);
        }
        self
    }

    /// 오류 메시지 또는 무시 사유를 설정한다.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn raw_name(&self) -> &str {
        &self.raw_name
    }

    pub fn step_type(&self) -> Option<StepType> {
        self.step_type
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn status(&self) -> ResultStatus {
        self.status
    }

    /// 실제 실행된 시간. 실행되지 않은 Step은 `None`이다.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// 보고서에 표시할 Step 이름을 반환한다.
    pub fn display_name(&self) -> String {
        crate::engine::format_step_name(&self.raw_name, self.step_type, &self.parameters)
    }
}

/// 단일 시나리오의 실행 결과이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioResult {
    name: String,
    labels: BTreeSet<String>,
    description: Option<String>,
    steps: Vec<StepResult>,
    start_time: DateTime<Utc>,
}

impl ScenarioResult {
    /// 이름, 시작 시각, Step 결과 목록으로 시나리오 결과를 생성한다.
    pub fn new(name: impl Into<String>, start_time: DateTime<Utc>, steps: Vec<StepResult>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeSet::new(),
            description: None,
            steps,
            start_time,
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

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Step 상태를 우선순위로 접은 시나리오 상태이다.
    pub fn status(&self) -> ResultStatus {
        ResultStatus::fold(self.steps.iter().map(StepResult::status))
    }

    /// 실행된 Step 소요 시간의 합이다.
    pub fn duration(&self) -> Duration {
        self.steps.iter().filter_map(StepResult::duration).sum()
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.duration())
            .ok()
            .and_then(|elapsed| self.start_time.checked_add_signed(elapsed))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// 지정한 상태의 Step 수를 센다.
    pub fn count_steps(&self, status: ResultStatus) -> usize {
        self.steps.iter().filter(|s| s.status() == status).count()
    }
}

/// 기능 단위(여러 시나리오 묶음)의 결과이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureResult {
    name: String,
    label: Option<String>,
    description: Option<String>,
    scenarios: Vec<ScenarioResult>,
}

impl FeatureResult {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            description: None,
            scenarios: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// 제출 순서를 유지한 채 시나리오 결과를 추가한다.
    pub fn with_scenarios<I>(mut self, scenarios: I) -> Self
    where
        I: IntoIterator<Item = ScenarioResult>,
    {
        self.scenarios.extend(scenarios);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn scenarios(&self) -> &[ScenarioResult] {
        &self.scenarios
    }

    pub fn status(&self) -> ResultStatus {
        ResultStatus::fold(self.scenarios.iter().map(ScenarioResult::status))
    }

    pub fn count_scenarios(&self, status: ResultStatus) -> usize {
        self.scenarios.iter().filter(|s| s.status() == status).count()
    }

    pub fn total_steps(&self) -> usize {
        self.scenarios.iter().map(|s| s.steps().len()).sum()
    }

    pub fn count_steps(&self, status: ResultStatus) -> usize {
        self.scenarios.iter().map(|s| s.count_steps(status)).sum()
    }

    /// 시나리오 소요 시간의 합이다.
    pub fn duration(&self) -> Duration {
        self.scenarios.iter().map(ScenarioResult::duration).sum()
    }

    /// 시나리오당 평균 소요 시간. 시나리오가 없으면 0이다.
    pub fn average_duration(&self) -> Duration {
        let count = self.scenarios.len() as u128;
        if count == 0 {
            return Duration::ZERO;
        }
        let nanos = self.duration().as_nanos() / count;
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}
