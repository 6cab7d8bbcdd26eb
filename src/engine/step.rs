use super::context::SharedExecutionContext;
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use serde::Deserialize;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Step 호출이 최종적으로 도달하는 결과이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// 정상 종료.
    Success,
    /// 오류 상세와 함께 실패.
    Failure(String),
    /// 사유와 함께 무시됨.
    Ignored(String),
}

/// 아직 완료되지 않았을 수 있는 Step 결과이다.
///
/// 동기 Step은 이미 완료된 future를 돌려준다.
pub type PendingOutcome = BoxFuture<'static, StepOutcome>;

/// 정규화된 Step 호출 함수 시그니처이다.
pub type StepInvocation =
    Arc<dyn Fn(SharedExecutionContext, Vec<String>) -> PendingOutcome + Send + Sync>;

/// Step 본문이 무시 처리를 요청할 때 반환하는 오류이다.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct StepIgnored {
    /// 무시 사유.
    pub reason: String,
}

impl StepIgnored {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Step 본문에서 `return ignore("...")` 형태로 무시를 알린다.
pub fn ignore(reason: impl Into<String>) -> anyhow::Result<()> {
    Err(StepIgnored::new(reason).into())
}

/// 미리 정의된 Step 유형이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Given,
    When,
    Then,
    And,
    But,
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StepType::Given => "GIVEN",
            StepType::When => "WHEN",
            StepType::Then => "THEN",
            StepType::And => "AND",
            StepType::But => "BUT",
        };
        f.write_str(text)
    }
}

/// Step 이름, 유형, 파라미터를 보고서용 문자열로 조합한다.
pub fn format_step_name(
    raw_name: &str,
    step_type: Option<StepType>,
    parameters: &[String],
) -> String {
    let mut name = match step_type {
        Some(step_type) => format!("{step_type} {}", raw_name.replace('_', " ")),
        None => raw_name.replace('_', " "),
    };
    for parameter in parameters {
        name.push_str(&format!(" \"{parameter}\""));
    }
    name
}

/// 시나리오 정의 시 한 번 만들어지는 불변 Step 기술자이다.
#[derive(Clone)]
pub struct StepDescriptor {
    raw_name: String,
    parameters: Vec<String>,
    predefined_step_type: Option<StepType>,
    invocation: StepInvocation,
}

impl StepDescriptor {
    /// 이미 정규화된 호출 함수로 기술자를 생성한다.
    pub fn new(raw_name: impl Into<String>, invocation: StepInvocation) -> Self {
        Self {
            raw_name: raw_name.into(),
            parameters: Vec::new(),
            predefined_step_type: None,
            invocation,
        }
    }

    /// 동기 본문을 감싼다. 호출 즉시 본문이 실행되고 완료된 결과가 반환된다.
    pub fn from_sync<F>(raw_name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&SharedExecutionContext, &[String]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let invocation: StepInvocation =
            Arc::new(move |ctx: SharedExecutionContext, parameters: Vec<String>| {
                let outcome =
                    match panic::catch_unwind(AssertUnwindSafe(|| body(&ctx, &parameters))) {
                        Ok(result) => outcome_from_result(result),
                        Err(payload) => StepOutcome::Failure(panic_message(payload)),
                    };
                future::ready(outcome).boxed()
            });
        Self::new(raw_name, invocation)
    }

    /// 비동기 본문을 감싼다. 반환된 future가 완료될 때 결과가 확정된다.
    pub fn from_async<F, Fut>(raw_name: impl Into<String>, body: F) -> Self
    where
        F: Fn(SharedExecutionContext, Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let invocation: StepInvocation =
            Arc::new(move |ctx: SharedExecutionContext, parameters: Vec<String>| {
                match panic::catch_unwind(AssertUnwindSafe(|| body(ctx, parameters))) {
                    Ok(fut) => AssertUnwindSafe(fut)
                        .catch_unwind()
                        .map(|completed| match completed {
                            Ok(result) => outcome_from_result(result),
                            Err(payload) => StepOutcome::Failure(panic_message(payload)),
                        })
                        .boxed(),
                    Err(payload) => {
                        future::ready(StepOutcome::Failure(panic_message(payload))).boxed()
                    }
                }
            });
        Self::new(raw_name, invocation)
    }

    pub fn with_parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = parameters.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_step_type(mut self, step_type: Option<StepType>) -> Self {
        self.predefined_step_type = step_type;
        self
    }

    pub fn raw_name(&self) -> &str {
        &self.raw_name
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn predefined_step_type(&self) -> Option<StepType> {
        self.predefined_step_type
    }

    /// 컨텍스트와 파라미터로 Step을 호출한다.
    pub fn invoke(&self, ctx: SharedExecutionContext) -> PendingOutcome {
        (self.invocation)(ctx, self.parameters.clone())
    }

    pub fn display_name(&self) -> String {
        format_step_name(&self.raw_name, self.predefined_step_type, &self.parameters)
    }
}

impl fmt::Debug for StepDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDescriptor")
            .field("raw_name", &self.raw_name)
            .field("parameters", &self.parameters)
            .field("predefined_step_type", &self.predefined_step_type)
            .finish_non_exhaustive()
    }
}

/// 본문 반환값을 StepOutcome으로 변환한다.
fn outcome_from_result(result: anyhow::Result<()>) -> StepOutcome {
    match result {
        Ok(()) => StepOutcome::Success,
        Err(err) => match err.downcast_ref::<StepIgnored>() {
            Some(ignored) => StepOutcome::Ignored(ignored.reason.clone()),
            None => StepOutcome::Failure(format!("{err:#}")),
        },
    }
}

/// panic payload에서 사람이 읽을 수 있는 메시지를 꺼낸다.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "Step 실행 중 알 수 없는 panic이 발생했습니다.".to_string()
}
