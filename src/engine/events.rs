use crate::results::ResultStatus;

/// 시나리오 실행기에서 진행 상황 구독자로 전달되는 이벤트 모델이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// 시나리오 시작 알림.
    ScenarioStarted { scenario: String },
    /// Step 시작 알림.
    StepStarted {
        scenario: String,
        step_number: usize,
        step_name: String,
    },
    /// Step 종료 알림. 실행되지 않은 Step도 `NotRun`으로 전달된다.
    StepFinished {
        scenario: String,
        step_number: usize,
        status: ResultStatus,
    },
    /// 시나리오 종료.
    ScenarioFinished {
        scenario: String,
        status: ResultStatus,
    },
}
