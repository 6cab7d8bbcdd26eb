/// 시나리오 실행 진입 시점에 검출되는 계약 위반을 표현한다.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RunnerError {
    /// 시나리오 이름이 비어 있는 경우이다.
    #[error("시나리오 이름이 비어 있습니다.")]
    MissingScenarioName,
}

/// 요약 기록기 하나의 실패 정보이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterFailure {
    /// 등록 순서 기준 기록기 위치.
    pub index: usize,
    /// 오류 메시지.
    pub message: String,
}

/// 결과 집계기 사용 중 발생 가능한 오류를 표현한다.
#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    /// finalize 이후 다시 집계하거나 저장하려는 경우이다.
    #[error("요약이 이미 저장되었습니다.")]
    AlreadyFinalized,
    /// 하나 이상의 기록기가 저장에 실패한 경우이다.
    #[error("{}개의 요약 기록기가 실패했습니다: {}", .0.len(), describe_failures(.0))]
    WritersFailed(Vec<WriterFailure>),
}

fn describe_failures(failures: &[WriterFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("#{} {}", f.index, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}
