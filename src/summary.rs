use crate::engine::panic_message;
use crate::error::{SummaryError, WriterFailure};
use crate::results::FeatureResult;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// 최종 집계 결과를 받아 저장하는 외부 소비자이다.
pub trait SummaryWriter: Send + Sync {
    /// 기능 이름순으로 정렬된 전체 결과를 저장한다.
    fn save(&self, features: &[FeatureResult]) -> anyhow::Result<()>;
}

/// SummaryWriter를 공유하기 위한 Arc 타입 별칭이다.
pub type SharedSummaryWriter = Arc<dyn SummaryWriter>;

/// 집계기 내부 상태이다.
#[derive(Debug, Default)]
struct SummaryState {
    /// 제출된 결과. 추가만 가능하다.
    results: Vec<FeatureResult>,
    /// 저장이 이미 수행되었는지 여부.
    finalized: bool,
}

/// 동시에 실행되는 여러 시나리오의 기능 결과를 모아 종료 시 한 번 저장한다.
///
/// `aggregate`는 어느 스레드에서 몇 번이든 호출할 수 있으며 기록기 I/O를 하지 않는다.
/// `finalize`가 호출되지 않은 채 drop되면 그 시점에 한 번 저장한다.
pub struct FeatureSummaryGenerator {
    writers: Vec<SharedSummaryWriter>,
    state: Mutex<SummaryState>,
}

impl FeatureSummaryGenerator {
    pub fn new(writers: Vec<SharedSummaryWriter>) -> Self {
        Self {
            writers,
            state: Mutex::new(SummaryState::default()),
        }
    }

    /// 결과 하나를 추가한다. 병합이나 중복 제거는 하지 않는다.
    pub fn aggregate(&self, result: FeatureResult) -> Result<(), SummaryError> {
        let mut state = self.lock_state();
        if state.finalized {
            return Err(SummaryError::AlreadyFinalized);
        }
        state.results.push(result);
        Ok(())
    }

    /// 지금까지 제출된 결과 수를 반환한다.
    pub fn len(&self) -> usize {
        self.lock_state().results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 스냅샷을 기능 이름순으로 정렬해 모든 기록기에 전달한다.
    ///
    /// 모든 기록기가 시도된 뒤 실패한 기록기가 있으면 한꺼번에 오류로 반환한다.
    /// 두 번째 호출은 I/O 없이 `AlreadyFinalized`를 반환한다.
    pub fn finalize(&self) -> Result<(), SummaryError> {
        let mut snapshot = {
            let mut state = self.lock_state();
            if state.finalized {
                return Err(SummaryError::AlreadyFinalized);
            }
            state.finalized = true;
            std::mem::take(&mut state.results)
        };
        snapshot.sort_by(|a, b| a.name().cmp(b.name()));
        tracing::info!(
            features = snapshot.len(),
            writers = self.writers.len(),
            "요약 저장 시작"
        );

        let mut failures = Vec::new();
        for (index, writer) in self.writers.iter().enumerate() {
            let saved = panic::catch_unwind(AssertUnwindSafe(|| writer.save(&snapshot)))
                .unwrap_or_else(|payload| Err(anyhow::anyhow!(panic_message(payload))));
            if let Err(err) = saved {
                tracing::error!(writer = index, error = %format!("{err:#}"), "요약 기록기 실패");
                failures.push(WriterFailure {
                    index,
                    message: format!("{err:#}"),
                });
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(SummaryError::WritersFailed(failures))
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SummaryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for FeatureSummaryGenerator {
    fn drop(&mut self) {
        if self.lock_state().finalized {
            return;
        }
        if let Err(err) = self.finalize() {
            tracing::error!(error = %err, "drop 시점 요약 저장 실패");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{ResultStatus, ScenarioResult, StepResult};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    /// 받은 스냅샷을 모두 기록하는 목업 기록기이다.
    #[derive(Default)]
    struct RecordingWriter {
        saved: Mutex<Vec<Vec<FeatureResult>>>,
    }

    impl RecordingWriter {
        fn calls(&self) -> Vec<Vec<FeatureResult>> {
            self.saved.lock().expect("writer mutex").clone()
        }
    }

    impl SummaryWriter for RecordingWriter {
        fn save(&self, features: &[FeatureResult]) -> anyhow::Result<()> {
            self.saved.lock().expect("writer mutex").push(features.to_vec());
            Ok(())
        }
    }

    /// 항상 실패하는 기록기이다.
    struct FailingWriter {
        attempts: AtomicUsize,
        panics: bool,
    }

    impl SummaryWriter for FailingWriter {
        fn save(&self, _features: &[FeatureResult]) -> anyhow::Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.panics {
                panic!("disk on fire");
            }
            anyhow::bail!("disk full")
        }
    }

    fn feature(name: &str) -> FeatureResult {
        let scenario = ScenarioResult::new(
            "scenario",
            Utc::now(),
            vec![StepResult::new(1, "step1", ResultStatus::Passed)],
        );
        FeatureResult::new(name)
            .with_label(Some("label1".into()))
            .with_description(Some("desc".into()))
            .with_scenarios([scenario])
    }

    fn shared(writer: &Arc<RecordingWriter>) -> SharedSummaryWriter {
        writer.clone()
    }

    #[test]
    fn concurrent_submissions_are_all_flushed() {
        let writer = Arc::new(RecordingWriter::default());
        let generator = Arc::new(FeatureSummaryGenerator::new(vec![shared(&writer)]));
        let results: Vec<_> = (0..50).map(|i| feature(&format!("feature{i}"))).collect();

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let generator = generator.clone();
                let results = results.clone();
                thread::spawn(move || {
                    for result in results {
                        generator.aggregate(result).expect("집계 실패");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("스레드 종료 실패");
        }
        generator.finalize().expect("저장 실패");

        let calls = writer.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 5000);
    }

    #[test]
    fn results_are_saved_sorted_only_on_finalize() {
        let writers = [
            Arc::new(RecordingWriter::default()),
            Arc::new(RecordingWriter::default()),
        ];
        let generator = FeatureSummaryGenerator::new(writers.iter().map(shared).collect());
        for name in ["name2", "name1", "name4", "name3"] {
            generator.aggregate(feature(name)).expect("집계 실패");
        }

        for writer in &writers {
            assert!(writer.calls().is_empty());
        }
        generator.finalize().expect("저장 실패");

        for writer in &writers {
            let calls = writer.calls();
            assert_eq!(calls.len(), 1);
            let names: Vec<_> = calls[0].iter().map(|f| f.name().to_string()).collect();
            assert_eq!(names, vec!["name1", "name2", "name3", "name4"]);
        }
    }

    #[test]
    fn duplicate_submissions_are_kept_separately() {
        let writer = Arc::new(RecordingWriter::default());
        let generator = FeatureSummaryGenerator::new(vec![shared(&writer)]);
        let same = feature("same");
        generator.aggregate(same.clone()).expect("집계 실패");
        generator.aggregate(same).expect("집계 실패");
        assert_eq!(generator.len(), 2);

        generator.finalize().expect("저장 실패");
        assert_eq!(writer.calls()[0].len(), 2);
    }

    #[test]
    fn empty_run_still_invokes_writers() {
        let writer = Arc::new(RecordingWriter::default());
        let generator = FeatureSummaryGenerator::new(vec![shared(&writer)]);
        assert!(generator.is_empty());

        generator.finalize().expect("저장 실패");

        let calls = writer.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].is_empty());
    }

    #[test]
    fn writer_failures_do_not_stop_other_writers() {
        let failing = Arc::new(FailingWriter {
            attempts: AtomicUsize::new(0),
            panics: false,
        });
        let panicking = Arc::new(FailingWriter {
            attempts: AtomicUsize::new(0),
            panics: true,
        });
        let recording = Arc::new(RecordingWriter::default());
        let writers: Vec<SharedSummaryWriter> = vec![
            failing.clone() as SharedSummaryWriter,
            panicking.clone() as SharedSummaryWriter,
            shared(&recording),
        ];
        let generator = FeatureSummaryGenerator::new(writers);
        generator.aggregate(feature("f")).expect("집계 실패");

        let err = generator.finalize().expect_err("실패가 보고되어야 합니다.");

        match err {
            SummaryError::WritersFailed(failures) => {
                let indexes: Vec<_> = failures.iter().map(|f| f.index).collect();
                assert_eq!(indexes, vec![0, 1]);
                assert_eq!(failures[0].message, "disk full");
                assert_eq!(failures[1].message, "disk on fire");
            }
            other => panic!("예상하지 못한 오류: {other}"),
        }
        assert_eq!(failing.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(panicking.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(recording.calls()[0].len(), 1);
    }

    #[test]
    fn finalize_flushes_only_once() {
        let writer = Arc::new(RecordingWriter::default());
        let generator = FeatureSummaryGenerator::new(vec![shared(&writer)]);
        generator.finalize().expect("저장 실패");

        assert!(matches!(
            generator.finalize(),
            Err(SummaryError::AlreadyFinalized)
        ));
        assert!(matches!(
            generator.aggregate(feature("late")),
            Err(SummaryError::AlreadyFinalized)
        ));
        drop(generator);
        assert_eq!(writer.calls().len(), 1);
    }

    #[test]
    fn drop_flushes_unfinalized_results() {
        let writer = Arc::new(RecordingWriter::default());
        {
            let generator = FeatureSummaryGenerator::new(vec![shared(&writer)]);
            generator.aggregate(feature("f")).expect("집계 실패");
        }
        let calls = writer.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 1);
    }
}
