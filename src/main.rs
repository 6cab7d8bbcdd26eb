use anyhow::Context;
use clap::Parser;
use rust_bdd::config::{RunConfig, load_config_from_file};
use rust_bdd::engine::{RunEvent, ScriptedStepSource, StepSource, run_feature};
use rust_bdd::executor::ProcessCommandRunner;
use rust_bdd::results::ResultStatus;
use rust_bdd::scenario::load_feature_from_file;
use rust_bdd::summary::FeatureSummaryGenerator;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// YAML 기능 정의를 실행하고 평문 요약 보고서를 남긴다.
#[derive(Debug, Parser)]
#[command(name = "rust-bdd", version)]
struct Cli {
    /// 실행 설정 YAML 파일.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// 기능 정의 파일 경로 또는 glob 패턴.
    #[arg(required = true)]
    features: Vec<String>,
}

/// 전체 실행 집계.
#[derive(Debug, Default, Clone, Copy)]
struct RunTotals {
    features: usize,
    scenarios: usize,
    failed_scenarios: usize,
    errors: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "실행 실패");
            ExitCode::FAILURE
        }
    }
}

/// 모든 기능을 실행하고 보고서를 저장한다. 실패가 없으면 `true`이다.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = match &cli.config {
        Some(path) => load_config_from_file(path)?,
        None => RunConfig::default(),
    };
    let paths = expand_feature_paths(&cli.features)?;
    if paths.is_empty() {
        anyhow::bail!("실행할 기능 파일이 없습니다.");
    }

    let generator = Arc::new(FeatureSummaryGenerator::new(config.summary_writers()));
    let source: Arc<dyn StepSource> =
        Arc::new(ScriptedStepSource::new(Arc::new(ProcessCommandRunner)));
    let (tx, rx) = mpsc::unbounded_channel();
    let logger = tokio::spawn(log_events(rx));
    let mut options = config.feature_run_options();
    options.events = Some(tx);

    let mut totals = RunTotals::default();
    let mut handles = Vec::with_capacity(paths.len());
    for path in paths {
        let feature = match load_feature_from_file(&path) {
            Ok(feature) => feature,
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "기능 건너뜀");
                totals.errors += 1;
                continue;
            }
        };
        let source = source.clone();
        let generator = generator.clone();
        let options = options.clone();
        handles.push(tokio::spawn(async move {
            let result = run_feature(&feature, source.as_ref(), &options).await?;
            let scenarios = result.scenarios().len();
            let failed = result.count_scenarios(ResultStatus::Failed);
            generator.aggregate(result)?;
            anyhow::Ok((scenarios, failed))
        }));
    }
    // 모든 송신자가 사라져야 로그 작업이 끝난다.
    drop(options);

    for handle in handles {
        match handle.await {
            Ok(Ok((scenarios, failed))) => {
                totals.features += 1;
                totals.scenarios += scenarios;
                totals.failed_scenarios += failed;
            }
            Ok(Err(err)) => {
                tracing::error!(error = %format!("{err:#}"), "기능 실행 실패");
                totals.errors += 1;
            }
            Err(err) => {
                tracing::error!(error = %err, "기능 작업 중단");
                totals.errors += 1;
            }
        }
    }
    if let Err(err) = logger.await {
        tracing::warn!(error = %err, "이벤트 로그 작업 중단");
    }

    let saved = generator.finalize();
    tracing::info!(
        features = totals.features,
        scenarios = totals.scenarios,
        failed = totals.failed_scenarios,
        errors = totals.errors,
        "실행 완료"
    );
    if let Err(err) = &saved {
        tracing::error!(error = %err, "요약 저장 실패");
    }

    Ok(saved.is_ok() && totals.failed_scenarios == 0 && totals.errors == 0)
}

/// 인자마다 glob을 펼쳐 중복 없는 경로 목록을 만든다.
fn expand_feature_paths(patterns: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let entries =
            glob::glob(pattern).with_context(|| format!("잘못된 glob 패턴: {pattern}"))?;
        let before = paths.len();
        for entry in entries {
            let path = entry.with_context(|| format!("경로 확인 실패: {pattern}"))?;
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        if paths.len() == before {
            tracing::warn!(pattern = %pattern, "일치하는 기능 파일 없음");
        }
    }
    Ok(paths)
}

/// 진행 이벤트를 로그로 남긴다.
async fn log_events(mut rx: UnboundedReceiver<RunEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            RunEvent::ScenarioStarted { scenario } => {
                tracing::debug!(scenario = %scenario, "시나리오 진행 시작");
            }
            RunEvent::StepStarted {
                scenario,
                step_number,
                step_name,
            } => {
                tracing::info!(scenario = %scenario, step = step_number, "{step_name} 시작");
            }
            RunEvent::StepFinished {
                scenario,
                step_number,
                status,
            } => {
                tracing::info!(scenario = %scenario, step = step_number, "Step 종료: {status}");
            }
            RunEvent::ScenarioFinished { scenario, status } => {
                tracing::debug!(scenario = %scenario, "시나리오 진행 종료: {status}");
            }
        }
    }
}
