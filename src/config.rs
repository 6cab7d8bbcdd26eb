use crate::engine::{FeatureRunOptions, IgnoredStepPolicy};
use crate::report::{FileSummaryWriter, PlainTextResultFormatter};
use crate::summary::SharedSummaryWriter;
use anyhow::Context;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 기본 보고서 경로.
pub const DEFAULT_REPORT_PATH: &str = "reports/FeaturesSummary.txt";

/// 실행 설정 파일의 최상위 구조이다.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RunConfig {
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default = "default_reports")]
    pub reports: Vec<ReportConfig>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            runner: RunnerConfig::default(),
            reports: default_reports(),
        }
    }
}

/// 시나리오 실행기 설정.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RunnerConfig {
    #[serde(default)]
    pub ignored_step_policy: IgnoredStepPolicy,
    /// 기능 하나에서 동시에 실행할 시나리오 수.
    #[serde(default = "default_max_concurrent_scenarios")]
    pub max_concurrent_scenarios: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            ignored_step_policy: IgnoredStepPolicy::default(),
            max_concurrent_scenarios: default_max_concurrent_scenarios(),
        }
    }
}

/// 평문 보고서 출력 설정.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ReportConfig {
    pub path: PathBuf,
}

fn default_max_concurrent_scenarios() -> usize {
    1
}

fn default_reports() -> Vec<ReportConfig> {
    vec![ReportConfig {
        path: PathBuf::from(DEFAULT_REPORT_PATH),
    }]
}

impl RunConfig {
    /// 설정된 보고서마다 파일 기록기를 만든다.
    pub fn summary_writers(&self) -> Vec<SharedSummaryWriter> {
        self.reports
            .iter()
            .map(|report| {
                Arc::new(FileSummaryWriter::new(PlainTextResultFormatter, &report.path))
                    as SharedSummaryWriter
            })
            .collect()
    }

    /// 기능 실행 옵션으로 변환한다. 이벤트 채널은 호출자가 붙인다.
    pub fn feature_run_options(&self) -> FeatureRunOptions {
        FeatureRunOptions {
            ignored_step_policy: self.runner.ignored_step_policy,
            max_concurrent_scenarios: self.runner.max_concurrent_scenarios,
            events: None,
        }
    }
}

/// YAML 파일 경로에서 설정을 로드한다.
pub fn load_config_from_file(path: &Path) -> anyhow::Result<RunConfig> {
    let mut file =
        File::open(path).with_context(|| format!("설정 파일 열기 실패: {}", path.display()))?;
    load_config_from_reader(&mut file)
}

/// Reader에서 YAML을 읽어 RunConfig로 파싱한다.
pub fn load_config_from_reader<R: Read>(reader: &mut R) -> anyhow::Result<RunConfig> {
    let mut buf = String::new();
    reader.read_to_string(&mut buf)?;
    if buf.trim().is_empty() {
        return Ok(RunConfig::default());
    }
    let config: RunConfig = serde_yaml::from_str(&buf)?;
    Ok(config)
}
