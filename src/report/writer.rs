use super::ResultFormatter;
use crate::results::FeatureResult;
use crate::summary::SummaryWriter;
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

/// 보고서를 형식화해 지정한 경로의 파일로 저장한다.
pub struct FileSummaryWriter {
    formatter: Box<dyn ResultFormatter + Send + Sync>,
    path: PathBuf,
}

impl FileSummaryWriter {
    pub fn new<F>(formatter: F, path: impl Into<PathBuf>) -> Self
    where
        F: ResultFormatter + Send + Sync + 'static,
    {
        Self {
            formatter: Box::new(formatter),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SummaryWriter for FileSummaryWriter {
    /// 상위 디렉터리가 없으면 만든 뒤 파일을 덮어쓴다.
    fn save(&self, features: &[FeatureResult]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("보고서 디렉터리 생성 실패: {}", parent.display()))?;
        }
        let text = self.formatter.format(features);
        fs::write(&self.path, text)
            .with_context(|| format!("보고서 저장 실패: {}", self.path.display()))?;
        tracing::info!(path = %self.path.display(), "보고서 저장 완료");
        Ok(())
    }
}
