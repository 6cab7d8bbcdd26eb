use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::process::Command;
use tokio_util::codec::{FramedRead, LinesCodec};

/// 플레이스홀더 치환이 끝난 실행 명령이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    /// 로그에 표시할 Step 이름.
    pub step_name: String,
    /// 셸 프로그램.
    pub program: String,
    /// 프로그램 인자 전체.
    pub args: Vec<String>,
    /// 추가 환경 변수.
    pub env: HashMap<String, String>,
    /// 작업 디렉터리.
    pub working_dir: Option<PathBuf>,
    /// 최대 대기 시간.
    pub timeout: Duration,
}

/// CommandRunner는 외부 명령 실행을 위한 추상 계층을 정의한다.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// 명령을 실행하고 정상 종료 여부를 반환한다.
    async fn run(&self, command: &ShellCommand) -> anyhow::Result<()>;
}

/// CommandRunner를 공유하기 위한 Arc 타입 별칭이다.
pub type SharedCommandRunner = Arc<dyn CommandRunner>;

/// tokio 프로세스로 명령을 실행하는 기본 구현이다.
#[derive(Debug, Default, Clone)]
pub struct ProcessCommandRunner;

#[async_trait]
impl CommandRunner for ProcessCommandRunner {
    /// 표준 출력과 표준 오류를 tracing 로그로 중계하며 명령을 실행한다.
    async fn run(&self, command: &ShellCommand) -> anyhow::Result<()> {
        let mut process = Command::new(&command.program);
        process.args(&command.args);
        if let Some(dir) = &command.working_dir {
            process.current_dir(dir);
        }
        if !command.env.is_empty() {
            process.envs(&command.env);
        }
        process.kill_on_drop(true);
        process.stdout(std::process::Stdio::piped());
        process.stderr(std::process::Stdio::piped());
        let mut child = process
            .spawn()
            .with_context(|| format!("쉘 명령 실행 실패: {}", command.program))?;
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pipe_forwarder(stdout, command.step_name.clone(), "STDOUT"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pipe_forwarder(stderr, command.step_name.clone(), "STDERR"));
        }
        let status = tokio::time::timeout(command.timeout, child.wait())
            .await
            .map_err(|_| anyhow::anyhow!("시간 초과: {}초", command.timeout.as_secs()))??;
        if status.success() {
            Ok(())
        } else {
            Err(anyhow::anyhow!("쉘 명령 종료 코드: {status}"))
        }
    }
}

/// 프로세스 파이프를 읽어 로그로 중계한다.
async fn pipe_forwarder<R>(reader: R, step_name: String, tag: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = FramedRead::new(reader, LinesCodec::new());
    while let Some(line_result) = lines.next().await {
        match line_result {
            Ok(line) => tracing::info!(step = %step_name, "{tag}: {line}"),
            Err(err) => {
                tracing::warn!(step = %step_name, "{tag} 읽기 오류: {err}");
                break;
            }
        }
    }
}
