use super::context::SharedExecutionContext;
use super::events::RunEvent;
use super::runner::{IgnoredStepPolicy, ScenarioRunner};
use super::step::{StepDescriptor, ignore};
use crate::error::RunnerError;
use crate::executor::{ShellCommand, SharedCommandRunner};
use crate::results::FeatureResult;
use crate::scenario::{
    ExtractVarFromFileConfig, FeatureDefinition, ScenarioDefinition, SetVarConfig, ShellConfig,
    StepDefinition, StepKind,
};
use anyhow::Context;
use futures::StreamExt;
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedSender;

/// 호스트가 구현하는 Step 공급자이다.
///
/// 시나리오 정의 하나에 대해 선언 순서대로 정렬된 Step 기술자 목록을 만든다.
pub trait StepSource: Send + Sync {
    fn scenario_steps(&self, scenario: &ScenarioDefinition) -> anyhow::Result<Vec<StepDescriptor>>;
}

/// YAML 스크립트 Step 정의를 기술자로 변환하는 기본 공급자이다.
#[derive(Clone)]
pub struct ScriptedStepSource {
    /// 쉘 Step이 사용할 명령 실행기.
    commands: SharedCommandRunner,
}

impl ScriptedStepSource {
    pub fn new(commands: SharedCommandRunner) -> Self {
        Self { commands }
    }

    fn descriptor(&self, definition: &StepDefinition) -> anyhow::Result<StepDescriptor> {
        let descriptor = match &definition.kind {
            StepKind::Shell { config } => {
                let config = config.clone();
                let commands = self.commands.clone();
                let step_name = definition.name.clone();
                StepDescriptor::from_async(definition.name.clone(), move |ctx, params| {
                    let config = config.clone();
                    let commands = commands.clone();
                    let step_name = step_name.clone();
                    async move {
                        let command = build_shell_command(&step_name, &config, &ctx, &params)?;
                        commands.run(&command).await
                    }
                })
            }
            StepKind::ExtractVarFromFile { config } => {
                anyhow::ensure!(config.line > 0, "줄 번호는 1부터 시작합니다: {}", config.line);
                Regex::new(&config.pattern)
                    .with_context(|| format!("정규식 컴파일 실패: {}", config.pattern))?;
                let config = config.clone();
                StepDescriptor::from_async(definition.name.clone(), move |ctx, _| {
                    let config = config.clone();
                    async move { execute_extract_step(&config, ctx).await }
                })
            }
            StepKind::SetVar { config } => {
                let config = config.clone();
                StepDescriptor::from_sync(definition.name.clone(), move |ctx, _| {
                    execute_set_var(&config, ctx)
                })
            }
            StepKind::Ignore { reason } => {
                let reason = reason.clone();
                StepDescriptor::from_sync(definition.name.clone(), move |_, _| {
                    ignore(reason.clone())
                })
            }
        };
        Ok(descriptor
            .with_step_type(definition.step_type)
            .with_parameters(definition.parameters.clone()))
    }
}

impl StepSource for ScriptedStepSource {
    fn scenario_steps(&self, scenario: &ScenarioDefinition) -> anyhow::Result<Vec<StepDescriptor>> {
        scenario
            .steps
            .iter()
            .map(|step| {
                self.descriptor(step)
                    .with_context(|| format!("Step '{}' 구성 실패", step.name))
            })
            .collect()
    }
}

/// 기능 실행 시 적용할 옵션이다.
#[derive(Debug, Clone)]
pub struct FeatureRunOptions {
    /// 무시된 Step 이후 처리 정책.
    pub ignored_step_policy: IgnoredStepPolicy,
    /// 동시에 실행할 최대 시나리오 수.
    pub max_concurrent_scenarios: usize,
    /// 진행 이벤트 채널.
    pub events: Option<UnboundedSender<RunEvent>>,
}

impl Default for FeatureRunOptions {
    fn default() -> Self {
        Self {
            ignored_step_policy: IgnoredStepPolicy::default(),
            max_concurrent_scenarios: 1,
            events: None,
        }
    }
}

/// 기능 정의의 모든 시나리오를 실행해 FeatureResult를 만든다.
///
/// 시나리오는 최대 `max_concurrent_scenarios`개까지 동시에 실행되며
/// 결과는 정의 순서대로 정렬된다. 이름이 빈 시나리오가 하나라도 있으면
/// 어떤 Step도 실행하지 않고 실패한다.
pub async fn run_feature(
    feature: &FeatureDefinition,
    source: &dyn StepSource,
    options: &FeatureRunOptions,
) -> anyhow::Result<FeatureResult> {
    for (index, scenario) in feature.scenarios.iter().enumerate() {
        if scenario.name.trim().is_empty() {
            return Err(RunnerError::MissingScenarioName).with_context(|| {
                format!("기능 '{}'의 {}번째 시나리오", feature.name, index + 1)
            });
        }
    }
    let mut prepared = Vec::with_capacity(feature.scenarios.len());
    for scenario in &feature.scenarios {
        let steps = source
            .scenario_steps(scenario)
            .with_context(|| format!("시나리오 '{}' Step 준비 실패", scenario.name))?;
        let mut runner = ScenarioRunner::new(scenario.name.clone())
            .with_labels(scenario.labels.clone())
            .with_description(scenario.description.clone())
            .with_ignored_step_policy(options.ignored_step_policy);
        if let Some(sender) = &options.events {
            runner = runner.with_events(sender.clone());
        }
        prepared.push(runner.run(steps));
    }
    let scenarios = futures::stream::iter(prepared)
        .buffered(options.max_concurrent_scenarios.max(1))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;
    Ok(FeatureResult::new(feature.name.clone())
        .with_label(feature.label.clone())
        .with_description(feature.description.clone())
        .with_scenarios(scenarios))
}

/// 쉘 설정과 파라미터를 치환해 실행 명령을 만든다.
///
/// 파라미터는 `$1`, `$2`... 위치 인자로 전달된다.
fn build_shell_command(
    step_name: &str,
    config: &ShellConfig,
    ctx: &SharedExecutionContext,
    params: &[String],
) -> anyhow::Result<ShellCommand> {
    let program = config.shell_program.clone().unwrap_or_else(|| {
        if cfg!(target_os = "windows") {
            "cmd"
        } else {
            "sh"
        }
        .to_string()
    });
    let script = ctx.expand_field(&config.script, "shell.script")?;
    let mut args = Vec::new();
    for arg in &config.shell_args {
        args.push(ctx.expand_field(arg, "shell.arg")?);
    }
    if cfg!(target_os = "windows") {
        args.push("/C".to_string());
        args.push(script);
    } else {
        args.push("-c".to_string());
        args.push(script);
        args.push(step_name.to_string());
    }
    for param in params {
        args.push(ctx.expand_field(param, "parameters")?);
    }
    let mut env = HashMap::new();
    for (key, value) in &config.env {
        env.insert(key.clone(), ctx.expand_field(value, "shell.env")?);
    }
    let working_dir = match &config.working_dir {
        Some(dir) => Some(PathBuf::from(
            ctx.expand_field(&dir.to_string_lossy(), "shell.working_dir")?,
        )),
        None => None,
    };
    Ok(ShellCommand {
        step_name: step_name.to_string(),
        program,
        args,
        env,
        working_dir,
        timeout: Duration::from_secs(config.timeout_sec),
    })
}

/// 파일의 지정 라인에서 정규식으로 값을 추출해 컨텍스트에 저장한다.
async fn execute_extract_step(
    config: &ExtractVarFromFileConfig,
    ctx: SharedExecutionContext,
) -> anyhow::Result<()> {
    anyhow::ensure!(config.line > 0, "줄 번호는 1부터 시작합니다: {}", config.line);
    let file_path = ctx.expand_field(&config.file_path, "extract.file_path")?;
    let file = File::open(&file_path)
        .await
        .with_context(|| format!("파일을 열 수 없습니다: {file_path}"))?;
    let mut reader = BufReader::new(file).lines();
    let mut current_line = None;
    for i in 1..=config.line {
        match reader.next_line().await? {
            Some(line) if i == config.line => current_line = Some(line),
            Some(_) => {}
            None => anyhow::bail!("{file_path}에서 {}번째 줄을 찾을 수 없습니다.", config.line),
        }
    }
    let content = current_line.unwrap_or_default();
    let re = Regex::new(&config.pattern)
        .with_context(|| format!("정규식 컴파일 실패: {}", config.pattern))?;
    let captures = re
        .captures(&content)
        .ok_or_else(|| anyhow::anyhow!("패턴이 매칭되지 않았습니다: {content}"))?;
    let value = captures
        .get(config.group)
        .ok_or_else(|| anyhow::anyhow!("캡처 그룹 {}을 찾을 수 없습니다.", config.group))?
        .as_str()
        .to_string();
    tracing::debug!(var = %config.var_name, value = %value, "변수 추출");
    ctx.set_var(&config.var_name, value);
    Ok(())
}

fn execute_set_var(config: &SetVarConfig, ctx: &SharedExecutionContext) -> anyhow::Result<()> {
    let value = ctx.expand_field(&config.value, "var.value")?;
    ctx.set_var(&config.name, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandRunner;
    use crate::results::ResultStatus;
    use crate::scenario::load_feature_from_reader;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// 실행된 명령을 누적 기록하는 목업 실행기이다.
    #[derive(Clone, Default)]
    struct RecordingRunner {
        /// Step 실행 시 받은 명령 목록이다.
        executed: Arc<Mutex<Vec<ShellCommand>>>,
        /// 이 문자열을 포함한 스크립트는 실패 처리한다.
        fail_on: Option<String>,
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, command: &ShellCommand) -> anyhow::Result<()> {
            self.executed.lock().await.push(command.clone());
            match &self.fail_on {
                Some(marker) if command.args.iter().any(|a| a.contains(marker.as_str())) => {
                    anyhow::bail!("쉘 명령 종료 코드: exit status: 1")
                }
                _ => Ok(()),
            }
        }
    }

    fn feature(yaml: &str) -> FeatureDefinition {
        load_feature_from_reader(&mut yaml.as_bytes()).expect("YAML 파싱 실패")
    }

    /// set_var로 설정한 값이 쉘 Step 파라미터와 스크립트에 반영되는지 검증한다.
    #[cfg(unix)]
    #[tokio::test]
    async fn shell_step_receives_expanded_script_and_parameters() {
        let definition = feature(
            r#"
name: Login
scenarios:
  - name: Successful login
    steps:
      - name: the_user
        kind: set_var
        var: { name: USER, value: bob }
      - name: login_is_called
        type: when
        kind: shell
        parameters: ["${USER}"]
        shell: { script: "login --user ${USER}" }
"#,
        );
        let runner = RecordingRunner::default();
        let source = ScriptedStepSource::new(Arc::new(runner.clone()));

        let result = run_feature(&definition, &source, &FeatureRunOptions::default())
            .await
            .expect("기능 실행 실패");

        assert_eq!(result.status(), ResultStatus::Passed);
        let executed = runner.executed.lock().await.clone();
        assert_eq!(executed.len(), 1);
        assert_eq!(
            executed[0].args,
            vec!["-c", "login --user bob", "login_is_called", "bob"]
        );
        assert_eq!(
            result.scenarios()[0].steps()[1].display_name(),
            "WHEN login is called \"${USER}\""
        );
    }

    #[tokio::test]
    async fn failing_shell_step_stops_the_scenario() {
        let definition = feature(
            r#"
name: Deploy
label: Ops
scenarios:
  - name: broken deploy
    labels: [Ticket-9]
    steps:
      - name: build
        kind: shell
        shell: { script: "make fail" }
      - name: deploy
        kind: shell
        shell: { script: "make deploy" }
  - name: later
    steps:
      - name: audit
        kind: ignore
"#,
        );
        let runner = RecordingRunner {
            fail_on: Some("fail".into()),
            ..Default::default()
        };
        let source = ScriptedStepSource::new(Arc::new(runner.clone()));
        let options = FeatureRunOptions {
            max_concurrent_scenarios: 2,
            ..Default::default()
        };

        let result = run_feature(&definition, &source, &options)
            .await
            .expect("기능 실행 실패");

        assert_eq!(result.label(), Some("Ops"));
        let names: Vec<_> = result.scenarios().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["broken deploy", "later"]);
        let broken = &result.scenarios()[0];
        assert_eq!(broken.status(), ResultStatus::Failed);
        assert!(broken.labels().contains("Ticket-9"));
        assert_eq!(broken.steps()[1].status(), ResultStatus::NotRun);
        assert_eq!(result.scenarios()[1].status(), ResultStatus::Ignored);
        assert_eq!(runner.executed.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn extract_step_stores_capture_group() {
        let dir = tempfile::tempdir().expect("임시 디렉터리 생성 실패");
        let path = dir.path().join("out.txt");
        std::fs::write(&path, "header\ntoken=abc123\n").expect("파일 작성 실패");
        let yaml = format!(
            r#"
name: Token
scenarios:
  - name: read token
    steps:
      - name: token_is_read
        kind: extract
        extract: {{ file_path: "{}", line: 2, pattern: "token=(\\w+)", var_name: TOKEN }}
"#,
            path.display()
        );
        let definition = feature(&yaml);
        let source = ScriptedStepSource::new(Arc::new(RecordingRunner::default()));
        let steps = source
            .scenario_steps(&definition.scenarios[0])
            .expect("Step 준비 실패");
        let ctx = Arc::new(crate::engine::ExecutionContext::new());

        let outcome = steps[0].invoke(ctx.clone()).await;

        assert_eq!(outcome, crate::engine::StepOutcome::Success);
        assert_eq!(ctx.get_var("TOKEN").as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn missing_line_fails_extract_step() {
        let dir = tempfile::tempdir().expect("임시 디렉터리 생성 실패");
        let path = dir.path().join("short.txt");
        std::fs::write(&path, "only one line\n").expect("파일 작성 실패");
        let config = ExtractVarFromFileConfig {
            file_path: path.display().to_string(),
            line: 3,
            pattern: "(.*)".into(),
            group: 1,
            var_name: "X".into(),
        };
        let ctx = Arc::new(crate::engine::ExecutionContext::new());

        let err = execute_extract_step(&config, ctx)
            .await
            .expect_err("실패해야 합니다.");
        assert!(err.to_string().contains("3번째 줄"));
    }

    #[tokio::test]
    async fn blank_scenario_name_fails_feature_before_any_step_runs() {
        let definition = feature(
            r#"
name: Mixed
scenarios:
  - name: real
    steps:
      - name: build
        kind: shell
        shell: { script: "make build" }
  - name: "  "
    steps:
      - name: audit
        kind: ignore
"#,
        );
        let runner = RecordingRunner::default();
        let source = ScriptedStepSource::new(Arc::new(runner.clone()));

        let err = run_feature(&definition, &source, &FeatureRunOptions::default())
            .await
            .expect_err("빈 시나리오 이름은 거부되어야 합니다.");

        assert!(runner.executed.lock().await.is_empty());
        assert_eq!(
            err.downcast_ref::<RunnerError>(),
            Some(&RunnerError::MissingScenarioName)
        );
        assert!(format!("{err:#}").contains("'Mixed'의 2번째 시나리오"));
    }

    #[tokio::test]
    async fn zero_line_number_is_rejected() {
        let dir = tempfile::tempdir().expect("임시 디렉터리 생성 실패");
        let path = dir.path().join("out.txt");
        std::fs::write(&path, "token=abc\n").expect("파일 작성 실패");
        let config = ExtractVarFromFileConfig {
            file_path: path.display().to_string(),
            line: 0,
            pattern: "(.*)".into(),
            group: 1,
            var_name: "X".into(),
        };
        let ctx = Arc::new(crate::engine::ExecutionContext::new());

        let err = execute_extract_step(&config, ctx.clone())
            .await
            .expect_err("실패해야 합니다.");
        assert!(err.to_string().contains("1부터"));
        assert_eq!(ctx.get_var("X"), None);

        let definition = feature(
            r#"
name: Token
scenarios:
  - name: s
    steps:
      - name: read
        kind: extract
        extract: { file_path: out.txt, line: 0, pattern: "(.*)", var_name: X }
"#,
        );
        let source = ScriptedStepSource::new(Arc::new(RecordingRunner::default()));
        assert!(source.scenario_steps(&definition.scenarios[0]).is_err());
    }

    #[test]
    fn invalid_extract_pattern_is_rejected_while_preparing_steps() {
        let definition = feature(
            r#"
name: Broken
scenarios:
  - name: s
    steps:
      - name: bad
        kind: extract
        extract: { file_path: x, line: 1, pattern: "(", var_name: X }
"#,
        );
        let source = ScriptedStepSource::new(Arc::new(RecordingRunner::default()));
        assert!(source.scenario_steps(&definition.scenarios[0]).is_err());
    }
}
