use crate::engine::StepType;
use anyhow::Context;
use serde::{Deserialize, Deserializer, de};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// `kind: shell` Step 설정.
#[derive(Debug, Clone, Deserialize)]
pub struct ShellConfig {
    /// 셸에 `-c`로 넘길 스크립트. `${VAR}` 치환 대상이다.
    #[serde(alias = "command")]
    pub script: String,
    /// 기본값은 `sh`(Windows는 `cmd`).
    pub shell_program: Option<String>,
    #[serde(default)]
    pub shell_args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    /// 초 단위. 넘기면 프로세스를 종료하고 Step을 실패 처리한다. 0은 허용하지 않는다.
    #[serde(default = "default_timeout", deserialize_with = "positive_seconds")]
    pub timeout_sec: u64,
}

/// `kind: extract` Step 설정.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractVarFromFileConfig {
    pub file_path: String,
    /// 1부터 센다.
    pub line: usize,
    pub pattern: String,
    #[serde(default = "default_group")]
    pub group: usize,
    /// 추출한 값을 저장할 컨텍스트 변수.
    pub var_name: String,
}

/// 컨텍스트 변수 설정 Step 구성이다.
#[derive(Debug, Clone, Deserialize)]
pub struct SetVarConfig {
    /// 변수명.
    pub name: String,
    /// 값. `${VAR}` 플레이스홀더를 사용할 수 있다.
    pub value: String,
}

/// StepKind는 스크립트 Step이 수행할 작업 유형을 표현한다.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    Shell {
        #[serde(rename = "shell")]
        config: ShellConfig,
    },
    /// 파일 한 줄에서 값을 뽑아 변수로 저장한다.
    #[serde(rename = "extract")]
    ExtractVarFromFile {
        #[serde(rename = "extract")]
        config: ExtractVarFromFileConfig,
    },
    /// 컨텍스트 변수를 설정한다.
    SetVar {
        #[serde(rename = "var")]
        config: SetVarConfig,
    },
    /// 아직 구현되지 않은 Step을 무시 처리한다.
    Ignore {
        /// 무시 사유.
        #[serde(default = "default_ignore_reason")]
        reason: String,
    },
}

/// 시나리오 내 Step 정의이다.
#[derive(Debug, Clone, Deserialize)]
pub struct StepDefinition {
    /// Step 이름. 밑줄은 보고서에서 공백으로 표시된다.
    pub name: String,
    /// Given/When/Then 등 미리 정의된 유형.
    #[serde(default, rename = "type")]
    pub step_type: Option<StepType>,
    /// Step 파라미터 목록.
    #[serde(default)]
    pub parameters: Vec<String>,
    /// 수행할 작업.
    #[serde(flatten)]
    pub kind: StepKind,
}

/// 시나리오 정의이다.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioDefinition {
    /// 시나리오 이름.
    pub name: String,
    /// 라벨 목록.
    #[serde(default)]
    pub labels: Vec<String>,
    /// 설명.
    #[serde(default)]
    pub description: Option<String>,
    /// 선언 순서대로 실행할 Step 목록.
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

/// 기능 정의이다. YAML 파일 하나가 기능 하나에 대응한다.
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureDefinition {
    /// 기능 이름.
    pub name: String,
    /// 라벨.
    #[serde(default)]
    pub label: Option<String>,
    /// 설명.
    #[serde(default)]
    pub description: Option<String>,
    /// 시나리오 목록.
    #[serde(default)]
    pub scenarios: Vec<ScenarioDefinition>,
}

fn default_timeout() -> u64 {
    60
}

fn positive_seconds<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let seconds = u64::deserialize(deserializer)?;
    if seconds == 0 {
        return Err(de::Error::custom("timeout_sec는 1 이상이어야 합니다."));
    }
    Ok(seconds)
}

fn default_group() -> usize {
    1
}

fn default_ignore_reason() -> String {
    "Not implemented yet".to_string()
}

/// 기능 정의 YAML 파일을 읽는다. 오류에는 파일 경로가 포함된다.
pub fn load_feature_from_file(path: &Path) -> anyhow::Result<FeatureDefinition> {
    let mut file =
        File::open(path).with_context(|| format!("기능 파일 열기 실패: {}", path.display()))?;
    load_feature_from_reader(&mut file)
        .with_context(|| format!("기능 파싱 실패: {}", path.display()))
}

pub fn load_feature_from_reader<R: Read>(reader: &mut R) -> anyhow::Result<FeatureDefinition> {
    let mut yaml = String::new();
    reader.read_to_string(&mut yaml)?;
    Ok(serde_yaml::from_str(&yaml)?)
}
