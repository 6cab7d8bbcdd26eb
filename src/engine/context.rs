use anyhow::Context;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

static VARIABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z0-9_]+)\}").expect("변수 패턴은 항상 유효하다")
});

/// 시나리오 하나의 Step들이 함께 읽고 쓰는 변수 저장소이다.
///
/// 실행기는 시나리오마다 새 인스턴스를 만든다.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    vars: Mutex<HashMap<String, String>>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_var(&self, key: impl Into<String>, value: impl Into<String>) {
        self.vars().insert(key.into(), value.into());
    }

    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars().get(key).cloned()
    }

    /// 컨텍스트 변수가 없으면 프로세스 환경 변수를 본다.
    pub fn lookup(&self, key: &str) -> Option<String> {
        self.get_var(key).or_else(|| std::env::var(key).ok())
    }

    /// 문자열 안의 `${NAME}`을 모두 값으로 바꾼다.
    ///
    /// 어느 쪽에서도 찾지 못한 이름이 하나라도 있으면 그 이름들을 담아 실패한다.
    pub fn expand(&self, template: &str) -> anyhow::Result<String> {
        let mut missing = BTreeSet::new();
        let expanded = VARIABLE.replace_all(template, |caps: &Captures| {
            let name = &caps[1];
            self.lookup(name).unwrap_or_else(|| {
                missing.insert(name.to_string());
                String::new()
            })
        });
        if !missing.is_empty() {
            let names: Vec<_> = missing.into_iter().collect();
            anyhow::bail!("정의되지 않은 변수: {}", names.join(", "));
        }
        Ok(expanded.into_owned())
    }

    /// `expand`와 같지만 오류에 설정 필드 이름을 덧붙인다.
    pub fn expand_field(&self, template: &str, field: &str) -> anyhow::Result<String> {
        self.expand(template)
            .with_context(|| format!("{field} 값 치환 실패"))
    }

    fn vars(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.vars.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub type SharedExecutionContext = Arc<ExecutionContext>;
