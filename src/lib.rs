//! 시나리오 Step 실행, 결과 집계, 평문 요약 보고서 생성을 담당하는 BDD 실행 라이브러리이다.

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod report;
pub mod results;
pub mod scenario;
pub mod summary;
