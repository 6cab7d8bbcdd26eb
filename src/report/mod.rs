mod text;
mod time;
mod writer;

use crate::results::FeatureResult;

pub use text::PlainTextResultFormatter;
pub use time::format_pretty;
pub use writer::FileSummaryWriter;

/// 집계 결과를 사람이 읽는 보고서 문자열로 바꾼다. 실패 경로는 없다.
pub trait ResultFormatter {
    fn format(&self, features: &[FeatureResult]) -> String;
}
