use super::ResultFormatter;
use super::time::format_pretty;
use crate::results::{FeatureResult, ResultStatus, ScenarioResult};
use chrono::{DateTime, Utc};
use std::time::Duration;

const FEATURE_SUMMARY_HEADER: &str =
    "Feature Scenarios Passed Failed Ignored Steps Passed Failed Ignored Not Run Duration Average";

/// 실행 요약, 기능 요약 표, 기능 상세를 한 줄씩 나열하는 평문 보고서 형식이다.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextResultFormatter;

impl ResultFormatter for PlainTextResultFormatter {
    fn format(&self, features: &[FeatureResult]) -> String {
        let mut lines = Vec::new();
        write_execution_summary(&mut lines, features);
        write_feature_summary(&mut lines, features);
        write_feature_details(&mut lines, features);
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }
}

fn write_execution_summary(lines: &mut Vec<String>, features: &[FeatureResult]) {
    let scenarios: Vec<&ScenarioResult> = features.iter().flat_map(|f| f.scenarios()).collect();
    let start = scenarios.iter().map(|s| s.start_time()).min();
    let end = scenarios.iter().map(|s| s.end_time()).max();
    let count_scenarios =
        |status| -> usize { features.iter().map(|f| f.count_scenarios(status)).sum() };
    let count_steps = |status| -> usize { features.iter().map(|f| f.count_steps(status)).sum() };

    lines.push("Execution summary".to_string());
    lines.push(format!(
        "Test execution start time: {}",
        start.map(format_timestamp).unwrap_or_else(|| "n/a".to_string())
    ));
    lines.push(format!(
        "Test execution time: {}",
        format_pretty(execution_time(start, end))
    ));
    lines.push(format!("Number of features: {}", features.len()));
    lines.push(format!("Number of scenarios: {}", scenarios.len()));
    lines.push(format!("Passed scenarios: {}", count_scenarios(ResultStatus::Passed)));
    lines.push(format!("Failed scenarios: {}", count_scenarios(ResultStatus::Failed)));
    lines.push(format!("Ignored scenarios: {}", count_scenarios(ResultStatus::Ignored)));
    lines.push(format!(
        "Number of steps: {}",
        features.iter().map(FeatureResult::total_steps).sum::<usize>()
    ));
    lines.push(format!("Passed steps: {}", count_steps(ResultStatus::Passed)));
    lines.push(format!("Failed steps: {}", count_steps(ResultStatus::Failed)));
    lines.push(format!("Ignored steps: {}", count_steps(ResultStatus::Ignored)));
    lines.push(format!("Not Run steps: {}", count_steps(ResultStatus::NotRun)));
}

fn write_feature_summary(lines: &mut Vec<String>, features: &[FeatureResult]) {
    lines.push("Feature summary".to_string());
    lines.push(FEATURE_SUMMARY_HEADER.to_string());
    for feature in features {
        lines.push(format!(
            "{} {} {} {} {} {} {} {} {} {} {} {}",
            feature_title(feature),
            feature.scenarios().len(),
            feature.count_scenarios(ResultStatus::Passed),
            feature.count_scenarios(ResultStatus::Failed),
            feature.count_scenarios(ResultStatus::Ignored),
            feature.total_steps(),
            feature.count_steps(ResultStatus::Passed),
            feature.count_steps(ResultStatus::Failed),
            feature.count_steps(ResultStatus::Ignored),
            feature.count_steps(ResultStatus::NotRun),
            format_pretty(feature.duration()),
            format_pretty(feature.average_duration()),
        ));
    }
}

fn write_feature_details(lines: &mut Vec<String>, features: &[FeatureResult]) {
    lines.push("Feature details".to_string());
    for feature in features {
        lines.push(feature_title(feature));
        if let Some(description) = feature.description() {
            lines.extend(description.lines().map(str::to_string));
        }
        for scenario in feature.scenarios() {
            write_scenario(lines, scenario);
        }
    }
}

fn write_scenario(lines: &mut Vec<String>, scenario: &ScenarioResult) {
    let mut header = format!("{} {}", scenario.status(), scenario.name());
    for label in scenario.labels() {
        header.push_str(&format!(" [{label}]"));
    }
    header.push_str(&format!(" ({})", format_pretty(scenario.duration())));
    lines.push(header);
    if let Some(description) = scenario.description() {
        lines.extend(description.lines().map(str::to_string));
    }
    for step in scenario.steps() {
        let mut line = format!("{} {}. {}", step.status(), step.number(), step.display_name());
        if let Some(duration) = step.duration() {
            line.push_str(&format!(" ({})", format_pretty(duration)));
        }
        lines.push(line);
    }
    let details = scenario
        .steps()
        .iter()
        .filter(|s| s.status() != ResultStatus::NotRun)
        .filter_map(|s| s.details());
    for detail in details {
        lines.extend(detail.lines().map(str::to_string));
    }
}

fn feature_title(feature: &FeatureResult) -> String {
    match feature.label() {
        Some(label) => format!("{} [{label}]", feature.name()),
        None => feature.name().to_string(),
    }
}

fn format_timestamp(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn execution_time(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Duration {
    match (start, end) {
        (Some(start), Some(end)) => (end - start).to_std().unwrap_or_default(),
        _ => Duration::ZERO,
    }
}
