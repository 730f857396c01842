//! 排序指标
//!
//! 基于 metrics crate 记录排序调用与规则拒绝情况。
//! 未安装 recorder 时所有记录都是空操作。

/// 登记指标描述（出现在导出端的 HELP 注释中）
pub fn describe_ranking_metrics() {
    metrics::describe_counter!(
        "ranking_invocations_total",
        "Total number of ranking invocations"
    );
    metrics::describe_histogram!(
        "ranking_duration_seconds",
        "Ranking invocation duration in seconds"
    );
    metrics::describe_counter!(
        "ranking_rules_rejected_total",
        "Total number of rules rejected during ranking"
    );
    metrics::describe_counter!(
        "ranking_rules_fired_total",
        "Total number of rules that credited at least one candidate"
    );
}

/// 记录一次排序调用
#[inline]
pub fn record_ranking(status: &str, rules_fired: usize, duration_secs: f64) {
    metrics::counter!(
        "ranking_invocations_total",
        "status" => status.to_string()
    )
    .increment(1);

    metrics::counter!("ranking_rules_fired_total").increment(rules_fired as u64);
    metrics::histogram!("ranking_duration_seconds").record(duration_secs);
}

/// 记录一条被拒绝的规则
#[inline]
pub fn record_rule_rejected(code: &str) {
    metrics::counter!(
        "ranking_rules_rejected_total",
        "code" => code.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        describe_ranking_metrics();
        record_ranking("ok", 3, 0.002);
        record_ranking("timeout", 0, 1.5);
        record_rule_rejected("UNKNOWN_FIELD");
    }
}
