//! Run result formatting.

use crate::metrics::RunResults;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};

/// Formats run results for output.
pub struct ResultsReport;

impl ResultsReport {
    /// Format results as a console table.
    pub fn format_table(results: &RunResults) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![format!("Load Test Results: {}", results.scenario_name)]);

        table.add_row(vec!["Duration:", &format!("{:.1}s", results.duration_secs)]);
        table.add_row(vec![
            "Total Requests:",
            &format!("{}", results.total_requests),
        ]);
        let success_rate = if results.total_requests > 0 {
            (results.successful_requests as f64 / results.total_requests as f64) * 100.0
        } else {
            0.0
        };
        table.add_row(vec!["Success Rate:", &format!("{:.1}%", success_rate)]);
        table.add_row(vec![
            "Requests/sec:",
            &format!("{:.1}", results.requests_per_second),
        ]);
        table.add_row(vec!["Peak VUs:", &format!("{}", results.max_vus)]);

        table.add_row(vec!["", ""]);
        table.add_row(vec!["Latency (ms)", "p50 / p90 / p95 / p99 / max"]);
        table.add_row(vec![
            "",
            &format!(
                "{:.1} / {:.1} / {:.1} / {:.1} / {:.1}",
                results.latency_p50,
                results.latency_p90,
                results.latency_p95,
                results.latency_p99,
                results.latency_max
            ),
        ]);

        table.add_row(vec!["", ""]);
        table.add_row(vec!["Checks", "passed / failed"]);
        for (name, stats) in &results.checks {
            table.add_row(vec![
                name.as_str(),
                &format!("{} / {}", stats.passed, stats.failed),
            ]);
        }

        table.to_string()
    }

    /// Format results as JSON.
    pub fn format_json(results: &RunResults) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(results)?)
    }

    /// Format results as CSV row.
    pub fn format_csv(results: &RunResults) -> String {
        format!(
            "{},{},{:.1},{},{},{},{:.1},{:.1},{:.1},{:.1}",
            results.timestamp,
            results.scenario_name,
            results.duration_secs,
            results.total_requests,
            results.successful_requests,
            results.failed_requests,
            results.requests_per_second,
            results.latency_p50,
            results.latency_p90,
            results.latency_p99
        )
    }

    /// CSV header row.
    pub fn csv_header() -> &'static str {
        "timestamp,scenario,duration,requests,passed,failed,rps,p50,p90,p99"
    }
}
