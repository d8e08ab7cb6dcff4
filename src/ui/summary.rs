//! Banner, section headers, and the end-of-run statistics table.

use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

use crate::stats::latency_statistics::LatencyStatistics;

const BANNER_WIDTH: usize = 60;

/// Title block with a dynamic separator.
pub fn banner(title: &str) {
    let separator = "=".repeat(BANNER_WIDTH);
    println!("\n{}", separator);
    println!("{:^width$}", title.bold().cyan(), width = BANNER_WIDTH);
    println!("{}\n", separator);
}

/// Underlined section header.
pub fn section(title: &str) {
    println!("{}", title.bold().yellow());
    println!("{}", "━".repeat(title.chars().count() + 2));
}

fn format_ms(ns: f64) -> String {
    format!("{:.4}", ns / 1_000_000.0)
}

/// Latency summary rendered as a table, all values in milliseconds.
pub fn statistics_table(statistics: &LatencyStatistics) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Metric", "Latency (ms)"]);

    table.add_row(vec!["Mean".to_string(), format_ms(statistics.mean_ns)]);
    table.add_row(vec!["Median".to_string(), format_ms(statistics.median_ns)]);
    table.add_row(vec!["StdDev".to_string(), format_ms(statistics.stdev_ns)]);
    table.add_row(vec!["MAD".to_string(), format_ms(statistics.mad_ns)]);
    table.add_row(vec!["P95".to_string(), format_ms(statistics.p95_ns)]);
    table.add_row(vec!["P99".to_string(), format_ms(statistics.p99_ns)]);
    table.add_row(vec!["Min".to_string(), format_ms(statistics.min_ns)]);
    table.add_row(vec!["Max".to_string(), format_ms(statistics.max_ns)]);
    table.add_row(vec![
        "95% CI".to_string(),
        format!(
            "[{}, {}]",
            format_ms(statistics.confidence_interval_95.0),
            format_ms(statistics.confidence_interval_95.1)
        ),
    ]);
    table.add_row(vec![
        "Outliers removed".to_string(),
        statistics.outliers_removed.to_string(),
    ]);
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::trial_sample::TrialSample;

    #[test]
    fn table_reports_latencies_in_milliseconds() {
        let samples = [
            TrialSample { elapsed_ns: 1_000_000, polls: 3 },
            TrialSample { elapsed_ns: 2_000_000, polls: 4 },
        ];
        let statistics = LatencyStatistics::from_samples(&samples).unwrap();
        let rendered = statistics_table(&statistics).to_string();
        assert!(rendered.contains("Mean"));
        assert!(rendered.contains("P95"));
        assert!(rendered.contains("Outliers removed"));
        // 1.5 ms trimmed mean formatted with four decimals.
        assert!(rendered.contains("1.5000"));
    }
}
