use colored::Colorize;
use octofhir_loader::RunReport;
use tabled::builder::Builder;
use tabled::settings::Style;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_run_report(report: &RunReport) {
    let mut builder = Builder::default();
    builder.push_record(["Metric", "Value"]);
    for (name, value) in run_report_rows(report) {
        builder.push_record([name.to_string(), value]);
    }
    println!("{}", builder.build().with(Style::rounded()));

    let summary = format!(
        "Total success requests: {} of {} in {:.1?}",
        report.succeeded, report.submitted, report.elapsed
    );
    if report.success {
        print_success(&summary);
    } else {
        print_error(&summary);
    }
}

fn run_report_rows(report: &RunReport) -> Vec<(&'static str, String)> {
    vec![
        ("Files", report.files.to_string()),
        ("Valid lines", report.valid_lines.to_string()),
        ("Invalid lines", report.invalid_lines.to_string()),
        ("Submitted", report.submitted.to_string()),
        ("Succeeded", report.succeeded.to_string()),
        ("Skipped (duplicate)", report.skipped.to_string()),
        ("Failed", report.failed.to_string()),
        ("Retries", report.retries.to_string()),
        ("Events/s (window)", format!("{:.1}", report.events_per_second)),
        ("Output", report.output_path.display().to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_report_rows_cover_counts() {
        let report = RunReport {
            files: 2,
            valid_lines: 5,
            invalid_lines: 1,
            submitted: 9,
            succeeded: 8,
            skipped: 2,
            failed: 1,
            retries: 4,
            elapsed: Duration::from_secs(3),
            events_per_second: 2.5,
            success: false,
            output_path: PathBuf::from("output"),
        };
        let rows = run_report_rows(&report);
        assert_eq!(rows[0], ("Files", "2".to_string()));
        assert!(rows.contains(&("Failed", "1".to_string())));
        assert!(rows.contains(&("Retries", "4".to_string())));
        assert!(rows.contains(&("Events/s (window)", "2.5".to_string())));
    }
}
