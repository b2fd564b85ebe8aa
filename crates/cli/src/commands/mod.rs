//! Subcommand implementations.
//!
//! Each `cmd_*` function prints its result to stdout in the requested
//! format, or reports the error and exits with status 1.

pub mod list;
pub mod new;
pub mod operator;
pub mod show;

use std::process;

use dlc_core::{Case, CaseError};

use crate::{report_error, OutputFormat};

/// Report a case error and exit.
pub(crate) fn fail(err: &CaseError, output: OutputFormat, quiet: bool) -> ! {
    report_error(&err.to_string(), output, quiet);
    process::exit(1);
}

pub(crate) fn print_case(case: &Case, output: OutputFormat) {
    match output {
        OutputFormat::Text => print!("{}", render_case(case)),
        OutputFormat::Json => println!("{}", case_json(case)),
    }
}

pub(crate) fn print_cases(cases: &[Case], output: OutputFormat, quiet: bool) {
    match output {
        OutputFormat::Text => {
            if cases.is_empty() {
                if !quiet {
                    println!("no cases");
                }
                return;
            }
            println!(
                "{:>6}  {:>3}  {:<20}  {:<16}  {:<14}  {:>8}",
                "CASE", "VER", "STATE", "HOST", "DEVICE", "RESOURCE"
            );
            for case in cases {
                println!("{}", summary_line(case));
            }
        }
        OutputFormat::Json => {
            let list: Vec<serde_json::Value> = cases.iter().map(case_json).collect();
            println!("{}", serde_json::Value::Array(list));
        }
    }
}

fn case_json(case: &Case) -> serde_json::Value {
    serde_json::to_value(case).unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }))
}

fn or_dash<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn summary_line(case: &Case) -> String {
    let marker = if case.active { "" } else { " (archived)" };
    format!(
        "{:>6}  {:>3}  {:<20}  {:<16}  {:<14}  {:>8}{}",
        or_dash(&case.case_id),
        case.version_number,
        case.state.as_str(),
        or_dash(&case.hostname),
        or_dash(&case.device_path),
        or_dash(&case.resource_id),
        marker
    )
}

fn render_case(case: &Case) -> String {
    let mut out = String::new();
    let mut field = |name: &str, value: String| {
        out.push_str(&format!("{:<16}{}\n", format!("{name}:"), value));
    };
    field("case", or_dash(&case.case_id));
    field("version", case.version_number.to_string());
    field("active", case.active.to_string());
    field("state", case.state.to_string());
    field("action", case.action.to_string());
    field("wait reason", case.wait_reason.to_string());
    field("hostname", or_dash(&case.hostname));
    field("device", or_dash(&case.device_path));
    field("resource", or_dash(&case.resource_id));
    field("cluster", or_dash(&case.cluster_id));
    field("weight", or_dash(&case.resource_weight));
    field("mount point", or_dash(&case.mount_point));
    field("host serial", or_dash(&case.host_serial));
    field("diagnostic", case.diagnostic.to_string());
    field("recorded at", or_dash(&case.recorded_at));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_shows_unset_fields_as_dash() {
        let case = Case::open().with_host_device("node1", "/dev/sdb");
        let text = render_case(&case);
        assert!(text.contains("hostname:       node1\n"));
        assert!(text.contains("device:         sdb\n"));
        assert!(text.contains("resource:       -\n"));
        assert!(text.contains("state:          NEW\n"));
    }

    #[test]
    fn archived_rows_are_marked() {
        let mut case = Case::open().with_host_device("node1", "sdb");
        case.case_id = Some(3);
        case.active = false;
        assert!(summary_line(&case).ends_with("(archived)"));
    }
}
