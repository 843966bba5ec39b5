//! # Report Commands
//!
//! Lists saved stock-take reports, newest first, or prints one with its
//! item rows.

use opname_core::{OpnameStatus, SessionReport};
use opname_scan::StationConfig;

use crate::cli::ReportsArgs;
use crate::error::{CliError, CliResult};

use super::open_database;

pub async fn run(args: ReportsArgs, config: &StationConfig, json: bool) -> CliResult<()> {
    let db = open_database(config).await?;
    let reports = db.reports();

    let Some(id) = args.id else {
        let list = reports.list_reports(args.limit).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&list)?);
        } else {
            for report in &list {
                print_summary(report);
            }
            println!("{} report(s)", list.len());
        }
        return Ok(());
    };

    let mut report = reports
        .get_report(&id)
        .await?
        .ok_or_else(|| CliError::not_found("Report", &id))?;
    report.items = reports.get_items(&id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_summary(&report);
    for item in &report.items {
        let flag = match item.status {
            OpnameStatus::Found if item.misplaced => "misplaced",
            OpnameStatus::NewItem => "new",
            _ => "",
        };
        println!(
            "  {:<14} {:<11} {:<40} {:<20} {}",
            item.item_code.as_deref().unwrap_or("-"),
            format!("{:?}", item.status),
            item.title,
            item.actual_scanned_location
                .as_deref()
                .or(item.expected_location.as_deref())
                .unwrap_or("-"),
            flag,
        );
    }
    Ok(())
}

fn print_summary(report: &SessionReport) {
    println!(
        "{}  {}  {}  expected {}, found {}, missing {}, new {}",
        report.id,
        report.finished_at.format("%Y-%m-%d %H:%M"),
        report.name,
        report.expected_count,
        report.found_count,
        report.missing_count,
        report.new_count,
    );
}
