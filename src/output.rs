use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, RunResult};
use crate::domain::{AcquisitionRecord, AcquisitionStatus, ArtifactSource};
use crate::store::MigrationReport;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(result: &RunResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_record(record: &AcquisitionRecord) -> io::Result<()> {
        Self::print_json(record)
    }

    pub fn print_migration(report: &MigrationReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Line-per-event progress on stdout.
pub struct ConsoleOutput;

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        let message = event.message.trim();
        match event.elapsed {
            Some(elapsed) if elapsed.as_secs() > 0 => {
                println!("{message} ({:.1}s)", elapsed.as_secs_f64())
            }
            _ => println!("{message}"),
        }
    }
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

impl ConsoleOutput {
    pub fn print_run_summary(result: &RunResult) {
        println!("{CYAN}DOI harvest summary ({}){RESET}", result.save_dir);
        println!(
            "{GREEN}Downloaded or present: {} (already on disk: {}){RESET}",
            result.succeeded, result.skipped_existing
        );
        let color = if result.failed == 0 { GREEN } else { YELLOW };
        println!("{color}Failed: {}{RESET}", result.failed);
        for record in result
            .records
            .iter()
            .filter(|record| record.status != AcquisitionStatus::Success)
        {
            Self::print_record(record);
        }
    }

    pub fn print_record(record: &AcquisitionRecord) {
        let doi = record
            .doi
            .as_ref()
            .map(|doi| doi.to_string())
            .unwrap_or_else(|| "<invalid>".to_string());
        match record.status {
            AcquisitionStatus::Success => {
                let source = match &record.source {
                    Some(ArtifactSource::Existing) => "already on disk".to_string(),
                    Some(ArtifactSource::Strategy(name)) => name.clone(),
                    None => "unknown".to_string(),
                };
                let file = record.canonical_filename.as_deref().unwrap_or_default();
                println!("{GREEN}Y row {} {doi} -> {file} ({source}){RESET}", record.row + 1);
            }
            AcquisitionStatus::Failed | AcquisitionStatus::Pending => {
                let reason = record.failure.as_deref().unwrap_or("not processed");
                println!("{RED}N row {} {doi}: {reason}{RESET}", record.row + 1);
            }
        }
    }

    pub fn print_migration(report: &MigrationReport) {
        println!(
            "{CYAN}Renamed {} legacy file(s); {} already canonical; {} not on disk{RESET}",
            report.renamed.len(),
            report.already_canonical,
            report.missing
        );
        for file in &report.renamed {
            println!("{GREEN}  {} -> {}{RESET}", file.from, file.to);
        }
    }
}
