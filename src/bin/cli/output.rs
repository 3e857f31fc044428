//! Output formatting for CLI operations.

use backpipe::progress::format_bytes_iec;
use backpipe::{ArtifactDetail, ArtifactInfo, BackupRecord, BackupReport, RecoveryReport, Registry};
use console::style;
use serde_json::{Value, json};

/// Trait for output formatting
pub trait OutputFormatter {
    /// Formats the outcome of a backup run
    fn format_backup(&self, report: &BackupReport) -> String;

    /// Formats the outcome of a recovery run
    fn format_recovery(&self, report: &RecoveryReport) -> String;

    /// Formats a list of records with their store indices
    fn format_records(&self, records: &[(usize, &BackupRecord)]) -> String;

    /// Formats one record in full
    fn format_record(&self, index: usize, record: &BackupRecord) -> String;

    /// Formats what inspect learned about an artifact
    fn format_inspect(&self, info: &ArtifactInfo) -> String;

    /// Formats the registered algorithm names
    fn format_algorithms(&self, registry: &Registry) -> String;
}

/// Human-readable output formatter
pub struct HumanFormatter;

fn stage_list(stages: &[backpipe::Stage]) -> String {
    if stages.is_empty() {
        return "-".to_string();
    }
    stages.iter().map(|s| s.name()).collect::<Vec<_>>().join(" -> ")
}

fn flags(record: &BackupRecord) -> String {
    let mut out = String::with_capacity(3);
    out.push(if record.is_packed { 'P' } else { '-' });
    out.push(if record.is_compressed { 'C' } else { '-' });
    out.push(if record.is_encrypted { 'E' } else { '-' });
    out
}

impl OutputFormatter for HumanFormatter {
    fn format_backup(&self, report: &BackupReport) -> String {
        let mut output = String::new();
        output.push_str(&format!(
            "{} {} ({} entries)\n",
            style("Backed up").green().bold(),
            report.record.source_full_path.display(),
            report.entries
        ));
        output.push_str(&format!("  Artifact: {}\n", report.artifact.display()));
        output.push_str(&format!("  Stages:   {}\n", stage_list(&report.stages)));
        output
    }

    fn format_recovery(&self, report: &RecoveryReport) -> String {
        let mut output = String::new();
        output.push_str(&format!(
            "{} to {}\n",
            style("Recovered").green().bold(),
            report.restored.display()
        ));
        output.push_str(&format!("  Stages:   {}\n", stage_list(&report.stages)));
        if let Some(summary) = &report.unpacked {
            output.push_str(&format!(
                "  Unpacked: {} files, {} directories ({})\n",
                summary.files,
                summary.directories,
                format_bytes_iec(summary.bytes)
            ));
            if summary.skipped > 0 {
                output.push_str(&format!("  Skipped:  {}\n", summary.skipped));
            }
        }
        output
    }

    fn format_records(&self, records: &[(usize, &BackupRecord)]) -> String {
        if records.is_empty() {
            return "No backup records.\n".to_string();
        }

        let mut output = String::new();
        output.push_str(&format!(
            "{:>5} {:<19} {:<5} {:<20} {}\n",
            "Index", "Time", "Flags", "Name", "Artifact"
        ));
        output.push_str(&"-".repeat(70));
        output.push('\n');
        for (index, record) in records {
            output.push_str(&format!(
                "{:>5} {:<19} {:<5} {:<20} {}\n",
                index,
                record.backup_time,
                flags(record),
                record.file_name,
                record.backup_file_name
            ));
        }
        output.push_str(&"-".repeat(70));
        output.push('\n');
        output.push_str(&format!("{} records\n", records.len()));
        output
    }

    fn format_record(&self, index: usize, record: &BackupRecord) -> String {
        let mut output = String::new();
        output.push_str(&format!("Record #{}:\n", index));
        output.push_str(&"-".repeat(40));
        output.push('\n');
        output.push_str(&format!("  Name:         {}\n", record.file_name));
        output.push_str(&format!("  Source:       {}\n", record.source_full_path.display()));
        output.push_str(&format!("  Artifact:     {}\n", record.artifact_path().display()));
        output.push_str(&format!("  Time:         {}\n", record.backup_time));
        output.push_str(&format!("  Packed:       {}\n", yes_no(record.is_packed)));
        output.push_str(&format!("  Compressed:   {}\n", yes_no(record.is_compressed)));
        output.push_str(&format!("  Encrypted:    {}\n", yes_no(record.is_encrypted)));
        if !record.description.is_empty() {
            output.push_str(&format!("  Description:  {}\n", record.description));
        }
        output
    }

    fn format_inspect(&self, info: &ArtifactInfo) -> String {
        let mut output = String::new();
        output.push_str(&format!("{}:\n", info.path.display()));
        output.push_str(&format!("  Size:       {}\n", format_bytes_iec(info.size)));
        match &info.class {
            Some(class) => {
                output.push_str(&format!("  Stage:      {}\n", class.signature.kind));
                output.push_str(&format!(
                    "  Algorithm:  {}\n",
                    class
                        .algorithm
                        .clone()
                        .unwrap_or_else(|| format!("unknown ({:#04x})", class.signature.tag))
                ));
            }
            None => output.push_str("  Stage:      none (plain copy)\n"),
        }

        match &info.detail {
            ArtifactDetail::Plain => {}
            ArtifactDetail::Container { header, entries } => {
                output.push_str(&format!("  Entries:    {}\n", header.entry_count));
                output.push_str(&format!("  Content at: {:#x}\n", header.content_start));
                if !entries.is_empty() {
                    output.push('\n');
                    output.push_str(&format!("{:>12} {:<9} {}\n", "Size", "Kind", "Name"));
                    output.push_str(&"-".repeat(50));
                    output.push('\n');
                    for entry in entries {
                        output.push_str(&format!(
                            "{:>12} {:<9} {}\n",
                            format_bytes_iec(entry.size),
                            entry.kind.name(),
                            entry.name
                        ));
                    }
                }
            }
            ArtifactDetail::Compressed(header) => {
                output.push_str(&format!(
                    "  Original:   {}\n",
                    format_bytes_iec(header.original_size)
                ));
                output.push_str(&format!("  Symbols:    {}\n", header.symbol_count()));
                output.push_str(&format!("  CRC-32:     {:08X}\n", header.crc32));
            }
            ArtifactDetail::Encrypted(header) => {
                output.push_str(&format!("  Header:     {} bytes\n", header.header_size));
                output.push_str(&format!("  CRC-32:     {:08X}\n", header.crc32));
            }
        }
        output
    }

    fn format_algorithms(&self, registry: &Registry) -> String {
        let mut output = String::new();
        output.push_str(&format!("Packers:     {}\n", registry.packers().join(", ")));
        output.push_str(&format!("Compressors: {}\n", registry.compressors().join(", ")));
        output.push_str(&format!("Encryptors:  {}\n", registry.encryptors().join(", ")));
        output
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "Yes" } else { "No" }
}

/// JSON output formatter
pub struct JsonFormatter;

fn record_json(index: usize, record: &BackupRecord) -> Value {
    let mut value = serde_json::to_value(record).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut value {
        map.insert("index".to_string(), json!(index));
    }
    value
}

fn pretty(value: &Value) -> String {
    let mut text = serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string());
    text.push('\n');
    text
}

impl OutputFormatter for JsonFormatter {
    fn format_backup(&self, report: &BackupReport) -> String {
        pretty(&json!({
            "artifact": report.artifact,
            "stages": report.stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "entries": report.entries,
            "record": report.record,
        }))
    }

    fn format_recovery(&self, report: &RecoveryReport) -> String {
        pretty(&json!({
            "restored": report.restored,
            "stages": report.stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "unpacked": report.unpacked.as_ref().map(|s| json!({
                "files": s.files,
                "directories": s.directories,
                "skipped": s.skipped,
                "bytes": s.bytes,
            })),
        }))
    }

    fn format_records(&self, records: &[(usize, &BackupRecord)]) -> String {
        let items: Vec<_> = records.iter().map(|(i, r)| record_json(*i, r)).collect();
        pretty(&Value::Array(items))
    }

    fn format_record(&self, index: usize, record: &BackupRecord) -> String {
        pretty(&record_json(index, record))
    }

    fn format_inspect(&self, info: &ArtifactInfo) -> String {
        let detail = match &info.detail {
            ArtifactDetail::Plain => Value::Null,
            ArtifactDetail::Container { header, entries } => json!({
                "entry_count": header.entry_count,
                "content_start": header.content_start,
                "entries": entries.iter().map(|e| json!({
                    "name": e.name,
                    "size": e.size,
                    "offset": e.offset,
                    "kind": e.kind.name(),
                })).collect::<Vec<_>>(),
            }),
            ArtifactDetail::Compressed(header) => json!({
                "original_size": header.original_size,
                "valid_bits": header.valid_bits,
                "freq_table_size": header.freq_table_size,
                "crc32": header.crc32,
            }),
            ArtifactDetail::Encrypted(header) => json!({
                "header_size": header.header_size,
                "crc32": header.crc32,
            }),
        };
        pretty(&json!({
            "path": info.path,
            "size": info.size,
            "stage": info.class.as_ref().map(|c| c.signature.kind.name()),
            "algorithm": info.class.as_ref().and_then(|c| c.algorithm.clone()),
            "detail": detail,
        }))
    }

    fn format_algorithms(&self, registry: &Registry) -> String {
        pretty(&json!({
            "packers": registry.packers(),
            "compressors": registry.compressors(),
            "encryptors": registry.encryptors(),
        }))
    }
}

/// Creates the appropriate formatter based on output format
pub fn create_formatter(format: super::OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        super::OutputFormat::Human => Box::new(HumanFormatter),
        super::OutputFormat::Json => Box::new(JsonFormatter),
    }
}
