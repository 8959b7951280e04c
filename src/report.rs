use crate::engine::Reconciliation;
use crate::record::{Classification, FileRecord};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    /// Also list stable files.
    pub all: bool,
    /// Also list flagged files an operator suppressed.
    pub show_suppressed: bool,
}

pub fn print_reconciliation(result: &Reconciliation, options: ReportOptions) {
    for line in format_lines(result, options) {
        println!("{}", line);
    }
}

fn format_lines(result: &Reconciliation, options: ReportOptions) -> Vec<String> {
    let mut rows: Vec<(Classification, &FileRecord)> = result
        .flagged()
        .filter(|(_, r)| options.show_suppressed || !r.suppressed)
        .collect();
    if options.all {
        rows.extend(result.stable.iter().map(|r| (Classification::Stable, r)));
    }
    rows.sort_by(|a, b| a.1.relative_path.cmp(&b.1.relative_path));

    rows.into_iter()
        .map(|(class, record)| format_record(class, record))
        .collect()
}

fn format_record(class: Classification, record: &FileRecord) -> String {
    let mut line = format!("{:<2} {}", class.code(), record.relative_path);

    let mut details = Vec::new();
    if let Some(size) = record.size_bytes
        && class != Classification::Stable
    {
        details.push(format_size(size));
    }
    if let Some(mtime) = record.modified_at {
        details.push(format_mtime(mtime));
    }
    if !details.is_empty() {
        line.push_str(&format!(" ({})", details.join(", ")));
    }

    if class != Classification::Stable && !record.fixable {
        line.push_str(" (no permission)");
    }
    if record.suppressed {
        line.push_str(" (suppressed)");
    }

    line
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    const GB: u64 = 1024 * 1024 * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

fn format_mtime(mtime: SystemTime) -> String {
    let datetime: chrono::DateTime<chrono::Local> = mtime.into();
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}
