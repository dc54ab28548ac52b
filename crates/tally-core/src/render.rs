use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use serde::Serialize;
use unicode_width::UnicodeWidthStr;

use crate::classify::Variant;
use crate::config::Config;
use crate::progress::{Bucket, BuildTally};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl OutputFormat {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "table" | "text" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            other => Err(anyhow!("invalid output setting: {other}")),
        }
    }
}

/// One row of `describe` output.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRow {
    pub id: String,
    pub status: String,
    pub class: String,
    pub label: String,
    pub badge: String,
    #[serde(skip)]
    pub variant: Variant,
}

#[derive(Debug, Clone, Serialize)]
struct BucketRow<'a> {
    bucket: Bucket,
    count: usize,
    percent: Option<f64>,
    summary: &'a str,
}

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    format: OutputFormat,
}

impl Renderer {
    pub fn new(cfg: &Config, force_json: bool) -> anyhow::Result<Self> {
        let color = cfg.get_bool("color")?.unwrap_or(true);
        let format = if force_json {
            OutputFormat::Json
        } else {
            OutputFormat::parse(&cfg.get("output").unwrap_or_else(|| "table".to_string()))?
        };

        Ok(Self { color, format })
    }

    pub fn print_value<T: Serialize>(&mut self, plain: &str, value: &T) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        match self.format {
            OutputFormat::Table => writeln!(out, "{plain}")?,
            OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(value)?)?,
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, rows))]
    pub fn print_task_rows(&mut self, rows: &[TaskRow]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if self.format == OutputFormat::Json {
            writeln!(out, "{}", serde_json::to_string(rows)?)?;
            return Ok(());
        }

        let headers = ["ID", "Status", "Class", "Label", "Badge"]
            .map(str::to_string)
            .to_vec();
        let body = rows
            .iter()
            .map(|row| {
                vec![
                    row.id.clone(),
                    row.status.clone(),
                    row.class.clone(),
                    self.paint(&row.label, variant_code(row.variant)),
                    row.badge.clone(),
                ]
            })
            .collect();

        write_table(&mut out, headers, body)
    }

    #[tracing::instrument(skip(self, tally))]
    pub fn print_tally(&mut self, tally: &BuildTally) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let segments = tally.segments();

        if self.format == OutputFormat::Json {
            let rows: Vec<BucketRow<'_>> = segments
                .iter()
                .map(|segment| BucketRow {
                    bucket: segment.bucket,
                    count: segment.count,
                    percent: segment.percent,
                    summary: &segment.title,
                })
                .collect();
            writeln!(out, "{}", serde_json::to_string(&rows)?)?;
            return Ok(());
        }

        let headers = ["Bucket", "Count", "Percent", "Summary"]
            .map(str::to_string)
            .to_vec();
        let body = segments
            .iter()
            .map(|segment| {
                let percent = segment
                    .percent
                    .map(|p| format!("{p:.1}%"))
                    .unwrap_or_else(|| "-".to_string());
                vec![
                    self.paint(bucket_name(segment.bucket), bucket_code(segment.bucket)),
                    segment.count.to_string(),
                    percent,
                    segment.title.clone(),
                ]
            })
            .collect();

        write_table(&mut out, headers, body)
    }

    fn paint(&self, text: &str, code: Option<&str>) -> String {
        let Some(code) = code else {
            return text.to_string();
        };
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn variant_code(variant: Variant) -> Option<&'static str> {
    match variant {
        Variant::Info => Some("36"),
        Variant::Danger => Some("31"),
        Variant::Warning => Some("33"),
        Variant::Success => Some("32"),
        Variant::Default => None,
    }
}

fn bucket_code(bucket: Bucket) -> Option<&'static str> {
    match bucket {
        Bucket::Success => Some("32"),
        Bucket::Failed => Some("31"),
        Bucket::Started => Some("33"),
        Bucket::Neither => None,
    }
}

fn bucket_name(bucket: Bucket) -> &'static str {
    match bucket {
        Bucket::Success => "success",
        Bucket::Failed => "failed",
        Bucket::Started => "started",
        Bucket::Neither => "neither",
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
