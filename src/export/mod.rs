//! Output writers for a finished series: CSV (whole or split), JSON, and a
//! plain-text table for the terminal.

use crate::models::{CurrentQuote, DailyRecord, OhlcvSeries, SeriesSummary};
use crate::pipeline::PipelineRun;
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

pub const CSV_HEADER: [&str; 6] = ["Date", "Open", "High", "Low", "Close", "Volume"];

// ── CSV ───────────────────────────────────────────────────────────────────────

pub fn write_csv<'a, W, I>(records: I, writer: W) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a DailyRecord>,
{
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(CSV_HEADER)?;
    for record in records {
        wtr.write_record(record.export_row())?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn csv_string<'a>(records: impl IntoIterator<Item = &'a DailyRecord>) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(records, &mut buf)?;
    Ok(String::from_utf8(buf)?)
}

fn write_csv_file<'a>(path: &Path, records: impl IntoIterator<Item = &'a DailyRecord>) -> Result<()> {
    let file = std::fs::File::create(path).with_context(|| format!("Cannot create {:?}", path))?;
    write_csv(records, file)
}

/// Files produced by [`write_split`].
#[derive(Debug, Clone, PartialEq)]
pub struct SplitFiles {
    pub complete: PathBuf,
    pub current: Option<PathBuf>,
    pub historical: PathBuf,
}

/// Complete, current-day and historical CSVs under `dir`, stamped with `at`.
/// The current-day file is skipped when the series has no current record.
pub fn write_split(series: &OhlcvSeries, dir: &Path, at: NaiveDateTime) -> Result<SplitFiles> {
    std::fs::create_dir_all(dir).with_context(|| format!("Cannot create {:?}", dir))?;
    let stamp = at.format("%Y%m%d_%H%M%S");

    let complete = dir.join(format!("ohlcv_complete_{}.csv", stamp));
    write_csv_file(&complete, series.records())?;

    let current = match series.current() {
        Some(record) => {
            let path = dir.join(format!("ohlcv_current_{}.csv", stamp));
            write_csv_file(&path, [record])?;
            Some(path)
        }
        None => None,
    };

    let historical = dir.join(format!("ohlcv_historical_{}.csv", stamp));
    write_csv_file(&historical, series.historical())?;

    info!("Split export written to {:?}", dir);
    Ok(SplitFiles {
        complete,
        current,
        historical,
    })
}

// ── JSON ──────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct JsonReport<'a> {
    summary: SeriesSummary,
    current: Option<&'a CurrentQuote>,
    change: Option<f64>,
    change_pct: Option<f64>,
    records: &'a [DailyRecord],
}

pub fn json_string(run: &PipelineRun) -> Result<String> {
    let report = JsonReport {
        summary: run.series.summary(),
        current: run.current.as_ref(),
        change: run.current.as_ref().and_then(CurrentQuote::change),
        change_pct: run.current.as_ref().and_then(CurrentQuote::change_pct),
        records: run.series.records(),
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

// ── Table ─────────────────────────────────────────────────────────────────────

pub fn table_string(run: &PipelineRun) -> String {
    let mut out = String::new();
    let line = "─".repeat(64);

    let _ = writeln!(out, "{}", line);
    if let Some(q) = &run.current {
        let _ = write!(out, "  Current  : {:.2} ({} via {})", q.record.close, q.record.date, q.backend);
        if let (Some(c), Some(p)) = (q.change(), q.change_pct()) {
            let _ = write!(out, "  {:+.2} ({:+.2}%)", c, p);
        }
        let _ = writeln!(out);
    } else {
        let _ = writeln!(out, "  Current  : n/a");
    }
    let _ = writeln!(out, "  History  : {} rows", run.historical_count);
    let _ = writeln!(out, "{}", line);
    let _ = writeln!(
        out,
        "  {:<10}  {:>9}  {:>9}  {:>9}  {:>9}  {:>9}",
        CSV_HEADER[0], CSV_HEADER[1], CSV_HEADER[2], CSV_HEADER[3], CSV_HEADER[4], CSV_HEADER[5]
    );
    for record in run.series.records() {
        let [date, open, high, low, close, volume] = record.export_row();
        let _ = writeln!(
            out,
            "  {:<10}  {:>9}  {:>9}  {:>9}  {:>9}  {:>9}",
            date, open, high, low, close, volume
        );
    }
    let _ = writeln!(out, "{}", line);
    out
}
