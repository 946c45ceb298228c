use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use evalgrid_core::{EvalError, EvalResult, ErrorInfo, ResultRow};
use flate2::write::GzEncoder;
use serde_json::Value;

use crate::layout::TableLayout;

/// Destination that receives every row written to a result table.
///
/// Opening happens in the sink's constructor; the owning table calls
/// [`TableSink::close`] exactly once.
pub trait TableSink: Send {
    /// Writes one row, already normalized to the layout.
    fn write_row(&mut self, layout: &TableLayout, row: &ResultRow) -> EvalResult<()>;

    /// Flushes and releases the sink.
    fn close(&mut self) -> EvalResult<()>;

    /// Short label used in logs and error context.
    fn describe(&self) -> String {
        "sink".to_string()
    }
}

/// Compression applied to a CSV output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Pick from the file extension (`.gz` means gzip).
    #[default]
    Auto,
    /// Plain text.
    None,
    /// Gzip stream.
    Gzip,
}

impl Compression {
    fn resolve(self, path: &Path) -> Self {
        match self {
            Compression::Auto => match path.extension().and_then(|ext| ext.to_str()) {
                Some("gz") => Compression::Gzip,
                _ => Compression::None,
            },
            other => other,
        }
    }
}

enum Output {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl Output {
    fn finish(self) -> io::Result<()> {
        match self {
            Output::Plain(mut out) => out.flush(),
            Output::Gzip(out) => out.finish()?.flush(),
        }
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Plain(out) => out.write(buf),
            Output::Gzip(out) => out.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Plain(out) => out.flush(),
            Output::Gzip(out) => out.flush(),
        }
    }
}

/// CSV file sink with a header row taken from the table layout.
pub struct CsvSink {
    path: PathBuf,
    writer: Option<csv::Writer<Output>>,
}

impl CsvSink {
    /// Creates the file (and its parent directory) and writes the header,
    /// choosing compression from the extension.
    pub fn create(path: impl Into<PathBuf>, layout: &TableLayout) -> EvalResult<Self> {
        Self::create_with(path, layout, Compression::Auto)
    }

    /// Creates the file with an explicit compression mode.
    pub fn create_with(
        path: impl Into<PathBuf>,
        layout: &TableLayout,
        compression: Compression,
    ) -> EvalResult<Self> {
        let path = path.into();
        ensure_parent(&path)?;
        let file = File::create(&path).map_err(|err| {
            EvalError::Io(
                ErrorInfo::new("csv-open", "failed to create CSV output")
                    .with_context("path", path.display())
                    .with_hint(err.to_string()),
            )
        })?;
        let out = match compression.resolve(&path) {
            Compression::Gzip => Output::Gzip(GzEncoder::new(
                BufWriter::new(file),
                flate2::Compression::default(),
            )),
            _ => Output::Plain(BufWriter::new(file)),
        };
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(out);
        writer
            .write_record(layout.columns())
            .map_err(|err| wrap_csv("csv-write-header", &path, err))?;
        Ok(Self {
            path,
            writer: Some(writer),
        })
    }

    /// Path of the output file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TableSink for CsvSink {
    fn write_row(&mut self, layout: &TableLayout, row: &ResultRow) -> EvalResult<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            EvalError::Io(
                ErrorInfo::new("csv-closed", "CSV output already closed")
                    .with_context("path", self.path.display()),
            )
        })?;
        let record: Vec<String> = layout
            .columns()
            .map(|column| render_cell(row.get(column)))
            .collect();
        writer
            .write_record(&record)
            .map_err(|err| wrap_csv("csv-write-row", &self.path, err))
    }

    fn close(&mut self) -> EvalResult<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        let out = writer
            .into_inner()
            .map_err(|err| wrap_csv("csv-flush", &self.path, err.into_error().into()))?;
        out.finish().map_err(|err| {
            EvalError::Io(
                ErrorInfo::new("csv-close", "failed to finish CSV output")
                    .with_context("path", self.path.display())
                    .with_hint(err.to_string()),
            )
        })
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }
}

/// Renders a value as a CSV cell: strings verbatim, null as empty, anything
/// else as JSON.
pub fn render_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

fn ensure_parent(path: &Path) -> EvalResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| {
            EvalError::Io(
                ErrorInfo::new("csv-create-dir", "failed to create output directory")
                    .with_context("path", parent.display())
                    .with_hint(err.to_string()),
            )
        })?;
    }
    Ok(())
}

fn wrap_csv(code: &str, path: &Path, err: csv::Error) -> EvalError {
    EvalError::Io(
        ErrorInfo::new(code, "CSV output failure")
            .with_context("path", path.display())
            .with_hint(err.to_string()),
    )
}
