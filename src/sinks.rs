//! Sink writers: where generated record batches end up.
//!
//! Every sink consumes whole batches rather than individual rows (mirroring how the original
//! system's `Export*` functions each take a `[]map[string]interface{}` batch plus an
//! `isFirstBatch` flag), because several formats (JSON array files, SQL multi-row `INSERT`s) can
//! only be framed correctly with batch boundaries in hand.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::error::Error;
use crate::value::Value;

/// One batch of records handed to a [`Sink`].
pub struct Batch<'a> {
    /// Column names in output order.
    pub columns: &'a [String],
    /// The records themselves.
    pub rows: &'a [IndexMap<String, Value>],
    /// Whether this is the first batch written for this task (controls header/open-mode).
    pub is_first_batch: bool,
    /// Whether this batch contains the last record of the whole run (controls trailing
    /// separators for formats with no closing delimiter, e.g. TXT/NDJSON).
    pub is_final_batch: bool,
}

/// A destination for generated record batches.
///
/// Kept synchronous and called from inside `tokio::task::spawn_blocking` (see
/// [`crate::executor`]): file and (via `Handle::block_on`) network/database I/O are all
/// blocking-shaped operations here, matching the straight-line style of the original system's
/// per-batch export functions.
pub trait Sink: Send {
    /// Writes one batch of records.
    fn write_batch(&mut self, batch: &Batch<'_>) -> Result<(), Error>;
}

/// Normalizes `file_name` to end with `.{extension}`, replacing any other extension it already
/// has. Grounded verbatim on the original system's `ensureFileExtension`.
pub fn ensure_file_extension(file_name: &str, extension: &str) -> String {
    if file_name.is_empty() {
        return file_name.to_owned();
    }
    let extension = extension.to_lowercase();
    let lower = file_name.to_lowercase();
    if lower.ends_with(&format!(".{extension}")) {
        return file_name.to_owned();
    }
    if let Some(idx) = file_name.rfind('.') {
        if idx > 0 && idx < file_name.len() - 1 {
            return format!("{}.{extension}", &file_name[..idx]);
        }
    }
    format!("{file_name}.{extension}")
}

fn resolve_path(generate_dir: &Path, file_name: &str, extension: &str) -> PathBuf {
    generate_dir.join(ensure_file_extension(file_name, extension))
}

fn render_sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_owned(),
        Value::Str(s) => format!("'{}'", s.replace('\'', "''")),
        other => other.to_string(),
    }
}

/// Writes batched multi-row `INSERT` statements to a `.sql` file.
///
/// Sub-batches at 1000 rows per statement to avoid pathologically long SQL lines, matching the
/// original `ExportToSQL`.
pub struct SqlFileSink {
    path: PathBuf,
    table_name: String,
}

const SQL_INSERT_CHUNK: usize = 1000;

impl SqlFileSink {
    /// Creates a sink writing to `generate_dir/ensure_file_extension(file_name, "sql")`.
    pub fn new(generate_dir: &Path, file_name: &str, table_name: impl Into<String>) -> Self {
        Self { path: resolve_path(generate_dir, file_name, "sql"), table_name: table_name.into() }
    }
}

impl Sink for SqlFileSink {
    fn write_batch(&mut self, batch: &Batch<'_>) -> Result<(), Error> {
        if batch.rows.is_empty() {
            return Ok(());
        }
        let mut file = open_for_batch(&self.path, batch.is_first_batch)?;
        for chunk in batch.rows.chunks(SQL_INSERT_CHUNK) {
            let values_list: Vec<String> = chunk
                .iter()
                .map(|row| {
                    let values: Vec<String> =
                        batch.columns.iter().map(|c| render_sql_literal(row.get(c).unwrap_or(&Value::Null))).collect();
                    format!("({})", values.join(", "))
                })
                .collect();
            let stmt = format!(
                "INSERT INTO {} ({}) VALUES {};\n",
                self.table_name,
                batch.columns.join(", "),
                values_list.join(", "),
            );
            file.write_all(stmt.as_bytes()).map_err(|e| Error::io("write SQL batch", &self.path, e))?;
        }
        Ok(())
    }
}

fn open_for_batch(path: &Path, is_first_batch: bool) -> Result<File, Error> {
    let result = if is_first_batch {
        File::create(path)
    } else {
        OpenOptions::new().append(true).open(path)
    };
    result.map_err(|e| Error::io("open file", path, e))
}

/// Writes one JSON object per line (NDJSON), matching the original `ExportToTXT`.
///
/// No trailing newline follows the very last record of the whole run; every other record
/// (including the last record of every non-final batch) is newline-terminated.
pub struct TxtFileSink {
    path: PathBuf,
}

impl TxtFileSink {
    /// Creates a sink writing to `generate_dir/ensure_file_extension(file_name, "txt")`.
    pub fn new(generate_dir: &Path, file_name: &str) -> Self {
        Self { path: resolve_path(generate_dir, file_name, "txt") }
    }
}

impl Sink for TxtFileSink {
    fn write_batch(&mut self, batch: &Batch<'_>) -> Result<(), Error> {
        if batch.rows.is_empty() {
            return Ok(());
        }
        let mut file = open_for_batch(&self.path, batch.is_first_batch)?;
        let last_index = batch.rows.len() - 1;
        for (i, row) in batch.rows.iter().enumerate() {
            let json = serde_json::to_string(&row_to_json(batch.columns, row)).map_err(Error::SchemaParse)?;
            file.write_all(json.as_bytes()).map_err(|e| Error::io("write TXT row", &self.path, e))?;
            let is_very_last_record = batch.is_final_batch && i == last_index;
            if !is_very_last_record {
                file.write_all(b"\n").map_err(|e| Error::io("write TXT separator", &self.path, e))?;
            }
        }
        Ok(())
    }
}

fn row_to_json(columns: &[String], row: &IndexMap<String, Value>) -> serde_json::Value {
    let mut obj = serde_json::Map::with_capacity(columns.len());
    for column in columns {
        obj.insert(column.clone(), row.get(column).unwrap_or(&Value::Null).to_json());
    }
    serde_json::Value::Object(obj)
}

/// Writes a pretty-printed JSON array file, appending later batches in place by seeking back
/// past the closing `\n]` and overwriting it with `,\n` before the new records. Matches the
/// original `ExportToJSON` exactly, including its assumption that the file on disk was last
/// written by this same sink (undefined behavior otherwise is accepted, not guarded against).
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    /// Creates a sink writing to `generate_dir/ensure_file_extension(file_name, "json")`.
    pub fn new(generate_dir: &Path, file_name: &str) -> Self {
        Self { path: resolve_path(generate_dir, file_name, "json") }
    }
}

impl Sink for JsonFileSink {
    fn write_batch(&mut self, batch: &Batch<'_>) -> Result<(), Error> {
        if batch.rows.is_empty() {
            return Ok(());
        }
        let mut file = if batch.is_first_batch {
            let mut f = File::create(&self.path).map_err(|e| Error::io("create JSON file", &self.path, e))?;
            f.write_all(b"[\n").map_err(|e| Error::io("write JSON header", &self.path, e))?;
            f
        } else {
            let mut f = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&self.path)
                .map_err(|e| Error::io("open JSON file", &self.path, e))?;
            let size = f.metadata().map_err(|e| Error::io("stat JSON file", &self.path, e))?.len();
            f.seek(SeekFrom::Start(size.saturating_sub(2))).map_err(|e| Error::io("seek JSON file", &self.path, e))?;
            f.write_all(b",\n").map_err(|e| Error::io("write JSON continuation", &self.path, e))?;
            f
        };

        let last_index = batch.rows.len() - 1;
        for (i, row) in batch.rows.iter().enumerate() {
            let pretty = serde_json::to_string_pretty(&row_to_json(batch.columns, row)).map_err(Error::SchemaParse)?;
            for line in pretty.lines() {
                file.write_all(b"  ").and_then(|_| file.write_all(line.as_bytes())).and_then(|_| file.write_all(b"\n"))
                    .map_err(|e| Error::io("write JSON row", &self.path, e))?;
            }
            if i != last_index {
                file.write_all(b",\n").map_err(|e| Error::io("write JSON separator", &self.path, e))?;
            }
        }
        file.write_all(b"\n]").map_err(|e| Error::io("write JSON trailer", &self.path, e))?;
        Ok(())
    }
}

/// Writes a UTF-8-BOM-prefixed CSV file, with the header row written once on the first batch.
/// Floats are rendered with trailing zeros (and a trailing bare `.`) stripped, matching the
/// original `ExportToCSV`.
pub struct CsvFileSink {
    path: PathBuf,
}

impl CsvFileSink {
    /// Creates a sink writing to `generate_dir/ensure_file_extension(file_name, "csv")`.
    pub fn new(generate_dir: &Path, file_name: &str) -> Self {
        Self { path: resolve_path(generate_dir, file_name, "csv") }
    }
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}

fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Str(s) => s.clone(),
        Value::Float(f) => {
            let formatted = format!("{f:.6}");
            let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
            trimmed.to_owned()
        }
        other => other.to_string(),
    }
}

impl Sink for CsvFileSink {
    fn write_batch(&mut self, batch: &Batch<'_>) -> Result<(), Error> {
        let mut file = if batch.is_first_batch {
            let mut f = File::create(&self.path).map_err(|e| Error::io("create CSV file", &self.path, e))?;
            f.write_all(&[0xEF, 0xBB, 0xBF]).map_err(|e| Error::io("write CSV BOM", &self.path, e))?;
            let header: Vec<String> = batch.columns.iter().map(|c| csv_escape(c)).collect();
            writeln!(f, "{}", header.join(",")).map_err(|e| Error::io("write CSV header", &self.path, e))?;
            f
        } else {
            OpenOptions::new().append(true).open(&self.path).map_err(|e| Error::io("open CSV file", &self.path, e))?
        };

        for row in batch.rows {
            let cells: Vec<String> =
                batch.columns.iter().map(|c| csv_escape(&csv_cell(row.get(c).unwrap_or(&Value::Null)))).collect();
            writeln!(file, "{}", cells.join(",")).map_err(|e| Error::io("write CSV row", &self.path, e))?;
        }
        Ok(())
    }
}

/// Inserts batches directly into a live database connection via `sqlx::AnyPool`.
pub struct DatabaseSink {
    pool: sqlx::AnyPool,
    table_name: String,
}

impl DatabaseSink {
    /// Connects to `data_source` and prepares to insert into `table_name`.
    pub async fn connect(data_source: &crate::model::DataSource, table_name: impl Into<String>) -> Result<Self, Error> {
        let dsn = data_source.connection_string().map_err(Error::Sink)?;
        let pool = sqlx::AnyPool::connect(&dsn).await.map_err(|e| Error::Sink(e.to_string()))?;
        Ok(Self { pool, table_name: table_name.into() })
    }

    async fn insert_batch(&self, batch: &Batch<'_>) -> Result<(), Error> {
        if batch.rows.is_empty() {
            return Ok(());
        }
        let placeholders: Vec<String> = (0..batch.columns.len()).map(|_| "?".to_owned()).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table_name,
            batch.columns.join(", "),
            placeholders.join(", "),
        );
        for row in batch.rows {
            let mut query = sqlx::query(&sql);
            for column in batch.columns {
                query = bind_value(query, row.get(column).unwrap_or(&Value::Null));
            }
            query.execute(&self.pool).await.map_err(|e| Error::Sink(e.to_string()))?;
        }
        Ok(())
    }
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>>,
    value: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(i.to_string()),
        Value::Float(f) => query.bind(*f),
        Value::Str(s) => query.bind(s.clone()),
        Value::List(_) | Value::Map(_) => query.bind(value.to_json().to_string()),
    }
}

impl Sink for DatabaseSink {
    fn write_batch(&mut self, batch: &Batch<'_>) -> Result<(), Error> {
        tokio::runtime::Handle::current().block_on(self.insert_batch(batch))
    }
}

/// The `{url, token?, type?}` blob configuring an [`HttpSink`], read from a task's
/// `configuration` field. Grounded on the original system's legacy-compatibility rule (§6): if
/// `configuration` is absent or carries no `url`, an `output_path` that looks like an HTTP(S)
/// URL is used instead.
#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct HttpSinkConfig {
    /// Target endpoint. May be empty if `output_path` supplies it instead.
    #[serde(default)]
    pub url: String,
    /// Bearer credential, `Bearer `-prefixed automatically unless already present.
    #[serde(default)]
    pub token: Option<String>,
    /// Tag sent as the POST body's `"type"` field. Defaults to the empty string.
    #[serde(default, rename = "type")]
    pub kind: String,
}

impl HttpSinkConfig {
    /// Parses `configuration` (if present) and falls back to `output_path` for the URL when
    /// `configuration` is absent or its `url` is empty. Fails if no URL can be determined.
    pub fn resolve(configuration: Option<&str>, output_path: &str) -> Result<Self, Error> {
        let mut config = match configuration {
            Some(raw) if !raw.trim().is_empty() => {
                serde_json::from_str::<HttpSinkConfig>(raw).map_err(|e| Error::Sink(format!("invalid HTTP sink configuration: {e}")))?
            }
            _ => HttpSinkConfig::default(),
        };
        if config.url.is_empty() {
            if output_path.starts_with("http://") || output_path.starts_with("https://") {
                config.url = output_path.to_owned();
            } else {
                return Err(Error::Sink("http sink requires a url (configuration.url or an http(s) output_path)".to_owned()));
            }
        }
        Ok(config)
    }
}

/// POSTs each batch as `{"type": tag, "data": [...]}` to an HTTP endpoint, with an optional
/// bearer token. Grounded on the original system's mock-server push verification (`verify.go`):
/// 30-second timeout, only 200/201 accepted as success.
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    tag: String,
}

impl HttpSink {
    /// Builds a sink posting to `config.url`, tagging every payload with `config.kind`, using
    /// `config.token` as a bearer credential if present (prefixing `"Bearer "` unless the caller
    /// already did).
    pub fn new(config: HttpSinkConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("reqwest client with a fixed timeout always builds");
        Self { client, url: config.url, token: config.token.filter(|t| !t.is_empty()), tag: config.kind }
    }

    async fn post_batch(&self, batch: &Batch<'_>) -> Result<(), Error> {
        let payload: Vec<serde_json::Value> = batch.rows.iter().map(|r| row_to_json(batch.columns, r)).collect();
        let body = serde_json::json!({ "type": self.tag, "data": payload });

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.token {
            let header = if token.to_lowercase().starts_with("bearer ") {
                token.clone()
            } else {
                format!("Bearer {token}")
            };
            request = request.header(reqwest::header::AUTHORIZATION, header);
        }

        let response = request.send().await.map_err(|e| Error::Sink(e.to_string()))?;
        match response.status().as_u16() {
            200 | 201 => Ok(()),
            status => Err(Error::Sink(format!("push sink returned unexpected status {status}"))),
        }
    }
}

impl Sink for HttpSink {
    fn write_batch(&mut self, batch: &Batch<'_>) -> Result<(), Error> {
        tokio::runtime::Handle::current().block_on(self.post_batch(batch))
    }
}
