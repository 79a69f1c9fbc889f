//! Data-model types shared by the generator, schema walker, sinks, and executor.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`Task`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created but not yet started.
    Pending,
    /// Currently generating and writing records.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error; see the task's `error_msg`.
    Failed,
}

/// What kind of schema a [`Task`] generates data for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Generate rows for a database table, described by [`TableInfo`].
    Database,
    /// Generate objects matching a JSON schema document.
    Json,
    /// Generate rows for a flat, column-oriented CSV file.
    Csv,
}

/// Where generated records are written.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    /// Insert directly into a live database connection.
    Database,
    /// Write a `.sql` file of batched `INSERT` statements.
    Sql,
    /// Write a JSON array file.
    Json,
    /// Write a newline-delimited JSON (NDJSON) text file.
    Txt,
    /// Write a `.csv` file.
    Csv,
    /// POST each batch to an HTTP endpoint (the "mock server" push sink).
    Http,
}

/// A reference to an external database this task reads from or writes to.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataSource {
    /// Human-readable name.
    pub name: String,
    /// Dialect: `mysql`, `postgresql`, or `sqlite`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Hostname; unused for `sqlite`.
    #[serde(default)]
    pub host: String,
    /// Port; unused for `sqlite`.
    #[serde(default)]
    pub port: u16,
    /// Database name, or file path for `sqlite`.
    #[serde(default)]
    pub database: String,
    /// Username; unused for `sqlite`.
    #[serde(default)]
    pub username: String,
    /// Password; unused for `sqlite`.
    #[serde(default)]
    pub password: String,
}

impl DataSource {
    /// Builds the connection string `sqlx::AnyPool` expects for this dialect.
    pub fn connection_string(&self) -> Result<String, String> {
        match self.kind.as_str() {
            "mysql" => Ok(format!(
                "mysql://{}:{}@{}:{}/{}",
                self.username, self.password, self.host, self.port, self.database
            )),
            "postgresql" | "postgres" => Ok(format!(
                "postgres://{}:{}@{}:{}/{}",
                self.username, self.password, self.host, self.port, self.database
            )),
            "sqlite" => Ok(format!("sqlite://{}", self.database)),
            other => Err(format!("unsupported database type: {other}")),
        }
    }
}

/// A single column generation rule.
///
/// `parameters` carries rule-specific knobs (`min`/`max`, `pattern`, `values`, `start`/`step`,
/// `format`, `length`, ...). Using an untyped [`serde_json::Value`] map mirrors how the original
/// system stores rules as opaque JSON, and lets new rule kinds add parameters without a schema
/// migration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FieldRule {
    /// One of: `fixed`, `sequence`/`increment`, `date_sequence`, `random`, `range`, `regex`,
    /// `enum`, `uuid`, `custom`, `db_lookup`. Empty string behaves like `random`.
    #[serde(default)]
    pub r#type: String,
    /// Legacy single-value shorthand for `fixed` rules (kept for input compatibility).
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    /// Rule-specific parameters.
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

impl FieldRule {
    /// A rule with no type, which dispatches like `"random"`.
    pub fn random() -> Self {
        Self { r#type: "random".to_owned(), value: None, parameters: HashMap::new() }
    }

    /// Reads a string parameter.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(serde_json::Value::as_str)
    }

    /// Reads a string parameter, trying each of `keys` in order and returning the first match.
    /// Used where a rule's parameter has both an original-system name and a shorter alias.
    pub fn param_str_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.param_str(key))
    }

    /// Reads a parameter coercible to `f64`, accepting JSON numbers or numeric strings.
    pub fn param_f64(&self, key: &str) -> Option<f64> {
        match self.parameters.get(key) {
            Some(serde_json::Value::Number(n)) => n.as_f64(),
            Some(serde_json::Value::String(s)) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Column metadata for a database table, as returned by a [`crate::introspect::DatabaseIntrospector`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Database-reported type name (e.g. `"varchar"`, `"int"`, `"datetime"`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Whether the column accepts `NULL`.
    #[serde(default)]
    pub nullable: bool,
    /// The database's default-value expression, if any.
    #[serde(default)]
    pub default_value: String,
    /// Whether this column is (part of) the primary key.
    #[serde(default)]
    pub is_primary_key: bool,
    /// Whether the database auto-increments this column.
    #[serde(default)]
    pub is_auto_increment: bool,
    /// Declared maximum length, for `varchar`-like types. `0` means unspecified.
    #[serde(default)]
    pub max_length: i64,
}

/// The full column layout of one table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableInfo {
    /// Name of the table.
    pub table_name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnInfo>,
}

/// A unit of generation work: what schema to generate against, how many records, and where to
/// send them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier, opaque to the engine.
    pub id: u64,
    /// Human-readable name.
    pub name: String,
    /// What kind of schema this task generates against.
    pub r#type: TaskType,
    /// The data source to introspect/insert into. Required when `type == Database`.
    #[serde(default)]
    pub data_source: Option<DataSource>,
    /// The table to introspect/insert into. Required when `type == Database`.
    #[serde(default)]
    pub table_name: String,
    /// Raw JSON schema document. Required when `type == Json`.
    #[serde(default)]
    pub json_schema: String,
    /// Column layout for `type == Csv` tasks.
    #[serde(default)]
    pub csv_columns: Vec<ColumnInfo>,
    /// Per-field generation rules, keyed by field path (see the path grammar in the schema
    /// walker docs).
    #[serde(default)]
    pub field_rules: HashMap<String, FieldRule>,
    /// How many records to generate.
    pub count: i64,
    /// Where to send generated records.
    pub output_type: OutputType,
    /// Output file name (sinks normalize the extension); for `Http` this is the legacy fallback
    /// endpoint URL, used when `configuration` carries no `url` of its own.
    #[serde(default)]
    pub output_path: String,
    /// Raw JSON blob `{url, token?, type?}` configuring the `Http` sink. See
    /// [`crate::sinks::HttpSinkConfig::resolve`] for how it combines with `output_path`.
    #[serde(default)]
    pub configuration: Option<String>,
    /// Field paths that must not repeat a value within this run.
    #[serde(default)]
    pub unique_fields: Vec<String>,
    /// Current lifecycle status.
    #[serde(default = "default_pending")]
    pub status: TaskStatus,
    /// Completion percentage, `0.0..=100.0`.
    #[serde(default)]
    pub progress: f64,
    /// Error message set when `status == Failed`.
    #[serde(default)]
    pub error_msg: String,
}

fn default_pending() -> TaskStatus {
    TaskStatus::Pending
}

/// Summary returned after a task finishes running.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskResult {
    /// The task that ran.
    pub task_id: u64,
    /// Number of records actually generated.
    pub generated_count: i64,
    /// Output file path, empty for `Database`/`Http` sinks.
    pub file_path: String,
    /// Wall-clock duration of the run, in milliseconds.
    pub duration_ms: u128,
}
