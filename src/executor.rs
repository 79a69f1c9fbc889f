//! Task execution: validates a task, introspects/pre-fetches what it needs, then generates and
//! writes records in batches.
//!
//! Mirrors the original system's task lifecycle (`pending` → `running` → `completed`/`failed`)
//! and its "launch and return immediately" `execute` endpoint: starting a task spawns background
//! work and hands the caller back control right away, with progress and terminal state visible
//! through the [`crate::store::MetadataStore`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use tokio::sync::Mutex;

use crate::context::RunContext;
use crate::error::Error;
use crate::introspect::DatabaseIntrospector;
use crate::model::{ColumnInfo, OutputType, Task, TaskResult, TaskStatus, TaskType};
use crate::schema;
use crate::sinks::{Batch, CsvFileSink, DatabaseSink, HttpSink, JsonFileSink, Sink, SqlFileSink, TxtFileSink};
use crate::store::MetadataStore;
use crate::value::Value;

/// Batch size used when writing to `output_type`, matching the original system's per-format
/// chunking (database inserts in large batches; JSON/HTTP payloads stay small; CSV splits the
/// difference).
fn batch_size_for(output_type: OutputType) -> usize {
    match output_type {
        OutputType::Database | OutputType::Sql => 10_000,
        OutputType::Csv => 5_000,
        OutputType::Json | OutputType::Txt | OutputType::Http => 1_000,
    }
}

/// Checks a task's configuration for internal consistency before it is allowed to run. Port of
/// the original system's `validateTask`.
pub fn validate_task(task: &Task) -> Result<(), Error> {
    if task.name.trim().is_empty() {
        return Err(Error::Validation("name must not be empty".to_owned()));
    }
    if task.count <= 0 {
        return Err(Error::Validation("count must be positive".to_owned()));
    }
    match task.r#type {
        TaskType::Database => {
            if task.data_source.is_none() {
                return Err(Error::Validation("database task requires a data_source".to_owned()));
            }
            if task.table_name.is_empty() {
                return Err(Error::Validation("database task requires a table_name".to_owned()));
            }
        }
        TaskType::Json => {
            if task.json_schema.trim().is_empty() {
                return Err(Error::Validation("json task requires a json_schema".to_owned()));
            }
            let parsed: serde_json::Value = serde_json::from_str(&task.json_schema)?;
            if !parsed.is_object() {
                return Err(Error::Validation("json_schema must be an object at the top level".to_owned()));
            }
        }
        TaskType::Csv => {
            if task.csv_columns.is_empty() {
                return Err(Error::Validation("csv task requires at least one column".to_owned()));
            }
        }
    }
    match task.output_type {
        OutputType::Database if !matches!(task.r#type, TaskType::Database) => {
            return Err(Error::Validation("database output requires a database task".to_owned()));
        }
        OutputType::Sql | OutputType::Csv if matches!(task.r#type, TaskType::Json) => {
            return Err(Error::Validation("sql/csv output is not supported for json tasks".to_owned()));
        }
        OutputType::Sql | OutputType::Csv | OutputType::Json | OutputType::Txt if task.output_path.is_empty() => {
            return Err(Error::Validation("file output requires an output_path".to_owned()));
        }
        OutputType::Http => {
            crate::sinks::HttpSinkConfig::resolve(task.configuration.as_deref(), &task.output_path)
                .map_err(|e| Error::Validation(e.to_string()))?;
        }
        _ => {}
    }
    Ok(())
}

/// Drives tasks from `pending` through to `completed`/`failed`, keeping track of which task ids
/// are currently running so a second `execute` on the same task is rejected rather than racing.
pub struct TaskExecutor {
    store: Arc<dyn MetadataStore>,
    introspector: Arc<dyn DatabaseIntrospector>,
    generate_dir: std::path::PathBuf,
    max_unique_retries: u32,
    running: Arc<Mutex<HashSet<u64>>>,
}

impl TaskExecutor {
    /// Builds an executor backed by `store` for persistence and `introspector` for schema
    /// discovery, writing file-based sinks under `config.generate_dir`.
    pub fn new(
        store: Arc<dyn MetadataStore>,
        introspector: Arc<dyn DatabaseIntrospector>,
        config: &crate::config::Config,
    ) -> Self {
        Self {
            store,
            introspector,
            generate_dir: config.generate_dir.clone(),
            max_unique_retries: config.max_unique_retries,
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Validates and launches `task_id` in the background, returning as soon as it has been
    /// marked `running`. Rejects the request with [`Error::AlreadyRunning`] if the task is
    /// already executing.
    pub async fn execute(&self, task_id: u64) -> Result<(), Error> {
        {
            let mut running = self.running.lock().await;
            if !running.insert(task_id) {
                return Err(Error::AlreadyRunning(task_id.to_string()));
            }
        }

        let task = match self.store.load_task(task_id).await {
            Ok(task) => task,
            Err(err) => {
                self.running.lock().await.remove(&task_id);
                return Err(err);
            }
        };
        if let Err(err) = validate_task(&task) {
            self.running.lock().await.remove(&task_id);
            return Err(err);
        }

        self.store.update_status(task_id, TaskStatus::Running, "").await?;
        self.store.update_progress(task_id, 0.0).await?;

        let store = self.store.clone();
        let introspector = self.introspector.clone();
        let generate_dir = self.generate_dir.clone();
        let max_unique_retries = self.max_unique_retries;
        let running = self.running.clone();

        tokio::spawn(async move {
            let result = run_task(&store, &introspector, &generate_dir, max_unique_retries, task).await;
            match result {
                Ok(_) => {
                    let _ = store.mark_completed(task_id).await;
                }
                Err(err) => {
                    let _ = store.update_status(task_id, TaskStatus::Failed, &err.to_string()).await;
                }
            }
            running.lock().await.remove(&task_id);
        });

        Ok(())
    }

    /// Generates a single preview record for `task` without writing it anywhere, forcing
    /// `count = 1` regardless of the task's configured count. Port of the original system's
    /// `GeneratePreviewData`.
    pub async fn generate_preview_data(&self, task: &Task) -> Result<serde_json::Value, Error> {
        let mut preview = task.clone();
        preview.count = 1;
        validate_task(&preview)?;

        let mut ctx = RunContext::new();
        ctx.max_unique_retries = self.max_unique_retries;

        let record = match preview.r#type {
            TaskType::Json => {
                let schema_value: serde_json::Value = serde_json::from_str(&preview.json_schema)?;
                schema::generate_json_object(&mut ctx, &schema_value, &preview.field_rules, &preview.unique_fields)?
            }
            TaskType::Csv => {
                schema::generate_record(&mut ctx, &preview.csv_columns, &preview.field_rules, &preview.unique_fields)?
            }
            TaskType::Database => {
                let data_source = preview.data_source.as_ref().expect("validated above");
                let table = self.introspector.get_table_structure(data_source, &preview.table_name).await?;
                schema::generate_record(&mut ctx, &table.columns, &preview.field_rules, &preview.unique_fields)?
            }
        };
        Ok(Value::Map(record).to_json())
    }
}

async fn prefetch_db_lookups(
    introspector: &Arc<dyn DatabaseIntrospector>,
    task: &Task,
) -> Result<Vec<((String, String, String), Vec<Value>)>, Error> {
    let mut seen = HashSet::new();
    let mut fetched = Vec::new();
    for rule in task.field_rules.values() {
        if rule.r#type != "db_lookup" {
            continue;
        }
        let data_source_name = rule.param_str_any(&["dataSourceId", "data_source"]).unwrap_or_default().to_owned();
        let Some(table) = rule.param_str_any(&["tableName", "table"]) else { continue };
        let Some(column) = rule.param_str_any(&["columnName", "column"]) else { continue };
        let key = (data_source_name, table.to_owned(), column.to_owned());
        if !seen.insert(key.clone()) {
            continue;
        }
        let Some(data_source) = task.data_source.as_ref() else { continue };
        let rows = introspector.fetch_column_values(data_source, table, column, 1000).await?;
        fetched.push((key, rows));
    }
    Ok(fetched)
}

async fn run_task(
    store: &Arc<dyn MetadataStore>,
    introspector: &Arc<dyn DatabaseIntrospector>,
    generate_dir: &std::path::Path,
    max_unique_retries: u32,
    task: Task,
) -> Result<TaskResult, Error> {
    let started = Instant::now();

    let table_columns: Option<Vec<ColumnInfo>> = match task.r#type {
        TaskType::Database => {
            let data_source = task.data_source.as_ref().expect("validated by validate_task");
            let table = introspector.get_table_structure(data_source, &task.table_name).await?;
            Some(table.columns)
        }
        TaskType::Csv => Some(task.csv_columns.clone()),
        TaskType::Json => None,
    };

    let schema_value: Option<serde_json::Value> =
        if matches!(task.r#type, TaskType::Json) { Some(serde_json::from_str(&task.json_schema)?) } else { None };

    let column_names: Vec<String> = match (&table_columns, &schema_value) {
        (Some(columns), _) => columns.iter().map(|c| c.name.clone()).collect(),
        (None, Some(serde_json::Value::Object(obj))) => obj.keys().cloned().collect(),
        _ => Vec::new(),
    };

    let lookups = prefetch_db_lookups(introspector, &task).await?;

    let mut sink = build_sink(&task, generate_dir).await?;

    let field_rules = task.field_rules.clone();
    let unique_fields = task.unique_fields.clone();
    let count = task.count.max(0) as u64;
    let output_type = task.output_type;
    let task_type = task.r#type;
    let csv_columns = task.csv_columns.clone();

    let store_for_blocking = store.clone();
    let task_id = task.id;

    let outcome = tokio::task::spawn_blocking(move || -> Result<u64, Error> {
        let mut ctx = RunContext::new();
        ctx.max_unique_retries = max_unique_retries;
        for (key, rows) in lookups {
            ctx.db_lookup_cached(&key.0, &key.1, &key.2, || rows);
        }

        let batch_size = batch_size_for(output_type);
        let mut generated: u64 = 0;
        let mut last_reported_percent = -1i64;

        while generated < count {
            let remaining = count - generated;
            let this_batch = remaining.min(batch_size as u64) as usize;
            let mut rows: Vec<IndexMap<String, Value>> = Vec::with_capacity(this_batch);
            for _ in 0..this_batch {
                let row = match task_type {
                    TaskType::Database => {
                        schema::generate_record(&mut ctx, table_columns.as_deref().unwrap(), &field_rules, &unique_fields)?
                    }
                    TaskType::Csv => schema::generate_record(&mut ctx, &csv_columns, &field_rules, &unique_fields)?,
                    TaskType::Json => schema::generate_json_object(
                        &mut ctx,
                        schema_value.as_ref().expect("json schema parsed above"),
                        &field_rules,
                        &unique_fields,
                    )?,
                };
                rows.push(row);
            }

            let is_first_batch = generated == 0;
            generated += this_batch as u64;
            let is_final_batch = generated == count;

            let batch = Batch { columns: &column_names, rows: &rows, is_first_batch, is_final_batch };
            sink.write_batch(&batch)?;

            let percent = ((generated as f64 / count.max(1) as f64) * 100.0).round() as i64;
            if percent != last_reported_percent {
                last_reported_percent = percent;
                let _ = tokio::runtime::Handle::current().block_on(store_for_blocking.update_progress(task_id, percent as f64));
            }
        }

        Ok(generated)
    })
    .await
    .map_err(|e| Error::generation(task.name.clone(), format!("generation task panicked: {e}")))?;

    let generated_count = outcome?;
    Ok(TaskResult {
        task_id: task.id,
        generated_count: generated_count as i64,
        file_path: if matches!(task.output_type, OutputType::Database | OutputType::Http) {
            String::new()
        } else {
            task.output_path.clone()
        },
        duration_ms: started.elapsed().as_millis(),
    })
}

async fn build_sink(task: &Task, generate_dir: &std::path::Path) -> Result<Box<dyn Sink>, Error> {
    match task.output_type {
        OutputType::Database => {
            let data_source =
                task.data_source.as_ref().ok_or_else(|| Error::Validation("database output requires a data_source".to_owned()))?;
            let sink = DatabaseSink::connect(data_source, task.table_name.clone()).await?;
            Ok(Box::new(sink))
        }
        OutputType::Sql => Ok(Box::new(SqlFileSink::new(generate_dir, &task.output_path, task.table_name.clone()))),
        OutputType::Json => Ok(Box::new(JsonFileSink::new(generate_dir, &task.output_path))),
        OutputType::Txt => Ok(Box::new(TxtFileSink::new(generate_dir, &task.output_path))),
        OutputType::Csv => Ok(Box::new(CsvFileSink::new(generate_dir, &task.output_path))),
        OutputType::Http => {
            let config = crate::sinks::HttpSinkConfig::resolve(task.configuration.as_deref(), &task.output_path)?;
            Ok(Box::new(HttpSink::new(config)))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::introspect::StaticIntrospector;
    use crate::model::FieldRule;
    use crate::store::InMemoryMetadataStore;

    fn json_task(id: u64, schema: &str, output_path: &str) -> Task {
        Task {
            id,
            name: "preview".to_owned(),
            r#type: TaskType::Json,
            data_source: None,
            table_name: String::new(),
            json_schema: schema.to_owned(),
            csv_columns: Vec::new(),
            field_rules: HashMap::new(),
            count: 10,
            output_type: OutputType::Json,
            output_path: output_path.to_owned(),
            configuration: None,
            unique_fields: Vec::new(),
            status: TaskStatus::Pending,
            progress: 0.0,
            error_msg: String::new(),
        }
    }

    #[test]
    fn validate_rejects_non_positive_count() {
        let mut task = json_task(1, "{\"a\":1}", "out");
        task.count = 0;
        assert!(validate_task(&task).is_err());
    }

    #[test]
    fn validate_rejects_empty_name() {
        let mut task = json_task(1, "{\"a\":1}", "out");
        task.name = String::new();
        assert!(validate_task(&task).is_err());
    }

    #[test]
    fn validate_rejects_csv_output_for_json_task() {
        let mut task = json_task(1, "{\"a\":1}", "out");
        task.output_type = OutputType::Csv;
        assert!(validate_task(&task).is_err());
    }

    #[test]
    fn validate_rejects_malformed_json_schema() {
        let task = json_task(1, "not json", "out");
        assert!(validate_task(&task).is_err());
    }

    #[test]
    fn validate_accepts_well_formed_json_task() {
        let task = json_task(1, "{\"a\":1}", "out");
        assert!(validate_task(&task).is_ok());
    }

    #[tokio::test]
    async fn preview_forces_count_to_one() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let introspector: Arc<dyn DatabaseIntrospector> = Arc::new(StaticIntrospector::from_columns("t", &[]));
        let config = crate::config::Config::default();
        let executor = TaskExecutor::new(store, introspector, &config);

        let mut task = json_task(1, "{\"name\": \"x\"}", "out");
        task.count = 5000;
        let preview = executor.generate_preview_data(&task).await.unwrap();
        assert!(preview.is_object());
        assert!(preview.get("name").is_some());
    }

    #[tokio::test]
    async fn execute_rejects_second_launch_while_running() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
        store.save_task(json_task(7, "{\"name\": \"x\"}", "out")).await.unwrap();
        let introspector: Arc<dyn DatabaseIntrospector> = Arc::new(StaticIntrospector::from_columns("t", &[]));
        let config = crate::config::Config::default();
        let executor = TaskExecutor::new(store, introspector, &config);

        // Manually mark the task as already running to test the rejection path without
        // depending on scheduling order of the spawned task.
        {
            let mut running = executor.running.lock().await;
            running.insert(7);
        }
        let err = executor.execute(7).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyRunning(_)));
    }

    #[test]
    fn field_rule_type_strings_are_recognized_by_validate() {
        let mut task = json_task(1, "{\"a\":1}", "out");
        task.field_rules.insert("a".to_owned(), FieldRule::random());
        assert!(validate_task(&task).is_ok());
    }
}
