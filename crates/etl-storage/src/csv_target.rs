//! CSV target: one file per table in an output directory.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use etl_model::{EtlError, LookupTable, Result, Row, Table};
use tracing::{debug, info};

use crate::StorageDriver;
use crate::target::{BatchCounter, TargetOptions};

fn io_error(path: &Path, error: &std::io::Error) -> EtlError {
    EtlError::database(format!("{}: {error}", path.display()))
}

fn csv_error(path: &Path, error: &csv::Error) -> EtlError {
    EtlError::database(format!("{}: {error}", path.display()))
}

/// Writes `<table>.csv` with a header row, and `<table><suffix>.csv` with
/// coded values replaced by their labels.
pub struct CsvDriver {
    dir: PathBuf,
    options: TargetOptions,
    batches: BatchCounter,
}

impl CsvDriver {
    pub fn open(dir: &Path, options: TargetOptions) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|error| io_error(dir, &error))?;
        info!(dir = %dir.display(), "writing csv tables");
        Ok(Self {
            dir: dir.to_path_buf(),
            options,
            batches: BatchCounter::default(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.csv"))
    }

    pub fn view_path(&self, table: &str) -> PathBuf {
        self.table_path(&self.options.label_view_name(table))
    }

    fn append(&self, table: &Table, rows: &[Row]) -> Result<()> {
        let path = self.table_path(&table.name);
        if !path.exists() {
            return Err(EtlError::database("no such table").with_table(&table.name));
        }
        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|error| io_error(&path, &error))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        for row in rows {
            writer
                .write_record(&row.values)
                .map_err(|error| csv_error(&path, &error))?;
        }
        writer.flush().map_err(|error| io_error(&path, &error))
    }
}

impl StorageDriver for CsvDriver {
    fn name(&self) -> &str {
        "csv"
    }

    fn create_table(&mut self, table: &Table, if_not_exists: bool) -> Result<()> {
        let path = self.table_path(&table.name);
        if path.exists() {
            if if_not_exists {
                return Ok(());
            }
            return Err(EtlError::table_exists(&table.name));
        }
        let mut writer = csv::Writer::from_path(&path).map_err(|error| csv_error(&path, &error))?;
        writer
            .write_record(table.field_names())
            .map_err(|error| csv_error(&path, &error))?;
        writer.flush().map_err(|error| io_error(&path, &error))?;
        info!(table = %table.name, path = %path.display(), "created table");
        Ok(())
    }

    fn drop_table(&mut self, table: &Table, if_exists: bool) -> Result<()> {
        let path = self.table_path(&table.name);
        if !path.exists() {
            if if_exists {
                return Ok(());
            }
            return Err(EtlError::database("no such table").with_table(&table.name));
        }
        fs::remove_file(&path).map_err(|error| io_error(&path, &error))?;
        let view = self.view_path(&table.name);
        if view.exists() {
            fs::remove_file(&view).map_err(|error| io_error(&view, &error))?;
        }
        debug!(table = %table.name, "dropped table");
        Ok(())
    }

    fn store_rows(&mut self, table: &Table, rows: &mut Vec<Row>) -> Result<usize> {
        let batch_size = self.options.rows_per_batch();
        let mut stored = 0;
        while !rows.is_empty() {
            let take = rows.len().min(batch_size);
            let batch = self.batches.next(&table.name);
            self.append(table, &rows[..take])
                .map_err(|error| error.with_table(&table.name).with_batch(batch))?;
            rows.drain(..take);
            stored += take;
            debug!(table = %table.name, batch, rows = take, "stored batch");
        }
        Ok(stored)
    }

    fn insert_row(&mut self, table: &Table, row: &Row) -> Result<()> {
        self.append(table, std::slice::from_ref(row))
    }

    fn replace_lookup_view(&mut self, table: &Table, lookup: &LookupTable) -> Result<()> {
        if !lookup.has_table(&table.name) {
            return Ok(());
        }
        let source = self.table_path(&table.name);
        let mut reader = csv::Reader::from_path(&source)
            .map_err(|error| csv_error(&source, &error).with_table(&table.name))?;
        let target = self.view_path(&table.name);
        let mut writer =
            csv::Writer::from_path(&target).map_err(|error| csv_error(&target, &error))?;
        writer
            .write_record(table.field_names())
            .map_err(|error| csv_error(&target, &error))?;
        for record in reader.records() {
            let record = record.map_err(|error| csv_error(&source, &error))?;
            let labelled = table.fields.iter().zip(record.iter()).map(|(field, value)| {
                match lookup.get(&table.name, &field.name) {
                    None => value,
                    Some(_) => lookup.label(&table.name, &field.name, value).unwrap_or(""),
                }
            });
            writer
                .write_record(labelled)
                .map_err(|error| csv_error(&target, &error))?;
        }
        writer.flush().map_err(|error| io_error(&target, &error))?;
        info!(table = %table.name, path = %target.display(), "replaced label view");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
