use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use etl_model::Schema;
use etl_runner::{TaskOutcome, WorkflowReport};

use crate::logging::log_data_enabled;

pub fn print_summary(report: &WorkflowReport) {
    println!("Workflow: {}", report.workflow);
    println!("{}", summary_table(report));
    if report.failures().next().is_some() {
        eprintln!("Failures:");
        eprintln!("{}", failure_table(report));
    }
    print_warnings(report);
    println!(
        "{} succeeded, {} failed, {} skipped",
        report.count("succeeded"),
        report.count("failed"),
        report.count("skipped")
    );
}

/// One row per task, plus a total row.
pub fn summary_table(report: &WorkflowReport) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Task"),
        header_cell("Status"),
        header_cell("Target"),
        header_cell("Records"),
        header_cell("Rows"),
        header_cell("Views"),
        header_cell("Warnings"),
        header_cell("Time (ms)"),
    ]);
    apply_table_style(&mut table);
    for index in 3..8 {
        align_column(&mut table, index, CellAlignment::Right);
    }
    let mut total_records = 0usize;
    let mut total_rows = 0usize;
    let mut total_warnings = 0usize;
    for (name, outcome) in &report.outcomes {
        match outcome {
            TaskOutcome::Succeeded(task) => {
                total_records += task.records;
                total_rows += task.total_rows();
                total_warnings += task.warnings.len();
                table.add_row(vec![
                    Cell::new(name),
                    status_cell(outcome),
                    Cell::new(&task.target),
                    Cell::new(task.records),
                    Cell::new(task.total_rows()),
                    Cell::new(task.views),
                    count_cell(task.warnings.len(), Color::Yellow),
                    Cell::new(task.duration.as_millis()),
                ]);
            }
            TaskOutcome::Failed(_) | TaskOutcome::Skipped { .. } => {
                table.add_row(vec![
                    Cell::new(name),
                    status_cell(outcome),
                    dim_cell("-"),
                    dim_cell("-"),
                    dim_cell("-"),
                    dim_cell("-"),
                    dim_cell("-"),
                    dim_cell("-"),
                ]);
            }
        }
    }
    table.add_row(vec![
        Cell::new("TOTAL")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        dim_cell("-"),
        dim_cell("-"),
        Cell::new(total_records).add_attribute(Attribute::Bold),
        Cell::new(total_rows).add_attribute(Attribute::Bold),
        dim_cell("-"),
        count_cell(total_warnings, Color::Yellow).add_attribute(Attribute::Bold),
        dim_cell("-"),
    ]);
    table
}

pub fn failure_table(report: &WorkflowReport) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Task"),
        header_cell("Kind"),
        header_cell("Table"),
        header_cell("Batch"),
        header_cell("Message"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 3, CellAlignment::Right);
    for failure in report.failures() {
        table.add_row(vec![
            Cell::new(&failure.task),
            Cell::new(failure.kind.as_str()).fg(Color::Red),
            Cell::new(failure.table.as_deref().unwrap_or("-")),
            failure
                .batch
                .map_or_else(|| dim_cell("-"), Cell::new),
            Cell::new(&failure.message),
        ]);
    }
    table
}

/// Warnings name record identifiers, so they are listed only with `--log-data`.
fn print_warnings(report: &WorkflowReport) {
    let warnings: Vec<(&str, &str)> = report
        .outcomes
        .iter()
        .filter_map(|(name, outcome)| match outcome {
            TaskOutcome::Succeeded(task) => Some((name, &task.warnings)),
            _ => None,
        })
        .flat_map(|(name, warnings)| {
            warnings
                .iter()
                .map(move |warning| (name.as_str(), warning.as_str()))
        })
        .collect();
    if warnings.is_empty() {
        return;
    }
    if !log_data_enabled() {
        eprintln!(
            "{} record warnings (pass --log-data to list them)",
            warnings.len()
        );
        return;
    }
    eprintln!("Warnings:");
    for (task, warning) in warnings {
        eprintln!("- {task}: {warning}");
    }
}

/// Indented table tree, children under their parent.
pub fn render_schema(schema: &Schema) -> String {
    let mut out = String::new();
    if let Some(root) = schema.root() {
        render_table(schema, root, 0, &mut out);
    }
    out
}

fn render_table(schema: &Schema, table: &etl_model::Table, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    out.push_str(&format!("{indent}{} [{}]\n", table.name, table.rows_type));
    for field in &table.fields {
        let size = field
            .size
            .map(|size| format!("({size})"))
            .unwrap_or_default();
        let mut line = format!("{indent}  - {} {}{size}", field.name, field.field_type);
        if let Some(reference) = &field.references {
            line.push_str(&format!(" -> {}", reference.table));
        }
        if let Some(lookup) = &field.lookup {
            line.push_str(&format!(" (coded: {})", lookup.source_field));
        }
        out.push_str(&line);
        out.push('\n');
    }
    for child in schema.children(&table.name) {
        render_table(schema, child, depth + 1, out);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn status_cell(outcome: &TaskOutcome) -> Cell {
    let color = match outcome {
        TaskOutcome::Succeeded(_) => Color::Green,
        TaskOutcome::Failed(_) => Color::Red,
        TaskOutcome::Skipped { .. } => Color::Yellow,
    };
    Cell::new(outcome.label()).fg(color)
}

fn count_cell(count: usize, color: Color) -> Cell {
    if count > 0 {
        Cell::new(count).fg(color).add_attribute(Attribute::Bold)
    } else {
        dim_cell(count)
    }
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(140);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}
