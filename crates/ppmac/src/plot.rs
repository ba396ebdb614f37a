//! Text summaries of gathered data, standing in for plots.

use comfy_table::{ContentArrangement, Table};
use ppmac_gather::{GatherTable, SeriesStats, following_error, rms, servo_time};

use crate::error::CommandError;

fn number(value: f64) -> String {
    format!("{:.6}", value)
}

fn stats_table() -> Table {
    let mut table = Table::new();
    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Series", "Samples", "Min", "Max", "Mean", "RMS"]);
    table
}

fn add_series(table: &mut Table, name: &str, values: &[f64]) {
    match SeriesStats::of(values) {
        Some(stats) => {
            table.add_row(vec![
                name.to_string(),
                stats.samples.to_string(),
                number(stats.min),
                number(stats.max),
                number(stats.mean),
                number(stats.rms),
            ]);
        }
        None => {
            table.add_row(vec![name.to_string(), "0".to_string()]);
        }
    }
}

/// Time span covered by the servo-count column, if gathered.
fn time_span(data: &GatherTable, servo_period: f64) -> Option<f64> {
    let counts = data.column_by_name(ppmac_gather::SERVO_COUNT_ADDRESS).ok()?;
    servo_time(&counts, servo_period).last().copied()
}

/// One row of statistics per selected column.
pub fn summarize(data: &GatherTable, indices: &[usize], servo_period: f64) -> String {
    let mut table = stats_table();
    for &index in indices {
        if let Some(name) = data.addresses.get(index) {
            add_series(&mut table, name, &data.column(index));
        }
    }

    let mut text = table.to_string();
    if let Some(span) = time_span(data, servo_period) {
        text.push_str(&format!("\n{} samples over {:.4} s", data.len(), span));
    }
    text
}

/// Desired and actual position of one motor and the following error.
pub fn tune_summary(data: &GatherTable, motor: u32, servo_period: f64) -> Result<String, CommandError> {
    let desired = data.column_by_name(&format!("Motor[{}].DesPos", motor))?;
    let actual = data.column_by_name(&format!("Motor[{}].ActPos", motor))?;
    let error = following_error(&desired, &actual);

    let mut table = stats_table();
    add_series(&mut table, "Desired", &desired);
    add_series(&mut table, "Actual", &actual);
    add_series(&mut table, "Following error", &error);

    let mut text = format!("Motor {}\n{}", motor, table);
    if let Some(span) = time_span(data, servo_period) {
        text.push_str(&format!("\nDuration: {:.4} s", span));
    }
    text.push_str(&format!("\nRMS following error: {}", number(rms(&error))));
    Ok(text)
}

/// Writes the selected columns, x axis first, to a delimited file.
pub fn export(
    data: &GatherTable,
    indices: &[usize],
    path: &str,
    delimiter: &str,
) -> Result<(), CommandError> {
    let subset = GatherTable {
        addresses: indices
            .iter()
            .filter_map(|&i| data.addresses.get(i).cloned())
            .collect(),
        rows: data
            .rows
            .iter()
            .map(|row| indices.iter().filter_map(|&i| row.get(i).copied()).collect())
            .collect(),
    };
    subset.save(path, delimiter)?;
    Ok(())
}
