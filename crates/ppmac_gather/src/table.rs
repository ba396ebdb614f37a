use ppmac_comm::parse_f64;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::error::GatherError;

/// Gathered samples: one column per address, one row per sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatherTable {
    pub addresses: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl GatherTable {
    /// Keeps rows whose field count matches the address count and whose
    /// fields all parse. Returns the table and the number of rows skipped.
    pub fn parse<S: AsRef<str>>(addresses: Vec<String>, lines: &[S]) -> (Self, usize) {
        let mut rows = Vec::with_capacity(lines.len());
        let mut skipped = 0;

        for line in lines {
            let line = line.as_ref().trim();
            if line.is_empty() {
                continue;
            }

            let row: Option<Vec<f64>> = line.split_whitespace().map(parse_f64).collect();
            match row {
                Some(row) if row.len() == addresses.len() => rows.push(row),
                _ => skipped += 1,
            }
        }

        (Self { addresses, rows }, skipped)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Case-insensitive lookup, with or without the `.a` suffix.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        let name = name.trim().to_ascii_lowercase();
        let with_suffix = format!("{}.a", name);
        self.addresses.iter().position(|address| {
            let address = address.to_ascii_lowercase();
            address == name || address == with_suffix
        })
    }

    pub fn column(&self, index: usize) -> Vec<f64> {
        self.rows
            .iter()
            .filter_map(|row| row.get(index).copied())
            .collect()
    }

    pub fn column_by_name(&self, name: &str) -> Result<Vec<f64>, GatherError> {
        self.index_of(name)
            .map(|index| self.column(index))
            .ok_or_else(|| GatherError::ColumnNotFound(name.to_string()))
    }

    pub fn scale_column(&mut self, index: usize, factor: f64) {
        for row in &mut self.rows {
            if let Some(value) = row.get_mut(index) {
                *value *= factor;
            }
        }
    }

    /// Header row of addresses, then one line per sample.
    pub fn write_delimited<W: Write>(&self, writer: &mut W, delimiter: &str) -> io::Result<()> {
        writeln!(writer, "{}", self.addresses.join(delimiter))?;
        for row in &self.rows {
            let fields: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(writer, "{}", fields.join(delimiter))?;
        }
        writer.flush()
    }

    pub fn save(&self, path: impl AsRef<Path>, delimiter: &str) -> Result<(), GatherError> {
        let path = path.as_ref();
        let io_error = |source| GatherError::Io {
            path: path.display().to_string(),
            source,
        };

        let file = File::create(path).map_err(io_error)?;
        let mut writer = BufWriter::new(file);
        self.write_delimited(&mut writer, delimiter)
            .map_err(io_error)
    }
}

/// Seconds elapsed since the first sample.
pub fn servo_time(counts: &[f64], servo_period: f64) -> Vec<f64> {
    let Some(first) = counts.first() else {
        return Vec::new();
    };
    counts.iter().map(|c| (c - first) * servo_period).collect()
}

pub fn following_error(desired: &[f64], actual: &[f64]) -> Vec<f64> {
    desired.iter().zip(actual).map(|(d, a)| d - a).collect()
}

pub fn rms(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesStats {
    pub samples: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub rms: f64,
}

impl SeriesStats {
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / values.len() as f64;

        Some(Self {
            samples: values.len(),
            min,
            max,
            mean,
            rms: rms(values),
        })
    }
}
