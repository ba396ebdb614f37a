use ppmac_comm::Comm;
use ppmac_config::LogType;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::output::Output;
use crate::session::Session;

/// A polled value, or the reason it could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarValue {
    Value(String),
    Error(String),
}

impl VarValue {
    pub fn is_error(&self) -> bool {
        matches!(self, VarValue::Error(_))
    }
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarValue::Value(value) => f.write_str(value),
            VarValue::Error(message) => write!(f, "Error: {}", message),
        }
    }
}

pub async fn read_values(comm: &Comm, variables: &[String]) -> Vec<VarValue> {
    let mut gpascii = comm.gpascii().await;
    let mut values = Vec::with_capacity(variables.len());
    for variable in variables {
        let value = match gpascii.get_variable(variable).await {
            Ok(value) => VarValue::Value(value),
            Err(e) => VarValue::Error(e.to_string()),
        };
        values.push(value);
    }
    values
}

/// Reads every variable once and writes `var = value` for those that the
/// display function keeps.
pub async fn print_values<F>(comm: &Comm, variables: &[String], output: &Output, mut display: F)
where
    F: FnMut(&str, &VarValue) -> Option<String>,
{
    let values = read_values(comm, variables).await;
    for (variable, value) in variables.iter().zip(&values) {
        if let Some(text) = display(variable, value) {
            output.line(format!("{} = {}", variable, text));
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MonitorOptions {
    pub interval: Duration,
    /// Polls after the initial read; `None` runs until interrupted.
    pub count: Option<u64>,
    pub show_initial: bool,
}

/// Prints the initial values, then each change until interrupted or
/// `count` polls have been made. Changes into an error are not printed.
/// Returns the variables that changed.
pub async fn monitor_variables<F>(
    session: &Session,
    comm: &Comm,
    variables: &[String],
    options: MonitorOptions,
    mut display: F,
) -> BTreeSet<String>
where
    F: FnMut(&str, &VarValue) -> Option<String>,
{
    let output = session.output();
    let mut interrupt = session.interrupt().subscribe();
    let mut changed = BTreeSet::new();

    let mut last: Vec<Option<String>> = read_values(comm, variables)
        .await
        .iter()
        .zip(variables)
        .map(|(value, variable)| display(variable, value))
        .collect();

    if options.show_initial {
        for (variable, value) in variables.iter().zip(&last) {
            if let Some(value) = value {
                output.line(format!("{} = {}", variable, value));
            }
        }
    }

    let mut polls = 0u64;
    loop {
        if options.count.is_some_and(|count| polls >= count) {
            break;
        }

        tokio::select! {
            _ = interrupt.recv() => {
                debug!(log_type = LogType::Console.as_str(), "Monitoring interrupted");
                break;
            }
            _ = tokio::time::sleep(options.interval) => {}
        }
        polls += 1;

        let values = read_values(comm, variables).await;
        for (i, (variable, value)) in variables.iter().zip(&values).enumerate() {
            let shown = display(variable, value);
            let Some(text) = &shown else {
                last[i] = None;
                continue;
            };

            if last[i].as_ref() != Some(text) && !value.is_error() {
                output.line(format!("{} = {}", variable, text));
                changed.insert(variable.clone());
            }
            last[i] = shown;
        }
    }

    changed
}
