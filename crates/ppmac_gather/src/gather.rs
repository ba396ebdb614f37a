use ppmac_comm::{Comm, Gpascii};
use ppmac_config::{GatherConfig, LogType};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::error::GatherError;
use crate::settings::GatherSettings;
use crate::table::GatherTable;

/// Where gather settings and samples live on the controller.
#[derive(Debug, Clone)]
pub struct GatherFiles {
    pub settings_file: String,
    pub output_file: String,
    pub upload_command: String,
}

impl From<&GatherConfig> for GatherFiles {
    fn from(config: &GatherConfig) -> Self {
        Self {
            settings_file: config.config_file.clone(),
            output_file: config.output_file.clone(),
            upload_command: config.upload_command.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatherRequest {
    pub addresses: Vec<String>,
    pub duration: Duration,
    /// Servo cycles per sample
    pub period: u32,
}

impl GatherRequest {
    pub fn new(addresses: Vec<String>, duration: Duration, period: u32) -> Result<Self, GatherError> {
        if addresses.is_empty() {
            return Err(GatherError::InvalidRequest("no addresses".to_string()));
        }
        if period == 0 {
            return Err(GatherError::InvalidRequest(
                "period must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            addresses,
            duration,
            period,
        })
    }

    /// Samples needed to cover the duration at this period.
    pub fn lines(&self, servo_period: f64) -> u64 {
        let sample_time = servo_period * f64::from(self.period);
        if sample_time <= 0.0 {
            return 0;
        }
        // absorb float noise so exact multiples do not gain a line
        let samples = self.duration.as_secs_f64() / sample_time;
        (samples - 1e-9).ceil().max(0.0) as u64
    }

    pub fn settings(&self, servo_period: f64) -> GatherSettings {
        let mut settings = GatherSettings::default();
        settings
            .values
            .insert("gather.enable".into(), "0".into());
        settings
            .values
            .insert("gather.items".into(), self.addresses.len().to_string());
        settings
            .values
            .insert("gather.period".into(), self.period.to_string());
        settings
            .values
            .insert("gather.maxlines".into(), self.lines(servo_period).to_string());
        settings.addresses = self.addresses.clone();
        settings
    }
}

/// A user-supplied time in seconds. Negative values, NaN and values too
/// large for a `Duration` are rejected.
pub fn duration_from_secs(secs: f64) -> Result<Duration, GatherError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| GatherError::InvalidRequest(format!("invalid duration {} s", secs)))
}

/// Resolves on the next interrupt. A closed channel never fires.
pub(crate) async fn interrupted(interrupt: &mut broadcast::Receiver<()>) {
    loop {
        match interrupt.recv().await {
            Ok(()) | Err(RecvError::Lagged(_)) => return,
            Err(RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

/// `Sys.ServoPeriod` in seconds, or `default` when it cannot be read.
pub async fn servo_period(comm: &Comm, default: f64) -> f64 {
    match comm.gpascii().await.get_f64("Sys.ServoPeriod").await {
        Ok(ms) => ms * 1e-3,
        Err(e) => {
            warn!(
                log_type = LogType::Gather.as_str(),
                "Unable to read Sys.ServoPeriod, using {}: {}", default, e
            );
            default
        }
    }
}

/// Writes the settings file and loads the settings into the gather engine,
/// leaving it disabled.
pub(crate) async fn configure(
    comm: &Comm,
    gpascii: &mut Gpascii,
    request: &GatherRequest,
    files: &GatherFiles,
    servo_period: f64,
) -> Result<GatherSettings, GatherError> {
    let settings = request.settings(servo_period);
    comm.send_file(&files.settings_file, &settings.render()).await?;

    gpascii.set_variable("Gather.Enable", 0).await?;
    gpascii
        .set_variable("Gather.Items", request.addresses.len())
        .await?;
    gpascii.set_variable("Gather.Period", request.period).await?;
    gpascii
        .set_variable("Gather.MaxLines", request.lines(servo_period))
        .await?;
    for (i, address) in request.addresses.iter().enumerate() {
        gpascii
            .set_variable(&format!("Gather.Addr[{}]", i), address)
            .await?;
    }

    debug!(
        log_type = LogType::Gather.as_str(),
        "Gather configured: {} items, period {}, {} lines",
        request.addresses.len(),
        request.period,
        request.lines(servo_period)
    );
    Ok(settings)
}

/// Gathers for `request.duration`. An interrupt stops the gather early
/// and fails with `GatherError::Interrupted`.
pub async fn run_gather(
    comm: &Comm,
    request: &GatherRequest,
    files: &GatherFiles,
    servo_period: f64,
    interrupt: &mut broadcast::Receiver<()>,
) -> Result<GatherTable, GatherError> {
    {
        let mut gpascii = comm.gpascii().await;
        configure(comm, &mut gpascii, request, files, servo_period).await?;
        gpascii.set_variable("Gather.Enable", 2).await?;
    }

    info!(
        log_type = LogType::Gather.as_str(),
        "Gathering for {:.3}s", request.duration.as_secs_f64()
    );
    let was_interrupted = tokio::select! {
        _ = interrupted(interrupt) => true,
        _ = tokio::time::sleep(request.duration) => false,
    };

    comm.gpascii().await.set_variable("Gather.Enable", 0).await?;
    if was_interrupted {
        warn!(log_type = LogType::Gather.as_str(), "Gather interrupted");
        return Err(GatherError::Interrupted);
    }
    get_results(comm, files, None).await
}

pub async fn read_settings(comm: &Comm, path: &str) -> Result<GatherSettings, GatherError> {
    let lines = comm.read_file(path).await?;
    GatherSettings::parse(&lines, path)
}

/// Uploads the most recent gather and parses it using the addresses from
/// the settings file (`settings_file` overrides the configured one).
pub async fn get_results(
    comm: &Comm,
    files: &GatherFiles,
    settings_file: Option<&str>,
) -> Result<GatherTable, GatherError> {
    let settings_file = settings_file.unwrap_or(&files.settings_file);
    let settings = read_settings(comm, settings_file).await?;

    let upload = format!("{} {}", files.upload_command, files.output_file);
    comm.shell_command(&upload, None).await?;

    let lines = comm.read_file(&files.output_file).await?;
    let (table, skipped) = GatherTable::parse(settings.addresses, &lines);
    if skipped > 0 {
        debug!(
            log_type = LogType::Gather.as_str(),
            "Skipped {} malformed gather lines", skipped
        );
    }

    info!(
        log_type = LogType::Gather.as_str(),
        "Read {} samples of {} addresses",
        table.len(),
        table.addresses.len()
    );
    Ok(table)
}
