//! Buffered data gathering on the controller and the servo tuning moves
//! built on top of it.

pub mod error;
pub mod gather;
pub mod settings;
pub mod table;
pub mod tune;

pub use error::GatherError;
pub use gather::{
    GatherFiles, GatherRequest, duration_from_secs, get_results, read_settings, run_gather,
    servo_period,
};
pub use settings::GatherSettings;
pub use table::{GatherTable, SeriesStats, following_error, rms, servo_time};
pub use tune::{
    OnTimeout, ProgramGather, ProgramRun, TrajectoryKind, TrajectoryMove, TuneParams,
    TuneRangeResult, TuneResult, TuneScript, custom_tune, range_values, run_program_gather,
    run_tune_program, tune_range,
};

pub const SERVO_COUNT_ADDRESS: &str = "Sys.ServoCount.a";

/// Gather addresses refer to the address of an element, marked by `.a`.
pub fn address_of(variable: &str) -> String {
    if variable.to_ascii_lowercase().ends_with(".a") {
        variable.to_string()
    } else {
        format!("{}.a", variable)
    }
}
