//! Console command implementations.

mod build;
mod catalog;
mod connection;
mod gather;
mod monitor;
mod program;
mod servo;
mod tune;
mod variables;

pub use build::{UserPhaseCommand, UtilBuildCommand};
pub use catalog::{CompleteCommand, SearchCommand};
pub use connection::{ConfigCommand, ConnectCommand};
pub use gather::{
    GatherCommand, GatherConfigCommand, GatherPlotCommand, GatherSaveCommand, TunePlotCommand,
};
pub use monitor::{MonitorCommand, MonitorcCommand, StatusCommand, StatusKind};
pub use program::{ProgRunCommand, ProgSendCommand};
pub use servo::{EncFilterCommand, ServoCommand, ServoCopyCommand, WpKeyCommand};
pub use tune::{ScriptTuneCommand, TrajectoryCommand, TuneRangeCommand};
pub use variables::{
    GetVarCommand, GpasciiCommand, MotorsCommand, SetVarCommand, ShellCmdCommand, VCommand,
};

use ppmac_comm::Gpascii;
use ppmac_config::LogType;
use ppmac_gather::TrajectoryKind;
use std::sync::Arc;
use tracing::warn;

use crate::cli::command::Command;
use crate::session::Session;

/// Ends a dedicated gpascii channel once a command is done with it.
async fn close_channel(gpascii: Gpascii) {
    if let Err(e) = gpascii.close().await {
        warn!(
            log_type = LogType::Console.as_str(),
            "Unable to close gpascii channel: {}", e
        );
    }
}

pub fn get_all_commands(session: Arc<Session>) -> Vec<Arc<dyn Command>> {
    vec![
        Arc::new(ConnectCommand::new(session.clone())),
        Arc::new(ConfigCommand::new(session.clone())),
        Arc::new(GpasciiCommand::new(session.clone())),
        Arc::new(GetVarCommand::new(session.clone())),
        Arc::new(SetVarCommand::new(session.clone())),
        Arc::new(VCommand::new(session.clone())),
        Arc::new(ShellCmdCommand::new(session.clone())),
        Arc::new(MotorsCommand::new(session.clone())),
        Arc::new(GatherCommand::new(session.clone())),
        Arc::new(GatherSaveCommand::new(session.clone())),
        Arc::new(GatherConfigCommand::new(session.clone())),
        Arc::new(GatherPlotCommand::new(session.clone())),
        Arc::new(TunePlotCommand::new(session.clone())),
        Arc::new(ScriptTuneCommand::ramp(session.clone())),
        Arc::new(ScriptTuneCommand::pyramid(session.clone())),
        Arc::new(TuneRangeCommand::new(session.clone())),
        Arc::new(TrajectoryCommand::new(session.clone(), TrajectoryKind::Ramp)),
        Arc::new(TrajectoryCommand::new(session.clone(), TrajectoryKind::Trapezoid)),
        Arc::new(TrajectoryCommand::new(session.clone(), TrajectoryKind::SCurve)),
        Arc::new(ServoCommand::new(session.clone())),
        Arc::new(ServoCopyCommand::new(session.clone())),
        Arc::new(EncFilterCommand::new(session.clone())),
        Arc::new(WpKeyCommand::new(session.clone())),
        Arc::new(SearchCommand::new(session.clone())),
        Arc::new(CompleteCommand::new(session.clone())),
        Arc::new(UtilBuildCommand::new(session.clone())),
        Arc::new(UserPhaseCommand::new(session.clone())),
        Arc::new(ProgRunCommand::new(session.clone())),
        Arc::new(ProgSendCommand::new(session.clone())),
        Arc::new(MonitorCommand::new(session.clone())),
        Arc::new(MonitorcCommand::new(session.clone())),
        Arc::new(StatusCommand::new(session.clone(), StatusKind::Motor)),
        Arc::new(StatusCommand::new(session, StatusKind::Coord)),
    ]
}
