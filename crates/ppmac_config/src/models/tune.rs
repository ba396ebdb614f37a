use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TuneConfig {
    /// Directory searched for tuning scripts before the built-in ones
    pub script_dir: Option<String>,
    pub coord_sys: u32,
    pub program: u32,
    pub other_trajectory_command: String,
}

impl Default for TuneConfig {
    fn default() -> Self {
        Self {
            script_dir: None,
            coord_sys: 0,
            program: 999,
            other_trajectory_command: "/opt/ppmac/tune/othertrajectory".to_string(),
        }
    }
}
