use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GatherConfig {
    /// Settings file on the controller
    pub config_file: String,
    /// Where the upload command writes the sample table
    pub output_file: String,
    /// Used when the controller cannot be asked for `Sys.ServoPeriod` (seconds)
    pub default_servo_period: f64,
    /// Remote command that dumps the gather buffer; the output file is appended
    pub upload_command: String,
}

impl Default for GatherConfig {
    fn default() -> Self {
        Self {
            config_file: "/var/ftp/gather/GatherSetting.txt".to_string(),
            output_file: "/var/ftp/gather/GatherFile.txt".to_string(),
            default_servo_period: 0.442673749446657994 * 1e-3,
            upload_command: "gather -u".to_string(),
        }
    }
}
