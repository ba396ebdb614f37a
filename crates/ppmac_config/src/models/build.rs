use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BuildConfig {
    pub dest_path: String,
    /// Loader used by `userphase` to register a phase routine
    pub userphase_command: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            dest_path: "/var/ftp/usrflash".to_string(),
            userphase_command: "/var/ftp/usrflash/userphase".to_string(),
        }
    }
}
