use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CompleterConfig {
    pub enabled: bool,
    /// JSON variable catalog
    pub db_file: String,
}

impl Default for CompleterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_file: "ppmac.json".to_string(),
        }
    }
}
