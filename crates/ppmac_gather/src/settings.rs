use std::collections::BTreeMap;

use crate::error::GatherError;

const ADDR_KEY: &str = "gather.addr";

/// Contents of the gather settings file: `key=value` lines with
/// lowercased keys, plus the `gather.addr[N]` entries in index order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatherSettings {
    pub values: BTreeMap<String, String>,
    pub addresses: Vec<String>,
}

impl GatherSettings {
    /// Parses a settings file. `source` names the file in errors.
    pub fn parse<S: AsRef<str>>(lines: &[S], source: &str) -> Result<Self, GatherError> {
        let mut settings = GatherSettings::default();
        let mut indexed = BTreeMap::new();

        for line in lines {
            let line = line.as_ref().trim();
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };

            let key = key.trim().to_ascii_lowercase();
            let value = value.trim().to_string();

            match address_index(&key) {
                Some(index) => {
                    indexed.insert(index, value);
                }
                None => {
                    settings.values.insert(key, value);
                }
            }
        }

        if indexed.is_empty() {
            return Err(GatherError::MissingAddresses(source.to_string()));
        }

        settings.addresses = indexed.into_values().collect();
        Ok(settings)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn render(&self) -> String {
        let mut text = String::new();
        for (key, value) in &self.values {
            text.push_str(&format!("{}={}\n", key, value));
        }
        for (i, address) in self.addresses.iter().enumerate() {
            text.push_str(&format!("{}[{}]={}\n", ADDR_KEY, i, address));
        }
        text
    }
}

fn address_index(key: &str) -> Option<usize> {
    key.strip_prefix(ADDR_KEY)?
        .strip_prefix('[')?
        .strip_suffix(']')?
        .trim()
        .parse()
        .ok()
}
