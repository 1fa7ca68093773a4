use serde::{Deserialize, Serialize};

/// Library name used when no layer supplies one.
pub const DEFAULT_NAME: &str = "LibNbiot";

/// One source tree and the place it lands under the staging root.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub source: String,
    pub dest: String,
}

impl SourceEntry {
    pub fn new(source: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub name: Option<String>,
    pub config: Option<String>,
    pub staging: Option<String>,
    pub output_dir: Option<String>,
    pub entries: Option<Vec<SourceEntry>>,
    pub compress: Option<bool>,
    pub skip: Option<Vec<String>>,
    pub clean: Option<bool>,
    pub dry: Option<bool>,
}

/// The LibNbiot source trees, all merged into `src` of the staging directory.
pub fn default_entries() -> Vec<SourceEntry> {
    [
        "../../libNbiot/include",
        "../../libNbiot/src",
        "../../libNbiotCore/include",
        "../../libNbiotCore/src",
        "../../external/src/FP",
        "../../external/src/List",
        "../../external/src/StateMachine",
        "../../external/src/paho.mqtt-sn.embedded-c/MQTTSNClient",
        "../../external/src/paho.mqtt-sn.embedded-c/MQTTSNPacket",
    ]
    .into_iter()
    .map(|source| SourceEntry::new(source, "src"))
    .collect()
}

/// Built-in configuration, the lowest-priority layer.
pub fn default_config() -> Config {
    Config {
        name: Some(DEFAULT_NAME.to_string()),
        config: None,
        staging: None,
        output_dir: Some(".".to_string()),
        entries: Some(default_entries()),
        compress: Some(true),
        skip: None,
        clean: Some(false),
        dry: Some(false),
    }
}
