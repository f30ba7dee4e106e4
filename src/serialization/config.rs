use std::{fs::File, io::BufReader, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::DeployError;

/// Optional defaults loaded from a JSON file; command-line flags win.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Config {
    pub user: Option<String>,
    pub port: Option<u16>,
    #[serde(rename = "identityFile")]
    pub identity_file: Option<PathBuf>,
    #[serde(rename = "targetPath")]
    pub target_path: Option<String>,
}

impl Config {
    pub fn read_config<P: AsRef<Path>>(path: P) -> Result<Config, DeployError> {
        let path = path.as_ref();
        let config_error = |reason: String| DeployError::Config {
            path: path.to_path_buf(),
            reason,
        };
        let file = File::open(path).map_err(|e| config_error(e.to_string()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| config_error(e.to_string()))
    }
}
