use dirs::config_dir;
use log::info;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CreatePolicy {
    /// Ask the user through the editor.
    Ask,
    Always,
    Never,
}

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    #[serde(default = "default_file_name")]
    pub file_name: String,
    #[serde(default = "default_reload_delay_ms")]
    pub reload_delay_ms: u64,
    #[serde(default = "default_idle_delay_ms")]
    pub idle_delay_ms: u64,
    #[serde(default = "default_watch_files")]
    pub watch_files: bool,
    #[serde(default = "default_create_dictionary")]
    pub create_dictionary: CreatePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            file_name: default_file_name(),
            reload_delay_ms: default_reload_delay_ms(),
            idle_delay_ms: default_idle_delay_ms(),
            watch_files: default_watch_files(),
            create_dictionary: default_create_dictionary(),
        }
    }
}

impl Config {
    pub fn reload_delay(&self) -> Duration {
        Duration::from_millis(self.reload_delay_ms)
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    /// Reads the config at `path`, or at [`default_config_path`] when no path
    /// is given. Only an explicitly named file has to exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(p) => (expand_tilde(p).unwrap_or_else(|| p.to_path_buf()), true),
            None => match default_config_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };
        if !required && !path.exists() {
            return Ok(Self::default());
        }
        info!("loading config from {}", path.display());
        Self::from_json(&fs::read_to_string(&path)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }
}

fn default_file_name() -> String {
    "CustomDictionary.xml".to_string()
}

fn default_reload_delay_ms() -> u64 {
    2500
}

fn default_idle_delay_ms() -> u64 {
    500
}

fn default_watch_files() -> bool {
    true
}

fn default_create_dictionary() -> CreatePolicy {
    CreatePolicy::Ask
}

pub fn default_config_path() -> Option<PathBuf> {
    let mut path = config_dir()?;
    path.push("projdict");
    path.push("config.json");
    Some(path)
}

pub fn expand_tilde<P: AsRef<Path>>(path_user_input: P) -> Option<PathBuf> {
    let p = path_user_input.as_ref();
    if !p.starts_with("~") {
        return Some(p.to_path_buf());
    }
    if p == Path::new("~") {
        return dirs::home_dir();
    }
    let rest = p.strip_prefix("~").ok()?;
    dirs::home_dir().map(|mut h| {
        if h == Path::new("/") {
            // Home is the root directory; just drop the tilde.
            h.join(rest)
        } else {
            h.push(rest);
            h
        }
    })
}
