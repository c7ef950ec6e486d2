use serde::Deserialize;
use std::{env, fs, path::PathBuf, time::Duration};

#[derive(Debug, Default, Deserialize, Clone)]
pub struct HostConfig {
    pub probe: Option<String>,             // e.g. "0483:374b:<serial>" or "0483:374b"
    pub chip: Option<String>,              // e.g. "STM32G431CBTx"
    pub elf: Option<String>,               // path to device ELF with .defmt
    pub stream_defmt: Option<bool>,        // default: true
    pub stream_ergot: Option<bool>,        // default: true
    pub status_interval_ms: Option<u64>,   // default: 2000, 0 disables polling
}

impl HostConfig {
    pub fn load_default() -> Option<Self> {
        // Priority: OXIHALL_HOST_CONFIG env var, then ./oxihall-host.toml if exists
        if let Ok(p) = env::var("OXIHALL_HOST_CONFIG") {
            return Self::from_path(PathBuf::from(p));
        }
        let cwd = env::current_dir().ok()?;
        let p = cwd.join("oxihall-host.toml");
        if p.exists() { return Self::from_path(p); }
        None
    }

    fn from_path(path: PathBuf) -> Option<Self> {
        match fs::read_to_string(&path) {
            Ok(s) => match Self::parse(&s) {
                Ok(cfg) => Some(cfg),
                Err(e) => {
                    eprintln!("Failed to parse config (TOML) {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                eprintln!("Failed to read config {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn parse(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str::<HostConfig>(s)
    }

    pub fn stream_defmt(&self) -> bool { self.stream_defmt.unwrap_or(true) }
    pub fn stream_ergot(&self) -> bool { self.stream_ergot.unwrap_or(true) }

    /// `None` when status polling is disabled
    pub fn status_interval(&self) -> Option<Duration> {
        match self.status_interval_ms.unwrap_or(2000) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}
