//! Runtime settings.
//!
//! Built-in defaults are overridden by an optional TOML file, which is in turn
//! overridden by `NVIZ__*` environment variables
//! (e.g. `NVIZ__SERVE__PORT=9000`).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Result, frames::ChannelMap, metadata::Compression};

/// A filename code and the channel name it stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEntry {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeSettings {
    pub host: String,
    pub port: u16,
    /// How long the file server stays up, in seconds.
    pub duration_secs: u64,
}

impl Default for ServeSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8005,
            duration_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Stored as a list rather than a table so codes like `TRANS` keep their case.
    pub channels: Vec<ChannelEntry>,
    /// Number of z-slices per Zarr chunk.
    pub chunk_z: u64,
    pub compression: Compression,
    pub serve: ServeSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let channels = [
            ("405", "Hoechst 33342"),
            ("488", "Concanavalin A"),
            ("555", "WGA+ Phalloidin"),
            ("640", "Mitotracker Deep Red"),
            ("TRANS", "Bright Field"),
        ]
        .into_iter()
        .map(|(code, name)| ChannelEntry {
            code: code.into(),
            name: name.into(),
        })
        .collect();
        Self {
            channels,
            chunk_z: 1,
            compression: Compression::default(),
            serve: ServeSettings::default(),
        }
    }
}

impl Settings {
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Settings::default())?;
        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = file {
            log::debug!("loading settings from {}", path.display());
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("NVIZ")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn channel_map(&self) -> ChannelMap {
        self.channels
            .iter()
            .map(|c| (c.code.clone(), c.name.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_without_file() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.serve.port, 8005);
        assert_eq!(settings.chunk_z, 1);
        assert_eq!(
            settings.channel_map().get("TRANS").map(String::as_str),
            Some("Bright Field")
        );
    }

    #[test]
    fn file_overrides() {
        let mut f = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            f,
            r#"
chunk_z = 5

[[channels]]
code = "111"
name = "Channel A"

[compression]
type = "gzip"
level = 3

[serve]
port = 9001
"#
        )
        .unwrap();
        let settings = Settings::load(Some(f.path())).unwrap();
        assert_eq!(settings.chunk_z, 5);
        assert_eq!(settings.serve.port, 9001);
        assert_eq!(settings.serve.duration_secs, 600);
        assert_eq!(settings.compression, Compression::Gzip { level: 3 });
        assert_eq!(settings.channels.len(), 1);
        assert_eq!(settings.channels[0].name, "Channel A");
    }
}
