use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The baud rate used when none is configured or requested.
pub const DEFAULT_BAUD: u32 = 115_200;

fn default_auto_detect() -> bool {
    true
}

/// The configuration used for running the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// An explicit device path to open at startup.
    /// When unset (or when opening it fails), auto-detection runs instead.
    #[serde(default)]
    pub serial_port: Option<String>,

    /// The baud rate for the startup open.
    /// [`DEFAULT_BAUD`] when unset.
    #[serde(default)]
    pub baud_rate: Option<u32>,

    /// Whether to auto-detect a device at startup.
    #[serde(default = "default_auto_detect")]
    pub auto_detect: bool,

    /// Directory of static frontend assets to serve.
    /// `public` when unset.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial_port: None,
            baud_rate: None,
            auto_detect: true,
            static_dir: None,
        }
    }
}

impl Config {
    fn ron() -> ron::Options {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .with_default_extension(ron::extensions::Extensions::UNWRAP_NEWTYPES)
    }

    /// Deserialize a .ron file's contents.
    /// Panics if the input is not valid .ron.
    pub fn deserialize(input: &str) -> Self {
        Self::ron().from_str::<Config>(input).unwrap()
    }

    /// An example configuration with the fields filled in.
    pub fn example() -> Self {
        Self {
            serial_port: Some("/dev/ttyACM0".into()),
            baud_rate: Some(DEFAULT_BAUD),
            auto_detect: true,
            static_dir: Some("public".into()),
        }
    }

    /// Serialize the configuration in a "pretty" (i.e. non-compact) fashion.
    pub fn serialize_pretty(&self) -> String {
        Self::ron()
            .to_string_pretty(self, ron::ser::PrettyConfig::default())
            .unwrap()
    }

    /// Setup a new configuration from a RON file.
    pub fn new_from_path<P: AsRef<Path>>(p: P) -> Self {
        let s = std::fs::read_to_string(p).unwrap();

        Self::deserialize(&s)
    }

    /// Let `SERIAL_PORT` and `SERIAL_BAUD` override the file contents.
    pub fn apply_env_overrides(&mut self) -> Result<(), Error> {
        self.apply_overrides(
            std::env::var("SERIAL_PORT").ok(),
            std::env::var("SERIAL_BAUD").ok(),
        )
    }

    fn apply_overrides(
        &mut self,
        serial_port: Option<String>,
        baud: Option<String>,
    ) -> Result<(), Error> {
        if let Some(serial_port) = serial_port {
            if !serial_port.is_empty() {
                self.serial_port = Some(serial_port);
            }
        }

        if let Some(baud) = baud {
            let baud = baud.parse::<u32>().map_err(|e| {
                Error::BadConfig(format!("SERIAL_BAUD `{baud}` is not a valid baud rate: {e}"))
            })?;
            self.baud_rate = Some(baud);
        }

        Ok(())
    }

    /// The effective startup baud rate.
    pub fn baud(&self) -> u32 {
        self.baud_rate.unwrap_or(DEFAULT_BAUD)
    }

    /// The effective static assets directory.
    pub fn static_dir(&self) -> PathBuf {
        self.static_dir.clone().unwrap_or_else(|| "public".into())
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.baud_rate == Some(0) {
            return Err(Error::BadConfig(
                "A baud rate of 0 cannot be used. Leave it unset for the default.".into(),
            ));
        }

        Ok(())
    }
}
