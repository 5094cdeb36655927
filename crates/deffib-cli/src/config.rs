use deffib_dispatch::DEVICE_NAME;
use deffib_pin::PinMode;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    /// Registry name the dispatcher is published under.
    pub device: String,
    /// Region size override. `None` uses the host page size.
    pub region_size: Option<usize>,
    pub yield_between_steps: bool,
    pub pin_mode: PinMode,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            device: DEVICE_NAME.to_owned(),
            region_size: None,
            yield_between_steps: true,
            pin_mode: PinMode::default(),
        }
    }
}

impl CliConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(device) = lookup("DEFFIB_DEVICE") {
            let device = device.trim();
            if device.is_empty() {
                return Err(ConfigError::InvalidEnv("DEFFIB_DEVICE"));
            }
            cfg.device = device.to_owned();
        }

        if let Some(raw) = lookup("DEFFIB_REGION_SIZE") {
            let size = raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|size| size.is_power_of_two())
                .ok_or(ConfigError::InvalidEnv("DEFFIB_REGION_SIZE"))?;
            cfg.region_size = Some(size);
        }

        if let Some(raw) = lookup("DEFFIB_NO_YIELD") {
            let no_yield = parse_flag(&raw).ok_or(ConfigError::InvalidEnv("DEFFIB_NO_YIELD"))?;
            cfg.yield_between_steps = !no_yield;
        }

        if let Some(raw) = lookup("DEFFIB_PIN_MODE") {
            cfg.pin_mode = raw
                .parse()
                .map_err(|_| ConfigError::InvalidEnv("DEFFIB_PIN_MODE"))?;
        }

        Ok(cfg)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for env var {0}")]
    InvalidEnv(&'static str),
}
