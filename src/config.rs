// Thu Feb 5 2026 - Alex

use std::path::PathBuf;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub symbol_dump: Option<PathBuf>,
    pub output_file: PathBuf,
    pub module_base: u64,
    pub vtable_scan_window: usize,
    pub enable_verbose_output: bool,
    pub enable_progress_bars: bool,
    pub fail_on_placeholders: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbol_dump: None,
            output_file: PathBuf::from("symbols.nsdb"),
            module_base: 0,
            vtable_scan_window: 64,
            enable_verbose_output: false,
            enable_progress_bars: true,
            fail_on_placeholders: true,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbol_dump(mut self, dump: PathBuf) -> Self {
        self.symbol_dump = Some(dump);
        self
    }

    pub fn with_output_file(mut self, output: PathBuf) -> Self {
        self.output_file = output;
        self
    }

    pub fn with_module_base(mut self, base: u64) -> Self {
        self.module_base = base;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.symbol_dump.is_none() {
            return Err("symbol_dump must be set".to_string());
        }
        if self.output_file.as_os_str().is_empty() {
            return Err("output_file must not be empty".to_string());
        }
        if self.vtable_scan_window == 0 {
            return Err("vtable_scan_window must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_needs_a_dump() {
        assert!(Config::default().validate().is_err());
        let config = Config::new().with_symbol_dump(PathBuf::from("symbols.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = Config::new()
            .with_symbol_dump(PathBuf::from("symbols.json"))
            .with_output_file(PathBuf::from("out.nsdb"))
            .with_module_base(0x1000);
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.output_file, config.output_file);
        assert_eq!(back.module_base, 0x1000);
    }
}
