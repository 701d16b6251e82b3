//! Centralized configuration for the store.
//!
//! Goals:
//! - Single place for tunables instead of scattering env lookups.
//! - StoreConfig::from_env() mirrors every field as an env variable;
//!   builder-style setters cover programmatic use.
//!
//! None of the knobs changes the on-disk format.

use anyhow::{anyhow, Result};

use crate::consts::{MMAP_MIN_WINDOW, PAGE_SIZE};

#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Whether to fsync data and meta on every commit. Turning this off
    /// drops the crash-consistency guarantee; it only makes sense for
    /// tests and throwaway bulk loads.
    /// Env: BURROW_DATA_FSYNC (default true; "0|false|off|no" => false)
    pub data_fsync: bool,

    /// Initial mmap window in bytes; coverage grows by doubling chunks.
    /// Must be a multiple of the page size.
    /// Env: BURROW_MMAP_WINDOW (default 64 MiB)
    pub map_window: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_fsync: true,
            map_window: MMAP_MIN_WINDOW,
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("BURROW_DATA_FSYNC") {
            let s = v.trim().to_ascii_lowercase();
            cfg.data_fsync = !(s == "0" || s == "false" || s == "off" || s == "no");
        }

        if let Ok(v) = std::env::var("BURROW_MMAP_WINDOW") {
            if let Ok(n) = v.trim().parse::<u64>() {
                cfg.map_window = n;
            }
        }

        cfg
    }

    // ----- builder-style setters -----

    pub fn data_fsync(mut self, on: bool) -> Self {
        self.data_fsync = on;
        self
    }

    pub fn map_window(mut self, bytes: u64) -> Self {
        self.map_window = bytes;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.map_window == 0 || self.map_window % PAGE_SIZE as u64 != 0 {
            return Err(anyhow!(
                "map_window must be a non-zero multiple of {}, got {}",
                PAGE_SIZE,
                self.map_window
            ));
        }
        Ok(())
    }
}
