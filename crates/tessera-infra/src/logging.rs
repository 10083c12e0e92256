// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Logging bootstrap on top of `env_logger`.

use env_logger::{Builder, Env};
use log::LevelFilter;

/// Options for [`init_logging`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set.
    pub default_filter: String,
    /// Per-module overrides, applied on top of the default filter.
    pub module_filters: Vec<(String, LevelFilter)>,
    /// Route output through the test harness capture.
    pub is_test: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            module_filters: Vec::new(),
            is_test: false,
        }
    }
}

impl LoggingConfig {
    /// Adds a per-module level override.
    pub fn with_module(mut self, module: impl Into<String>, level: LevelFilter) -> Self {
        self.module_filters.push((module.into(), level));
        self
    }
}

/// Installs the global logger.
///
/// `RUST_LOG` wins over `config.default_filter` when set. Calling this more
/// than once is harmless: later calls leave the installed logger alone and
/// return `false`.
pub fn init_logging(config: LoggingConfig) -> bool {
    let mut builder = Builder::from_env(Env::default().default_filter_or(config.default_filter.as_str()));
    for (module, level) in &config.module_filters {
        builder.filter_module(module, *level);
    }
    builder.is_test(config.is_test);
    match builder.try_init() {
        Ok(()) => {
            log::debug!("Logging initialized (default filter '{}').", config.default_filter);
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_a_no_op() {
        let config = LoggingConfig {
            is_test: true,
            ..Default::default()
        }
        .with_module("tessera_core::renderer::state", LevelFilter::Warn);
        init_logging(config.clone());
        assert!(!init_logging(config));
    }

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.default_filter, "info");
        assert!(config.module_filters.is_empty());
    }
}
