// Copyright (c) The concurrent-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{ConcurrentSettings, ExecutionConfig, WorkerCount};
use crate::errors::{
    ConfigParseError, ConfigReadError, ExecutionConfigError, ProfileNotFound,
};
use camino::Utf8Path;
use config::{Config, ConfigBuilder, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{collections::BTreeMap, time::Duration};
use tracing::debug;

/// Overall configuration for concurrent-runner.
///
/// Most settings are managed through [profiles](RunnerProfile), obtained through the
/// [`profile`](Self::profile) method.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    inner: RunnerConfigDeserialize,
}

impl RunnerConfig {
    /// The location of the user config, relative to the workspace root.
    pub const CONFIG_PATH: &'static str = ".config/concurrent-runner.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Custom configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// The name of the default profile.
    pub const DEFAULT_PROFILE: &'static str = "default";

    /// Reads the config from the given file, or if not present from
    /// `.config/concurrent-runner.toml` in the given directory.
    ///
    /// If the file isn't specified and the directory doesn't have the config file, uses the
    /// default config options.
    pub fn from_sources(
        config_file: Option<&Utf8Path>,
        workspace_root: &Utf8Path,
    ) -> Result<Self, ConfigReadError> {
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let file = workspace_root.join(Self::CONFIG_PATH);
                let source = File::new(file.as_str(), FileFormat::Toml).required(false);
                (file, source)
            }
        };

        debug!("reading concurrent-runner config from `{config_file}`");
        let builder = Self::make_default_config().add_source(source);
        let inner = Self::build_and_deserialize_config(&config_file, builder)?;
        Self::from_inner(inner)
    }

    /// Returns the profile with the given name, the default profile if not specified, or an error
    /// if a profile was specified but not found.
    pub fn profile(&self, name: Option<&str>) -> Result<RunnerProfile<'_>, ProfileNotFound> {
        let name = name.unwrap_or(self.inner.default_profile.as_str());
        self.make_profile(name)
    }

    /// Returns the names of all known profiles.
    pub fn profile_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.inner.profiles.keys().map(String::as_str)
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        config_file: &Utf8Path,
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<RunnerConfigDeserialize, ConfigParseError> {
        builder
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|err| ConfigParseError::new(config_file.to_owned(), err))
    }

    fn from_inner(inner: RunnerConfigDeserialize) -> Result<Self, ConfigReadError> {
        let this = Self { inner };
        // The default profile must exist.
        this.make_profile(&this.inner.default_profile)
            .map_err(ConfigReadError::DefaultProfile)?;
        Ok(this)
    }

    fn make_profile(&self, name: &str) -> Result<RunnerProfile<'_>, ProfileNotFound> {
        let (name, custom_profile) = self
            .inner
            .profiles
            .get_key_value(name)
            .ok_or_else(|| ProfileNotFound::new(name, self.inner.profiles.keys()))?;
        Ok(RunnerProfile {
            name,
            custom_profile,
            default_profile: self.inner.profiles.get(Self::DEFAULT_PROFILE),
        })
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let inner = Self::make_default_config()
            .build()
            .and_then(|config| config.try_deserialize())
            .expect("default config should be valid");
        Self { inner }
    }
}

/// A named profile: defaults for every concurrent test operation.
///
/// Keys that a custom profile doesn't set fall back to `[profile.default]`, then to the
/// built-in defaults.
#[derive(Clone, Copy, Debug)]
pub struct RunnerProfile<'cfg> {
    name: &'cfg str,
    custom_profile: &'cfg ProfileDeserialize,
    default_profile: Option<&'cfg ProfileDeserialize>,
}

impl RunnerProfile<'_> {
    /// Returns the name of the profile.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Returns the number of workers per batch.
    pub fn worker_count(&self) -> WorkerCount {
        self.lookup(|profile| profile.worker_count)
            .unwrap_or(WorkerCount::Count(ExecutionConfig::DEFAULT_WORKER_COUNT))
    }

    /// Returns the total number of invocations per batch.
    pub fn execution_count(&self) -> usize {
        self.lookup(|profile| profile.execution_count)
            .unwrap_or(ExecutionConfig::DEFAULT_EXECUTION_COUNT)
    }

    /// Returns the batch timeout. Zero means unbounded.
    pub fn timeout(&self) -> Duration {
        self.lookup(|profile| profile.timeout).unwrap_or_default()
    }

    /// Returns the maximum random delay before each invocation.
    pub fn max_random_delay(&self) -> Duration {
        self.lookup(|profile| profile.max_random_delay)
            .unwrap_or_default()
    }

    /// Layers the settings declared on a test operation over this profile.
    pub fn resolve(
        &self,
        settings: &ConcurrentSettings,
    ) -> Result<ExecutionConfig, ExecutionConfigError> {
        let worker_count = settings
            .workers
            .unwrap_or_else(|| self.worker_count().compute());
        let execution_count = settings
            .executions
            .unwrap_or_else(|| self.execution_count());
        let config = ExecutionConfig::new(worker_count, execution_count)?
            .with_timeout(settings.timeout.unwrap_or_else(|| self.timeout()))
            .with_max_random_delay(
                settings
                    .random_delay
                    .unwrap_or_else(|| self.max_random_delay()),
            );
        Ok(config)
    }

    fn lookup<T>(&self, f: impl Fn(&ProfileDeserialize) -> Option<T>) -> Option<T> {
        f(self.custom_profile).or_else(|| self.default_profile.and_then(&f))
    }
}

// This is the form of `RunnerConfig` that gets deserialized.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RunnerConfigDeserialize {
    #[serde(default = "default_profile_name")]
    default_profile: String,

    #[serde(rename = "profile", default)]
    profiles: BTreeMap<String, ProfileDeserialize>,
}

fn default_profile_name() -> String {
    RunnerConfig::DEFAULT_PROFILE.to_owned()
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ProfileDeserialize {
    #[serde(default)]
    worker_count: Option<WorkerCount>,
    #[serde(default)]
    execution_count: Option<usize>,
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    max_random_delay: Option<Duration>,
}
