// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TestThreads;
use crate::{
    errors::{ConfigParseError, ProfileNotFound},
    list::Partitioning,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use itertools::Itertools;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Handles warnings produced while reading configuration.
pub trait ConfigWarnings {
    /// Handle unknown configuration keys found in a config file.
    fn unknown_config_keys(
        &mut self,
        config_file: &Utf8Path,
        root: &Utf8Path,
        unknown: &BTreeSet<String>,
    );
}

/// Logs configuration warnings through `tracing`.
#[derive(Debug, Default)]
pub struct DefaultConfigWarnings;

impl ConfigWarnings for DefaultConfigWarnings {
    fn unknown_config_keys(
        &mut self,
        config_file: &Utf8Path,
        root: &Utf8Path,
        unknown: &BTreeSet<String>,
    ) {
        let unknown_str = if unknown.len() == 1 {
            // Print this on the same line.
            format!("key: {}", unknown.iter().join(""))
        } else {
            let mut s = String::from("keys:\n");
            for ignored_key in unknown {
                s.push_str("\n  - ");
                s.push_str(ignored_key);
            }
            s
        };

        warn!(
            "in config file {}, ignoring unknown configuration {unknown_str}",
            config_file.strip_prefix(root).unwrap_or(config_file),
        )
    }
}

/// Overall configuration for unitrun.
///
/// Runner settings are grouped into profiles, obtained through [`profile`](Self::profile).
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    root: Utf8PathBuf,
    inner: RunnerConfigImpl,
}

impl RunnerConfig {
    /// The default location of the config within the root directory.
    pub const CONFIG_PATH: &'static str = ".config/unitrun.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// The name of the default profile.
    pub const DEFAULT_PROFILE: &'static str = "default";

    /// Reads the configuration from `config_file`, or from [`CONFIG_PATH`](Self::CONFIG_PATH)
    /// under `root` if no file is given. The default location may be absent; an explicitly named
    /// file must exist.
    ///
    /// Unknown keys are logged as warnings.
    pub fn from_sources(
        root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        Self::from_sources_with_warnings(root, config_file, &mut DefaultConfigWarnings)
    }

    /// Like [`from_sources`](Self::from_sources), reporting warnings to `warnings`.
    pub fn from_sources_with_warnings(
        root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigParseError> {
        let root = root.into();
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (deserialized, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|error| ConfigParseError::new(&config_file, error))?;
        if !unknown.is_empty() {
            warnings.unknown_config_keys(&config_file, &root, &unknown);
        }

        Ok(Self {
            root,
            inner: deserialized.into_config_impl(),
        })
    }

    /// Returns the default config.
    pub fn default_config(root: impl Into<Utf8PathBuf>) -> Self {
        let (deserialized, unknown) =
            Self::build_and_deserialize_config(&Self::make_default_config())
                .expect("default config is always valid");

        // The default config is embedded in this crate, so unknown keys are a bug.
        if !unknown.is_empty() {
            panic!(
                "found unknown keys in default config: {}",
                unknown.iter().join(", ")
            );
        }

        Self {
            root: root.into(),
            inner: deserialized.into_config_impl(),
        }
    }

    /// The root directory the config was read relative to.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the profile with the given name, or an error if it is not defined.
    pub fn profile(&self, name: impl AsRef<str>) -> Result<RunnerProfile<'_>, ProfileNotFound> {
        let name = name.as_ref();
        let custom_profile = match self.inner.other_profiles.get(name) {
            Some(profile) => Some(profile),
            None if name == Self::DEFAULT_PROFILE => None,
            None => {
                return Err(ProfileNotFound::new(
                    name,
                    self.inner.all_profiles().map(str::to_owned),
                ));
            }
        };

        Ok(RunnerProfile {
            name: name.to_owned(),
            default_profile: &self.inner.default_profile,
            custom_profile,
        })
    }

    /// Returns the names of all known profiles.
    pub fn profile_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.inner.all_profiles()
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(RunnerConfigDeserialize, BTreeSet<String>), ConfigError> {
        let config = builder.build_cloned()?;

        let mut ignored = BTreeSet::new();
        let config: RunnerConfigDeserialize =
            serde_ignored::deserialize(config, |path: serde_ignored::Path| {
                ignored.insert(path.to_string());
            })?;

        Ok((config, ignored))
    }
}

/// A named set of runner settings.
///
/// Values not set by the profile are taken from the default profile.
#[derive(Clone, Debug)]
pub struct RunnerProfile<'cfg> {
    name: String,
    default_profile: &'cfg DefaultProfileImpl,
    custom_profile: Option<&'cfg CustomProfileImpl>,
}

impl<'cfg> RunnerProfile<'cfg> {
    /// The name of the profile.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The number of worker threads for concurrent runs.
    pub fn test_threads(&self) -> TestThreads {
        self.custom_profile
            .and_then(|profile| profile.test_threads)
            .unwrap_or(self.default_profile.test_threads)
    }

    /// Whether tests run on a pool of worker threads.
    pub fn concurrent(&self) -> bool {
        self.custom_profile
            .and_then(|profile| profile.concurrent)
            .unwrap_or(self.default_profile.concurrent)
    }

    /// How tests are split into units of work.
    pub fn partitioning(&self) -> Partitioning {
        self.custom_profile
            .and_then(|profile| profile.partitioning)
            .unwrap_or(self.default_profile.partitioning)
    }

    /// Whether tests are ordered by name within a declaring type.
    pub fn sort_by_name(&self) -> bool {
        self.custom_profile
            .and_then(|profile| profile.sort_by_name)
            .unwrap_or(self.default_profile.sort_by_name)
    }

    /// Whether events are marshaled onto the dispatch queue of the thread starting the run.
    pub fn marshal_events(&self) -> bool {
        self.custom_profile
            .and_then(|profile| profile.marshal_events)
            .unwrap_or(self.default_profile.marshal_events)
    }

    /// Whether post-test actions run after a pre-test action vetoed the test.
    pub fn post_actions_after_veto(&self) -> bool {
        self.custom_profile
            .and_then(|profile| profile.post_actions_after_veto)
            .unwrap_or(self.default_profile.post_actions_after_veto)
    }

    /// The groups to run. Empty means all tests.
    pub fn groups(&self) -> &'cfg [String] {
        self.custom_profile
            .and_then(|profile| profile.groups.as_deref())
            .unwrap_or(&self.default_profile.groups)
    }
}

#[derive(Clone, Debug)]
struct RunnerConfigImpl {
    default_profile: DefaultProfileImpl,
    other_profiles: BTreeMap<String, CustomProfileImpl>,
}

impl RunnerConfigImpl {
    fn all_profiles(&self) -> impl Iterator<Item = &str> + '_ {
        std::iter::once(RunnerConfig::DEFAULT_PROFILE).chain(
            self.other_profiles
                .keys()
                .map(String::as_str)
                .filter(|name| *name != RunnerConfig::DEFAULT_PROFILE),
        )
    }
}

// This is the form of `RunnerConfig` that gets deserialized.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RunnerConfigDeserialize {
    #[serde(rename = "profile")]
    profiles: BTreeMap<String, CustomProfileImpl>,
}

impl RunnerConfigDeserialize {
    fn into_config_impl(mut self) -> RunnerConfigImpl {
        let p = self
            .profiles
            .remove(RunnerConfig::DEFAULT_PROFILE)
            .expect("default profile should exist");
        RunnerConfigImpl {
            default_profile: DefaultProfileImpl::new(p),
            other_profiles: self.profiles,
        }
    }
}

#[derive(Clone, Debug)]
struct DefaultProfileImpl {
    test_threads: TestThreads,
    concurrent: bool,
    partitioning: Partitioning,
    sort_by_name: bool,
    marshal_events: bool,
    post_actions_after_veto: bool,
    groups: Vec<String>,
}

impl DefaultProfileImpl {
    fn new(p: CustomProfileImpl) -> Self {
        Self {
            test_threads: p
                .test_threads
                .expect("test-threads present in default profile"),
            concurrent: p
                .concurrent
                .expect("concurrent present in default profile"),
            partitioning: p
                .partitioning
                .expect("partitioning present in default profile"),
            sort_by_name: p
                .sort_by_name
                .expect("sort-by-name present in default profile"),
            marshal_events: p
                .marshal_events
                .expect("marshal-events present in default profile"),
            post_actions_after_veto: p
                .post_actions_after_veto
                .expect("post-actions-after-veto present in default profile"),
            groups: p.groups.expect("groups present in default profile"),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CustomProfileImpl {
    #[serde(default)]
    test_threads: Option<TestThreads>,
    #[serde(default)]
    concurrent: Option<bool>,
    #[serde(default)]
    partitioning: Option<Partitioning>,
    #[serde(default)]
    sort_by_name: Option<bool>,
    #[serde(default)]
    marshal_events: Option<bool>,
    #[serde(default)]
    post_actions_after_veto: Option<bool>,
    #[serde(default)]
    groups: Option<Vec<String>>,
}
