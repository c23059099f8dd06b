use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cooldown::CooldownPolicy;
use crate::source::SourceLayout;
use crate::stability::DEFAULT_RETRY_BUDGET;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

/// Legacy integer encodings of the non-timed policies.
const COOLDOWN_PROMPT: i64 = -1;
const COOLDOWN_MANUAL: i64 = -2;

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    source: SourceConfig,
    #[serde(default)]
    refresh: RefreshConfig,
    #[serde(default)]
    cache: CacheConfig,
}

#[derive(Deserialize, Default)]
struct SourceConfig {
    path: Option<String>,
    platforms: Option<Vec<String>>,
    editor_platform: Option<String>,
}

#[derive(Deserialize, Default)]
struct RefreshConfig {
    cooldown: Option<CooldownSetting>,
    poll_interval_seconds: Option<u64>,
    stability_retry_budget: Option<u32>,
    slow_build_warning_ms: Option<u64>,
}

#[derive(Deserialize, Default)]
struct CacheConfig {
    path: Option<String>,
    persist: Option<bool>,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(untagged)]
enum CooldownSetting {
    Seconds(i64),
    Mode(String),
}

/// Settings resolved from configuration, owned by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub source_dir: Option<PathBuf>,
    pub platforms: Vec<String>,
    pub editor_platform: Option<String>,
    pub policy: CooldownPolicy,
    pub poll_interval: Duration,
    pub retry_budget: u32,
    pub slow_build_warning: Duration,
    /// `None` keeps the cache in memory only.
    pub cache_path: Option<PathBuf>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            source_dir: None,
            platforms: Vec::new(),
            editor_platform: None,
            policy: CooldownPolicy::default(),
            poll_interval: Duration::from_secs(5),
            retry_budget: DEFAULT_RETRY_BUDGET,
            slow_build_warning: Duration::from_millis(2000),
            cache_path: None,
        }
    }
}

impl SyncSettings {
    /// Where to scan, or `None` when no source directory is configured.
    pub fn layout(&self) -> Option<SourceLayout> {
        self.source_dir.as_ref().map(|root| {
            SourceLayout::new(
                root.clone(),
                self.platforms.clone(),
                self.editor_platform.as_deref(),
            )
        })
    }
}

pub struct Config {
    source: SourceConfig,
    refresh: RefreshConfig,
    cache: CacheConfig,
}

impl Config {
    /// Embedded defaults merged with the user's config file, if any.
    pub fn load() -> Self {
        match user_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Self::defaults(),
        }
    }

    /// Embedded defaults merged with `path`. Unreadable or malformed files are
    /// logged and ignored.
    pub fn load_from(path: &Path) -> Self {
        let mut config = Self::defaults();
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                Ok(user) => config.merge(user),
                Err(e) => {
                    log::warn!(target: "bankcache::config", "ignoring malformed config {}: {}", path.display(), e)
                }
            },
            Err(e) => {
                log::warn!(target: "bankcache::config", "could not read config {}: {}", path.display(), e)
            }
        }
        config
    }

    /// Embedded defaults merged with a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        let user: ConfigFile = toml::from_str(contents)?;
        let mut config = Self::defaults();
        config.merge(user);
        Ok(config)
    }

    fn defaults() -> Self {
        let base: ConfigFile = match toml::from_str(DEFAULT_CONFIG) {
            Ok(base) => base,
            Err(e) => {
                log::error!(target: "bankcache::config", "embedded config.toml is invalid: {}", e);
                ConfigFile::default()
            }
        };
        Config {
            source: base.source,
            refresh: base.refresh,
            cache: base.cache,
        }
    }

    fn merge(&mut self, user: ConfigFile) {
        merge_source(&mut self.source, user.source);
        merge_refresh(&mut self.refresh, user.refresh);
        merge_cache(&mut self.cache, user.cache);
    }

    /// Override the source directory, as the CLI `--source` flag does.
    pub fn set_source_dir(&mut self, path: &Path) {
        self.source.path = Some(path.to_string_lossy().into_owned());
    }

    pub fn source_dir(&self) -> Option<PathBuf> {
        let raw = self.source.path.as_deref().map(str::trim).filter(|p| !p.is_empty())?;
        let path = PathBuf::from(raw);
        if path.is_absolute() {
            return Some(path);
        }
        match std::env::current_dir() {
            Ok(cwd) => Some(cwd.join(path)),
            Err(_) => Some(path),
        }
    }

    pub fn platforms(&self) -> Vec<String> {
        self.source
            .platforms
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect()
    }

    pub fn editor_platform(&self) -> Option<String> {
        self.source
            .editor_platform
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
    }

    pub fn cooldown_policy(&self) -> CooldownPolicy {
        match &self.refresh.cooldown {
            None => CooldownPolicy::default(),
            Some(setting) => parse_cooldown(setting).unwrap_or_else(|| {
                log::warn!(target: "bankcache::config", "unknown cooldown {:?}; using default", setting);
                CooldownPolicy::default()
            }),
        }
    }

    /// Poll interval (clamped to 1..=3600 seconds).
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.refresh.poll_interval_seconds.unwrap_or(5).clamp(1, 3600))
    }

    /// Stability retry budget (clamped to 1..=100).
    pub fn retry_budget(&self) -> u32 {
        self.refresh
            .stability_retry_budget
            .unwrap_or(DEFAULT_RETRY_BUDGET)
            .clamp(1, 100)
    }

    pub fn slow_build_warning(&self) -> Duration {
        Duration::from_millis(self.refresh.slow_build_warning_ms.unwrap_or(2000))
    }

    pub fn persist_enabled(&self) -> bool {
        self.cache.persist.unwrap_or(true)
    }

    pub fn cache_path(&self) -> Option<PathBuf> {
        if !self.persist_enabled() {
            return None;
        }
        match self.cache.path.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            Some(path) => Some(PathBuf::from(path)),
            None => default_cache_path(),
        }
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            source_dir: self.source_dir(),
            platforms: self.platforms(),
            editor_platform: self.editor_platform(),
            policy: self.cooldown_policy(),
            poll_interval: self.poll_interval(),
            retry_budget: self.retry_budget(),
            slow_build_warning: self.slow_build_warning(),
            cache_path: self.cache_path(),
        }
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bankcache").join("config.toml"))
}

fn default_cache_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("bankcache").join("cache.sqlite"))
}

fn parse_cooldown(setting: &CooldownSetting) -> Option<CooldownPolicy> {
    match setting {
        CooldownSetting::Seconds(COOLDOWN_PROMPT) => Some(CooldownPolicy::Prompt),
        CooldownSetting::Seconds(COOLDOWN_MANUAL) => Some(CooldownPolicy::Manual),
        CooldownSetting::Seconds(secs) if *secs >= 0 => {
            Some(CooldownPolicy::After(Duration::from_secs(*secs as u64)))
        }
        CooldownSetting::Seconds(_) => None,
        CooldownSetting::Mode(mode) => match mode.trim().to_ascii_lowercase().as_str() {
            "prompt" => Some(CooldownPolicy::Prompt),
            "manual" => Some(CooldownPolicy::Manual),
            other => other
                .parse::<u64>()
                .ok()
                .map(|secs| CooldownPolicy::After(Duration::from_secs(secs))),
        },
    }
}

fn merge_source(base: &mut SourceConfig, user: SourceConfig) {
    if user.path.is_some() {
        base.path = user.path;
    }
    if user.platforms.is_some() {
        base.platforms = user.platforms;
    }
    if user.editor_platform.is_some() {
        base.editor_platform = user.editor_platform;
    }
}

fn merge_refresh(base: &mut RefreshConfig, user: RefreshConfig) {
    if user.cooldown.is_some() {
        base.cooldown = user.cooldown;
    }
    if user.poll_interval_seconds.is_some() {
        base.poll_interval_seconds = user.poll_interval_seconds;
    }
    if user.stability_retry_budget.is_some() {
        base.stability_retry_budget = user.stability_retry_budget;
    }
    if user.slow_build_warning_ms.is_some() {
        base.slow_build_warning_ms = user.slow_build_warning_ms;
    }
}

fn merge_cache(base: &mut CacheConfig, user: CacheConfig) {
    if user.path.is_some() {
        base.path = user.path;
    }
    if user.persist.is_some() {
        base.persist = user.persist;
    }
}
