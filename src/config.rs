use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::channel::{ControllerEndpoint, ControllerSettings, RetryPolicy};
use crate::decision::{GeometryConfig, DEFAULT_FRAME_WIDTH};
use crate::detect::FistPolicy;
use crate::ingest::SourceSettings;
use crate::snapshot::{GestureSettings, MAX_TRACKED_HANDS};

pub const CONFIG_ENV: &str = "FOLLOW_CONFIG";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PilotConfigFile {
    controller: Option<ControllerConfigFile>,
    retry: Option<RetryConfigFile>,
    source: Option<SourceConfigFile>,
    geometry: Option<GeometryConfigFile>,
    gestures: Option<GesturesConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ControllerConfigFile {
    addr: Option<String>,
    local_only: Option<bool>,
    connect_timeout_ms: Option<u64>,
    write_timeout_ms: Option<u64>,
    decoupled_send: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RetryConfigFile {
    max_attempts: Option<u32>,
    initial_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    mirror: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct GeometryConfigFile {
    frame_width: Option<u32>,
    center_tolerance: Option<u32>,
    center_tolerance_ratio: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct GesturesConfigFile {
    max_hands: Option<usize>,
    closed_threshold: Option<usize>,
    include_thumb: Option<bool>,
}

/// Runtime configuration for the follower.
#[derive(Debug, Clone)]
pub struct PilotConfig {
    pub controller: ControllerSettings,
    pub retry: RetryPolicy,
    pub source: SourceSettings,
    pub geometry: GeometryConfig,
    pub gestures: GestureSettings,
}

/// Geometry inputs kept raw until validation, so env overrides of the width
/// still feed the default tolerance.
#[derive(Debug, Clone, Copy)]
struct GeometryInputs {
    frame_width: u32,
    center_tolerance: Option<u32>,
    center_tolerance_ratio: Option<f64>,
}

impl GeometryInputs {
    fn build(&self) -> Result<GeometryConfig> {
        match (self.center_tolerance, self.center_tolerance_ratio) {
            (Some(tolerance), _) => GeometryConfig::with_tolerance(self.frame_width, tolerance),
            (None, Some(ratio)) => GeometryConfig::with_tolerance_ratio(self.frame_width, ratio),
            (None, None) => GeometryConfig::new(self.frame_width),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct GestureInputs {
    max_hands: usize,
    closed_threshold: Option<usize>,
    include_thumb: bool,
}

impl PilotConfig {
    /// Load from `FOLLOW_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV)
            .ok()
            .filter(|path| !path.trim().is_empty());
        Self::load_from(path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (or defaults), then apply env overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => PilotConfigFile::default(),
        };
        let mut draft = Draft::from_file(file_cfg);
        draft.apply_env()?;
        draft.finish()
    }

    /// Re-check cross-field constraints after callers edit a loaded config.
    pub fn validate(&self) -> Result<()> {
        self.retry.validate()?;
        if self.source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be greater than zero"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source dimensions must be non-zero"));
        }
        if self.source.width != self.geometry.frame_width() {
            return Err(anyhow!(
                "source width {} does not match geometry frame_width {}",
                self.source.width,
                self.geometry.frame_width()
            ));
        }
        if self.gestures.max_hands == 0 || self.gestures.max_hands > MAX_TRACKED_HANDS {
            return Err(anyhow!(
                "max_hands must be between 1 and {}",
                MAX_TRACKED_HANDS
            ));
        }
        if self.controller.connect_timeout.is_zero() || self.controller.write_timeout.is_zero() {
            return Err(anyhow!("controller timeouts must be greater than zero"));
        }
        Ok(())
    }
}

struct Draft {
    controller: ControllerSettings,
    controller_addr: Option<String>,
    retry: RetryPolicy,
    source: SourceSettings,
    geometry: GeometryInputs,
    gestures: GestureInputs,
}

impl Draft {
    fn from_file(file: PilotConfigFile) -> Self {
        let defaults = ControllerSettings::default();
        let controller_file = file.controller.unwrap_or_default();
        let controller = ControllerSettings {
            local_only: controller_file.local_only.unwrap_or(defaults.local_only),
            connect_timeout: controller_file
                .connect_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.connect_timeout),
            write_timeout: controller_file
                .write_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.write_timeout),
            decoupled_send: controller_file
                .decoupled_send
                .unwrap_or(defaults.decoupled_send),
            ..defaults
        };

        let retry_defaults = RetryPolicy::default();
        let retry_file = file.retry.unwrap_or_default();
        let retry = RetryPolicy {
            max_attempts: retry_file
                .max_attempts
                .unwrap_or(retry_defaults.max_attempts),
            initial_backoff: retry_file
                .initial_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(retry_defaults.initial_backoff),
            max_backoff: retry_file
                .max_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(retry_defaults.max_backoff),
            ..retry_defaults
        };

        let source_defaults = SourceSettings::default();
        let source_file = file.source.unwrap_or_default();
        let geometry_file = file.geometry.unwrap_or_default();
        // An unset width on either side follows the other.
        let frame_width = geometry_file
            .frame_width
            .or(source_file.width)
            .unwrap_or(DEFAULT_FRAME_WIDTH);
        let source = SourceSettings {
            url: source_file.url.unwrap_or(source_defaults.url),
            target_fps: source_file.target_fps.unwrap_or(source_defaults.target_fps),
            width: source_file.width.unwrap_or(frame_width),
            height: source_file.height.unwrap_or(source_defaults.height),
            mirror: source_file.mirror.unwrap_or(source_defaults.mirror),
        };
        let geometry = GeometryInputs {
            frame_width,
            center_tolerance: geometry_file.center_tolerance,
            center_tolerance_ratio: geometry_file.center_tolerance_ratio,
        };

        let gesture_defaults = GestureSettings::default();
        let gestures_file = file.gestures.unwrap_or_default();
        let gestures = GestureInputs {
            max_hands: gestures_file
                .max_hands
                .unwrap_or(gesture_defaults.max_hands),
            closed_threshold: gestures_file.closed_threshold,
            include_thumb: gestures_file
                .include_thumb
                .unwrap_or(gesture_defaults.policy.include_thumb()),
        };

        Self {
            controller,
            controller_addr: controller_file.addr,
            retry,
            source,
            geometry,
            gestures,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_string("FOLLOW_CONTROLLER_ADDR") {
            self.controller_addr = Some(addr);
        }
        if let Some(local) = env_string("FOLLOW_LOCAL_ONLY") {
            self.controller.local_only = parse_bool("FOLLOW_LOCAL_ONLY", &local)?;
        }
        if let Some(mirror) = env_string("FOLLOW_MIRROR") {
            self.source.mirror = parse_bool("FOLLOW_MIRROR", &mirror)?;
        }
        if let Some(url) = env_string("FOLLOW_SOURCE_URL") {
            self.source.url = url;
        }
        if let Some(fps) = env_parse::<u32>("FOLLOW_TARGET_FPS")? {
            self.source.target_fps = fps;
        }
        if let Some(width) = env_parse::<u32>("FOLLOW_FRAME_WIDTH")? {
            self.geometry.frame_width = width;
            self.source.width = width;
        }
        if let Some(tolerance) = env_parse::<u32>("FOLLOW_CENTER_TOLERANCE")? {
            self.geometry.center_tolerance = Some(tolerance);
        }
        if let Some(max_hands) = env_parse::<usize>("FOLLOW_MAX_HANDS")? {
            self.gestures.max_hands = max_hands;
        }
        if let Some(threshold) = env_parse::<usize>("FOLLOW_FIST_THRESHOLD")? {
            self.gestures.closed_threshold = Some(threshold);
        }
        if let Some(attempts) = env_parse::<u32>("FOLLOW_CONNECT_RETRIES")? {
            self.retry.max_attempts = attempts;
        }
        Ok(())
    }

    fn finish(self) -> Result<PilotConfig> {
        let mut controller = self.controller;
        if let Some(addr) = &self.controller_addr {
            controller.endpoint = ControllerEndpoint::parse(addr)
                .with_context(|| format!("invalid controller address '{}'", addr))?;
        }
        let geometry = self.geometry.build().context("invalid geometry config")?;

        let digits = if self.gestures.include_thumb { 5 } else { 4 };
        let threshold = self
            .gestures
            .closed_threshold
            .unwrap_or_else(|| FistPolicy::default().closed_threshold().min(digits));
        let policy = FistPolicy::new(threshold, self.gestures.include_thumb)
            .context("invalid gesture config")?;

        let cfg = PilotConfig {
            controller,
            retry: self.retry,
            source: self.source,
            geometry,
            gestures: GestureSettings {
                max_hands: self.gestures.max_hands,
                policy,
            },
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

fn read_config_file(path: &Path) -> Result<PilotConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env_string(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a non-negative integer, got '{}'", key, raw)),
        None => Ok(None),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{} must be a boolean, got '{}'", key, raw)),
    }
}
