//! Application-level configuration loading, including tunables and optional seed data.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::dao::models::{GameEntity, TeamEntity, TeamMemberEntity, UserEntity};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "ARENA_BACK_CONFIG_PATH";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Interval between liveness pings on realtime connections.
    pub heartbeat_interval: Duration,
    /// Extra time granted past the countdown before recovery is allowed.
    pub countdown_grace: Duration,
    /// Countdown length used when a match is created without one.
    pub default_countdown_seconds: u32,
    /// Roster capacity used when a match is created without one.
    pub default_max_participants: u32,
    /// Number of characters in generated access codes.
    pub access_code_length: usize,
    /// Records loaded into the in-memory store at startup.
    pub seed: SeedData,
}

/// Users, games and teams owned by external services, preloaded for local runs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeedData {
    /// Users with their bearer tokens.
    pub users: Vec<UserEntity>,
    /// Games matches can be created on.
    pub games: Vec<GameEntity>,
    /// Teams and their member ids.
    pub teams: Vec<SeedTeam>,
}

/// Team entry of the seed file; members reference seeded users by id.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedTeam {
    /// Team identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// User ids of the members.
    #[serde(default)]
    pub members: Vec<String>,
}

impl SeedData {
    /// Resolve team member ids against the seeded users. Unknown ids keep the id as display name.
    pub fn team_entities(&self) -> Vec<TeamEntity> {
        self.teams
            .iter()
            .map(|team| TeamEntity {
                id: team.id.clone(),
                name: team.name.clone(),
                members: team
                    .members
                    .iter()
                    .map(|user_id| TeamMemberEntity {
                        user_id: user_id.clone(),
                        user_name: self
                            .users
                            .iter()
                            .find(|user| &user.id == user_id)
                            .map(|user| user.name.clone())
                            .unwrap_or_else(|| user_id.clone()),
                    })
                    .collect(),
            })
            .collect()
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        users = app_config.seed.users.len(),
                        teams = app_config.seed.teams.len(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    heartbeat_interval_secs: u64,
    countdown_grace_secs: u64,
    default_countdown_seconds: u32,
    default_max_participants: u32,
    access_code_length: usize,
    seed: SeedData,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            countdown_grace_secs: 2,
            default_countdown_seconds: 3,
            default_max_participants: 8,
            access_code_length: 6,
            seed: SeedData::default(),
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(value.heartbeat_interval_secs.max(1)),
            countdown_grace: Duration::from_secs(value.countdown_grace_secs),
            default_countdown_seconds: value.default_countdown_seconds.clamp(1, 300),
            default_max_participants: value.default_max_participants.clamp(2, 100),
            access_code_length: value.access_code_length.clamp(4, 12),
            seed: value.seed,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
