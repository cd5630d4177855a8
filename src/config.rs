use crate::datasource::hyperliquid::MAINNET_API_URL;
use crate::domain::Decimal;
use crate::service::LeaderboardMetric;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub hyperliquid_api_url: String,
    pub target_builder: String,
    pub capital_ceiling: Decimal,
    pub pnl_mode: PnlMode,
    pub fanout_limit: usize,
    pub user_timeout_ms: u64,
    pub leaderboard_users: Vec<String>,
    pub leaderboard_coin: String,
    pub leaderboard_metric: LeaderboardMetric,
    pub builder_only: bool,
}

/// Whether the `pnl` leaderboard metric is reported before or after fees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PnlMode {
    Gross,
    Net,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let hyperliquid_api_url = env_map
            .get("HYPERLIQUID_API_URL")
            .cloned()
            .unwrap_or_else(|| MAINNET_API_URL.to_string());

        let target_builder = env_map
            .get("TARGET_BUILDER")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingEnv("TARGET_BUILDER".to_string()))?;

        let capital_ceiling = env_map
            .get("CAPITAL_CEILING")
            .map(|s| s.as_str())
            .unwrap_or("1000")
            .parse::<Decimal>()
            .ok()
            .filter(|c| c.is_positive())
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "CAPITAL_CEILING".to_string(),
                    "must be a positive decimal".to_string(),
                )
            })?;

        let pnl_mode = match env_map
            .get("PNL_MODE")
            .map(|s| s.as_str())
            .unwrap_or("gross")
        {
            "gross" => PnlMode::Gross,
            "net" => PnlMode::Net,
            other => {
                return Err(ConfigError::InvalidValue(
                    "PNL_MODE".to_string(),
                    format!("must be gross or net, got {}", other),
                ))
            }
        };

        let fanout_limit = env_map
            .get("FANOUT_LIMIT")
            .map(|s| s.as_str())
            .unwrap_or("8")
            .parse::<usize>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "FANOUT_LIMIT".to_string(),
                    "must be a valid usize".to_string(),
                )
            })?
            .max(1);

        let user_timeout_ms = env_map
            .get("USER_TIMEOUT_MS")
            .map(|s| s.as_str())
            .unwrap_or("30000")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "USER_TIMEOUT_MS".to_string(),
                    "must be a valid u64".to_string(),
                )
            })?;

        let leaderboard_users = parse_leaderboard_users_from_map(&env_map)?;

        let leaderboard_coin = env_map
            .get("LEADERBOARD_COIN")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "BTC".to_string());

        let metric_str = env_map
            .get("LEADERBOARD_METRIC")
            .map(|s| s.as_str())
            .unwrap_or("pnl");
        let leaderboard_metric = LeaderboardMetric::from_str(metric_str).map_err(|_| {
            ConfigError::InvalidValue(
                "LEADERBOARD_METRIC".to_string(),
                format!("must be pnl, roi, or volume, got {}", metric_str),
            )
        })?;

        let builder_only = match env_map
            .get("BUILDER_ONLY")
            .map(|s| s.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("") | Some("false") | Some("0") => false,
            Some("true") | Some("1") => true,
            Some(other) => {
                return Err(ConfigError::InvalidValue(
                    "BUILDER_ONLY".to_string(),
                    format!("must be true or false, got {}", other),
                ))
            }
        };

        Ok(Config {
            hyperliquid_api_url,
            target_builder,
            capital_ceiling,
            pnl_mode,
            fanout_limit,
            user_timeout_ms,
            leaderboard_users,
            leaderboard_coin,
            leaderboard_metric,
            builder_only,
        })
    }
}

fn parse_leaderboard_users_from_map(
    env_map: &HashMap<String, String>,
) -> Result<Vec<String>, ConfigError> {
    if let Some(users_str) = env_map.get("LEADERBOARD_USERS") {
        Ok(users_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    } else if let Some(file_path) = env_map.get("LEADERBOARD_USERS_FILE") {
        let content = std::fs::read_to_string(file_path).map_err(|_| {
            ConfigError::InvalidValue(
                "LEADERBOARD_USERS_FILE".to_string(),
                "file not found or unreadable".to_string(),
            )
        })?;
        Ok(content
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|s| !s.is_empty() && !s.starts_with('#'))
            .collect())
    } else {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("TARGET_BUILDER".to_string(), "0x123".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.hyperliquid_api_url, MAINNET_API_URL);
        assert_eq!(config.capital_ceiling, Decimal::from(1000));
        assert_eq!(config.pnl_mode, PnlMode::Gross);
        assert_eq!(config.fanout_limit, 8);
        assert_eq!(config.user_timeout_ms, 30000);
        assert_eq!(config.leaderboard_coin, "BTC");
        assert_eq!(config.leaderboard_metric, LeaderboardMetric::Pnl);
        assert!(!config.builder_only);
        assert!(config.leaderboard_users.is_empty());
    }

    #[test]
    fn test_missing_target_builder() {
        let mut env_map = setup_required_env();
        env_map.remove("TARGET_BUILDER");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "TARGET_BUILDER"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_blank_target_builder_is_missing() {
        let mut env_map = setup_required_env();
        env_map.insert("TARGET_BUILDER".to_string(), "   ".to_string());
        assert!(matches!(
            Config::from_env_map(env_map),
            Err(ConfigError::MissingEnv(_))
        ));
    }

    #[test]
    fn test_invalid_capital_ceiling() {
        for value in ["abc", "0", "-5"] {
            let mut env_map = setup_required_env();
            env_map.insert("CAPITAL_CEILING".to_string(), value.to_string());
            match Config::from_env_map(env_map) {
                Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "CAPITAL_CEILING"),
                _ => panic!("Expected InvalidValue error for {}", value),
            }
        }
    }

    #[test]
    fn test_invalid_pnl_mode() {
        let mut env_map = setup_required_env();
        env_map.insert("PNL_MODE".to_string(), "invalid".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PNL_MODE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_fanout_limit_has_floor_of_one() {
        let mut env_map = setup_required_env();
        env_map.insert("FANOUT_LIMIT".to_string(), "0".to_string());
        assert_eq!(Config::from_env_map(env_map).unwrap().fanout_limit, 1);
    }

    #[test]
    fn test_invalid_metric_and_builder_only() {
        let mut env_map = setup_required_env();
        env_map.insert("LEADERBOARD_METRIC".to_string(), "sharpe".to_string());
        assert!(matches!(
            Config::from_env_map(env_map),
            Err(ConfigError::InvalidValue(k, _)) if k == "LEADERBOARD_METRIC"
        ));

        let mut env_map = setup_required_env();
        env_map.insert("BUILDER_ONLY".to_string(), "maybe".to_string());
        assert!(matches!(
            Config::from_env_map(env_map),
            Err(ConfigError::InvalidValue(k, _)) if k == "BUILDER_ONLY"
        ));
    }

    #[test]
    fn test_users_from_list() {
        let mut env_map = setup_required_env();
        env_map.insert("LEADERBOARD_USERS".to_string(), " 0xa, ,0xb ".to_string());
        env_map.insert("BUILDER_ONLY".to_string(), "TRUE".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.leaderboard_users, vec!["0xa", "0xb"]);
        assert!(config.builder_only);
    }

    #[test]
    fn test_users_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0xa\n# comment\n\n  0xb  ").unwrap();

        let mut env_map = setup_required_env();
        env_map.insert(
            "LEADERBOARD_USERS_FILE".to_string(),
            file.path().to_string_lossy().to_string(),
        );
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.leaderboard_users, vec!["0xa", "0xb"]);
    }

    #[test]
    fn test_unreadable_users_file() {
        let mut env_map = setup_required_env();
        env_map.insert(
            "LEADERBOARD_USERS_FILE".to_string(),
            "/definitely/not/here.txt".to_string(),
        );
        assert!(matches!(
            Config::from_env_map(env_map),
            Err(ConfigError::InvalidValue(k, _)) if k == "LEADERBOARD_USERS_FILE"
        ));
    }
}
