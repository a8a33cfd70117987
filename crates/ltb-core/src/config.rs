use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, logging::FileSink, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Typed configuration for the relay.
///
/// Per-user provider credentials are NOT here; they live in the settings store.
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram_token: String,
    pub logger_level: String,
    /// Persistent log file; `None` keeps logs on stderr only.
    pub log_file: Option<PathBuf>,
    /// Rotated log files kept (one per day).
    pub log_retention_days: usize,

    // Storage
    pub database_path: PathBuf,
    pub temp_dir: PathBuf,

    // Guards
    pub rate_limit_requests: usize,
    pub rate_limit_window: Duration,
    pub max_message_chars: usize,
    pub max_image_bytes: u64,
    pub command_cooldown: Duration,
    pub banned_words: Vec<String>,

    // Guard state eviction
    pub guard_idle_ttl: Duration,
    pub guard_sweep_interval: Duration,

    // Backend
    pub request_timeout: Duration,
    pub default_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram_token: String::new(),
            logger_level: "error".to_string(),
            log_file: Some(PathBuf::from("bot.log")),
            log_retention_days: 10,
            database_path: PathBuf::from("data/bot.db"),
            temp_dir: env::temp_dir().join("telegram_bot_images"),
            rate_limit_requests: 6,
            rate_limit_window: Duration::from_secs(10),
            max_message_chars: 4000,
            max_image_bytes: 5 * 1024 * 1024,
            command_cooldown: Duration::from_secs(2),
            banned_words: Vec::new(),
            guard_idle_ttl: Duration::from_secs(3600),
            guard_sweep_interval: Duration::from_secs(300),
            request_timeout: Duration::from_secs(120),
            default_base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        let cfg = Self::from_lookup(|key| env::var(key).ok())?;

        if let Some(parent) = cfg.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::create_dir_all(&cfg.temp_dir)?;

        Ok(cfg)
    }

    /// File sink for [`crate::logging::init`], when file logging is enabled.
    pub fn log_sink(&self) -> Option<FileSink> {
        self.log_file
            .as_deref()
            .and_then(|p| FileSink::for_path(p, self.log_retention_days))
    }

    /// Build a config from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let d = Self::default();

        let telegram_token = lookup("TELEGRAM_TOKEN")
            .or_else(|| lookup("TELEGRAM_BOT_TOKEN"))
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("TELEGRAM_TOKEN environment variable is required".to_string())
            })?;

        let logger_level = lookup("LOGGER_LEVEL")
            .and_then(non_empty)
            .map(|s| s.trim().to_lowercase())
            .unwrap_or(d.logger_level);

        let log_file = match lookup("LOG_FILE").and_then(non_empty) {
            None => d.log_file,
            Some(v) if is_off(&v) => None,
            Some(v) => Some(PathBuf::from(v.trim())),
        };
        let log_retention_days =
            parse_num(&lookup, "LOG_RETENTION_DAYS")?.unwrap_or(d.log_retention_days);

        let database_path = lookup("DATABASE_PATH")
            .and_then(non_empty)
            .map(PathBuf::from)
            .unwrap_or(d.database_path);
        let temp_dir = lookup("TEMP_DIR")
            .and_then(non_empty)
            .map(PathBuf::from)
            .unwrap_or(d.temp_dir);

        let rate_limit_requests =
            parse_num(&lookup, "RATE_LIMIT_REQUESTS")?.unwrap_or(d.rate_limit_requests);
        let rate_limit_window = parse_num(&lookup, "RATE_LIMIT_WINDOW")?
            .map(Duration::from_secs)
            .unwrap_or(d.rate_limit_window);
        let max_message_chars =
            parse_num(&lookup, "MAX_MESSAGE_CHARS")?.unwrap_or(d.max_message_chars);
        let max_image_bytes = parse_num(&lookup, "MAX_IMAGE_BYTES")?.unwrap_or(d.max_image_bytes);
        let command_cooldown = parse_num(&lookup, "COMMAND_COOLDOWN_MS")?
            .map(Duration::from_millis)
            .unwrap_or(d.command_cooldown);
        let banned_words = parse_csv_lower(lookup("BANNED_WORDS"));

        let guard_idle_ttl = parse_num(&lookup, "GUARD_IDLE_TTL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(d.guard_idle_ttl);
        let guard_sweep_interval = parse_num(&lookup, "GUARD_SWEEP_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(d.guard_sweep_interval);

        let request_timeout = parse_num(&lookup, "REQUEST_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(d.request_timeout);
        let default_base_url = lookup("DEFAULT_BASE_URL")
            .and_then(non_empty)
            .unwrap_or(d.default_base_url);

        if rate_limit_window.is_zero() {
            return Err(Error::Config("RATE_LIMIT_WINDOW must be > 0".to_string()));
        }
        if guard_sweep_interval.is_zero() {
            return Err(Error::Config(
                "GUARD_SWEEP_INTERVAL_SECS must be > 0".to_string(),
            ));
        }

        Ok(Self {
            telegram_token,
            logger_level,
            log_file,
            log_retention_days,
            database_path,
            temp_dir,
            rate_limit_requests,
            rate_limit_window,
            max_message_chars,
            max_image_bytes,
            command_cooldown,
            banned_words,
            guard_idle_ttl,
            guard_sweep_interval,
            request_timeout,
            default_base_url,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn parse_num<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    let Some(raw) = lookup(key).and_then(non_empty) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got {raw:?}")))
}

fn parse_csv_lower(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn is_off(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "off" | "none" | "false" | "0")
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn token_is_required() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn defaults_match_message_path_policy() {
        let cfg = Config::from_lookup(lookup_from(&[("TELEGRAM_TOKEN", "t")])).unwrap();
        assert_eq!(cfg.rate_limit_requests, 6);
        assert_eq!(cfg.rate_limit_window, Duration::from_secs(10));
        assert_eq!(cfg.max_message_chars, 4000);
        assert_eq!(cfg.max_image_bytes, 5 * 1024 * 1024);
        assert_eq!(cfg.command_cooldown, Duration::from_secs(2));
        assert_eq!(cfg.logger_level, "error");
        assert!(cfg.banned_words.is_empty());
    }

    #[test]
    fn overrides_and_alias() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("LOGGER_LEVEL", "DEBUG"),
            ("RATE_LIMIT_REQUESTS", "2"),
            ("COMMAND_COOLDOWN_MS", "500"),
            ("BANNED_WORDS", "Foo, bar ,,"),
        ]))
        .unwrap();
        assert_eq!(cfg.telegram_token, "t");
        assert_eq!(cfg.logger_level, "debug");
        assert_eq!(cfg.rate_limit_requests, 2);
        assert_eq!(cfg.command_cooldown, Duration::from_millis(500));
        assert_eq!(cfg.banned_words, vec!["foo".to_string(), "bar".to_string()]);
    }

    #[test]
    fn bad_number_is_config_error() {
        let err = Config::from_lookup(lookup_from(&[
            ("TELEGRAM_TOKEN", "t"),
            ("MAX_IMAGE_BYTES", "five"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("MAX_IMAGE_BYTES"));
    }

    #[test]
    fn log_file_defaults_to_bot_log() {
        let cfg = Config::from_lookup(lookup_from(&[("TELEGRAM_TOKEN", "t")])).unwrap();
        assert_eq!(cfg.log_file, Some(PathBuf::from("bot.log")));
        assert_eq!(cfg.log_retention_days, 10);
        let sink = cfg.log_sink().unwrap();
        assert_eq!(sink.dir, PathBuf::from("."));
        assert_eq!(sink.stem, "bot");
        assert_eq!(sink.max_files, 10);
    }

    #[test]
    fn log_file_path_and_retention_are_configurable() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("TELEGRAM_TOKEN", "t"),
            ("LOG_FILE", " logs/relay.log "),
            ("LOG_RETENTION_DAYS", "3"),
        ]))
        .unwrap();
        assert_eq!(cfg.log_file, Some(PathBuf::from("logs/relay.log")));
        let sink = cfg.log_sink().unwrap();
        assert_eq!(sink.dir, PathBuf::from("logs"));
        assert_eq!(sink.stem, "relay");
        assert_eq!(sink.max_files, 3);
    }

    #[test]
    fn log_file_can_be_disabled() {
        let cfg = Config::from_lookup(lookup_from(&[("TELEGRAM_TOKEN", "t"), ("LOG_FILE", "off")]))
            .unwrap();
        assert_eq!(cfg.log_file, None);
        assert!(cfg.log_sink().is_none());
    }

    #[test]
    fn dotenv_strips_quotes_and_comments() {
        let parsed = parse_dotenv("# c\nA=1\nB=\"two words\"\n\nC='x'\nnoequals\n");
        assert_eq!(
            parsed,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "two words".to_string()),
                ("C".to_string(), "x".to_string()),
            ]
        );
    }
}
