//! Configuration for the Telegram API, the collector and the bot
//!
//! Loads configuration from config.yml, with `.env` and environment
//! variables layered on top.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::calendar::{default_zone, Rollover, Zone};
use crate::error::{Error, Result};

/// Default constants (fallback if config.yml not found)
pub const CONFIG_FILE: &str = "config.yml";
pub const SESSION_NAME: &str = "collector_session";
pub const OUTPUT_DIR: &str = "Collected_messages";
pub const PAGE_SIZE: usize = 100;
pub const MAX_PAGE_SIZE: usize = 100;
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;
pub const TOKEN_FILE: &str = "bot_token.txt";
pub const BOT_LOG_FILE: &str = "bot.log";
pub const SELF_DELETE_AFTER_SECS: u64 = 30;
pub const RETENTION_DAYS: u32 = 30;
pub const CLEANUP_INTERVAL_HOURS: u64 = 24;

/// Chat entity types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEntity {
    /// Channel or supergroup by ID (without the -100 prefix)
    Channel(i64),
    /// Basic group chat by ID
    Chat(i64),
    /// Public username (without @)
    Username(String),
    /// User by ID
    UserId(i64),
    /// Private invite link hash
    Invite(String),
}

impl ChatEntity {
    /// Username entity, with a leading `@` removed.
    pub fn username(name: &str) -> Self {
        let name = name.strip_prefix('@').unwrap_or(name);
        ChatEntity::Username(name.to_string())
    }
}

/// YAML config structures
#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    telegram: Option<TelegramConfig>,
    collector: Option<CollectorYaml>,
    chats: Option<HashMap<String, ChatConfig>>,
    bot: Option<BotYaml>,
    ocr: Option<OcrYaml>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramConfig {
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    api_id: Option<String>,
    api_hash: Option<String>,
    phone: Option<String>,
    session_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CollectorYaml {
    output_dir: Option<PathBuf>,
    /// IANA zone name, e.g. "Europe/Moscow".
    timezone: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    utc_offset: Option<String>,
    page_size: Option<usize>,
    rollover: Option<String>,
    max_file_size: Option<u64>,
    range_file_prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatConfig {
    #[serde(rename = "type")]
    chat_type: String,
    id: Option<i64>,
    username: Option<String>,
    link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BotYaml {
    token: Option<String>,
    token_file: Option<PathBuf>,
    log_file: Option<PathBuf>,
    max_log_size: Option<u64>,
    self_delete_after_secs: Option<u64>,
    delete_commands: Option<bool>,
    report: Option<ReportYaml>,
    retention_days: Option<u32>,
    cleanup_interval_hours: Option<u64>,
    allowed_users: Option<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
struct ReportYaml {
    chat_id: i64,
    time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrYaml {
    enabled: Option<bool>,
    backend: Option<String>,
    languages: Option<String>,
    tesseract_bin: Option<String>,
    gemini_model: Option<String>,
}

/// Deserialize a value that can be either a string or a number
fn deserialize_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<serde_yaml::Value> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {:?}",
            other
        ))),
    }
}

/// Collector output settings.
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub output_dir: PathBuf,
    pub timezone: Zone,
    pub page_size: usize,
    pub rollover: Rollover,
    /// Rotate to a new part once a file reaches this many bytes (0 = never).
    pub max_file_size: u64,
    pub range_file_prefix: String,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(OUTPUT_DIR),
            timezone: default_zone(),
            page_size: PAGE_SIZE,
            rollover: Rollover::Daily,
            max_file_size: MAX_FILE_SIZE,
            range_file_prefix: "messages".to_string(),
        }
    }
}

/// Daily report delivery target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSettings {
    pub chat_id: i64,
    pub hour: u32,
    pub minute: u32,
}

/// Bot mode settings.
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub token: Option<String>,
    pub token_file: PathBuf,
    pub log_file: PathBuf,
    pub max_log_size: u64,
    pub self_delete_after_secs: u64,
    pub delete_commands: bool,
    pub report: Option<ReportSettings>,
    pub retention_days: u32,
    pub cleanup_interval_hours: u64,
    pub allowed_users: Vec<i64>,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            token: None,
            token_file: PathBuf::from(TOKEN_FILE),
            log_file: PathBuf::from(BOT_LOG_FILE),
            max_log_size: MAX_FILE_SIZE,
            self_delete_after_secs: SELF_DELETE_AFTER_SECS,
            delete_commands: false,
            report: None,
            retention_days: RETENTION_DAYS,
            cleanup_interval_hours: CLEANUP_INTERVAL_HOURS,
            allowed_users: Vec::new(),
        }
    }
}

impl BotSettings {
    /// Bot token from config/env, falling back to the token file.
    pub fn resolve_token(&self) -> Result<String> {
        if let Some(token) = self.token.as_deref().map(str::trim) {
            if !token.is_empty() {
                return Ok(token.to_string());
            }
        }

        if !self.token_file.exists() {
            return Err(Error::ConfigError(format!(
                "bot token file not found: {}",
                self.token_file.display()
            )));
        }

        let token = fs::read_to_string(&self.token_file)?.trim().to_string();
        if token.is_empty() {
            return Err(Error::ConfigError("bot token must not be empty".to_string()));
        }
        Ok(token)
    }

    pub fn is_allowed(&self, user_id: i64) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.contains(&user_id)
    }
}

/// Which OCR engine to run on image attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OcrBackendKind {
    #[default]
    Tesseract,
    Gemini,
}

#[derive(Debug, Clone)]
pub struct OcrSettings {
    pub enabled: bool,
    pub backend: OcrBackendKind,
    pub languages: String,
    pub tesseract_bin: String,
    pub gemini_model: String,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: OcrBackendKind::Tesseract,
            languages: "rus+eng".to_string(),
            tesseract_bin: "tesseract".to_string(),
            gemini_model: "gemini-2.0-flash".to_string(),
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    pub phone: String,
    pub api_id: i32,
    pub api_hash: String,
    pub session_name: String,
    pub chats: HashMap<String, ChatEntity>,
    pub collector: CollectorSettings,
    pub bot: BotSettings,
    pub ocr: OcrSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Load configuration from config.yml or use defaults
    /// Environment variables take precedence over config.yml string values
    pub fn new() -> Self {
        Self::load_from_file(CONFIG_FILE)
            .or_else(|_| Self::load_from_file(Path::new("..").join(CONFIG_FILE)))
            .unwrap_or_else(|_| Self::defaults())
    }

    /// Load from an explicit path, or fall back to [`Config::new`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::new()),
        }
    }

    pub fn session_file(&self) -> String {
        format!("{}.session", self.session_name)
    }

    pub fn lock_file(&self) -> String {
        format!("{}.lock", self.session_name)
    }

    /// Resolve a value: prefer env var if config value looks like ${VAR}
    fn resolve_env_string(value: Option<String>, env_key: &str) -> String {
        if let Some(var_name) = value.as_deref().and_then(placeholder_name) {
            if let Ok(env_val) = std::env::var(var_name) {
                return env_val;
            }
        }
        if let Ok(env_val) = std::env::var(env_key) {
            return env_val;
        }
        value
            .filter(|v| placeholder_name(v).is_none())
            .unwrap_or_default()
    }

    /// Resolve an integer value from string config or env var
    fn resolve_env_i32(value: Option<String>, env_key: &str) -> i32 {
        if let Some(ref v) = value {
            if let Some(var_name) = placeholder_name(v) {
                if let Some(parsed) = std::env::var(var_name).ok().and_then(|s| s.parse().ok()) {
                    return parsed;
                }
            }
            if let Ok(parsed) = v.parse::<i32>() {
                return parsed;
            }
        }
        std::env::var(env_key)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    /// Load .env file into environment variables using dotenvy
    fn load_dotenv() {
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_dotenv();

        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigError(format!(
                "failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Build configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let yaml: YamlConfig = if content.trim().is_empty() {
            YamlConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };

        let telegram = yaml.telegram.unwrap_or_default();
        let collector_yaml = yaml.collector.unwrap_or_default();
        let bot_yaml = yaml.bot.unwrap_or_default();
        let ocr_yaml = yaml.ocr.unwrap_or_default();

        let chats = yaml
            .chats
            .map(|chats| {
                chats
                    .into_iter()
                    .filter_map(|(name, chat)| chat_entity(chat).map(|entity| (name, entity)))
                    .collect()
            })
            .unwrap_or_default();

        let defaults = CollectorSettings::default();
        // `timezone` wins over `utc_offset`; either may hold a name or an offset.
        let timezone = match collector_yaml
            .timezone
            .as_deref()
            .or(collector_yaml.utc_offset.as_deref())
        {
            Some(raw) => Zone::parse(raw)?,
            None => defaults.timezone,
        };
        let rollover = match collector_yaml.rollover.as_deref() {
            Some(raw) => Rollover::parse(raw)
                .ok_or_else(|| Error::ConfigError(format!("unknown rollover '{}'", raw)))?,
            None => Rollover::Daily,
        };
        let collector = CollectorSettings {
            output_dir: collector_yaml.output_dir.unwrap_or(defaults.output_dir),
            timezone,
            page_size: collector_yaml
                .page_size
                .unwrap_or(PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
            rollover,
            max_file_size: collector_yaml.max_file_size.unwrap_or(MAX_FILE_SIZE),
            range_file_prefix: collector_yaml
                .range_file_prefix
                .unwrap_or(defaults.range_file_prefix),
        };

        let bot_defaults = BotSettings::default();
        let token = Self::resolve_env_string(bot_yaml.token, "COLLECTOR_BOT_TOKEN");
        let report = bot_yaml.report.map(report_settings).transpose()?;
        let bot = BotSettings {
            token: (!token.is_empty()).then_some(token),
            token_file: bot_yaml.token_file.unwrap_or(bot_defaults.token_file),
            log_file: bot_yaml.log_file.unwrap_or(bot_defaults.log_file),
            max_log_size: bot_yaml.max_log_size.unwrap_or(bot_defaults.max_log_size),
            self_delete_after_secs: bot_yaml
                .self_delete_after_secs
                .unwrap_or(bot_defaults.self_delete_after_secs),
            delete_commands: bot_yaml.delete_commands.unwrap_or(false),
            report,
            retention_days: bot_yaml.retention_days.unwrap_or(bot_defaults.retention_days),
            cleanup_interval_hours: bot_yaml
                .cleanup_interval_hours
                .unwrap_or(bot_defaults.cleanup_interval_hours)
                .max(1),
            allowed_users: bot_yaml.allowed_users.unwrap_or_default(),
        };

        let ocr_defaults = OcrSettings::default();
        let backend = match ocr_yaml.backend.as_deref().map(str::to_lowercase).as_deref() {
            None | Some("tesseract") => OcrBackendKind::Tesseract,
            Some("gemini") => OcrBackendKind::Gemini,
            Some(other) => {
                return Err(Error::ConfigError(format!("unknown OCR backend '{}'", other)))
            }
        };
        let ocr = OcrSettings {
            enabled: ocr_yaml.enabled.unwrap_or(false),
            backend,
            languages: ocr_yaml.languages.unwrap_or(ocr_defaults.languages),
            tesseract_bin: ocr_yaml.tesseract_bin.unwrap_or(ocr_defaults.tesseract_bin),
            gemini_model: ocr_yaml.gemini_model.unwrap_or(ocr_defaults.gemini_model),
        };

        Ok(Self {
            phone: Self::resolve_env_string(telegram.phone, "TELEGRAM_PHONE"),
            api_id: Self::resolve_env_i32(telegram.api_id, "TELEGRAM_API_ID"),
            api_hash: Self::resolve_env_string(telegram.api_hash, "TELEGRAM_API_HASH"),
            session_name: telegram
                .session_name
                .unwrap_or_else(|| SESSION_NAME.to_string()),
            chats,
            collector,
            bot,
            ocr,
        })
    }

    /// Create config with empty defaults (fallback)
    fn defaults() -> Self {
        Self {
            phone: std::env::var("TELEGRAM_PHONE").unwrap_or_default(),
            api_id: std::env::var("TELEGRAM_API_ID")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            api_hash: std::env::var("TELEGRAM_API_HASH").unwrap_or_default(),
            session_name: SESSION_NAME.to_string(),
            chats: HashMap::new(),
            collector: CollectorSettings::default(),
            bot: BotSettings {
                token: std::env::var("COLLECTOR_BOT_TOKEN").ok(),
                ..BotSettings::default()
            },
            ocr: OcrSettings::default(),
        }
    }

    /// Get chat entity by name
    pub fn get_chat(&self, name: &str) -> Option<&ChatEntity> {
        self.chats.get(name)
    }

    /// Fail early when user-mode credentials are missing.
    pub fn require_api_credentials(&self) -> Result<()> {
        if self.api_id == 0 || self.api_hash.is_empty() {
            return Err(Error::ConfigError(
                "telegram.api_id and telegram.api_hash must be set (config.yml or TELEGRAM_API_ID/TELEGRAM_API_HASH)"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// `${VAR}` → `VAR`
fn placeholder_name(value: &str) -> Option<&str> {
    value
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
}

fn chat_entity(chat: ChatConfig) -> Option<ChatEntity> {
    match chat.chat_type.as_str() {
        "channel" => chat.id.map(ChatEntity::Channel),
        "group" => chat.id.map(ChatEntity::Chat),
        "user" => chat.id.map(ChatEntity::UserId),
        "username" => chat.username.map(|u| ChatEntity::username(&u)),
        "invite" => chat
            .link
            .as_deref()
            .and_then(crate::chat::invite_hash)
            .map(ChatEntity::Invite),
        _ => None,
    }
}

fn report_settings(report: ReportYaml) -> Result<ReportSettings> {
    let time = report.time.unwrap_or_else(|| "09:00".to_string());
    let (hour, minute) = parse_hh_mm(&time)
        .ok_or_else(|| Error::ConfigError(format!("invalid report time '{}'", time)))?;
    Ok(ReportSettings {
        chat_id: report.chat_id,
        hour,
        minute,
    })
}

/// Parse "HH:MM" into a valid hour and minute.
pub fn parse_hh_mm(value: &str) -> Option<(u32, u32)> {
    let (h, m) = value.trim().split_once(':')?;
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    (hour < 24 && minute < 60).then_some((hour, minute))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{LazyLock, Mutex};

    static ENV_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

    struct EnvGuard {
        key: String,
        original: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let original = std::env::var(key).ok();
            std::env::set_var(key, value);
            Self {
                key: key.to_string(),
                original,
            }
        }

        fn unset(key: &str) -> Self {
            let original = std::env::var(key).ok();
            std::env::remove_var(key);
            Self {
                key: key.to_string(),
                original,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.original {
                Some(value) => std::env::set_var(&self.key, value),
                None => std::env::remove_var(&self.key),
            }
        }
    }

    #[test]
    fn empty_yaml_gives_defaults() {
        let config = Config::from_yaml("").unwrap();
        assert_eq!(config.session_name, SESSION_NAME);
        assert_eq!(config.collector.page_size, PAGE_SIZE);
        assert_eq!(config.collector.rollover, Rollover::Daily);
        assert_eq!(config.collector.timezone, default_zone());
        assert_eq!(config.collector.output_dir, PathBuf::from(OUTPUT_DIR));
        assert_eq!(config.bot.self_delete_after_secs, SELF_DELETE_AFTER_SECS);
        assert!(config.bot.report.is_none());
        assert!(!config.ocr.enabled);
    }

    #[test]
    fn session_paths_follow_session_name() {
        let config = Config::from_yaml("telegram:\n  session_name: work\n").unwrap();
        assert_eq!(config.session_file(), "work.session");
        assert_eq!(config.lock_file(), "work.lock");
    }

    #[test]
    fn parses_collector_section() {
        let yaml = r#"
collector:
  output_dir: "/tmp/collected"
  utc_offset: "+05:00"
  page_size: 500
  rollover: monthly
  max_file_size: 1024
  range_file_prefix: report
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.collector.output_dir, PathBuf::from("/tmp/collected"));
        assert_eq!(
            config.collector.timezone,
            Zone::Fixed(chrono::FixedOffset::east_opt(5 * 3600).unwrap())
        );
        assert_eq!(config.collector.page_size, MAX_PAGE_SIZE);
        assert_eq!(config.collector.rollover, Rollover::Monthly);
        assert_eq!(config.collector.max_file_size, 1024);
        assert_eq!(config.collector.range_file_prefix, "report");
    }

    #[test]
    fn timezone_name_wins_over_offset() {
        let yaml = "collector:\n  timezone: Europe/Kyiv\n  utc_offset: \"+05:00\"\n";
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.collector.timezone, Zone::Named(chrono_tz::Europe::Kyiv));

        let config = Config::from_yaml("collector:\n  utc_offset: America/New_York\n").unwrap();
        assert_eq!(config.collector.timezone, Zone::Named(chrono_tz::America::New_York));

        assert!(Config::from_yaml("collector:\n  timezone: Europe/Atlantis\n").is_err());
    }

    #[test]
    fn rejects_unknown_rollover() {
        let err = Config::from_yaml("collector:\n  rollover: hourly\n").unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn parses_bot_section_with_report() {
        let yaml = r#"
bot:
  token: "123:abc"
  self_delete_after_secs: 0
  delete_commands: true
  retention_days: 7
  cleanup_interval_hours: 0
  allowed_users: [1, 2]
  report:
    chat_id: -1001
    time: "08:30"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.bot.token.as_deref(), Some("123:abc"));
        assert_eq!(config.bot.self_delete_after_secs, 0);
        assert!(config.bot.delete_commands);
        assert_eq!(config.bot.retention_days, 7);
        assert_eq!(config.bot.cleanup_interval_hours, 1);
        assert!(config.bot.is_allowed(2));
        assert!(!config.bot.is_allowed(3));
        assert_eq!(
            config.bot.report,
            Some(ReportSettings {
                chat_id: -1001,
                hour: 8,
                minute: 30
            })
        );
    }

    #[test]
    fn rejects_invalid_report_time() {
        let yaml = "bot:\n  report:\n    chat_id: 1\n    time: \"25:00\"\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn parses_ocr_section() {
        let yaml = "ocr:\n  enabled: true\n  backend: Gemini\n  languages: eng\n";
        let config = Config::from_yaml(yaml).unwrap();
        assert!(config.ocr.enabled);
        assert_eq!(config.ocr.backend, OcrBackendKind::Gemini);
        assert_eq!(config.ocr.languages, "eng");
        assert!(Config::from_yaml("ocr:\n  backend: abbyy\n").is_err());
    }

    #[test]
    fn parses_chat_aliases_and_skips_invalid() {
        let yaml = r#"
chats:
  news:
    type: channel
    id: 123
  friends:
    type: group
    id: 456
  public:
    type: username
    username: "@public_chat"
  private:
    type: invite
    link: "https://t.me/joinchat/AbCdEf123"
  missing_id:
    type: channel
  unknown_type:
    type: random
    id: 999
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.chats.len(), 4);
        assert_eq!(config.get_chat("news"), Some(&ChatEntity::Channel(123)));
        assert_eq!(config.get_chat("friends"), Some(&ChatEntity::Chat(456)));
        assert_eq!(
            config.get_chat("public"),
            Some(&ChatEntity::Username("public_chat".into()))
        );
        assert_eq!(
            config.get_chat("private"),
            Some(&ChatEntity::Invite("AbCdEf123".into()))
        );
        assert!(config.get_chat("missing_id").is_none());
    }

    #[test]
    fn env_placeholders_are_resolved_from_environment() {
        let _lock = ENV_LOCK.lock().unwrap();
        let yaml = r#"
telegram:
  api_id: "${COLLECTOR_TEST_API_ID}"
  api_hash: "${COLLECTOR_TEST_API_HASH}"
"#;
        let _guards = [
            EnvGuard::set("COLLECTOR_TEST_API_ID", "4242"),
            EnvGuard::set("COLLECTOR_TEST_API_HASH", "hash_from_env"),
            EnvGuard::unset("TELEGRAM_API_HASH"),
        ];

        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.api_id, 4242);
        assert_eq!(config.api_hash, "hash_from_env");
    }

    #[test]
    fn unresolved_placeholder_is_not_used_as_value() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guards = [
            EnvGuard::unset("COLLECTOR_MISSING_VAR"),
            EnvGuard::unset("TELEGRAM_PHONE"),
        ];
        let config = Config::from_yaml("telegram:\n  phone: \"${COLLECTOR_MISSING_VAR}\"\n").unwrap();
        assert_eq!(config.phone, "");
    }

    #[test]
    fn env_does_not_override_numeric_yaml_values() {
        let _lock = ENV_LOCK.lock().unwrap();
        let yaml = r#"
telegram:
  api_id: 321
  phone: "from_yaml"
"#;
        let _guards = [
            EnvGuard::set("TELEGRAM_API_ID", "9999"),
            EnvGuard::set("TELEGRAM_PHONE", "+8888"),
        ];

        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.api_id, 321);
        assert_eq!(config.phone, "+8888");
    }

    #[test]
    fn require_api_credentials_reports_missing_values() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guards = [
            EnvGuard::unset("TELEGRAM_API_ID"),
            EnvGuard::unset("TELEGRAM_API_HASH"),
        ];
        let config = Config::from_yaml("").unwrap();
        assert!(config.require_api_credentials().is_err());

        let config = Config::from_yaml("telegram:\n  api_id: 1\n  api_hash: h\n").unwrap();
        assert!(config.require_api_credentials().is_ok());
    }

    #[test]
    fn resolve_token_prefers_inline_then_file() {
        let temp = tempfile::tempdir().unwrap();
        let token_file = temp.path().join("bot_token.txt");

        let mut bot = BotSettings {
            token_file: token_file.clone(),
            ..BotSettings::default()
        };
        assert!(bot.resolve_token().is_err());

        std::fs::write(&token_file, "   \n").unwrap();
        assert!(bot.resolve_token().is_err());

        std::fs::write(&token_file, " 42:from_file \n").unwrap();
        assert_eq!(bot.resolve_token().unwrap(), "42:from_file");

        bot.token = Some("7:inline".to_string());
        assert_eq!(bot.resolve_token().unwrap(), "7:inline");
    }

    #[test]
    fn parse_hh_mm_validates() {
        assert_eq!(parse_hh_mm("09:05"), Some((9, 5)));
        assert_eq!(parse_hh_mm("23:59"), Some((23, 59)));
        assert_eq!(parse_hh_mm("24:00"), None);
        assert_eq!(parse_hh_mm("9"), None);
    }

    #[test]
    fn load_from_file_fails_on_missing_file() {
        let result = Config::load_from_file("/nonexistent/path/config.yml");
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn load_from_file_fails_on_invalid_yaml() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.yml");
        std::fs::write(&path, "{ invalid yaml [").unwrap();
        assert!(Config::load_from_file(&path).is_err());
    }

    #[test]
    fn username_entity_drops_at_sign() {
        assert_eq!(ChatEntity::username("@test"), ChatEntity::Username("test".into()));
        assert_eq!(ChatEntity::username("plain"), ChatEntity::Username("plain".into()));
    }
}
