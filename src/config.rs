use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use crate::error::BotError;
use crate::models::{Direction, StrategyKind};
use crate::Result;

pub const DEFAULT_LEVERAGE: u32 = 10;
pub const DEFAULT_RISK_PERCENT: f64 = 0.05;
pub const DEFAULT_TAKE_PROFIT_PERCENT: f64 = 0.025;
const MAX_LEVERAGE: u32 = 125;

const BINANCE_FUTURES_URL: &str = "https://fapi.binance.com";

/// Validated trading parameters of one symbol, constant for the process lifetime
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolConfig {
    pub leverage: u32,
    /// Fraction of available margin committed per entry
    pub risk_percent: f64,
    pub direction: Direction,
    pub strategy: StrategyKind,
    /// Scalper only; ignored for turtle
    pub take_profit_percent: f64,
}

impl Default for SymbolConfig {
    fn default() -> Self {
        Self {
            leverage: DEFAULT_LEVERAGE,
            risk_percent: DEFAULT_RISK_PERCENT,
            direction: Direction::Both,
            strategy: StrategyKind::Scalper,
            take_profit_percent: DEFAULT_TAKE_PROFIT_PERCENT,
        }
    }
}

/// Symbol entry as written in the config file or `COIN_CONFIGS`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSymbolConfig {
    pub leverage: Option<i64>,
    pub risk_percent: Option<f64>,
    pub direction: Option<String>,
    pub strategy: Option<String>,
    pub take_profit_percent: Option<f64>,
}

impl RawSymbolConfig {
    /// Apply defaults and validate
    pub fn validate(self, symbol: &str) -> Result<SymbolConfig> {
        let err = |msg: String| BotError::Configuration(format!("{}: {}", symbol, msg));

        let leverage = match self.leverage {
            None => DEFAULT_LEVERAGE,
            Some(l) if (1..=MAX_LEVERAGE as i64).contains(&l) => l as u32,
            Some(l) => return Err(err(format!("leverage must be in 1..={}, got {}", MAX_LEVERAGE, l))),
        };

        let risk_percent = self.risk_percent.unwrap_or(DEFAULT_RISK_PERCENT);
        if !(risk_percent > 0.0 && risk_percent <= 1.0) {
            return Err(err(format!("risk_percent must be in (0, 1], got {}", risk_percent)));
        }

        let take_profit_percent = self.take_profit_percent.unwrap_or(DEFAULT_TAKE_PROFIT_PERCENT);
        if !(take_profit_percent > 0.0 && take_profit_percent < 1.0) {
            return Err(err(format!(
                "take_profit_percent must be in (0, 1), got {}",
                take_profit_percent
            )));
        }

        let direction = match self.direction.as_deref().map(str::to_ascii_uppercase).as_deref() {
            None | Some("BOTH") => Direction::Both,
            Some("LONG") => Direction::Long,
            Some("SHORT") => Direction::Short,
            Some(other) => return Err(err(format!("unknown direction '{}'", other))),
        };

        let strategy = match self.strategy.as_deref().map(str::to_ascii_uppercase).as_deref() {
            None | Some("SCALPER") => StrategyKind::Scalper,
            Some("TURTLE") => StrategyKind::Turtle,
            Some(other) => return Err(err(format!("unknown strategy '{}'", other))),
        };

        Ok(SymbolConfig {
            leverage,
            risk_percent,
            direction,
            strategy,
            take_profit_percent,
        })
    }
}

/// Symbol → configuration mapping, read-only after startup
#[derive(Debug, Clone)]
pub struct ConfigStore {
    symbols: BTreeMap<String, SymbolConfig>,
}

impl ConfigStore {
    /// Validate every raw entry; the first invalid symbol aborts startup
    pub fn from_raw(raw: BTreeMap<String, RawSymbolConfig>) -> Result<Self> {
        if raw.is_empty() {
            return Err(BotError::Configuration("no symbols configured".to_string()));
        }

        let mut symbols = BTreeMap::new();
        for (key, entry) in raw {
            // Table keys come back lowercased from the config crate
            let symbol = key.to_ascii_uppercase();
            validate_symbol_name(&symbol)?;
            let config = entry.validate(&symbol)?;
            if symbols.insert(symbol.clone(), config).is_some() {
                return Err(BotError::Configuration(format!(
                    "{} is configured more than once",
                    symbol
                )));
            }
        }
        Ok(Self { symbols })
    }

    /// Parse a `COIN_CONFIGS`-style JSON object: `{"BTCUSDT": {"leverage": 10, ...}}`
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| BotError::Configuration(format!("COIN_CONFIGS is not valid JSON: {}", e)))?;
        let object = value
            .as_object()
            .ok_or_else(|| BotError::Configuration("COIN_CONFIGS must be a JSON object".to_string()))?;

        let mut raw = BTreeMap::new();
        for (symbol, entry) in object {
            if !entry.is_object() {
                return Err(BotError::Configuration(format!(
                    "{}: entry must be an object",
                    symbol
                )));
            }
            let parsed: RawSymbolConfig = serde_json::from_value(entry.clone())
                .map_err(|e| BotError::Configuration(format!("{}: {}", symbol, e)))?;
            raw.insert(symbol.clone(), parsed);
        }
        Self::from_raw(raw)
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolConfig> {
        self.symbols.get(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SymbolConfig)> {
        self.symbols.iter().map(|(s, c)| (s.as_str(), c))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

fn validate_symbol_name(symbol: &str) -> Result<()> {
    let valid = !symbol.is_empty()
        && symbol
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if !valid {
        return Err(BotError::Configuration(format!(
            "invalid symbol name '{}' (expected e.g. BTCUSDT)",
            symbol
        )));
    }
    Ok(())
}

/// Cadences of the five periodic task kinds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub signal_check_secs: u64,
    pub trailing_stop_secs: u64,
    pub position_monitor_secs: u64,
    pub full_resync_secs: u64,
    pub orphan_cleanup_secs: u64,
    /// Upper bound for one symbol's unit of work within a tick
    pub tick_deadline_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            signal_check_secs: 180,
            trailing_stop_secs: 300,
            position_monitor_secs: 60,
            full_resync_secs: 300,
            orphan_cleanup_secs: 600,
            tick_deadline_secs: 120,
        }
    }
}

impl ScheduleConfig {
    pub fn tick_deadline(&self) -> Duration {
        Duration::from_secs(self.tick_deadline_secs.max(1))
    }
}

/// Process-level settings (everything except the symbol table)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rest_url: String,
    pub http_timeout_secs: u64,
    pub health_addr: String,
    pub log_file: String,
    pub schedule: ScheduleConfig,
    pub symbols: BTreeMap<String, RawSymbolConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rest_url: BINANCE_FUTURES_URL.to_string(),
            http_timeout_secs: 10,
            health_addr: "0.0.0.0:8080".to_string(),
            log_file: "logs.txt".to_string(),
            schedule: ScheduleConfig::default(),
            symbols: BTreeMap::new(),
        }
    }
}

/// Secrets and notification channels, from the environment only
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub discord_webhook_url: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self::from_map(&std::env::vars().collect())
    }

    pub fn from_map(env: &HashMap<String, String>) -> Self {
        let get = |key: &str| env.get(key).filter(|v| !v.trim().is_empty()).cloned();
        Self {
            api_key: get("BINANCE_API_KEY"),
            api_secret: get("BINANCE_API_SECRET"),
            telegram_bot_token: get("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: get("TELEGRAM_CHAT_ID"),
            discord_webhook_url: get("DISCORD_WEBHOOK_URL"),
        }
    }

    /// API key and secret, required for live trading
    pub fn trading_keys(&self) -> Result<(&str, &str)> {
        match (&self.api_key, &self.api_secret) {
            (Some(key), Some(secret)) => Ok((key, secret)),
            _ => Err(BotError::Configuration(
                "BINANCE_API_KEY and BINANCE_API_SECRET must be set".to_string(),
            )),
        }
    }
}

/// Fully loaded application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub settings: Settings,
    pub store: ConfigStore,
    pub credentials: Credentials,
}

impl AppConfig {
    /// Load settings from an optional TOML file and `MARGINBOT__*` environment
    /// variables; `COIN_CONFIGS` (JSON) replaces the file's symbol table
    pub fn load(path: &Path) -> Result<Self> {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("MARGINBOT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        let store = match std::env::var("COIN_CONFIGS") {
            Ok(json) if !json.trim().is_empty() => ConfigStore::from_json(&json)?,
            _ => ConfigStore::from_raw(settings.symbols.clone())?,
        };

        Ok(Self {
            settings,
            store,
            credentials: Credentials::from_env(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let store = ConfigStore::from_json(r#"{"BTCUSDT": {}}"#).unwrap();
        let config = store.get("BTCUSDT").unwrap();
        assert_eq!(*config, SymbolConfig::default());
        assert_eq!(config.leverage, 10);
        assert_eq!(config.risk_percent, 0.05);
        assert_eq!(config.direction, Direction::Both);
        assert_eq!(config.strategy, StrategyKind::Scalper);
        assert_eq!(config.take_profit_percent, 0.025);
    }

    #[test]
    fn test_explicit_fields_case_insensitive() {
        let store = ConfigStore::from_json(
            r#"{"ETHUSDT": {"leverage": 5, "risk_percent": 0.02, "direction": "long", "strategy": "turtle"}}"#,
        )
        .unwrap();
        let config = store.get("ETHUSDT").unwrap();
        assert_eq!(config.leverage, 5);
        assert_eq!(config.risk_percent, 0.02);
        assert_eq!(config.direction, Direction::Long);
        assert_eq!(config.strategy, StrategyKind::Turtle);
    }

    #[test]
    fn test_invalid_entries_fail_fast() {
        let cases = [
            r#"{}"#,
            r#"{"BTCUSDT": 5}"#,
            r#"{"BTCUSDT": {"leverage": 0}}"#,
            r#"{"BTCUSDT": {"risk_percent": 1.5}}"#,
            r#"{"BTCUSDT": {"direction": "SIDEWAYS"}}"#,
            r#"{"BTCUSDT": {"strategy": "grid"}}"#,
            r#"{"BTCUSDT": {"take_profit_percent": 0}}"#,
            r#"{"BTCUSDT": {"levrage": 3}}"#,
            r#"{"btc-usdt": {}}"#,
            r#"not json"#,
        ];
        for case in cases {
            let result = ConfigStore::from_json(case);
            assert!(
                matches!(result, Err(BotError::Configuration(_))),
                "expected configuration error for {}",
                case
            );
        }
    }

    #[test]
    fn test_symbols_are_ordered() {
        let store = ConfigStore::from_json(r#"{"SOLUSDT": {}, "BTCUSDT": {}, "ETHUSDT": {}}"#).unwrap();
        let symbols: Vec<&str> = store.symbols().collect();
        assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT", "SOLUSDT"]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_credentials_require_both_keys() {
        let mut env = HashMap::new();
        env.insert("BINANCE_API_KEY".to_string(), "key".to_string());
        let creds = Credentials::from_map(&env);
        assert!(creds.trading_keys().is_err());

        env.insert("BINANCE_API_SECRET".to_string(), "secret".to_string());
        let creds = Credentials::from_map(&env);
        assert_eq!(creds.trading_keys().unwrap(), ("key", "secret"));
    }

    #[test]
    fn test_table_keys_are_uppercased() {
        let mut raw = BTreeMap::new();
        raw.insert("btcusdt".to_string(), RawSymbolConfig::default());
        let store = ConfigStore::from_raw(raw).unwrap();
        assert_eq!(store.symbols().collect::<Vec<_>>(), vec!["BTCUSDT"]);

        let mut raw = BTreeMap::new();
        raw.insert("ethusdt".to_string(), RawSymbolConfig::default());
        raw.insert("ETHUSDT".to_string(), RawSymbolConfig::default());
        assert!(matches!(ConfigStore::from_raw(raw), Err(BotError::Configuration(_))));
    }

    #[test]
    fn test_sample_config_file_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/marginbot.toml");
        let config = AppConfig::load(&path).unwrap();

        assert_eq!(config.settings.schedule.position_monitor_secs, 60);
        let symbols: Vec<&str> = config.store.symbols().collect();
        assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT"]);

        let eth = config.store.get("ETHUSDT").unwrap();
        assert_eq!(eth.leverage, 5);
        assert_eq!(eth.direction, Direction::Long);
        assert_eq!(eth.strategy, StrategyKind::Turtle);
    }

    #[test]
    fn test_schedule_defaults() {
        let schedule = ScheduleConfig::default();
        assert_eq!(schedule.signal_check_secs, 180);
        assert_eq!(schedule.position_monitor_secs, 60);
        assert_eq!(schedule.tick_deadline(), Duration::from_secs(120));
    }
}
