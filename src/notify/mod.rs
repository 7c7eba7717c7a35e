// Outbound operator notifications: Telegram, Discord, log fallback
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Credentials, SymbolConfig};
use crate::models::{Side, StrategyKind};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Per-symbol line of the startup summary
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolRisk {
    pub symbol: String,
    pub leverage: u32,
    pub risk_percent: f64,
    pub strategy: StrategyKind,
}

impl SymbolRisk {
    pub fn new(symbol: &str, config: &SymbolConfig) -> Self {
        Self {
            symbol: symbol.to_string(),
            leverage: config.leverage,
            risk_percent: config.risk_percent,
            strategy: config.strategy,
        }
    }
}

/// Events pushed to the operator
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    PositionOpened {
        symbol: String,
        side: Side,
        quantity: f64,
        entry_price: f64,
        stop_loss: f64,
        take_profit: Option<f64>,
    },
    StopUpdated {
        symbol: String,
        side: Side,
        previous: Option<f64>,
        stop_loss: f64,
    },
    PositionClosed {
        symbol: String,
        side: Side,
        /// (quote-currency PnL, percent), absent when no exit price was available
        pnl: Option<(f64, f64)>,
    },
    PositionAdopted {
        symbol: String,
        side: Side,
        quantity: f64,
        entry_price: f64,
    },
    StartupSummary {
        total_balance: f64,
        available_margin: f64,
        symbols: Vec<SymbolRisk>,
    },
    Alert {
        symbol: Option<String>,
        message: String,
    },
}

impl Notification {
    pub fn alert(symbol: &str, message: impl Into<String>) -> Self {
        Notification::Alert {
            symbol: Some(symbol.to_string()),
            message: message.into(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::PositionOpened {
                symbol,
                side,
                quantity,
                entry_price,
                stop_loss,
                take_profit,
            } => {
                write!(
                    f,
                    "🚀 {} {} opened: qty {} @ {:.4}, stop {:.4}",
                    symbol, side, quantity, entry_price, stop_loss
                )?;
                if let Some(tp) = take_profit {
                    write!(f, ", take profit {:.4}", tp)?;
                }
                Ok(())
            }
            Notification::StopUpdated {
                symbol,
                side,
                previous,
                stop_loss,
            } => match previous {
                Some(prev) => write!(
                    f,
                    "🔁 {} {} stop moved {:.4} → {:.4}",
                    symbol, side, prev, stop_loss
                ),
                None => write!(f, "🔁 {} {} stop placed at {:.4}", symbol, side, stop_loss),
            },
            Notification::PositionClosed { symbol, side, pnl } => match pnl {
                Some((pnl, pct)) if *pnl > 0.0 => write!(
                    f,
                    "✅ {} {} closed with profit: {:.2} USDT ({:.2}%)",
                    symbol, side, pnl, pct
                ),
                Some((pnl, pct)) => write!(
                    f,
                    "🔻 {} {} closed with loss: {:.2} USDT ({:.2}%)",
                    symbol, side, pnl, pct
                ),
                None => write!(f, "⚪ {} {} closed (PnL unavailable)", symbol, side),
            },
            Notification::PositionAdopted {
                symbol,
                side,
                quantity,
                entry_price,
            } => write!(
                f,
                "📥 {} {} position found on exchange: qty {} @ {:.4}, stop will be re-derived",
                symbol, side, quantity, entry_price
            ),
            Notification::StartupSummary {
                total_balance,
                available_margin,
                symbols,
            } => {
                writeln!(f, "🤖 Bot started")?;
                writeln!(f, "Total balance: {:.2} USDT", total_balance)?;
                writeln!(f, "Available margin: {:.2} USDT", available_margin)?;
                let mut total_risk = 0.0;
                for s in symbols {
                    let risk = available_margin * s.risk_percent;
                    total_risk += risk;
                    writeln!(
                        f,
                        "• {} ({}): leverage {}x, risk {:.1}% = {:.2} USDT",
                        s.symbol,
                        s.strategy,
                        s.leverage,
                        s.risk_percent * 100.0,
                        risk
                    )?;
                }
                write!(f, "Total risk per operation: {:.2} USDT", total_risk)
            }
            Notification::Alert { symbol, message } => match symbol {
                Some(symbol) => write!(f, "🚨 {}: {}", symbol, message),
                None => write!(f, "🚨 {}", message),
            },
        }
    }
}

/// Operator-facing channel
///
/// Delivery is best effort: failures are logged and never reach the caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str);

    async fn notify(&self, event: &Notification) {
        self.send(&event.to_string()).await;
    }
}

/// Writes notifications to the log only (no channel configured)
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) {
        tracing::info!("📣 {}", text);
    }
}

#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(client: Client, bot_token: String, chat_id: String) -> Self {
        Self::with_base_url(client, TELEGRAM_API_BASE, bot_token, chat_id)
    }

    pub fn with_base_url(client: Client, base_url: &str, bot_token: String, chat_id: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bot_token,
            chat_id,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        let body = json!({ "chat_id": self.chat_id, "text": text });
        match self.client.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => tracing::warn!("⚠️  Telegram rejected message: HTTP {}", resp.status()),
            Err(e) => tracing::warn!("⚠️  Telegram delivery failed: {}", e),
        }
    }
}

#[derive(Clone)]
pub struct DiscordNotifier {
    client: Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(client: Client, webhook_url: String) -> Self {
        Self { client, webhook_url }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, text: &str) {
        let body = json!({ "content": text });
        match self.client.post(&self.webhook_url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => tracing::warn!("⚠️  Discord rejected message: HTTP {}", resp.status()),
            Err(e) => tracing::warn!("⚠️  Discord delivery failed: {}", e),
        }
    }
}

/// Sends every message to all configured channels
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    channels: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(channels: Vec<Arc<dyn Notifier>>) -> Self {
        Self { channels }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn send(&self, text: &str) {
        tracing::info!("📣 {}", text);
        for channel in &self.channels {
            channel.send(text).await;
        }
    }
}

/// Build the notifier from credentials; falls back to log-only
pub fn from_credentials(credentials: &Credentials, timeout: Duration) -> Arc<dyn Notifier> {
    let client = match Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("⚠️  Failed to build notification HTTP client: {}", e);
            return Arc::new(LogNotifier);
        }
    };

    let mut channels: Vec<Arc<dyn Notifier>> = Vec::new();
    if let (Some(token), Some(chat_id)) = (
        credentials.telegram_bot_token.clone(),
        credentials.telegram_chat_id.clone(),
    ) {
        channels.push(Arc::new(TelegramNotifier::new(client.clone(), token, chat_id)));
    }
    if let Some(url) = credentials.discord_webhook_url.clone() {
        channels.push(Arc::new(DiscordNotifier::new(client, url)));
    }

    if channels.is_empty() {
        tracing::info!("No notification channel configured, notifications go to the log only");
        Arc::new(LogNotifier)
    } else {
        tracing::info!("📣 {} notification channel(s) configured", channels.len());
        Arc::new(FanoutNotifier::new(channels))
    }
}
