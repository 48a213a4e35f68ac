//! Server configuration.
//!
//! Everything is read from `TCG_*` environment variables (a `.env` file is loaded first if present). Invalid values are
//! logged and replaced with the default; the server never refuses to start because of a typo in a tuning knob.
use std::{env, fmt::Display, str::FromStr};

use checkout_engine::{db_types::Cents, CheckoutPolicy};
use chrono::Duration;
use log::*;
use tcg_common::{helpers::parse_boolean_flag, Secret};

const DEFAULT_TCG_HOST: &str = "127.0.0.1";
const DEFAULT_TCG_PORT: u16 = 8370;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/checkout.db";
const DEFAULT_HOLD_DURATION_MINUTES: i64 = 15;
const DEFAULT_REAPER_INTERVAL_SECS: u64 = 30;
const DEFAULT_SERVICE_FEE_BPS: u32 = 1_000;
const DEFAULT_FACILITY_FEE_CENTS: i64 = 250;
const DEFAULT_TAX_RATE_BPS: u32 = 825;
const DEFAULT_MAX_TICKETS_PER_LINE: u32 = 10;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Hold duration, fees, tax and per-line limits for every checkout.
    pub policy: CheckoutPolicy,
    /// How often the expiry worker runs a reaper pass.
    pub reaper_interval: std::time::Duration,
    pub payment_webhook: PaymentWebhookConfig,
}

#[derive(Clone, Debug)]
pub struct PaymentWebhookConfig {
    /// Shared secret for the HMAC-SHA256 signature on payment confirmations.
    pub hmac_secret: Secret<String>,
    /// If false, payment confirmations are accepted without a signature. **DANGER**
    pub hmac_checks: bool,
}

impl Default for PaymentWebhookConfig {
    fn default() -> Self {
        Self { hmac_secret: Secret::default(), hmac_checks: true }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_TCG_HOST.to_string(),
            port: DEFAULT_TCG_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            policy: CheckoutPolicy::default(),
            reaper_interval: std::time::Duration::from_secs(DEFAULT_REAPER_INTERVAL_SECS),
            payment_webhook: PaymentWebhookConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("TCG_HOST").ok().unwrap_or_else(|| DEFAULT_TCG_HOST.into());
        let port = env_or_default("TCG_PORT", DEFAULT_TCG_PORT);
        let database_url = env::var("TCG_DATABASE_URL").ok().unwrap_or_else(|| {
            info!("🪛️ TCG_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}");
            DEFAULT_DATABASE_URL.to_string()
        });
        let policy = policy_from_env();
        let reaper_interval = match env_or_default("TCG_REAPER_INTERVAL_SECS", DEFAULT_REAPER_INTERVAL_SECS) {
            0 => {
                warn!("🪛️ TCG_REAPER_INTERVAL_SECS cannot be zero. Using {DEFAULT_REAPER_INTERVAL_SECS}s.");
                DEFAULT_REAPER_INTERVAL_SECS
            },
            secs => secs,
        };
        let payment_webhook = PaymentWebhookConfig::from_env_or_default();
        Self {
            host,
            port,
            database_url,
            policy,
            reaper_interval: std::time::Duration::from_secs(reaper_interval),
            payment_webhook,
        }
    }
}

impl PaymentWebhookConfig {
    pub fn from_env_or_default() -> Self {
        let hmac_checks = parse_boolean_flag(env::var("TCG_PAYMENT_HMAC_CHECKS").ok(), true);
        let hmac_secret = env::var("TCG_PAYMENT_WEBHOOK_SECRET").ok().unwrap_or_else(|| {
            if hmac_checks {
                error!(
                    "🪛️ TCG_PAYMENT_WEBHOOK_SECRET is not set. Payment confirmations will be rejected until it is \
                     set to the signing key shared with the payment provider."
                );
            }
            String::default()
        });
        if !hmac_checks {
            warn!("🚨️ Payment webhook HMAC checks are DISABLED. Anyone can mark orders as paid. 🚨️");
        }
        Self { hmac_secret: Secret::new(hmac_secret), hmac_checks }
    }
}

fn policy_from_env() -> CheckoutPolicy {
    let hold_minutes = match env_or_default("TCG_HOLD_DURATION_MINUTES", DEFAULT_HOLD_DURATION_MINUTES) {
        m if m > 0 => m,
        m => {
            warn!("🪛️ TCG_HOLD_DURATION_MINUTES must be positive, but was {m}. Using {DEFAULT_HOLD_DURATION_MINUTES}.");
            DEFAULT_HOLD_DURATION_MINUTES
        },
    };
    let facility_fee = match env_or_default("TCG_FACILITY_FEE_CENTS", DEFAULT_FACILITY_FEE_CENTS) {
        c if c >= 0 => c,
        c => {
            warn!("🪛️ TCG_FACILITY_FEE_CENTS cannot be negative, but was {c}. Using {DEFAULT_FACILITY_FEE_CENTS}.");
            DEFAULT_FACILITY_FEE_CENTS
        },
    };
    CheckoutPolicy {
        hold_duration: Duration::minutes(hold_minutes),
        service_fee_bps: env_or_default("TCG_SERVICE_FEE_BPS", DEFAULT_SERVICE_FEE_BPS),
        facility_fee_per_ticket: Cents::from(facility_fee),
        tax_rate_bps: env_or_default("TCG_TAX_RATE_BPS", DEFAULT_TAX_RATE_BPS),
        max_tickets_per_line: env_or_default("TCG_MAX_TICKETS_PER_LINE", DEFAULT_MAX_TICKETS_PER_LINE),
    }
}

fn env_or_default<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    parse_or_default(name, env::var(name).ok(), default)
}

fn parse_or_default<T>(name: &str, value: Option<String>, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match value {
        None => {
            debug!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
        Some(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
    }
}
