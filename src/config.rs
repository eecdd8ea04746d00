use crate::communication::mesh::{format_node_num, parse_node_num};
use crate::hardware::DhtModel;
use crate::plugin::PollingConfig;
use log::{info, warn};

/// ESP32系で使用できるGPIO番号の上限（ESP32-S3はGPIO48まで）
pub const MAX_GPIO_PIN: i32 = 48;

/// アプリケーション設定
///
/// この構造体はビルド時に`cfg.toml`ファイルから読み込まれた設定を保持します。
#[toml_cfg::toml_config]
pub struct Config {
    #[default(true)]
    measurement_enabled: bool,

    #[default("DHT11")]
    dht_model: &'static str,

    #[default(13)]
    dht_gpio_pin: i32,

    #[default(1000)] // DHTは1Hzより速く読めない
    min_read_interval_ms: u32,

    #[default(5)]
    read_error_threshold: u32,

    #[default(3)]
    read_interval_multiplier: u32,

    #[default("broadcast")]
    destination: &'static str,

    #[default(true)]
    want_replies: bool,

    #[default(1)]
    esp_now_channel: u8,
}

/// 設定エラー
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("無効なDHTモデル: {0}")]
    InvalidDhtModel(String),
    #[error("無効な送信先ノード: {0}")]
    InvalidDestination(String),
    #[error("min_read_interval_ms は0にできません")]
    InvalidReadInterval,
    #[error("read_interval_multiplier は0にできません")]
    InvalidMultiplier,
    #[error("読み取り間隔が大きすぎます: {0}ms x {1}")]
    IntervalOverflow(u32, u32),
    #[error("無効なESP-NOWチャンネル (1-14): {0}")]
    InvalidChannel(u8),
    #[error("無効なGPIO番号 (0-48): {0}")]
    InvalidGpioPin(i32),
}

/// 検証済みのアプリケーション設定
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 測定タスクの設定
    pub polling: PollingConfig,

    /// DHTセンサーの種類
    pub dht_model: DhtModel,

    /// DHTデータ線のGPIO番号
    pub dht_gpio_pin: i32,

    /// ESP-NOWで使用するWiFiチャンネル
    pub esp_now_channel: u8,
}

impl AppConfig {
    /// 設定ファイルから設定をロードします
    pub fn load() -> Result<Self, ConfigError> {
        // toml_cfg によって生成された定数
        Self::from_config(&CONFIG)
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let dht_model: DhtModel = config
            .dht_model
            .parse()
            .map_err(|_| ConfigError::InvalidDhtModel(config.dht_model.to_string()))?;

        let destination = parse_node_num(config.destination)
            .ok_or_else(|| ConfigError::InvalidDestination(config.destination.to_string()))?;

        if config.min_read_interval_ms == 0 {
            return Err(ConfigError::InvalidReadInterval);
        }
        if config.read_interval_multiplier == 0 {
            return Err(ConfigError::InvalidMultiplier);
        }
        // 正常時の待ち時間は i32 のミリ秒で返すため、その範囲に収める
        let steady = config
            .min_read_interval_ms
            .checked_mul(config.read_interval_multiplier)
            .filter(|ms| *ms < i32::MAX as u32);
        if steady.is_none() {
            return Err(ConfigError::IntervalOverflow(
                config.min_read_interval_ms,
                config.read_interval_multiplier,
            ));
        }

        if !(0..=MAX_GPIO_PIN).contains(&config.dht_gpio_pin) {
            return Err(ConfigError::InvalidGpioPin(config.dht_gpio_pin));
        }

        if !(1..=14).contains(&config.esp_now_channel) {
            return Err(ConfigError::InvalidChannel(config.esp_now_channel));
        }

        let sample_interval_ms = dht_model.min_sample_interval().as_millis() as u32;
        if config.min_read_interval_ms < sample_interval_ms {
            warn!(
                "min_read_interval_ms ({}) is shorter than the {:?} sample interval ({}ms)",
                config.min_read_interval_ms, dht_model, sample_interval_ms
            );
        }

        let polling = PollingConfig {
            enabled: config.measurement_enabled,
            min_read_interval_ms: config.min_read_interval_ms,
            error_threshold: config.read_error_threshold,
            interval_multiplier: config.read_interval_multiplier,
            destination,
            want_replies: config.want_replies,
        };

        info!(
            "設定: enabled={}, model={:?}, gpio={}, interval={}ms x{}, threshold={}, dest={}",
            polling.enabled,
            dht_model,
            config.dht_gpio_pin,
            polling.min_read_interval_ms,
            polling.interval_multiplier,
            polling.error_threshold,
            format_node_num(polling.destination)
        );

        Ok(AppConfig {
            polling,
            dht_model,
            dht_gpio_pin: config.dht_gpio_pin,
            esp_now_channel: config.esp_now_channel,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::mesh::NODENUM_BROADCAST;

    fn base() -> Config {
        Config {
            measurement_enabled: true,
            dht_model: "DHT11",
            dht_gpio_pin: 13,
            min_read_interval_ms: 1000,
            read_error_threshold: 5,
            read_interval_multiplier: 3,
            destination: "broadcast",
            want_replies: true,
            esp_now_channel: 1,
        }
    }

    #[test]
    fn test_defaults_match_polling_defaults() {
        let app = AppConfig::from_config(&base()).unwrap();
        assert_eq!(app.polling, PollingConfig::default());
        assert_eq!(app.dht_model, DhtModel::Dht11);
        assert_eq!(app.dht_gpio_pin, 13);
    }

    #[test]
    fn test_unicast_destination() {
        let config = Config {
            destination: "!0a0b0c0d",
            want_replies: false,
            ..base()
        };
        let app = AppConfig::from_config(&config).unwrap();
        assert_eq!(app.polling.destination, 0x0a0b0c0d);
        assert!(!app.polling.want_replies);
        assert_ne!(app.polling.destination, NODENUM_BROADCAST);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            AppConfig::from_config(&Config { dht_model: "DHT99", ..base() }),
            Err(ConfigError::InvalidDhtModel(_))
        ));
        assert!(matches!(
            AppConfig::from_config(&Config { destination: "nowhere", ..base() }),
            Err(ConfigError::InvalidDestination(_))
        ));
        assert!(matches!(
            AppConfig::from_config(&Config { min_read_interval_ms: 0, ..base() }),
            Err(ConfigError::InvalidReadInterval)
        ));
        assert!(matches!(
            AppConfig::from_config(&Config { read_interval_multiplier: 0, ..base() }),
            Err(ConfigError::InvalidMultiplier)
        ));
        assert!(matches!(
            AppConfig::from_config(&Config { min_read_interval_ms: u32::MAX, ..base() }),
            Err(ConfigError::IntervalOverflow(_, _))
        ));
        assert!(matches!(
            AppConfig::from_config(&Config { esp_now_channel: 0, ..base() }),
            Err(ConfigError::InvalidChannel(0))
        ));
    }

    #[test]
    fn test_rejects_out_of_range_gpio_pin() {
        assert!(matches!(
            AppConfig::from_config(&Config { dht_gpio_pin: -1, ..base() }),
            Err(ConfigError::InvalidGpioPin(-1))
        ));
        assert!(matches!(
            AppConfig::from_config(&Config { dht_gpio_pin: 49, ..base() }),
            Err(ConfigError::InvalidGpioPin(49))
        ));
        let config = Config {
            dht_gpio_pin: MAX_GPIO_PIN,
            ..base()
        };
        assert_eq!(AppConfig::from_config(&config).unwrap().dht_gpio_pin, 48);
    }

    #[test]
    fn test_disabled_measurement() {
        let app = AppConfig::from_config(&Config { measurement_enabled: false, ..base() }).unwrap();
        assert!(!app.polling.enabled);
    }
}
