use log::{debug, warn};
use std::fmt::Debug;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// DHTセンサーのエラー
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DhtError {
    #[error("DHT応答タイムアウト ({0})")]
    Timeout(&'static str),

    #[error("チェックサム不一致: 受信 {expected:#04x}, 計算 {calculated:#04x}")]
    Checksum { expected: u8, calculated: u8 },

    #[error("GPIO設定エラー (esp_err_t={0})")]
    Gpio(i32),
}

/// 未対応のセンサー型式
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("未対応のDHT型式です: {0}")]
pub struct UnknownDhtModel(pub String);

/// 湿度・温度センサーのトレイト
///
/// 読み取りに失敗した場合は `f32::NAN` を返します（ドライバの慣習）。
pub trait HumiditySensor {
    /// センサーを初期化する
    fn begin(&mut self);

    /// 相対湿度（%）を読み取る
    fn read_humidity(&mut self) -> f32;

    /// 温度（℃）を読み取る
    fn read_temperature(&mut self) -> f32;
}

/// DHTの1回分の40ビット転送を行うバス
pub trait DhtBus {
    type Error: Debug;

    /// データ線をアイドル状態にする
    fn begin(&mut self);

    /// スタート信号を送り、5バイトのフレームを受信する
    fn read_frame(&mut self) -> Result<[u8; 5], Self::Error>;
}

/// DHTセンサーの型式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhtModel {
    Dht11,
    /// DHT22 / AM2302
    Dht22,
}

impl DhtModel {
    /// 連続測定の最小間隔
    pub fn min_sample_interval(self) -> Duration {
        match self {
            DhtModel::Dht11 => Duration::from_millis(1000),
            DhtModel::Dht22 => Duration::from_millis(2000),
        }
    }

    /// スタート信号としてデータ線をLowに保つ時間（マイクロ秒）
    pub fn start_signal_us(self) -> u32 {
        match self {
            DhtModel::Dht11 => 20_000,
            DhtModel::Dht22 => 1_100,
        }
    }
}

impl FromStr for DhtModel {
    type Err = UnknownDhtModel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DHT11" => Ok(DhtModel::Dht11),
            "DHT22" | "AM2302" => Ok(DhtModel::Dht22),
            _ => Err(UnknownDhtModel(s.to_string())),
        }
    }
}

/// 受信フレームから (湿度, 温度) を計算する
pub fn decode_frame(model: DhtModel, frame: &[u8; 5]) -> Result<(f32, f32), DhtError> {
    // チェックサムは先頭4バイトの和の下位8ビット
    let calculated = frame[..4].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    if calculated != frame[4] {
        return Err(DhtError::Checksum {
            expected: frame[4],
            calculated,
        });
    }

    let reading = match model {
        DhtModel::Dht11 => {
            let humidity = frame[0] as f32 + frame[1] as f32 * 0.1;
            let mut temperature = frame[2] as f32;
            if frame[3] & 0x80 != 0 {
                temperature = -1.0 - temperature;
            }
            temperature += (frame[3] & 0x0F) as f32 * 0.1;
            (humidity, temperature)
        }
        DhtModel::Dht22 => {
            let humidity = u16::from_be_bytes([frame[0], frame[1]]) as f32 * 0.1;
            let mut temperature = u16::from_be_bytes([frame[2] & 0x7F, frame[3]]) as f32 * 0.1;
            if frame[2] & 0x80 != 0 {
                temperature = -temperature;
            }
            (humidity, temperature)
        }
    };

    Ok(reading)
}

/// 1ビット分のパルス幅（マイクロ秒）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BitPulse {
    pub low_us: u32,
    pub high_us: u32,
}

/// 計測した40ビット分のパルス幅からフレームを組み立てる
///
/// High期間が同じビットのLow期間（約50us）より長ければ1とみなします。
pub fn pulses_to_frame(pulses: &[BitPulse; 40]) -> [u8; 5] {
    let mut frame = [0u8; 5];
    for (bit, pulse) in pulses.iter().enumerate() {
        if pulse.high_us > pulse.low_us {
            frame[bit / 8] |= 1 << (7 - (bit % 8));
        }
    }
    frame
}

/// DHT11/DHT22 センサー
///
/// センサーの最小測定間隔内に再度読み取った場合は前回の結果（失敗を含む）を返すため、
/// 湿度と温度を続けて読んでもバス転送は1回だけです。
pub struct DhtSensor<B: DhtBus> {
    bus: B,
    model: DhtModel,
    sample_interval: Duration,
    last_read: Option<Instant>,
    last_result: Option<(f32, f32)>,
}

impl<B: DhtBus> DhtSensor<B> {
    pub fn new(bus: B, model: DhtModel) -> Self {
        Self::with_sample_interval(bus, model, model.min_sample_interval())
    }

    pub fn with_sample_interval(bus: B, model: DhtModel, sample_interval: Duration) -> Self {
        Self {
            bus,
            model,
            sample_interval,
            last_read: None,
            last_result: None,
        }
    }

    fn refresh(&mut self) -> Option<(f32, f32)> {
        if let Some(at) = self.last_read {
            if at.elapsed() < self.sample_interval {
                return self.last_result;
            }
        }

        self.last_read = Some(Instant::now());
        self.last_result = match self.bus.read_frame() {
            Ok(frame) => match decode_frame(self.model, &frame) {
                Ok(reading) => {
                    debug!("DHT frame {:02X?} -> {:?}", frame, reading);
                    Some(reading)
                }
                Err(e) => {
                    warn!("DHT frame rejected: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("DHT bus read failed: {:?}", e);
                None
            }
        };
        self.last_result
    }
}

impl<B: DhtBus> HumiditySensor for DhtSensor<B> {
    fn begin(&mut self) {
        self.bus.begin();
        // 初回の読み取りは間隔に関係なく行う
        self.last_read = None;
        self.last_result = None;
    }

    fn read_humidity(&mut self) -> f32 {
        self.refresh().map_or(f32::NAN, |(h, _)| h)
    }

    fn read_temperature(&mut self) -> f32 {
        self.refresh().map_or(f32::NAN, |(_, t)| t)
    }
}
