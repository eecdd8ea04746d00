/*!
 * # Environmental Measurement Node Library
 *
 * DHT11/DHT22 温湿度センサーを周期的に読み取り、測定値をメッシュ（ESP-NOW）へ
 * ブロードキャストするためのライブラリ
 *
 * ## モジュール構成
 * - `plugin`: 測定タスク（初期化、ポーリング、連続失敗時の読み取り停止）
 * - `hardware`: DHTセンサードライバ
 * - `communication`: メッシュパケット、送信・受信ディスパッチ、ESP-NOW
 * - `scheduler`: 協調型タスクスケジューラ
 * - `config`: ビルド時設定
 */

pub mod communication;
pub mod config;
pub mod hardware;
pub mod mac_address;
pub mod plugin;
pub mod scheduler;

pub use communication::mesh::{
    EnvironmentalMeasurement, MeshPacket, MeshService, NodeNum, PacketAllocator,
    ReceiveDispatcher, ReceiveTask, NODENUM_BROADCAST,
};
pub use config::{AppConfig, ConfigError};
pub use hardware::{DhtModel, DhtSensor, HumiditySensor};
pub use mac_address::MacAddress;
pub use plugin::{install_measurement_plugin, PollingConfig, SensorPollingTask};
pub use scheduler::{PeriodicTask, Scheduler, DISABLE};

/// ライブラリのバージョン情報
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
