/// ハードウェア制御モジュール
pub mod dht;

#[cfg(feature = "esp")]
pub mod dht_esp;

// Mock実装（テストとnon-espビルドで使用可能）
#[cfg(not(feature = "esp"))]
pub mod mock;

pub use dht::{DhtBus, DhtError, DhtModel, DhtSensor, HumiditySensor};
