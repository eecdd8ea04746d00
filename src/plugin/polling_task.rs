use super::measurement::SensorReading;
use crate::communication::mesh::{
    format_node_num, EnvironmentalMeasurement, MeasurementHandler, MeshPacket, MeshService, NodeNum,
    PacketAllocator, NODENUM_BROADCAST,
};
use crate::hardware::HumiditySensor;
use crate::scheduler::{PeriodicTask, DISABLE};
use log::{debug, info, warn};

/// DHTセンサーの最小読み取り間隔（ミリ秒）
pub const DEFAULT_MIN_READ_INTERVAL_MS: u32 = 1000;
/// この回数を超えて連続失敗すると読み取りを止める
pub const DEFAULT_READ_ERROR_THRESHOLD: u32 = 5;
/// 正常時は最小間隔のこの倍数で読み取る
pub const DEFAULT_READ_INTERVAL_MULTIPLIER: u32 = 3;

/// ポーリング設定
#[derive(Debug, Clone, PartialEq)]
pub struct PollingConfig {
    pub enabled: bool,
    pub min_read_interval_ms: u32,
    pub error_threshold: u32,
    pub interval_multiplier: u32,
    pub destination: NodeNum,
    pub want_replies: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_read_interval_ms: DEFAULT_MIN_READ_INTERVAL_MS,
            error_threshold: DEFAULT_READ_ERROR_THRESHOLD,
            interval_multiplier: DEFAULT_READ_INTERVAL_MULTIPLIER,
            destination: NODENUM_BROADCAST,
            want_replies: true,
        }
    }
}

impl PollingConfig {
    /// 失敗時・閾値超過時の待ち時間
    pub fn retry_delay_ms(&self) -> i32 {
        clamp_delay(self.min_read_interval_ms)
    }

    /// 正常時の待ち時間
    pub fn steady_delay_ms(&self) -> i32 {
        clamp_delay(self.min_read_interval_ms.saturating_mul(self.interval_multiplier))
    }
}

// DISABLE と区別するため i32::MAX 未満に収める
fn clamp_delay(ms: u32) -> i32 {
    ms.min((DISABLE - 1) as u32) as i32
}

/// ポーリング状態
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollingState {
    pub initialized: bool,
    pub consecutive_error_count: u32,
}

/// 湿度・温度センサーを周期的に読み取り、測定値をメッシュへ送信するタスク
pub struct SensorPollingTask<S: HumiditySensor, M: MeshService> {
    sensor: S,
    mesh: M,
    allocator: PacketAllocator,
    config: PollingConfig,
    state: PollingState,
}

impl<S: HumiditySensor, M: MeshService> SensorPollingTask<S, M> {
    pub fn new(sensor: S, mesh: M, allocator: PacketAllocator, config: PollingConfig) -> Self {
        Self {
            sensor,
            mesh,
            allocator,
            config,
            state: PollingState::default(),
        }
    }

    pub fn state(&self) -> PollingState {
        self.state
    }

    pub fn config(&self) -> &PollingConfig {
        &self.config
    }

    /// 連続失敗回数が閾値を超えているか
    pub fn is_degraded(&self) -> bool {
        self.state.consecutive_error_count > self.config.error_threshold
    }

    /// 初回呼び出し時のセンサー初期化
    ///
    /// DHTは1Hzより速く読めないため、最初の読み取りは最小間隔の後に行います。
    pub fn initialize(&mut self) -> i32 {
        info!("Initializing environmental measurement plugin");
        self.sensor.begin();
        self.state.initialized = true;
        self.config.retry_delay_ms()
    }

    /// 読み取りと送信を1回行い、次回までの待ち時間を返す
    pub fn poll(&mut self) -> i32 {
        if self.is_degraded() {
            warn!(
                "Environmental measurement disabled: read error threshold {} exceeded",
                self.config.error_threshold
            );
            return self.config.retry_delay_ms();
        }
        if self.state.consecutive_error_count > 0 {
            info!(
                "Environmental measurement: {} consecutive sensor read failures",
                self.state.consecutive_error_count
            );
        }

        let (dest, want_replies) = (self.config.destination, self.config.want_replies);
        if self.send_our_measurement(dest, want_replies) {
            self.config.steady_delay_ms()
        } else {
            // 読み取りに失敗したら最小間隔ですぐに再試行する
            self.config.retry_delay_ms()
        }
    }

    /// センサーを読み取り、有効な値であれば `dest` 宛てに送信する
    pub fn send_our_measurement(&mut self, dest: NodeNum, want_replies: bool) -> bool {
        let humidity = self.sensor.read_humidity();
        let temperature = self.sensor.read_temperature();
        let reading = SensorReading::new(humidity, temperature);

        debug!(
            "Environmental measurement read: relative_humidity={} temperature={}",
            reading.humidity, reading.temperature
        );

        if !reading.is_valid() {
            self.state.consecutive_error_count += 1;
            warn!("Environmental measurement: failed to read data");
            return false;
        }

        self.state.consecutive_error_count = 0;

        let mut packet = self.allocator.alloc_data_packet(&reading.to_measurement());
        packet.to = dest;
        packet.want_response = want_replies;

        debug!(
            "Sending measurement packet {} to {}",
            packet.id,
            format_node_num(dest)
        );
        self.mesh.send_to_mesh(packet);
        true
    }
}

impl<S: HumiditySensor, M: MeshService> PeriodicTask for SensorPollingTask<S, M> {
    fn name(&self) -> &'static str {
        "EnvironmentalMeasurement"
    }

    fn run_once(&mut self) -> i32 {
        if !self.state.initialized {
            self.initialize()
        } else {
            self.poll()
        }
    }
}

impl<S: HumiditySensor, M: MeshService> MeasurementHandler for SensorPollingTask<S, M> {
    fn handle_received(
        &mut self,
        packet: &MeshPacket,
        measurement: &EnvironmentalMeasurement,
    ) -> bool {
        debug!(
            "Environmental measurement from {}: {:?}",
            format_node_num(packet.from),
            measurement
        );
        // 他のハンドラにも渡す
        false
    }
}
