use super::dht::{DhtBus, DhtError, HumiditySensor};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// テスト用の湿度・温度センサーモック
///
/// `queue_reading` で積んだ (湿度, 温度) を読み取り1回ごとに先頭から返します。
/// 湿度の読み取りで次の値を取り出し、直後の温度の読み取りは同じ値の温度を返します。
/// キューが空の場合は読み取り失敗 (NaN) になります。
#[derive(Debug, Clone, Default)]
pub struct MockHumiditySensor {
    pub readings: Arc<Mutex<VecDeque<(f32, f32)>>>,
    pub current: Arc<Mutex<(f32, f32)>>,
    pub begin_calls: Arc<Mutex<u32>>,
    pub humidity_reads: Arc<Mutex<u32>>,
    pub temperature_reads: Arc<Mutex<u32>>,
}

impl MockHumiditySensor {
    /// 新しいMockHumiditySensorインスタンスを作成します
    pub fn new() -> Self {
        Self::default()
    }

    /// テスト用: 次の読み取り値をキューに追加
    pub fn queue_reading(&self, humidity: f32, temperature: f32) {
        self.readings.lock().unwrap().push_back((humidity, temperature));
    }

    /// テスト用: 読み取り失敗をキューに追加
    pub fn queue_failure(&self) {
        self.queue_reading(f32::NAN, f32::NAN);
    }

    pub fn begin_count(&self) -> u32 {
        *self.begin_calls.lock().unwrap()
    }

    /// テスト用: ハードウェア読み取りが行われた回数
    pub fn read_count(&self) -> u32 {
        *self.humidity_reads.lock().unwrap()
    }

    pub fn temperature_read_count(&self) -> u32 {
        *self.temperature_reads.lock().unwrap()
    }
}

impl HumiditySensor for MockHumiditySensor {
    fn begin(&mut self) {
        *self.begin_calls.lock().unwrap() += 1;
    }

    fn read_humidity(&mut self) -> f32 {
        *self.humidity_reads.lock().unwrap() += 1;
        let next = self
            .readings
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((f32::NAN, f32::NAN));
        *self.current.lock().unwrap() = next;
        next.0
    }

    fn read_temperature(&mut self) -> f32 {
        *self.temperature_reads.lock().unwrap() += 1;
        self.current.lock().unwrap().1
    }
}

/// テスト用のDHTバスモック
#[derive(Debug, Clone, Default)]
pub struct MockDhtBus {
    pub frames: Arc<Mutex<VecDeque<Result<[u8; 5], DhtError>>>>,
    pub transactions: Arc<Mutex<u32>>,
    pub begun: Arc<Mutex<bool>>,
}

impl MockDhtBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// テスト用: 受信フレームをキューに追加（チェックサムはそのまま）
    pub fn queue_frame(&self, frame: [u8; 5]) {
        self.frames.lock().unwrap().push_back(Ok(frame));
    }

    /// テスト用: バスエラーをキューに追加
    pub fn queue_error(&self, error: DhtError) {
        self.frames.lock().unwrap().push_back(Err(error));
    }

    pub fn transaction_count(&self) -> u32 {
        *self.transactions.lock().unwrap()
    }

    pub fn is_begun(&self) -> bool {
        *self.begun.lock().unwrap()
    }
}

impl DhtBus for MockDhtBus {
    type Error = DhtError;

    fn begin(&mut self) {
        *self.begun.lock().unwrap() = true;
    }

    fn read_frame(&mut self) -> Result<[u8; 5], Self::Error> {
        *self.transactions.lock().unwrap() += 1;
        self.frames
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(DhtError::Timeout("start response")))
    }
}
