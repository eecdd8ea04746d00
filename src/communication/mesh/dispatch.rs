use super::{format_node_num, EnvironmentalMeasurement, MeshPacket, PortNum};
use crate::scheduler::PeriodicTask;
use log::{debug, warn};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc::{Receiver, TryRecvError};

/// 受信キューの確認間隔（ミリ秒）
pub const RECEIVE_POLL_INTERVAL_MS: i32 = 100;

/// 受信した環境測定値を処理するハンドラ
pub trait MeasurementHandler {
    /// メッセージを処理した（以降のハンドラに渡さない）場合は `true` を返す
    fn handle_received(
        &mut self,
        packet: &MeshPacket,
        measurement: &EnvironmentalMeasurement,
    ) -> bool;
}

impl<T: MeasurementHandler> MeasurementHandler for Rc<RefCell<T>> {
    fn handle_received(
        &mut self,
        packet: &MeshPacket,
        measurement: &EnvironmentalMeasurement,
    ) -> bool {
        self.borrow_mut().handle_received(packet, measurement)
    }
}

/// 受信パケットを登録順にハンドラへ渡すディスパッチャ
#[derive(Default)]
pub struct ReceiveDispatcher {
    handlers: Vec<Box<dyn MeasurementHandler>>,
}

impl ReceiveDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&mut self, handler: Box<dyn MeasurementHandler>) {
        self.handlers.push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// パケットをハンドラに渡し、いずれかが処理したかを返す
    pub fn dispatch(&mut self, packet: &MeshPacket) -> bool {
        if packet.port != PortNum::EnvironmentalMeasurement {
            debug!("Ignoring packet {} on port {:?}", packet.id, packet.port);
            return false;
        }

        let measurement = match EnvironmentalMeasurement::decode(&packet.payload) {
            Ok(m) => m,
            Err(e) => {
                warn!(
                    "Undecodable measurement from {}: {}",
                    format_node_num(packet.from),
                    e
                );
                return false;
            }
        };

        for (i, handler) in self.handlers.iter_mut().enumerate() {
            if handler.handle_received(packet, &measurement) {
                debug!("Packet {} consumed by handler #{}", packet.id, i);
                return true;
            }
        }
        false
    }
}

/// 受信キューを空になるまで読み出してディスパッチするタスク
pub struct ReceiveTask {
    rx: Receiver<MeshPacket>,
    dispatcher: ReceiveDispatcher,
}

impl ReceiveTask {
    pub fn new(rx: Receiver<MeshPacket>, dispatcher: ReceiveDispatcher) -> Self {
        Self { rx, dispatcher }
    }
}

impl PeriodicTask for ReceiveTask {
    fn name(&self) -> &'static str {
        "MeshReceive"
    }

    fn run_once(&mut self) -> i32 {
        loop {
            match self.rx.try_recv() {
                Ok(packet) => {
                    self.dispatcher.dispatch(&packet);
                }
                Err(TryRecvError::Empty) => return RECEIVE_POLL_INTERVAL_MS,
                Err(TryRecvError::Disconnected) => {
                    warn!("Mesh receive channel closed");
                    return crate::scheduler::DISABLE;
                }
            }
        }
    }
}
