/// 環境測定プラグイン
pub mod measurement;
pub mod polling_task;

pub use measurement::SensorReading;
pub use polling_task::{PollingConfig, PollingState, SensorPollingTask};

use crate::communication::mesh::{MeshService, PacketAllocator, ReceiveDispatcher};
use crate::hardware::HumiditySensor;
use crate::scheduler::{Delay, PeriodicTask, Scheduler, DISABLE};
use log::info;
use std::cell::RefCell;
use std::rc::Rc;

/// 測定が無効化されている場合に登録される何もしないタスク
///
/// 最初の呼び出しで `DISABLE` を返し、スケジューラから外れます。
#[derive(Debug, Default)]
pub struct DisabledTask;

impl PeriodicTask for DisabledTask {
    fn name(&self) -> &'static str {
        "EnvironmentalMeasurement(disabled)"
    }

    fn run_once(&mut self) -> i32 {
        info!("Environmental measurement is disabled by configuration");
        DISABLE
    }
}

/// 測定タスクをスケジューラと受信ハンドラの両方に登録する
///
/// 有効な場合は共有されたタスクを返します。無効な場合は `DisabledTask` だけを
/// 登録し、センサーやメッシュには一切触れません。
pub fn install_measurement_plugin<S, M, D>(
    config: PollingConfig,
    sensor: S,
    mesh: M,
    allocator: PacketAllocator,
    scheduler: &mut Scheduler<D>,
    dispatcher: &mut ReceiveDispatcher,
) -> Option<Rc<RefCell<SensorPollingTask<S, M>>>>
where
    S: HumiditySensor + 'static,
    M: MeshService + 'static,
    D: Delay,
{
    if !config.enabled {
        scheduler.add_task(Box::new(DisabledTask));
        return None;
    }

    let task = Rc::new(RefCell::new(SensorPollingTask::new(sensor, mesh, allocator, config)));
    scheduler.add_task(Box::new(Rc::clone(&task)));
    dispatcher.add_handler(Box::new(Rc::clone(&task)));
    Some(task)
}
