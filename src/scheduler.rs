//! 協調型スケジューラ
//!
//! 登録されたタスクの `run_once()` を1つずつ呼び出し、戻り値のミリ秒だけ
//! 後に再度呼び出します。同じタスクが並行・再入して呼ばれることはありません。

use log::{debug, info, warn};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

/// `run_once()` がこの値を返すとタスクはスケジューラから外される
pub const DISABLE: i32 = i32::MAX;

/// スケジューラから周期的に呼び出されるタスク
pub trait PeriodicTask {
    fn name(&self) -> &'static str;

    /// 1回分の処理を行い、次回呼び出しまでの待ち時間（ミリ秒）を返す
    fn run_once(&mut self) -> i32;
}

impl<T: PeriodicTask> PeriodicTask for Rc<RefCell<T>> {
    fn name(&self) -> &'static str {
        self.borrow().name()
    }

    fn run_once(&mut self) -> i32 {
        self.borrow_mut().run_once()
    }
}

/// 待機処理と時刻源の抽象化
pub trait Delay {
    fn delay_ms(&mut self, ms: u32);

    /// 単調増加する現在時刻（ミリ秒）
    ///
    /// `None` の場合、スケジューラは待機した時間の累計を時刻として扱います。
    fn monotonic_ms(&self) -> Option<u64> {
        None
    }
}

/// `std::thread::sleep` による待機（ホスト用）
#[derive(Debug, Clone, Copy)]
pub struct StdDelay {
    started: Instant,
}

impl Default for StdDelay {
    fn default() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Delay for StdDelay {
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(ms as u64));
    }

    fn monotonic_ms(&self) -> Option<u64> {
        Some(self.started.elapsed().as_millis() as u64)
    }
}

/// FreeRTOSのタスク遅延による待機
#[cfg(feature = "esp")]
#[derive(Debug, Default, Clone, Copy)]
pub struct FreeRtosDelay;

#[cfg(feature = "esp")]
impl Delay for FreeRtosDelay {
    fn delay_ms(&mut self, ms: u32) {
        esp_idf_svc::hal::delay::FreeRtos::delay_ms(ms);
    }

    fn monotonic_ms(&self) -> Option<u64> {
        // esp_timer は起動からのマイクロ秒
        let us = unsafe { esp_idf_svc::sys::esp_timer_get_time() };
        Some(us.max(0) as u64 / 1000)
    }
}

struct Slot {
    task: Box<dyn PeriodicTask>,
    due_ms: u64,
    seq: u64,
}

/// 協調型スケジューラ
///
/// `Delay` が時刻源を持つ場合はその時刻で、持たない場合は待機した時間の累計
/// （仮想時計）で予定を管理します。時刻源がある場合はタスクの実行時間も時刻に含まれます。
pub struct Scheduler<D: Delay> {
    slots: Vec<Slot>,
    delay: D,
    now_ms: u64,
    next_seq: u64,
}

impl<D: Delay> Scheduler<D> {
    pub fn new(delay: D) -> Self {
        Self {
            slots: Vec::new(),
            delay,
            now_ms: 0,
            next_seq: 0,
        }
    }

    /// タスクを登録する。登録直後に実行対象となる
    pub fn add_task(&mut self, task: Box<dyn PeriodicTask>) {
        info!("Registering task '{}'", task.name());
        let seq = self.bump_seq();
        self.slots.push(Slot {
            task,
            due_ms: self.now_ms,
            seq,
        });
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    /// 次に実行されるタスクの予定時刻
    pub fn next_due_ms(&self) -> Option<u64> {
        self.slots.iter().map(|s| s.due_ms).min()
    }

    /// 時刻源があれば現在時刻に進める（戻すことはない）
    fn sync_clock(&mut self) {
        if let Some(now) = self.delay.monotonic_ms() {
            self.now_ms = self.now_ms.max(now);
        }
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// 最も早く予定されているタスクを1つ実行する
    ///
    /// 実行したタスクがなければ `false` を返します。
    pub fn tick(&mut self) -> bool {
        self.sync_clock();
        let Some(index) = self
            .slots
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| (s.due_ms, s.seq))
            .map(|(i, _)| i)
        else {
            return false;
        };

        let due_ms = self.slots[index].due_ms;
        if due_ms > self.now_ms {
            let wait = (due_ms - self.now_ms).min(u32::MAX as u64) as u32;
            self.delay.delay_ms(wait);
            self.now_ms = due_ms;
            self.sync_clock();
        }

        let requested = self.slots[index].task.run_once();
        let name = self.slots[index].task.name();
        self.sync_clock();

        if requested == DISABLE || requested < 0 {
            info!("Task '{}' disabled itself ({})", name, requested);
            self.slots.remove(index);
        } else {
            debug!("Task '{}' next run in {} ms", name, requested);
            let seq = self.bump_seq();
            let slot = &mut self.slots[index];
            slot.due_ms = self.now_ms + requested as u64;
            slot.seq = seq;
        }

        true
    }

    /// 予定時刻が `deadline_ms` 以下のタスクをすべて実行する
    pub fn run_until(&mut self, deadline_ms: u64) {
        while let Some(due) = self.next_due_ms() {
            if due > deadline_ms {
                break;
            }
            self.tick();
        }
    }

    /// タスクがなくなるまで実行し続ける
    pub fn run_forever(&mut self) {
        while self.tick() {}
        warn!("No tasks left to run, scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct RecordingDelay {
        waits: Vec<u32>,
    }

    impl Delay for RecordingDelay {
        fn delay_ms(&mut self, ms: u32) {
            self.waits.push(ms);
        }
    }

    struct FixedTask {
        name: &'static str,
        interval: i32,
        runs: Rc<RefCell<Vec<(&'static str, u32)>>>,
        count: u32,
    }

    impl PeriodicTask for FixedTask {
        fn name(&self) -> &'static str {
            self.name
        }

        fn run_once(&mut self) -> i32 {
            self.count += 1;
            self.runs.borrow_mut().push((self.name, self.count));
            self.interval
        }
    }

    type Runs = Rc<RefCell<Vec<(&'static str, u32)>>>;

    fn fixed(name: &'static str, interval: i32, runs: &Runs) -> Box<dyn PeriodicTask> {
        Box::new(FixedTask {
            name,
            interval,
            runs: Rc::clone(runs),
            count: 0,
        })
    }

    #[test]
    fn test_new_task_runs_immediately() {
        let runs = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new(RecordingDelay::default());
        scheduler.add_task(fixed("a", 1000, &runs));

        assert!(scheduler.tick());
        assert_eq!(scheduler.now_ms(), 0);
        assert!(scheduler.delay().waits.is_empty());
        assert_eq!(scheduler.next_due_ms(), Some(1000));
    }

    #[test]
    fn test_returned_delay_is_honoured() {
        let runs = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new(RecordingDelay::default());
        scheduler.add_task(fixed("a", 1000, &runs));

        scheduler.run_until(3000);

        assert_eq!(runs.borrow().len(), 4);
        assert_eq!(scheduler.delay().waits, vec![1000, 1000, 1000]);
        assert_eq!(scheduler.now_ms(), 3000);
    }

    #[test]
    fn test_interleaves_by_due_time() {
        let runs = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new(RecordingDelay::default());
        scheduler.add_task(fixed("slow", 300, &runs));
        scheduler.add_task(fixed("fast", 100, &runs));

        scheduler.run_until(300);

        let names: Vec<&str> = runs.borrow().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["slow", "fast", "fast", "fast", "slow", "fast"]);
    }

    #[test]
    fn test_disable_removes_task() {
        let runs = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new(RecordingDelay::default());
        scheduler.add_task(fixed("once", DISABLE, &runs));
        scheduler.add_task(fixed("negative", -1, &runs));

        assert!(scheduler.tick());
        assert!(scheduler.tick());
        assert!(scheduler.is_empty());
        assert!(!scheduler.tick());

        scheduler.run_forever();
        assert_eq!(runs.borrow().len(), 2);
    }

    #[test]
    fn test_shared_task_through_rc() {
        let runs = Rc::new(RefCell::new(Vec::new()));
        let shared = Rc::new(RefCell::new(FixedTask {
            name: "shared",
            interval: 50,
            runs: Rc::clone(&runs),
            count: 0,
        }));

        let mut scheduler = Scheduler::new(RecordingDelay::default());
        scheduler.add_task(Box::new(Rc::clone(&shared)));
        scheduler.run_until(100);

        assert_eq!(shared.borrow().count, 3);
        assert_eq!(scheduler.len(), 1);
    }

    /// 待機した分だけ進む時計
    struct ClockedDelay {
        clock: Rc<Cell<u64>>,
        waits: Vec<u32>,
    }

    impl Delay for ClockedDelay {
        fn delay_ms(&mut self, ms: u32) {
            self.waits.push(ms);
            self.clock.set(self.clock.get() + ms as u64);
        }

        fn monotonic_ms(&self) -> Option<u64> {
            Some(self.clock.get())
        }
    }

    struct BusyTask {
        clock: Rc<Cell<u64>>,
        cost_ms: u64,
        interval: i32,
    }

    impl PeriodicTask for BusyTask {
        fn name(&self) -> &'static str {
            "busy"
        }

        fn run_once(&mut self) -> i32 {
            self.clock.set(self.clock.get() + self.cost_ms);
            self.interval
        }
    }

    #[test]
    fn test_run_time_is_counted_with_clock_source() {
        let clock = Rc::new(Cell::new(0));
        let runs = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new(ClockedDelay {
            clock: Rc::clone(&clock),
            waits: Vec::new(),
        });
        scheduler.add_task(Box::new(BusyTask {
            clock: Rc::clone(&clock),
            cost_ms: 20,
            interval: 1000,
        }));
        scheduler.add_task(fixed("fast", 100, &runs));

        // busy の実行に20msかかるので、fast は t=20 に実行され t=120 に予定される
        assert!(scheduler.tick());
        assert_eq!(scheduler.now_ms(), 20);
        assert!(scheduler.tick());
        assert_eq!(scheduler.next_due_ms(), Some(120));

        assert!(scheduler.tick());
        assert_eq!(scheduler.delay().waits, vec![100]);
        assert_eq!(clock.get(), 120);
    }

    #[test]
    fn test_std_delay_clock_advances() {
        let mut delay = StdDelay::default();
        let before = delay.monotonic_ms().unwrap();
        delay.delay_ms(5);
        assert!(delay.monotonic_ms().unwrap() >= before + 5);
    }
}
