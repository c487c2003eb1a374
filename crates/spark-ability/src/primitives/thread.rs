use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
    thread::{self, JoinHandle, ThreadId},
    time::Duration,
};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use super::Timeout;
use crate::{
    config::{Priority, ThreadSpec},
    error::{AbilityError, Result},
    lifecycle::LifecycleState,
};

/// 线程的逻辑状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ThreadState {
    Running = 0,
    Suspended = 1,
    Stopped = 2,
}

impl LifecycleState for ThreadState {
    fn to_raw(self) -> u8 {
        self as u8
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => ThreadState::Running,
            1 => ThreadState::Suspended,
            _ => ThreadState::Stopped,
        }
    }

    fn name(self) -> &'static str {
        match self {
            ThreadState::Running => "Running",
            ThreadState::Suspended => "Suspended",
            ThreadState::Stopped => "Stopped",
        }
    }
}

/// worker 与拥有者共享的控制块。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 宿主线程不能被外部挂起或杀死，因此挂起与停止都以“协作”方式实现：拥有者改写控制块，
///   worker 在检查点观察；
/// - 终止闩锁让拥有者无须轮询即可在上限内等待 worker 退出。
///
/// ## 契约 (What)
/// - `checkpoint`：挂起期间在此阻塞；返回 `false` 表示已收到停止请求，worker 应尽快返回；
/// - `sleep`：可被停止请求打断的睡眠；
/// - `is_stop_requested`：无锁读取停止令牌。
///
/// ## 注意事项 (Trade-offs)
/// - 停止令牌在 `gate` 锁内写入，避免检查点在“检查之后、等待之前”错过唤醒。
pub struct ThreadControl {
    name: String,
    stop: AtomicBool,
    priority: AtomicU8,
    gate: Mutex<Gate>,
    gate_changed: Condvar,
    finished: Mutex<bool>,
    finished_changed: Condvar,
}

#[derive(Default)]
struct Gate {
    suspended: bool,
}

impl ThreadControl {
    fn new(spec: &ThreadSpec) -> Self {
        Self {
            name: spec.name.clone(),
            stop: AtomicBool::new(false),
            priority: AtomicU8::new(spec.priority.level()),
            gate: Mutex::new(Gate::default()),
            gate_changed: Condvar::new(),
            finished: Mutex::new(false),
            finished_changed: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Priority {
        Priority::new(self.priority.load(Ordering::Acquire))
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn is_suspended(&self) -> bool {
        self.gate.lock().suspended
    }

    /// 协作检查点。
    pub fn checkpoint(&self) -> bool {
        let mut gate = self.gate.lock();
        while gate.suspended && !self.is_stop_requested() {
            self.gate_changed.wait(&mut gate);
        }
        !self.is_stop_requested()
    }

    /// 睡眠 `duration`；被停止请求打断时返回 `false`。
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Timeout::After(duration).deadline();
        let mut gate = self.gate.lock();
        while !self.is_stop_requested() {
            if deadline.is_expired() {
                return true;
            }
            deadline.wait(&self.gate_changed, &mut gate);
        }
        false
    }

    fn set_suspended(&self, suspended: bool) {
        let mut gate = self.gate.lock();
        gate.suspended = suspended;
        drop(gate);
        self.gate_changed.notify_all();
    }

    fn request_stop(&self) {
        let gate = self.gate.lock();
        self.stop.store(true, Ordering::Release);
        drop(gate);
        self.gate_changed.notify_all();
    }

    fn mark_finished(&self) {
        let mut finished = self.finished.lock();
        *finished = true;
        drop(finished);
        self.finished_changed.notify_all();
    }

    fn is_finished(&self) -> bool {
        *self.finished.lock()
    }

    fn wait_finished(&self, ceiling: Duration) -> bool {
        let deadline = Timeout::After(ceiling).deadline();
        let mut finished = self.finished.lock();
        while !*finished {
            if deadline.is_expired() {
                return false;
            }
            deadline.wait(&self.finished_changed, &mut finished);
        }
        true
    }
}

/// 入口函数返回或 panic 时都会触发终止闩锁。
struct FinishGuard<'a>(&'a ThreadControl);

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.0.mark_finished();
    }
}

/// 单个原生线程的句柄。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 句柄与原生线程一一对应：创建前与销毁后都是“空句柄”，调用方不得假设线程存在；
/// - 入口函数的返回值经 `join` 交还拥有者，借此在重启时取回 worker 持有的用户状态。
///
/// ## 契约 (What)
/// - `create`：经蹦床函数运行入口，返回后触发终止闩锁；失败时句柄保持为空；
/// - `suspend`/`resume`/`set_priority`：空句柄上是无操作，且幂等；
/// - `delete`：非优雅的最后手段，分离原生线程并置空句柄，被放弃的线程可能泄漏资源。
///
/// ## 注意事项 (Trade-offs)
/// - 只有拥有者通过 `&mut self` 操作句柄；跨线程共享的部分全部位于 [`ThreadControl`]。
pub struct ThreadHandle<R> {
    spec: ThreadSpec,
    state: ThreadState,
    control: Option<Arc<ThreadControl>>,
    native: Option<JoinHandle<R>>,
}

impl<R> ThreadHandle<R> {
    pub fn new(spec: ThreadSpec) -> Self {
        Self {
            spec,
            state: ThreadState::Stopped,
            control: None,
            native: None,
        }
    }

    pub fn suspend(&mut self) {
        if let Some(control) = &self.control {
            control.set_suspended(true);
            if self.state == ThreadState::Running {
                self.state = ThreadState::Suspended;
            }
        }
    }

    pub fn resume(&mut self) {
        if let Some(control) = &self.control {
            control.set_suspended(false);
            if self.state == ThreadState::Suspended {
                self.state = ThreadState::Running;
            }
        }
    }

    pub fn set_priority(&mut self, priority: Priority) {
        if let Some(control) = &self.control {
            control.priority.store(priority.level(), Ordering::Release);
            self.spec.priority = priority;
        }
    }

    /// 置位停止令牌并解除挂起，让 worker 能走到下一个检查点。
    pub fn request_stop(&self) {
        if let Some(control) = &self.control {
            control.request_stop();
            control.set_suspended(false);
        }
    }

    /// 在 `ceiling` 内等待 worker 退出；空句柄视为已退出。
    pub fn wait_terminated(&self, ceiling: Duration) -> bool {
        self.control
            .as_ref()
            .is_none_or(|control| control.wait_finished(ceiling))
    }

    /// 回收 worker 并取回入口函数的返回值。
    ///
    /// 只应在 `wait_terminated` 返回 `true` 之后调用，否则会阻塞到 worker 退出为止。
    pub fn join(&mut self) -> Option<thread::Result<R>> {
        let native = self.native.take()?;
        self.control = None;
        self.state = ThreadState::Stopped;
        Some(native.join())
    }

    /// 最后手段：放弃原生线程并置空句柄。
    pub fn delete(&mut self) {
        let Some(native) = self.native.take() else {
            return;
        };
        if let Some(control) = self.control.take() {
            control.request_stop();
            control.set_suspended(false);
        }
        warn!(
            target: "spark_ability::thread",
            thread_name = %self.spec.name,
            "worker thread abandoned; resources it holds may leak"
        );
        drop(native);
        self.state = ThreadState::Stopped;
    }

    pub fn is_null(&self) -> bool {
        self.native.is_none()
    }

    pub fn is_finished(&self) -> bool {
        self.control
            .as_ref()
            .is_none_or(|control| control.is_finished())
    }

    pub fn state(&self) -> ThreadState {
        if self.is_null() || self.is_finished() {
            ThreadState::Stopped
        } else {
            self.state
        }
    }

    pub fn priority(&self) -> Priority {
        self.control
            .as_ref()
            .map_or(self.spec.priority, |control| control.priority())
    }

    pub fn spec(&self) -> &ThreadSpec {
        &self.spec
    }

    pub fn thread_id(&self) -> Option<ThreadId> {
        self.native.as_ref().map(|native| native.thread().id())
    }

    /// 当前调用线程是否就是该句柄的 worker。
    pub fn is_current(&self) -> bool {
        self.thread_id() == Some(thread::current().id())
    }
}

impl<R: Send + 'static> ThreadHandle<R> {
    pub fn create<F>(&mut self, entry: F) -> Result<()>
    where
        F: FnOnce(&ThreadControl) -> R + Send + 'static,
    {
        if self.native.is_some() {
            return Err(AbilityError::invalid_state("create", self.state().name()));
        }
        self.spec.validate()?;
        let control = Arc::new(ThreadControl::new(&self.spec));
        let worker_control = Arc::clone(&control);
        let spawned = thread::Builder::new()
            .name(self.spec.name.clone())
            .stack_size(self.spec.host_stack_size())
            .spawn(move || {
                let finish = FinishGuard(&worker_control);
                let output = entry(&worker_control);
                drop(finish);
                output
            });
        match spawned {
            Ok(native) => {
                debug!(
                    target: "spark_ability::thread",
                    thread_name = %self.spec.name,
                    thread_priority = %self.spec.priority,
                    thread_core = %self.spec.core,
                    thread_stack = self.spec.host_stack_size(),
                    "worker thread created"
                );
                self.control = Some(control);
                self.native = Some(native);
                self.state = ThreadState::Running;
                Ok(())
            }
            Err(err) => Err(AbilityError::ResourceCreation {
                resource: "thread",
                detail: err.to_string(),
            }),
        }
    }
}

impl<R> core::fmt::Debug for ThreadHandle<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("name", &self.spec.name)
            .field("state", &self.state)
            .field("null", &self.native.is_none())
            .finish()
    }
}
