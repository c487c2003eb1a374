use std::{
    borrow::Cow,
    sync::Arc,
    thread::{self, ThreadId},
};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{Ability, AbilityDescriptor, AbilityKind, Runnable};
use crate::{
    config::{Priority, TaskConfig},
    error::{AbilityError, Result},
    lifecycle::{AtomicState, LifecycleState, StopOutcome},
    primitives::{ThreadControl, ThreadHandle},
};

pub use crate::primitives::ThreadState as TaskState;

/// 在独占线程上运行的工作体。
///
/// `run` 应周期性调用 [`ThreadControl::checkpoint`] 或 [`ThreadControl::sleep`]，
/// 返回值为 `false` 时尽快返回；`run` 返回即视为任务自行结束。
pub trait TaskWork: Send + 'static {
    fn run(&mut self, ctl: &ThreadControl);
}

impl<F> TaskWork for F
where
    F: FnMut(&ThreadControl) + Send + 'static,
{
    fn run(&mut self, ctl: &ThreadControl) {
        self(ctl)
    }
}

/// 拥有独占 worker 线程的能力。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 让“跑一个循环直到被叫停”的组件无需自己管理线程句柄与状态位；
/// - 停止后工作体经 `join` 交还，因此同一个能力可以反复 `start`/`stop`，用户状态不丢失。
///
/// ## 逻辑 (How)
/// - 状态机：`Stopped --start--> Running <--suspend/resume--> Suspended`，任意运行态经 `stop`
///   或工作体自行返回回到 `Stopped`；
/// - 工作体通过一个 `Arc<Mutex<Option<W>>>` 交接给新线程；线程创建失败时从交接槽取回，
///   能力回到 `Stopped` 且工作体完好。
///
/// ## 契约 (What)
/// - `start` 只在 `Stopped` 下合法；
/// - `stop` 先置停止令牌，在 `TaskConfig::stop_timeout` 内等待退出，超时则强制分离线程并返回
///   [`StopOutcome::Forced`]；强制分离会连同工作体一起放弃，此后 `start` 返回
///   [`AbilityError::WorkerLost`]；
/// - 在 worker 自身线程上调用 `stop` 返回 [`AbilityError::SelfStop`]。
///
/// ## 注意事项 (Trade-offs)
/// - 挂起是协作式的：工作体只有走到检查点才会真正停下。
pub struct TaskAbility<W> {
    descriptor: AbilityDescriptor,
    config: TaskConfig,
    state: Arc<AtomicState<TaskState>>,
    slot: Mutex<TaskSlot<W>>,
    worker: Mutex<Option<ThreadId>>,
}

struct TaskSlot<W> {
    work: Option<W>,
    thread: ThreadHandle<Option<W>>,
}

impl<W: TaskWork> TaskAbility<W> {
    pub fn new(name: impl Into<Cow<'static, str>>, config: TaskConfig, work: W) -> Self {
        Self::from_parts(AbilityDescriptor::new(AbilityKind::Task, name), config, work)
    }

    pub(crate) fn from_parts(descriptor: AbilityDescriptor, config: TaskConfig, work: W) -> Self {
        let thread = ThreadHandle::new(config.thread.clone());
        Self {
            descriptor,
            config,
            state: Arc::new(AtomicState::new(TaskState::Stopped)),
            slot: Mutex::new(TaskSlot {
                work: Some(work),
                thread,
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// 挂起 worker；仅在 `Running` 下合法。
    pub fn suspend(&self) -> Result<()> {
        let mut slot = self.slot.lock();
        self.state
            .transition(TaskState::Running, TaskState::Suspended)
            .map_err(|current| AbilityError::invalid_state("suspend", current.name()))?;
        slot.thread.suspend();
        debug!(target: "spark_ability::task", ability = %self.descriptor, "suspended");
        Ok(())
    }

    /// 恢复 worker；仅在 `Suspended` 下合法。
    pub fn resume(&self) -> Result<()> {
        let mut slot = self.slot.lock();
        self.state
            .transition(TaskState::Suspended, TaskState::Running)
            .map_err(|current| AbilityError::invalid_state("resume", current.name()))?;
        slot.thread.resume();
        debug!(target: "spark_ability::task", ability = %self.descriptor, "resumed");
        Ok(())
    }

    /// 记录新的优先级提示；宿主调度器不受影响。
    pub fn set_priority(&self, priority: Priority) {
        self.slot.lock().thread.set_priority(priority);
    }

    pub fn priority(&self) -> Priority {
        self.slot.lock().thread.priority()
    }

    /// 调用线程是否就是当前 worker。
    pub fn is_worker_thread(&self) -> bool {
        *self.worker.lock() == Some(thread::current().id())
    }

    /// 回收已退出的 worker，取回工作体。
    fn reap(&self, slot: &mut TaskSlot<W>) {
        match slot.thread.join() {
            Some(Ok(Some(work))) => slot.work = Some(work),
            Some(Ok(None)) | None => {}
            Some(Err(_)) => warn!(
                target: "spark_ability::task",
                ability = %self.descriptor,
                "worker panicked; its state is lost"
            ),
        }
        *self.worker.lock() = None;
    }
}

impl<W> Ability for TaskAbility<W> {
    fn descriptor(&self) -> &AbilityDescriptor {
        &self.descriptor
    }
}

impl<W: TaskWork> Runnable for TaskAbility<W> {
    type State = TaskState;

    fn start(&self) -> Result<()> {
        self.config.validate()?;
        let mut slot = self.slot.lock();
        let current = self.state.load();
        if current != TaskState::Stopped {
            return Err(AbilityError::invalid_state("start", current.name()));
        }
        if !slot.thread.is_null() {
            // 上一轮工作体已自行返回，线程正在收尾。
            if !slot.thread.wait_terminated(self.config.stop_timeout) {
                return Err(AbilityError::invalid_state("start", "Stopping"));
            }
            self.reap(&mut slot);
        }
        let Some(work) = slot.work.take() else {
            return Err(AbilityError::WorkerLost {
                name: self.descriptor.name().to_owned(),
            });
        };

        let handoff = Arc::new(Mutex::new(Some(work)));
        let entry_handoff = Arc::clone(&handoff);
        let state = Arc::clone(&self.state);
        self.state.store(TaskState::Running);
        let created = slot.thread.create(move |ctl| {
            let mut work = entry_handoff.lock().take()?;
            work.run(ctl);
            state.store(TaskState::Stopped);
            Some(work)
        });
        match created {
            Ok(()) => {
                *self.worker.lock() = slot.thread.thread_id();
                debug!(target: "spark_ability::task", ability = %self.descriptor, "started");
                Ok(())
            }
            Err(err) => {
                slot.work = handoff.lock().take();
                self.state.store(TaskState::Stopped);
                Err(err)
            }
        }
    }

    fn stop(&self) -> Result<StopOutcome> {
        if self.is_worker_thread() {
            return Err(AbilityError::SelfStop {
                name: self.descriptor.name().to_owned(),
            });
        }
        let mut slot = self.slot.lock();
        if slot.thread.is_null() {
            self.state.store(TaskState::Stopped);
            return Ok(StopOutcome::AlreadyStopped);
        }
        // 工作体自行返回：状态已是 Stopped，线程正在收尾或已结束（含 panic）。
        let returned = self.state.load() == TaskState::Stopped
            && slot.thread.wait_terminated(self.config.stop_timeout);
        if returned || slot.thread.is_finished() {
            self.reap(&mut slot);
            self.state.store(TaskState::Stopped);
            return Ok(StopOutcome::AlreadyStopped);
        }

        self.state.store(TaskState::Stopped);
        slot.thread.request_stop();
        if slot.thread.wait_terminated(self.config.stop_timeout) {
            self.reap(&mut slot);
            debug!(target: "spark_ability::task", ability = %self.descriptor, "stopped");
            Ok(StopOutcome::Graceful)
        } else {
            slot.thread.delete();
            *self.worker.lock() = None;
            warn!(
                target: "spark_ability::task",
                ability = %self.descriptor,
                timeout_ms = self.config.stop_timeout.as_millis() as u64,
                "worker ignored the stop request; thread abandoned"
            );
            Ok(StopOutcome::Forced)
        }
    }

    fn state(&self) -> TaskState {
        self.state.load()
    }
}

impl<W> core::fmt::Debug for TaskAbility<W> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TaskAbility")
            .field("descriptor", &self.descriptor)
            .field("state", &self.state)
            .finish()
    }
}

impl<W> Drop for TaskAbility<W> {
    fn drop(&mut self) {
        let slot = self.slot.get_mut();
        if slot.thread.is_null() {
            return;
        }
        if *self.worker.get_mut() == Some(thread::current().id()) {
            return;
        }
        self.state.store(TaskState::Stopped);
        slot.thread.request_stop();
        if slot.thread.wait_terminated(self.config.stop_timeout) {
            let _ = slot.thread.join();
        } else {
            slot.thread.delete();
        }
    }
}
