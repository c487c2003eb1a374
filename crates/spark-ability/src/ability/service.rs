use std::{borrow::Cow, sync::Arc};

use tracing::{debug, trace};

use super::{
    Ability, AbilityDescriptor, AbilityKind, RequestDriven, Runnable, TaskAbility, TaskWork,
};
use crate::{
    config::TaskConfig,
    error::{AbilityError, Result},
    lifecycle::{AtomicState, LifecycleState, StopOutcome},
    primitives::{EventBits, EventGroup, IsrWake, ThreadControl, Timeout, WaitMode},
};

const REQUEST_BIT: EventBits = EventBits::bit(0);
const STOP_BIT: EventBits = EventBits::bit(1);

/// `ServiceAbility` 每被唤醒一次执行的工作。
pub trait ServiceWork: Send + 'static {
    fn process(&mut self);

    /// worker 线程启动后、处理第一个请求前调用。
    fn on_start(&mut self) {}

    /// worker 线程退出前调用。
    fn on_stop(&mut self) {}
}

/// 请求驱动能力的状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServiceAbilityState {
    Stopped = 0,
    Idle = 1,
    HasRequest = 2,
    Processing = 3,
}

impl LifecycleState for ServiceAbilityState {
    fn to_raw(self) -> u8 {
        self as u8
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => ServiceAbilityState::Idle,
            2 => ServiceAbilityState::HasRequest,
            3 => ServiceAbilityState::Processing,
            _ => ServiceAbilityState::Stopped,
        }
    }

    fn name(self) -> &'static str {
        match self {
            ServiceAbilityState::Stopped => "Stopped",
            ServiceAbilityState::Idle => "Idle",
            ServiceAbilityState::HasRequest => "HasRequest",
            ServiceAbilityState::Processing => "Processing",
        }
    }
}

/// 位信号门控的 worker 循环：睡到“有请求”或“请停止”位被置起为止。
struct GatedWorker<W> {
    work: W,
    signals: Arc<EventGroup>,
    state: Arc<AtomicState<ServiceAbilityState>>,
}

impl<W: ServiceWork> TaskWork for GatedWorker<W> {
    fn run(&mut self, ctl: &ThreadControl) {
        self.work.on_start();
        loop {
            let Some(observed) = self.signals.wait_bits(
                REQUEST_BIT | STOP_BIT,
                WaitMode::Any,
                true,
                Timeout::Forever,
            ) else {
                continue;
            };
            if observed.intersects(STOP_BIT) || ctl.is_stop_requested() {
                break;
            }
            if self
                .state
                .transition(ServiceAbilityState::HasRequest, ServiceAbilityState::Processing)
                .is_ok()
            {
                self.work.process();
                // 处理期间可能已被停止，此时保持 Stopped。
                let _ = self
                    .state
                    .transition(ServiceAbilityState::Processing, ServiceAbilityState::Idle);
            }
        }
        self.work.on_stop();
    }
}

/// 按请求唤醒的服务能力。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 适合“有事才干活”的外设：调用方在任意线程调用 `request_ready`，worker 处理一次后回到空闲；
/// - 空闲时 worker 阻塞在位信号组上，不消耗 CPU。
///
/// ## 逻辑 (How)
/// - 状态机：`Stopped -> Idle -> HasRequest -> Processing -> Idle`；
/// - `request_ready` 以 CAS 完成 `Idle -> HasRequest` 并置请求位；`stop` 置停止位打断无限期等待。
///
/// ## 契约 (What)
/// - 任意时刻至多一个待处理请求：非 `Idle` 状态下的 `request_ready` 被丢弃；
/// - `stop` 的语义与 [`TaskAbility`] 相同，包括强制分离与自我停止检测。
///
/// ## 注意事项 (Trade-offs)
/// - 被丢弃的请求不会排队；需要排队语义时请使用 [`Service`](crate::Service)。
pub struct ServiceAbility<W: ServiceWork> {
    task: TaskAbility<GatedWorker<W>>,
    signals: Arc<EventGroup>,
    state: Arc<AtomicState<ServiceAbilityState>>,
}

impl<W: ServiceWork> ServiceAbility<W> {
    pub fn new(name: impl Into<Cow<'static, str>>, config: TaskConfig, work: W) -> Self {
        let signals = Arc::new(EventGroup::new());
        let state = Arc::new(AtomicState::new(ServiceAbilityState::Stopped));
        let worker = GatedWorker {
            work,
            signals: Arc::clone(&signals),
            state: Arc::clone(&state),
        };
        Self {
            task: TaskAbility::from_parts(
                AbilityDescriptor::new(AbilityKind::Service, name),
                config,
                worker,
            ),
            signals,
            state,
        }
    }

    /// 中断上下文版本的 `request_ready`，返回是否唤醒了 worker。
    pub fn request_ready_from_isr(&self) -> IsrWake {
        match self
            .state
            .transition(ServiceAbilityState::Idle, ServiceAbilityState::HasRequest)
        {
            Ok(()) => self.signals.set_bits_from_isr(REQUEST_BIT),
            Err(_) => IsrWake::new(false),
        }
    }

    pub fn config(&self) -> &TaskConfig {
        self.task.config()
    }
}

impl<W: ServiceWork> Ability for ServiceAbility<W> {
    fn descriptor(&self) -> &AbilityDescriptor {
        self.task.descriptor()
    }
}

impl<W: ServiceWork> Runnable for ServiceAbility<W> {
    type State = ServiceAbilityState;

    fn start(&self) -> Result<()> {
        if let Err(current) = self
            .state
            .transition(ServiceAbilityState::Stopped, ServiceAbilityState::Idle)
        {
            return Err(AbilityError::invalid_state("start", current.name()));
        }
        // 请求位只在 Idle 之后才会被置起，这里只需清除上一轮遗留的停止位。
        self.signals.clear_bits(STOP_BIT);
        self.task.start().inspect_err(|_| {
            self.state.store(ServiceAbilityState::Stopped);
        })
    }

    fn stop(&self) -> Result<StopOutcome> {
        if self.task.is_worker_thread() {
            return Err(AbilityError::SelfStop {
                name: self.name().to_owned(),
            });
        }
        if self.state.swap(ServiceAbilityState::Stopped) == ServiceAbilityState::Stopped {
            return Ok(StopOutcome::AlreadyStopped);
        }
        self.signals.set_bits(STOP_BIT);
        // swap 已确认此前在运行；worker 可能在内层检查前就已退出。
        let outcome = match self.task.stop()? {
            StopOutcome::AlreadyStopped => StopOutcome::Graceful,
            outcome => outcome,
        };
        debug!(
            target: "spark_ability::service_ability",
            ability = %self.descriptor(),
            ?outcome,
            "stopped"
        );
        Ok(outcome)
    }

    fn state(&self) -> ServiceAbilityState {
        self.state.load()
    }
}

impl<W: ServiceWork> RequestDriven for ServiceAbility<W> {
    fn request_ready(&self) {
        match self
            .state
            .transition(ServiceAbilityState::Idle, ServiceAbilityState::HasRequest)
        {
            Ok(()) => {
                self.signals.set_bits(REQUEST_BIT);
            }
            Err(current) => trace!(
                target: "spark_ability::service_ability",
                ability = %self.descriptor(),
                state = current.name(),
                "request dropped; one is already pending or the ability is stopped"
            ),
        }
    }
}

impl<W: ServiceWork> core::fmt::Debug for ServiceAbility<W> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServiceAbility")
            .field("descriptor", self.task.descriptor())
            .field("state", &self.state.load())
            .finish()
    }
}

impl<W: ServiceWork> Drop for ServiceAbility<W> {
    fn drop(&mut self) {
        // 先置停止位，内层任务的析构才能在上限内等到 worker 退出。
        self.state.store(ServiceAbilityState::Stopped);
        self.signals.set_bits(STOP_BIT);
    }
}
