//! # ability 模块说明
//!
//! ## 角色定位（Why）
//! - 为上层组件提供统一的“能力”外形：每个能力都有稳定的 `id`、可读的 `name` 与变体标签 `kind`；
//! - 四种变体覆盖嵌入式组件最常见的执行方式：调用方驱动的轮询、独占线程任务、
//!   类型化邮箱，以及按请求唤醒的服务线程。
//!
//! ## 设计要求（What）
//! - 基础契约由 [`Ability`] 承担；变体差异以能力特征（[`Updatable`]、[`Runnable`]、
//!   [`Mailbox`]、[`RequestDriven`]）表达，而不是运行时类型判定；
//! - 生命周期操作在错误状态下返回 [`AbilityError::InvalidState`](crate::AbilityError)，
//!   不改变对象状态；
//! - 停止操作返回 [`StopOutcome`]，调用方可以区分优雅退出与强制分离。
//!
//! ## 风险提示（Trade-offs）
//! - `id` 来自进程级计数器，仅在单次进程内唯一。

use core::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};
use std::borrow::Cow;

use crate::{Result, lifecycle::StopOutcome, primitives::Timeout};

mod polling;
mod queue;
mod service;
mod task;

pub use polling::{PollingAbility, PollingWork};
pub use queue::QueueAbility;
pub use service::{ServiceAbility, ServiceAbilityState, ServiceWork};
pub use task::{TaskAbility, TaskState, TaskWork};

/// 能力变体标签。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AbilityKind {
    #[default]
    None,
    Polling,
    Queue,
    Task,
    Service,
}

impl AbilityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AbilityKind::None => "none",
            AbilityKind::Polling => "polling",
            AbilityKind::Queue => "queue",
            AbilityKind::Task => "task",
            AbilityKind::Service => "service",
        }
    }
}

impl fmt::Display for AbilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 进程内唯一的能力标识。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AbilityId(u32);

impl AbilityId {
    /// 分配下一个标识；从 1 开始递增。
    pub fn next() -> Self {
        // 进程级计数器，不参与 loom 模型。
        static NEXT: AtomicU32 = AtomicU32::new(1);
        AbilityId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for AbilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 能力的身份信息。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AbilityDescriptor {
    kind: AbilityKind,
    id: AbilityId,
    name: Cow<'static, str>,
}

impl AbilityDescriptor {
    pub fn new(kind: AbilityKind, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            id: AbilityId::next(),
            name: name.into(),
        }
    }

    pub fn kind(&self) -> AbilityKind {
        self.kind
    }

    pub fn id(&self) -> AbilityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for AbilityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}({})", self.kind, self.id, self.name)
    }
}

/// 所有能力共享的基础契约。
pub trait Ability {
    fn descriptor(&self) -> &AbilityDescriptor;

    fn kind(&self) -> AbilityKind {
        self.descriptor().kind()
    }

    fn id(&self) -> AbilityId {
        self.descriptor().id()
    }

    fn name(&self) -> &str {
        self.descriptor().name()
    }
}

/// 由调用方在自己的线程上驱动的能力。
pub trait Updatable: Ability {
    fn update(&mut self);
}

/// 拥有独占 worker 线程的能力。
///
/// # 契约说明（What）
/// - `start`：仅在停止状态下合法；否则返回 `InvalidState` 且无副作用；
/// - `stop`：停止状态下返回 `Ok(StopOutcome::AlreadyStopped)`；在 worker 自身线程上调用返回
///   `SelfStop`；超过配置的停止上限后强制分离并返回 `Ok(StopOutcome::Forced)`。
pub trait Runnable: Ability {
    type State: Copy + fmt::Debug;

    fn start(&self) -> Result<()>;

    fn stop(&self) -> Result<StopOutcome>;

    fn state(&self) -> Self::State;
}

/// 类型化邮箱。
pub trait Mailbox<T>: Ability {
    fn send(&self, item: T, timeout: Timeout) -> core::result::Result<(), crate::SendError<T>>;

    fn receive(&self, timeout: Timeout) -> core::result::Result<T, crate::RecvError>;
}

/// 按请求唤醒的能力：调用方标记“有活可干”，worker 处理一次后回到空闲。
pub trait RequestDriven: Runnable {
    fn request_ready(&self);
}

#[cfg(all(test, not(any(loom, spark_loom))))]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let first = AbilityDescriptor::new(AbilityKind::Polling, "a");
        let second = AbilityDescriptor::new(AbilityKind::Polling, "b");
        assert!(second.id() > first.id());
        assert_ne!(first, second);
    }

    #[test]
    fn descriptor_display_names_kind_and_id() {
        let descriptor = AbilityDescriptor::new(AbilityKind::Queue, "uart-rx");
        let rendered = descriptor.to_string();
        assert!(rendered.starts_with("queue#"), "unexpected rendering: {rendered}");
        assert!(rendered.ends_with("(uart-rx)"));
        assert_eq!(AbilityKind::default(), AbilityKind::None);
    }
}
