//! 原语层：唯一直接触碰调度器的一层。
//!
//! 线程句柄、有界队列、锁族与位信号组都是薄封装，只补充空安全与类型化载荷，
//! 不附加任何策略。Ability 框架与 Service 执行体只通过这里访问调度器。

mod event_group;
mod lock;
mod queue;
mod thread;
mod timeout;

pub use event_group::{EventBits, EventGroup, WaitMode};
pub use lock::{
    BinaryLock, CountingLock, Mutex, MutexGuard, RecursiveMutex, RecursiveMutexGuard, Semaphore,
};
pub use queue::BoundedQueue;
pub use thread::{ThreadControl, ThreadHandle, ThreadState};
pub use timeout::Timeout;

/// 中断上下文操作的唤醒报告。
///
/// 中断路径从不阻塞；`higher_priority_woken` 为 `true` 表示本次操作释放了一个阻塞中的等待方，
/// 调用方应在退出中断前请求一次调度。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IsrWake {
    pub higher_priority_woken: bool,
}

impl IsrWake {
    pub(crate) const fn new(higher_priority_woken: bool) -> Self {
        Self {
            higher_priority_woken,
        }
    }
}
