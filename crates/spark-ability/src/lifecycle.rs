//! 跨线程共享的生命周期状态。
//!
//! # 教案式导航
//! - **动机（Why）**：`Service::stop` 与 `TaskAbility::stop` 的等待逻辑依赖于及时观察到 worker
//!   自己写入的状态；普通字段无法提供跨线程可见性，因此所有生命周期枚举都以
//!   [`AtomicState`] 承载，转换通过 `compare_exchange` 守护。
//! - **结构（How）**：枚举实现 [`LifecycleState`] 完成 `u8` 编解码；启用 `--cfg loom` 时切换到
//!   Loom 的原子类型，以便模型检查穷举调度交错。
//! - **契约（What）**：写入使用 Release，读取使用 Acquire；`transition` 失败时返回实际观察到的状态。

use core::{fmt, marker::PhantomData};
//
// 教案级说明：为了让 Loom 在模型检查阶段能够捕获原子操作的所有调度交错，
// 当启用 `--cfg loom` 时切换到它提供的原子类型。
#[cfg(not(any(loom, spark_loom)))]
use core::sync::atomic::{AtomicU8, Ordering};
#[cfg(any(loom, spark_loom))]
use loom::sync::atomic::{AtomicU8, Ordering};

/// 可存放在 [`AtomicState`] 中的生命周期枚举。
pub trait LifecycleState: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    fn to_raw(self) -> u8;

    /// 解码原始值；未知值一律视为终止态，保证读取方不会观察到“不存在的状态”。
    fn from_raw(raw: u8) -> Self;

    /// 状态名称，用于日志字段与 [`AbilityError::InvalidState`](crate::AbilityError::InvalidState)。
    fn name(self) -> &'static str;
}

/// 原子化的生命周期状态单元。
pub struct AtomicState<S> {
    raw: AtomicU8,
    _state: PhantomData<S>,
}

impl<S: LifecycleState> AtomicState<S> {
    pub fn new(initial: S) -> Self {
        Self {
            raw: AtomicU8::new(initial.to_raw()),
            _state: PhantomData,
        }
    }

    pub fn load(&self) -> S {
        S::from_raw(self.raw.load(Ordering::Acquire))
    }

    pub fn store(&self, state: S) {
        self.raw.store(state.to_raw(), Ordering::Release);
    }

    /// 无条件写入新状态并返回旧状态。
    pub fn swap(&self, state: S) -> S {
        S::from_raw(self.raw.swap(state.to_raw(), Ordering::AcqRel))
    }

    /// 仅当当前状态为 `from` 时切换到 `to`。
    ///
    /// 失败时返回实际观察到的状态，调用方据此决定忽略还是报告 `InvalidState`。
    pub fn transition(&self, from: S, to: S) -> Result<(), S> {
        self.raw
            .compare_exchange(from.to_raw(), to.to_raw(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(S::from_raw)
    }
}

impl<S: LifecycleState> fmt::Debug for AtomicState<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicState").field(&self.load()).finish()
    }
}

/// `stop` 走过的路径。
///
/// # 契约说明（What）
/// - `AlreadyStopped`：调用时对象已处于停止态，立即返回；
/// - `Graceful`：worker 在停止上限内观察到停止请求并自行退出，线程已回收；
/// - `Forced`：worker 未在上限内退出，线程被分离放弃；它正在使用的资源可能泄漏，
///   且其持有的用户状态不可再取回。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    AlreadyStopped,
    Graceful,
    Forced,
}

impl StopOutcome {
    pub fn is_forced(self) -> bool {
        matches!(self, StopOutcome::Forced)
    }
}

#[cfg(all(test, not(any(loom, spark_loom))))]
mod tests {
    use super::*;
    use crate::primitives::ThreadState;

    #[test]
    fn transition_reports_observed_state() {
        let state = AtomicState::new(ThreadState::Stopped);
        assert_eq!(
            state.transition(ThreadState::Running, ThreadState::Suspended),
            Err(ThreadState::Stopped)
        );
        assert!(
            state
                .transition(ThreadState::Stopped, ThreadState::Running)
                .is_ok()
        );
        assert_eq!(state.swap(ThreadState::Suspended), ThreadState::Running);
        assert_eq!(state.load(), ThreadState::Suspended);
    }
}
