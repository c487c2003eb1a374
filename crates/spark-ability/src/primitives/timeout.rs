use std::time::{Duration, Instant};

use parking_lot::{Condvar, MutexGuard};

/// 阻塞操作的等待上限。
///
/// # 契约说明（What）
/// - `NoWait`：条件不满足时立即返回；
/// - `After(d)`：最多阻塞 `d`；
/// - `Forever`：无限期阻塞，直到条件满足或对象被关闭。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Timeout {
    NoWait,
    After(Duration),
    #[default]
    Forever,
}

impl Timeout {
    pub const fn millis(ms: u64) -> Self {
        Timeout::After(Duration::from_millis(ms))
    }

    pub(crate) fn deadline(self) -> Deadline {
        let at = match self {
            Timeout::NoWait => Some(Instant::now()),
            // 溢出的时长按“永不超时”处理。
            Timeout::After(duration) => Instant::now().checked_add(duration),
            Timeout::Forever => None,
        };
        Deadline { at }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        if duration.is_zero() {
            Timeout::NoWait
        } else {
            Timeout::After(duration)
        }
    }
}

/// 绝对截止点；`None` 表示无限期。
#[derive(Clone, Copy, Debug)]
pub(crate) struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub(crate) fn is_expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// 在条件变量上等待一次；唤醒可能是虚假的，调用方必须循环复查条件。
    pub(crate) fn wait<T>(&self, condvar: &Condvar, guard: &mut MutexGuard<'_, T>) {
        match self.at {
            None => condvar.wait(guard),
            Some(at) => {
                let _ = condvar.wait_until(guard, at);
            }
        }
    }
}
