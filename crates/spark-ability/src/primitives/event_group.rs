use core::{
    fmt,
    ops::{BitAnd, BitOr, BitOrAssign},
};

use parking_lot::{Condvar, Mutex};

use super::{IsrWake, Timeout};

/// 位信号组的位集合，低 24 位可用。
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EventBits(u32);

impl EventBits {
    pub const EMPTY: EventBits = EventBits(0);
    pub const USABLE_MASK: u32 = 0x00FF_FFFF;
    pub const WIDTH: u8 = 24;

    /// 超出可用位的部分被截断。
    pub const fn new(raw: u32) -> Self {
        Self(raw & Self::USABLE_MASK)
    }

    /// 第 `index` 位；`index` 超出宽度时得到空集合。
    pub const fn bit(index: u8) -> Self {
        if index >= Self::WIDTH {
            Self::EMPTY
        } else {
            Self(1 << index)
        }
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: EventBits) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: EventBits) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for EventBits {
    type Output = EventBits;

    fn bitor(self, rhs: Self) -> Self::Output {
        EventBits(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventBits {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for EventBits {
    type Output = EventBits;

    fn bitand(self, rhs: Self) -> Self::Output {
        EventBits(self.0 & rhs.0)
    }
}

impl fmt::Debug for EventBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBits({:#08x})", self.0)
    }
}

/// `wait_bits` 的匹配模式。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitMode {
    /// 所有目标位都置位才唤醒。
    All,
    /// 任一目标位置位即唤醒。
    Any,
}

impl WaitMode {
    fn satisfied(self, value: EventBits, wanted: EventBits) -> bool {
        match self {
            WaitMode::All => value.contains(wanted),
            WaitMode::Any => value.intersects(wanted),
        }
    }
}

/// 位信号组：置位/清位，并阻塞等待某个位模式成立。
///
/// # 教案式说明
/// - **意图 (Why)**：`ServiceAbility` 需要“线程睡到调用方标记有活可干”为止，且停止请求必须能
///   打断这种无限期等待；一组位即可同时表达“有请求”与“请停止”。
/// - **契约 (What)**：
///   - `wait_bits` 返回满足条件时观察到的组值（清位之前）；超时返回 `None`；
///   - `clear_on_exit` 为真时，匹配到的目标位在唤醒的同一临界区内被清除；
///   - `clear_bits` 返回清除之前的组值。
/// - **风险 (Trade-offs)**：多个等待者竞争同一位且都要求清位时，只有先被调度的一方能观察到它。
pub struct EventGroup {
    state: Mutex<GroupState>,
    changed: Condvar,
}

struct GroupState {
    value: EventBits,
    waiters: usize,
    // 每完成一次汇合递增，记录本轮的目标位与完成时的组值。
    rendezvous: u64,
    rendezvous_mask: EventBits,
    rendezvous_value: EventBits,
}

impl EventGroup {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GroupState {
                value: EventBits::EMPTY,
                waiters: 0,
                rendezvous: 0,
                rendezvous_mask: EventBits::EMPTY,
                rendezvous_value: EventBits::EMPTY,
            }),
            changed: Condvar::new(),
        }
    }

    /// 置位并唤醒所有等待者，返回置位后的组值。
    pub fn set_bits(&self, bits: EventBits) -> EventBits {
        self.set_inner(bits).0
    }

    /// 中断上下文置位，从不阻塞。
    pub fn set_bits_from_isr(&self, bits: EventBits) -> IsrWake {
        IsrWake::new(self.set_inner(bits).1)
    }

    fn set_inner(&self, bits: EventBits) -> (EventBits, bool) {
        let mut state = self.state.lock();
        state.value |= EventBits::new(bits.raw());
        let snapshot = state.value;
        let woken = state.waiters > 0;
        drop(state);
        self.changed.notify_all();
        (snapshot, woken)
    }

    /// 清位，返回清除之前的组值。
    pub fn clear_bits(&self, bits: EventBits) -> EventBits {
        let mut state = self.state.lock();
        let before = state.value;
        state.value = EventBits(before.0 & !bits.0);
        before
    }

    pub fn bits(&self) -> EventBits {
        self.state.lock().value
    }

    /// 阻塞直至 `bits` 按 `mode` 匹配。
    pub fn wait_bits(
        &self,
        bits: EventBits,
        mode: WaitMode,
        clear_on_exit: bool,
        timeout: Timeout,
    ) -> Option<EventBits> {
        let deadline = timeout.deadline();
        let mut state = self.state.lock();
        loop {
            let value = state.value;
            if mode.satisfied(value, bits) {
                if clear_on_exit {
                    state.value = EventBits(value.0 & !bits.0);
                }
                return Some(value);
            }
            if deadline.is_expired() {
                return None;
            }
            state.waiters += 1;
            deadline.wait(&self.changed, &mut state);
            state.waiters -= 1;
        }
    }

    /// 汇合点：先置 `set`，再等待 `wait_for` 全部置位，成功后清除 `wait_for`。
    ///
    /// 多个线程各自置一位并等待全部位，即可实现“所有人都到齐再继续”。
    pub fn sync(&self, set: EventBits, wait_for: EventBits, timeout: Timeout) -> Option<EventBits> {
        let deadline = timeout.deadline();
        let mut state = self.state.lock();
        state.value |= EventBits::new(set.raw());
        let mut entered = state.rendezvous;
        self.changed.notify_all();
        loop {
            if state.rendezvous != entered {
                // 本轮已由另一方完成并清位。
                if state.rendezvous_mask == wait_for {
                    return Some(state.rendezvous_value);
                }
                entered = state.rendezvous;
            }
            let value = state.value;
            if value.contains(wait_for) {
                state.value = EventBits(value.0 & !wait_for.0);
                state.rendezvous = state.rendezvous.wrapping_add(1);
                state.rendezvous_mask = wait_for;
                state.rendezvous_value = value;
                self.changed.notify_all();
                return Some(value);
            }
            if deadline.is_expired() {
                return None;
            }
            state.waiters += 1;
            deadline.wait(&self.changed, &mut state);
            state.waiters -= 1;
        }
    }
}

impl Default for EventGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventGroup").field(&self.bits()).finish()
    }
}
