//! 锁族：二值锁、计数锁、互斥锁与递归互斥锁。
//!
//! 四者共享同一个计数信号量内核；互斥锁族以 RAII 守卫归还，避免遗忘释放。

use std::{
    marker::PhantomData,
    thread::{self, ThreadId},
};

use parking_lot::Condvar;

use super::{IsrWake, Timeout};
use crate::error::{AbilityError, Result};

/// 上限受限的计数信号量。
///
/// # 契约说明（What）
/// - `take` 在计数为 0 时阻塞直至超时；
/// - `give` 在计数已达上限时返回 `false`，不会越界；
/// - `give_from_isr` 从不阻塞，返回是否释放了阻塞中的获取方。
pub struct Semaphore {
    max: usize,
    state: parking_lot::Mutex<SemaphoreState>,
    available: Condvar,
}

struct SemaphoreState {
    count: usize,
    waiters: usize,
}

impl Semaphore {
    pub fn new(max: usize, initial: usize) -> Result<Self> {
        if max == 0 || initial > max {
            return Err(AbilityError::ResourceCreation {
                resource: "semaphore",
                detail: format!("initial count {initial} must be within 1..={max}"),
            });
        }
        Ok(Self::bounded(max, initial))
    }

    fn bounded(max: usize, initial: usize) -> Self {
        Self {
            max,
            state: parking_lot::Mutex::new(SemaphoreState {
                count: initial,
                waiters: 0,
            }),
            available: Condvar::new(),
        }
    }

    pub fn take(&self, timeout: Timeout) -> bool {
        let deadline = timeout.deadline();
        let mut state = self.state.lock();
        loop {
            if state.count > 0 {
                state.count -= 1;
                return true;
            }
            if deadline.is_expired() {
                return false;
            }
            state.waiters += 1;
            deadline.wait(&self.available, &mut state);
            state.waiters -= 1;
        }
    }

    pub fn give(&self) -> bool {
        self.give_inner().is_some()
    }

    pub fn give_from_isr(&self) -> Option<IsrWake> {
        self.give_inner()
    }

    fn give_inner(&self) -> Option<IsrWake> {
        let mut state = self.state.lock();
        if state.count >= self.max {
            return None;
        }
        state.count += 1;
        let woken = state.waiters > 0;
        drop(state);
        self.available.notify_one();
        Some(IsrWake::new(woken))
    }

    pub fn count(&self) -> usize {
        self.state.lock().count
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

/// 二值锁：创建时为空，需先 `give` 才能被 `take`，常用于“事件已发生”的一次性通知。
pub struct BinaryLock {
    inner: Semaphore,
}

impl BinaryLock {
    pub fn new() -> Self {
        Self {
            inner: Semaphore::bounded(1, 0),
        }
    }

    pub fn take(&self, timeout: Timeout) -> bool {
        self.inner.take(timeout)
    }

    pub fn give(&self) -> bool {
        self.inner.give()
    }

    pub fn give_from_isr(&self) -> Option<IsrWake> {
        self.inner.give_from_isr()
    }

    pub fn is_available(&self) -> bool {
        self.inner.count() == 1
    }
}

impl Default for BinaryLock {
    fn default() -> Self {
        Self::new()
    }
}

/// 计数锁：计数在 `0..=max` 之间浮动。
pub struct CountingLock {
    inner: Semaphore,
}

impl CountingLock {
    pub fn new(max: usize, initial: usize) -> Result<Self> {
        Semaphore::new(max, initial).map(|inner| Self { inner })
    }

    pub fn take(&self, timeout: Timeout) -> bool {
        self.inner.take(timeout)
    }

    pub fn give(&self) -> bool {
        self.inner.give()
    }

    pub fn give_from_isr(&self) -> Option<IsrWake> {
        self.inner.give_from_isr()
    }

    pub fn count(&self) -> usize {
        self.inner.count()
    }

    pub fn max(&self) -> usize {
        self.inner.max()
    }
}

/// 无所有者的互斥锁：只保证排他，不记录持有线程。
pub struct Mutex {
    inner: Semaphore,
}

impl Mutex {
    /// 创建处于“未持有”状态的互斥锁。
    pub fn new() -> Self {
        Self {
            inner: Semaphore::bounded(1, 1),
        }
    }

    /// 获取锁；超时返回 `None`。守卫析构时自动释放。
    pub fn lock(&self, timeout: Timeout) -> Option<MutexGuard<'_>> {
        // 守卫必须惰性构造：获取失败时构造出的守卫析构会错误地归还计数。
        self.inner
            .take(timeout)
            .then(|| MutexGuard { lock: &self.inner })
    }

    pub fn is_locked(&self) -> bool {
        self.inner.count() == 0
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct MutexGuard<'a> {
    lock: &'a Semaphore,
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        self.lock.give();
    }
}

/// 递归互斥锁：同一线程可重复获取，获取与释放次数相等时才真正解锁。
///
/// 守卫不是 `Send`，必须在获取它的线程上释放。
pub struct RecursiveMutex {
    state: parking_lot::Mutex<Ownership>,
    released: Condvar,
}

#[derive(Default)]
struct Ownership {
    owner: Option<ThreadId>,
    depth: usize,
}

impl RecursiveMutex {
    pub fn new() -> Self {
        Self {
            state: parking_lot::Mutex::new(Ownership::default()),
            released: Condvar::new(),
        }
    }

    pub fn lock(&self, timeout: Timeout) -> Option<RecursiveMutexGuard<'_>> {
        let me = thread::current().id();
        let deadline = timeout.deadline();
        let mut state = self.state.lock();
        loop {
            match state.owner {
                Some(owner) if owner == me => {
                    state.depth += 1;
                    break;
                }
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    break;
                }
                Some(_) => {
                    if deadline.is_expired() {
                        return None;
                    }
                    deadline.wait(&self.released, &mut state);
                }
            }
        }
        Some(RecursiveMutexGuard {
            lock: self,
            _not_send: PhantomData,
        })
    }

    /// 当前持有深度；未被持有时为 0。
    pub fn depth(&self) -> usize {
        self.state.lock().depth
    }

    fn unlock(&self) {
        let mut state = self.state.lock();
        state.depth = state.depth.saturating_sub(1);
        if state.depth == 0 {
            state.owner = None;
            drop(state);
            self.released.notify_one();
        }
    }
}

impl Default for RecursiveMutex {
    fn default() -> Self {
        Self::new()
    }
}

#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct RecursiveMutexGuard<'a> {
    lock: &'a RecursiveMutex,
    _not_send: PhantomData<*const ()>,
}

impl Drop for RecursiveMutexGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}
