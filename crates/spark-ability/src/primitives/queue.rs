use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use super::{IsrWake, Timeout};
use crate::error::{AbilityError, RecvError, Result, SendError, TryRecvError, TrySendError};

/// 固定容量的类型化 FIFO。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 为 worker 与调用方之间的唯一共享数据提供通道：所有修改都经由队列自身的阻塞操作完成，
///   调用方不得绕过它直接访问内容；
/// - 有界容量即背压：队列满时发送方阻塞或超时，而不是无限增长。
///
/// ## 逻辑 (How)
/// - `parking_lot::Mutex` 保护 `VecDeque` 与等待者计数，两个条件变量分别唤醒“等空间”与“等数据”的一方；
/// - 等待者计数只用于中断路径的唤醒报告，阻塞路径不依赖它。
///
/// ## 契约 (What)
/// - `0 <= len <= capacity` 始终成立；`overwrite` 在满载时替换最新的一项，对深度为 1 的
///   “最新值”队列即为原地替换；
/// - `close` 之后发送立即失败，接收方先取完剩余元素再得到 [`RecvError::Closed`]；
/// - 中断变体（`*_from_isr`）从不阻塞。
///
/// ## 注意事项 (Trade-offs)
/// - `peek` 需要 `T: Clone`，因为锁内引用不能安全地交给调用方长期持有。
pub struct BoundedQueue<T> {
    capacity: usize,
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
    waiting_senders: usize,
    waiting_receivers: usize,
}

#[derive(Clone, Copy)]
enum End {
    Front,
    Back,
}

impl<T> BoundedQueue<T> {
    /// 创建容量为 `capacity` 的队列；容量为 0 视为资源创建失败。
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(AbilityError::ResourceCreation {
                resource: "queue",
                detail: "capacity must be at least 1".to_owned(),
            });
        }
        Ok(Self {
            capacity,
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
                waiting_senders: 0,
                waiting_receivers: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        })
    }

    /// 追加到队尾。
    pub fn send(&self, item: T, timeout: Timeout) -> core::result::Result<(), SendError<T>> {
        self.enqueue(item, End::Back, timeout)
    }

    /// 与 [`send`](Self::send) 相同。
    pub fn send_back(&self, item: T, timeout: Timeout) -> core::result::Result<(), SendError<T>> {
        self.enqueue(item, End::Back, timeout)
    }

    /// 插入队首，下一次接收即取到它。
    pub fn send_to_front(
        &self,
        item: T,
        timeout: Timeout,
    ) -> core::result::Result<(), SendError<T>> {
        self.enqueue(item, End::Front, timeout)
    }

    fn enqueue(
        &self,
        item: T,
        end: End,
        timeout: Timeout,
    ) -> core::result::Result<(), SendError<T>> {
        let deadline = timeout.deadline();
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(SendError::Closed(item));
            }
            if state.items.len() < self.capacity {
                push(&mut state.items, item, end);
                drop(state);
                self.not_empty.notify_one();
                return Ok(());
            }
            if deadline.is_expired() {
                return Err(SendError::Timeout(item));
            }
            state.waiting_senders += 1;
            deadline.wait(&self.not_full, &mut state);
            state.waiting_senders -= 1;
        }
    }

    /// 取出队首元素。
    pub fn receive(&self, timeout: Timeout) -> core::result::Result<T, RecvError> {
        let deadline = timeout.deadline();
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Ok(item);
            }
            if state.closed {
                return Err(RecvError::Closed);
            }
            if deadline.is_expired() {
                return Err(RecvError::Timeout);
            }
            state.waiting_receivers += 1;
            deadline.wait(&self.not_empty, &mut state);
            state.waiting_receivers -= 1;
        }
    }

    /// 以“最新值优先”语义写入，从不阻塞。
    ///
    /// 队列未满时等同于追加；满载时替换队尾（最新）元素。
    pub fn overwrite(&self, item: T) -> core::result::Result<(), SendError<T>> {
        self.overwrite_inner(item)
            .map(|_| ())
            .map_err(SendError::Closed)
    }

    fn overwrite_inner(&self, item: T) -> core::result::Result<IsrWake, T> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(item);
        }
        if state.items.len() >= self.capacity {
            state.items.pop_back();
        }
        state.items.push_back(item);
        let woken = state.waiting_receivers > 0;
        drop(state);
        self.not_empty.notify_one();
        Ok(IsrWake::new(woken))
    }

    /// 丢弃所有排队元素，容量不变。返回被丢弃的数量。
    pub fn reset(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.items.len();
        state.items.clear();
        drop(state);
        self.not_full.notify_all();
        dropped
    }

    /// 关闭队列并唤醒所有等待者；拥有者在释放队列前调用。
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.state.lock().items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn spaces_available(&self) -> usize {
        self.capacity - self.state.lock().items.len()
    }

    pub fn send_from_isr(&self, item: T) -> core::result::Result<IsrWake, TrySendError<T>> {
        self.try_enqueue(item, End::Back)
    }

    pub fn send_to_front_from_isr(
        &self,
        item: T,
    ) -> core::result::Result<IsrWake, TrySendError<T>> {
        self.try_enqueue(item, End::Front)
    }

    pub fn overwrite_from_isr(&self, item: T) -> core::result::Result<IsrWake, TrySendError<T>> {
        self.overwrite_inner(item).map_err(TrySendError::Closed)
    }

    pub fn receive_from_isr(&self) -> core::result::Result<(T, IsrWake), TryRecvError> {
        let mut state = self.state.lock();
        match state.items.pop_front() {
            Some(item) => {
                let woken = state.waiting_senders > 0;
                drop(state);
                self.not_full.notify_one();
                Ok((item, IsrWake::new(woken)))
            }
            None if state.closed => Err(TryRecvError::Closed),
            None => Err(TryRecvError::Empty),
        }
    }

    fn try_enqueue(&self, item: T, end: End) -> core::result::Result<IsrWake, TrySendError<T>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TrySendError::Closed(item));
        }
        if state.items.len() >= self.capacity {
            return Err(TrySendError::Full(item));
        }
        push(&mut state.items, item, end);
        let woken = state.waiting_receivers > 0;
        drop(state);
        self.not_empty.notify_one();
        Ok(IsrWake::new(woken))
    }
}

impl<T: Clone> BoundedQueue<T> {
    /// 查看队首元素而不取出。
    pub fn peek(&self, timeout: Timeout) -> core::result::Result<T, RecvError> {
        let deadline = timeout.deadline();
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.front() {
                return Ok(item.clone());
            }
            if state.closed {
                return Err(RecvError::Closed);
            }
            if deadline.is_expired() {
                return Err(RecvError::Timeout);
            }
            state.waiting_receivers += 1;
            deadline.wait(&self.not_empty, &mut state);
            state.waiting_receivers -= 1;
        }
    }
}

impl<T> core::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity)
            .field("len", &state.items.len())
            .field("closed", &state.closed)
            .finish()
    }
}

fn push<T>(items: &mut VecDeque<T>, item: T, end: End) {
    match end {
        End::Front => items.push_front(item),
        End::Back => items.push_back(item),
    }
}
