use std::borrow::Cow;

use super::{Ability, AbilityDescriptor, AbilityKind, Mailbox};
use crate::{
    error::{RecvError, Result, SendError, TryRecvError, TrySendError},
    primitives::{BoundedQueue, IsrWake, Timeout},
};

/// 以能力身份对外暴露的类型化有界邮箱。
///
/// # 契约说明（What）
/// - 容量在构造时固定，必须大于 0；
/// - 所有阻塞操作都接受 [`Timeout`]，超时以 `Err` 返回并归还载荷；
/// - `*_from_isr` 系列从不阻塞，可在任意上下文调用。
pub struct QueueAbility<T> {
    descriptor: AbilityDescriptor,
    queue: BoundedQueue<T>,
}

impl<T> QueueAbility<T> {
    pub fn new(name: impl Into<Cow<'static, str>>, capacity: usize) -> Result<Self> {
        Ok(Self {
            descriptor: AbilityDescriptor::new(AbilityKind::Queue, name),
            queue: BoundedQueue::with_capacity(capacity)?,
        })
    }

    pub fn send_to_front(
        &self,
        item: T,
        timeout: Timeout,
    ) -> core::result::Result<(), SendError<T>> {
        self.queue.send_to_front(item, timeout)
    }

    /// 满时覆盖最后一个元素。
    pub fn overwrite(&self, item: T) -> core::result::Result<(), SendError<T>> {
        self.queue.overwrite(item)
    }

    /// 清空邮箱，返回被丢弃的元素数。
    pub fn reset(&self) -> usize {
        self.queue.reset()
    }

    pub fn send_from_isr(&self, item: T) -> core::result::Result<IsrWake, TrySendError<T>> {
        self.queue.send_from_isr(item)
    }

    pub fn send_to_front_from_isr(
        &self,
        item: T,
    ) -> core::result::Result<IsrWake, TrySendError<T>> {
        self.queue.send_to_front_from_isr(item)
    }

    pub fn overwrite_from_isr(&self, item: T) -> core::result::Result<IsrWake, TrySendError<T>> {
        self.queue.overwrite_from_isr(item)
    }

    pub fn receive_from_isr(&self) -> core::result::Result<(T, IsrWake), TryRecvError> {
        self.queue.receive_from_isr()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn spaces_available(&self) -> usize {
        self.queue.spaces_available()
    }
}

impl<T: Clone> QueueAbility<T> {
    /// 读取队头而不移除。
    pub fn peek(&self, timeout: Timeout) -> core::result::Result<T, RecvError> {
        self.queue.peek(timeout)
    }
}

impl<T> Ability for QueueAbility<T> {
    fn descriptor(&self) -> &AbilityDescriptor {
        &self.descriptor
    }
}

impl<T> Mailbox<T> for QueueAbility<T> {
    fn send(&self, item: T, timeout: Timeout) -> core::result::Result<(), SendError<T>> {
        self.queue.send(item, timeout)
    }

    fn receive(&self, timeout: Timeout) -> core::result::Result<T, RecvError> {
        self.queue.receive(timeout)
    }
}

impl<T> core::fmt::Debug for QueueAbility<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QueueAbility")
            .field("descriptor", &self.descriptor)
            .field("queue", &self.queue)
            .finish()
    }
}
