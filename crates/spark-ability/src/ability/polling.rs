use std::borrow::Cow;

use tracing::trace;

use super::{Ability, AbilityDescriptor, AbilityKind, Updatable};

/// 一次轮询要做的工作。
pub trait PollingWork: Send {
    fn update(&mut self);
}

impl<F> PollingWork for F
where
    F: FnMut() + Send,
{
    fn update(&mut self) {
        self()
    }
}

/// 由调用方周期性驱动的能力，自身不拥有线程。
///
/// 典型用法是在主循环中逐个调用已注册能力的 `update`；`update` 在调用方线程上同步执行，
/// 因此工作体不应阻塞。
pub struct PollingAbility<W> {
    descriptor: AbilityDescriptor,
    work: W,
    updates: u64,
}

impl<W: PollingWork> PollingAbility<W> {
    pub fn new(name: impl Into<Cow<'static, str>>, work: W) -> Self {
        Self {
            descriptor: AbilityDescriptor::new(AbilityKind::Polling, name),
            work,
            updates: 0,
        }
    }

    /// 连续驱动 `rounds` 次。
    pub fn update_for(&mut self, rounds: usize) {
        for _ in 0..rounds {
            self.update();
        }
    }

    /// 累计被驱动的次数。
    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn work(&self) -> &W {
        &self.work
    }

    pub fn work_mut(&mut self) -> &mut W {
        &mut self.work
    }

    pub fn into_inner(self) -> W {
        self.work
    }
}

impl<W> Ability for PollingAbility<W> {
    fn descriptor(&self) -> &AbilityDescriptor {
        &self.descriptor
    }
}

impl<W: PollingWork> Updatable for PollingAbility<W> {
    fn update(&mut self) {
        self.work.update();
        self.updates = self.updates.wrapping_add(1);
        trace!(target: "spark_ability::polling", ability = %self.descriptor, "polled");
    }
}

impl<W> core::fmt::Debug for PollingAbility<W> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PollingAbility")
            .field("descriptor", &self.descriptor)
            .field("updates", &self.updates)
            .finish()
    }
}
