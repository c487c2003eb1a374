#![deny(unsafe_code)]
#![doc = r#"
# spark-ability

## 设计动机（Why）
- **定位**：把调度器原语（执行线程、有界消息队列、计数/二值锁、位信号组）收敛为两类可复用抽象：
  带显式状态机的 **Ability** 生命周期框架，以及在专属 worker 线程上执行请求/响应的
  [`Service`](crate::service::Service) 执行体。
- **架构角色**：板级外设封装、显示/触控/音频驱动、装配序列都只是本 crate 的消费者，
  它们可以把阻塞调用放进 `Service` worker 中执行，但自身不引入任何并发逻辑。

## 核心契约（What）
- [`primitives`]：线程句柄、`BoundedQueue<T>`、锁族、`EventGroup`；只做空安全与类型化载荷，
  不附加策略；
- [`ability`]：`PollingAbility`、`TaskAbility`、`QueueAbility<T>`、`ServiceAbility` 四种变体，
  共享 `id/name/kind` 基础契约；
- [`service`]：`Service<P>`，独占线程 + 请求队列 + 响应队列 + 原子生命周期状态，提供背压与优雅关闭。

## 实现策略（How）
- 宿主目标上，“调度器原语”由 `std::thread` 与 `parking_lot::{Mutex, Condvar}` 实现；
  其余两层只依赖原语层，从不绕过它；
- 所有阻塞操作都接受 [`Timeout`]，超时是正常结果而非故障；
- 取消是协作式的：worker 在短超时接收或显式检查点上观察停止令牌。

## 风险与考量（Trade-offs）
- 宿主线程无法被强制杀死，`delete` 以“分离并放弃”实现；被放弃的线程可能泄漏其持有的资源；
- 线程优先级与核亲和性在宿主上仅作为记录值暴露，不改变操作系统调度。
"#]

pub mod ability;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod primitives;
pub mod service;

pub use ability::{
    Ability, AbilityDescriptor, AbilityId, AbilityKind, Mailbox, PollingAbility, PollingWork,
    QueueAbility, RequestDriven, Runnable, ServiceAbility, ServiceAbilityState, ServiceWork,
    TaskAbility, TaskState, TaskWork, Updatable,
};
pub use config::{CoreAffinity, Priority, ServiceConfig, TaskConfig, ThreadSpec};
pub use error::{
    AbilityError, RecvError, RequestError, ResponseError, Result, SendError, TryRecvError,
    TrySendError,
};
pub use lifecycle::{AtomicState, LifecycleState, StopOutcome};
pub use primitives::{
    BinaryLock, BoundedQueue, CountingLock, EventBits, EventGroup, IsrWake, Mutex, MutexGuard,
    RecursiveMutex, RecursiveMutexGuard, Semaphore, ThreadControl, ThreadHandle, ThreadState,
    Timeout, WaitMode,
};
pub use service::{FnProcessor, Processor, Service, ServiceState};
