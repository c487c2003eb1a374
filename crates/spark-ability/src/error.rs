//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义框架对外暴露的失败语义：资源创建失败、非法状态调用、自我停止、配置错误；
//! - 队列类操作使用独立的、携带原载荷的错误类型，超时时调用方可以原样取回数据重试。
//!
//! ## 设计要求（What）
//! - 超时是正常、可预期的结果，必须以 `Err` 值返回，绝不 panic；
//! - 非法状态调用（重复 `start` 等）返回 [`AbilityError::InvalidState`] 且不产生任何副作用，
//!   调用方可以安全地忽略；
//! - 所有错误都是本地、同步返回的，框架不做重试（`Service` worker 的响应发送循环除外）。

use core::fmt;

use thiserror::Error;

/// 框架级结果别名。
pub type Result<T, E = AbilityError> = core::result::Result<T, E>;

/// Ability 与 Service 生命周期操作的错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：把嵌入式目标上“返回 false”的几类失败拆成可匹配的枚举，让调用方能区分
///   “资源不足需要降级”与“调用时机不对可以忽略”。
/// - **契约 (What)**：
///   - `ResourceCreation`：队列或线程分配失败，已分配的部分资源已全部回滚；
///   - `InvalidState`：当前状态不允许该操作，对象状态保持不变；
///   - `SelfStop`：在 worker 自身线程上请求停止，若放行将自我阻塞，因此直接拒绝；
///   - `WorkerLost`：worker 曾被强制终止，其持有的用户状态随被放弃的线程一起丢失，无法重启；
///   - `InvalidConfig` / `ConfigParse`：配置值校验或 TOML 解析失败。
/// - **设计权衡 (Trade-offs)**：`state` 使用 `&'static str` 描述，避免错误类型携带泛型状态参数。
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AbilityError {
    #[error("failed to create {resource}: {detail}")]
    ResourceCreation {
        resource: &'static str,
        detail: String,
    },

    #[error("`{operation}` is not permitted while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("`{name}` cannot be stopped from its own worker thread")]
    SelfStop { name: String },

    #[error("worker state of `{name}` was abandoned by a forced termination")]
    WorkerLost { name: String },

    #[error("invalid configuration `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl AbilityError {
    pub(crate) fn invalid_state(operation: &'static str, state: &'static str) -> Self {
        AbilityError::InvalidState { operation, state }
    }

    /// 是否属于可以安全忽略的“调用时机不对”类错误。
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, AbilityError::InvalidState { .. })
    }
}

/// 阻塞入队失败，原样归还载荷。
///
/// - `Timeout`：在给定超时内队列一直处于满状态；
/// - `Closed`：队列已被拥有者关闭（通常发生在 `stop` 释放队列时）。
#[derive(Clone, PartialEq, Eq)]
pub enum SendError<T> {
    Timeout(T),
    Closed(T),
}

impl<T> SendError<T> {
    /// 取回未能入队的载荷。
    pub fn into_inner(self) -> T {
        match self {
            SendError::Timeout(item) | SendError::Closed(item) => item,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SendError::Timeout(_))
    }
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Timeout(_) => f.write_str("Timeout(..)"),
            SendError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Timeout(_) => f.write_str("timed out waiting for queue space"),
            SendError::Closed(_) => f.write_str("sending on a closed queue"),
        }
    }
}

impl<T> std::error::Error for SendError<T> {}

/// 阻塞出队/窥视失败。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum RecvError {
    #[error("timed out waiting for a queued item")]
    Timeout,
    #[error("receiving on a closed and drained queue")]
    Closed,
}

/// 中断上下文入队失败：中断路径从不阻塞，队列满即刻返回。
#[derive(Clone, PartialEq, Eq)]
pub enum TrySendError<T> {
    Full(T),
    Closed(T),
}

impl<T> TrySendError<T> {
    pub fn into_inner(self) -> T {
        match self {
            TrySendError::Full(item) | TrySendError::Closed(item) => item,
        }
    }
}

impl<T> fmt::Debug for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrySendError::Full(_) => f.write_str("Full(..)"),
            TrySendError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> fmt::Display for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrySendError::Full(_) => f.write_str("queue is full"),
            TrySendError::Closed(_) => f.write_str("sending on a closed queue"),
        }
    }
}

impl<T> std::error::Error for TrySendError<T> {}

/// 中断上下文出队失败。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum TryRecvError {
    #[error("queue is empty")]
    Empty,
    #[error("receiving on a closed and drained queue")]
    Closed,
}

/// `Service::request` 失败，原样归还请求。
///
/// # 教案式说明
/// - **意图 (Why)**：背压场景下调用方需要拿回请求，自行决定丢弃、降级还是稍后重试。
/// - **契约 (What)**：`Stopped` 表示服务未运行或请求队列已被释放；`Timeout` 表示请求队列
///   在超时内一直满载。
#[derive(Clone, PartialEq, Eq)]
pub enum RequestError<T> {
    Stopped(T),
    Timeout(T),
}

impl<T> RequestError<T> {
    pub fn into_inner(self) -> T {
        match self {
            RequestError::Stopped(request) | RequestError::Timeout(request) => request,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RequestError::Timeout(_))
    }
}

impl<T> fmt::Debug for RequestError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Stopped(_) => f.write_str("Stopped(..)"),
            RequestError::Timeout(_) => f.write_str("Timeout(..)"),
        }
    }
}

impl<T> fmt::Display for RequestError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Stopped(_) => f.write_str("service is not running"),
            RequestError::Timeout(_) => f.write_str("timed out waiting for request queue space"),
        }
    }
}

impl<T> std::error::Error for RequestError<T> {}

/// `Service::wait_response` 失败。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ResponseError {
    #[error("service is not running")]
    Stopped,
    #[error("timed out waiting for a response")]
    Timeout,
}
