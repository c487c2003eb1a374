//! 构造期配置值对象。
//!
//! ### 设计目的（Why）
//! - 线程名、栈预算、优先级、核亲和性与队列深度都是“平铺”的值对象，在 `start` 时复制进 worker，
//!   运行期不支持动态重配置；
//! - 与工作区其他配置一样支持从 TOML 片段加载，时长统一以毫秒（`*_ms` 键）书写。
//!
//! ### 契约说明（What）
//! - 所有结构体都带 `#[serde(default)]`，缺省键回落到 [`Default`]；
//! - `from_toml_str` 在解析后立即调用 `validate`，非法值返回 [`AbilityError::InvalidConfig`]。
//!
//! ### 示例
//! ```
//! use spark_ability::ServiceConfig;
//!
//! let config = ServiceConfig::from_toml_str(
//!     r#"
//!     request_queue_depth = 4
//!     response_queue_depth = 2
//!     stop_timeout_ms = 500
//!
//!     [thread]
//!     name = "codec"
//!     priority = 7
//!     core = 1
//!     "#,
//! )
//! .expect("valid config");
//! assert_eq!(config.thread.name, "codec");
//! assert_eq!(config.request_queue_depth, 4);
//! ```

use core::{fmt, time::Duration};

use serde::{Deserialize, Deserializer};

use crate::error::{AbilityError, Result};

/// 宿主线程的最小栈；嵌入式栈预算以字节计，直接用于宿主线程会过小。
pub const HOST_MIN_STACK_SIZE: usize = 64 * 1024;

pub const DEFAULT_STACK_SIZE: usize = 4096;
pub const DEFAULT_QUEUE_DEPTH: usize = 8;
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_TASK_STOP_TIMEOUT: Duration = Duration::from_millis(5_000);
pub const DEFAULT_SERVICE_STOP_TIMEOUT: Duration = Duration::from_millis(1_000);

/// 逻辑调度优先级，数值越大越优先。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(transparent)]
pub struct Priority(u8);

impl Priority {
    pub const IDLE: Priority = Priority(0);
    pub const DEFAULT: Priority = Priority(5);

    pub const fn new(level: u8) -> Self {
        Self(level)
    }

    pub const fn level(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::DEFAULT
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// worker 线程的核亲和性提示。
///
/// TOML 中省略 `core` 即为 `Any`，给出整数即绑定到对应核心。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "Option<u16>")]
pub enum CoreAffinity {
    #[default]
    Any,
    Core(u16),
}

impl From<Option<u16>> for CoreAffinity {
    fn from(core: Option<u16>) -> Self {
        core.map_or(CoreAffinity::Any, CoreAffinity::Core)
    }
}

impl fmt::Display for CoreAffinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreAffinity::Any => f.write_str("any"),
            CoreAffinity::Core(core) => write!(f, "core{core}"),
        }
    }
}

/// 单个 worker 线程的构造参数。
///
/// # 契约说明（What）
/// - `name`：线程名，同时作为日志中的 `ability.name`；不得为空；
/// - `stack_size`：栈预算（字节）；宿主上不足 [`HOST_MIN_STACK_SIZE`] 时按下限分配；
/// - `priority` / `core`：记录为线程的逻辑属性，宿主调度器不保证遵守。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ThreadSpec {
    pub name: String,
    pub stack_size: usize,
    pub priority: Priority,
    pub core: CoreAffinity,
}

impl ThreadSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_core(mut self, core: CoreAffinity) -> Self {
        self.core = core;
        self
    }

    /// 宿主上实际申请的栈大小。
    pub fn host_stack_size(&self) -> usize {
        self.stack_size.max(HOST_MIN_STACK_SIZE)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AbilityError::InvalidConfig {
                field: "thread.name",
                reason: "thread name must not be empty".to_owned(),
            });
        }
        if self.name.contains('\0') {
            return Err(AbilityError::InvalidConfig {
                field: "thread.name",
                reason: "thread name must not contain NUL bytes".to_owned(),
            });
        }
        Ok(())
    }
}

impl Default for ThreadSpec {
    fn default() -> Self {
        Self {
            name: "spark-worker".to_owned(),
            stack_size: DEFAULT_STACK_SIZE,
            priority: Priority::DEFAULT,
            core: CoreAffinity::Any,
        }
    }
}

/// `TaskAbility` 与 `ServiceAbility` 的配置。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub thread: ThreadSpec,
    /// 优雅停止的等待上限，超出后强制分离线程。
    #[serde(rename = "stop_timeout_ms", deserialize_with = "duration_ms")]
    pub stop_timeout: Duration,
}

impl TaskConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            thread: ThreadSpec::new(name),
            ..Self::default()
        }
    }

    pub fn with_thread(mut self, thread: ThreadSpec) -> Self {
        self.thread = thread;
        self
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.thread.validate()
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            thread: ThreadSpec::default(),
            stop_timeout: DEFAULT_TASK_STOP_TIMEOUT,
        }
    }
}

/// `Service` 的配置。
///
/// # 教案式说明
/// - **意图 (Why)**：请求与响应两个方向各有一个有界 FIFO，深度决定背压出现的时机。
/// - **契约 (What)**：
///   - `request_queue_depth` / `response_queue_depth` 必须大于 0；
///   - `receive_timeout` 是 worker 的协作取消检查点间隔，同时约束停止延迟的上界，必须大于 0；
///   - `stop_timeout` 是 `stop` 等待 worker 退出的上限，超出即强制分离。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub thread: ThreadSpec,
    pub request_queue_depth: usize,
    pub response_queue_depth: usize,
    #[serde(rename = "receive_timeout_ms", deserialize_with = "duration_ms")]
    pub receive_timeout: Duration,
    #[serde(rename = "stop_timeout_ms", deserialize_with = "duration_ms")]
    pub stop_timeout: Duration,
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            thread: ThreadSpec::new(name),
            ..Self::default()
        }
    }

    pub fn with_thread(mut self, thread: ThreadSpec) -> Self {
        self.thread = thread;
        self
    }

    pub fn with_queue_depths(mut self, request: usize, response: usize) -> Self {
        self.request_queue_depth = request;
        self.response_queue_depth = response;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.thread.priority = priority;
        self
    }

    pub fn with_core(mut self, core: CoreAffinity) -> Self {
        self.thread.core = core;
        self
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.thread.stack_size = stack_size;
        self
    }

    pub fn with_receive_timeout(mut self, receive_timeout: Duration) -> Self {
        self.receive_timeout = receive_timeout;
        self
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.thread.validate()?;
        if self.request_queue_depth == 0 {
            return Err(AbilityError::InvalidConfig {
                field: "request_queue_depth",
                reason: "queue depth must be at least 1".to_owned(),
            });
        }
        if self.response_queue_depth == 0 {
            return Err(AbilityError::InvalidConfig {
                field: "response_queue_depth",
                reason: "queue depth must be at least 1".to_owned(),
            });
        }
        if self.receive_timeout.is_zero() {
            return Err(AbilityError::InvalidConfig {
                field: "receive_timeout_ms",
                reason: "the cancellation checkpoint interval must be positive".to_owned(),
            });
        }
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            thread: ThreadSpec::new("spark-service"),
            request_queue_depth: DEFAULT_QUEUE_DEPTH,
            response_queue_depth: DEFAULT_QUEUE_DEPTH,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            stop_timeout: DEFAULT_SERVICE_STOP_TIMEOUT,
        }
    }
}

fn duration_ms<'de, D>(deserializer: D) -> core::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = ServiceConfig::from_toml_str("request_queue_depth = 3").expect("valid");
        assert_eq!(config.request_queue_depth, 3);
        assert_eq!(config.response_queue_depth, DEFAULT_QUEUE_DEPTH);
        assert_eq!(config.receive_timeout, DEFAULT_RECEIVE_TIMEOUT);
        assert_eq!(config.stop_timeout, DEFAULT_SERVICE_STOP_TIMEOUT);
        assert_eq!(config.thread.core, CoreAffinity::Any);
    }

    #[test]
    fn zero_depth_is_rejected() {
        let err = ServiceConfig::from_toml_str("response_queue_depth = 0").unwrap_err();
        assert!(matches!(
            err,
            AbilityError::InvalidConfig {
                field: "response_queue_depth",
                ..
            }
        ));
    }

    #[test]
    fn task_config_reads_thread_table() {
        let config = TaskConfig::from_toml_str(
            r#"
            stop_timeout_ms = 250

            [thread]
            name = "blinker"
            stack_size = 2048
            priority = 2
            "#,
        )
        .expect("valid");
        assert_eq!(config.stop_timeout, Duration::from_millis(250));
        assert_eq!(config.thread.priority, Priority::new(2));
        assert_eq!(config.thread.host_stack_size(), HOST_MIN_STACK_SIZE);
    }

    #[test]
    fn malformed_toml_surfaces_parse_error() {
        let err = TaskConfig::from_toml_str("stop_timeout_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, AbilityError::ConfigParse(_)));
    }

    #[test]
    fn nul_in_thread_name_is_rejected() {
        let err = ServiceConfig::new("bad\0name").validate().unwrap_err();
        assert!(matches!(
            err,
            AbilityError::InvalidConfig {
                field: "thread.name",
                ..
            }
        ));
    }

    #[test]
    fn empty_thread_name_is_rejected() {
        let err = TaskConfig::new("  ").validate().unwrap_err();
        assert!(matches!(
            err,
            AbilityError::InvalidConfig {
                field: "thread.name",
                ..
            }
        ));
    }
}
