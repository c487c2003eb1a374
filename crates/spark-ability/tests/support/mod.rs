//! 集成测试共享的辅助函数。

#![allow(dead_code)]

use std::{
    thread,
    time::{Duration, Instant},
};

use tracing_subscriber::EnvFilter;

/// 安装一次 `fmt` 订阅者；`RUST_LOG=spark_ability=trace` 可查看生命周期轨迹。
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// 在 `ceiling` 内轮询条件，超时返回 `false`。
pub fn eventually(ceiling: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while !condition() {
        if started.elapsed() >= ceiling {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
    true
}
