//! # service 模块说明
//!
//! ## 角色定位（Why）
//! - 把“在专属线程上串行执行阻塞调用”的需求收敛为一个泛型执行体：调用方投递请求、
//!   稍后取回响应，worker 之外不存在任何共享可变状态；
//! - 显示、音频、外设驱动可以把耗时操作放进 `Service`，自身保持无锁。
//!
//! ## 设计要求（What）
//! - 请求与响应各走一个有界 FIFO，只有一个 worker，因此响应严格按请求提交顺序产生；
//! - worker 以短超时接收作为协作取消检查点，停止延迟以 `receive_timeout` 为量级；
//! - 响应队列满时 worker 在发送重试之间同样检查停止令牌，满载的响应队列不会让服务无法停止。
//!
//! ## 风险提示（Trade-offs）
//! - worker 卡死在 `Processor::process` 内部时只能在 `stop_timeout` 之后被强制分离，
//!   处理器随之丢失，服务无法再次启动。

use std::{
    sync::Arc,
    thread::{self, ThreadId},
    time::Duration,
};

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    config::ServiceConfig,
    error::{AbilityError, RecvError, RequestError, ResponseError, Result, SendError},
    lifecycle::{AtomicState, LifecycleState, StopOutcome},
    primitives::{BoundedQueue, ThreadControl, ThreadHandle, Timeout},
};

mod processor;

pub use processor::{FnProcessor, Processor};

/// `Service` 的生命周期状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServiceState {
    Stopped = 0,
    Idle = 1,
    Processing = 2,
}

impl LifecycleState for ServiceState {
    fn to_raw(self) -> u8 {
        self as u8
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => ServiceState::Idle,
            2 => ServiceState::Processing,
            _ => ServiceState::Stopped,
        }
    }

    fn name(self) -> &'static str {
        match self {
            ServiceState::Stopped => "Stopped",
            ServiceState::Idle => "Idle",
            ServiceState::Processing => "Processing",
        }
    }
}

/// 请求/响应执行体。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 一个实例独占一条 worker 线程、一个请求队列和一个响应队列，其身份就是这些资源；
///   因此 `Service` 不实现 `Clone`，跨线程共享时包在 `Arc` 中。
///
/// ## 逻辑 (How)
/// - 两个队列以 `ArcSwapOption` 发布：调用方路径只做一次无锁加载，`stop` 原子地摘下队列并关闭，
///   阻塞在队列上的调用方随即被唤醒；
/// - 生命周期操作（`start`/`stop`）由内部互斥量串行化，处理器在优雅停止后经 `join` 交还。
///
/// ## 契约 (What)
/// - `start(config)`：只在 `Stopped` 下合法；任一资源创建失败都会回滚已分配部分，保持 `Stopped`；
/// - `request`：服务未运行或队列不存在时返回 [`RequestError::Stopped`]，队列满且超时返回
///   [`RequestError::Timeout`]，两者都归还请求；
/// - `wait_response`：按提交顺序取回响应；
/// - `stop`：置停止令牌、关闭队列、在 `stop_timeout` 内等待 worker 退出，超时强制分离；
///   在 worker 自身线程上调用返回 [`AbilityError::SelfStop`]。
///
/// ## 注意事项 (Trade-offs)
/// - `stop` 丢弃尚未处理的请求与尚未取走的响应。
pub struct Service<P: Processor> {
    state: Arc<AtomicState<ServiceState>>,
    requests: ArcSwapOption<BoundedQueue<P::Request>>,
    responses: ArcSwapOption<BoundedQueue<P::Response>>,
    lifecycle: Mutex<Lifecycle<P>>,
    worker: Mutex<Option<ThreadId>>,
}

struct Lifecycle<P> {
    processor: Option<P>,
    thread: Option<ThreadHandle<Option<P>>>,
    config: ServiceConfig,
}

impl<P: Processor> Service<P> {
    pub fn new(processor: P) -> Self {
        Self {
            state: Arc::new(AtomicState::new(ServiceState::Stopped)),
            requests: ArcSwapOption::empty(),
            responses: ArcSwapOption::empty(),
            lifecycle: Mutex::new(Lifecycle {
                processor: Some(processor),
                thread: None,
                config: ServiceConfig::default(),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn start(&self, config: ServiceConfig) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        let current = self.state.load();
        if current != ServiceState::Stopped || lifecycle.thread.is_some() {
            return Err(AbilityError::invalid_state("start", current.name()));
        }
        config.validate()?;
        if lifecycle.processor.is_none() {
            return Err(AbilityError::WorkerLost {
                name: config.thread.name.clone(),
            });
        }

        // 队列在线程之前分配，`?` 提前返回时已分配的部分随局部变量释放。
        let requests = Arc::new(BoundedQueue::with_capacity(config.request_queue_depth)?);
        let responses = Arc::new(BoundedQueue::with_capacity(config.response_queue_depth)?);

        let handoff = Arc::new(Mutex::new(lifecycle.processor.take()));
        let mut thread = ThreadHandle::new(config.thread.clone());
        let worker = Worker {
            handoff: Arc::clone(&handoff),
            state: Arc::clone(&self.state),
            requests: Arc::clone(&requests),
            responses: Arc::clone(&responses),
            checkpoint: config.receive_timeout,
        };
        self.requests.store(Some(requests));
        self.responses.store(Some(responses));

        if let Err(err) = thread.create(move |ctl| worker.run(ctl)) {
            self.requests.store(None);
            self.responses.store(None);
            lifecycle.processor = handoff.lock().take();
            return Err(err);
        }

        // 线程创建成功后才对外宣告 Idle；在此之前的请求按“未运行”拒绝。
        self.state.store(ServiceState::Idle);
        *self.worker.lock() = thread.thread_id();
        debug!(
            target: "spark_ability::service",
            service = %config.thread.name,
            request_depth = config.request_queue_depth,
            response_depth = config.response_queue_depth,
            "service started"
        );
        lifecycle.thread = Some(thread);
        lifecycle.config = config;
        Ok(())
    }

    /// 投递请求。
    pub fn request(
        &self,
        request: P::Request,
        timeout: Timeout,
    ) -> core::result::Result<(), RequestError<P::Request>> {
        if self.state.load() == ServiceState::Stopped {
            return Err(RequestError::Stopped(request));
        }
        let Some(queue) = self.requests.load_full() else {
            return Err(RequestError::Stopped(request));
        };
        queue.send(request, timeout).map_err(|err| match err {
            SendError::Timeout(request) => RequestError::Timeout(request),
            SendError::Closed(request) => RequestError::Stopped(request),
        })
    }

    /// 取回下一个响应。
    pub fn wait_response(
        &self,
        timeout: Timeout,
    ) -> core::result::Result<P::Response, ResponseError> {
        let Some(queue) = self.responses.load_full() else {
            return Err(ResponseError::Stopped);
        };
        queue.receive(timeout).map_err(|err| match err {
            RecvError::Timeout => ResponseError::Timeout,
            RecvError::Closed => ResponseError::Stopped,
        })
    }

    pub fn stop(&self) -> Result<StopOutcome> {
        if *self.worker.lock() == Some(thread::current().id()) {
            // 生命周期锁可能正被等待本线程退出的拥有者持有，名称取自当前线程。
            let name = thread::current().name().unwrap_or_default().to_owned();
            return Err(AbilityError::SelfStop { name });
        }
        let mut lifecycle = self.lifecycle.lock();
        let Some(mut thread) = lifecycle.thread.take() else {
            self.state.store(ServiceState::Stopped);
            return Ok(StopOutcome::AlreadyStopped);
        };

        thread.request_stop();
        if let Some(queue) = self.requests.swap(None) {
            queue.close();
        }
        if let Some(queue) = self.responses.swap(None) {
            queue.close();
        }

        let stop_timeout = lifecycle.config.stop_timeout;
        let outcome = if thread.wait_terminated(stop_timeout) {
            match thread.join() {
                Some(Ok(Some(processor))) => lifecycle.processor = Some(processor),
                Some(Err(_)) => warn!(
                    target: "spark_ability::service",
                    service = %lifecycle.config.thread.name,
                    "worker panicked; processor is lost"
                ),
                Some(Ok(None)) | None => {}
            }
            StopOutcome::Graceful
        } else {
            thread.delete();
            warn!(
                target: "spark_ability::service",
                service = %lifecycle.config.thread.name,
                timeout_ms = stop_timeout.as_millis() as u64,
                "worker did not reach a checkpoint in time; thread abandoned"
            );
            StopOutcome::Forced
        };

        self.state.store(ServiceState::Stopped);
        *self.worker.lock() = None;
        debug!(
            target: "spark_ability::service",
            service = %lifecycle.config.thread.name,
            ?outcome,
            "service stopped"
        );
        Ok(outcome)
    }

    pub fn state(&self) -> ServiceState {
        self.state.load()
    }

    pub fn is_running(&self) -> bool {
        self.state() != ServiceState::Stopped
    }

    /// 请求队列中尚未被 worker 取走的请求数。
    pub fn pending_requests(&self) -> usize {
        self.requests.load_full().map_or(0, |queue| queue.len())
    }

    /// 响应队列中尚未被调用方取走的响应数。
    pub fn pending_responses(&self) -> usize {
        self.responses.load_full().map_or(0, |queue| queue.len())
    }
}

impl<P: Processor> core::fmt::Debug for Service<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Service")
            .field("state", &self.state.load())
            .field("pending_requests", &self.pending_requests())
            .field("pending_responses", &self.pending_responses())
            .finish()
    }
}

impl<P: Processor> Drop for Service<P> {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            debug!(target: "spark_ability::service", error = %err, "stop on drop skipped");
        }
    }
}

/// worker 线程持有的全部资源。
struct Worker<P: Processor> {
    handoff: Arc<Mutex<Option<P>>>,
    state: Arc<AtomicState<ServiceState>>,
    requests: Arc<BoundedQueue<P::Request>>,
    responses: Arc<BoundedQueue<P::Response>>,
    checkpoint: Duration,
}

impl<P: Processor> Worker<P> {
    fn run(self, ctl: &ThreadControl) -> Option<P> {
        let mut processor = self.handoff.lock().take()?;
        processor.on_start();
        while !ctl.is_stop_requested() {
            let request = match self.requests.receive(Timeout::After(self.checkpoint)) {
                Ok(request) => request,
                Err(RecvError::Timeout) => continue,
                Err(RecvError::Closed) => break,
            };
            let _ = self
                .state
                .transition(ServiceState::Idle, ServiceState::Processing);
            let response = processor.process(request);
            trace!(target: "spark_ability::service", service = ctl.name(), "request processed");
            self.deliver(response, ctl);
            let _ = self
                .state
                .transition(ServiceState::Processing, ServiceState::Idle);
        }
        processor.on_stop();
        let _ = self
            .state
            .transition(ServiceState::Idle, ServiceState::Stopped);
        Some(processor)
    }

    /// 响应队列满时按检查点间隔重试，直到送达、队列关闭或收到停止请求。
    fn deliver(&self, mut response: P::Response, ctl: &ThreadControl) {
        loop {
            match self.responses.send(response, Timeout::After(self.checkpoint)) {
                Ok(()) => return,
                Err(SendError::Timeout(pending)) if !ctl.is_stop_requested() => response = pending,
                Err(_) => {
                    trace!(
                        target: "spark_ability::service",
                        service = ctl.name(),
                        "response discarded during shutdown"
                    );
                    return;
                }
            }
        }
    }
}
