//! `Service` 请求/响应执行体的端到端行为。
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：以真实线程驱动 `Service`，验证生命周期幂等、FIFO 关联、背压、
//!   有界停止延迟与强制停止路径。
//! - **结构说明 (How)**：每个测试独立构造一个服务；需要跨线程时把服务包在 `Arc` 中；
//!   “卡住”的处理器以 `CountingLock` 作为闸门，测试线程逐个放行。
//! - **合同与边界 (What)**：时间相关断言只使用宽松的上界或下界，避免调度抖动导致误报。

mod support;

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use spark_ability::{
    AbilityError, BinaryLock, CountingLock, FnProcessor, Processor, RequestError, ResponseError,
    Service, ServiceConfig, ServiceState, StopOutcome, Timeout,
};
use support::{eventually, init_tracing};

const WAIT: Timeout = Timeout::After(Duration::from_secs(2));

fn doubler() -> Service<FnProcessor<impl FnMut(u32) -> u32 + Send + 'static, u32, u32>> {
    Service::new(FnProcessor::new(|value: u32| value * 2))
}

/// 每处理一个请求都要先从闸门取得一个许可。
struct Gated {
    gate: Arc<CountingLock>,
}

impl Processor for Gated {
    type Request = u32;
    type Response = u32;

    fn process(&mut self, request: u32) -> u32 {
        assert!(self.gate.take(Timeout::Forever));
        request
    }
}

#[test]
fn doubling_service_answers_in_order() {
    init_tracing();
    let service = doubler();
    service
        .start(ServiceConfig::new("doubler").with_queue_depths(4, 4))
        .expect("start must succeed");
    assert_eq!(service.state(), ServiceState::Idle);

    for value in 1..=4 {
        service
            .request(value, Timeout::NoWait)
            .expect("depth-4 queue must accept four requests");
    }
    let responses: Vec<u32> = (0..4)
        .map(|_| service.wait_response(WAIT).expect("response must arrive"))
        .collect();
    assert_eq!(responses, vec![2, 4, 6, 8]);
    assert_eq!(service.stop().unwrap(), StopOutcome::Graceful);
    assert_eq!(service.state(), ServiceState::Stopped);
}

/// 在 `on_start` 中等待放行的倍增处理器；放行前 worker 不会取走任何请求。
struct HeldDoubler {
    release: Arc<BinaryLock>,
}

impl Processor for HeldDoubler {
    type Request = u32;
    type Response = u32;

    fn process(&mut self, request: u32) -> u32 {
        request * 2
    }

    fn on_start(&mut self) {
        self.release.take(WAIT);
    }
}

#[test]
fn fifth_request_on_full_queue_is_refused_without_waiting() {
    init_tracing();
    let release = Arc::new(BinaryLock::new());
    let service = Service::new(HeldDoubler {
        release: Arc::clone(&release),
    });
    service
        .start(ServiceConfig::new("held").with_queue_depths(4, 4))
        .unwrap();

    for value in 1..=4 {
        service
            .request(value, Timeout::NoWait)
            .expect("depth-4 queue must accept four requests");
    }
    let err = service.request(5, Timeout::NoWait).unwrap_err();
    assert!(err.is_timeout(), "a zero-wait request on a full queue must fail: {err}");
    assert_eq!(err.into_inner(), 5);

    release.give();
    let responses: Vec<u32> = (0..4)
        .map(|_| service.wait_response(Timeout::Forever).expect("response must arrive"))
        .collect();
    assert_eq!(responses, vec![2, 4, 6, 8]);
    assert_eq!(service.stop().unwrap(), StopOutcome::Graceful);
}

#[test]
fn responses_follow_submission_order_under_backpressure() {
    init_tracing();
    let service = Arc::new(doubler());
    service
        .start(ServiceConfig::new("fifo").with_queue_depths(2, 2))
        .unwrap();

    let consumer = {
        let service = Arc::clone(&service);
        thread::spawn(move || {
            (0..200)
                .map(|_| service.wait_response(WAIT).expect("response must arrive"))
                .collect::<Vec<_>>()
        })
    };
    for value in 0..200 {
        service
            .request(value, Timeout::Forever)
            .expect("running service accepts requests");
    }
    let responses = consumer.join().expect("consumer must not panic");
    let expected: Vec<u32> = (0..200).map(|value| value * 2).collect();
    assert_eq!(responses, expected, "responses must preserve submission order");
    assert_eq!(service.stop().unwrap(), StopOutcome::Graceful);
}

#[test]
fn full_request_queue_times_out_and_returns_request() {
    init_tracing();
    let gate = Arc::new(CountingLock::new(8, 0).unwrap());
    let service = Service::new(Gated {
        gate: Arc::clone(&gate),
    });
    service
        .start(ServiceConfig::new("gated").with_queue_depths(1, 4))
        .unwrap();

    service.request(1, Timeout::NoWait).unwrap();
    assert!(
        eventually(Duration::from_secs(2), || service.state()
            == ServiceState::Processing),
        "worker must pick up the first request"
    );
    service.request(2, Timeout::NoWait).unwrap();

    let started = Instant::now();
    let err = service
        .request(3, Timeout::After(Duration::from_millis(50)))
        .unwrap_err();
    let waited = started.elapsed();
    assert!(
        waited >= Duration::from_millis(40),
        "a full queue must block for roughly the timeout, waited {waited:?}"
    );
    assert!(
        waited < Duration::from_millis(500),
        "a full queue must give up soon after the timeout, waited {waited:?}"
    );
    assert!(err.is_timeout());
    assert_eq!(err.into_inner(), 3, "the rejected request is handed back");

    gate.give();
    gate.give();
    assert_eq!(service.wait_response(WAIT), Ok(1));
    assert_eq!(service.wait_response(WAIT), Ok(2));
    assert_eq!(service.stop().unwrap(), StopOutcome::Graceful);
}

#[test]
fn idle_service_stops_well_within_ceiling() {
    init_tracing();
    let service = doubler();
    service
        .start(ServiceConfig::new("idle").with_receive_timeout(Duration::from_millis(100)))
        .unwrap();
    thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    assert_eq!(service.stop().unwrap(), StopOutcome::Graceful);
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "stop latency must stay under the service ceiling, took {:?}",
        started.elapsed()
    );
}

#[test]
fn stop_immediately_after_start_is_graceful() {
    init_tracing();
    let service = doubler();
    for _ in 0..10 {
        service.start(ServiceConfig::new("blink")).unwrap();
        assert_eq!(service.stop().unwrap(), StopOutcome::Graceful);
        assert_eq!(service.state(), ServiceState::Stopped);
    }
}

#[test]
fn lifecycle_calls_are_idempotent() {
    init_tracing();
    let service = doubler();
    assert_eq!(service.stop().unwrap(), StopOutcome::AlreadyStopped);

    service.start(ServiceConfig::new("twice")).unwrap();
    let err = service.start(ServiceConfig::new("twice")).unwrap_err();
    assert!(err.is_invalid_state(), "second start must be rejected: {err}");
    assert!(service.is_running(), "rejected start must not disturb the worker");

    assert_eq!(service.stop().unwrap(), StopOutcome::Graceful);
    assert_eq!(service.stop().unwrap(), StopOutcome::AlreadyStopped);
}

#[test]
fn stopped_service_rejects_traffic() {
    init_tracing();
    let service = doubler();
    match service.request(7, Timeout::NoWait) {
        Err(RequestError::Stopped(request)) => assert_eq!(request, 7),
        other => panic!("expected Stopped, got {other:?}"),
    }
    assert_eq!(service.wait_response(Timeout::NoWait), Err(ResponseError::Stopped));
    assert_eq!(service.pending_requests(), 0);
    assert_eq!(service.pending_responses(), 0);
}

#[test]
fn running_service_reports_response_timeout() {
    init_tracing();
    let service = doubler();
    service.start(ServiceConfig::new("quiet")).unwrap();
    assert_eq!(
        service.wait_response(Timeout::After(Duration::from_millis(20))),
        Err(ResponseError::Timeout)
    );
    service.stop().unwrap();
}

#[test]
fn invalid_config_leaves_service_startable() {
    init_tracing();
    let service = doubler();
    let err = service
        .start(ServiceConfig::new("broken").with_queue_depths(0, 4))
        .unwrap_err();
    assert!(matches!(
        err,
        AbilityError::InvalidConfig {
            field: "request_queue_depth",
            ..
        }
    ));
    assert_eq!(service.state(), ServiceState::Stopped);

    let err = service.start(ServiceConfig::new("bad\0name")).unwrap_err();
    assert!(matches!(
        err,
        AbilityError::InvalidConfig {
            field: "thread.name",
            ..
        }
    ));
    assert_eq!(service.state(), ServiceState::Stopped);
    assert!(service.request(1, Timeout::NoWait).is_err(), "no queue may stay published");

    service.start(ServiceConfig::new("fixed")).unwrap();
    service.request(21, Timeout::NoWait).unwrap();
    assert_eq!(service.wait_response(WAIT), Ok(42));
    service.stop().unwrap();
}

#[test]
fn restart_reuses_processor_state() {
    init_tracing();
    let mut served = 0_u32;
    let service = Service::new(FnProcessor::new(move |_: ()| {
        served += 1;
        served
    }));
    for expected in 1..=3 {
        service.start(ServiceConfig::new("counter")).unwrap();
        service.request((), Timeout::NoWait).unwrap();
        assert_eq!(service.wait_response(WAIT), Ok(expected));
        assert_eq!(service.stop().unwrap(), StopOutcome::Graceful);
    }
}

#[test]
fn hooks_run_once_per_start() {
    struct Hooked {
        started: Arc<AtomicUsize>,
        stopped: Arc<AtomicUsize>,
    }

    impl Processor for Hooked {
        type Request = ();
        type Response = ();

        fn process(&mut self, _: ()) {}

        fn on_start(&mut self) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stop(&mut self) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    init_tracing();
    let started = Arc::new(AtomicUsize::new(0));
    let stopped = Arc::new(AtomicUsize::new(0));
    let service = Service::new(Hooked {
        started: Arc::clone(&started),
        stopped: Arc::clone(&stopped),
    });
    for round in 1..=2 {
        service.start(ServiceConfig::new("hooked")).unwrap();
        service.stop().unwrap();
        assert_eq!(started.load(Ordering::SeqCst), round);
        assert_eq!(stopped.load(Ordering::SeqCst), round);
    }
}

#[test]
fn unread_responses_do_not_block_stop() {
    init_tracing();
    let service = doubler();
    service
        .start(
            ServiceConfig::new("backlog")
                .with_queue_depths(4, 1)
                .with_receive_timeout(Duration::from_millis(20)),
        )
        .unwrap();
    for value in 0..2 {
        service.request(value, Timeout::NoWait).unwrap();
    }
    // 第一个响应占满深度为 1 的响应队列，worker 停在第二个响应的重试循环里。
    assert!(
        eventually(Duration::from_secs(2), || service.pending_responses() == 1
            && service.pending_requests() == 0
            && service.state() == ServiceState::Processing),
        "worker must end up retrying the second response"
    );

    let started = Instant::now();
    assert_eq!(service.stop().unwrap(), StopOutcome::Graceful);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn stuck_worker_is_forced_and_processor_is_lost() {
    init_tracing();
    let service = Service::new(FnProcessor::new(|delay: Duration| {
        thread::sleep(delay);
        delay
    }));
    service
        .start(ServiceConfig::new("stuck").with_stop_timeout(Duration::from_millis(50)))
        .unwrap();
    service
        .request(Duration::from_millis(500), Timeout::NoWait)
        .unwrap();
    assert!(eventually(Duration::from_secs(2), || service.state()
        == ServiceState::Processing));

    let outcome = service.stop().unwrap();
    assert!(outcome.is_forced(), "an unresponsive worker must be abandoned");
    assert_eq!(service.state(), ServiceState::Stopped);

    let err = service.start(ServiceConfig::new("stuck")).unwrap_err();
    assert!(matches!(err, AbilityError::WorkerLost { .. }), "got {err}");
}

#[test]
fn stop_from_worker_thread_is_rejected() {
    use std::sync::OnceLock;

    type Stopper = Box<dyn Fn() -> spark_ability::Result<StopOutcome> + Send + Sync>;

    init_tracing();
    let stopper: Arc<OnceLock<Stopper>> = Arc::new(OnceLock::new());
    let worker_stopper = Arc::clone(&stopper);
    let service = Arc::new(Service::new(FnProcessor::new(move |_: ()| {
        let stop = worker_stopper.get().expect("stopper installed before requests");
        matches!(stop(), Err(AbilityError::SelfStop { .. }))
    })));
    let weak = Arc::downgrade(&service);
    assert!(
        stopper
            .set(Box::new(move || match weak.upgrade() {
                Some(service) => service.stop(),
                None => Ok(StopOutcome::AlreadyStopped),
            }))
            .is_ok()
    );

    service.start(ServiceConfig::new("selfish")).unwrap();
    service.request((), Timeout::NoWait).unwrap();
    assert_eq!(
        service.wait_response(WAIT),
        Ok(true),
        "stop on the worker thread must fail fast with SelfStop"
    );
    assert_eq!(service.stop().unwrap(), StopOutcome::Graceful);
}
