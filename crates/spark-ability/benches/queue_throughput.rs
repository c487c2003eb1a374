use criterion::{Criterion, black_box};
use spark_ability::{BoundedQueue, FnProcessor, Service, ServiceConfig, Timeout};
use std::{env, time::Duration};

/// 同线程的入队/出队往返成本，不涉及任何阻塞等待。
fn bench_queue_roundtrip(c: &mut Criterion) {
    let queue = BoundedQueue::with_capacity(64).expect("non-zero capacity");
    c.bench_function("queue_roundtrip", |b| {
        b.iter(|| {
            for value in 0..64_u32 {
                queue
                    .send(black_box(value), Timeout::NoWait)
                    .expect("queue has room");
            }
            for _ in 0..64 {
                black_box(queue.receive(Timeout::NoWait).expect("queue has items"));
            }
        });
    });
}

/// 经由 worker 线程的一次完整请求/响应往返。
///
/// # 设计背景（Why）
/// - 衡量两次跨线程唤醒的固定开销，是评估“把阻塞调用放进 Service”是否划算的基线。
fn bench_service_call(c: &mut Criterion) {
    let service = Service::new(FnProcessor::new(|value: u64| value.wrapping_mul(31)));
    service
        .start(ServiceConfig::new("bench").with_queue_depths(1, 1))
        .expect("service starts");
    c.bench_function("service_call", |b| {
        b.iter(|| {
            service
                .request(black_box(7), Timeout::Forever)
                .expect("service is running");
            black_box(
                service
                    .wait_response(Timeout::Forever)
                    .expect("response arrives"),
            )
        });
    });
    let _ = service.stop();
}

fn main() {
    let mut quick_mode = false;
    for arg in env::args().skip(1) {
        if arg == "--quick" {
            quick_mode = true;
        }
    }

    let mut criterion = Criterion::default();
    if quick_mode {
        criterion = criterion
            .sample_size(10)
            .warm_up_time(Duration::from_millis(100))
            .measurement_time(Duration::from_millis(250));
    }

    bench_queue_roundtrip(&mut criterion);
    bench_service_call(&mut criterion);
    criterion.final_summary();
}
