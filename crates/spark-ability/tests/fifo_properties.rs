//! 队列与 `Service` 的 FIFO 性质验证。
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：`BoundedQueue` 是 worker 与调用方之间唯一的共享数据通道，其顺序与容量
//!   不变量直接决定 `Service` 的“响应严格按请求顺序”契约。
//! - **设计手法 (How)**：
//!   1. 以 `VecDeque` 作为影子模型，对随机操作序列逐步比对 `BoundedQueue` 的非阻塞行为；
//!   2. 对随机请求序列驱动真实 `Service`，断言第 i 个响应恰好对应第 i 个请求。
//! - **设计考量 (Trade-offs)**：第二条性质每个用例都会启停一条线程，因此用例数量刻意压低。

mod support;

use std::{collections::VecDeque, sync::Arc, thread, time::Duration};

use proptest::prelude::*;
use spark_ability::{
    BoundedQueue, FnProcessor, RecvError, SendError, Service, ServiceConfig, StopOutcome, Timeout,
};

#[derive(Clone, Debug)]
enum QueueOp {
    Send(u8),
    SendToFront(u8),
    Overwrite(u8),
    Receive,
    Reset,
}

fn queue_op() -> impl Strategy<Value = QueueOp> {
    prop_oneof![
        4 => any::<u8>().prop_map(QueueOp::Send),
        1 => any::<u8>().prop_map(QueueOp::SendToFront),
        1 => any::<u8>().prop_map(QueueOp::Overwrite),
        4 => Just(QueueOp::Receive),
        1 => Just(QueueOp::Reset),
    ]
}

/// 对单个操作同时驱动真实队列与影子模型，返回二者是否一致。
fn apply(
    queue: &BoundedQueue<u8>,
    model: &mut VecDeque<u8>,
    capacity: usize,
    op: &QueueOp,
) -> bool {
    match *op {
        QueueOp::Send(value) => {
            let full = model.len() >= capacity;
            let outcome = queue.send(value, Timeout::NoWait);
            if full {
                matches!(outcome, Err(SendError::Timeout(v)) if v == value)
            } else {
                model.push_back(value);
                outcome.is_ok()
            }
        }
        QueueOp::SendToFront(value) => {
            let full = model.len() >= capacity;
            let outcome = queue.send_to_front(value, Timeout::NoWait);
            if full {
                matches!(outcome, Err(SendError::Timeout(v)) if v == value)
            } else {
                model.push_front(value);
                outcome.is_ok()
            }
        }
        QueueOp::Overwrite(value) => {
            if model.len() >= capacity {
                model.pop_back();
            }
            model.push_back(value);
            queue.overwrite(value).is_ok()
        }
        QueueOp::Receive => match model.pop_front() {
            Some(expected) => queue.receive(Timeout::NoWait) == Ok(expected),
            None => queue.receive(Timeout::NoWait) == Err(RecvError::Timeout),
        },
        QueueOp::Reset => {
            let dropped = model.len();
            model.clear();
            queue.reset() == dropped
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_queue_matches_deque_model(
        capacity in 1_usize..6,
        ops in proptest::collection::vec(queue_op(), 0..64),
    ) {
        let queue = BoundedQueue::with_capacity(capacity).unwrap();
        let mut model = VecDeque::new();
        for (index, op) in ops.iter().enumerate() {
            prop_assert!(
                apply(&queue, &mut model, capacity, op),
                "step {} ({:?}) diverged",
                index,
                op
            );
            prop_assert_eq!(queue.len(), model.len());
            prop_assert!(queue.len() <= capacity);
            prop_assert_eq!(queue.spaces_available(), capacity - model.len());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_responses_correlate_with_requests(
        requests in proptest::collection::vec(any::<u16>(), 0..48),
        request_depth in 1_usize..4,
        response_depth in 1_usize..4,
    ) {
        support::init_tracing();
        let service = Arc::new(Service::new(FnProcessor::new(|value: u16| {
            (value, u32::from(value) * 3)
        })));
        service
            .start(
                ServiceConfig::new("correlate")
                    .with_queue_depths(request_depth, response_depth)
                    .with_receive_timeout(Duration::from_millis(10)),
            )
            .unwrap();

        let expected = requests.len();
        let consumer = {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                (0..expected)
                    .map(|_| service.wait_response(Timeout::After(Duration::from_secs(2))))
                    .collect::<Vec<_>>()
            })
        };
        for &value in &requests {
            prop_assert!(service.request(value, Timeout::Forever).is_ok());
        }
        let responses = consumer.join().unwrap();

        prop_assert_eq!(responses.len(), requests.len());
        for (request, response) in requests.iter().zip(responses) {
            prop_assert_eq!(response, Ok((*request, u32::from(*request) * 3)));
        }
        prop_assert_eq!(service.stop().unwrap(), StopOutcome::Graceful);
    }
}
