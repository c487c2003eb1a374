use core::{fmt, marker::PhantomData};

/// `Service` worker 上执行的请求处理器。
///
/// # 契约说明（What）
/// - `process` 在 worker 线程上按提交顺序逐个调用，每个请求恰好产生一个响应；
/// - `on_start` 在处理第一个请求前调用，`on_stop` 在 worker 退出前调用；两者都在 worker 线程上执行；
/// - 处理器在优雅停止后交还给 `Service`，因此重启时内部状态延续。
pub trait Processor: Send + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;

    fn process(&mut self, request: Self::Request) -> Self::Response;

    fn on_start(&mut self) {}

    fn on_stop(&mut self) {}
}

/// 把闭包适配为 [`Processor`]。
pub struct FnProcessor<F, Req, Resp> {
    handler: F,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<F, Req, Resp> FnProcessor<F, Req, Resp>
where
    F: FnMut(Req) -> Resp,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

impl<F, Req, Resp> Processor for FnProcessor<F, Req, Resp>
where
    F: FnMut(Req) -> Resp + Send + 'static,
    Req: Send + 'static,
    Resp: Send + 'static,
{
    type Request = Req;
    type Response = Resp;

    fn process(&mut self, request: Req) -> Resp {
        (self.handler)(request)
    }
}

impl<F, Req, Resp> fmt::Debug for FnProcessor<F, Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnProcessor")
    }
}
