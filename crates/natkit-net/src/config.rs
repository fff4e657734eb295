use std::time::Duration;

/// `NetworkGateway` 的可调参数集合。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 反应器构造阶段需要的旋钮很少（一块定长暂存缓冲区、一次 `poll` 超时、一个
///   批量大小提示），不值得为它们各自暴露独立参数；集中成一个带默认值的配置
///   结构体，调用方可以只覆盖关心的字段。
///
/// ## 核心逻辑（How）
/// - `Default` 给出的默认值是经过实测验证的取值：`scratch_buffer_size`
///   取 UDP 数据报的理论上限，`poll_timeout` 足够短以保证 `Kill` 后的关闭延迟
///   可控，`events_capacity` 只是 `mio::Events` 的初始容量提示。
///
/// ## 契约说明（What）
/// - 三个字段均为纯值类型，`Copy`；构造后不可变，`NetworkGateway::spawn` 按值
///   接收一次。
///
/// ## 设计取舍（Trade-offs）
/// - 没有做成 builder（`with_xxx` 链式调用）：字段之间没有互相依赖的校验规则，
///   直接公开字段更省代码；一旦出现需要互相校验的新旋钮，再切换到 builder。
#[derive(Clone, Copy, Debug)]
pub struct GatewayConfig {
    /// Size of the scratch buffer reused across every TCP read and UDP
    /// `recv_from` call. Fixed at 65535 bytes — the largest possible UDP
    /// datagram — so a single buffer can serve both socket kinds.
    pub scratch_buffer_size: usize,
    /// Upper bound on how long `Poll::poll` blocks when there is nothing
    /// ready; the reactor also wakes immediately on any new request via a
    /// registered `Waker`, so this mostly bounds worst-case request
    /// latency if the waker registration itself ever failed.
    pub poll_timeout: Duration,
    /// Capacity hint for `mio::Events`; purely a sizing hint for the
    /// per-iteration readiness batch, not a hard cap on live sockets.
    pub events_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            scratch_buffer_size: 65535,
            poll_timeout: Duration::from_millis(250),
            events_capacity: 1024,
        }
    }
}
