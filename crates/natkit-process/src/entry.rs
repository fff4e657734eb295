//! Per-process bookkeeping the gateway thread owns. The four worker
//! threads never touch this struct directly — they only hold channel
//! handles into and out of it.

use std::thread::JoinHandle;

use natkit_core::bus::Bus;
use natkit_core::ResourceId;

use crate::event::ProcessEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessState {
    Running,
    Terminating,
}

/// 网关线程为每个受管子进程维护的记录。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 四个工作线程（stdin 写入、stdout/stderr 读取、退出等待）各自拥有自己的
///   系统资源，但进程是否仍“存活”这件事只能有一个权威答案；把这份权威状态
///   收拢到网关线程独占的这一个结构体里，工作线程永远只能通过向网关的请求
///   总线投递消息来间接触发状态迁移。
///
/// ## 核心逻辑（How）
/// - `stdin_tx`/`kill_tx` 是网关线程单向喂给工作线程的队列；反方向（工作线程
///   → 网关）没有直接字段，一律走 `ProcessRequest::{Read, WriteEmpty,
///   Terminated}` 重新进入同一条请求总线，避免任何回调式的跨线程调用。
/// - 四个 `JoinHandle` 只在 `Terminated`/`Kill` 收尾时被 `join`，确保资源释放
///   前所有工作线程都已经退出。
///
/// ## 契约说明（What）
/// - `state`：`Running` → `Terminating`（`CloseProcess` 已发出、尚未观测到
///   退出）→ 条目被移除（`Terminated` 已消费）；自发退出直接跳过
///   `Terminating` 但收敛到同一次移除。
///
/// ## 设计取舍（Trade-offs）
/// - 没有把 `stdin_handle`/`stdout_handle` 等设计成 `Option`
///   以便“部分构造”：四个线程在 `create_process` 里原子性地一次性起好，不存在
///   半构造状态需要表达。
pub(crate) struct ProcessEntry {
    pub id: ResourceId,
    pub response_bus: Bus<ProcessEvent>,
    pub state: ProcessState,
    /// Forwards `Write-Process` payloads to the stdin writer thread.
    /// Dropping this is how the writer thread is told to stop.
    pub stdin_tx: Bus<Vec<u8>>,
    /// Tells the exit waiter thread to kill the child instead of waiting
    /// for a natural exit.
    pub kill_tx: Bus<()>,
    pub stdin_handle: JoinHandle<()>,
    pub stdout_handle: JoinHandle<()>,
    pub stderr_handle: JoinHandle<()>,
    pub exit_handle: JoinHandle<()>,
}
