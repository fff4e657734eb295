//! Per-socket state the reactor owns. One [`NetworkEntry`] exists for every
//! live id; it is never touched from any thread other than the reactor's
//! own.

use std::collections::VecDeque;
use std::net::SocketAddr;

use mio::event::Source;
use mio::net::{TcpStream, UdpSocket};
use mio::Interest;

use natkit_core::{Bus, ResourceId};

use crate::event::NetworkEvent;

/// A single queued TCP write: the buffer and how much of it has already
/// been accepted by the kernel. Advances in place across writable events
/// rather than being re-allocated.
pub(crate) struct PendingWrite {
    pub buf: Vec<u8>,
    pub pos: usize,
}

impl PendingWrite {
    pub fn remaining(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    pub fn is_drained(&self) -> bool {
        self.pos == self.buf.len()
    }
}

pub(crate) enum Channel {
    Udp(UdpSocket),
    Tcp(TcpStream),
}

impl Channel {
    pub fn source(&mut self) -> &mut dyn Source {
        match self {
            Channel::Udp(socket) => socket,
            Channel::Tcp(stream) => stream,
        }
    }
}

/// 反应器为每个存活 socket 维护的状态记录。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 反应器线程是这份状态唯一的写者；把一个 socket 的全部可变状态（写队列、
///   握手进度、已注册的关注位）收进一个结构体，可以让“谁拥有它”这件事在类型
///   层面就显而易见，调用方永远只看得到 `id`，看不到这个结构体本身。
///
/// ## 核心逻辑（How）
/// - `channel` 是唯一真正持有文件描述符的字段；`outgoing_tcp`/`outgoing_udp`
///   分别建模字节流与数据报两种语义——前者按顺序部分写入并原地推进
///   [`PendingWrite::pos`]，后者整条入队整条发送，不可切分。
/// - `registered_interest` 缓存上一次成功注册的关注位，使
///   `Reactor::reregister_if_changed` 只在掩码真正变化时才调用一次
///   `reregister`，避免每次事件都重新系统调用。
///
/// ## 契约说明（What）
/// - **不变式**：`id` 存在于反应器的 id 索引中，当且仅当对应 `channel` 已注册
///   到选择器（`mio::Token` 即由 `id` 派生，索引本身就是注册表）。
/// - **不变式**：`connecting == true` 时 `desired_interest()` 必须包含可写位；
///   `outgoing_tcp`/`outgoing_udp` 非空时同理。
///
/// ## 设计取舍（Trade-offs）
/// - UDP 与 TCP 共用一个结构体而非各自独立类型：两者共享 `id`/总线/关注位管理
///   逻辑的比例远高于分叉逻辑，拆分只会让 `Reactor` 里大量共享代码重复一遍。
pub(crate) struct NetworkEntry {
    pub id: ResourceId,
    pub channel: Channel,
    pub response_bus: Bus<NetworkEvent>,
    /// `true` until the non-blocking connect finishes; always `false` for
    /// UDP sockets, which have no handshake.
    pub connecting: bool,
    pub outgoing_tcp: VecDeque<PendingWrite>,
    pub outgoing_udp: VecDeque<(Vec<u8>, SocketAddr)>,
    /// The interest mask currently registered with the selector. Kept so
    /// `reregister` is only called when the mask actually changes.
    pub registered_interest: Interest,
    /// Sentinel for the write-empty hysteresis: cleared to `false` the
    /// instant `outgoing` transitions from empty to non-empty, and set to
    /// `true` once a `Write-Empty-*-Notification` has been sent for the
    /// current drain cycle. Without it an always-writable idle socket would
    /// fire on every selector wakeup. Starts `false`, so a freshly created
    /// (or freshly connected) entry owes exactly one write-empty
    /// notification before any write is ever enqueued for it.
    pub notified_of_writable: bool,
}

impl NetworkEntry {
    pub fn is_tcp(&self) -> bool {
        matches!(self.channel, Channel::Tcp(_))
    }

    /// Recompute the interest mask: readable always set; writable set iff
    /// there is outgoing data queued or the drain notification for this
    /// cycle hasn't fired yet. TCP's "connectable"
    /// state has no separate flag under `mio` — it is represented by
    /// keeping writable interest registered until the connect resolves.
    pub fn desired_interest(&self) -> Interest {
        let wants_writable =
            self.connecting || !self.notified_of_writable || self.has_queued_writes();
        if wants_writable {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        }
    }

    fn has_queued_writes(&self) -> bool {
        match self.channel {
            Channel::Tcp(_) => !self.outgoing_tcp.is_empty(),
            Channel::Udp(_) => !self.outgoing_udp.is_empty(),
        }
    }
}
