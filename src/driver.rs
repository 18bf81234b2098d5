//! Completion queue driver: owns the ring and the context table, submits
//! intents, and decodes completions.
//!
//! Every `arm_*` call is submit-and-return. The only suspension point in
//! the whole server is [`Driver::wait_next_completion`].

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::context::{ContextTable, OpHandle, OpKind, RequestContext};
use crate::error::Error;
use crate::metrics;
use crate::ring::Ring;

/// user_data tag for cancellation CQEs, distinct from any valid handle
/// (the context table never has 2^32 slots).
const CANCEL_TAG: u64 = u64::MAX;

/// Bounds on the teardown reap loop.
const TEARDOWN_ROUNDS: usize = 32;
const TEARDOWN_WAIT: Duration = Duration::from_millis(50);

/// A decoded completion record: the kernel result plus the owned context
/// of the intent that produced it.
#[derive(Debug)]
pub struct Completion {
    /// Raw kernel result. Negative values are `-errno`.
    pub result: i32,
    /// The context, removed from the table the instant the completion is
    /// consumed.
    pub context: RequestContext,
}

/// Handle for waking the driver out of its wait. Used for shutdown.
///
/// The handle shares ownership of the eventfd, so it stays valid after
/// the driver has been torn down: a late `shutdown()` writes to the
/// still-open eventfd, never to a recycled descriptor number.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    eventfd: Arc<OwnedFd>,
}

impl ShutdownHandle {
    /// Request shutdown. Wakes the event loop, which stops re-arming the
    /// accept intent and tears the driver down.
    pub fn shutdown(&self) {
        let val: u64 = 1;
        // Safety: the fd is owned through the Arc and open for the life
        // of this handle; the 8-byte source is on the stack.
        unsafe {
            libc::write(
                self.eventfd.as_raw_fd(),
                &val as *const u64 as *const libc::c_void,
                8,
            );
        }
    }

    pub(crate) fn eventfd(&self) -> RawFd {
        self.eventfd.as_raw_fd()
    }
}

/// Owns the completion/submission interface and all in-flight contexts.
pub struct Driver {
    ring: Ring,
    contexts: ContextTable,
    read_buffer_size: usize,
    /// Drained CQEs waiting to be handed out in arrival order.
    completed: VecDeque<(u64, i32)>,
    /// Shared with every [`ShutdownHandle`]; closed when the last owner
    /// drops.
    eventfd: Arc<OwnedFd>,
    eventfd_buf: Box<[u8; 8]>,
    /// Sockaddr storage for the single outstanding accept intent.
    accept_addr: Box<libc::sockaddr_storage>,
    accept_addr_len: Box<libc::socklen_t>,
}

impl Driver {
    /// Create the completion interface sized to `config.queue_depth`.
    ///
    /// Failure here is fatal: the process cannot proceed without the
    /// kernel interface.
    pub fn new(config: &Config) -> Result<Self, Error> {
        config.validate()?;
        let ring = Ring::setup(config).map_err(|e| Error::RingSetup(e.to_string()))?;

        let raw = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC) };
        if raw < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        // Safety: raw is a freshly created fd with no other owner.
        let eventfd = Arc::new(unsafe { OwnedFd::from_raw_fd(raw) });

        let mut driver = Driver {
            ring,
            contexts: ContextTable::new(config.queue_depth),
            read_buffer_size: config.read_buffer_size,
            completed: VecDeque::with_capacity(config.queue_depth as usize),
            eventfd,
            eventfd_buf: Box::new([0u8; 8]),
            accept_addr: Box::new(unsafe { std::mem::zeroed() }),
            accept_addr_len: Box::new(
                std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t
            ),
        };
        driver.arm_wakeup()?;
        Ok(driver)
    }

    /// Handle that wakes this driver out of its wait.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            eventfd: Arc::clone(&self.eventfd),
        }
    }

    /// Number of contexts currently in flight.
    pub fn in_flight(&self) -> usize {
        self.contexts.in_flight()
    }

    /// Enqueue an accept intent on the listening descriptor.
    ///
    /// Exactly one accept is outstanding at any time, so the driver's
    /// single sockaddr storage is free for reuse whenever this is called.
    pub fn arm_accept(&mut self, listener: RawFd) -> Result<(), Error> {
        let handle = self.insert(RequestContext::Accept)?;
        *self.accept_addr_len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        let addr = &mut *self.accept_addr as *mut libc::sockaddr_storage as *mut libc::sockaddr;
        let addrlen = &mut *self.accept_addr_len as *mut libc::socklen_t;
        self.ring
            .push_accept(listener, addr, addrlen, handle.raw())
            .map_err(|e| self.submission_failed(handle, OpKind::Accept, e))
    }

    /// Allocate a fixed-capacity read buffer and enqueue a read intent.
    pub fn arm_read(&mut self, descriptor: RawFd) -> Result<(), Error> {
        let buffer = vec![0u8; self.read_buffer_size];
        let ptr = buffer.as_ptr() as *mut u8;
        let len = buffer.len() as u32;
        let handle = self.insert(RequestContext::Read { descriptor, buffer })?;
        self.ring
            .push_recv(descriptor, ptr, len, handle.raw())
            .map_err(|e| self.submission_failed(handle, OpKind::Read, e))
    }

    /// Enqueue a write intent, taking ownership of `buffer`.
    pub fn arm_write(&mut self, descriptor: RawFd, buffer: Vec<u8>) -> Result<(), Error> {
        let ptr = buffer.as_ptr();
        let len = buffer.len() as u32;
        let handle = self.insert(RequestContext::Write { descriptor, buffer })?;
        self.ring
            .push_send(descriptor, ptr, len, handle.raw())
            .map_err(|e| self.submission_failed(handle, OpKind::Write, e))
    }

    /// Arm the eventfd read that carries shutdown wakeups.
    fn arm_wakeup(&mut self) -> Result<(), Error> {
        let fd = self.eventfd.as_raw_fd();
        let ptr = self.eventfd_buf.as_mut_ptr();
        let handle = self.insert(RequestContext::Wakeup)?;
        self.ring
            .push_eventfd_read(fd, ptr, handle.raw())
            .map_err(|e| self.submission_failed(handle, OpKind::Wakeup, e))
    }

    /// Block until a completion record is available and return it, in
    /// kernel delivery order. The sole suspension point.
    ///
    /// The returned context is removed from the table before the caller
    /// sees it; a completion whose handle no longer matches (stale
    /// generation) is counted and skipped, never interpreted.
    pub fn wait_next_completion(&mut self) -> Result<Completion, Error> {
        loop {
            while let Some((user_data, result)) = self.completed.pop_front() {
                metrics::CQE_PROCESSED.increment();
                let handle = OpHandle::from_raw(user_data);
                match self.contexts.take(handle) {
                    Some(context) => return Ok(Completion { result, context }),
                    None => {
                        metrics::STALE_COMPLETIONS.increment();
                        tracing::warn!(user_data, result, "completion for stale context, dropped");
                    }
                }
            }
            match self.ring.submit_and_wait(1) {
                Ok(()) => {}
                // A trapped signal interrupts the wait; its handler wrote
                // the eventfd, so a Wakeup completion is on its way.
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::Io(e)),
            }
            self.ring.drain_completions(&mut self.completed);
        }
    }

    /// Peer address recorded by the most recent accept completion.
    pub fn last_peer_addr(&self) -> Option<SocketAddr> {
        sockaddr_to_socket_addr(&self.accept_addr, *self.accept_addr_len)
    }

    /// Release the completion interface. Called exactly once, enforced by
    /// consuming the driver.
    ///
    /// Every outstanding intent is cancelled and its completion reaped
    /// before the context's buffer is released: the kernel may write into
    /// a recv buffer right up to that op's CQE, so no buffer is freed
    /// while its op is still in flight. The reap loop is bounded; any
    /// context the kernel still holds after the bound keeps its buffer
    /// (leaked, never freed under the kernel).
    pub fn teardown(mut self) {
        for handle in self.contexts.handles() {
            if self.ring.push_cancel(handle.raw(), CANCEL_TAG).is_err() {
                break;
            }
        }

        let mut rounds = 0;
        while self.contexts.in_flight() > 0 && rounds < TEARDOWN_ROUNDS {
            rounds += 1;
            match self.ring.submit_and_wait_timeout(1, TEARDOWN_WAIT) {
                Ok(()) => {}
                Err(e) if e.raw_os_error() == Some(libc::ETIME) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "teardown wait failed");
                    break;
                }
            }
            self.ring.drain_completions(&mut self.completed);
            while let Some((user_data, _result)) = self.completed.pop_front() {
                if user_data == CANCEL_TAG {
                    continue;
                }
                if let Some(context) = self.contexts.take(OpHandle::from_raw(user_data)) {
                    release(context);
                }
            }
        }

        let unreaped = self.contexts.in_flight() > 0;
        for context in self.contexts.drain() {
            if let Some(fd) = context.descriptor() {
                // Safety: the descriptor is owned by the drained context;
                // nothing else will close it. The in-flight op holds its
                // own file reference, so close is safe here.
                unsafe {
                    libc::close(fd);
                }
                metrics::CONNECTIONS_CLOSED.increment();
                metrics::CONNECTIONS_ACTIVE.decrement();
            }
            match context {
                RequestContext::Read { buffer, .. } | RequestContext::Write { buffer, .. } => {
                    std::mem::forget(buffer)
                }
                RequestContext::Accept | RequestContext::Wakeup => {}
            }
        }
        if unreaped {
            // A surviving accept or wakeup op targets these as well.
            std::mem::forget(self.eventfd_buf);
            std::mem::forget(self.accept_addr);
            std::mem::forget(self.accept_addr_len);
        }
    }

    fn insert(&mut self, context: RequestContext) -> Result<OpHandle, Error> {
        self.contexts.insert(context).ok_or(Error::ContextTableFull)
    }

    /// Release the slot reserved for a failed submission and wrap the error.
    fn submission_failed(&mut self, handle: OpHandle, op: OpKind, source: io::Error) -> Error {
        let _ = self.contexts.take(handle);
        Error::Submission { op, source }
    }
}

/// Close the descriptor a reaped context owns and account for it. The
/// context's op has completed, so dropping its buffer is safe.
fn release(context: RequestContext) {
    if let Some(fd) = context.descriptor() {
        // Safety: the context is the descriptor's sole owner.
        unsafe {
            libc::close(fd);
        }
        metrics::CONNECTIONS_CLOSED.increment();
        metrics::CONNECTIONS_ACTIVE.decrement();
    }
}

/// Convert a libc sockaddr_storage to a std SocketAddr.
fn sockaddr_to_socket_addr(addr: &libc::sockaddr_storage, len: u32) -> Option<SocketAddr> {
    use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};
    match addr.ss_family as libc::c_int {
        libc::AF_INET if len >= std::mem::size_of::<libc::sockaddr_in>() as u32 => {
            let sa = unsafe { &*(addr as *const _ as *const libc::sockaddr_in) };
            let ip = Ipv4Addr::from(u32::from_be(sa.sin_addr.s_addr));
            let port = u16::from_be(sa.sin_port);
            Some(SocketAddr::V4(SocketAddrV4::new(ip, port)))
        }
        libc::AF_INET6 if len >= std::mem::size_of::<libc::sockaddr_in6>() as u32 => {
            let sa = unsafe { &*(addr as *const _ as *const libc::sockaddr_in6) };
            let ip = Ipv6Addr::from(sa.sin6_addr.s6_addr);
            let port = u16::from_be(sa.sin6_port);
            Some(SocketAddr::V6(SocketAddrV6::new(
                ip,
                port,
                sa.sin6_flowinfo,
                sa.sin6_scope_id,
            )))
        }
        _ => None,
    }
}
