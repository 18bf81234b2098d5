use std::collections::VecDeque;
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

use io_uring::types::{Fd, SubmitArgs, Timespec};
use io_uring::{IoUring, opcode, squeue};

use crate::config::Config;
use crate::metrics;

/// Wrapper around IoUring providing one SQE helper per intent kind.
///
/// All submissions are one-shot: every accept, recv, and send produces
/// exactly one completion for exactly one context.
pub(crate) struct Ring {
    ring: IoUring,
}

impl Ring {
    /// Create the io_uring instance sized to the configured queue depth.
    pub fn setup(config: &Config) -> io::Result<Self> {
        let ring = IoUring::builder().build(config.queue_depth)?;
        Ok(Ring { ring })
    }

    /// Enqueue an accept intent on the listening descriptor.
    pub fn push_accept(
        &mut self,
        listener: RawFd,
        addr: *mut libc::sockaddr,
        addrlen: *mut libc::socklen_t,
        user_data: u64,
    ) -> io::Result<()> {
        let entry = opcode::Accept::new(Fd(listener), addr, addrlen)
            .flags(libc::SOCK_CLOEXEC)
            .build()
            .user_data(user_data);
        // Safety: addr/addrlen live in the driver and outlive the operation.
        unsafe { self.push_sqe(entry) }
    }

    /// Enqueue a recv intent against a connection descriptor.
    pub fn push_recv(
        &mut self,
        fd: RawFd,
        buf: *mut u8,
        len: u32,
        user_data: u64,
    ) -> io::Result<()> {
        let entry = opcode::Recv::new(Fd(fd), buf, len)
            .build()
            .user_data(user_data);
        // Safety: the buffer is owned by the context for the operation's lifetime.
        unsafe { self.push_sqe(entry) }
    }

    /// Enqueue a send intent carrying a response buffer.
    pub fn push_send(
        &mut self,
        fd: RawFd,
        buf: *const u8,
        len: u32,
        user_data: u64,
    ) -> io::Result<()> {
        let entry = opcode::Send::new(Fd(fd), buf, len)
            .build()
            .user_data(user_data);
        // Safety: the buffer is owned by the context for the operation's lifetime.
        unsafe { self.push_sqe(entry) }
    }

    /// Enqueue an 8-byte eventfd read (shutdown wakeup).
    pub fn push_eventfd_read(&mut self, eventfd: RawFd, buf: *mut u8, user_data: u64) -> io::Result<()> {
        let entry = opcode::Read::new(Fd(eventfd), buf, 8)
            .build()
            .user_data(user_data);
        // Safety: the 8-byte buffer is boxed in the driver and outlives the operation.
        unsafe { self.push_sqe(entry) }
    }

    /// Enqueue a cancellation for the in-flight op tagged `target`.
    ///
    /// The cancelled op still produces its own CQE (with `-ECANCELED` or
    /// its real result if it raced the cancel); the cancellation's CQE
    /// carries `user_data`.
    pub fn push_cancel(&mut self, target: u64, user_data: u64) -> io::Result<()> {
        let entry = opcode::AsyncCancel::new(target)
            .build()
            .user_data(user_data);
        // Safety: cancellations reference no caller memory.
        unsafe { self.push_sqe(entry) }
    }

    /// Submit all pending SQEs and block until at least `min_complete`
    /// CQEs are available.
    pub fn submit_and_wait(&self, min_complete: usize) -> io::Result<()> {
        self.ring.submitter().submit_and_wait(min_complete)?;
        Ok(())
    }

    /// Submit all pending SQEs and wait up to `timeout` for at least
    /// `min_complete` CQEs. An expired timer surfaces as `ETIME`.
    pub fn submit_and_wait_timeout(&self, min_complete: usize, timeout: Duration) -> io::Result<()> {
        let ts = Timespec::new()
            .sec(timeout.as_secs())
            .nsec(timeout.subsec_nanos());
        let args = SubmitArgs::new().timespec(&ts);
        self.ring.submitter().submit_with_args(min_complete, &args)?;
        Ok(())
    }

    /// Drain available CQEs into `out` as (user_data, result) pairs, in
    /// kernel delivery order.
    pub fn drain_completions(&mut self, out: &mut VecDeque<(u64, i32)>) {
        for cqe in self.ring.completion() {
            out.push_back((cqe.user_data(), cqe.result()));
        }
    }

    /// Push an SQE to the submission queue.
    ///
    /// If the SQ is full, flush once to make room and retry; a second
    /// failure is reported to the caller rather than silently dropped.
    ///
    /// # Safety
    /// The SQE must reference valid memory for the lifetime of the operation.
    unsafe fn push_sqe(&mut self, entry: squeue::Entry) -> io::Result<()> {
        unsafe {
            if self.ring.submission().push(&entry).is_err() {
                metrics::SUBMISSION_RETRIES.increment();
                self.ring.submit()?;
                if self.ring.submission().push(&entry).is_err() {
                    metrics::SUBMISSION_FAILURES.increment();
                    return Err(io::Error::other("SQ still full after flush"));
                }
            }
        }
        Ok(())
    }
}
