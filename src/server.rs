//! Connection state machine and event loop.
//!
//! One thread cycles completions: accept completions re-arm the listener
//! and arm a read for the new descriptor; read completions parse and arm
//! a write; write completions close the connection. No descriptor ever
//! has more than one outstanding read or write intent.

use std::os::fd::RawFd;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::context::{OpKind, RequestContext};
use crate::driver::{Completion, Driver, ShutdownHandle};
use crate::error::Error;
use crate::metrics;
use crate::parser;
use crate::response::{ResourceSet, ResponsePlan};

/// HTTP server multiplexing connections on a single io_uring event loop.
///
/// Connection policy is close-after-response: each connection is served
/// exactly one response and then closed, HTTP/1.0 style. This is a
/// policy, not an oversight; responses carry `Connection: close`.
pub struct Server {
    driver: Driver,
    resources: ResourceSet,
    listener: RawFd,
    tcp_nodelay: bool,
}

impl Server {
    /// Build a server around an already-bound, already-listening
    /// descriptor. The server never configures or closes the listener.
    pub fn new(config: &Config, listener: RawFd, resources: ResourceSet) -> Result<Self, Error> {
        let driver = Driver::new(config)?;
        Ok(Server {
            driver,
            resources,
            listener,
            tcp_nodelay: config.tcp_nodelay,
        })
    }

    /// Handle that stops the event loop from another thread or a signal
    /// handler.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.driver.shutdown_handle()
    }

    /// Run the event loop until a shutdown wake arrives or a fatal error
    /// occurs, then tear down the completion interface. Teardown runs on
    /// both exits: a fatal error must not leak the descriptors and
    /// buffers held by outstanding contexts.
    pub fn run(mut self) -> Result<(), Error> {
        let result = self.event_loop();
        info!(
            in_flight = self.driver.in_flight(),
            ok = result.is_ok(),
            "event loop done, tearing down"
        );
        self.driver.teardown();
        result
    }

    fn event_loop(&mut self) -> Result<(), Error> {
        self.driver.arm_accept(self.listener)?;
        loop {
            let Completion { result, context } = self.driver.wait_next_completion()?;
            match context {
                RequestContext::Accept => self.on_accept(result)?,
                RequestContext::Read { descriptor, buffer } => {
                    self.on_read(descriptor, buffer, result)?
                }
                RequestContext::Write { descriptor, buffer } => {
                    self.on_write(descriptor, buffer, result)
                }
                RequestContext::Wakeup => return Ok(()),
            }
        }
    }

    /// An accept intent completed.
    ///
    /// The accept is re-armed before anything else so the listening
    /// descriptor is never without one; losing it would be a total
    /// outage, so a re-arm submission failure is process-fatal.
    fn on_accept(&mut self, result: i32) -> Result<(), Error> {
        if result < 0 {
            let errno = -result;
            metrics::OPERATION_FAILURES.increment();
            let error = Error::Operation {
                op: OpKind::Accept,
                errno,
            };
            // A listener that can never accept again is a total outage;
            // transient failures (EMFILE, ECONNABORTED, ...) are not.
            if matches!(errno, libc::EBADF | libc::EINVAL | libc::ENOTSOCK) {
                return Err(error);
            }
            warn!(error = %error, "accept failed");
            self.driver.arm_accept(self.listener)?;
            return Ok(());
        }

        // Snapshot the peer address now: once the accept is re-armed the
        // kernel may overwrite the shared sockaddr storage.
        let peer = self.driver.last_peer_addr();
        self.driver.arm_accept(self.listener)?;

        let descriptor = result;
        metrics::CONNECTIONS_ACCEPTED.increment();
        metrics::CONNECTIONS_ACTIVE.increment();
        debug!(descriptor, ?peer, "connection accepted");

        if self.tcp_nodelay {
            set_tcp_nodelay(descriptor);
        }

        match self.driver.arm_read(descriptor) {
            Ok(()) => Ok(()),
            Err(Error::ContextTableFull) => {
                // At the in-flight bound new connections are shed, not queued.
                warn!(descriptor, "context table full, shedding connection");
                self.close(descriptor);
                Ok(())
            }
            Err(Error::Submission { op, source }) => {
                warn!(descriptor, %op, %source, "read submission failed");
                self.close(descriptor);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// A read intent completed.
    fn on_read(&mut self, descriptor: RawFd, mut buffer: Vec<u8>, result: i32) -> Result<(), Error> {
        if result == 0 {
            // Peer closed. Never reaches the parser.
            debug!(descriptor, "peer closed");
            self.close(descriptor);
            return Ok(());
        }
        if result < 0 {
            metrics::OPERATION_FAILURES.increment();
            warn!(
                error = %Error::Operation { op: OpKind::Read, errno: -result },
                descriptor,
                "read failed"
            );
            self.close(descriptor);
            return Ok(());
        }

        let len = result as usize;
        metrics::BYTES_RECEIVED.add(len as u64);

        let plan = match parser::parse_request_line(&buffer[..len]) {
            Ok(request) => {
                debug!(descriptor, method = ?request.method, path = request.path, "request");
                self.resources.plan(&request)
            }
            Err(e) => {
                metrics::MALFORMED_REQUESTS.increment();
                warn!(descriptor, error = %e, "malformed request");
                ResponsePlan::bad_request()
            }
        };

        // The read buffer becomes the write buffer: rendered in place,
        // ownership moves into the write context, released exactly once
        // on write completion.
        plan.render(&mut buffer);

        match self.driver.arm_write(descriptor, buffer) {
            Ok(()) => Ok(()),
            Err(Error::ContextTableFull) => {
                warn!(descriptor, "context table full, dropping response");
                self.close(descriptor);
                Ok(())
            }
            Err(Error::Submission { op, source }) => {
                warn!(descriptor, %op, %source, "write submission failed");
                self.close(descriptor);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// A write intent completed. Close-after-response in all cases.
    fn on_write(&mut self, descriptor: RawFd, buffer: Vec<u8>, result: i32) {
        if result < 0 {
            metrics::OPERATION_FAILURES.increment();
            warn!(
                error = %Error::Operation { op: OpKind::Write, errno: -result },
                descriptor,
                "write failed"
            );
        } else {
            metrics::BYTES_SENT.add(result as u64);
            if (result as usize) < buffer.len() {
                // One write intent per response; short writes are not retried.
                debug!(
                    descriptor,
                    written = result,
                    expected = buffer.len(),
                    "short write"
                );
            }
        }
        self.close(descriptor);
    }

    fn close(&mut self, descriptor: RawFd) {
        // Safety: once a connection's context has been consumed the state
        // machine is the descriptor's sole owner.
        unsafe {
            libc::close(descriptor);
        }
        metrics::CONNECTIONS_CLOSED.increment();
        metrics::CONNECTIONS_ACTIVE.decrement();
    }
}

fn set_tcp_nodelay(fd: RawFd) {
    let optval: libc::c_int = 1;
    unsafe {
        libc::setsockopt(
            fd,
            libc::IPPROTO_TCP,
            libc::TCP_NODELAY,
            &optval as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
}
