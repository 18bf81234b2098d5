//! Listening-socket collaborator.
//!
//! The core event loop consumes an already-bound, already-listening
//! descriptor; it never creates or configures one. This module is the
//! collaborator that supplies it.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::fd::RawFd;

/// Create a TCP listener bound to `0.0.0.0:port` with the given backlog.
///
/// Returns the raw descriptor and the bound address, so binding port 0
/// resolves to the kernel-assigned port. The caller owns the descriptor
/// and closes it after the event loop exits.
pub fn bind_listener(port: u16, backlog: i32) -> io::Result<(RawFd, SocketAddr)> {
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    let optval: libc::c_int = 1;
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &optval as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }

    let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    addr.sin_family = libc::AF_INET as libc::sa_family_t;
    addr.sin_port = port.to_be();
    addr.sin_addr.s_addr = libc::INADDR_ANY.to_be();

    let ret = unsafe {
        libc::bind(
            fd,
            &addr as *const _ as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        let err = io::Error::last_os_error();
        unsafe {
            libc::close(fd);
        }
        return Err(err);
    }

    let ret = unsafe { libc::listen(fd, backlog) };
    if ret < 0 {
        let err = io::Error::last_os_error();
        unsafe {
            libc::close(fd);
        }
        return Err(err);
    }

    // Recover the bound address (meaningful when port was 0).
    let mut bound: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    let mut bound_len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    let ret = unsafe {
        libc::getsockname(
            fd,
            &mut bound as *mut _ as *mut libc::sockaddr,
            &mut bound_len,
        )
    };
    if ret < 0 {
        let err = io::Error::last_os_error();
        unsafe {
            libc::close(fd);
        }
        return Err(err);
    }

    let local = SocketAddr::V4(SocketAddrV4::new(
        Ipv4Addr::from(u32::from_be(bound.sin_addr.s_addr)),
        u16::from_be(bound.sin_port),
    ));
    Ok((fd, local))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_ephemeral_port() {
        let (fd, addr) = bind_listener(0, 16).unwrap();
        assert_ne!(addr.port(), 0);
        assert!(std::net::TcpStream::connect(addr).is_ok());
        unsafe {
            libc::close(fd);
        }
    }
}
