//! Creating and rebinding the listening socket.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use log::debug;
use mio::net::TcpListener;
use socket2::{Domain, Socket, Type};

use crate::config::BindFamily;
use crate::errx;

/// Open a TCP listener of the requested family, bound to the wildcard
/// address on `port`. Socket-option failures are best effort (logged at
/// debug); bind/listen failures are fatal.
pub(crate) fn create(port: u16, family: BindFamily) -> TcpListener {
    let (domain, addr): (Domain, SocketAddr) = match family {
        BindFamily::V4Only => (Domain::IPV4, (Ipv4Addr::UNSPECIFIED, port).into()),
        BindFamily::V6Only | BindFamily::Dual => (Domain::IPV6, (Ipv6Addr::UNSPECIFIED, port).into()),
    };

    let socket = Socket::new(domain, Type::STREAM, None)
        .unwrap_or_else(|err| errx(exitcode::OSERR, format!("socket(), error: {}", err)));

    if let Err(err) = socket.set_reuse_address(true) {
        debug!("setsockopt(SO_REUSEADDR, true) = {}", err);
    }

    if domain == Domain::IPV6 {
        let v6only = family == BindFamily::V6Only;
        if let Err(err) = socket.set_only_v6(v6only) {
            debug!("setsockopt(IPV6_V6ONLY, {}) = {}", v6only, err);
        }
    }

    socket
        .bind(&addr.into())
        .unwrap_or_else(|err| errx(exitcode::OSERR, format!("bind(), port: {}, error: {}", port, err)));

    // Request an effectively unbounded backlog; the kernel clamps it to its
    // own configured maximum.
    socket
        .listen(i32::MAX)
        .unwrap_or_else(|err| errx(exitcode::OSERR, format!("listen(), error: {}", err)));

    socket
        .set_nonblocking(true)
        .unwrap_or_else(|err| errx(exitcode::OSERR, format!("set_nonblocking(), error: {}", err)));

    TcpListener::from_std(socket.into())
}
