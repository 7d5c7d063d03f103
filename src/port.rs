//! Ephemeral port allocation on the loopback interface

use std::io;
use std::net::{Ipv4Addr, TcpListener};
use tracing::debug;

/// Ask the OS for a free TCP port on loopback.
///
/// A listener is bound to port 0, the assigned port is read back and the
/// listener is dropped before returning. The port is only known to be free at
/// the moment of allocation; another process may take it before the backend
/// binds it. Errors are returned as-is and never retried here.
pub fn get_free_port() -> io::Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    let port = listener.local_addr()?.port();
    drop(listener);

    debug!(port, "Allocated free port");
    Ok(port)
}
