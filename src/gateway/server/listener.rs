use std::io;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::{debug, error};

use crate::gateway::common::{Error, Result};

/// Pending-connection backlog passed to `listen()`: a fixed, generous
/// default rather than something tuned to a worker count.
const LISTEN_BACKLOG: u32 = 1024;

pub struct Listener {
    pub address: String,
    listener: TcpListener,
}

impl Listener {
    pub fn new(address: String, reuseport: bool) -> Result<Self> {
        let addr = address.parse()?;
        let sock = TcpSocket::new_v4()?;
        #[cfg(unix)]
        {
            if reuseport {
                sock.set_reuseport(true)?;
            }
            // The client always sends the first data after connecting, so
            // defer the accept() wakeup until it arrives.
            #[cfg(target_os = "linux")]
            unsafe {
                let optval: libc::c_int = 1;
                let ret = libc::setsockopt(
                    sock.as_raw_fd(),
                    libc::SOL_SOCKET,
                    libc::TCP_DEFER_ACCEPT,
                    &optval as *const _ as *const libc::c_void,
                    std::mem::size_of_val(&optval) as libc::socklen_t,
                );
                if ret != 0 {
                    return Err(Error::from(io::Error::last_os_error()));
                }
            }
        }
        sock.bind(addr)?;
        let listener = sock.listen(LISTEN_BACKLOG)?;
        Ok(Self { address, listener })
    }

    pub async fn accept(&self) -> Option<TcpStream> {
        loop {
            match self.listener.accept().await {
                Ok((sock, remote_addr)) => {
                    debug!(%remote_addr, server = %self.address.as_str(), "accept connection");
                    return Some(sock);
                }
                Err(e) => {
                    if cfg!(unix) && std::env::consts::OS == "linux" {
                        match e.raw_os_error().unwrap_or(0) {
                            libc::ECONNABORTED
                            | libc::EMFILE
                            | libc::ENFILE
                            | libc::ENOBUFS
                            | libc::ENOMEM
                            | libc::EPROTO
                            | libc::EINTR => {
                                error!(%e, "accept error");
                                continue;
                            }
                            libc::EBADF => return None,
                            _ => panic!("unrecoverable error on {}: {}", self.address.as_str(), Error::from(e)),
                        }
                    }
                    error!(%e, "accept error");
                    return None;
                }
            }
        }
    }
}
