use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::{
    io, mem,
    os::fd::{AsRawFd, FromRawFd, OwnedFd},
    time::Duration,
};
use tokio::{sync::oneshot, task::JoinHandle, time::timeout};

use crate::config::NetlinkConfig;
use crate::coordinator::RefreshSignal;
use crate::uevent::{self, DecodeError};

const NETLINK_KOBJECT_UEVENT: i32 = 15;
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// A datagram endpoint delivering udev monitor messages.
pub trait UeventSocket: Send {
    /// Wait up to `limit` for a datagram. Ok(false) on timeout or interruption.
    fn wait_readable(&mut self, limit: Duration) -> io::Result<bool>;

    /// Receive one datagram into `buf`.
    ///
    /// Returns the full datagram length, which exceeds `buf.len()` when the
    /// datagram was truncated, or None when nothing is pending.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;
}

/// Non-blocking `NETLINK_KOBJECT_UEVENT` socket watched through epoll.
/// Both descriptors close on drop.
pub struct NetlinkSocket {
    socket: OwnedFd,
    epoll: OwnedFd,
}

impl NetlinkSocket {
    pub fn bind(config: &NetlinkConfig) -> Result<Self> {
        let socket_fd = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
                NETLINK_KOBJECT_UEVENT,
            )
        };
        if socket_fd == -1 {
            return Err(io::Error::last_os_error()).context("Failed to create netlink socket");
        }
        let socket = unsafe { OwnedFd::from_raw_fd(socket_fd) };

        let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as u16;
        addr.nl_groups = config.multicast_group;

        if unsafe {
            libc::bind(
                socket.as_raw_fd(),
                &addr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_nl>() as u32,
            )
        } == -1
        {
            return Err(io::Error::last_os_error()).with_context(|| {
                format!(
                    "Failed to bind netlink socket to group {}",
                    config.multicast_group
                )
            });
        }

        if unsafe {
            libc::setsockopt(
                socket.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_RCVBUF,
                &config.socket_buffer_size as *const _ as *const libc::c_void,
                mem::size_of::<i32>() as u32,
            )
        } == -1
        {
            warn!(
                "Failed to set SO_RCVBUF: {}",
                io::Error::last_os_error()
            );
        }

        let epoll_fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epoll_fd == -1 {
            return Err(io::Error::last_os_error()).context("Failed to create epoll instance");
        }
        let epoll = unsafe { OwnedFd::from_raw_fd(epoll_fd) };

        let mut event = libc::epoll_event {
            events: libc::EPOLLIN as u32,
            u64: socket.as_raw_fd() as u64,
        };
        if unsafe {
            libc::epoll_ctl(
                epoll.as_raw_fd(),
                libc::EPOLL_CTL_ADD,
                socket.as_raw_fd(),
                &mut event,
            )
        } == -1
        {
            return Err(io::Error::last_os_error()).context("Failed to add socket to epoll");
        }

        Ok(Self { socket, epoll })
    }
}

impl UeventSocket for NetlinkSocket {
    fn wait_readable(&mut self, limit: Duration) -> io::Result<bool> {
        let mut events = [libc::epoll_event { events: 0, u64: 0 }; 1];
        let ready = unsafe {
            libc::epoll_wait(
                self.epoll.as_raw_fd(),
                events.as_mut_ptr(),
                events.len() as i32,
                limit.as_millis().min(i32::MAX as u128) as i32,
            )
        };

        match ready {
            -1 => {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
            0 => Ok(false),
            _ => Ok(true),
        }
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        let received = unsafe {
            libc::recv(
                self.socket.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                libc::MSG_TRUNC,
            )
        };

        if received == -1 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(None),
                _ => Err(err),
            };
        }
        Ok(Some(received as usize))
    }
}

/// What the listener did with one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Hotplug,
    Ignored,
    Dropped,
}

/// Decode and classify one received datagram, raising `signal` for HDMI hotplugs.
pub fn handle_datagram(data: &[u8], signal: &RefreshSignal) -> Disposition {
    match uevent::classify_datagram(data, uevent::is_drm_hotplug) {
        Ok(true) => {
            info!("HDMI hotplug event received");
            signal.raise();
            Disposition::Hotplug
        }
        Ok(false) => {
            debug!("Ignoring uevent of {} bytes", data.len());
            Disposition::Ignored
        }
        Err(DecodeError::BadMagic) => {
            debug!("Dropping non-udev message of {} bytes", data.len());
            Disposition::Dropped
        }
        Err(e) => {
            warn!("Dropping malformed uevent: {}", e);
            Disposition::Dropped
        }
    }
}

/// Owns the uevent socket and feeds hotplug events to the refresh coordinator.
pub struct NetlinkEventSource<S> {
    socket: S,
    buffer: Vec<u8>,
    poll_timeout: Duration,
}

impl NetlinkEventSource<NetlinkSocket> {
    pub fn bind(config: &NetlinkConfig) -> Result<Self> {
        let socket = NetlinkSocket::bind(config)?;
        info!(
            "Listening for uevents on netlink group {}",
            config.multicast_group
        );
        Ok(Self::with_socket(socket, config))
    }
}

impl<S: UeventSocket + 'static> NetlinkEventSource<S> {
    pub fn with_socket(socket: S, config: &NetlinkConfig) -> Self {
        Self {
            socket,
            buffer: vec![0u8; config.receive_buffer_size],
            poll_timeout: config.poll_timeout(),
        }
    }

    /// Run the receive loop on the blocking pool until `stop` is called.
    pub fn spawn(self, signal: RefreshSignal) -> ListenerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::task::spawn_blocking(move || self.listen(signal, shutdown_rx));
        ListenerHandle { shutdown_tx, task }
    }

    fn listen(
        mut self,
        signal: RefreshSignal,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> Result<()> {
        loop {
            match shutdown_rx.try_recv() {
                Err(oneshot::error::TryRecvError::Empty) => {}
                _ => {
                    info!("Shutdown signal received in netlink listener");
                    break;
                }
            }

            match self.socket.wait_readable(self.poll_timeout) {
                Ok(true) => self.drain(&signal),
                Ok(false) => continue,
                Err(e) => {
                    error!("Socket event error: {}", e);
                    std::thread::sleep(ERROR_BACKOFF);
                }
            }
        }
        Ok(())
    }

    /// Read until the socket is empty. A receive error ends this pass only;
    /// the loop keeps listening.
    fn drain(&mut self, signal: &RefreshSignal) {
        loop {
            let received = match self.socket.recv(&mut self.buffer) {
                Ok(received) => received,
                Err(e) if e.raw_os_error() == Some(libc::ENOBUFS) => {
                    warn!("Uevent receive queue overflowed, events were lost: {}", e);
                    return;
                }
                Err(e) => {
                    error!("Error receiving from socket: {}", e);
                    std::thread::sleep(ERROR_BACKOFF);
                    return;
                }
            };

            match received {
                None => return,
                Some(n) if n > self.buffer.len() => {
                    warn!(
                        "Dropping truncated uevent ({} bytes, buffer is {})",
                        n,
                        self.buffer.len()
                    );
                }
                Some(n) => {
                    handle_datagram(&self.buffer[..n], signal);
                }
            }
        }
    }
}

pub struct ListenerHandle {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<Result<()>>,
}

impl ListenerHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the loop and wait up to `limit` for it to close the socket.
    pub async fn stop(self, limit: Duration) -> bool {
        let _ = self.shutdown_tx.send(());
        match timeout(limit, self.task).await {
            Ok(Ok(Ok(()))) => true,
            Ok(Ok(Err(e))) => {
                error!("Netlink listener failed: {:#}", e);
                true
            }
            Ok(Err(e)) => {
                error!("Netlink listener task failed: {}", e);
                true
            }
            Err(_) => {
                warn!("Listener task didn't complete in time");
                false
            }
        }
    }
}
