//! Socket shadow, the "2pl-ext" mode from §4.5: a single per-OFD
//! write-lock (taken by the owning [`crate::shadow::ofd_tx::OfdTx`]
//! before the first send) is all the concurrency control a socket needs,
//! since sent bytes have no addressable record the way a regular file's
//! do. Sends are buffered and only reach the kernel at apply, so an
//! aborted transaction never sends anything; received bytes, by
//! contrast, cannot be unread once consumed from the kernel's socket
//! buffer and so are read eagerly during `exec`.

use std::os::unix::io::RawFd;

use tracing::{event, Level};

use crate::error::Error;
use crate::module::Module;

pub const MODULE_SEND: u16 = 1;

pub struct SocketTx {
    pub fildes: RawFd,
    pub file_index: usize,
    send_buf: Vec<u8>,
    applied: bool,
}

impl SocketTx {
    pub fn new(fildes: RawFd, file_index: usize) -> Self {
        SocketTx {
            fildes,
            file_index,
            send_buf: Vec::new(),
            applied: false,
        }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        nix::sys::socket::recv(self.fildes, buf, nix::sys::socket::MsgFlags::empty())
            .map_err(Error::from)
    }

    /// Buffers `buf` for sending at commit. Returns the full length
    /// immediately, matching `send`'s non-blocking-buffered contract.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        self.send_buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    pub fn apply_send(&mut self) -> Result<(), Error> {
        if self.applied || self.send_buf.is_empty() {
            self.applied = true;
            return Ok(());
        }
        self.applied = true;
        nix::sys::socket::send(
            self.fildes,
            &self.send_buf,
            nix::sys::socket::MsgFlags::empty(),
        )
        .map_err(Error::from)?;
        event!(Level::TRACE, fildes = self.fildes, bytes = self.send_buf.len(), "applied send");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::IntoRawFd;

    fn socketpair() -> (RawFd, RawFd) {
        let (a, b) = nix::sys::socket::socketpair(
            nix::sys::socket::AddressFamily::Unix,
            nix::sys::socket::SockType::Stream,
            None,
            nix::sys::socket::SockFlag::empty(),
        )
        .expect("socketpair");
        (a.into_raw_fd(), b.into_raw_fd())
    }

    #[test]
    fn send_is_buffered_until_apply() {
        let (a, b) = socketpair();
        let mut sender = SocketTx::new(a, 0);

        sender.write(b"hi").expect("buffer write");

        // Nothing reached the kernel yet: a non-blocking peek would block,
        // so instead assert the buffer is what `apply_send` will flush.
        assert_eq!(sender.send_buf, b"hi");

        sender.apply_send().expect("apply");

        let mut buf = [0u8; 2];
        let n = nix::sys::socket::recv(b, &mut buf, nix::sys::socket::MsgFlags::empty())
            .expect("recv");
        assert_eq!(n, 2);
        assert_eq!(&buf, b"hi");

        let _ = nix::unistd::close(a);
        let _ = nix::unistd::close(b);
    }

    #[test]
    fn apply_send_is_idempotent() {
        let (a, b) = socketpair();
        let mut sender = SocketTx::new(a, 0);
        sender.write(b"x").expect("buffer write");
        sender.apply_send().expect("first apply");
        sender.apply_send().expect("second apply is a no-op");

        let mut buf = [0u8; 4];
        let n = nix::sys::socket::recv(b, &mut buf, nix::sys::socket::MsgFlags::MSG_DONTWAIT)
            .expect("recv exactly one send's worth");
        assert_eq!(n, 1);

        let _ = nix::unistd::close(a);
        let _ = nix::unistd::close(b);
    }
}

pub struct SocketTxModule {
    pub shared: std::rc::Rc<std::cell::RefCell<SocketTx>>,
}

impl Module for SocketTxModule {
    fn apply_event(&mut self, event: &crate::event::Event) -> Result<(), Error> {
        if event.head == MODULE_SEND {
            self.shared.borrow_mut().apply_send()?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Error> {
        let shadow = self.shared.borrow();
        crate::file::global().sockets.unref(shadow.file_index, |_| {});
        Ok(())
    }
}
