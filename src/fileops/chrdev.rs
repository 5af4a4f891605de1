//! Character-device shadow. Most character devices (ttys, `/dev/null`,
//! randomness sources) are not seekable and not undoable, so reads and
//! writes go straight to the kernel during `exec`, exactly as for FIFOs.

use std::os::unix::io::RawFd;

use crate::error::Error;
use crate::module::Module;

pub struct ChrdevTx {
    pub fildes: RawFd,
    pub file_index: usize,
}

impl ChrdevTx {
    pub fn new(fildes: RawFd, file_index: usize) -> Self {
        ChrdevTx { fildes, file_index }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        nix::unistd::read(self.fildes, buf).map_err(Error::from)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        nix::unistd::write(self.fildes, buf).map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_and_read_against_dev_null() {
        let fildes = nix::fcntl::open(
            "/dev/null",
            nix::fcntl::OFlag::O_RDWR,
            nix::sys::stat::Mode::empty(),
        )
        .expect("open /dev/null");
        let mut t = ChrdevTx::new(fildes, 0);

        let n = t.write(b"ignored").expect("write");
        assert_eq!(n, 7);

        let mut buf = [0u8; 8];
        let n = t.read(&mut buf).expect("read");
        assert_eq!(n, 0, "/dev/null always reads EOF");

        let _ = nix::unistd::close(fildes);
    }
}

pub struct ChrdevTxModule {
    pub shared: std::rc::Rc<std::cell::RefCell<ChrdevTx>>,
}

impl Module for ChrdevTxModule {
    fn finish(&mut self) -> Result<(), Error> {
        let shadow = self.shared.borrow();
        crate::file::global().chrdevs.unref(shadow.file_index, |_| {});
        Ok(())
    }
}
