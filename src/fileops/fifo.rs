//! FIFO (named pipe) shadow. Pipes have no offset, so reads and writes go
//! straight to the kernel during `exec` rather than through a write-log —
//! there is no way to undo bytes a reader on the other end has already
//! consumed, so a rolled-back transaction simply cannot take this data
//! back (§4.5, socket/pipe "2pl-ext" note).

use std::os::unix::io::RawFd;

use crate::error::Error;
use crate::module::Module;

pub struct FifoTx {
    pub fildes: RawFd,
    pub file_index: usize,
}

impl FifoTx {
    pub fn new(fildes: RawFd, file_index: usize) -> Self {
        FifoTx { fildes, file_index }
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
    fn read_and_write_go_straight_to_the_kernel() {
        let (read_end, write_end) = nix::unistd::pipe().expect("pipe");
        let mut writer = FifoTx::new(write_end, 0);
        let mut reader = FifoTx::new(read_end, 0);

        let n = writer.write(b"hi").expect("write");
        assert_eq!(n, 2);

        let mut buf = [0u8; 2];
        let n = reader.read(&mut buf).expect("read");
        assert_eq!(n, 2);
        assert_eq!(&buf, b"hi");

        let _ = nix::unistd::close(read_end);
        let _ = nix::unistd::close(write_end);
    }
}

pub struct FifoTxModule {
    pub shared: std::rc::Rc<std::cell::RefCell<FifoTx>>,
}

impl Module for FifoTxModule {
    fn finish(&mut self) -> Result<(), Error> {
        let shadow = self.shared.borrow();
        crate::file::global().fifos.unref(shadow.file_index, |_| {});
        Ok(())
    }
}
