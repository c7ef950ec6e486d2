//! RTT channels as embedded-io-async byte streams for the ergot transport

use embedded_io_async::{ErrorKind, ErrorType, Read, Write};
use rtt_target::{DownChannel, UpChannel};

/// RTT never fails a transfer; it only moves fewer bytes
#[derive(Debug, Clone, Copy)]
pub struct RttError;

impl embedded_io_async::Error for RttError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Host -> device frames (down channel)
pub struct RttDownlink(&'static mut DownChannel);

/// Device -> host frames (up channel)
pub struct RttUplink(&'static mut UpChannel);

/// Wrap a channel pair as (reader, writer)
pub fn split(
    up: &'static mut UpChannel,
    down: &'static mut DownChannel,
) -> (RttDownlink, RttUplink) {
    (RttDownlink(down), RttUplink(up))
}

impl ErrorType for RttDownlink {
    type Error = RttError;
}

impl Read for RttDownlink {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        // Returns 0 when the host has written nothing yet
        Ok(self.0.read(buf))
    }
}

impl ErrorType for RttUplink {
    type Error = RttError;
}

impl Write for RttUplink {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        // NoBlockSkip channel: drops the write if the host is not draining
        Ok(self.0.write(buf))
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
