//! Error type shared by the protocol engine and the cable drivers.
use alloc::string::String;

/// Errors reported by cables, the state machine and the chain scanner.
///
/// Protocol-level conditions such as an unknown IDCODE or an empty chain are
/// not errors; they show up in the scan results instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No adapter matched the requested VID/PID, serial number or bus address.
    #[error("no matching adapter found")]
    DeviceNotFound,

    /// The adapter exists but could not be claimed, usually because another
    /// driver or process holds it.
    #[error("adapter is busy; make sure no other driver holds the interface")]
    DeviceBusy,

    /// The adapter exists but the current user may not open it.
    #[error("permission denied while opening the adapter; check udev rules")]
    PermissionDenied,

    /// A USB transfer failed or returned fewer bytes than requested.
    #[error("I/O error: {0}")]
    Io(String),

    /// The adapter did not answer within its response window.
    #[error("timed out waiting for the adapter")]
    Timeout,

    /// A device index outside of the detected chain.
    #[error("device index {index} out of range for a chain of {len} devices")]
    InvalidIndex { index: usize, len: usize },

    /// A parameter that can never be valid, such as a zero-length shift.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The chain already starts with a device carrying this IDCODE.
    #[error("device 0x{0:08x} is already first in the chain")]
    DuplicateDevice(u32),

    /// No built-in cable description goes by this name.
    #[error("unknown cable '{0}'")]
    UnknownCable(String),

    /// A GPIO pin of a bitbang cable reported an error.
    #[error("GPIO pin error: {0:?}")]
    Pin(embedded_hal::digital::ErrorKind),
}

pub type Result<T> = core::result::Result<T, Error>;

#[cfg(feature = "std")]
impl From<rusb::Error> for Error {
    fn from(e: rusb::Error) -> Self {
        use alloc::string::ToString;

        match e {
            rusb::Error::NotFound | rusb::Error::NoDevice => Error::DeviceNotFound,
            rusb::Error::Busy => Error::DeviceBusy,
            rusb::Error::Access => Error::PermissionDenied,
            rusb::Error::Timeout => Error::Timeout,
            e => Error::Io(e.to_string()),
        }
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn usb_errors_keep_their_kind() {
        assert!(matches!(Error::from(rusb::Error::NoDevice), Error::DeviceNotFound));
        assert!(matches!(Error::from(rusb::Error::Busy), Error::DeviceBusy));
        assert!(matches!(Error::from(rusb::Error::Access), Error::PermissionDenied));
        assert!(matches!(Error::from(rusb::Error::Timeout), Error::Timeout));
        assert!(matches!(Error::from(rusb::Error::Pipe), Error::Io(_)));
    }
}
