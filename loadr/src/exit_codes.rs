#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// The run completed. Failed checks and network errors are reported, not fatal.
    Success = 0,

    /// Invalid CLI/config/scenario (bad flags, unreadable or invalid scenario file, vus=0, ...).
    InvalidInput = 30,

    /// Internal/runtime error.
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
