//! UEFI status codes.
//!
//! [`EfiStatus`] wraps the UEFI `EFI_STATUS` type (`usize`-sized). Zero is
//! success; values with the high bit set are errors. The constants below
//! cover the codes the memory, allocation, and configuration-table services
//! can actually return; unknown codes still classify and format correctly.

use core::fmt;

/// Distinguishes error codes from success/warnings.
const ERROR_BIT: usize = 1 << (usize::BITS - 1);

/// Builds an error status from its low code, setting the high bit.
const fn err(code: usize) -> EfiStatus {
    EfiStatus(ERROR_BIT | code)
}

/// A UEFI status code.
///
/// Transparent wrapper around `usize` matching `EFI_STATUS`. Use
/// [`to_result`](Self::to_result) at call sites to fold warnings into
/// success and surface errors as `Err`.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EfiStatus(pub usize);

impl EfiStatus {
    /// The operation completed successfully.
    pub const SUCCESS: Self = Self(0);

    /// The image failed to load.
    pub const LOAD_ERROR: Self = err(1);
    /// A parameter was incorrect.
    pub const INVALID_PARAMETER: Self = err(2);
    /// The operation is not supported.
    pub const UNSUPPORTED: Self = err(3);
    /// The buffer is not large enough to hold the requested data.
    pub const BUFFER_TOO_SMALL: Self = err(5);
    /// The physical device reported an error while attempting the operation.
    pub const DEVICE_ERROR: Self = err(7);
    /// A resource has run out.
    pub const OUT_OF_RESOURCES: Self = err(9);
    /// The item was not found.
    pub const NOT_FOUND: Self = err(0x0e);
    /// Access was denied.
    pub const ACCESS_DENIED: Self = err(0x0f);

    /// Returns `true` if this status code indicates success.
    #[inline]
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if this status code indicates an error (high bit set).
    #[inline]
    #[must_use]
    pub const fn is_error(self) -> bool {
        self.0 & ERROR_BIT != 0
    }

    /// Converts this status code to a `Result`, folding warnings into `Ok`.
    ///
    /// # Errors
    ///
    /// Returns `Err(self)` if the status code has the error bit set.
    #[inline]
    pub const fn to_result(self) -> Result<(), Self> {
        if self.is_error() { Err(self) } else { Ok(()) }
    }

    /// Returns the specification name of the status code, if known.
    #[must_use]
    pub const fn name(self) -> Option<&'static str> {
        match self {
            Self::SUCCESS => Some("EFI_SUCCESS"),
            Self::LOAD_ERROR => Some("EFI_LOAD_ERROR"),
            Self::INVALID_PARAMETER => Some("EFI_INVALID_PARAMETER"),
            Self::UNSUPPORTED => Some("EFI_UNSUPPORTED"),
            Self::BUFFER_TOO_SMALL => Some("EFI_BUFFER_TOO_SMALL"),
            Self::DEVICE_ERROR => Some("EFI_DEVICE_ERROR"),
            Self::OUT_OF_RESOURCES => Some("EFI_OUT_OF_RESOURCES"),
            Self::NOT_FOUND => Some("EFI_NOT_FOUND"),
            Self::ACCESS_DENIED => Some("EFI_ACCESS_DENIED"),
            _ => None,
        }
    }
}

impl fmt::Debug for EfiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "EfiStatus({name})"),
            None => write!(f, "EfiStatus({:#x})", self.0),
        }
    }
}

impl fmt::Display for EfiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None if self.is_error() => write!(f, "unknown error ({:#x})", self.0 & !ERROR_BIT),
            None => write!(f, "unknown warning ({})", self.0),
        }
    }
}

// ── Compile-time layout assertions ──────────────────────────────────

#[cfg(target_pointer_width = "64")]
const _: () = assert!(core::mem::size_of::<EfiStatus>() == 8);
