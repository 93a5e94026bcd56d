use fluid_sim_core::FluidError;
use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;

/// Common interface for FFI error types.
///
/// # Design
/// - `code()` - Returns the error code to be passed across FFI boundary
/// - `msg()` - Returns the error message for diagnostic purposes
///
/// # Example
/// ```rust,ignore
/// let err = DefaultFluidSimError::null_pointer("ptr");
/// assert_eq!(err.code(), FluidSimErrorCode::NullPointer);
/// assert_eq!(err.msg(), "Parameter 'ptr' cannot be null");
/// ```
pub(crate) trait FluidSimError {
    /// Returns the error code to be returned across the FFI boundary.
    fn code(&self) -> FluidSimErrorCode;

    /// Returns the human-readable error message.
    fn msg(&self) -> &str;
}

/// Default implementation of `FluidSimError` for common FFI error scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DefaultFluidSimError {
    code: FluidSimErrorCode,
    msg: String,
}

impl DefaultFluidSimError {
    /// Create error for null pointer passed where non-null required.
    ///
    /// # Arguments
    /// * `param_name` - The name of the parameter that was null (e.g., `"out_instance"`, `"ptr"`)
    pub fn null_pointer(param_name: &str) -> Self {
        Self {
            code: FluidSimErrorCode::NullPointer,
            msg: format!("Parameter '{param_name}' cannot be null"),
        }
    }

    /// Create error for poisoned lock.
    pub fn lock_poisoned(lock_name: &str) -> Self {
        Self {
            code: FluidSimErrorCode::LockPoisoned,
            msg: format!("Lock '{lock_name}' was poisoned by a panic in another thread"),
        }
    }

    /// Create error for invalid parameter.
    pub fn invalid_parameter(message: String) -> Self {
        Self {
            code: FluidSimErrorCode::InvalidParameter,
            msg: message,
        }
    }

    /// Create error for a caller buffer that cannot hold the requested output.
    pub fn buffer_too_small(required: usize, provided: usize) -> Self {
        Self {
            code: FluidSimErrorCode::BufferTooSmall,
            msg: format!("Output buffer holds {provided} bytes, {required} required"),
        }
    }
}

impl FluidSimError for DefaultFluidSimError {
    fn code(&self) -> FluidSimErrorCode {
        self.code
    }

    fn msg(&self) -> &str {
        &self.msg
    }
}

impl From<&FluidError> for DefaultFluidSimError {
    fn from(error: &FluidError) -> Self {
        let code = match error {
            FluidError::Configuration { .. } => FluidSimErrorCode::InvalidConfiguration,
            FluidError::Resource { .. } | FluidError::Unsupported { .. } => {
                FluidSimErrorCode::ResourceUnavailable
            }
            FluidError::NumericInstability { .. } => FluidSimErrorCode::NumericInstability,
            FluidError::Device(_) => FluidSimErrorCode::DeviceError,
        };
        Self {
            code,
            msg: error.to_string(),
        }
    }
}

impl From<FluidError> for DefaultFluidSimError {
    fn from(error: FluidError) -> Self {
        Self::from(&error)
    }
}

/// FFI error codes returned by fluid simulation functions.
/// Follows standard C convention: 0 = success, non-zero = error.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FluidSimErrorCode {
    /// Operation completed successfully.
    Ok = 0,

    /// Invalid pointer: null pointer passed where non-null required.
    NullPointer = 1,

    /// Lock poisoned: internal synchronization primitive was poisoned by a panic.
    LockPoisoned = 2,

    /// Configuration rejected: a parameter is out of range.
    InvalidConfiguration = 3,

    /// Invalid parameter passed to function.
    InvalidParameter = 4,

    /// No storage layout or size could be allocated on this platform.
    ResourceUnavailable = 5,

    /// GPU device failure, or a GPU was required and none is usable.
    DeviceError = 6,

    /// A field held non-finite values.
    NumericInstability = 7,

    /// Caller-provided output buffer is too small.
    BufferTooSmall = 8,
}

impl From<DefaultFluidSimError> for FluidSimErrorCode {
    fn from(error: DefaultFluidSimError) -> Self {
        error.code
    }
}

thread_local! {
    /// Thread-local storage for the most recent FFI error (C string, error code).
    /// The CString is stored to prevent memory leaks when returning raw pointers via FFI.
    static LAST_ERROR: RefCell<(Option<CString>, FluidSimErrorCode)> = const { RefCell::new((None, FluidSimErrorCode::Ok)) };
}

/// Internal helper to read `LAST_ERROR` thread-local storage (cstring, code).
pub(crate) fn with_last_error<F, R>(f: F) -> R
where
    F: FnOnce(&(Option<CString>, FluidSimErrorCode)) -> R,
{
    LAST_ERROR.with_borrow(f)
}

/// Internal helper to mutate `LAST_ERROR` thread-local storage (cstring, code).
pub(crate) fn with_last_error_mut<F, R>(f: F) -> R
where
    F: FnOnce(&mut (Option<CString>, FluidSimErrorCode)) -> R,
{
    LAST_ERROR.with_borrow_mut(f)
}

/// Retrieve the most recent FFI error message as a null-terminated C string.
///
/// Returns:
/// - A borrowed pointer to the error message if an error occurred.
/// - `null` if no error has occurred or the error message cannot be converted to C string.
///
/// # Thread Safety
/// Error messages are stored per-thread, so each thread has its own independent error state.
///
/// # Lifetime
/// The returned pointer is valid until the next FFI call on this thread that sets or
/// clears the error, or until the thread terminates.
///
/// **DO NOT FREE THIS POINTER** - it is managed internally.
///
/// Example:
/// ```cpp
/// FluidSimInstance* sim = nullptr;
/// FluidSimErrorCode err = fluid_sim_new(&config, &sim);
/// if (err != FluidSimErrorCode::Ok) {
///     const char* error = fluid_sim_get_last_error();
///     if (error) {
///         printf("Fluid sim creation failed: %s\n", error);
///     }
/// }
/// ```
#[no_mangle]
pub extern "C" fn fluid_sim_get_last_error() -> *const c_char {
    with_last_error(|(cstring, _code)| cstring.as_ref().map_or(ptr::null(), |cs| cs.as_ptr()))
}

/// Retrieve the most recent FFI error code.
///
/// Returns `FluidSimErrorCode::Ok` (0) if no error has occurred on this thread, or the
/// specific error code from the last failed operation.
#[no_mangle]
pub extern "C" fn fluid_sim_get_last_error_code() -> FluidSimErrorCode {
    with_last_error(|(_cstring, code)| *code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fluid_sim_core::solver::FieldKind;

    #[test]
    fn test_fluid_errors_map_to_codes() {
        let err = DefaultFluidSimError::from(FluidError::config("maxDt", "too large"));
        assert_eq!(err.code(), FluidSimErrorCode::InvalidConfiguration);
        assert!(err.msg().contains("maxDt"));

        let err = DefaultFluidSimError::from(FluidError::Device("lost".into()));
        assert_eq!(err.code(), FluidSimErrorCode::DeviceError);

        let err = DefaultFluidSimError::from(FluidError::NumericInstability {
            field: FieldKind::Velocity,
            count: 3,
        });
        assert_eq!(err.code(), FluidSimErrorCode::NumericInstability);
    }

    #[test]
    fn test_null_pointer_message() {
        let err = DefaultFluidSimError::null_pointer("ptr");
        assert_eq!(err.code(), FluidSimErrorCode::NullPointer);
        assert_eq!(err.msg(), "Parameter 'ptr' cannot be null");
    }
}
