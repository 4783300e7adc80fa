use crate::flux_error::FluxRegisterError;

/// Structural consistency checks for box layouts and registers.
pub trait DebugInvariants {
    /// Panic on the first broken invariant. Compiled out of release builds
    /// unless the `check-invariants` feature is on.
    fn debug_assert_invariants(&self);
    /// Report the first broken invariant without panicking.
    fn validate_invariants(&self) -> Result<(), FluxRegisterError>;
}

/// `debug_invariants!(check, "Type")` panics with the check's error, tagged
/// with `Type`, in debug builds and under `check-invariants`.
#[macro_export]
macro_rules! debug_invariants {
    ($expr:expr, $($ctx:tt)*) => {
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        if let Err(e) = $expr {
            panic!(concat!("broken invariant in ", $($ctx)*, ": {}"), e);
        }
    };
}
