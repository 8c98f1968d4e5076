//! Named-integer options registry.
//!
//! Kept as a process-global table of `(ident, int)` pairs because it is
//! the surface external collaborators (the driver, the coverage tagger)
//! read by name. The elaborator itself does not consult this table
//! directly — see `ElabConfig` in `elab::mod`.

use crate::ident::Ident;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;

static OPTIONS: Lazy<Mutex<HashMap<Ident, i32>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Error returned by [`get_int`] when the named option was never set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownOption(pub Ident);

impl std::fmt::Display for UnknownOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid option {}", self.0)
    }
}

impl std::error::Error for UnknownOption {}

/// Set (or overwrite) a named integer option.
pub fn set_int(name: &str, value: i32) {
    OPTIONS
        .lock()
        .expect("options registry poisoned")
        .insert(Ident::new(name), value);
}

/// Read a named integer option. Unknown names are a common source of
/// silent bugs in a string-keyed registry, so this returns a `Result`
/// rather than panicking, letting the caller decide what "fatal" means.
pub fn get_int(name: &str) -> Result<i32, UnknownOption> {
    let ident = Ident::new(name);
    OPTIONS
        .lock()
        .expect("options registry poisoned")
        .get(&ident)
        .copied()
        .ok_or(UnknownOption(ident))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_value() {
        set_int("test_opt_round_trip", 42);
        assert_eq!(get_int("test_opt_round_trip").unwrap(), 42);
    }

    #[test]
    fn unknown_option_is_an_error() {
        let err = get_int("test_opt_never_set_xyz").unwrap_err();
        assert_eq!(err.0, Ident::new("test_opt_never_set_xyz"));
    }
}
