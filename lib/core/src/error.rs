//! Error handling foundation for loomwork.
//!
//! Only the `Result` alias lives here. Each crate owns its domain error
//! enums, and engine entry points wrap them in a rootcause [`Report`] so
//! callers can attach context while the typed error stays reachable through
//! `current_context()`.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug, PartialEq)]
    struct Missing {
        name: &'static str,
    }

    impl fmt::Display for Missing {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "missing {}", self.name)
        }
    }

    impl std::error::Error for Missing {}

    fn lookup(found: bool) -> Result<u8, Missing> {
        if found {
            Ok(1)
        } else {
            Err(Missing { name: "question" }.into())
        }
    }

    #[test]
    fn typed_context_survives_the_report() {
        assert_eq!(lookup(true).expect("found"), 1);
        let report = lookup(false).unwrap_err();
        assert_eq!(report.current_context(), &Missing { name: "question" });
    }
}
