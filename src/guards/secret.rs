//! Secret non-disclosure

use std::fmt;
use subtle::ConstantTimeEq;

/// A configured secret whose content is never observable
///
/// There is no accessor for the value and no `Display` or
/// `Serialize` impl. `Debug` reports presence only.
#[derive(Clone, Default)]
pub struct Secret {
    value: Option<Box<[u8]>>,
}

impl Secret {
    /// Wrap a configured value; `None` and `""` both mean unset
    pub fn new(value: Option<String>) -> Self {
        Self {
            value: value
                .filter(|v| !v.is_empty())
                .map(|v| v.into_bytes().into_boxed_slice()),
        }
    }

    pub fn unset() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Compare a presented credential in constant time
    ///
    /// An unset secret verifies nothing, including the empty string.
    pub fn verify(&self, candidate: &str) -> bool {
        let Some(expected) = self.value.as_deref() else {
            return false;
        };
        let provided = candidate.as_bytes();

        if expected.len() != provided.len() {
            // Burn a comparable amount of time on the length mismatch path
            let _ = expected.ct_eq(expected);
            return false;
        }

        expected.ct_eq(provided).into()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret").field("set", &self.is_set()).finish()
    }
}
