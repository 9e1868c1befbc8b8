//! Opaque wrapper for disclosed confidential values

use core::fmt;

/// Value disclosed to one authorized requester.
///
/// How values stay hidden at rest is the host's concern; contracts only
/// decide who may receive one. The wrapper keeps a disclosed value out of
/// logs and debug output until the recipient explicitly reveals it.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Confidential<T>(T);

impl<T> Confidential<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Plaintext for the recipient
    pub fn reveal(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Confidential<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Confidential(<sealed>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let secret = Confidential::new(42u128);
        assert_eq!(format!("{:?}", secret), "Confidential(<sealed>)");
        assert_eq!(secret.reveal(), 42);
    }
}
