//! Holder tokens identifying a single acquisition.

use std::fmt;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

/// Value stored under the lock key while a holder owns the lock.
///
/// A fresh token is generated for every `lock()` call so that a holder whose
/// lease expired can never release the lease of whoever acquired it next.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HolderToken(String);

impl HolderToken {
    /// Generates a new token.
    ///
    /// Format: `{process_id}_{counter}_{random_128_bit_hex}`
    pub fn generate() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let counter = COUNTER.fetch_add(1, Ordering::Relaxed);

        let pid = process::id();

        let mut rng = rand::thread_rng();
        let random: u128 = rng.r#gen();

        Self(format!("{}_{}_{:032x}", pid, counter, random))
    }

    /// Returns the token as it is written to the store.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HolderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for HolderToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tokens_are_distinct() {
        let tokens: HashSet<HolderToken> = (0..10_000).map(|_| HolderToken::generate()).collect();
        assert_eq!(tokens.len(), 10_000);
    }

    #[test]
    fn test_token_format() {
        let token = HolderToken::generate();
        let parts: Vec<&str> = token.as_str().split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], process::id().to_string());
        assert_eq!(parts[2].len(), 32);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
