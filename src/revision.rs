use std::fmt;

/// A commit hash as reported by git.
///
/// Only full or abbreviated lowercase-hex object names are
/// accepted; anything else (empty output, `HEAD`, error text)
/// yields `None` from [`Revision::parse`], so an unknown
/// revision is always an absent value rather than a sentinel.
///
/// ```
/// use pizzaria_deploy::Revision;
///
/// let rev = Revision::parse("3f2c9a1e8b7d6c5f4a3b2c1d0e9f8a7b6c5d4e3f\n").unwrap();
/// assert_eq!(rev.short(), "3f2c9a1");
/// assert!(Revision::parse("fatal: not a git repository").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision(String);

impl Revision {
    const MIN_LEN: usize = 7;
    // sha256 object names
    const MAX_LEN: usize = 64;

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let hash = raw.trim().to_ascii_lowercase();
        let valid = (Self::MIN_LEN..=Self::MAX_LEN).contains(&hash.len())
            && hash.bytes().all(|b| b.is_ascii_hexdigit());
        valid.then_some(Self(hash))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..Self::MIN_LEN]
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_hashes_compare_equal() {
        let a = Revision::parse("ABCDEF1234567").unwrap();
        let b = Revision::parse("abcdef1234567").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_short_and_non_hex() {
        assert!(Revision::parse("abc12").is_none());
        assert!(Revision::parse("").is_none());
        assert!(Revision::parse("zzzzzzzzz").is_none());
        assert!(Revision::parse("unknown").is_none());
    }
}
