// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

use std::fmt;

/// A string path within an object-store bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Strips a known suffix, returning `self` unchanged if absent.
    pub fn without_suffix(&self, suffix: &str) -> ObjectKey {
        match self.0.strip_suffix(suffix) {
            Some(stripped) => ObjectKey::new(stripped),
            None => self.clone(),
        }
    }

    pub fn with_suffix(&self, suffix: &str) -> ObjectKey {
        ObjectKey::new(format!("{}{}", self.0, suffix))
    }

    /// Strips a single known extension (e.g. `.bup`), used to derive an
    /// index name from an archive key on restore.
    pub fn without_extension(&self) -> ObjectKey {
        match self.0.rfind('.') {
            Some(idx) => ObjectKey::new(&self.0[..idx]),
            None => self.clone(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ObjectKey {
    fn from(s: String) -> Self {
        ObjectKey(s)
    }
}

impl From<&str> for ObjectKey {
    fn from(s: &str) -> Self {
        ObjectKey(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_suffix_then_without_suffix_round_trips() {
        let key = ObjectKey::new("foo/bar.file");
        let sealed = key.with_suffix(".c4gh");
        assert_eq!(sealed.as_str(), "foo/bar.file.c4gh");
        assert_eq!(sealed.without_suffix(".c4gh"), key);
    }

    #[test]
    fn without_suffix_is_a_no_op_when_the_suffix_is_absent() {
        let key = ObjectKey::new("foo/bar.file");
        assert_eq!(key.without_suffix(".c4gh"), key);
    }

    #[test]
    fn without_extension_strips_the_last_dotted_segment() {
        assert_eq!(ObjectKey::new("docs.bup").without_extension().as_str(), "docs");
        assert_eq!(ObjectKey::new("20260101-D.archive").without_extension().as_str(), "20260101-D");
    }

    #[test]
    fn without_extension_is_a_no_op_without_a_dot() {
        let key = ObjectKey::new("docs");
        assert_eq!(key.without_extension(), key);
    }

    proptest::proptest! {
        #[test]
        fn with_suffix_then_without_suffix_is_identity_for_arbitrary_keys(
            base in "[a-zA-Z0-9/_-]{0,32}",
        ) {
            let key = ObjectKey::new(base);
            let sealed = key.with_suffix(".c4gh");
            proptest::prop_assert_eq!(sealed.without_suffix(".c4gh"), key);
        }
    }
}
