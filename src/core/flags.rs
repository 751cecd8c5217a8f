//! Compiler and linker flag collections.
//!
//! Every collection has additive-unique semantics: appending a value that is
//! already present is a no-op, and first-insertion order is kept so the
//! resulting command lines are stable.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Which flag collection a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FlagKind {
    CFlags,
    CxxFlags,
    LinkFlags,
    LibPath,
    CppPath,
    Defines,
}

impl FlagKind {
    pub const ALL: [FlagKind; 6] = [
        FlagKind::CFlags,
        FlagKind::CxxFlags,
        FlagKind::LinkFlags,
        FlagKind::LibPath,
        FlagKind::CppPath,
        FlagKind::Defines,
    ];

    /// Conventional environment-style name of the collection.
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagKind::CFlags => "CFLAGS",
            FlagKind::CxxFlags => "CXXFLAGS",
            FlagKind::LinkFlags => "LINKFLAGS",
            FlagKind::LibPath => "LIBPATH",
            FlagKind::CppPath => "CPPPATH",
            FlagKind::Defines => "DEFINES",
        }
    }

    /// Whether the collection is consumed by the compiler (vs. the linker).
    pub fn is_compile(&self) -> bool {
        matches!(
            self,
            FlagKind::CFlags | FlagKind::CxxFlags | FlagKind::CppPath | FlagKind::Defines
        )
    }
}

impl fmt::Display for FlagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered list without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct UniqueList(Vec<String>);

impl UniqueList {
    pub fn new() -> Self {
        UniqueList(Vec::new())
    }

    /// Append a value unless it is already present. Returns whether it was added.
    pub fn push(&mut self, value: impl Into<String>) -> bool {
        let value = value.into();
        if self.0.contains(&value) {
            return false;
        }
        self.0.push(value);
        true
    }

    /// Remove a value. Returns whether it was present.
    pub fn remove(&mut self, value: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|v| v != value);
        self.0.len() != before
    }

    pub fn contains(&self, value: &str) -> bool {
        self.0.iter().any(|v| v == value)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Flag collections for one build configuration.
///
/// Built during toolchain configuration, then shared read-only with every
/// pipeline. Mutating methods take `&mut self`, so a `FlagSet` behind an
/// `Arc` cannot change once handed out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlagSet {
    lists: BTreeMap<FlagKind, UniqueList>,
}

impl FlagSet {
    pub fn new() -> Self {
        FlagSet::default()
    }

    /// Append one value to a collection (no-op if present).
    pub fn append_unique(&mut self, kind: FlagKind, value: impl Into<String>) -> bool {
        self.lists.entry(kind).or_default().push(value)
    }

    /// Split `flags` on whitespace and append each token to every listed kind.
    pub fn append_split(&mut self, kinds: &[FlagKind], flags: &str) {
        for token in flags.split_whitespace() {
            for &kind in kinds {
                self.append_unique(kind, token);
            }
        }
    }

    /// Append every value from an iterator to one collection.
    pub fn extend<I, S>(&mut self, kind: FlagKind, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for value in values {
            self.append_unique(kind, value);
        }
    }

    /// Remove a value from a collection. Returns whether it was present.
    pub fn remove(&mut self, kind: FlagKind, value: &str) -> bool {
        self.lists
            .get_mut(&kind)
            .map(|list| list.remove(value))
            .unwrap_or(false)
    }

    /// Values of one collection, in insertion order.
    pub fn get(&self, kind: FlagKind) -> &[String] {
        self.lists
            .get(&kind)
            .map(UniqueList::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, kind: FlagKind, value: &str) -> bool {
        self.lists
            .get(&kind)
            .map(|list| list.contains(value))
            .unwrap_or(false)
    }

    /// Iterate the non-empty collections in `FlagKind` order.
    pub fn iter(&self) -> impl Iterator<Item = (FlagKind, &[String])> {
        self.lists
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(kind, list)| (*kind, list.as_slice()))
    }

    /// Whether every collection is empty.
    pub fn is_empty(&self) -> bool {
        self.lists.values().all(UniqueList::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_unique_is_noop_for_existing() {
        let mut flags = FlagSet::new();
        assert!(flags.append_unique(FlagKind::CFlags, "-fPIC"));
        let snapshot = flags.clone();

        assert!(!flags.append_unique(FlagKind::CFlags, "-fPIC"));
        assert_eq!(flags, snapshot);
        assert_eq!(flags.get(FlagKind::CFlags), &["-fPIC".to_string()]);
    }

    #[test]
    fn test_append_split_targets_each_kind() {
        let mut flags = FlagSet::new();
        flags.append_split(&[FlagKind::CFlags, FlagKind::CxxFlags], "-O2  -g\t-O2");

        assert_eq!(flags.get(FlagKind::CFlags), &["-O2", "-g"]);
        assert_eq!(flags.get(FlagKind::CxxFlags), &["-O2", "-g"]);
        assert!(flags.get(FlagKind::LinkFlags).is_empty());
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let mut flags = FlagSet::new();
        flags.extend(FlagKind::LinkFlags, ["-b", "-a", "-c", "-a"]);
        assert_eq!(flags.get(FlagKind::LinkFlags), &["-b", "-a", "-c"]);
    }

    #[test]
    fn test_remove() {
        let mut flags = FlagSet::new();
        flags.append_unique(FlagKind::LinkFlags, "-Wl,--enable-auto-import");
        assert!(flags.remove(FlagKind::LinkFlags, "-Wl,--enable-auto-import"));
        assert!(!flags.remove(FlagKind::LinkFlags, "-Wl,--enable-auto-import"));
        assert!(!flags.remove(FlagKind::Defines, "NOPE"));
        assert!(flags.is_empty());
    }

    #[test]
    fn test_iter_skips_empty() {
        let mut flags = FlagSet::new();
        flags.append_unique(FlagKind::Defines, "NDEBUG");
        flags.append_unique(FlagKind::CFlags, "-Wall");
        flags.remove(FlagKind::CFlags, "-Wall");

        let kinds: Vec<_> = flags.iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, vec![FlagKind::Defines]);
    }
}
