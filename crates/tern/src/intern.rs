//! String interning for identifiers, labels, and literal text.
//!
//! The parser stores every name and literal lexeme it keeps as a [`StrId`]
//! into a per-snapshot [`Interner`]. This keeps the AST/SIR arenas free of
//! lifetimes tied to source buffers: old sources can be dropped while a
//! merged snapshot lives on, and id comparison replaces string comparison in
//! every downstream pass.

use ahash::AHashMap;

/// Index into the interner's storage.
///
/// Uses `u32` to save space; ~4 billion unique strings is more than enough
/// for a single compilation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct StrId(u32);

impl StrId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Append-only string store with hash lookup for deduplication.
#[derive(Debug, Clone, Default)]
pub struct Interner {
    strings: Vec<Box<str>>,
    lookup: AHashMap<Box<str>, StrId>,
}

impl Interner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `text`, returning the existing id when already present.
    pub fn intern(&mut self, text: &str) -> StrId {
        if let Some(&id) = self.lookup.get(text) {
            return id;
        }
        let id = StrId(u32::try_from(self.strings.len()).expect("interner overflow"));
        let boxed: Box<str> = text.into();
        self.strings.push(boxed.clone());
        self.lookup.insert(boxed, id);
        id
    }

    /// Resolves an id back to its text.
    #[must_use]
    pub fn resolve(&self, id: StrId) -> &str {
        &self.strings[id.index()]
    }

    /// Lookup without inserting.
    #[must_use]
    pub fn get(&self, text: &str) -> Option<StrId> {
        self.lookup.get(text).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::Interner;

    #[test]
    fn interning_deduplicates() {
        let mut i = Interner::new();
        let a = i.intern("main");
        let b = i.intern("main");
        let c = i.intern("other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(i.resolve(a), "main");
        assert_eq!(i.resolve(c), "other");
    }
}
