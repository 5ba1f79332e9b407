//! The interned type graph.
//!
//! Types are hash-consed: structurally equal descriptors share one
//! [`TypeId`], so equality downstream is an id comparison. Builtins occupy
//! reserved low ids assigned at pool construction.

use ahash::AHashMap;

use crate::intern::{Interner, StrId};

/// Opaque interned type handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TypeId(u32);

impl TypeId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Builtin scalar types.
///
/// `InferInteger` is internal: the `{integer}` pseudo-type carried by an
/// unsuffixed integer literal until context fixes a concrete type. Users
/// cannot spell it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Null,
    Unit,
    Never,
    Bool,
    Char,
    Text,
    I8,
    I16,
    I32,
    I64,
    I128,
    U8,
    U16,
    U32,
    U64,
    U128,
    ISize,
    USize,
    F32,
    F64,
    F128,
    InferInteger,
}

impl Builtin {
    /// All builtins in reserved-id order.
    pub const ALL: [Self; 22] = [
        Self::Null,
        Self::Unit,
        Self::Never,
        Self::Bool,
        Self::Char,
        Self::Text,
        Self::I8,
        Self::I16,
        Self::I32,
        Self::I64,
        Self::I128,
        Self::U8,
        Self::U16,
        Self::U32,
        Self::U64,
        Self::U128,
        Self::ISize,
        Self::USize,
        Self::F32,
        Self::F64,
        Self::F128,
        Self::InferInteger,
    ];

    /// Resolves a user-spellable builtin type name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "unit" => Self::Unit,
            "never" => Self::Never,
            "bool" => Self::Bool,
            "char" => Self::Char,
            "text" => Self::Text,
            "i8" => Self::I8,
            "i16" => Self::I16,
            "i32" => Self::I32,
            "i64" => Self::I64,
            "i128" => Self::I128,
            "u8" => Self::U8,
            "u16" => Self::U16,
            "u32" => Self::U32,
            "u64" => Self::U64,
            "u128" => Self::U128,
            "isize" => Self::ISize,
            "usize" => Self::USize,
            "f32" => Self::F32,
            "f64" => Self::F64,
            "f128" => Self::F128,
            _ => return None,
        })
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Unit => "unit",
            Self::Never => "never",
            Self::Bool => "bool",
            Self::Char => "char",
            Self::Text => "text",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::I128 => "i128",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::U128 => "u128",
            Self::ISize => "isize",
            Self::USize => "usize",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::F128 => "f128",
            Self::InferInteger => "{integer}",
        }
    }

    /// `(bits, signed)` for concrete integer types; `None` otherwise.
    /// Pointer-sized integers use the 64-bit range.
    #[must_use]
    pub fn int_bits(self) -> Option<(u32, bool)> {
        Some(match self {
            Self::I8 => (8, true),
            Self::I16 => (16, true),
            Self::I32 => (32, true),
            Self::I64 | Self::ISize => (64, true),
            Self::I128 => (128, true),
            Self::U8 => (8, false),
            Self::U16 => (16, false),
            Self::U32 => (32, false),
            Self::U64 | Self::USize => (64, false),
            Self::U128 => (128, false),
            _ => return None,
        })
    }

    #[must_use]
    pub fn is_integer(self) -> bool {
        self.int_bits().is_some() || self == Self::InferInteger
    }

    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64 | Self::F128)
    }
}

/// Canonical type descriptor stored in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// Sink for invalid types; propagates without further diagnostics.
    Error,
    Builtin(Builtin),
    /// `T?`
    Optional(TypeId),
    /// `T[]` / `T[N]`
    Array { elem: TypeId, size: Option<u32> },
    /// User path; segments live in the pool's path storage.
    NamedUser { path_begin: u32, path_count: u32 },
    /// `&T` / `&mut T`
    Borrow { elem: TypeId, is_mut: bool },
    /// `&&T`
    Escape(TypeId),
    /// `ptr T` / `ptr mut T`
    Ptr { elem: TypeId, is_mut: bool },
    /// `fn(params) -> ret`; params live in the pool's param storage.
    Fn { ret: TypeId, param_begin: u32, param_count: u32 },
}

/// Structural key used for hash-consing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TypeKey {
    Optional(TypeId),
    Array(TypeId, Option<u32>),
    NamedUser(Vec<StrId>),
    Borrow(TypeId, bool),
    Escape(TypeId),
    Ptr(TypeId, bool),
    Fn(TypeId, Vec<TypeId>),
}

/// Hash-consing store for the type graph.
#[derive(Debug, Clone)]
pub struct TypePool {
    kinds: Vec<TypeKind>,
    path_segs: Vec<StrId>,
    fn_params: Vec<TypeId>,
    dedup: AHashMap<TypeKey, TypeId>,
}

impl Default for TypePool {
    fn default() -> Self {
        Self::new()
    }
}

impl TypePool {
    /// Creates a pool with the error type and every builtin pre-interned at
    /// reserved ids.
    #[must_use]
    pub fn new() -> Self {
        let mut kinds = Vec::with_capacity(Builtin::ALL.len() + 1);
        kinds.push(TypeKind::Error);
        for b in Builtin::ALL {
            kinds.push(TypeKind::Builtin(b));
        }
        Self {
            kinds,
            path_segs: Vec::new(),
            fn_params: Vec::new(),
            dedup: AHashMap::new(),
        }
    }

    #[must_use]
    pub fn error(&self) -> TypeId {
        TypeId(0)
    }

    #[must_use]
    pub fn builtin(&self, b: Builtin) -> TypeId {
        let idx = Builtin::ALL.iter().position(|&x| x == b).expect("builtin table");
        TypeId(u32::try_from(idx + 1).expect("builtin id"))
    }

    #[must_use]
    pub fn kind(&self, id: TypeId) -> TypeKind {
        self.kinds[id.index()]
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.kinds.len()
    }

    /// Named-path segments of a `NamedUser` type.
    #[must_use]
    pub fn path_of(&self, id: TypeId) -> &[StrId] {
        match self.kind(id) {
            TypeKind::NamedUser { path_begin, path_count } => {
                &self.path_segs[path_begin as usize..(path_begin + path_count) as usize]
            }
            _ => &[],
        }
    }

    /// Parameter types of a `Fn` type.
    #[must_use]
    pub fn fn_params_of(&self, id: TypeId) -> &[TypeId] {
        match self.kind(id) {
            TypeKind::Fn { param_begin, param_count, .. } => {
                &self.fn_params[param_begin as usize..(param_begin + param_count) as usize]
            }
            _ => &[],
        }
    }

    /// Resolves a single type name: builtin first, else a one-segment user
    /// path.
    pub fn intern_ident(&mut self, name: StrId, interner: &Interner) -> TypeId {
        if let Some(b) = Builtin::from_name(interner.resolve(name)) {
            return self.builtin(b);
        }
        self.intern_path(&[name])
    }

    /// Interns a user path type (`a::b::C`).
    pub fn intern_path(&mut self, segs: &[StrId]) -> TypeId {
        let key = TypeKey::NamedUser(segs.to_vec());
        if let Some(&id) = self.dedup.get(&key) {
            return id;
        }
        let path_begin = u32::try_from(self.path_segs.len()).expect("path storage overflow");
        self.path_segs.extend_from_slice(segs);
        let kind = TypeKind::NamedUser {
            path_begin,
            path_count: u32::try_from(segs.len()).expect("path too long"),
        };
        self.push_deduped(key, kind)
    }

    pub fn make_optional(&mut self, elem: TypeId) -> TypeId {
        self.make(TypeKey::Optional(elem), TypeKind::Optional(elem))
    }

    pub fn make_array(&mut self, elem: TypeId, size: Option<u32>) -> TypeId {
        self.make(TypeKey::Array(elem, size), TypeKind::Array { elem, size })
    }

    pub fn make_borrow(&mut self, elem: TypeId, is_mut: bool) -> TypeId {
        self.make(TypeKey::Borrow(elem, is_mut), TypeKind::Borrow { elem, is_mut })
    }

    pub fn make_escape(&mut self, elem: TypeId) -> TypeId {
        self.make(TypeKey::Escape(elem), TypeKind::Escape(elem))
    }

    pub fn make_ptr(&mut self, elem: TypeId, is_mut: bool) -> TypeId {
        self.make(TypeKey::Ptr(elem, is_mut), TypeKind::Ptr { elem, is_mut })
    }

    pub fn make_fn(&mut self, ret: TypeId, params: &[TypeId]) -> TypeId {
        let key = TypeKey::Fn(ret, params.to_vec());
        if let Some(&id) = self.dedup.get(&key) {
            return id;
        }
        let param_begin = u32::try_from(self.fn_params.len()).expect("fn param storage overflow");
        self.fn_params.extend_from_slice(params);
        let kind = TypeKind::Fn {
            ret,
            param_begin,
            param_count: u32::try_from(params.len()).expect("too many params"),
        };
        self.push_deduped(key, kind)
    }

    fn make(&mut self, key: TypeKey, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.dedup.get(&key) {
            return id;
        }
        self.push_deduped(key, kind)
    }

    fn push_deduped(&mut self, key: TypeKey, kind: TypeKind) -> TypeId {
        let id = TypeId(u32::try_from(self.kinds.len()).expect("type pool overflow"));
        self.kinds.push(kind);
        self.dedup.insert(key, id);
        id
    }

    /// Renders a type for diagnostics.
    #[must_use]
    pub fn to_string(&self, id: TypeId, interner: &Interner) -> String {
        match self.kind(id) {
            TypeKind::Error => "<error>".to_owned(),
            TypeKind::Builtin(b) => b.name().to_owned(),
            TypeKind::Optional(elem) => format!("{}?", self.to_string(elem, interner)),
            TypeKind::Array { elem, size: None } => format!("{}[]", self.to_string(elem, interner)),
            TypeKind::Array { elem, size: Some(n) } => {
                format!("{}[{n}]", self.to_string(elem, interner))
            }
            TypeKind::NamedUser { .. } => {
                let segs: Vec<&str> = self.path_of(id).iter().map(|&s| interner.resolve(s)).collect();
                segs.join("::")
            }
            TypeKind::Borrow { elem, is_mut } => {
                let prefix = if is_mut { "&mut " } else { "&" };
                format!("{prefix}{}", self.to_string(elem, interner))
            }
            TypeKind::Escape(elem) => format!("&&{}", self.to_string(elem, interner)),
            TypeKind::Ptr { elem, is_mut } => {
                let prefix = if is_mut { "ptr mut " } else { "ptr " };
                format!("{prefix}{}", self.to_string(elem, interner))
            }
            TypeKind::Fn { ret, .. } => {
                let params: Vec<String> =
                    self.fn_params_of(id).iter().map(|&p| self.to_string(p, interner)).collect();
                format!("fn({}) -> {}", params.join(", "), self.to_string(ret, interner))
            }
        }
    }

    // ---- shape queries used across the checker and analyses ----

    #[must_use]
    pub fn is_error(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Error)
    }

    #[must_use]
    pub fn is_builtin(&self, id: TypeId, b: Builtin) -> bool {
        self.kind(id) == TypeKind::Builtin(b)
    }

    #[must_use]
    pub fn as_builtin(&self, id: TypeId) -> Option<Builtin> {
        match self.kind(id) {
            TypeKind::Builtin(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn optional_elem(&self, id: TypeId) -> Option<TypeId> {
        match self.kind(id) {
            TypeKind::Optional(elem) => Some(elem),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_mut_borrow(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Borrow { is_mut: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::{Builtin, TypeKind, TypePool};
    use crate::intern::Interner;

    #[test]
    fn builtins_have_reserved_ids() {
        let pool = TypePool::new();
        assert!(pool.is_error(pool.error()));
        assert_eq!(pool.kind(pool.builtin(Builtin::I32)), TypeKind::Builtin(Builtin::I32));
        // the same pool layout every time
        let other = TypePool::new();
        assert_eq!(pool.builtin(Builtin::Text), other.builtin(Builtin::Text));
    }

    #[test]
    fn structural_equality_shares_ids() {
        let mut pool = TypePool::new();
        let i32_ty = pool.builtin(Builtin::I32);
        let a = pool.make_optional(i32_ty);
        let b = pool.make_optional(i32_ty);
        assert_eq!(a, b);

        let arr_a = pool.make_array(i32_ty, Some(3));
        let arr_b = pool.make_array(i32_ty, Some(3));
        let arr_c = pool.make_array(i32_ty, Some(4));
        assert_eq!(arr_a, arr_b);
        assert_ne!(arr_a, arr_c);

        let f_a = pool.make_fn(i32_ty, &[i32_ty, i32_ty]);
        let f_b = pool.make_fn(i32_ty, &[i32_ty, i32_ty]);
        assert_eq!(f_a, f_b);
    }

    #[test]
    fn ident_interning_prefers_builtins() {
        let mut pool = TypePool::new();
        let mut interner = Interner::new();
        let name = interner.intern("i32");
        let user = interner.intern("Vec3");
        assert_eq!(pool.intern_ident(name, &interner), pool.builtin(Builtin::I32));
        let a = pool.intern_ident(user, &interner);
        let b = pool.intern_ident(user, &interner);
        assert_eq!(a, b);
        assert_eq!(pool.to_string(a, &interner), "Vec3");
    }

    #[test]
    fn rendering_follows_suffix_before_prefix() {
        let mut pool = TypePool::new();
        let interner = Interner::new();
        let i32_ty = pool.builtin(Builtin::I32);
        let opt = pool.make_optional(i32_ty);
        let esc = pool.make_escape(opt);
        assert_eq!(pool.to_string(esc, &interner), "&&i32?");
        let b = pool.make_borrow(i32_ty, true);
        assert_eq!(pool.to_string(b, &interner), "&mut i32");
    }
}
