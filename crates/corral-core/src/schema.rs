//! Per-particle field schema, typed field handles, and column storage.
//!
//! A [`Schema`] is an ordered list of [`FieldDef`]s fixed at container
//! construction. Field 0 is always the reserved `pid` field (`u64 × 1`),
//! so particle identity travels through every copy path exactly like any
//! other attribute. Callers resolve a typed [`Field`] handle once by name
//! and use it for all subsequent accesses; there is no per-access lookup.

use std::fmt;
use std::marker::PhantomData;

use indexmap::IndexMap;

use crate::id::FieldKey;

/// Name of the reserved particle-id field.
pub const PID_FIELD: &str = "pid";

/// Primitive type of one field component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// 64-bit float.
    F64,
    /// 32-bit float.
    F32,
    /// 64-bit signed integer.
    I64,
    /// 32-bit signed integer.
    I32,
    /// 64-bit unsigned integer.
    U64,
    /// Boolean, encoded as one byte on the wire.
    Bool,
}

impl FieldKind {
    /// Encoded size of one component in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            Self::F64 | Self::I64 | Self::U64 => 8,
            Self::F32 | Self::I32 => 4,
            Self::Bool => 1,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::F64 => "f64",
            Self::F32 => "f32",
            Self::I64 => "i64",
            Self::I32 => "i32",
            Self::U64 => "u64",
            Self::Bool => "bool",
        };
        f.write_str(name)
    }
}

/// Definition of one per-particle field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    /// Unique name used to resolve a [`Field`] handle.
    pub name: String,
    /// Component type.
    pub kind: FieldKind,
    /// Fixed number of components per particle (1 for scalars).
    pub components: u32,
}

impl FieldDef {
    /// A single-component field.
    pub fn scalar(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            components: 1,
        }
    }

    /// A fixed-width array field.
    pub fn array(name: impl Into<String>, kind: FieldKind, components: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            components,
        }
    }

    /// Encoded size of one particle's value for this field.
    pub fn record_bytes(&self) -> usize {
        self.kind.size_bytes() * self.components as usize
    }
}

/// Errors from schema construction and handle resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemaError {
    /// Two fields share a name.
    DuplicateName {
        /// The repeated name.
        name: String,
    },
    /// A user field tried to use the reserved `pid` name.
    ReservedName,
    /// A field declared zero components.
    ZeroComponents {
        /// The offending field.
        name: String,
    },
    /// No field with this name exists.
    UnknownField {
        /// The requested name.
        name: String,
    },
    /// The field exists but holds a different component type.
    KindMismatch {
        /// The requested name.
        name: String,
        /// Kind stored in the schema.
        stored: FieldKind,
        /// Kind requested by the caller.
        requested: FieldKind,
    },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateName { name } => write!(f, "duplicate field name '{name}'"),
            Self::ReservedName => write!(f, "field name '{PID_FIELD}' is reserved"),
            Self::ZeroComponents { name } => write!(f, "field '{name}' has zero components"),
            Self::UnknownField { name } => write!(f, "unknown field '{name}'"),
            Self::KindMismatch {
                name,
                stored,
                requested,
            } => write!(
                f,
                "field '{name}' stores {stored} but {requested} was requested"
            ),
        }
    }
}

impl std::error::Error for SchemaError {}

/// Ordered, immutable description of the per-particle field tuple.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<FieldDef>,
    by_name: IndexMap<String, FieldKey>,
}

impl Schema {
    /// Build a schema from user fields. The reserved `pid` field is
    /// prepended as `FieldKey(0)`.
    pub fn new(user_fields: Vec<FieldDef>) -> Result<Self, SchemaError> {
        let mut fields = Vec::with_capacity(user_fields.len() + 1);
        fields.push(FieldDef::scalar(PID_FIELD, FieldKind::U64));
        let mut by_name = IndexMap::with_capacity(user_fields.len() + 1);
        by_name.insert(PID_FIELD.to_string(), FieldKey::PID);

        for def in user_fields {
            if def.name == PID_FIELD {
                return Err(SchemaError::ReservedName);
            }
            if def.components == 0 {
                return Err(SchemaError::ZeroComponents { name: def.name });
            }
            let key = FieldKey(fields.len() as u32);
            if by_name.insert(def.name.clone(), key).is_some() {
                return Err(SchemaError::DuplicateName { name: def.name });
            }
            fields.push(def);
        }
        Ok(Self { fields, by_name })
    }

    /// All field definitions in key order, `pid` first.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Number of fields including `pid`.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Always `false`: every schema carries `pid`.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Definition of the field at `key`.
    pub fn def(&self, key: FieldKey) -> Option<&FieldDef> {
        self.fields.get(key.index())
    }

    /// Untyped key lookup by name.
    pub fn key_of(&self, name: &str) -> Option<FieldKey> {
        self.by_name.get(name).copied()
    }

    /// Resolve a typed handle for the named field.
    pub fn field<T: FieldType>(&self, name: &str) -> Result<Field<T>, SchemaError> {
        let key = self.key_of(name).ok_or_else(|| SchemaError::UnknownField {
            name: name.to_string(),
        })?;
        let def = &self.fields[key.index()];
        if def.kind != T::KIND {
            return Err(SchemaError::KindMismatch {
                name: name.to_string(),
                stored: def.kind,
                requested: T::KIND,
            });
        }
        Ok(Field {
            key,
            components: def.components,
            _marker: PhantomData,
        })
    }

    /// Handle for the reserved particle-id field.
    pub fn pid(&self) -> Field<u64> {
        Field {
            key: FieldKey::PID,
            components: 1,
            _marker: PhantomData,
        }
    }

    /// Encoded size of one full particle tuple (pid included).
    pub fn record_bytes(&self) -> usize {
        self.fields.iter().map(FieldDef::record_bytes).sum()
    }

    /// Whether `other` describes the same field tuple.
    pub fn same_layout(&self, other: &Schema) -> bool {
        self.fields == other.fields
    }
}

/// Typed, pre-validated handle to one schema field.
#[derive(Debug)]
pub struct Field<T> {
    key: FieldKey,
    components: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Field<T> {}

impl<T> Field<T> {
    /// The untyped key.
    pub fn key(&self) -> FieldKey {
        self.key
    }

    /// Components per particle.
    pub fn components(&self) -> usize {
        self.components as usize
    }
}

/// Storage for one field across a run of slots.
///
/// Component `c` of lane `l` lives at `l * components + c`.
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    /// `f64` components.
    F64(Vec<f64>),
    /// `f32` components.
    F32(Vec<f32>),
    /// `i64` components.
    I64(Vec<i64>),
    /// `i32` components.
    I32(Vec<i32>),
    /// `u64` components.
    U64(Vec<u64>),
    /// `bool` components.
    Bool(Vec<bool>),
}

impl Column {
    /// A zero-filled column of `len` components.
    pub fn zeroed(kind: FieldKind, len: usize) -> Self {
        match kind {
            FieldKind::F64 => Self::F64(vec![0.0; len]),
            FieldKind::F32 => Self::F32(vec![0.0; len]),
            FieldKind::I64 => Self::I64(vec![0; len]),
            FieldKind::I32 => Self::I32(vec![0; len]),
            FieldKind::U64 => Self::U64(vec![0; len]),
            FieldKind::Bool => Self::Bool(vec![false; len]),
        }
    }

    /// Like [`Column::zeroed`] but reports allocation failure instead of
    /// aborting.
    pub fn try_zeroed(
        kind: FieldKind,
        len: usize,
    ) -> Result<Self, std::collections::TryReserveError> {
        fn fill<T: Clone>(len: usize, v: T) -> Result<Vec<T>, std::collections::TryReserveError> {
            let mut out = Vec::new();
            out.try_reserve_exact(len)?;
            out.resize(len, v);
            Ok(out)
        }
        Ok(match kind {
            FieldKind::F64 => Self::F64(fill(len, 0.0)?),
            FieldKind::F32 => Self::F32(fill(len, 0.0)?),
            FieldKind::I64 => Self::I64(fill(len, 0)?),
            FieldKind::I32 => Self::I32(fill(len, 0)?),
            FieldKind::U64 => Self::U64(fill(len, 0)?),
            FieldKind::Bool => Self::Bool(fill(len, false)?),
        })
    }

    /// Component type of this column.
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::F64(_) => FieldKind::F64,
            Self::F32(_) => FieldKind::F32,
            Self::I64(_) => FieldKind::I64,
            Self::I32(_) => FieldKind::I32,
            Self::U64(_) => FieldKind::U64,
            Self::Bool(_) => FieldKind::Bool,
        }
    }

    /// Number of stored components.
    pub fn len(&self) -> usize {
        match self {
            Self::F64(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::U64(v) => v.len(),
            Self::Bool(v) => v.len(),
        }
    }

    /// Whether the column stores nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grow by `lanes * components` zeroed components.
    pub fn extend_zeroed(&mut self, len: usize) {
        match self {
            Self::F64(v) => v.resize(v.len() + len, 0.0),
            Self::F32(v) => v.resize(v.len() + len, 0.0),
            Self::I64(v) => v.resize(v.len() + len, 0),
            Self::I32(v) => v.resize(v.len() + len, 0),
            Self::U64(v) => v.resize(v.len() + len, 0),
            Self::Bool(v) => v.resize(v.len() + len, false),
        }
    }

    /// Copy one lane's `components` values from `src` lane `src_lane`
    /// into lane `dst_lane`. Returns `false` on a kind mismatch.
    pub fn copy_lane(
        &mut self,
        dst_lane: usize,
        src: &Column,
        src_lane: usize,
        components: usize,
    ) -> bool {
        let d = dst_lane * components;
        let s = src_lane * components;
        match (self, src) {
            (Self::F64(a), Self::F64(b)) => a[d..d + components].copy_from_slice(&b[s..s + components]),
            (Self::F32(a), Self::F32(b)) => a[d..d + components].copy_from_slice(&b[s..s + components]),
            (Self::I64(a), Self::I64(b)) => a[d..d + components].copy_from_slice(&b[s..s + components]),
            (Self::I32(a), Self::I32(b)) => a[d..d + components].copy_from_slice(&b[s..s + components]),
            (Self::U64(a), Self::U64(b)) => a[d..d + components].copy_from_slice(&b[s..s + components]),
            (Self::Bool(a), Self::Bool(b)) => a[d..d + components].copy_from_slice(&b[s..s + components]),
            _ => return false,
        }
        true
    }

    /// Append one lane's values as little-endian bytes.
    pub fn encode_lane(&self, lane: usize, components: usize, out: &mut Vec<u8>) {
        let range = lane * components..(lane + 1) * components;
        match self {
            Self::F64(v) => v[range].iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            Self::F32(v) => v[range].iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            Self::I64(v) => v[range].iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            Self::I32(v) => v[range].iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            Self::U64(v) => v[range].iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            Self::Bool(v) => v[range].iter().for_each(|x| out.push(u8::from(*x))),
        }
    }

    /// Overwrite one lane from little-endian bytes. `bytes` must hold
    /// exactly `components * kind().size_bytes()` bytes.
    pub fn decode_lane(&mut self, lane: usize, components: usize, bytes: &[u8]) {
        let base = lane * components;
        match self {
            Self::F64(v) => decode_into(&mut v[base..base + components], bytes, f64::from_le_bytes),
            Self::F32(v) => decode_into(&mut v[base..base + components], bytes, f32::from_le_bytes),
            Self::I64(v) => decode_into(&mut v[base..base + components], bytes, i64::from_le_bytes),
            Self::I32(v) => decode_into(&mut v[base..base + components], bytes, i32::from_le_bytes),
            Self::U64(v) => decode_into(&mut v[base..base + components], bytes, u64::from_le_bytes),
            Self::Bool(v) => {
                for (dst, b) in v[base..base + components].iter_mut().zip(bytes) {
                    *dst = *b != 0;
                }
            }
        }
    }
}

fn decode_into<T, const N: usize>(dst: &mut [T], bytes: &[u8], conv: fn([u8; N]) -> T) {
    for (slot, chunk) in dst.iter_mut().zip(bytes.chunks_exact(N)) {
        let mut buf = [0u8; N];
        buf.copy_from_slice(chunk);
        *slot = conv(buf);
    }
}

/// A primitive component type that can be stored in a [`Column`].
pub trait FieldType: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// The schema kind this type maps to.
    const KIND: FieldKind;

    /// Borrow the typed components of a column of the same kind.
    fn slice(column: &Column) -> Option<&[Self]>;

    /// Mutably borrow the typed components of a column of the same kind.
    fn slice_mut(column: &mut Column) -> Option<&mut [Self]>;
}

macro_rules! impl_field_type {
    ($ty:ty, $kind:ident) => {
        impl FieldType for $ty {
            const KIND: FieldKind = FieldKind::$kind;

            fn slice(column: &Column) -> Option<&[Self]> {
                match column {
                    Column::$kind(v) => Some(v),
                    _ => None,
                }
            }

            fn slice_mut(column: &mut Column) -> Option<&mut [Self]> {
                match column {
                    Column::$kind(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_field_type!(f64, F64);
impl_field_type!(f32, F32);
impl_field_type!(i64, I64);
impl_field_type!(i32, I32);
impl_field_type!(u64, U64);
impl_field_type!(bool, Bool);
