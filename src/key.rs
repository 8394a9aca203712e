//! Keys, anchors and the argument traits that turn call inputs into key chains.
//!
//! ## Key Classes
//!
//! ```text
//!   Key::Ref(Anchor)    reclaimable: compared by allocation identity; the store
//!                       keeps only a Weak, so the entry dies with the last Arc
//!   Key::Value(Value)   durable: compared by value; bounded only by `limit`
//! ```
//!
//! Any `Arc<T>` argument is reclaimable. Primitive arguments (numbers, bools,
//! chars, strings, `()`) are durable.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use memokit::key::{Argument, Key};
//!
//! let state = Arc::new(vec![1, 2, 3]);
//! assert!(state.key().is_reclaimable());
//! assert!(!42u32.key().is_reclaimable());
//!
//! // Identity, not structure, decides equality for reclaimable keys.
//! assert_eq!(state.key(), Arc::clone(&state).key());
//! assert_ne!(state.key(), Arc::new(vec![1, 2, 3]).key());
//! assert_eq!(Key::from(7i32), 7u8.key());
//! ```

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

// ---------------------------------------------------------------------------
// Anchor
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Token;

/// Reclaimable key: a type-erased `Arc` compared by allocation address.
#[derive(Clone)]
pub struct Anchor(Arc<dyn Any + Send + Sync>);

impl Anchor {
    /// Creates a fresh token that is equal only to its own clones.
    pub fn new() -> Self {
        Self(Arc::new(Token))
    }

    /// Anchors on an existing allocation; clones of `arc` produce equal anchors.
    pub fn of<T: Send + Sync + 'static>(arc: &Arc<T>) -> Self {
        Self(Arc::clone(arc) as Arc<dyn Any + Send + Sync>)
    }

    /// Allocation address used as the identity of this anchor.
    #[inline]
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn downgrade(&self) -> WeakAnchor {
        WeakAnchor(Arc::downgrade(&self.0))
    }
}

impl Default for Anchor {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Anchor {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Anchor {}

impl Hash for Anchor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Anchor({:#x})", self.id())
    }
}

/// Non-owning half of an [`Anchor`], held by the key-chain store.
///
/// Holding the `Weak` keeps the allocation (not the value) alive, so the
/// address cannot be reused by another `Arc` while the entry exists.
#[derive(Clone)]
pub struct WeakAnchor(Weak<dyn Any + Send + Sync>);

impl WeakAnchor {
    /// `true` while at least one strong reference to the anchor remains.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    pub fn upgrade(&self) -> Option<Anchor> {
        self.0.upgrade().map(Anchor)
    }
}

impl fmt::Debug for WeakAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakAnchor")
            .field("alive", &self.is_alive())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// Durable key, compared by value.
///
/// Floats follow SameValueZero: every NaN is equal to every other NaN and
/// `-0.0` equals `0.0`. Unsigned integers that fit in `i64` are stored as
/// [`Value::Int`], so `1u64` and `1i32` are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Char(char),
    Float(u64),
    Str(Arc<str>),
}

impl Value {
    pub fn float(value: f64) -> Self {
        let normalized = if value.is_nan() {
            f64::NAN
        } else if value == 0.0 {
            0.0
        } else {
            value
        };
        Value::Float(normalized.to_bits())
    }

    pub fn unsigned(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(v) => Value::Int(v),
            Err(_) => Value::UInt(value),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => f.write_str("()"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "{v}"),
            Value::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
            Value::Str(v) => f.write_str(v),
        }
    }
}

// ---------------------------------------------------------------------------
// Key
// ---------------------------------------------------------------------------

/// One element of a key chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Ref(Anchor),
    Value(Value),
}

impl Key {
    #[inline]
    pub fn is_reclaimable(&self) -> bool {
        matches!(self, Key::Ref(_))
    }

    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Key::Value(Value::Str(s.into()))
    }

    pub fn as_anchor(&self) -> Option<&Anchor> {
        match self {
            Key::Ref(anchor) => Some(anchor),
            Key::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Key::Ref(_) => None,
            Key::Value(value) => Some(value),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Ref(anchor) => write!(f, "ref@{:#x}", anchor.id()),
            Key::Value(value) => value.fmt(f),
        }
    }
}

impl From<Anchor> for Key {
    fn from(anchor: Anchor) -> Self {
        Key::Ref(anchor)
    }
}

impl From<Value> for Key {
    fn from(value: Value) -> Self {
        Key::Value(value)
    }
}

// ---------------------------------------------------------------------------
// Argument
// ---------------------------------------------------------------------------

/// A single call input that can take part in a key chain.
pub trait Argument {
    /// Key identifying this argument.
    fn key(&self) -> Key;

    /// Content string used when this argument's position is coerced.
    ///
    /// Coercion replaces the key with `Key::string(content)`, which makes the
    /// position compare by content instead of identity. `None` means the
    /// argument has no content form and the position keeps its own key.
    /// Durable keys use their display form; reclaimable keys have none, since
    /// an allocation address is not content.
    fn canonical(&self) -> Option<String> {
        self.key().as_value().map(ToString::to_string)
    }
}

macro_rules! value_argument {
    ($($ty:ty => |$v:ident| $conv:expr),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from($v: $ty) -> Self {
                    $conv
                }
            }

            impl From<$ty> for Key {
                fn from(value: $ty) -> Self {
                    Key::Value(Value::from(value))
                }
            }

            impl Argument for $ty {
                #[inline]
                fn key(&self) -> Key {
                    Key::Value(Value::from(*self))
                }
            }
        )*
    };
}

value_argument! {
    bool => |v| Value::Bool(v),
    char => |v| Value::Char(v),
    i8 => |v| Value::Int(i64::from(v)),
    i16 => |v| Value::Int(i64::from(v)),
    i32 => |v| Value::Int(i64::from(v)),
    i64 => |v| Value::Int(v),
    isize => |v| Value::Int(v as i64),
    u8 => |v| Value::Int(i64::from(v)),
    u16 => |v| Value::Int(i64::from(v)),
    u32 => |v| Value::Int(i64::from(v)),
    u64 => |v| Value::unsigned(v),
    usize => |v| Value::unsigned(v as u64),
    f32 => |v| Value::float(f64::from(v)),
    f64 => |v| Value::float(v),
    () => |_v| Value::Unit,
}

impl Argument for str {
    fn key(&self) -> Key {
        Key::string(self)
    }

    fn canonical(&self) -> Option<String> {
        Some(self.to_owned())
    }
}

impl Argument for String {
    fn key(&self) -> Key {
        Key::string(self.as_str())
    }

    fn canonical(&self) -> Option<String> {
        Some(self.clone())
    }
}

impl<T: Send + Sync + 'static> Argument for Arc<T> {
    fn key(&self) -> Key {
        Key::Ref(Anchor::of(self))
    }

    /// Content of the shared value when it is a string, a [`Value`], a
    /// durable [`Key`] or a primitive other than `()`. Anything else has no
    /// content form and stays keyed by identity when coerced.
    fn canonical(&self) -> Option<String> {
        let shared: &dyn Any = &**self;
        if let Some(text) = shared.downcast_ref::<String>() {
            return Some(text.clone());
        }
        if let Some(value) = shared.downcast_ref::<Value>() {
            return Some(value.to_string());
        }
        if let Some(key) = shared.downcast_ref::<Key>() {
            return key.canonical();
        }
        primitive_content(shared)
    }
}

fn primitive_content(shared: &dyn Any) -> Option<String> {
    macro_rules! try_primitive {
        ($($ty:ty),*) => {
            $(
                if let Some(v) = shared.downcast_ref::<$ty>() {
                    return Some(Value::from(*v).to_string());
                }
            )*
        };
    }
    try_primitive!(bool, char, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);
    None
}

impl Argument for Anchor {
    fn key(&self) -> Key {
        Key::Ref(self.clone())
    }
}

impl Argument for Value {
    fn key(&self) -> Key {
        Key::Value(self.clone())
    }
}

impl Argument for Key {
    fn key(&self) -> Key {
        self.clone()
    }
}

impl<T: Argument + ?Sized> Argument for &T {
    fn key(&self) -> Key {
        (**self).key()
    }

    fn canonical(&self) -> Option<String> {
        (**self).canonical()
    }
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// An ordered list of call inputs: tuples, slices, arrays and vectors.
pub trait Arguments {
    fn arity(&self) -> usize;

    /// Calls `visitor` with each argument and its position, in order.
    fn visit(&self, visitor: &mut dyn FnMut(usize, &dyn Argument));
}

impl Arguments for () {
    fn arity(&self) -> usize {
        0
    }

    fn visit(&self, _visitor: &mut dyn FnMut(usize, &dyn Argument)) {}
}

macro_rules! tuple_arguments {
    ($len:expr; $($idx:tt $name:ident),+) => {
        impl<$($name: Argument),+> Arguments for ($($name,)+) {
            fn arity(&self) -> usize {
                $len
            }

            fn visit(&self, visitor: &mut dyn FnMut(usize, &dyn Argument)) {
                $( visitor($idx, &self.$idx); )+
            }
        }
    };
}

tuple_arguments!(1; 0 A);
tuple_arguments!(2; 0 A, 1 B);
tuple_arguments!(3; 0 A, 1 B, 2 C);
tuple_arguments!(4; 0 A, 1 B, 2 C, 3 D);
tuple_arguments!(5; 0 A, 1 B, 2 C, 3 D, 4 E);
tuple_arguments!(6; 0 A, 1 B, 2 C, 3 D, 4 E, 5 F);
tuple_arguments!(7; 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G);
tuple_arguments!(8; 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H);

impl<T: Argument> Arguments for [T] {
    fn arity(&self) -> usize {
        self.len()
    }

    fn visit(&self, visitor: &mut dyn FnMut(usize, &dyn Argument)) {
        for (idx, arg) in self.iter().enumerate() {
            visitor(idx, arg);
        }
    }
}

impl<T: Argument, const N: usize> Arguments for [T; N] {
    fn arity(&self) -> usize {
        N
    }

    fn visit(&self, visitor: &mut dyn FnMut(usize, &dyn Argument)) {
        self.as_slice().visit(visitor);
    }
}

impl<T: Argument> Arguments for Vec<T> {
    fn arity(&self) -> usize {
        self.len()
    }

    fn visit(&self, visitor: &mut dyn FnMut(usize, &dyn Argument)) {
        self.as_slice().visit(visitor);
    }
}

/// Appends the keys of `args` to `chain`, coercing the listed positions to
/// their content string. A coerced argument without a content form keeps its
/// own key. Returns how many appended keys are reclaimable.
pub fn extend_chain<A: Arguments + ?Sized>(args: &A, coerce: &[usize], chain: &mut Vec<Key>) -> usize {
    let mut reclaimable = 0;
    chain.reserve(args.arity());
    args.visit(&mut |idx, arg| {
        let content = if coerce.contains(&idx) { arg.canonical() } else { None };
        let key = match content {
            Some(content) => Key::string(content),
            None => arg.key(),
        };
        if key.is_reclaimable() {
            reclaimable += 1;
        }
        chain.push(key);
    });
    reclaimable
}
