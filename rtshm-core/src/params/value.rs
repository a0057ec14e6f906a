//! Typed parameter values.

use super::node::{ValueNode, value};
use super::tree::ParamTree;
use crate::error::{Result, RtshmError};
use crate::types::{ArenaOffset, RelPtr};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// Kind tag stored in a value node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum ValueKind {
    /// Never written; reads as the zero value of any kind.
    Unset = 0,
    /// Boolean.
    Bool = 1,
    /// Signed integer.
    Int = 2,
    /// Double-precision float.
    Double = 3,
    /// UTF-8 string in a separate allocation.
    String = 4,
}

impl ValueKind {
    /// Decode a stored tag.
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::Unset),
            1 => Some(Self::Bool),
            2 => Some(Self::Int),
            3 => Some(Self::Double),
            4 => Some(Self::String),
            _ => None,
        }
    }

    /// Tag stored in the value node.
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Lowercase kind name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Double => "double",
            Self::String => "string",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for bool {}
    impl Sealed for i64 {}
    impl Sealed for f64 {}
}

/// Value types stored inline in the node payload.
pub trait Scalar: sealed::Sealed + Copy + Default {
    /// Kind claimed by the first write.
    const KIND: ValueKind;

    /// Encode into the 64-bit payload word.
    fn encode(self) -> u64;

    /// Decode from the 64-bit payload word.
    fn decode(raw: u64) -> Self;
}

impl Scalar for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn encode(self) -> u64 {
        u64::from(self)
    }

    fn decode(raw: u64) -> Self {
        raw != 0
    }
}

impl Scalar for i64 {
    const KIND: ValueKind = ValueKind::Int;

    fn encode(self) -> u64 {
        self as u64
    }

    fn decode(raw: u64) -> Self {
        raw as i64
    }
}

impl Scalar for f64 {
    const KIND: ValueKind = ValueKind::Double;

    fn encode(self) -> u64 {
        self.to_bits()
    }

    fn decode(raw: u64) -> Self {
        f64::from_bits(raw)
    }
}

/// An owned copy of one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Value {
    /// Never written.
    Unset,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Double value.
    Double(f64),
    /// String value.
    String(String),
}

impl Value {
    /// Kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Unset => ValueKind::Unset,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Double(_) => ValueKind::Double,
            Self::String(_) => ValueKind::String,
        }
    }
}

/// Read the kind tag of a value node.
pub(crate) fn load_kind(tree: &ParamTree, node: ArenaOffset) -> Result<ValueKind> {
    let tag = tree.mapping()?.load_u32(node.add(value::KIND))?;
    ValueKind::from_tag(tag).ok_or_else(|| RtshmError::ArenaCorruption {
        offset: node,
        cause: format!("unknown value kind tag {}", tag),
    })
}

/// Claim `kind` for an unset node, or confirm it already holds `kind`.
pub(crate) fn claim_kind(tree: &ParamTree, node: ArenaOffset, kind: ValueKind) -> Result<()> {
    let at = node.add(value::KIND);
    match tree
        .mapping()?
        .compare_exchange_u32(at, ValueKind::Unset.tag(), kind.tag())?
    {
        Ok(_) => Ok(()),
        Err(tag) if tag == kind.tag() => Ok(()),
        Err(tag) => Err(RtshmError::TypeMismatch {
            expected: kind.name(),
            actual: ValueKind::from_tag(tag).map_or("corrupt", ValueKind::name),
        }),
    }
}

/// In-place access to a scalar value node.
///
/// Obtained from [`ParamTree::slot`]. The slot stays valid for the life of
/// the region since tree nodes are never freed.
pub struct Slot<'a, T: Scalar> {
    tree: &'a ParamTree,
    node: RelPtr<ValueNode>,
    _value: PhantomData<T>,
}

impl<'a, T: Scalar> Slot<'a, T> {
    pub(crate) fn new(tree: &'a ParamTree, node: RelPtr<ValueNode>) -> Self {
        Self {
            tree,
            node,
            _value: PhantomData,
        }
    }

    /// Offset of the value node.
    pub fn node(&self) -> RelPtr<ValueNode> {
        self.node
    }

    /// Current value; an unset node reads as `T::default()`.
    pub fn get(&self) -> Result<T> {
        let node = self.node.offset();
        match load_kind(self.tree, node)? {
            ValueKind::Unset => Ok(T::default()),
            kind if kind == T::KIND => {
                let raw = self.tree.mapping()?.load_u64(node.add(value::PAYLOAD))?;
                Ok(T::decode(raw))
            }
            kind => Err(RtshmError::TypeMismatch {
                expected: T::KIND.name(),
                actual: kind.name(),
            }),
        }
    }

    /// Store a new value, claiming the kind on first write.
    pub fn set(&self, new: T) -> Result<()> {
        let node = self.node.offset();
        claim_kind(self.tree, node, T::KIND)?;
        self.tree
            .mapping()?
            .store_u64(node.add(value::PAYLOAD), new.encode())?;
        self.tree.arena().written()
    }
}

impl<T: Scalar> std::fmt::Debug for Slot<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("kind", &T::KIND)
            .field("node", &self.node)
            .finish()
    }
}
