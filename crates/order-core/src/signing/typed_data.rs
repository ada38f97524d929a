//! Type descriptors and EIP-712 struct hashing.
//!
//! Each signable struct is described by a static [`TypeDescriptor`]. The
//! canonical type string (`encodeType`) is derived from that table: the
//! primary type's own fields first, then every struct it references,
//! transitively, sorted by name. Implementors of [`TypedStruct`] supply the
//! 32-byte field words in descriptor order and get `hashStruct` for free.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use std::collections::BTreeMap;
use std::fmt;

/// Semantic type of a struct field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// `uintN`, N in bits.
    Uint(u16),
    /// `intN`, N in bits.
    Int(u16),
    Bool,
    Address,
    /// `bytesN`, N in bytes.
    FixedBytes(u8),
    /// Dynamic `bytes`.
    Bytes,
    /// Dynamic `string`.
    String,
    /// A nested struct, referenced by descriptor.
    Struct(&'static TypeDescriptor),
    /// Dynamic array of the element type.
    Array(&'static FieldType),
}

impl FieldType {
    /// The referenced struct, if this field (or its element type) is one.
    fn referenced_struct(&self) -> Option<&'static TypeDescriptor> {
        match self {
            FieldType::Struct(descriptor) => Some(descriptor),
            FieldType::Array(element) => element.referenced_struct(),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Uint(bits) => write!(f, "uint{}", bits),
            FieldType::Int(bits) => write!(f, "int{}", bits),
            FieldType::Bool => write!(f, "bool"),
            FieldType::Address => write!(f, "address"),
            FieldType::FixedBytes(len) => write!(f, "bytes{}", len),
            FieldType::Bytes => write!(f, "bytes"),
            FieldType::String => write!(f, "string"),
            FieldType::Struct(descriptor) => write!(f, "{}", descriptor.name),
            FieldType::Array(element) => write!(f, "{}[]", element),
        }
    }
}

/// One named field of a struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldType,
}

impl FieldDescriptor {
    pub const fn new(name: &'static str, kind: FieldType) -> Self {
        Self { name, kind }
    }
}

/// Ordered field list of a named struct type.
#[derive(Debug, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub name: &'static str,
    pub fields: &'static [FieldDescriptor],
}

impl TypeDescriptor {
    /// `Name(type1 name1,type2 name2,...)` for this struct alone.
    pub fn member_string(&self) -> String {
        let fields = self
            .fields
            .iter()
            .map(|field| format!("{} {}", field.kind, field.name))
            .collect::<Vec<_>>()
            .join(",");
        format!("{}({})", self.name, fields)
    }

    /// Every struct reachable from this one's fields, keyed (and so sorted) by name.
    pub fn referenced_types(&self) -> BTreeMap<&'static str, &'static TypeDescriptor> {
        let mut found = BTreeMap::new();
        collect_references(self, &mut found);
        found.remove(self.name);
        found
    }
}

fn collect_references(
    descriptor: &TypeDescriptor,
    found: &mut BTreeMap<&'static str, &'static TypeDescriptor>,
) {
    for field in descriptor.fields {
        if let Some(nested) = field.kind.referenced_struct() {
            if found.insert(nested.name, nested).is_none() {
                collect_references(nested, found);
            }
        }
    }
}

/// EIP-712 `encodeType`: the primary type followed by referenced types in
/// alphabetical order.
pub fn encode_type(descriptor: &TypeDescriptor) -> String {
    let mut encoded = descriptor.member_string();
    for nested in descriptor.referenced_types().values() {
        encoded.push_str(&nested.member_string());
    }
    encoded
}

/// keccak256 of [`encode_type`].
pub fn type_hash(descriptor: &TypeDescriptor) -> B256 {
    keccak256(encode_type(descriptor).as_bytes())
}

/// `keccak256(typeHash ++ words)`.
pub fn hash_struct(type_hash: B256, words: &[B256]) -> B256 {
    let mut buf = Vec::with_capacity(32 * (words.len() + 1));
    buf.extend_from_slice(type_hash.as_slice());
    for word in words {
        buf.extend_from_slice(word.as_slice());
    }
    keccak256(&buf)
}

/// A struct that can be hashed per EIP-712.
pub trait TypedStruct {
    /// Static field layout of the struct.
    fn descriptor() -> &'static TypeDescriptor;

    /// Cached type hash for [`Self::descriptor`].
    fn type_hash() -> B256;

    /// One encoded word per descriptor field, in declaration order.
    fn encode_data(&self) -> Vec<B256>;

    /// EIP-712 `hashStruct`.
    fn struct_hash(&self) -> B256 {
        let words = self.encode_data();
        debug_assert_eq!(
            words.len(),
            Self::descriptor().fields.len(),
            "{} encoded the wrong number of fields",
            Self::descriptor().name
        );
        hash_struct(Self::type_hash(), &words)
    }
}

/// Prefix of the final signing digest (`"\x19\x01"`).
pub const EIP712_PREFIX: [u8; 2] = [0x19, 0x01];

/// `keccak256("\x19\x01" ++ domainSeparator ++ structHash)`.
pub fn signing_digest(domain_separator: B256, struct_hash: B256) -> B256 {
    let mut buf = [0u8; 66];
    buf[..2].copy_from_slice(&EIP712_PREFIX);
    buf[2..34].copy_from_slice(domain_separator.as_slice());
    buf[34..].copy_from_slice(struct_hash.as_slice());
    keccak256(buf)
}

pub fn encode_uint(value: U256) -> B256 {
    B256::from(value.to_be_bytes::<32>())
}

pub fn encode_u128(value: u128) -> B256 {
    encode_uint(U256::from(value))
}

/// Sign-extended two's complement.
pub fn encode_int128(value: i128) -> B256 {
    let mut word = if value < 0 { [0xff; 32] } else { [0u8; 32] };
    word[16..].copy_from_slice(&value.to_be_bytes());
    B256::from(word)
}

pub fn encode_bool(value: bool) -> B256 {
    encode_uint(U256::from(value as u8))
}

/// Left-padded to 32 bytes.
pub fn encode_address(value: Address) -> B256 {
    B256::left_padding_from(value.as_slice())
}

/// `bytes32` is already a full word.
pub fn encode_bytes32(value: B256) -> B256 {
    value
}

/// Dynamic `bytes` and `string` are encoded as the hash of their contents.
pub fn encode_bytes(value: &[u8]) -> B256 {
    keccak256(value)
}

/// `bytes[]`: hash of the concatenated element hashes. Empty arrays hash to
/// `keccak256("")`.
pub fn encode_bytes_array(values: &[Bytes]) -> B256 {
    let mut buf = Vec::with_capacity(32 * values.len());
    for value in values {
        buf.extend_from_slice(encode_bytes(value).as_slice());
    }
    keccak256(&buf)
}
