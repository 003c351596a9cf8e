//! YANG data type definitions and value conversion

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde_json::Value as JsonValue;

use crate::error::{RestconfError, Result};
use crate::instance_id::{InstancePath, parse_instance_identifier};
use crate::payload::{IdentityValue, RawValue};
use crate::qname::QName;
use crate::schema::{NodeId, SchemaContext};

/// Built-in YANG types, the roots of every typedef chain
#[derive(Debug, Clone, PartialEq)]
pub enum YangType {
    String,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Decimal64,
    Binary,
    Boolean,
    Empty,
    Identityref,
    /// Leafref with its target path
    Leafref(String),
    InstanceIdentifier,
    /// Bits with the declared bit names
    Bits(Vec<String>),
    /// Enumeration with name-to-value mapping in declaration order
    Enumeration(Vec<(String, i64)>),
    /// Union of member types, tried in order
    Union(Vec<TypeDefinition>),
}

impl YangType {
    /// Built-in type for a plain type name; parameterized types yield `None`
    pub fn from_name(name: &str) -> Option<Self> {
        let ty = match name {
            "string" => YangType::String,
            "int8" => YangType::Int8,
            "int16" => YangType::Int16,
            "int32" => YangType::Int32,
            "int64" => YangType::Int64,
            "uint8" => YangType::Uint8,
            "uint16" => YangType::Uint16,
            "uint32" => YangType::Uint32,
            "uint64" => YangType::Uint64,
            "decimal64" => YangType::Decimal64,
            "binary" => YangType::Binary,
            "boolean" => YangType::Boolean,
            "empty" => YangType::Empty,
            "identityref" => YangType::Identityref,
            "instance-identifier" => YangType::InstanceIdentifier,
            _ => return None,
        };
        Some(ty)
    }

    /// True for names that need extra arguments (enumeration, bits, union, leafref)
    pub fn is_parameterized(name: &str) -> bool {
        matches!(name, "enumeration" | "bits" | "union" | "leafref")
    }

    fn name(&self) -> &'static str {
        match self {
            YangType::String => "string",
            YangType::Int8 => "int8",
            YangType::Int16 => "int16",
            YangType::Int32 => "int32",
            YangType::Int64 => "int64",
            YangType::Uint8 => "uint8",
            YangType::Uint16 => "uint16",
            YangType::Uint32 => "uint32",
            YangType::Uint64 => "uint64",
            YangType::Decimal64 => "decimal64",
            YangType::Binary => "binary",
            YangType::Boolean => "boolean",
            YangType::Empty => "empty",
            YangType::Identityref => "identityref",
            YangType::Leafref(_) => "leafref",
            YangType::InstanceIdentifier => "instance-identifier",
            YangType::Bits(_) => "bits",
            YangType::Enumeration(_) => "enumeration",
            YangType::Union(_) => "union",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TypeBody {
    Builtin(YangType),
    Derived(Box<TypeDefinition>),
}

/// A type as declared on a leaf: either a built-in type or a typedef
/// deriving from another type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefinition {
    name: String,
    body: TypeBody,
}

impl TypeDefinition {
    pub fn builtin(ty: YangType) -> Self {
        Self {
            name: ty.name().to_string(),
            body: TypeBody::Builtin(ty),
        }
    }

    pub fn derived(name: impl Into<String>, base: TypeDefinition) -> Self {
        Self {
            name: name.into(),
            body: TypeBody::Derived(Box::new(base)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Immediate base type, `None` for built-in types
    pub fn base_type(&self) -> Option<&TypeDefinition> {
        match &self.body {
            TypeBody::Builtin(_) => None,
            TypeBody::Derived(base) => Some(base),
        }
    }

    /// Built-in type reached by following `base_type` links to the root
    pub fn resolved(&self) -> &YangType {
        let mut current = self;
        loop {
            match &current.body {
                TypeBody::Builtin(ty) => return ty,
                TypeBody::Derived(base) => current = base,
            }
        }
    }
}

/// Leaf value after type conversion
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Uint(u64),
    Decimal(f64),
    Boolean(bool),
    Binary(Vec<u8>),
    Empty,
    Enumeration(String),
    Bits(Vec<String>),
    Identity(QName),
    InstanceIdentifier(InstancePath),
}

impl Value {
    /// Untyped conversion used for schema-opaque (anydata) content
    pub fn from_json_scalar(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Value::Empty,
            JsonValue::Bool(b) => Value::Boolean(*b),
            JsonValue::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Value::Uint(u)
                } else if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Decimal(n.as_f64().unwrap_or_default())
                }
            }
            JsonValue::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Enumeration(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) | Value::Enumeration(s) => f.write_str(s),
            Value::Int(n) => write!(f, "{}", n),
            Value::Uint(n) => write!(f, "{}", n),
            Value::Decimal(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Binary(bytes) => f.write_str(&BASE64.encode(bytes)),
            Value::Empty => Ok(()),
            Value::Bits(bits) => f.write_str(&bits.join(" ")),
            Value::Identity(qname) => f.write_str(qname.local_name()),
            Value::InstanceIdentifier(path) => write!(f, "{}", path),
        }
    }
}

/// Converts raw payload scalars into typed values.
///
/// Identity references and instance identifiers are resolved against the
/// schema the codec was created for, which is the mounted schema when the
/// request targets a mount point.
#[derive(Debug, Clone, Copy)]
pub struct Codec<'a> {
    schema: &'a SchemaContext,
}

impl<'a> Codec<'a> {
    pub fn new(schema: &'a SchemaContext) -> Self {
        Self { schema }
    }

    /// Convert `raw` to the built-in type at the root of `ty`
    pub fn deserialize(&self, leaf: &QName, raw: &RawValue, ty: &TypeDefinition) -> Result<Value> {
        self.convert(leaf, raw, ty.resolved(), &[])
    }

    /// `followed` holds the leafref targets already passed on the way here
    fn convert(
        &self,
        leaf: &QName,
        raw: &RawValue,
        ty: &YangType,
        followed: &[NodeId],
    ) -> Result<Value> {
        let value = match raw {
            RawValue::Identity(identity) => {
                return match ty {
                    YangType::Identityref => self.identity(leaf, identity),
                    YangType::Union(members) => self.union(leaf, raw, members, followed),
                    _ => Err(RestconfError::invalid_value(
                        leaf.local_name(),
                        format!("identity value is not valid for type {}", ty.name()),
                    )),
                };
            }
            RawValue::Scalar(value) => value,
        };

        match ty {
            YangType::String => match value {
                JsonValue::String(s) => Ok(Value::String(s.clone())),
                JsonValue::Number(n) => Ok(Value::String(n.to_string())),
                JsonValue::Bool(b) => Ok(Value::String(b.to_string())),
                _ => Err(mismatch(leaf, value, ty)),
            },

            YangType::Int8 => narrow_signed(leaf, value, i8::MIN as i64, i8::MAX as i64),
            YangType::Int16 => narrow_signed(leaf, value, i16::MIN as i64, i16::MAX as i64),
            YangType::Int32 => narrow_signed(leaf, value, i32::MIN as i64, i32::MAX as i64),
            YangType::Int64 => narrow_signed(leaf, value, i64::MIN, i64::MAX),
            YangType::Uint8 => narrow_unsigned(leaf, value, u8::MAX as u64),
            YangType::Uint16 => narrow_unsigned(leaf, value, u16::MAX as u64),
            YangType::Uint32 => narrow_unsigned(leaf, value, u32::MAX as u64),
            YangType::Uint64 => narrow_unsigned(leaf, value, u64::MAX),

            YangType::Decimal64 => value_to_f64(leaf, value).map(Value::Decimal),

            YangType::Binary => {
                let s = value.as_str().ok_or_else(|| mismatch(leaf, value, ty))?;
                BASE64
                    .decode(s)
                    .map(Value::Binary)
                    .map_err(|e| RestconfError::invalid_value(leaf.local_name(), format!("base64 decode: {}", e)))
            }

            YangType::Boolean => match value {
                JsonValue::Bool(b) => Ok(Value::Boolean(*b)),
                JsonValue::String(s) if s == "true" => Ok(Value::Boolean(true)),
                JsonValue::String(s) if s == "false" => Ok(Value::Boolean(false)),
                _ => Err(mismatch(leaf, value, ty)),
            },

            YangType::Empty => match value {
                JsonValue::Null => Ok(Value::Empty),
                JsonValue::String(s) if s.is_empty() => Ok(Value::Empty),
                JsonValue::Array(items) if matches!(items.as_slice(), [JsonValue::Null]) => {
                    Ok(Value::Empty)
                }
                _ => Err(mismatch(leaf, value, ty)),
            },

            YangType::Enumeration(members) => {
                if let Some(s) = value.as_str()
                    && members.iter().any(|(name, _)| name == s)
                {
                    return Ok(Value::Enumeration(s.to_string()));
                }
                Err(RestconfError::invalid_value(
                    leaf.local_name(),
                    format!("enumeration value not found: {}", value),
                ))
            }

            YangType::Bits(declared) => {
                let s = value.as_str().ok_or_else(|| mismatch(leaf, value, ty))?;
                let bits: Vec<String> = s.split_whitespace().map(str::to_string).collect();
                if let Some(unknown) = bits.iter().find(|b| !declared.contains(b)) {
                    return Err(RestconfError::invalid_value(
                        leaf.local_name(),
                        format!("unknown bit '{}'", unknown),
                    ));
                }
                Ok(Value::Bits(bits))
            }

            // a bare identity name is scoped to the namespace of the leaf holding it
            YangType::Identityref => {
                let s = value.as_str().ok_or_else(|| mismatch(leaf, value, ty))?;
                self.identity(leaf, &IdentityValue::new(leaf.namespace(), s))
            }

            YangType::InstanceIdentifier => {
                let s = value.as_str().ok_or_else(|| mismatch(leaf, value, ty))?;
                parse_instance_identifier(self.schema, s).map(Value::InstanceIdentifier)
            }

            YangType::Leafref(path) => {
                let target = self.schema.resolve_schema_path(path).and_then(|target| {
                    self.schema.node(target).leaf_type().map(|ty| (target, ty))
                });
                match target {
                    Some((target, _)) if followed.contains(&target) => {
                        Err(RestconfError::invalid_value(
                            leaf.local_name(),
                            format!("leafref \"{}\" refers back to itself", path),
                        ))
                    }
                    Some((target, target_ty)) => {
                        let mut followed = followed.to_vec();
                        followed.push(target);
                        self.convert(leaf, raw, target_ty.resolved(), &followed)
                    }
                    None => Ok(Value::String(lexical(value))),
                }
            }

            YangType::Union(members) => self.union(leaf, raw, members, followed),
        }
    }

    fn union(
        &self,
        leaf: &QName,
        raw: &RawValue,
        members: &[TypeDefinition],
        followed: &[NodeId],
    ) -> Result<Value> {
        for member in members {
            if let Ok(v) = self.convert(leaf, raw, member.resolved(), followed) {
                return Ok(v);
            }
        }
        Err(RestconfError::invalid_value(
            leaf.local_name(),
            "value does not match any member of the union",
        ))
    }

    /// Resolve an identity value to its qualified name.
    ///
    /// A `prefix:name` value is scoped to the module named by the prefix;
    /// otherwise the value's own namespace (a module namespace or module name) applies.
    fn identity(&self, leaf: &QName, identity: &IdentityValue) -> Result<Value> {
        let (module, local) = match identity.value.split_once(':') {
            Some((prefix, local)) => (self.schema.module_by_name(prefix), local),
            None => {
                let module = self
                    .schema
                    .module_by_namespace(&identity.namespace)
                    .or_else(|| self.schema.module_by_name(&identity.namespace));
                (module, identity.value.as_str())
            }
        };

        let module = module.ok_or_else(|| {
            RestconfError::invalid_value(
                leaf.local_name(),
                format!("no module found for identity '{}'", identity.value),
            )
        })?;

        if !module.identities().is_empty() && !module.identities().iter().any(|i| i == local) {
            return Err(RestconfError::invalid_value(
                leaf.local_name(),
                format!(
                    "identity '{}' is not defined in module '{}'",
                    local,
                    module.name()
                ),
            ));
        }

        Ok(Value::Identity(module.qname(local)))
    }
}

fn lexical(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn mismatch(leaf: &QName, value: &JsonValue, ty: &YangType) -> RestconfError {
    RestconfError::invalid_value(leaf.local_name(), format!("cannot convert {} to {}", value, ty.name()))
}

fn narrow_signed(leaf: &QName, value: &JsonValue, min: i64, max: i64) -> Result<Value> {
    let n = value_to_i64(leaf, value)?;
    if n < min || n > max {
        return Err(RestconfError::invalid_value(
            leaf.local_name(),
            format!("{} is out of range [{}, {}]", n, min, max),
        ));
    }
    Ok(Value::Int(n))
}

fn narrow_unsigned(leaf: &QName, value: &JsonValue, max: u64) -> Result<Value> {
    let n = value_to_u64(leaf, value)?;
    if n > max {
        return Err(RestconfError::invalid_value(
            leaf.local_name(),
            format!("{} is out of range [0, {}]", n, max),
        ));
    }
    Ok(Value::Uint(n))
}

fn value_to_i64(leaf: &QName, value: &JsonValue) -> Result<i64> {
    match value {
        JsonValue::Number(n) => n
            .as_i64()
            .ok_or_else(|| RestconfError::invalid_value(leaf.local_name(), format!("cannot convert {} to i64", n))),
        JsonValue::String(s) => s
            .trim()
            .parse()
            .map_err(|_| RestconfError::invalid_value(leaf.local_name(), format!("cannot parse '{}' as i64", s))),
        _ => Err(RestconfError::invalid_value(
            leaf.local_name(),
            format!("cannot convert {} to i64", value),
        )),
    }
}

fn value_to_u64(leaf: &QName, value: &JsonValue) -> Result<u64> {
    match value {
        JsonValue::Number(n) => n
            .as_u64()
            .ok_or_else(|| RestconfError::invalid_value(leaf.local_name(), format!("cannot convert {} to u64", n))),
        JsonValue::String(s) => s
            .trim()
            .parse()
            .map_err(|_| RestconfError::invalid_value(leaf.local_name(), format!("cannot parse '{}' as u64", s))),
        _ => Err(RestconfError::invalid_value(
            leaf.local_name(),
            format!("cannot convert {} to u64", value),
        )),
    }
}

fn value_to_f64(leaf: &QName, value: &JsonValue) -> Result<f64> {
    match value {
        JsonValue::Number(n) => n
            .as_f64()
            .ok_or_else(|| RestconfError::invalid_value(leaf.local_name(), format!("cannot convert {} to f64", n))),
        JsonValue::String(s) => s
            .trim()
            .parse()
            .map_err(|_| RestconfError::invalid_value(leaf.local_name(), format!("cannot parse '{}' as f64", s))),
        _ => Err(RestconfError::invalid_value(
            leaf.local_name(),
            format!("cannot convert {} to f64", value),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaContextBuilder;
    use serde_json::json;

    fn scalar(v: JsonValue) -> RawValue {
        RawValue::Scalar(v)
    }

    fn leaf(local: &str) -> QName {
        QName::new("urn:test", None, local)
    }

    fn empty_schema() -> SchemaContext {
        SchemaContextBuilder::new().build()
    }

    #[test]
    fn test_yang_type_from_name() {
        assert_eq!(YangType::from_name("string"), Some(YangType::String));
        assert_eq!(YangType::from_name("uint8"), Some(YangType::Uint8));
        assert_eq!(YangType::from_name("boolean"), Some(YangType::Boolean));
        assert_eq!(YangType::from_name("enumeration"), None);
        assert!(YangType::is_parameterized("union"));
    }

    #[test]
    fn test_resolved_walks_base_chain() {
        let percent = TypeDefinition::derived(
            "percent",
            TypeDefinition::derived("small", TypeDefinition::builtin(YangType::Uint8)),
        );
        assert_eq!(percent.name(), "percent");
        assert_eq!(percent.base_type().unwrap().name(), "small");
        assert_eq!(percent.resolved(), &YangType::Uint8);
    }

    #[test]
    fn test_cast_integer_ranges() {
        let schema = empty_schema();
        let codec = Codec::new(&schema);
        let uint8 = TypeDefinition::builtin(YangType::Uint8);

        assert_eq!(
            codec.deserialize(&leaf("mtu"), &scalar(json!(42)), &uint8).unwrap(),
            Value::Uint(42)
        );
        assert_eq!(
            codec.deserialize(&leaf("mtu"), &scalar(json!("200")), &uint8).unwrap(),
            Value::Uint(200)
        );
        assert!(codec.deserialize(&leaf("mtu"), &scalar(json!(300)), &uint8).is_err());

        let int8 = TypeDefinition::builtin(YangType::Int8);
        assert_eq!(
            codec.deserialize(&leaf("t"), &scalar(json!(-5)), &int8).unwrap(),
            Value::Int(-5)
        );
        assert!(codec.deserialize(&leaf("t"), &scalar(json!("abc")), &int8).is_err());
    }

    #[test]
    fn test_cast_boolean() {
        let schema = empty_schema();
        let codec = Codec::new(&schema);
        let ty = TypeDefinition::builtin(YangType::Boolean);
        assert_eq!(
            codec.deserialize(&leaf("enabled"), &scalar(json!("false")), &ty).unwrap(),
            Value::Boolean(false)
        );
        assert_eq!(
            codec.deserialize(&leaf("enabled"), &scalar(json!(true)), &ty).unwrap(),
            Value::Boolean(true)
        );
        assert!(codec.deserialize(&leaf("enabled"), &scalar(json!("yes")), &ty).is_err());
    }

    #[test]
    fn test_cast_enumeration_and_union() {
        let schema = empty_schema();
        let codec = Codec::new(&schema);
        let enumeration = TypeDefinition::builtin(YangType::Enumeration(vec![
            ("up".into(), 1),
            ("down".into(), 2),
        ]));
        assert_eq!(
            codec.deserialize(&leaf("oper"), &scalar(json!("up")), &enumeration).unwrap(),
            Value::Enumeration("up".into())
        );
        assert!(codec.deserialize(&leaf("oper"), &scalar(json!("sideways")), &enumeration).is_err());

        let union = TypeDefinition::builtin(YangType::Union(vec![
            TypeDefinition::builtin(YangType::Uint16),
            enumeration,
        ]));
        assert_eq!(
            codec.deserialize(&leaf("u"), &scalar(json!("down")), &union).unwrap(),
            Value::Enumeration("down".into())
        );
        assert_eq!(
            codec.deserialize(&leaf("u"), &scalar(json!(7)), &union).unwrap(),
            Value::Uint(7)
        );
    }

    #[test]
    fn test_cast_binary_and_bits() {
        let schema = empty_schema();
        let codec = Codec::new(&schema);
        let binary = TypeDefinition::builtin(YangType::Binary);
        assert_eq!(
            codec.deserialize(&leaf("b"), &scalar(json!("aGk=")), &binary).unwrap(),
            Value::Binary(b"hi".to_vec())
        );

        let bits = TypeDefinition::builtin(YangType::Bits(vec!["a".into(), "b".into()]));
        assert_eq!(
            codec.deserialize(&leaf("f"), &scalar(json!("a b")), &bits).unwrap(),
            Value::Bits(vec!["a".into(), "b".into()])
        );
        assert!(codec.deserialize(&leaf("f"), &scalar(json!("c")), &bits).is_err());
    }

    #[test]
    fn test_cast_identity() {
        let mut builder = SchemaContextBuilder::new();
        let module = builder.add_module("iana-if-type", "urn:ietf:params:xml:ns:yang:iana-if-type", None);
        builder.add_identity(module, "ethernetCsmacd");
        let schema = builder.build();
        let codec = Codec::new(&schema);
        let ty = TypeDefinition::builtin(YangType::Identityref);

        let raw = RawValue::Identity(IdentityValue::new(
            "urn:ietf:params:xml:ns:yang:iana-if-type",
            "ethernetCsmacd",
        ));
        let value = codec.deserialize(&leaf("type"), &raw, &ty).unwrap();
        assert_eq!(
            value,
            Value::Identity(QName::new(
                "urn:ietf:params:xml:ns:yang:iana-if-type",
                None,
                "ethernetCsmacd"
            ))
        );

        let prefixed = RawValue::Identity(IdentityValue::new("urn:other", "iana-if-type:ethernetCsmacd"));
        assert!(codec.deserialize(&leaf("type"), &prefixed, &ty).is_ok());

        let unknown = RawValue::Identity(IdentityValue::new(
            "urn:ietf:params:xml:ns:yang:iana-if-type",
            "tokenRing",
        ));
        assert!(codec.deserialize(&leaf("type"), &unknown, &ty).is_err());

        // bare scalar identities take the namespace of the leaf carrying them
        let scoped = QName::new("urn:ietf:params:xml:ns:yang:iana-if-type", None, "type");
        assert!(
            codec
                .deserialize(&scoped, &scalar(json!("ethernetCsmacd")), &ty)
                .is_ok()
        );
        assert!(codec.deserialize(&leaf("type"), &scalar(json!("ethernetCsmacd")), &ty).is_err());
    }

    #[test]
    fn test_leafref_cycles_are_rejected() {
        let schema: SchemaContext = r#"{
            "modules": [{
                "name": "m",
                "namespace": "urn:m",
                "data": [
                    {"kind": "leaf", "name": "own", "type": {"base": "leafref", "path": "/m:own"}},
                    {"kind": "leaf", "name": "ping", "type": {"base": "leafref", "path": "/m:pong"}},
                    {"kind": "leaf", "name": "pong", "type": {"base": "leafref", "path": "/m:ping"}},
                    {"kind": "leaf", "name": "either", "type": {"base": "union", "types": [
                        {"base": "leafref", "path": "/m:either"}
                    ]}},
                    {"kind": "leaf", "name": "ref", "type": {"base": "leafref", "path": "/m:size"}},
                    {"kind": "leaf", "name": "size", "type": "uint8"}
                ]
            }]
        }"#
        .parse()
        .unwrap();
        let codec = Codec::new(&schema);
        let raw = scalar(json!(7));
        let leaf_type = |name: &str| {
            let id = schema.resolve_schema_path(&format!("/m:{}", name)).unwrap();
            schema.node(id).leaf_type().unwrap().clone()
        };

        for name in ["own", "ping", "either"] {
            let err = codec
                .deserialize(&QName::new("urn:m", None, name), &raw, &leaf_type(name))
                .unwrap_err();
            assert!(matches!(err, RestconfError::InvalidValue { .. }), "{}: {:?}", name, err);
        }
        assert_eq!(
            codec.deserialize(&QName::new("urn:m", None, "ref"), &raw, &leaf_type("ref")).unwrap(),
            Value::Uint(7)
        );
    }
}
