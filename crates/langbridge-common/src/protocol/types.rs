//! Runtime-independent value types shared by every endpoint.
//!
//! Each endpoint translates its native types to and from these canonical
//! type-tags at the boundary; the broker only ever compares tags.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::error::{BridgeError, Result};

/// Numeric id of a connected endpoint, assigned by the broker at accept time.
pub type EndpointId = u64;

/// Token linking a Return frame to the call that requested it.
pub type CorrelationId = u32;

/// Correlation id meaning "no return expected".
pub const NO_RETURN: CorrelationId = 0;

/// Largest correlation id that fits the 5-digit frame field.
pub const MAX_CORRELATION_ID: CorrelationId = 99_999;

/// Canonical type-tag used on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TypeTag {
    Int,
    String,
    Bool,
    Float,
    Null,
    /// Wildcard parameter: accepts an argument of any tag
    Any,
    /// Return tag of a method that produces no value
    Void,
    /// Tag outside the built-in vocabulary, compared by name
    Custom(String),
}

impl TypeTag {
    pub fn as_str(&self) -> &str {
        match self {
            TypeTag::Int => "int",
            TypeTag::String => "string",
            TypeTag::Bool => "bool",
            TypeTag::Float => "float",
            TypeTag::Null => "null",
            TypeTag::Any => "any",
            TypeTag::Void => "void",
            TypeTag::Custom(name) => name,
        }
    }

    /// Whether a parameter declared with this tag accepts an argument tagged `arg`.
    pub fn accepts(&self, arg: &TypeTag) -> bool {
        *self == TypeTag::Any || self == arg
    }

    pub fn is_void(&self) -> bool {
        *self == TypeTag::Void
    }
}

impl From<String> for TypeTag {
    fn from(name: String) -> Self {
        match name.as_str() {
            "int" => TypeTag::Int,
            "string" => TypeTag::String,
            "bool" => TypeTag::Bool,
            "float" => TypeTag::Float,
            "null" => TypeTag::Null,
            "any" => TypeTag::Any,
            "void" => TypeTag::Void,
            _ => TypeTag::Custom(name),
        }
    }
}

impl From<&str> for TypeTag {
    fn from(name: &str) -> Self {
        TypeTag::from(name.to_string())
    }
}

impl From<TypeTag> for String {
    fn from(tag: TypeTag) -> Self {
        match tag {
            TypeTag::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl FromStr for TypeTag {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(TypeTag::from(s))
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A call argument: its literal text form plus its type-tag.
///
/// On the wire an argument is a single-entry object mapping the literal
/// value to its tag, e.g. `{"42":"int"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub value: String,
    pub tag: TypeTag,
}

impl Argument {
    pub fn new(value: impl Into<String>, tag: TypeTag) -> Self {
        Self {
            value: value.into(),
            tag,
        }
    }

    /// Same literal value, re-tagged as `tag`.
    pub fn retagged(&self, tag: TypeTag) -> Self {
        Self::new(self.value.clone(), tag)
    }

    /// Parses the literal value into a native type.
    pub fn parse<T: FromStr>(&self) -> Result<T> {
        self.value.parse::<T>().map_err(|_| {
            BridgeError::InvalidRequest(format!(
                "cannot read '{}' tagged {} as {}",
                self.value,
                self.tag,
                std::any::type_name::<T>()
            ))
        })
    }
}

impl From<i64> for Argument {
    fn from(value: i64) -> Self {
        Argument::new(value.to_string(), TypeTag::Int)
    }
}

impl From<i32> for Argument {
    fn from(value: i32) -> Self {
        Argument::new(value.to_string(), TypeTag::Int)
    }
}

impl From<f64> for Argument {
    fn from(value: f64) -> Self {
        Argument::new(value.to_string(), TypeTag::Float)
    }
}

impl From<bool> for Argument {
    fn from(value: bool) -> Self {
        Argument::new(value.to_string(), TypeTag::Bool)
    }
}

impl From<&str> for Argument {
    fn from(value: &str) -> Self {
        Argument::new(value, TypeTag::String)
    }
}

impl From<String> for Argument {
    fn from(value: String) -> Self {
        Argument::new(value, TypeTag::String)
    }
}

impl Serialize for Argument {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.value, &self.tag)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Argument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ArgumentVisitor;

        impl<'de> Visitor<'de> for ArgumentVisitor {
            type Value = Argument;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a single-entry object mapping a value to its type-tag")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Argument, A::Error> {
                let (value, tag) = map
                    .next_entry::<String, TypeTag>()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                if map.next_key::<de::IgnoredAny>()?.is_some() {
                    return Err(de::Error::custom("argument object has more than one entry"));
                }
                Ok(Argument { value, tag })
            }
        }

        deserializer.deserialize_map(ArgumentVisitor)
    }
}

/// A value produced by a method call, in literal text form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnValue {
    pub value: String,
    pub tag: TypeTag,
}

impl ReturnValue {
    pub fn new(value: impl Into<String>, tag: TypeTag) -> Self {
        Self {
            value: value.into(),
            tag,
        }
    }

    pub fn void() -> Self {
        Self::new("", TypeTag::Void)
    }

    pub fn is_void(&self) -> bool {
        self.tag.is_void()
    }

    pub fn parse<T: FromStr>(&self) -> Result<T> {
        self.value.parse::<T>().map_err(|_| {
            BridgeError::InvalidRequest(format!(
                "cannot read return value '{}' tagged {} as {}",
                self.value,
                self.tag,
                std::any::type_name::<T>()
            ))
        })
    }
}

macro_rules! return_value_from {
    ($($native:ty),*) => {
        $(
            impl From<$native> for ReturnValue {
                fn from(value: $native) -> Self {
                    let arg = Argument::from(value);
                    ReturnValue::new(arg.value, arg.tag)
                }
            }
        )*
    };
}

return_value_from!(i64, i32, f64, bool, &str, String);

/// Parameter list of one registered constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstructorSignature {
    pub parameters: Vec<TypeTag>,
}

impl ConstructorSignature {
    pub fn new(parameters: impl IntoIterator<Item = TypeTag>) -> Self {
        Self {
            parameters: parameters.into_iter().collect(),
        }
    }
}

/// One registered method overload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSignature {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<TypeTag>,
    #[serde(rename = "return")]
    pub return_type: TypeTag,
}

impl MethodSignature {
    pub fn new(
        name: impl Into<String>,
        parameters: impl IntoIterator<Item = TypeTag>,
        return_type: TypeTag,
    ) -> Self {
        Self {
            name: name.into(),
            parameters: parameters.into_iter().collect(),
            return_type,
        }
    }
}

/// Registration descriptor for one class.
///
/// # Example
///
/// ```
/// use langbridge_common::protocol::{ClassDescriptor, TypeTag};
///
/// let counter = ClassDescriptor::new("Counter")
///     .with_constructor([])
///     .with_constructor([TypeTag::Int])
///     .with_method("increment", [TypeTag::Int], TypeTag::Void)
///     .with_method("get", [], TypeTag::Int);
///
/// assert_eq!(counter.constructors.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDescriptor {
    pub name: String,
    #[serde(default)]
    pub constructors: Vec<ConstructorSignature>,
    #[serde(default)]
    pub methods: Vec<MethodSignature>,
}

impl ClassDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constructors: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn with_constructor(mut self, parameters: impl IntoIterator<Item = TypeTag>) -> Self {
        self.constructors.push(ConstructorSignature::new(parameters));
        self
    }

    pub fn with_method(
        mut self,
        name: impl Into<String>,
        parameters: impl IntoIterator<Item = TypeTag>,
        return_type: TypeTag,
    ) -> Self {
        self.methods
            .push(MethodSignature::new(name, parameters, return_type));
        self
    }

    /// Overloads named `name`, in registration order.
    pub fn overloads<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodSignature> + 'a {
        self.methods.iter().filter(move |m| m.name == name)
    }
}
