// SPDX-License-Identifier: MIT OR Apache-2.0
//! Data types, values and the pluggable type-compatibility engine.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Declared data type of a connector.
///
/// Types are open-ended string tags rather than a closed enumeration, so
/// node kinds can introduce new types without touching the engine. The
/// well-known tags used by the built-in conversions are provided as
/// associated constants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataType(pub Cow<'static, str>);

impl DataType {
    /// Wildcard type, compatible with everything in either direction.
    pub const ANY: DataType = DataType(Cow::Borrowed("any"));
    /// Boolean.
    pub const BOOL: DataType = DataType(Cow::Borrowed("bool"));
    /// 32-bit signed integer.
    pub const INT: DataType = DataType(Cow::Borrowed("int"));
    /// 32-bit float.
    pub const FLOAT: DataType = DataType(Cow::Borrowed("float"));
    /// 2D float vector.
    pub const VEC2: DataType = DataType(Cow::Borrowed("vec2"));
    /// 3D float vector.
    pub const VEC3: DataType = DataType(Cow::Borrowed("vec3"));
    /// 4D float vector.
    pub const VEC4: DataType = DataType(Cow::Borrowed("vec4"));
    /// UTF-8 string.
    pub const STRING: DataType = DataType(Cow::Borrowed("string"));

    /// Create a type tag from an arbitrary name.
    pub fn named(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// Whether this is the wildcard type.
    pub fn is_any(&self) -> bool {
        *self == Self::ANY
    }

    /// The tag name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value flowing through an output connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i32),
    /// Float.
    Float(f32),
    /// 2D vector.
    Vec2([f32; 2]),
    /// 3D vector.
    Vec3([f32; 3]),
    /// 4D vector.
    Vec4([f32; 4]),
    /// String.
    Str(String),
}

impl Value {
    /// The data type of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Bool(_) => DataType::BOOL,
            Self::Int(_) => DataType::INT,
            Self::Float(_) => DataType::FLOAT,
            Self::Vec2(_) => DataType::VEC2,
            Self::Vec3(_) => DataType::VEC3,
            Self::Vec4(_) => DataType::VEC4,
            Self::Str(_) => DataType::STRING,
        }
    }
}

/// Pluggable type-compatibility and coercion engine.
///
/// Injected into [`crate::graph::Graph`]; implement this to teach the
/// engine about new value representations without modifying it.
pub trait TypeRegistry: Send + Sync {
    /// Best-effort coercion of `value` to `target`. Returns the value
    /// unchanged when it already has the target type, `None` when no
    /// conversion exists. Callers must treat `None` as "no value".
    fn convert(&self, value: &Value, target: &DataType) -> Option<Value>;

    /// Default (zero) value for a declared type, used both as the coercion
    /// fallback and as the throwaway probe for [`TypeRegistry::can_convert`].
    fn default_value(&self, ty: &DataType) -> Option<Value>;

    /// Whether a value of type `source` may flow into a slot typed `target`.
    ///
    /// True when target is assignable from source, or when a coercion of a
    /// throwaway probe value succeeds. Never errors; a failed probe simply
    /// yields false.
    fn can_convert(&self, source: &DataType, target: &DataType) -> bool {
        if source == target || source.is_any() || target.is_any() {
            return true;
        }
        match self.default_value(source) {
            Some(probe) => self.convert(&probe, target).is_some(),
            None => false,
        }
    }
}

/// Built-in conversions between the well-known [`DataType`] tags.
///
/// Scalars (bool/int/float/string) convert between each other where the
/// representation allows it; vector types only match themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct CoreConversions;

impl TypeRegistry for CoreConversions {
    fn convert(&self, value: &Value, target: &DataType) -> Option<Value> {
        if target.is_any() || value.data_type() == *target {
            return Some(value.clone());
        }
        match (value, target) {
            (Value::Bool(b), t) if *t == DataType::INT => Some(Value::Int(i32::from(*b))),
            (Value::Bool(b), t) if *t == DataType::FLOAT => {
                Some(Value::Float(if *b { 1.0 } else { 0.0 }))
            }
            (Value::Int(i), t) if *t == DataType::BOOL => Some(Value::Bool(*i != 0)),
            (Value::Int(i), t) if *t == DataType::FLOAT => Some(Value::Float(*i as f32)),
            (Value::Float(x), t) if *t == DataType::INT => Some(Value::Int(*x as i32)),
            (Value::Float(x), t) if *t == DataType::BOOL => Some(Value::Bool(*x != 0.0)),
            (Value::Str(s), t) if *t == DataType::INT => s.trim().parse().ok().map(Value::Int),
            (Value::Str(s), t) if *t == DataType::FLOAT => {
                s.trim().parse().ok().map(Value::Float)
            }
            (Value::Str(s), t) if *t == DataType::BOOL => s.trim().parse().ok().map(Value::Bool),
            (v, t) if *t == DataType::STRING => Some(Value::Str(match v {
                Value::Bool(b) => b.to_string(),
                Value::Int(i) => i.to_string(),
                Value::Float(x) => x.to_string(),
                _ => return None,
            })),
            _ => None,
        }
    }

    fn default_value(&self, ty: &DataType) -> Option<Value> {
        match ty {
            t if *t == DataType::BOOL => Some(Value::Bool(false)),
            t if *t == DataType::INT => Some(Value::Int(0)),
            t if *t == DataType::FLOAT => Some(Value::Float(0.0)),
            t if *t == DataType::VEC2 => Some(Value::Vec2([0.0; 2])),
            t if *t == DataType::VEC3 => Some(Value::Vec3([0.0; 3])),
            t if *t == DataType::VEC4 => Some(Value::Vec4([0.0; 4])),
            t if *t == DataType::STRING => Some(Value::Str(String::new())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_compatible_both_directions() {
        let types = CoreConversions;
        assert!(types.can_convert(&DataType::ANY, &DataType::FLOAT));
        assert!(types.can_convert(&DataType::FLOAT, &DataType::ANY));
        assert!(types.can_convert(&DataType::ANY, &DataType::named("mesh")));
    }

    #[test]
    fn test_scalar_conversions() {
        let types = CoreConversions;
        assert!(types.can_convert(&DataType::INT, &DataType::FLOAT));
        assert!(types.can_convert(&DataType::FLOAT, &DataType::INT));
        assert_eq!(
            types.convert(&Value::Int(3), &DataType::FLOAT),
            Some(Value::Float(3.0))
        );
        assert_eq!(
            types.convert(&Value::Str("2.5".into()), &DataType::FLOAT),
            Some(Value::Float(2.5))
        );
    }

    #[test]
    fn test_probe_failure_is_incompatible() {
        let types = CoreConversions;
        // The probe for string is "", which parses to no float.
        assert!(!types.can_convert(&DataType::STRING, &DataType::FLOAT));
        assert!(!types.can_convert(&DataType::VEC2, &DataType::VEC3));
        assert!(!types.can_convert(&DataType::named("mesh"), &DataType::FLOAT));
    }

    #[test]
    fn test_failed_conversion_yields_none() {
        let types = CoreConversions;
        assert_eq!(types.convert(&Value::Str("abc".into()), &DataType::FLOAT), None);
        assert_eq!(types.convert(&Value::Vec2([1.0, 2.0]), &DataType::VEC3), None);
    }

    #[test]
    fn test_identity_conversion() {
        let types = CoreConversions;
        let v = Value::Vec3([1.0, 2.0, 3.0]);
        assert_eq!(types.convert(&v, &DataType::VEC3), Some(v.clone()));
        assert_eq!(types.convert(&v, &DataType::ANY), Some(v));
    }
}
