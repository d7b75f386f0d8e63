//! Property values attached to resource nodes.

use indexmap::IndexMap;
use serde_json::Value;

use super::graph::ResourceRef;
use super::provider::ResolvedResource;
use crate::error::GraphError;

/// Which computed attribute of another resource a reference reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Provider-assigned identifier.
    Id,
    /// Globally qualified identifier (ARN-like).
    Arn,
    /// Physical name.
    Name,
}

impl Attribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Id => "id",
            Attribute::Arn => "arn",
            Attribute::Name => "name",
        }
    }
}

/// A property value: either known at build time or deferred until the
/// referenced resource has been created.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    /// Literal value.
    Value(Value),
    /// An attribute of another node, optionally followed by a literal suffix
    /// (e.g. `<arn>:$LATEST`).
    Ref {
        target: ResourceRef,
        attribute: Attribute,
        suffix: Option<String>,
    },
    List(Vec<Property>),
    Map(IndexMap<String, Property>),
}

impl Property {
    pub fn reference(target: &ResourceRef, attribute: Attribute) -> Self {
        Property::Ref {
            target: target.clone(),
            attribute,
            suffix: None,
        }
    }

    /// Build a map property from key/value pairs.
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Property>,
    {
        Property::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    pub fn list<V: Into<Property>>(items: impl IntoIterator<Item = V>) -> Self {
        Property::List(items.into_iter().map(Into::into).collect())
    }

    /// Append a literal suffix to a reference. No-op on other variants.
    pub fn with_suffix(self, suffix: impl Into<String>) -> Self {
        match self {
            Property::Ref {
                target, attribute, ..
            } => Property::Ref {
                target,
                attribute,
                suffix: Some(suffix.into()),
            },
            other => other,
        }
    }

    /// Every node this value refers to.
    pub fn references(&self) -> Vec<&ResourceRef> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references<'a>(&'a self, refs: &mut Vec<&'a ResourceRef>) {
        match self {
            Property::Value(_) => {}
            Property::Ref { target, .. } => refs.push(target),
            Property::List(items) => items.iter().for_each(|item| item.collect_references(refs)),
            Property::Map(entries) => entries
                .values()
                .for_each(|value| value.collect_references(refs)),
        }
    }

    /// Render for plans: references become `${kind::name.attribute}` placeholders.
    pub fn render(&self) -> Value {
        match self {
            Property::Value(value) => value.clone(),
            Property::Ref {
                target,
                attribute,
                suffix,
            } => Value::String(format!(
                "${{{target}.{}}}{}",
                attribute.as_str(),
                suffix.as_deref().unwrap_or("")
            )),
            Property::List(items) => Value::Array(items.iter().map(Property::render).collect()),
            Property::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.render()))
                    .collect(),
            ),
        }
    }

    /// Substitute resolved attributes for every reference.
    pub fn resolve<'a, F>(&self, owner: &ResourceRef, lookup: &F) -> Result<Value, GraphError>
    where
        F: Fn(&ResourceRef) -> Option<&'a ResolvedResource>,
    {
        match self {
            Property::Value(value) => Ok(value.clone()),
            Property::Ref {
                target,
                attribute,
                suffix,
            } => {
                let resolved = lookup(target).ok_or_else(|| GraphError::UnresolvedReference {
                    resource: owner.clone(),
                    target: target.clone(),
                })?;
                let base = match attribute {
                    Attribute::Id => &resolved.id,
                    Attribute::Arn => &resolved.arn,
                    Attribute::Name => &resolved.name,
                };
                Ok(Value::String(match suffix {
                    Some(suffix) => format!("{base}{suffix}"),
                    None => base.clone(),
                }))
            }
            Property::List(items) => items
                .iter()
                .map(|item| item.resolve(owner, lookup))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Property::Map(entries) => entries
                .iter()
                .map(|(key, value)| Ok((key.clone(), value.resolve(owner, lookup)?)))
                .collect::<Result<serde_json::Map<_, _>, GraphError>>()
                .map(Value::Object),
        }
    }
}

impl From<Value> for Property {
    fn from(value: Value) -> Self {
        Property::Value(value)
    }
}

impl From<&str> for Property {
    fn from(value: &str) -> Self {
        Property::Value(Value::String(value.to_string()))
    }
}

impl From<String> for Property {
    fn from(value: String) -> Self {
        Property::Value(Value::String(value))
    }
}

impl From<&String> for Property {
    fn from(value: &String) -> Self {
        Property::Value(Value::String(value.clone()))
    }
}

impl From<bool> for Property {
    fn from(value: bool) -> Self {
        Property::Value(Value::Bool(value))
    }
}

impl From<u32> for Property {
    fn from(value: u32) -> Self {
        Property::Value(Value::from(value))
    }
}

impl From<f64> for Property {
    fn from(value: f64) -> Self {
        Property::Value(Value::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::ResourceKind;
    use serde_json::json;

    const FUNCTION: ResourceKind = ResourceKind::new("test:function");

    fn resolved(arn: &str) -> ResolvedResource {
        ResolvedResource {
            id: "fn-1".to_string(),
            arn: arn.to_string(),
            name: "processor".to_string(),
            attributes: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_resolve_reference_with_suffix() {
        let function = ResourceRef::new(FUNCTION, "processor");
        let owner = ResourceRef::new(FUNCTION, "owner");
        let target = resolved("arn:test:function:processor");

        let property = Property::map([(
            "processors",
            Property::list([
                Property::reference(&function, Attribute::Arn).with_suffix(":$LATEST")
            ]),
        )]);

        let value = property
            .resolve(&owner, &|r: &ResourceRef| (r == &function).then_some(&target))
            .unwrap();
        assert_eq!(
            value,
            json!({"processors": ["arn:test:function:processor:$LATEST"]})
        );
    }

    #[test]
    fn test_resolve_missing_reference_fails() {
        let function = ResourceRef::new(FUNCTION, "processor");
        let owner = ResourceRef::new(FUNCTION, "owner");
        let property = Property::reference(&function, Attribute::Id);

        let err = property
            .resolve(&owner, &|_: &ResourceRef| None)
            .unwrap_err();
        assert!(matches!(err, GraphError::UnresolvedReference { .. }));
    }

    #[test]
    fn test_references_are_collected_recursively() {
        let a = ResourceRef::new(FUNCTION, "a");
        let b = ResourceRef::new(FUNCTION, "b");
        let property = Property::map([
            ("first", Property::reference(&a, Attribute::Arn)),
            (
                "nested",
                Property::list([
                    Property::from("literal"),
                    Property::reference(&b, Attribute::Name),
                ]),
            ),
        ]);

        assert_eq!(property.references(), vec![&a, &b]);
    }

    #[test]
    fn test_suffix_ignored_on_literals() {
        let property = Property::from("plain").with_suffix(":x");
        assert_eq!(property.render(), json!("plain"));
    }
}
