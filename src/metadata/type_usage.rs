use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::PrimitiveTypeKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaxLength {
    Bounded(u32),
    Unbounded,
}

/// Facets refining a type. Absent facets take the store defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Facets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unicode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_length: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<MaxLength>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,
    /// Explicit store type (`xml`, `ntext`, `rowversion`...) overriding the mapped one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_type_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdmProperty {
    pub name: String,
    pub type_usage: TypeUsage,
}

impl EdmProperty {
    pub fn new(name: &str, type_usage: TypeUsage) -> Self {
        Self { name: name.to_string(), type_usage }
    }
}

/// Row or entity shape: ordered properties, plus key members for entities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructuralType {
    pub name: String,
    pub properties: Vec<EdmProperty>,
    #[serde(default)]
    pub key_members: Vec<String>,
}

impl StructuralType {
    pub fn property(&self, name: &str) -> Option<&EdmProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &EdmProperty> {
        self.key_members.iter().filter_map(|k| self.property(k))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdmType {
    Primitive(PrimitiveTypeKind),
    Row(StructuralType),
    Entity(StructuralType),
    Collection(Box<TypeUsage>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeUsage {
    pub edm_type: EdmType,
    #[serde(default)]
    pub facets: Facets,
}

impl TypeUsage {
    pub fn primitive(kind: PrimitiveTypeKind) -> Self {
        Self { edm_type: EdmType::Primitive(kind), facets: Facets::default() }
    }

    pub fn boolean() -> Self {
        Self::primitive(PrimitiveTypeKind::Boolean)
    }

    pub fn int32() -> Self {
        Self::primitive(PrimitiveTypeKind::Int32)
    }

    pub fn int64() -> Self {
        Self::primitive(PrimitiveTypeKind::Int64)
    }

    /// A string type; `None` leaves the unicode facet unspecified.
    pub fn string(unicode: Option<bool>) -> Self {
        let mut ty = Self::primitive(PrimitiveTypeKind::String);
        ty.facets.unicode = unicode;
        ty
    }

    pub fn row(properties: Vec<EdmProperty>) -> Self {
        Self {
            edm_type: EdmType::Row(StructuralType { name: String::new(), properties, key_members: vec![] }),
            facets: Facets::default(),
        }
    }

    pub fn entity(name: &str, properties: Vec<EdmProperty>, key_members: &[&str]) -> Self {
        Self {
            edm_type: EdmType::Entity(StructuralType {
                name: name.to_string(),
                properties,
                key_members: key_members.iter().map(|k| k.to_string()).collect(),
            }),
            facets: Facets::default(),
        }
    }

    pub fn collection(element: TypeUsage) -> Self {
        Self { edm_type: EdmType::Collection(Box::new(element)), facets: Facets::default() }
    }

    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.facets.max_length = Some(MaxLength::Bounded(max_length));
        self
    }

    pub fn unbounded(mut self) -> Self {
        self.facets.max_length = Some(MaxLength::Unbounded);
        self
    }

    pub fn fixed_length(mut self) -> Self {
        self.facets.fixed_length = Some(true);
        self
    }

    pub fn with_precision(mut self, precision: u8, scale: u8) -> Self {
        self.facets.precision = Some(precision);
        self.facets.scale = Some(scale);
        self
    }

    pub fn with_collation(mut self, collation: &str) -> Self {
        self.facets.collation = Some(collation.to_string());
        self
    }

    pub fn with_store_type(mut self, store_type_name: &str) -> Self {
        self.facets.store_type_name = Some(store_type_name.to_string());
        self
    }

    pub fn primitive_kind(&self) -> Option<PrimitiveTypeKind> {
        match &self.edm_type {
            EdmType::Primitive(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.edm_type, EdmType::Primitive(_))
    }

    pub fn is_primitive_kind(&self, kind: PrimitiveTypeKind) -> bool {
        self.primitive_kind() == Some(kind)
    }

    pub fn is_spatial(&self) -> bool {
        self.primitive_kind().is_some_and(PrimitiveTypeKind::is_spatial)
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.edm_type, EdmType::Collection(_))
    }

    pub fn is_row(&self) -> bool {
        matches!(self.edm_type, EdmType::Row(_))
    }

    pub fn structural(&self) -> Option<&StructuralType> {
        match &self.edm_type {
            EdmType::Row(st) | EdmType::Entity(st) => Some(st),
            _ => None,
        }
    }

    /// Element type of a collection.
    pub fn element_type(&self) -> Option<&TypeUsage> {
        match &self.edm_type {
            EdmType::Collection(element) => Some(element),
            _ => None,
        }
    }

    /// Properties of a row or entity type, empty for anything else.
    pub fn properties(&self) -> &[EdmProperty] {
        self.structural().map(|st| st.properties.as_slice()).unwrap_or(&[])
    }

    pub fn property(&self, name: &str) -> Option<&EdmProperty> {
        self.structural().and_then(|st| st.property(name))
    }

    /// Same type ignoring facets.
    pub fn same_edm_type(&self, other: &TypeUsage) -> bool {
        self.edm_type == other.edm_type
    }
}

impl Display for TypeUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.edm_type {
            EdmType::Primitive(kind) => write!(f, "Edm.{kind}"),
            EdmType::Row(st) => {
                write!(f, "Row(")?;
                for (i, p) in st.properties.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", p.name, p.type_usage)?;
                }
                write!(f, ")")
            }
            EdmType::Entity(st) => write!(f, "{}", st.name),
            EdmType::Collection(element) => write!(f, "Collection({element})"),
        }
    }
}
