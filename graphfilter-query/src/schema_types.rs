//! The generated filter schema: an arena of input object types.
//!
//! Types refer to each other by [`TypeId`], so recursive and mutually
//! recursive where-types need no reference counting between nodes. A whole
//! schema is shared as a [`TypeHandle`].

use indexmap::IndexMap;
use smol_str::SmolStr;
use std::collections::HashMap;
use std::fmt::{self, Write};
use std::sync::Arc;

/// A shared, immutable generated schema.
pub type TypeHandle = Arc<FilterSchema>;

/// Index of an input object in its schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(usize);

impl TypeId {
    /// Position in the arena.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Built-in scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    String,
    Int,
    Float,
    Boolean,
    Date,
    DateTime,
    Id,
    Uuid,
    Json,
}

impl ScalarType {
    /// The scalar's type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::Boolean => "Boolean",
            Self::Date => "Date",
            Self::DateTime => "DateTime",
            Self::Id => "ID",
            Self::Uuid => "UUID",
            Self::Json => "JSON",
        }
    }
}

/// The type of an input field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Scalar(ScalarType),
    Input(TypeId),
    List(Box<TypeRef>),
}

impl TypeRef {
    /// A list of `inner`.
    pub fn list(inner: TypeRef) -> Self {
        Self::List(Box::new(inner))
    }

    /// The referenced input object, looking through lists.
    pub fn input_id(&self) -> Option<TypeId> {
        match self {
            Self::Input(id) => Some(*id),
            Self::List(inner) => inner.input_id(),
            Self::Scalar(_) => None,
        }
    }
}

/// One field of an input object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputField {
    pub name: SmolStr,
    pub ty: TypeRef,
    pub description: Option<String>,
}

impl InputField {
    /// Create a field without description.
    pub fn new(name: impl Into<SmolStr>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            description: None,
        }
    }

    /// Set the description.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// An input object type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputObject {
    pub name: SmolStr,
    pub fields: IndexMap<SmolStr, InputField>,
    /// Reserved where-type whose fields are still being generated.
    /// Structurally valid, without fields.
    pub placeholder: bool,
}

impl InputObject {
    /// Create an object with no fields.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
            placeholder: false,
        }
    }

    /// Create a placeholder for a where-type, filled in once its fields exist.
    pub fn placeholder(name: impl Into<SmolStr>) -> Self {
        Self {
            placeholder: true,
            ..Self::new(name)
        }
    }

    /// Add a field.
    pub fn with_field(mut self, field: InputField) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    /// Get a field by name.
    pub fn field(&self, name: &str) -> Option<&InputField> {
        self.fields.get(name)
    }

    /// Check whether a field exists.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }
}

/// A generated schema rooted at one where-type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSchema {
    types: Vec<InputObject>,
    root: TypeId,
}

impl FilterSchema {
    /// Id of the root where-type.
    pub fn root(&self) -> TypeId {
        self.root
    }

    /// The root where-type.
    pub fn root_type(&self) -> &InputObject {
        &self.types[self.root.0]
    }

    /// Resolve an id.
    pub fn get(&self, id: TypeId) -> Option<&InputObject> {
        self.types.get(id.0)
    }

    /// Find a type by name.
    pub fn by_name(&self, name: &str) -> Option<&InputObject> {
        self.types.iter().find(|t| t.name == name)
    }

    /// All types, root first.
    pub fn types(&self) -> impl Iterator<Item = &InputObject> {
        self.types.iter()
    }

    /// Number of types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Always false: a schema holds at least its root.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Number of placeholder types.
    pub fn placeholder_count(&self) -> usize {
        self.types.iter().filter(|t| t.placeholder).count()
    }

    /// Render a field type, e.g. `[ProductWhereInput]`.
    pub fn render_type(&self, ty: &TypeRef) -> String {
        match ty {
            TypeRef::Scalar(scalar) => scalar.as_str().to_string(),
            TypeRef::Input(id) => self
                .get(*id)
                .map(|t| t.name.to_string())
                .unwrap_or_else(|| format!("#{}", id.0)),
            TypeRef::List(inner) => format!("[{}]", self.render_type(inner)),
        }
    }

    /// Render every type as SDL input definitions.
    pub fn to_sdl(&self) -> String {
        let mut out = String::new();
        for object in &self.types {
            let _ = writeln!(out, "input {} {{", object.name);
            for field in object.fields.values() {
                if let Some(description) = &field.description {
                    let _ = writeln!(out, "  \"{}\"", description.replace('"', "'"));
                }
                let _ = writeln!(out, "  {}: {}", field.name, self.render_type(&field.ty));
            }
            let _ = writeln!(out, "}}");
        }
        out
    }
}

impl fmt::Display for FilterSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sdl())
    }
}

/// Arena under construction. Named types are interned.
#[derive(Debug, Default)]
pub(crate) struct SchemaBuilder {
    types: Vec<InputObject>,
    by_name: HashMap<SmolStr, TypeId>,
}

impl SchemaBuilder {
    /// Reserve an id for a type whose fields are built later.
    pub(crate) fn reserve(&mut self, name: impl Into<SmolStr>) -> TypeId {
        let name = name.into();
        let id = TypeId(self.types.len());
        self.types.push(InputObject::placeholder(name.clone()));
        self.by_name.insert(name, id);
        id
    }

    /// Fill in a reserved type.
    pub(crate) fn finish(&mut self, id: TypeId, fields: IndexMap<SmolStr, InputField>) {
        if let Some(object) = self.types.get_mut(id.0) {
            object.fields = fields;
            object.placeholder = false;
        }
    }

    /// Add a type, or return the existing one with the same name.
    pub(crate) fn add(&mut self, object: InputObject) -> TypeId {
        if let Some(id) = self.by_name.get(&object.name) {
            return *id;
        }
        let id = TypeId(self.types.len());
        self.by_name.insert(object.name.clone(), id);
        self.types.push(object);
        id
    }

    /// Get a named type, building it on first use.
    pub(crate) fn named(&mut self, name: &str, build: impl FnOnce(&mut Self) -> InputObject) -> TypeId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        let object = build(self);
        self.add(object)
    }

    /// Freeze into a schema.
    pub(crate) fn build(self, root: TypeId) -> FilterSchema {
        FilterSchema {
            types: self.types,
            root,
        }
    }
}
