//! Schema snapshot types for morph.
//!
//! A [`Schema`] is one materialized version of a storage model: tables,
//! columns, keys, indexes and modification procedures. Every object carries a
//! [`StableId`] assigned by whoever built the snapshot. Ids survive renames and
//! moves, so two snapshots can be compared by identity instead of by name.
//!
//! Snapshots are plain values. Nothing in here points back into another
//! snapshot, and nothing is mutated once a snapshot has been built.

use std::fmt;

mod error;
pub use error::SchemaError;

pub mod naming;

mod validate;

/// Opaque identity token that survives renames and moves across snapshots.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StableId(String);

impl StableId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StableId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for StableId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A name with an optional schema (namespace) qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub schema: Option<String>,
    pub name: String,
}

impl QualifiedName {
    pub fn new(schema: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.map(str::to_string),
            name: name.into(),
        }
    }

    /// Parse `schema.name`, splitting on the first dot. A name without a dot
    /// has no schema.
    ///
    /// ```
    /// use morph_schema::QualifiedName;
    /// let q = QualifiedName::parse("dbo.Orders");
    /// assert_eq!(q.schema.as_deref(), Some("dbo"));
    /// assert_eq!(q.name, "Orders");
    /// ```
    pub fn parse(qualified: &str) -> Self {
        match qualified.split_once('.') {
            Some((schema, name)) if !schema.is_empty() && !name.is_empty() => {
                Self::new(Some(schema), name)
            }
            _ => Self::new(None, qualified),
        }
    }

    /// Same schema, different name.
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            schema: self.schema.clone(),
            name: name.into(),
        }
    }

    /// Same name, different schema.
    pub fn with_schema(&self, schema: Option<&str>) -> Self {
        Self::new(schema, self.name.clone())
    }

    /// Whether both names denote the same slot: same schema and same name,
    /// ignoring letter case.
    pub fn same_slot(&self, other: &QualifiedName) -> bool {
        naming::same_schema(self.schema.as_deref(), other.schema.as_deref())
            && naming::same_slot(&self.name, &other.name)
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Conceptual primitive type of a column or parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Binary,
    Boolean,
    Byte,
    DateTime,
    DateTimeOffset,
    Decimal,
    Double,
    Guid,
    Single,
    SByte,
    Int16,
    Int32,
    Int64,
    String,
    Time,
    Geography,
    Geometry,
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrimitiveKind::Binary => "Binary",
            PrimitiveKind::Boolean => "Boolean",
            PrimitiveKind::Byte => "Byte",
            PrimitiveKind::DateTime => "DateTime",
            PrimitiveKind::DateTimeOffset => "DateTimeOffset",
            PrimitiveKind::Decimal => "Decimal",
            PrimitiveKind::Double => "Double",
            PrimitiveKind::Guid => "Guid",
            PrimitiveKind::Single => "Single",
            PrimitiveKind::SByte => "SByte",
            PrimitiveKind::Int16 => "Int16",
            PrimitiveKind::Int32 => "Int32",
            PrimitiveKind::Int64 => "Int64",
            PrimitiveKind::String => "String",
            PrimitiveKind::Time => "Time",
            PrimitiveKind::Geography => "Geography",
            PrimitiveKind::Geometry => "Geometry",
        };
        f.write_str(name)
    }
}

/// Type refinements of a column or parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Facets {
    /// Whether the column allows NULL
    pub nullable: bool,
    pub max_length: Option<u32>,
    pub precision: Option<u8>,
    pub scale: Option<u8>,
    /// Provider-specific store type name (e.g. `money`), when not the default
    pub store_type: Option<String>,
    /// Value generated by the store on insert
    pub is_identity: bool,
    /// Row version / concurrency token
    pub is_timestamp: bool,
    /// Value computed by the store on insert and update
    pub is_computed: bool,
    pub is_unicode: Option<bool>,
    pub is_fixed_length: Option<bool>,
}

impl Facets {
    /// Whether the store produces this value (identity, computed, or row version).
    pub fn is_store_generated(&self) -> bool {
        self.is_identity || self.is_computed || self.is_timestamp
    }
}

/// Why a column exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ColumnOrigin {
    /// Mapped from a scalar property.
    #[default]
    Property,
    /// Foreign-key column of an independent association (no scalar property).
    AssociationKey,
    /// Inheritance tag column. The literal values are informational only.
    Discriminator { values: Vec<String> },
}

/// A table column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub id: StableId,
    pub name: String,
    pub kind: PrimitiveKind,
    pub facets: Facets,
    pub origin: ColumnOrigin,
}

impl Column {
    pub fn new(id: impl Into<StableId>, name: impl Into<String>, kind: PrimitiveKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            facets: Facets::default(),
            origin: ColumnOrigin::Property,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.facets.nullable = true;
        self
    }

    pub fn max_length(mut self, max_length: u32) -> Self {
        self.facets.max_length = Some(max_length);
        self
    }

    pub fn precision(mut self, precision: u8, scale: u8) -> Self {
        self.facets.precision = Some(precision);
        self.facets.scale = Some(scale);
        self
    }

    pub fn store_type(mut self, store_type: impl Into<String>) -> Self {
        self.facets.store_type = Some(store_type.into());
        self
    }

    pub fn identity(mut self) -> Self {
        self.facets.is_identity = true;
        self
    }

    pub fn timestamp(mut self) -> Self {
        self.facets.is_timestamp = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.facets.is_computed = true;
        self
    }

    pub fn unicode(mut self, unicode: bool) -> Self {
        self.facets.is_unicode = Some(unicode);
        self
    }

    pub fn fixed_length(mut self, fixed: bool) -> Self {
        self.facets.is_fixed_length = Some(fixed);
        self
    }

    pub fn facets(mut self, facets: Facets) -> Self {
        self.facets = facets;
        self
    }

    /// Mark as the foreign-key column of an independent association.
    pub fn association_key(mut self) -> Self {
        self.origin = ColumnOrigin::AssociationKey;
        self
    }

    /// Mark as an inheritance discriminator with the given tag values.
    pub fn discriminator<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.origin = ColumnOrigin::Discriminator {
            values: values.into_iter().map(Into::into).collect(),
        };
        self
    }

    pub fn is_association_key(&self) -> bool {
        self.origin == ColumnOrigin::AssociationKey
    }
}

/// A primary key. An empty column list means the table has none.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrimaryKey {
    pub name: Option<String>,
    pub columns: Vec<StableId>,
}

/// A foreign key constraint, owned by the dependent table.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    /// Id of the association this key was derived from
    pub id: StableId,
    /// Explicit constraint name, if any
    pub name: Option<String>,
    pub principal_table: StableId,
    pub principal_columns: Vec<StableId>,
    /// Columns in the owning table
    pub dependent_columns: Vec<StableId>,
    pub cascade_delete: bool,
}

impl ForeignKey {
    pub fn new<P, D>(
        id: impl Into<StableId>,
        principal_table: impl Into<StableId>,
        principal_columns: P,
        dependent_columns: D,
    ) -> Self
    where
        P: IntoIterator,
        P::Item: Into<StableId>,
        D: IntoIterator,
        D::Item: Into<StableId>,
    {
        Self {
            id: id.into(),
            name: None,
            principal_table: principal_table.into(),
            principal_columns: principal_columns.into_iter().map(Into::into).collect(),
            dependent_columns: dependent_columns.into_iter().map(Into::into).collect(),
            cascade_delete: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn cascade(mut self) -> Self {
        self.cascade_delete = true;
        self
    }
}

/// A table index.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub name: Option<String>,
    pub columns: Vec<StableId>,
    pub unique: bool,
}

impl Index {
    pub fn new<C>(columns: C) -> Self
    where
        C: IntoIterator,
        C::Item: Into<StableId>,
    {
        Self {
            name: None,
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A storage table.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub id: StableId,
    pub name: String,
    pub schema: Option<String>,
    pub columns: Vec<Column>,
    pub primary_key: PrimaryKey,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<Index>,
}

impl Table {
    pub fn new(id: impl Into<StableId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            schema: None,
            columns: Vec::new(),
            primary_key: PrimaryKey::default(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Set the primary key columns.
    pub fn key<C>(mut self, columns: C) -> Self
    where
        C: IntoIterator,
        C::Item: Into<StableId>,
    {
        self.primary_key.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn key_name(mut self, name: impl Into<String>) -> Self {
        self.primary_key.name = Some(name.into());
        self
    }

    pub fn foreign_key(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn qualified_name(&self) -> QualifiedName {
        QualifiedName::new(self.schema.as_deref(), self.name.clone())
    }

    /// Get a column by id.
    pub fn get_column(&self, id: &StableId) -> Option<&Column> {
        self.columns.iter().find(|c| &c.id == id)
    }

    pub fn has_column(&self, id: &StableId) -> bool {
        self.get_column(id).is_some()
    }

    /// Names of the given columns, in order. Unknown ids are skipped.
    pub fn column_names(&self, ids: &[StableId]) -> Vec<String> {
        ids.iter()
            .filter_map(|id| self.get_column(id))
            .map(|c| c.name.clone())
            .collect()
    }

    /// Name of the primary key constraint, explicit or conventional.
    pub fn primary_key_name(&self) -> String {
        self.primary_key
            .name
            .clone()
            .unwrap_or_else(|| naming::primary_key_name(&self.qualified_name()))
    }
}

/// Which modification a procedure performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModificationKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ModificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModificationKind::Insert => write!(f, "insert"),
            ModificationKind::Update => write!(f, "update"),
            ModificationKind::Delete => write!(f, "delete"),
        }
    }
}

/// A procedure parameter, optionally bound to a column of the target table.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub kind: PrimitiveKind,
    pub facets: Facets,
    pub is_output: bool,
    pub column: Option<StableId>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: PrimitiveKind) -> Self {
        Self {
            name: name.into(),
            kind,
            facets: Facets::default(),
            is_output: false,
            column: None,
        }
    }

    /// Bind this parameter to a column of the procedure's table.
    pub fn bound_to(mut self, column: impl Into<StableId>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn output(mut self) -> Self {
        self.is_output = true;
        self
    }

    pub fn facets(mut self, facets: Facets) -> Self {
        self.facets = facets;
        self
    }
}

/// A stored procedure performing one modification against one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    pub id: StableId,
    pub name: String,
    pub schema: Option<String>,
    pub kind: ModificationKind,
    /// Target table id
    pub table: StableId,
    pub parameters: Vec<Parameter>,
}

impl Procedure {
    pub fn new(
        id: impl Into<StableId>,
        name: impl Into<String>,
        kind: ModificationKind,
        table: impl Into<StableId>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            schema: None,
            kind,
            table: table.into(),
            parameters: Vec::new(),
        }
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn qualified_name(&self) -> QualifiedName {
        QualifiedName::new(self.schema.as_deref(), self.name.clone())
    }
}

/// One version of a storage model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    /// Token identifying the provider the snapshot was built for. Never
    /// compared by the differ.
    pub provider_manifest_token: Option<String>,
    pub tables: Vec<Table>,
    pub procedures: Vec<Procedure>,
}

impl Schema {
    /// Create a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn manifest(mut self, token: impl Into<String>) -> Self {
        self.provider_manifest_token = Some(token.into());
        self
    }

    pub fn table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    pub fn procedure(mut self, procedure: Procedure) -> Self {
        self.procedures.push(procedure);
        self
    }

    /// Get a table by id.
    pub fn get_table(&self, id: &StableId) -> Option<&Table> {
        self.tables.iter().find(|t| &t.id == id)
    }

    /// Get a procedure by id.
    pub fn get_procedure(&self, id: &StableId) -> Option<&Procedure> {
        self.procedures.iter().find(|p| &p.id == id)
    }

    /// Check the snapshot's internal consistency.
    ///
    /// Ids must be unique, names must be unique per slot, and every key,
    /// index, foreign key and procedure must reference objects that exist.
    pub fn validate(&self) -> Result<(), SchemaError> {
        validate::validate(self)
    }
}
