//! Name comparison and naming conventions.

use crate::QualifiedName;

/// Normalized form of a name for slot comparison.
pub fn slot_key(name: &str) -> String {
    name.to_lowercase()
}

/// Whether two names occupy the same slot (Unicode case-insensitive).
pub fn same_slot(a: &str, b: &str) -> bool {
    a == b || slot_key(a) == slot_key(b)
}

/// Whether two optional schema names denote the same schema.
pub fn same_schema(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => same_slot(a, b),
        _ => false,
    }
}

/// Whether going from `old` to `new` is a rename.
///
/// A pure change of letter case is not a rename.
///
/// ```
/// use morph_schema::naming::is_renamed;
/// assert!(is_renamed("Orders", "Order"));
/// assert!(!is_renamed("Orders", "ORDERS"));
/// assert!(!is_renamed("Orders", "Orders"));
/// ```
pub fn is_renamed(old: &str, new: &str) -> bool {
    old != new && !same_slot(old, new)
}

/// Conventional primary key name: `PK_{schema.table}`.
pub fn primary_key_name(table: &QualifiedName) -> String {
    format!("PK_{}", table)
}

/// Conventional foreign key name: `FK_{dependent}_{principal}_{columns}`.
///
/// ```
/// use morph_schema::{QualifiedName, naming::foreign_key_name};
/// let name = foreign_key_name(
///     &QualifiedName::parse("dbo.OrderLines"),
///     &QualifiedName::parse("ordering.Orders"),
///     &["OrderId"],
/// );
/// assert_eq!(name, "FK_dbo.OrderLines_ordering.Orders_OrderId");
/// ```
pub fn foreign_key_name(
    dependent: &QualifiedName,
    principal: &QualifiedName,
    columns: &[impl AsRef<str>],
) -> String {
    format!("FK_{}_{}_{}", dependent, principal, join(columns))
}

/// Conventional index name: `IX_{columns}`.
pub fn index_name(columns: &[impl AsRef<str>]) -> String {
    format!("IX_{}", join(columns))
}

fn join(columns: &[impl AsRef<str>]) -> String {
    let cols: Vec<&str> = columns.iter().map(|c| c.as_ref()).collect();
    cols.join("_")
}

/// An identifier wrapper.
///
/// Display writes the value quoted with double quotes, doubling any embedded
/// quote.
///
/// ```
/// use morph_schema::naming::Ident;
/// assert_eq!(format!("{}", Ident("order")), "\"order\"");
/// assert_eq!(format!("{}", Ident("bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"")?;
        for c in self.0.as_ref().chars() {
            if c == '"' {
                write!(f, "\"\"")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "\"")
    }
}

/// Quote an identifier.
pub fn quote_ident(name: &str) -> String {
    format!("{}", Ident(name))
}

/// Quote each part of a qualified name.
pub fn quote_qualified(name: &QualifiedName) -> String {
    match &name.schema {
        Some(schema) => format!("{}.{}", Ident(schema), Ident(&name.name)),
        None => quote_ident(&name.name),
    }
}
