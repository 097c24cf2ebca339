//! Schema model differencing.
//!
//! Given two versions of a storage model, morph produces the ordered list of
//! [`Operation`]s that turns the old shape into the new one. Objects are
//! matched by [`StableId`](morph_schema::StableId), so renames are recognized
//! as renames rather than a drop and an add.
//!
//! Every operation carries enough data to compute its own inverse, so a
//! rollback script never needs the snapshots:
//!
//! ```
//! use morph::{diff, rollback};
//! use morph_schema::{Column, PrimitiveKind, Schema, Table};
//!
//! fn customers(name: &str) -> Schema {
//!     Schema::new().table(
//!         Table::new("Customer", name)
//!             .schema("dbo")
//!             .column(Column::new("Customer.Id", "Id", PrimitiveKind::Int32).identity())
//!             .key(["Customer.Id"]),
//!     )
//! }
//!
//! let ops = diff(&customers("Customers"), &customers("Clients")).unwrap();
//! assert_eq!(ops.len(), 1);
//! assert_eq!(ops[0].to_string(), "~ rename table dbo.Customers -> Clients");
//!
//! let undo = rollback(&ops);
//! assert_eq!(undo[0].to_string(), "~ rename table dbo.Clients -> Customers");
//! ```
//!
//! Procedures are only diffed when a [`CommandTreeGenerator`] is supplied
//! through [`Differ::with_procedures`].

mod diff;
mod error;
pub mod operation;
mod options;
mod procedure;
mod rename;
mod solver;

pub use diff::Differ;
pub use error::{DiffError, GenerateError, Result, Side};
pub use operation::{Operation, rollback};
pub use options::DiffOptions;
pub use procedure::{
    Binding, BodyRenderer, CommandTree, CommandTreeGenerator, DeleteCommand, InsertCommand,
    ModificationCommandTreeGenerator, SqlBodyRenderer, UpdateCommand,
};
pub use rename::{Relocation, RenameOrderer, Scope, Step};
pub use solver::{SolverError, VirtualSchema};

pub use morph_schema;

use morph_schema::Schema;

/// Diff two snapshots with default options and no procedure support.
pub fn diff(old: &Schema, new: &Schema) -> Result<Vec<Operation>> {
    Differ::new(old, new).diff()
}
