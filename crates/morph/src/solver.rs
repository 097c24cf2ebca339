//! Operation ordering and replay.
//!
//! Operations are emitted in fixed phases so that every step's preconditions
//! hold when it runs:
//!
//! ```text
//! -- This fails:
//! ALTER TABLE "dbo"."Lines" ADD CONSTRAINT ... REFERENCES "dbo"."Order";  -- not renamed yet
//! EXEC sp_rename 'dbo.Orders', 'Order';
//!
//! -- This works:
//! EXEC sp_rename 'dbo.Orders', 'Order';
//! ALTER TABLE "dbo"."Lines" ADD CONSTRAINT ... REFERENCES "dbo"."Order";
//! ```
//!
//! [`VirtualSchema`] replays a sequence against a simulated set of names and
//! rejects the first operation whose preconditions do not hold. Tables and
//! procedures loaded from a snapshot remember their identity, so a replay
//! that leaves one object under another's name is caught too.

use std::collections::BTreeMap;

use morph_schema::naming::slot_key;
use morph_schema::{QualifiedName, Schema, StableId};
use tracing::debug;

use crate::operation::{
    AddColumn, AddForeignKey, AddPrimaryKey, AlterColumn, AlterProcedure, CreateIndex,
    CreateProcedure, CreateTable, DropColumn, DropForeignKey, DropIndex, DropPrimaryKey,
    DropProcedure, DropTable, Operation, RenameColumn,
};

/// Error when an operation sequence cannot be executed.
#[derive(Debug, Clone, PartialEq)]
pub enum SolverError {
    /// An operation requires a table that doesn't exist.
    TableNotFound { change: String, table: String },
    /// An operation requires a table to NOT exist, but it does.
    TableAlreadyExists { change: String, table: String },
    /// An operation requires a column that doesn't exist.
    ColumnNotFound {
        change: String,
        table: String,
        column: String,
    },
    /// An operation requires a column to NOT exist, but it does.
    ColumnAlreadyExists {
        change: String,
        table: String,
        column: String,
    },
    /// A foreign key references a table that doesn't exist.
    ForeignKeyTargetNotFound {
        change: String,
        source_table: String,
        target_table: String,
    },
    /// A foreign key references columns that don't exist.
    ForeignKeyColumnsNotFound {
        change: String,
        table: String,
        columns: Vec<String>,
    },
    ProcedureNotFound { change: String, procedure: String },
    ProcedureAlreadyExists { change: String, procedure: String },
    /// Renames form a cycle that no placeholder could break.
    CycleDetected { changes: Vec<String> },
    /// Replaying the operations does not arrive at the target snapshot.
    SimulationMismatch { reason: String },
}

impl std::fmt::Display for SolverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolverError::TableNotFound { change, table } => {
                write!(f, "{}: table '{}' does not exist", change, table)
            }
            SolverError::TableAlreadyExists { change, table } => {
                write!(f, "{}: table '{}' already exists", change, table)
            }
            SolverError::ColumnNotFound {
                change,
                table,
                column,
            } => {
                write!(f, "{}: column '{}.{}' does not exist", change, table, column)
            }
            SolverError::ColumnAlreadyExists {
                change,
                table,
                column,
            } => {
                write!(f, "{}: column '{}.{}' already exists", change, table, column)
            }
            SolverError::ForeignKeyTargetNotFound {
                change,
                source_table,
                target_table,
            } => {
                write!(
                    f,
                    "{}: foreign key from '{}' references non-existent table '{}'",
                    change, source_table, target_table
                )
            }
            SolverError::ForeignKeyColumnsNotFound {
                change,
                table,
                columns,
            } => {
                write!(
                    f,
                    "{}: foreign key columns {} not found in table '{}'",
                    change,
                    columns.join(", "),
                    table
                )
            }
            SolverError::ProcedureNotFound { change, procedure } => {
                write!(f, "{}: procedure '{}' does not exist", change, procedure)
            }
            SolverError::ProcedureAlreadyExists { change, procedure } => {
                write!(f, "{}: procedure '{}' already exists", change, procedure)
            }
            SolverError::CycleDetected { changes } => {
                write!(
                    f,
                    "dependency cycle detected, cannot order: {}",
                    changes.join(" -> ")
                )
            }
            SolverError::SimulationMismatch { reason } => {
                write!(f, "operations do not reach the target model: {}", reason)
            }
        }
    }
}

impl std::error::Error for SolverError {}

/// Collects operations by phase and emits them in execution order.
///
/// Within a phase, operations keep the order they were pushed in.
#[derive(Debug, Default)]
pub(crate) struct OperationOrderer {
    pub drop_foreign_keys: Vec<DropForeignKey>,
    pub drop_indexes: Vec<DropIndex>,
    pub drop_primary_keys: Vec<DropPrimaryKey>,
    pub drop_procedures: Vec<DropProcedure>,
    /// Table drops whose name a create or rename in this batch reuses
    pub vacating_table_drops: Vec<DropTable>,
    /// Table renames and moves, already ordered
    pub table_relocations: Vec<Operation>,
    /// Procedure renames and moves, already ordered
    pub procedure_relocations: Vec<Operation>,
    /// Column drops whose name an add or rename in this batch reuses
    pub vacating_column_drops: Vec<DropColumn>,
    pub column_renames: Vec<RenameColumn>,
    pub create_tables: Vec<CreateTable>,
    pub add_columns: Vec<AddColumn>,
    pub alter_columns: Vec<AlterColumn>,
    pub add_primary_keys: Vec<AddPrimaryKey>,
    pub create_indexes: Vec<CreateIndex>,
    pub add_foreign_keys: Vec<AddForeignKey>,
    pub drop_columns: Vec<DropColumn>,
    pub drop_tables: Vec<DropTable>,
    pub create_procedures: Vec<CreateProcedure>,
    pub alter_procedures: Vec<AlterProcedure>,
}

impl OperationOrderer {
    pub fn into_operations(self) -> Vec<Operation> {
        let mut ops = Vec::new();
        ops.extend(self.drop_foreign_keys.into_iter().map(Operation::DropForeignKey));
        ops.extend(self.drop_indexes.into_iter().map(Operation::DropIndex));
        ops.extend(self.drop_primary_keys.into_iter().map(Operation::DropPrimaryKey));
        ops.extend(self.drop_procedures.into_iter().map(Operation::DropProcedure));
        ops.extend(self.vacating_table_drops.into_iter().map(Operation::DropTable));
        ops.extend(self.table_relocations);
        ops.extend(self.procedure_relocations);
        ops.extend(self.vacating_column_drops.into_iter().map(Operation::DropColumn));
        ops.extend(self.column_renames.into_iter().map(Operation::RenameColumn));
        ops.extend(self.create_tables.into_iter().map(Operation::CreateTable));
        ops.extend(self.add_columns.into_iter().map(Operation::AddColumn));
        ops.extend(self.alter_columns.into_iter().map(Operation::AlterColumn));
        ops.extend(self.add_primary_keys.into_iter().map(Operation::AddPrimaryKey));
        ops.extend(self.create_indexes.into_iter().map(Operation::CreateIndex));
        ops.extend(self.add_foreign_keys.into_iter().map(Operation::AddForeignKey));
        ops.extend(self.drop_columns.into_iter().map(Operation::DropColumn));
        ops.extend(self.drop_tables.into_iter().map(Operation::DropTable));
        ops.extend(self.create_procedures.into_iter().map(Operation::CreateProcedure));
        ops.extend(self.alter_procedures.into_iter().map(Operation::AlterProcedure));
        ops
    }
}

type Slot = (Option<String>, String);

fn slot(name: &QualifiedName) -> Slot {
    (name.schema.as_deref().map(slot_key), slot_key(&name.name))
}

/// Virtual representation of a table for simulation.
#[derive(Debug, Clone, PartialEq)]
struct VirtualTable {
    name: QualifiedName,
    /// Identity from the snapshot; tables created by an operation have none
    id: Option<StableId>,
    /// Column slot -> column name as last written
    columns: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
struct VirtualProcedure {
    name: QualifiedName,
    id: Option<StableId>,
}

/// Virtual schema state for simulating migrations.
///
/// Names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VirtualSchema {
    tables: BTreeMap<Slot, VirtualTable>,
    procedures: BTreeMap<Slot, VirtualProcedure>,
}

impl VirtualSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize with every table, column and procedure of a snapshot.
    pub fn from_schema(schema: &Schema) -> Self {
        let mut virtual_schema = Self::new();
        for table in &schema.tables {
            let name = table.qualified_name();
            virtual_schema.tables.insert(
                slot(&name),
                VirtualTable {
                    name,
                    id: Some(table.id.clone()),
                    columns: table
                        .columns
                        .iter()
                        .map(|c| (slot_key(&c.name), c.name.clone()))
                        .collect(),
                },
            );
        }
        for procedure in &schema.procedures {
            let name = procedure.qualified_name();
            virtual_schema.procedures.insert(
                slot(&name),
                VirtualProcedure {
                    name,
                    id: Some(procedure.id.clone()),
                },
            );
        }
        virtual_schema
    }

    pub fn table_exists(&self, name: &QualifiedName) -> bool {
        self.tables.contains_key(&slot(name))
    }

    pub fn column_exists(&self, table: &QualifiedName, column: &str) -> bool {
        self.tables
            .get(&slot(table))
            .map(|t| t.columns.contains_key(&slot_key(column)))
            .unwrap_or(false)
    }

    pub fn procedure_exists(&self, name: &QualifiedName) -> bool {
        self.procedures.contains_key(&slot(name))
    }

    fn require_table(&self, change: &str, table: &QualifiedName) -> Result<(), SolverError> {
        if !self.table_exists(table) {
            return Err(SolverError::TableNotFound {
                change: change.to_string(),
                table: table.to_string(),
            });
        }
        Ok(())
    }

    fn require_free_table(&self, change: &str, table: &QualifiedName) -> Result<(), SolverError> {
        if self.table_exists(table) {
            return Err(SolverError::TableAlreadyExists {
                change: change.to_string(),
                table: table.to_string(),
            });
        }
        Ok(())
    }

    fn require_columns(
        &self,
        change: &str,
        table: &QualifiedName,
        columns: &[String],
    ) -> Result<(), SolverError> {
        self.require_table(change, table)?;
        for column in columns {
            if !self.column_exists(table, column) {
                return Err(SolverError::ColumnNotFound {
                    change: change.to_string(),
                    table: table.to_string(),
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }

    fn require_free_column(
        &self,
        change: &str,
        table: &QualifiedName,
        column: &str,
    ) -> Result<(), SolverError> {
        self.require_table(change, table)?;
        if self.column_exists(table, column) {
            return Err(SolverError::ColumnAlreadyExists {
                change: change.to_string(),
                table: table.to_string(),
                column: column.to_string(),
            });
        }
        Ok(())
    }

    fn require_procedure(&self, change: &str, name: &QualifiedName) -> Result<(), SolverError> {
        if !self.procedure_exists(name) {
            return Err(SolverError::ProcedureNotFound {
                change: change.to_string(),
                procedure: name.to_string(),
            });
        }
        Ok(())
    }

    fn require_free_procedure(
        &self,
        change: &str,
        name: &QualifiedName,
    ) -> Result<(), SolverError> {
        if self.procedure_exists(name) {
            return Err(SolverError::ProcedureAlreadyExists {
                change: change.to_string(),
                procedure: name.to_string(),
            });
        }
        Ok(())
    }

    fn relocate_table(&mut self, from: &QualifiedName, to: QualifiedName) {
        if let Some(mut table) = self.tables.remove(&slot(from)) {
            table.name = to.clone();
            self.tables.insert(slot(&to), table);
        }
    }

    fn relocate_procedure(&mut self, from: &QualifiedName, to: &QualifiedName) {
        if let Some(mut procedure) = self.procedures.remove(&slot(from)) {
            procedure.name = to.clone();
            self.procedures.insert(slot(to), procedure);
        }
    }

    fn table_mut(&mut self, name: &QualifiedName) -> Option<&mut VirtualTable> {
        self.tables.get_mut(&slot(name))
    }

    fn create(&mut self, change: &str, create: &CreateTable) -> Result<(), SolverError> {
        self.require_free_table(change, &create.name)?;
        let mut columns = BTreeMap::new();
        for column in &create.columns {
            if columns
                .insert(slot_key(&column.name), column.name.clone())
                .is_some()
            {
                return Err(SolverError::ColumnAlreadyExists {
                    change: change.to_string(),
                    table: create.name.to_string(),
                    column: column.name.clone(),
                });
            }
        }
        self.tables.insert(
            slot(&create.name),
            VirtualTable {
                name: create.name.clone(),
                id: None,
                columns,
            },
        );
        Ok(())
    }

    /// Apply an operation to the virtual schema, validating preconditions.
    pub fn apply(&mut self, op: &Operation) -> Result<(), SolverError> {
        let change = op.to_string();

        match op {
            Operation::CreateTable(create) => self.create(&change, create)?,

            Operation::DropTable(drop) => {
                self.require_table(&change, &drop.name)?;
                self.tables.remove(&slot(&drop.name));
            }

            Operation::RenameTable(rename) => {
                let to = rename.name.with_name(rename.new_name.clone());
                self.require_table(&change, &rename.name)?;
                self.require_free_table(&change, &to)?;
                self.relocate_table(&rename.name, to);
            }

            Operation::MoveTable(move_table) => {
                let to = move_table
                    .name
                    .with_schema(move_table.new_schema.as_deref());
                self.require_table(&change, &move_table.name)?;
                self.require_free_table(&change, &to)?;
                self.relocate_table(&move_table.name, to);
            }

            Operation::AddColumn(add) => {
                self.require_free_column(&change, &add.table, &add.column.name)?;
                if let Some(table) = self.table_mut(&add.table) {
                    table
                        .columns
                        .insert(slot_key(&add.column.name), add.column.name.clone());
                }
            }

            Operation::DropColumn(drop) => {
                self.require_columns(&change, &drop.table, std::slice::from_ref(&drop.name))?;
                if let Some(table) = self.table_mut(&drop.table) {
                    table.columns.remove(&slot_key(&drop.name));
                }
            }

            Operation::RenameColumn(rename) => {
                self.require_columns(&change, &rename.table, std::slice::from_ref(&rename.name))?;
                self.require_free_column(&change, &rename.table, &rename.new_name)?;
                if let Some(table) = self.table_mut(&rename.table) {
                    table.columns.remove(&slot_key(&rename.name));
                    table
                        .columns
                        .insert(slot_key(&rename.new_name), rename.new_name.clone());
                }
            }

            Operation::AlterColumn(alter) => {
                self.require_columns(
                    &change,
                    &alter.table,
                    std::slice::from_ref(&alter.column.name),
                )?;
            }

            Operation::AddPrimaryKey(AddPrimaryKey { table, columns, .. })
            | Operation::DropPrimaryKey(DropPrimaryKey { table, columns, .. })
            | Operation::CreateIndex(CreateIndex { table, columns, .. })
            | Operation::DropIndex(DropIndex { table, columns, .. }) => {
                self.require_columns(&change, table, columns)?;
            }

            Operation::AddForeignKey(fk) => {
                self.require_columns(&change, &fk.dependent_table, &fk.dependent_columns)?;
                if !self.table_exists(&fk.principal_table) {
                    return Err(SolverError::ForeignKeyTargetNotFound {
                        change,
                        source_table: fk.dependent_table.to_string(),
                        target_table: fk.principal_table.to_string(),
                    });
                }
                let missing: Vec<String> = fk
                    .principal_columns
                    .iter()
                    .filter(|c| !self.column_exists(&fk.principal_table, c))
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    return Err(SolverError::ForeignKeyColumnsNotFound {
                        change,
                        table: fk.principal_table.to_string(),
                        columns: missing,
                    });
                }
            }

            Operation::DropForeignKey(fk) => {
                self.require_columns(&change, &fk.dependent_table, &fk.dependent_columns)?;
            }

            Operation::CreateProcedure(create) => {
                self.require_free_procedure(&change, &create.name)?;
                self.procedures.insert(
                    slot(&create.name),
                    VirtualProcedure {
                        name: create.name.clone(),
                        id: None,
                    },
                );
            }

            Operation::DropProcedure(drop) => {
                self.require_procedure(&change, &drop.name)?;
                self.procedures.remove(&slot(&drop.name));
            }

            Operation::AlterProcedure(alter) => {
                self.require_procedure(&change, &alter.name)?;
            }

            Operation::RenameProcedure(rename) => {
                let to = rename.name.with_name(rename.new_name.clone());
                self.require_procedure(&change, &rename.name)?;
                self.require_free_procedure(&change, &to)?;
                self.relocate_procedure(&rename.name, &to);
            }

            Operation::MoveProcedure(move_procedure) => {
                let to = move_procedure
                    .name
                    .with_schema(move_procedure.new_schema.as_deref());
                self.require_procedure(&change, &move_procedure.name)?;
                self.require_free_procedure(&change, &to)?;
                self.relocate_procedure(&move_procedure.name, &to);
            }
        }

        Ok(())
    }

    /// Check if an operation can be applied (without actually applying it).
    pub fn can_apply(&self, op: &Operation) -> bool {
        let mut clone = self.clone();
        clone.apply(op).is_ok()
    }

    /// Apply every operation in order, stopping at the first failure.
    pub fn replay(&mut self, ops: &[Operation]) -> Result<(), SolverError> {
        for op in ops {
            self.apply(op)?;
        }
        debug!(operations = ops.len(), "replay succeeded");
        Ok(())
    }

    /// Check that this schema holds exactly the names of `target`, and that
    /// every object carried over from the starting snapshot sits under the
    /// name `target` gives its identity.
    ///
    /// Procedures are only compared when `procedures` is set.
    pub fn ensure_matches(&self, target: &Schema, procedures: bool) -> Result<(), SolverError> {
        let expected = Self::from_schema(target);

        for (key, table) in &expected.tables {
            let Some(actual) = self.tables.get(key) else {
                return Err(SolverError::SimulationMismatch {
                    reason: format!("table '{}' is missing", table.name),
                });
            };
            if let (Some(held), Some(wanted)) = (&actual.id, &table.id)
                && held != wanted
            {
                return Err(SolverError::SimulationMismatch {
                    reason: format!("table '{}' holds `{}`, not `{}`", table.name, held, wanted),
                });
            }
            if let Some(column) = table.columns.keys().find(|c| !actual.columns.contains_key(*c)) {
                return Err(SolverError::SimulationMismatch {
                    reason: format!("column '{}.{}' is missing", table.name, table.columns[column]),
                });
            }
            if let Some(column) = actual.columns.keys().find(|c| !table.columns.contains_key(*c)) {
                return Err(SolverError::SimulationMismatch {
                    reason: format!(
                        "column '{}.{}' should not exist",
                        table.name, actual.columns[column]
                    ),
                });
            }
        }
        if let Some((_, table)) = self
            .tables
            .iter()
            .find(|(key, _)| !expected.tables.contains_key(*key))
        {
            return Err(SolverError::SimulationMismatch {
                reason: format!("table '{}' should not exist", table.name),
            });
        }

        if !procedures {
            return Ok(());
        }
        for (key, procedure) in &expected.procedures {
            let Some(actual) = self.procedures.get(key) else {
                return Err(SolverError::SimulationMismatch {
                    reason: format!("procedure '{}' is missing", procedure.name),
                });
            };
            if let (Some(held), Some(wanted)) = (&actual.id, &procedure.id)
                && held != wanted
            {
                return Err(SolverError::SimulationMismatch {
                    reason: format!(
                        "procedure '{}' holds `{}`, not `{}`",
                        procedure.name, held, wanted
                    ),
                });
            }
        }
        if let Some((_, procedure)) = self
            .procedures
            .iter()
            .find(|(key, _)| !expected.procedures.contains_key(*key))
        {
            return Err(SolverError::SimulationMismatch {
                reason: format!("procedure '{}' should not exist", procedure.name),
            });
        }
        Ok(())
    }
}
