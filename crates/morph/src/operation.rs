//! Migration operations.
//!
//! Every operation carries the full structural detail a renderer needs to
//! emit DDL: qualified names, column definitions, facet values. Operations
//! that destroy or mutate state also embed a value copy of what was there
//! before, so [`Operation::inverse`] never needs the snapshots again.

use std::fmt;

use morph_schema::{Column, Facets, Parameter, PrimitiveKind, QualifiedName};

/// A column definition as carried by operations.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnModel {
    pub name: String,
    pub kind: PrimitiveKind,
    pub facets: Facets,
}

impl ColumnModel {
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: self.kind,
            facets: self.facets.clone(),
        }
    }
}

impl From<&Column> for ColumnModel {
    fn from(column: &Column) -> Self {
        Self {
            name: column.name.clone(),
            kind: column.kind,
            facets: column.facets.clone(),
        }
    }
}

impl fmt::Display for ColumnModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nullable = if self.facets.nullable { " (nullable)" } else { "" };
        write!(f, "{}: {}{}", self.name, self.kind, nullable)
    }
}

/// A procedure parameter as carried by operations.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterModel {
    pub name: String,
    pub kind: PrimitiveKind,
    pub facets: Facets,
    pub is_output: bool,
}

impl From<&Parameter> for ParameterModel {
    fn from(parameter: &Parameter) -> Self {
        Self {
            name: parameter.name.clone(),
            kind: parameter.kind,
            facets: parameter.facets.clone(),
            is_output: parameter.is_output,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryKeyModel {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    pub name: QualifiedName,
    pub columns: Vec<ColumnModel>,
    pub primary_key: Option<PrimaryKeyModel>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropTable {
    pub name: QualifiedName,
    /// Full definition of the table being dropped.
    pub inverse: CreateTable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenameTable {
    pub name: QualifiedName,
    pub new_name: String,
}

/// Move a table to another schema, keeping its name.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveTable {
    pub name: QualifiedName,
    pub new_schema: Option<String>,
    /// Target definition, for renderers that move by create + copy + drop.
    pub create_table: CreateTable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddColumn {
    pub table: QualifiedName,
    pub column: ColumnModel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropColumn {
    pub table: QualifiedName,
    pub name: String,
    pub inverse: AddColumn,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenameColumn {
    pub table: QualifiedName,
    pub name: String,
    pub new_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlterColumn {
    pub table: QualifiedName,
    pub column: ColumnModel,
    /// Type and facets before the change, under the column's current name.
    pub previous: ColumnModel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddPrimaryKey {
    pub table: QualifiedName,
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropPrimaryKey {
    pub table: QualifiedName,
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndex {
    pub table: QualifiedName,
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropIndex {
    pub table: QualifiedName,
    pub name: String,
    pub columns: Vec<String>,
    pub inverse: CreateIndex,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddForeignKey {
    pub name: String,
    pub dependent_table: QualifiedName,
    pub dependent_columns: Vec<String>,
    pub principal_table: QualifiedName,
    pub principal_columns: Vec<String>,
    pub cascade_delete: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropForeignKey {
    pub name: String,
    pub dependent_table: QualifiedName,
    pub dependent_columns: Vec<String>,
    pub principal_table: QualifiedName,
    pub inverse: AddForeignKey,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateProcedure {
    pub name: QualifiedName,
    pub parameters: Vec<ParameterModel>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropProcedure {
    pub name: QualifiedName,
    pub inverse: CreateProcedure,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlterProcedure {
    pub name: QualifiedName,
    pub parameters: Vec<ParameterModel>,
    pub body: String,
    pub previous_parameters: Vec<ParameterModel>,
    pub previous_body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenameProcedure {
    pub name: QualifiedName,
    pub new_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoveProcedure {
    pub name: QualifiedName,
    pub new_schema: Option<String>,
}

/// A single migration step.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    CreateTable(CreateTable),
    DropTable(DropTable),
    RenameTable(RenameTable),
    MoveTable(MoveTable),
    AddColumn(AddColumn),
    DropColumn(DropColumn),
    RenameColumn(RenameColumn),
    AlterColumn(AlterColumn),
    AddPrimaryKey(AddPrimaryKey),
    DropPrimaryKey(DropPrimaryKey),
    CreateIndex(CreateIndex),
    DropIndex(DropIndex),
    AddForeignKey(AddForeignKey),
    DropForeignKey(DropForeignKey),
    CreateProcedure(CreateProcedure),
    DropProcedure(DropProcedure),
    AlterProcedure(AlterProcedure),
    RenameProcedure(RenameProcedure),
    MoveProcedure(MoveProcedure),
}

impl CreateTable {
    pub fn inverse(&self) -> DropTable {
        DropTable {
            name: self.name.clone(),
            inverse: self.clone(),
        }
    }
}

impl AddColumn {
    pub fn inverse(&self) -> DropColumn {
        DropColumn {
            table: self.table.clone(),
            name: self.column.name.clone(),
            inverse: self.clone(),
        }
    }
}

impl AlterColumn {
    pub fn inverse(&self) -> AlterColumn {
        AlterColumn {
            table: self.table.clone(),
            column: self.previous.clone(),
            previous: self.column.clone(),
        }
    }
}

impl CreateIndex {
    pub fn inverse(&self) -> DropIndex {
        DropIndex {
            table: self.table.clone(),
            name: self.name.clone(),
            columns: self.columns.clone(),
            inverse: self.clone(),
        }
    }
}

impl AddForeignKey {
    pub fn inverse(&self) -> DropForeignKey {
        DropForeignKey {
            name: self.name.clone(),
            dependent_table: self.dependent_table.clone(),
            dependent_columns: self.dependent_columns.clone(),
            principal_table: self.principal_table.clone(),
            inverse: self.clone(),
        }
    }
}

impl CreateProcedure {
    pub fn inverse(&self) -> DropProcedure {
        DropProcedure {
            name: self.name.clone(),
            inverse: self.clone(),
        }
    }
}

impl Operation {
    /// The operation that undoes this one.
    ///
    /// Computed only from data embedded in the operation itself.
    pub fn inverse(&self) -> Operation {
        match self {
            Operation::CreateTable(op) => Operation::DropTable(op.inverse()),
            Operation::DropTable(op) => Operation::CreateTable(op.inverse.clone()),
            Operation::RenameTable(op) => Operation::RenameTable(RenameTable {
                name: op.name.with_name(op.new_name.clone()),
                new_name: op.name.name.clone(),
            }),
            Operation::MoveTable(op) => {
                let mut create_table = op.create_table.clone();
                create_table.name = op.name.clone();
                Operation::MoveTable(MoveTable {
                    name: op.name.with_schema(op.new_schema.as_deref()),
                    new_schema: op.name.schema.clone(),
                    create_table,
                })
            }
            Operation::AddColumn(op) => Operation::DropColumn(op.inverse()),
            Operation::DropColumn(op) => Operation::AddColumn(op.inverse.clone()),
            Operation::RenameColumn(op) => Operation::RenameColumn(RenameColumn {
                table: op.table.clone(),
                name: op.new_name.clone(),
                new_name: op.name.clone(),
            }),
            Operation::AlterColumn(op) => Operation::AlterColumn(op.inverse()),
            Operation::AddPrimaryKey(op) => Operation::DropPrimaryKey(DropPrimaryKey {
                table: op.table.clone(),
                name: op.name.clone(),
                columns: op.columns.clone(),
            }),
            Operation::DropPrimaryKey(op) => Operation::AddPrimaryKey(AddPrimaryKey {
                table: op.table.clone(),
                name: op.name.clone(),
                columns: op.columns.clone(),
            }),
            Operation::CreateIndex(op) => Operation::DropIndex(op.inverse()),
            Operation::DropIndex(op) => Operation::CreateIndex(op.inverse.clone()),
            Operation::AddForeignKey(op) => Operation::DropForeignKey(op.inverse()),
            Operation::DropForeignKey(op) => Operation::AddForeignKey(op.inverse.clone()),
            Operation::CreateProcedure(op) => Operation::DropProcedure(op.inverse()),
            Operation::DropProcedure(op) => Operation::CreateProcedure(op.inverse.clone()),
            Operation::AlterProcedure(op) => Operation::AlterProcedure(AlterProcedure {
                name: op.name.clone(),
                parameters: op.previous_parameters.clone(),
                body: op.previous_body.clone(),
                previous_parameters: op.parameters.clone(),
                previous_body: op.body.clone(),
            }),
            Operation::RenameProcedure(op) => Operation::RenameProcedure(RenameProcedure {
                name: op.name.with_name(op.new_name.clone()),
                new_name: op.name.name.clone(),
            }),
            Operation::MoveProcedure(op) => Operation::MoveProcedure(MoveProcedure {
                name: op.name.with_schema(op.new_schema.as_deref()),
                new_schema: op.name.schema.clone(),
            }),
        }
    }

    /// Whether applying this operation may lose data.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Operation::DropTable(_) | Operation::DropColumn(_) | Operation::AlterColumn(_)
        )
    }
}

/// Operations that undo `operations`, in the order they must run.
pub fn rollback(operations: &[Operation]) -> Vec<Operation> {
    operations.iter().rev().map(Operation::inverse).collect()
}

fn schema_label(schema: &Option<String>) -> &str {
    schema.as_deref().unwrap_or("(default)")
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateTable(op) => write!(f, "+ table {}", op.name),
            Operation::DropTable(op) => write!(f, "- table {}", op.name),
            Operation::RenameTable(op) => {
                write!(f, "~ rename table {} -> {}", op.name, op.new_name)
            }
            Operation::MoveTable(op) => write!(
                f,
                "~ move table {} -> {}",
                op.name,
                schema_label(&op.new_schema)
            ),
            Operation::AddColumn(op) => write!(f, "+ column {}.{}", op.table, op.column),
            Operation::DropColumn(op) => write!(f, "- column {}.{}", op.table, op.name),
            Operation::RenameColumn(op) => write!(
                f,
                "~ rename column {}.{} -> {}",
                op.table, op.name, op.new_name
            ),
            Operation::AlterColumn(op) => write!(
                f,
                "~ alter column {}.{}: {} -> {}",
                op.table, op.column.name, op.previous.kind, op.column.kind
            ),
            Operation::AddPrimaryKey(op) => write!(
                f,
                "+ primary key {} {} ({})",
                op.table,
                op.name,
                op.columns.join(", ")
            ),
            Operation::DropPrimaryKey(op) => {
                write!(f, "- primary key {} {}", op.table, op.name)
            }
            Operation::CreateIndex(op) => {
                let unique = if op.unique { "unique " } else { "" };
                write!(
                    f,
                    "+ {}index {} {} ({})",
                    unique,
                    op.table,
                    op.name,
                    op.columns.join(", ")
                )
            }
            Operation::DropIndex(op) => write!(f, "- index {} {}", op.table, op.name),
            Operation::AddForeignKey(op) => write!(
                f,
                "+ foreign key {} ({}) -> {} ({})",
                op.dependent_table,
                op.dependent_columns.join(", "),
                op.principal_table,
                op.principal_columns.join(", ")
            ),
            Operation::DropForeignKey(op) => write!(
                f,
                "- foreign key {} ({}) -> {}",
                op.dependent_table,
                op.dependent_columns.join(", "),
                op.principal_table
            ),
            Operation::CreateProcedure(op) => write!(f, "+ procedure {}", op.name),
            Operation::DropProcedure(op) => write!(f, "- procedure {}", op.name),
            Operation::AlterProcedure(op) => write!(f, "~ alter procedure {}", op.name),
            Operation::RenameProcedure(op) => {
                write!(f, "~ rename procedure {} -> {}", op.name, op.new_name)
            }
            Operation::MoveProcedure(op) => write!(
                f,
                "~ move procedure {} -> {}",
                op.name,
                schema_label(&op.new_schema)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_column() -> ColumnModel {
        ColumnModel {
            name: "Id".to_string(),
            kind: PrimitiveKind::Int32,
            facets: Facets {
                is_identity: true,
                ..Facets::default()
            },
        }
    }

    fn name_column() -> ColumnModel {
        ColumnModel {
            name: "Name".to_string(),
            kind: PrimitiveKind::String,
            facets: Facets {
                nullable: true,
                max_length: Some(128),
                ..Facets::default()
            },
        }
    }

    fn customers() -> CreateTable {
        CreateTable {
            name: QualifiedName::parse("dbo.Customers"),
            columns: vec![id_column(), name_column()],
            primary_key: Some(PrimaryKeyModel {
                name: "PK_dbo.Customers".to_string(),
                columns: vec!["Id".to_string()],
            }),
        }
    }

    #[test]
    fn test_create_drop_table_inverse() {
        let create = Operation::CreateTable(customers());
        let drop = create.inverse();
        let Operation::DropTable(dropped) = &drop else {
            panic!("expected DropTable, got {:?}", drop);
        };
        assert_eq!(dropped.name.to_string(), "dbo.Customers");
        assert_eq!(dropped.inverse.columns, customers().columns);
        assert_eq!(drop.inverse(), create);
    }

    #[test]
    fn test_alter_column_inverse_swaps_facets() {
        let alter = Operation::AlterColumn(AlterColumn {
            table: QualifiedName::parse("dbo.Customers"),
            column: name_column().with_name("Name"),
            previous: ColumnModel {
                name: "Name".to_string(),
                kind: PrimitiveKind::String,
                facets: Facets::default(),
            },
        });
        let Operation::AlterColumn(inverse) = alter.inverse() else {
            panic!("expected AlterColumn");
        };
        assert_eq!(inverse.column.facets, Facets::default());
        assert_eq!(inverse.previous.facets.max_length, Some(128));
        assert_eq!(alter.inverse().inverse(), alter);
    }

    #[test]
    fn test_rename_and_move_inverse() {
        let rename = Operation::RenameTable(RenameTable {
            name: QualifiedName::parse("dbo.Customers"),
            new_name: "Clients".to_string(),
        });
        assert_eq!(
            rename.inverse(),
            Operation::RenameTable(RenameTable {
                name: QualifiedName::parse("dbo.Clients"),
                new_name: "Customers".to_string(),
            })
        );

        let mut target = customers();
        target.name = QualifiedName::parse("crm.Customers");
        let mv = Operation::MoveTable(MoveTable {
            name: QualifiedName::parse("dbo.Customers"),
            new_schema: Some("crm".to_string()),
            create_table: target,
        });
        let Operation::MoveTable(back) = mv.inverse() else {
            panic!("expected MoveTable");
        };
        assert_eq!(back.name.to_string(), "crm.Customers");
        assert_eq!(back.new_schema.as_deref(), Some("dbo"));
        assert_eq!(back.create_table.name.to_string(), "dbo.Customers");
        assert_eq!(mv.inverse().inverse(), mv);
    }

    #[test]
    fn test_every_inverse_round_trips() {
        let table = QualifiedName::parse("dbo.Orders");
        let add_fk = AddForeignKey {
            name: "FK_dbo.Orders_dbo.Customers_CustomerId".to_string(),
            dependent_table: table.clone(),
            dependent_columns: vec!["CustomerId".to_string()],
            principal_table: QualifiedName::parse("dbo.Customers"),
            principal_columns: vec!["Id".to_string()],
            cascade_delete: true,
        };
        let index = CreateIndex {
            table: table.clone(),
            name: "IX_CustomerId".to_string(),
            columns: vec!["CustomerId".to_string()],
            unique: false,
        };
        let procedure = CreateProcedure {
            name: QualifiedName::parse("dbo.Order_Insert"),
            parameters: vec![],
            body: "INSERT ...".to_string(),
        };
        let operations = vec![
            Operation::AddColumn(AddColumn {
                table: table.clone(),
                column: name_column(),
            }),
            Operation::RenameColumn(RenameColumn {
                table: table.clone(),
                name: "A".to_string(),
                new_name: "B".to_string(),
            }),
            Operation::AddPrimaryKey(AddPrimaryKey {
                table: table.clone(),
                name: "PK_dbo.Orders".to_string(),
                columns: vec!["Id".to_string()],
            }),
            Operation::CreateIndex(index),
            Operation::AddForeignKey(add_fk),
            Operation::CreateProcedure(procedure.clone()),
            Operation::AlterProcedure(AlterProcedure {
                name: procedure.name.clone(),
                parameters: vec![],
                body: "new".to_string(),
                previous_parameters: vec![],
                previous_body: "old".to_string(),
            }),
            Operation::RenameProcedure(RenameProcedure {
                name: procedure.name.clone(),
                new_name: "Order_Add".to_string(),
            }),
            Operation::MoveProcedure(MoveProcedure {
                name: procedure.name.clone(),
                new_schema: None,
            }),
        ];
        for op in &operations {
            assert_ne!(&op.inverse(), op, "{} should not be its own inverse", op);
            assert_eq!(&op.inverse().inverse(), op);
        }

        let undo = rollback(&operations);
        assert_eq!(undo.len(), operations.len());
        assert!(matches!(undo[0], Operation::MoveProcedure(_)));
        assert!(matches!(undo[8], Operation::DropColumn(_)));
    }

    #[test]
    fn test_destructive_operations() {
        let create = Operation::CreateTable(customers());
        assert!(!create.is_destructive());
        assert!(create.inverse().is_destructive());
        let add = Operation::AddColumn(AddColumn {
            table: QualifiedName::parse("dbo.Customers"),
            column: name_column(),
        });
        assert!(add.inverse().is_destructive());
    }

    #[test]
    fn snapshot_display() {
        let create = customers();
        let lines: Vec<String> = [
            Operation::CreateTable(create.clone()),
            Operation::AddColumn(AddColumn {
                table: create.name.clone(),
                column: name_column(),
            }),
            Operation::RenameTable(RenameTable {
                name: create.name.clone(),
                new_name: "Clients".to_string(),
            }),
            Operation::MoveTable(MoveTable {
                name: create.name.clone(),
                new_schema: None,
                create_table: create.clone(),
            }),
            Operation::CreateIndex(CreateIndex {
                table: create.name.clone(),
                name: "IX_Name".to_string(),
                columns: vec!["Name".to_string()],
                unique: true,
            }),
        ]
        .iter()
        .map(|op| op.to_string())
        .collect();

        insta::assert_snapshot!(lines.join("\n"), @r"
        + table dbo.Customers
        + column dbo.Customers.Name: String (nullable)
        ~ rename table dbo.Customers -> Clients
        ~ move table dbo.Customers -> (default)
        + unique index dbo.Customers IX_Name (Name)
        ");
    }
}
