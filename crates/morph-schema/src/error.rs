use crate::{QualifiedName, StableId};

/// A snapshot that is internally inconsistent.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("duplicate {kind} id `{id}`")]
    DuplicateId { kind: &'static str, id: StableId },

    #[error("table `{first}` and table `{second}` occupy the same name slot")]
    DuplicateTableName {
        first: QualifiedName,
        second: QualifiedName,
    },

    #[error("columns `{first}` and `{second}` of table `{table}` occupy the same name slot")]
    DuplicateColumnName {
        table: QualifiedName,
        first: String,
        second: String,
    },

    #[error("procedure `{first}` and procedure `{second}` occupy the same name slot")]
    DuplicateProcedureName {
        first: QualifiedName,
        second: QualifiedName,
    },

    #[error("{context} of table `{table}` references unknown column `{column}`")]
    UnknownColumn {
        table: QualifiedName,
        context: String,
        column: StableId,
    },

    #[error("{context} references unknown table `{table}`")]
    UnknownTable { context: String, table: StableId },

    #[error(
        "foreign key `{id}` on table `{table}` has {dependent} dependent and {principal} principal columns"
    )]
    ForeignKeyArity {
        table: QualifiedName,
        id: StableId,
        dependent: usize,
        principal: usize,
    },
}
