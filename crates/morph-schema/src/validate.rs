use std::collections::{HashMap, HashSet};

use crate::naming::slot_key;
use crate::{QualifiedName, Schema, SchemaError, StableId, Table};

pub(crate) fn validate(schema: &Schema) -> Result<(), SchemaError> {
    let mut table_ids: HashMap<&StableId, &Table> = HashMap::new();
    let mut column_ids: HashSet<&StableId> = HashSet::new();
    let mut table_slots: HashMap<(Option<String>, String), QualifiedName> = HashMap::new();

    for table in &schema.tables {
        if table_ids.insert(&table.id, table).is_some() {
            return Err(SchemaError::DuplicateId {
                kind: "table",
                id: table.id.clone(),
            });
        }

        let qualified = table.qualified_name();
        let slot = (table.schema.as_deref().map(slot_key), slot_key(&table.name));
        if let Some(first) = table_slots.insert(slot, qualified.clone()) {
            return Err(SchemaError::DuplicateTableName {
                first,
                second: qualified,
            });
        }

        let mut column_slots: HashMap<String, &str> = HashMap::new();
        for column in &table.columns {
            if !column_ids.insert(&column.id) {
                return Err(SchemaError::DuplicateId {
                    kind: "column",
                    id: column.id.clone(),
                });
            }
            if let Some(first) = column_slots.insert(slot_key(&column.name), &column.name) {
                return Err(SchemaError::DuplicateColumnName {
                    table: qualified,
                    first: first.to_string(),
                    second: column.name.clone(),
                });
            }
        }
    }

    for table in &schema.tables {
        check_columns(table, "primary key", &table.primary_key.columns)?;

        for index in &table.indexes {
            check_columns(table, "index", &index.columns)?;
        }

        for fk in &table.foreign_keys {
            let context = format!("foreign key `{}`", fk.id);
            check_columns(table, &context, &fk.dependent_columns)?;

            let Some(principal) = table_ids.get(&fk.principal_table) else {
                return Err(SchemaError::UnknownTable {
                    context,
                    table: fk.principal_table.clone(),
                });
            };
            check_columns(principal, &context, &fk.principal_columns)?;

            if fk.dependent_columns.len() != fk.principal_columns.len() {
                return Err(SchemaError::ForeignKeyArity {
                    table: table.qualified_name(),
                    id: fk.id.clone(),
                    dependent: fk.dependent_columns.len(),
                    principal: fk.principal_columns.len(),
                });
            }
        }
    }

    let mut procedure_ids: HashSet<&StableId> = HashSet::new();
    let mut procedure_slots: HashMap<(Option<String>, String), QualifiedName> = HashMap::new();
    for procedure in &schema.procedures {
        if !procedure_ids.insert(&procedure.id) {
            return Err(SchemaError::DuplicateId {
                kind: "procedure",
                id: procedure.id.clone(),
            });
        }

        let qualified = procedure.qualified_name();
        let slot = (
            procedure.schema.as_deref().map(slot_key),
            slot_key(&procedure.name),
        );
        if let Some(first) = procedure_slots.insert(slot, qualified.clone()) {
            return Err(SchemaError::DuplicateProcedureName {
                first,
                second: qualified,
            });
        }

        let context = format!("procedure `{}`", qualified);
        let Some(table) = table_ids.get(&procedure.table) else {
            return Err(SchemaError::UnknownTable {
                context,
                table: procedure.table.clone(),
            });
        };
        for parameter in &procedure.parameters {
            if let Some(column) = &parameter.column {
                check_columns(table, &context, std::slice::from_ref(column))?;
            }
        }
    }

    Ok(())
}

fn check_columns(table: &Table, context: &str, columns: &[StableId]) -> Result<(), SchemaError> {
    for column in columns {
        if !table.has_column(column) {
            return Err(SchemaError::UnknownColumn {
                table: table.qualified_name(),
                context: context.to_string(),
                column: column.clone(),
            });
        }
    }
    Ok(())
}
