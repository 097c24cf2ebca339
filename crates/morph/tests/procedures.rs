mod common;

use std::cell::Cell;

use common::{assert_replays, init_tracing, summary};
use morph::{
    CommandTree, CommandTreeGenerator, DiffError, Differ, GenerateError,
    ModificationCommandTreeGenerator, Operation, Result, SqlBodyRenderer, VirtualSchema, diff,
};
use morph_schema::{
    Column, ModificationKind, Parameter, PrimitiveKind, Procedure, Schema, Table,
};

fn customers(name_column: &str) -> Table {
    Table::new("Customer", "Customers")
        .schema("dbo")
        .column(Column::new("Customer.Id", "Id", PrimitiveKind::Int32).identity())
        .column(Column::new("Customer.Name", name_column, PrimitiveKind::String).nullable())
        .key(["Customer.Id"])
}

fn insert_customer(schema: &str, name: &str) -> Procedure {
    Procedure::new("Customer_Insert", name, ModificationKind::Insert, "Customer")
        .schema(schema)
        .parameter(Parameter::new("Name", PrimitiveKind::String).bound_to("Customer.Name"))
}

fn model(procedures: Vec<Procedure>) -> Schema {
    let mut schema = Schema::new().table(customers("Name"));
    for procedure in procedures {
        schema = schema.procedure(procedure);
    }
    schema
}

fn diff_with_procedures(old: &Schema, new: &Schema) -> Result<Vec<Operation>> {
    Differ::new(old, new)
        .with_procedures(|| ModificationCommandTreeGenerator, SqlBodyRenderer)
        .diff()
}

#[test]
fn test_procedures_ignored_without_generator() {
    let old = model(vec![]);
    let new = model(vec![insert_customer("dbo", "Customer_Insert")]);
    assert!(diff(&old, &new).unwrap().is_empty());
}

#[test]
fn test_create_procedure_renders_body() {
    init_tracing();
    let old = model(vec![]);
    let new = model(vec![insert_customer("dbo", "Customer_Insert")]);

    let ops = diff_with_procedures(&old, &new).unwrap();
    insta::assert_snapshot!(summary(&ops), @"+ procedure dbo.Customer_Insert");

    let Operation::CreateProcedure(create) = &ops[0] else {
        panic!("expected CreateProcedure");
    };
    assert_eq!(create.parameters.len(), 1);
    insta::assert_snapshot!(create.body, @r#"
    INSERT INTO "dbo"."Customers" ("Name")
    VALUES (@Name)
    RETURNING "Id"
    "#);
}

#[test]
fn test_drop_procedure_keeps_definition() {
    let old = model(vec![insert_customer("dbo", "Customer_Insert")]);
    let new = model(vec![]);

    let ops = diff_with_procedures(&old, &new).unwrap();
    insta::assert_snapshot!(summary(&ops), @"- procedure dbo.Customer_Insert");

    let Operation::DropProcedure(drop) = &ops[0] else {
        panic!("expected DropProcedure");
    };
    assert!(drop.inverse.body.starts_with("INSERT INTO"));
}

#[test]
fn test_rename_and_move_procedure() {
    let old = model(vec![insert_customer("dbo", "Customer_Insert")]);

    let renamed = model(vec![insert_customer("dbo", "Customer_Add")]);
    let ops = diff_with_procedures(&old, &renamed).unwrap();
    insta::assert_snapshot!(summary(&ops), @"~ rename procedure dbo.Customer_Insert -> Customer_Add");

    let moved = model(vec![insert_customer("sales", "Customer_Insert")]);
    let ops = diff_with_procedures(&old, &moved).unwrap();
    insta::assert_snapshot!(summary(&ops), @"~ move procedure dbo.Customer_Insert -> sales");
    assert_replays(&old, &moved, &ops);
}

#[test]
fn test_rename_into_the_name_a_moving_procedure_leaves() {
    let add = |schema: &str, name: &str| {
        Procedure::new("Customer_Add", name, ModificationKind::Insert, "Customer")
            .schema(schema)
            .parameter(Parameter::new("Name", PrimitiveKind::String).bound_to("Customer.Name"))
    };
    let old = model(vec![
        insert_customer("dbo", "Customer_Insert"),
        add("dbo", "Customer_Add"),
    ]);
    let new = model(vec![
        insert_customer("sales", "Customer_Add"),
        add("dbo", "Customer_Insert"),
    ]);

    let ops = diff_with_procedures(&old, &new).unwrap();
    insta::assert_snapshot!(summary(&ops), @r"
    ~ rename procedure dbo.Customer_Insert -> __mig_tmp__0
    ~ move procedure dbo.__mig_tmp__0 -> sales
    ~ rename procedure dbo.Customer_Add -> Customer_Insert
    ~ rename procedure sales.__mig_tmp__0 -> Customer_Add
    ");
    assert_replays(&old, &new, &ops);

    // Same names on both sides, but each held by the other procedure.
    let swapped = model(vec![
        insert_customer("dbo", "Customer_Add"),
        add("dbo", "Customer_Insert"),
    ]);
    let err = VirtualSchema::from_schema(&old)
        .ensure_matches(&swapped, true)
        .unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"operations do not reach the target model: procedure 'dbo.Customer_Add' holds `Customer_Add`, not `Customer_Insert`"
    );
}

#[test]
fn test_parameter_change_alters_procedure() {
    let old = model(vec![insert_customer("dbo", "Customer_Insert")]);
    let new = model(vec![
        insert_customer("dbo", "Customer_Insert").parameter(
            Parameter::new("Id", PrimitiveKind::Int32)
                .bound_to("Customer.Id")
                .output(),
        ),
    ]);

    let ops = diff_with_procedures(&old, &new).unwrap();
    insta::assert_snapshot!(summary(&ops), @"~ alter procedure dbo.Customer_Insert");

    let Operation::AlterProcedure(alter) = &ops[0] else {
        panic!("expected AlterProcedure");
    };
    assert_eq!(alter.previous_parameters.len(), 1);
    assert_eq!(alter.parameters.len(), 2);
    assert_eq!(alter.body, alter.previous_body);
}

#[test]
fn test_column_rename_alters_procedure_body() {
    let old = model(vec![insert_customer("dbo", "Customer_Insert")]);
    let new = Schema::new()
        .table(customers("FullName"))
        .procedure(insert_customer("dbo", "Customer_Insert"));

    let ops = diff_with_procedures(&old, &new).unwrap();
    insta::assert_snapshot!(summary(&ops), @r"
    ~ rename column dbo.Customers.Name -> FullName
    ~ alter procedure dbo.Customer_Insert
    ");

    let Operation::AlterProcedure(alter) = &ops[1] else {
        panic!("expected AlterProcedure");
    };
    assert!(alter.previous_body.contains("(\"Name\")"));
    assert!(alter.body.contains("(\"FullName\")"));
}

#[test]
fn test_generator_is_not_built_without_procedures() {
    let built = Cell::new(false);
    let schema = model(vec![]);
    let ops = Differ::new(&schema, &schema)
        .with_procedures(
            || {
                built.set(true);
                ModificationCommandTreeGenerator
            },
            SqlBodyRenderer,
        )
        .diff()
        .unwrap();
    assert!(ops.is_empty());
    assert!(!built.get());
}

struct Failing;

impl CommandTreeGenerator for Failing {
    fn generate(
        &self,
        _schema: &Schema,
        _procedure: &Procedure,
    ) -> std::result::Result<Vec<CommandTree>, GenerateError> {
        Err(GenerateError::Other("no backend".to_string()))
    }
}

#[test]
fn test_generator_error_is_surfaced() {
    let old = model(vec![]);
    let new = model(vec![insert_customer("dbo", "Customer_Insert")]);

    let err = Differ::new(&old, &new)
        .with_procedures(|| Failing, SqlBodyRenderer)
        .diff()
        .unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"procedure `dbo.Customer_Insert`: no backend");
    assert!(matches!(err, DiffError::Procedure { .. }));
}
