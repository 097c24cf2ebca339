//! Modification procedure differencing.
//!
//! A procedure's body is never stored in the model. It is regenerated from
//! the procedure's target table and parameter bindings on both sides, in two
//! pluggable stages:
//!
//! 1. A [`CommandTreeGenerator`] turns the procedure into backend-neutral
//!    [`CommandTree`]s.
//! 2. A [`BodyRenderer`] turns the trees into body text.
//!
//! A procedure is altered when its parameter list or its rendered body
//! differs, so renaming a column a procedure writes also alters the
//! procedure even though nothing about the procedure itself changed.

use morph_schema::naming::{is_renamed, quote_ident, quote_qualified, same_schema};
use morph_schema::{Column, ModificationKind, Procedure, QualifiedName, Schema};
use tracing::debug;

use crate::error::{DiffError, GenerateError, Result};
use crate::operation::{AlterProcedure, CreateProcedure, DropProcedure, ParameterModel};
use crate::rename::{Relocation, Scope};

/// A column bound to a procedure parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub column: String,
    pub parameter: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertCommand {
    pub table: QualifiedName,
    pub values: Vec<Binding>,
    /// Store-generated columns read back after the insert
    pub returning: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCommand {
    pub table: QualifiedName,
    pub set: Vec<Binding>,
    pub predicate: Vec<Binding>,
    pub returning: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteCommand {
    pub table: QualifiedName,
    pub predicate: Vec<Binding>,
}

/// One modification statement, independent of any SQL dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandTree {
    Insert(InsertCommand),
    Update(UpdateCommand),
    Delete(DeleteCommand),
}

/// Produces the command trees a procedure executes.
pub trait CommandTreeGenerator {
    fn generate(
        &self,
        schema: &Schema,
        procedure: &Procedure,
    ) -> std::result::Result<Vec<CommandTree>, GenerateError>;
}

/// Renders command trees as procedure body text.
pub trait BodyRenderer {
    fn render(&self, trees: &[CommandTree]) -> String;
}

/// Builds one statement per procedure from its kind and parameter bindings.
///
/// - Insert writes every bound input column that the store does not generate,
///   and reads back the ones it does.
/// - Update and delete match rows on primary key and concurrency-token
///   (timestamp) columns.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModificationCommandTreeGenerator;

impl CommandTreeGenerator for ModificationCommandTreeGenerator {
    fn generate(
        &self,
        schema: &Schema,
        procedure: &Procedure,
    ) -> std::result::Result<Vec<CommandTree>, GenerateError> {
        let table = schema
            .get_table(&procedure.table)
            .ok_or_else(|| GenerateError::UnknownTable(procedure.table.clone()))?;

        let mut inputs: Vec<(&Column, Binding)> = Vec::new();
        for parameter in &procedure.parameters {
            let Some(column_id) = &parameter.column else {
                continue;
            };
            let column = table
                .get_column(column_id)
                .ok_or_else(|| GenerateError::UnknownColumn {
                    parameter: parameter.name.clone(),
                    column: column_id.clone(),
                })?;
            if parameter.is_output {
                continue;
            }
            inputs.push((
                column,
                Binding {
                    column: column.name.clone(),
                    parameter: parameter.name.clone(),
                },
            ));
        }

        let is_predicate =
            |c: &Column| table.primary_key.columns.contains(&c.id) || c.facets.is_timestamp;
        let names = |filter: fn(&Column) -> bool| -> Vec<String> {
            table
                .columns
                .iter()
                .filter(|c| filter(c))
                .map(|c| c.name.clone())
                .collect()
        };

        let tree = match procedure.kind {
            ModificationKind::Insert => CommandTree::Insert(InsertCommand {
                table: table.qualified_name(),
                values: inputs
                    .into_iter()
                    .filter(|(c, _)| !c.facets.is_store_generated())
                    .map(|(_, b)| b)
                    .collect(),
                returning: names(|c| c.facets.is_store_generated()),
            }),
            ModificationKind::Update => {
                let (predicate, set): (Vec<_>, Vec<_>) =
                    inputs.into_iter().partition(|(c, _)| is_predicate(c));
                CommandTree::Update(UpdateCommand {
                    table: table.qualified_name(),
                    set: set
                        .into_iter()
                        .filter(|(c, _)| !c.facets.is_store_generated())
                        .map(|(_, b)| b)
                        .collect(),
                    predicate: predicate.into_iter().map(|(_, b)| b).collect(),
                    returning: names(|c| c.facets.is_computed || c.facets.is_timestamp),
                })
            }
            ModificationKind::Delete => CommandTree::Delete(DeleteCommand {
                table: table.qualified_name(),
                predicate: inputs
                    .into_iter()
                    .filter(|(c, _)| is_predicate(c))
                    .map(|(_, b)| b)
                    .collect(),
            }),
        };
        Ok(vec![tree])
    }
}

/// Renders command trees as generic SQL with `@parameter` placeholders.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlBodyRenderer;

fn column_list(columns: impl IntoIterator<Item = impl AsRef<str>>) -> String {
    columns
        .into_iter()
        .map(|c| quote_ident(c.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn assignments(bindings: &[Binding], separator: &str) -> String {
    bindings
        .iter()
        .map(|b| format!("{} = @{}", quote_ident(&b.column), b.parameter))
        .collect::<Vec<_>>()
        .join(separator)
}

impl SqlBodyRenderer {
    fn render_tree(&self, tree: &CommandTree) -> String {
        let mut sql = String::new();
        match tree {
            CommandTree::Insert(insert) => {
                sql.push_str(&format!("INSERT INTO {}", quote_qualified(&insert.table)));
                if insert.values.is_empty() {
                    sql.push_str("\nDEFAULT VALUES");
                } else {
                    sql.push_str(&format!(
                        " ({})\nVALUES ({})",
                        column_list(insert.values.iter().map(|b| &b.column)),
                        insert
                            .values
                            .iter()
                            .map(|b| format!("@{}", b.parameter))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ));
                }
                if !insert.returning.is_empty() {
                    sql.push_str(&format!("\nRETURNING {}", column_list(&insert.returning)));
                }
            }
            CommandTree::Update(update) => {
                sql.push_str(&format!("UPDATE {}", quote_qualified(&update.table)));
                sql.push_str(&format!("\nSET {}", assignments(&update.set, ", ")));
                if !update.predicate.is_empty() {
                    sql.push_str(&format!(
                        "\nWHERE {}",
                        assignments(&update.predicate, " AND ")
                    ));
                }
                if !update.returning.is_empty() {
                    sql.push_str(&format!("\nRETURNING {}", column_list(&update.returning)));
                }
            }
            CommandTree::Delete(delete) => {
                sql.push_str(&format!("DELETE FROM {}", quote_qualified(&delete.table)));
                if !delete.predicate.is_empty() {
                    sql.push_str(&format!(
                        "\nWHERE {}",
                        assignments(&delete.predicate, " AND ")
                    ));
                }
            }
        }
        sql
    }
}

impl BodyRenderer for SqlBodyRenderer {
    fn render(&self, trees: &[CommandTree]) -> String {
        trees
            .iter()
            .map(|tree| self.render_tree(tree))
            .collect::<Vec<_>>()
            .join(";\n\n")
    }
}

type GeneratorFactory<'a> = Box<dyn FnOnce() -> Box<dyn CommandTreeGenerator + 'a> + 'a>;

/// A lazily built generator plus the renderer it feeds.
pub(crate) struct ProcedureSupport<'a> {
    factory: GeneratorFactory<'a>,
    renderer: Box<dyn BodyRenderer + 'a>,
}

/// Procedure operations for one diff, before rename ordering.
#[derive(Debug, Default)]
pub(crate) struct ProcedureChanges {
    pub drops: Vec<DropProcedure>,
    pub creates: Vec<CreateProcedure>,
    pub alters: Vec<AlterProcedure>,
    pub relocations: Vec<Relocation>,
}

impl<'a> ProcedureSupport<'a> {
    pub(crate) fn new<F, G, R>(factory: F, renderer: R) -> Self
    where
        F: FnOnce() -> G + 'a,
        G: CommandTreeGenerator + 'a,
        R: BodyRenderer + 'a,
    {
        Self {
            factory: Box::new(move || Box::new(factory()) as Box<dyn CommandTreeGenerator + 'a>),
            renderer: Box::new(renderer),
        }
    }

    pub(crate) fn diff(self, old: &Schema, new: &Schema) -> Result<ProcedureChanges> {
        if old.procedures.is_empty() && new.procedures.is_empty() {
            debug!("no procedures in either snapshot, generator not built");
            return Ok(ProcedureChanges::default());
        }
        let generator = (self.factory)();
        ProcedureDiffer {
            generator: generator.as_ref(),
            renderer: self.renderer.as_ref(),
        }
        .diff(old, new)
    }
}

struct ProcedureDiffer<'g> {
    generator: &'g dyn CommandTreeGenerator,
    renderer: &'g dyn BodyRenderer,
}

impl ProcedureDiffer<'_> {
    fn create(&self, schema: &Schema, procedure: &Procedure) -> Result<CreateProcedure> {
        let trees = self
            .generator
            .generate(schema, procedure)
            .map_err(|source| DiffError::Procedure {
                procedure: procedure.qualified_name(),
                source,
            })?;
        Ok(CreateProcedure {
            name: procedure.qualified_name(),
            parameters: procedure.parameters.iter().map(ParameterModel::from).collect(),
            body: self.renderer.render(&trees),
        })
    }

    fn diff(&self, old: &Schema, new: &Schema) -> Result<ProcedureChanges> {
        let mut changes = ProcedureChanges::default();

        for before in &old.procedures {
            let Some(after) = new.get_procedure(&before.id) else {
                changes.drops.push(self.create(old, before)?.inverse());
                continue;
            };

            if is_renamed(&before.name, &after.name)
                || !same_schema(before.schema.as_deref(), after.schema.as_deref())
            {
                changes.relocations.push(Relocation {
                    id: after.id.clone(),
                    from: Scope::schema(before.schema.as_deref()),
                    from_name: before.name.clone(),
                    to: Scope::schema(after.schema.as_deref()),
                    to_name: after.name.clone(),
                });
            }

            let previous = self.create(old, before)?;
            let current = self.create(new, after)?;
            if previous.parameters != current.parameters || previous.body != current.body {
                debug!(procedure = %current.name, "procedure altered");
                changes.alters.push(AlterProcedure {
                    name: current.name,
                    parameters: current.parameters,
                    body: current.body,
                    previous_parameters: previous.parameters,
                    previous_body: previous.body,
                });
            }
        }

        for after in &new.procedures {
            if old.get_procedure(&after.id).is_none() {
                changes.creates.push(self.create(new, after)?);
            }
        }

        Ok(changes)
    }
}
