//! Storage model differencing.
//!
//! [`Differ`] matches tables, columns and procedures across two snapshots by
//! [`StableId`]. Names are never used for matching. They only decide whether
//! a matched object was renamed:
//!
//! ```text
//! old: dbo.Customers (id Customer)     new: dbo.Clients (id Customer)
//!
//! ~ rename table dbo.Customers -> Clients
//! ```
//!
//! A pure change of letter case is not a rename and produces nothing.
//!
//! ## Keys and indexes
//!
//! Primary keys, foreign keys and indexes are compared by physical shape:
//! owning table, member columns, and (for indexes) uniqueness. Old column ids
//! are first translated through the column matching, so a key whose member
//! column is only being renamed is left alone. Foreign keys and indexes that
//! collapse onto the same shape are emitted once.
//!
//! ## Orphaned columns
//!
//! When an independent association turns into a scalar foreign-key property
//! (or back), the foreign-key column gets a new id and a new synthesized name
//! even though it holds the same data. For each foreign key whose association
//! id exists on the same table in both versions, dependent columns are paired
//! by position. An association-key column without an id match is paired with
//! its counterpart and renamed instead of dropped. A column id that now has two
//! candidates is left to the plain drop + add interpretation.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use morph_schema::naming::{self, is_renamed, same_schema};
use morph_schema::{Column, ForeignKey, QualifiedName, Schema, StableId, Table};
use tracing::{debug, debug_span, trace};

use crate::error::{DiffError, Result, Side};
use crate::operation::{
    AddColumn, AddForeignKey, AddPrimaryKey, AlterColumn, ColumnModel, CreateIndex, CreateTable,
    DropColumn, DropPrimaryKey, MoveProcedure, MoveTable, Operation, PrimaryKeyModel, RenameColumn,
    RenameProcedure, RenameTable,
};
use crate::options::DiffOptions;
use crate::procedure::{BodyRenderer, CommandTreeGenerator, ProcedureSupport};
use crate::rename::{Relocation, RenameOrderer, Scope, Step};
use crate::solver::{OperationOrderer, VirtualSchema};

/// Computes the operations that turn one snapshot into another.
///
/// ```
/// use morph::{Differ, DiffOptions};
/// use morph_schema::Schema;
///
/// let old = Schema::new();
/// let new = Schema::new().manifest("2008");
/// let ops = Differ::new(&old, &new)
///     .with_options(DiffOptions::default().index_foreign_keys(false))
///     .diff()
///     .unwrap();
/// assert!(ops.is_empty());
/// ```
pub struct Differ<'a> {
    old: &'a Schema,
    new: &'a Schema,
    options: DiffOptions,
    procedures: Option<ProcedureSupport<'a>>,
}

impl<'a> Differ<'a> {
    pub fn new(old: &'a Schema, new: &'a Schema) -> Self {
        Self {
            old,
            new,
            options: DiffOptions::default(),
            procedures: None,
        }
    }

    pub fn with_options(mut self, options: DiffOptions) -> Self {
        self.options = options;
        self
    }

    /// Enable procedure diffing.
    ///
    /// `generator` is called at most once, and only if either snapshot has
    /// procedures. Without this, procedures are ignored entirely.
    pub fn with_procedures<F, G, R>(mut self, generator: F, renderer: R) -> Self
    where
        F: FnOnce() -> G + 'a,
        G: CommandTreeGenerator + 'a,
        R: BodyRenderer + 'a,
    {
        self.procedures = Some(ProcedureSupport::new(generator, renderer));
        self
    }

    /// Produce the ordered operation sequence.
    pub fn diff(self) -> Result<Vec<Operation>> {
        let _span = debug_span!(
            "diff",
            old_tables = self.old.tables.len(),
            new_tables = self.new.tables.len()
        )
        .entered();

        let old = Snapshot::new(self.old, Side::Old)?;
        let new = Snapshot::new(self.new, Side::New)?;
        check_column_owners(&old, &new)?;

        let verify = self.options.verify;
        let with_procedures = self.procedures.is_some();
        let operations = StorageDiff::new(old, new, self.options).run(self.procedures)?;

        if verify {
            let mut simulated = VirtualSchema::from_schema(self.old);
            simulated.replay(&operations)?;
            simulated.ensure_matches(self.new, with_procedures)?;
        }

        debug!(operations = operations.len(), "diff complete");
        Ok(operations)
    }
}

/// Identity-indexed view of one snapshot.
struct Snapshot<'a> {
    schema: &'a Schema,
    tables: IndexMap<&'a StableId, &'a Table>,
    /// Owning table of every column
    columns: HashMap<&'a StableId, &'a Table>,
}

impl<'a> Snapshot<'a> {
    fn new(schema: &'a Schema, side: Side) -> Result<Self> {
        schema
            .validate()
            .map_err(|source| DiffError::InvalidSnapshot { side, source })?;

        let mut tables = IndexMap::new();
        let mut columns = HashMap::new();
        for table in &schema.tables {
            tables.insert(&table.id, table);
            for column in &table.columns {
                columns.insert(&column.id, table);
            }
        }
        Ok(Self {
            schema,
            tables,
            columns,
        })
    }

    fn table_name(&self, id: &StableId) -> QualifiedName {
        match self.tables.get(id) {
            Some(table) => table.qualified_name(),
            None => QualifiedName::new(None, id.as_str()),
        }
    }
}

/// A column id may not hop between tables.
fn check_column_owners(old: &Snapshot<'_>, new: &Snapshot<'_>) -> Result<()> {
    for table in old.schema.tables.iter() {
        for column in &table.columns {
            let Some(owner) = new.columns.get(&column.id) else {
                continue;
            };
            if owner.id != table.id {
                return Err(DiffError::ModelIncompatible {
                    id: column.id.clone(),
                    reason: format!(
                        "column moved from table `{}` to table `{}`",
                        table.qualified_name(),
                        owner.qualified_name()
                    ),
                });
            }
        }
    }
    Ok(())
}

/// A column as seen from the new snapshot's point of view.
///
/// Old columns that survive are translated to their new id. Old columns that
/// do not survive stay distinct from every new column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ColumnKey<'a> {
    Kept(&'a StableId),
    Gone(&'a StableId),
}

type ForeignKeyKey<'a> = (
    &'a StableId,
    Vec<ColumnKey<'a>>,
    &'a StableId,
    Vec<ColumnKey<'a>>,
);

type IndexKey<'a> = (&'a StableId, Vec<ColumnKey<'a>>, bool);

#[derive(Clone, Copy)]
struct ForeignKeyEntry<'a> {
    table: &'a Table,
    fk: &'a ForeignKey,
}

struct IndexEntry<'a> {
    table: &'a Table,
    name: Option<&'a str>,
    columns: &'a [StableId],
    unique: bool,
    explicit: bool,
    /// Foreign keys this index serves
    backs: Vec<ForeignKeyKey<'a>>,
}

struct ForeignKeys<'a> {
    rebuilt: HashSet<ForeignKeyKey<'a>>,
}

/// How the columns of one matched table line up across versions.
#[derive(Default)]
struct ColumnPairing<'a> {
    /// (old, new), in old column order
    pairs: Vec<(&'a Column, &'a Column)>,
    dropped: Vec<&'a Column>,
    added: Vec<&'a Column>,
}

fn pair_columns<'a>(old: &'a Table, new: &'a Table) -> ColumnPairing<'a> {
    let mut candidates: Vec<(&'a Column, &'a Column)> = Vec::new();
    for old_fk in &old.foreign_keys {
        let Some(new_fk) = new.foreign_keys.iter().find(|fk| fk.id == old_fk.id) else {
            continue;
        };
        if old_fk.dependent_columns.len() != new_fk.dependent_columns.len() {
            continue;
        }
        for (old_id, new_id) in old_fk
            .dependent_columns
            .iter()
            .zip(&new_fk.dependent_columns)
        {
            if old_id == new_id {
                continue;
            }
            let (Some(o), Some(n)) = (old.get_column(old_id), new.get_column(new_id)) else {
                continue;
            };
            let collapse = o.is_association_key() && !new.has_column(&o.id);
            let expansion = n.is_association_key() && !old.has_column(&n.id);
            if (collapse || expansion)
                && !candidates
                    .iter()
                    .any(|(co, cn)| co.id == o.id && cn.id == n.id)
            {
                candidates.push((o, n));
            }
        }
    }

    // A column wanted by two candidates is ambiguous; neither claim holds.
    let claims: Vec<(&'a Column, &'a Column)> = candidates
        .iter()
        .copied()
        .filter(|(o, n)| {
            let ambiguous = candidates
                .iter()
                .filter(|(co, cn)| co.id == o.id || cn.id == n.id)
                .count()
                > 1;
            if ambiguous {
                debug!(old = %o.name, new = %n.name, "ambiguous orphaned column, not renaming");
            }
            !ambiguous
        })
        .collect();
    let claimed_new: HashSet<&StableId> = claims.iter().map(|(_, n)| &n.id).collect();

    let mut pairing = ColumnPairing::default();
    for o in &old.columns {
        if let Some(&(_, n)) = claims.iter().find(|(co, _)| co.id == o.id) {
            pairing.pairs.push((o, n));
            continue;
        }
        match new.get_column(&o.id) {
            Some(n) if !claimed_new.contains(&n.id) => pairing.pairs.push((o, n)),
            _ => pairing.dropped.push(o),
        }
    }

    let paired: HashSet<&StableId> = pairing.pairs.iter().map(|(_, n)| &n.id).collect();
    pairing.added = new
        .columns
        .iter()
        .filter(|n| !paired.contains(&n.id))
        .collect();
    pairing
}

fn create_table(table: &Table) -> CreateTable {
    let primary_key = if table.primary_key.columns.is_empty() {
        None
    } else {
        Some(PrimaryKeyModel {
            name: table.primary_key_name(),
            columns: table.column_names(&table.primary_key.columns),
        })
    };
    CreateTable {
        name: table.qualified_name(),
        columns: table.columns.iter().map(ColumnModel::from).collect(),
        primary_key,
    }
}

/// Working state for one diff call.
struct StorageDiff<'a> {
    old: Snapshot<'a>,
    new: Snapshot<'a>,
    options: DiffOptions,
    /// Matched tables, in old snapshot order
    matched: Vec<(&'a Table, &'a Table)>,
    /// Old column id -> new column id, for every surviving column
    translate: HashMap<&'a StableId, &'a StableId>,
    /// New ids of columns whose type or facets change
    altered: HashSet<&'a StableId>,
    /// Tables whose primary key is dropped and re-added
    rebuilt_keys: HashSet<&'a StableId>,
    orderer: OperationOrderer,
}

impl<'a> StorageDiff<'a> {
    fn new(old: Snapshot<'a>, new: Snapshot<'a>, options: DiffOptions) -> Self {
        Self {
            old,
            new,
            options,
            matched: Vec::new(),
            translate: HashMap::new(),
            altered: HashSet::new(),
            rebuilt_keys: HashSet::new(),
            orderer: OperationOrderer::default(),
        }
    }

    fn run(mut self, procedures: Option<ProcedureSupport<'a>>) -> Result<Vec<Operation>> {
        let (dropped, added) = self.match_tables();

        let mut column_relocations = Vec::new();
        let mut live_columns = Vec::new();
        for (old_table, new_table) in self.matched.clone() {
            self.diff_columns(
                old_table,
                new_table,
                &mut column_relocations,
                &mut live_columns,
            )?;
        }

        self.diff_primary_keys();
        let foreign_keys = self.diff_foreign_keys();
        self.diff_indexes(&foreign_keys);

        self.order_tables(&dropped, &added)?;
        self.order_columns(&column_relocations, live_columns)?;

        match procedures {
            Some(support) => self.diff_procedures(support)?,
            None => debug!("procedure diffing disabled"),
        }

        let operations = self.orderer.into_operations();
        for op in &operations {
            trace!(%op, "emit");
        }
        Ok(operations)
    }

    fn snapshot(&self, side: Side) -> &Snapshot<'a> {
        match side {
            Side::Old => &self.old,
            Side::New => &self.new,
        }
    }

    fn column_key(&self, side: Side, id: &'a StableId) -> ColumnKey<'a> {
        match side {
            Side::New => ColumnKey::Kept(id),
            Side::Old => match self.translate.get(id) {
                Some(new_id) => ColumnKey::Kept(new_id),
                None => ColumnKey::Gone(id),
            },
        }
    }

    fn column_keys(&self, side: Side, ids: &'a [StableId]) -> Vec<ColumnKey<'a>> {
        ids.iter().map(|id| self.column_key(side, id)).collect()
    }

    /// Split tables into dropped, matched and added.
    fn match_tables(&mut self) -> (Vec<&'a Table>, Vec<&'a Table>) {
        let mut dropped = Vec::new();
        for (id, &old_table) in &self.old.tables {
            match self.new.tables.get(id) {
                Some(&new_table) => self.matched.push((old_table, new_table)),
                None => dropped.push(old_table),
            }
        }
        let added: Vec<&'a Table> = self
            .new
            .tables
            .iter()
            .filter(|(id, _)| !self.old.tables.contains_key(*id))
            .map(|(_, &table)| table)
            .collect();

        debug!(
            dropped = dropped.len(),
            matched = self.matched.len(),
            added = added.len(),
            "matched tables by identity"
        );
        (dropped, added)
    }

    fn diff_columns(
        &mut self,
        old_table: &'a Table,
        new_table: &'a Table,
        relocations: &mut Vec<Relocation>,
        live: &mut Vec<(Scope, &'a str, &'a StableId)>,
    ) -> Result<()> {
        let table = new_table.qualified_name();
        let scope = Scope::table(&new_table.id);
        let pairing = pair_columns(old_table, new_table);

        let mut claimed: Vec<&str> = pairing.added.iter().map(|c| c.name.as_str()).collect();
        for &(o, n) in &pairing.pairs {
            self.translate.insert(&o.id, &n.id);
            // The pair is known by its new id from here on.
            live.push((scope.clone(), o.name.as_str(), &n.id));

            if is_renamed(&o.name, &n.name) {
                claimed.push(n.name.as_str());
                relocations.push(Relocation {
                    id: n.id.clone(),
                    from: scope.clone(),
                    from_name: o.name.clone(),
                    to: scope.clone(),
                    to_name: n.name.clone(),
                });
            }

            if o.kind != n.kind || o.facets != n.facets {
                if o.facets.is_identity != n.facets.is_identity {
                    return Err(DiffError::ModelIncompatible {
                        id: n.id.clone(),
                        reason: format!(
                            "column `{}.{}` cannot gain or lose its identity specification",
                            table, n.name
                        ),
                    });
                }
                self.altered.insert(&n.id);
                self.orderer.alter_columns.push(AlterColumn {
                    table: table.clone(),
                    column: ColumnModel::from(n),
                    previous: ColumnModel::from(o).with_name(n.name.clone()),
                });
            }
        }

        for &o in &pairing.dropped {
            let drop = DropColumn {
                table: table.clone(),
                name: o.name.clone(),
                inverse: AddColumn {
                    table: table.clone(),
                    column: ColumnModel::from(o),
                },
            };
            if claimed.iter().any(|name| naming::same_slot(name, &o.name)) {
                self.orderer.vacating_column_drops.push(drop);
            } else {
                live.push((scope.clone(), o.name.as_str(), &o.id));
                self.orderer.drop_columns.push(drop);
            }
        }

        for &n in &pairing.added {
            self.orderer.add_columns.push(AddColumn {
                table: table.clone(),
                column: ColumnModel::from(n),
            });
        }
        Ok(())
    }

    fn diff_primary_keys(&mut self) {
        for (old_table, new_table) in self.matched.clone() {
            let old_key = self.column_keys(Side::Old, &old_table.primary_key.columns);
            let new_key = self.column_keys(Side::New, &new_table.primary_key.columns);
            let member_altered = new_table
                .primary_key
                .columns
                .iter()
                .any(|c| self.altered.contains(c));
            if old_key == new_key && !member_altered {
                continue;
            }

            debug!(table = %new_table.qualified_name(), "primary key rebuilt");
            self.rebuilt_keys.insert(&new_table.id);
            if !old_table.primary_key.columns.is_empty() {
                self.orderer.drop_primary_keys.push(DropPrimaryKey {
                    table: old_table.qualified_name(),
                    name: old_table.primary_key_name(),
                    columns: old_table.column_names(&old_table.primary_key.columns),
                });
            }
            if !new_table.primary_key.columns.is_empty() {
                self.orderer.add_primary_keys.push(AddPrimaryKey {
                    table: new_table.qualified_name(),
                    name: new_table.primary_key_name(),
                    columns: new_table.column_names(&new_table.primary_key.columns),
                });
            }
        }
    }

    fn foreign_key_key(
        &self,
        side: Side,
        table: &'a Table,
        fk: &'a ForeignKey,
    ) -> ForeignKeyKey<'a> {
        (
            &table.id,
            self.column_keys(side, &fk.dependent_columns),
            &fk.principal_table,
            self.column_keys(side, &fk.principal_columns),
        )
    }

    /// Physical foreign keys of one side. The first of several associations
    /// with the same shape wins.
    fn collect_foreign_keys(&self, side: Side) -> IndexMap<ForeignKeyKey<'a>, ForeignKeyEntry<'a>> {
        let mut fks = IndexMap::new();
        let tables: Vec<&'a Table> = self.snapshot(side).tables.values().copied().collect();
        for table in tables {
            for fk in &table.foreign_keys {
                fks.entry(self.foreign_key_key(side, table, fk))
                    .or_insert(ForeignKeyEntry { table, fk });
            }
        }
        fks
    }

    fn foreign_key_model(&self, side: Side, entry: ForeignKeyEntry<'a>) -> AddForeignKey {
        let snapshot = self.snapshot(side);
        let ForeignKeyEntry { table, fk } = entry;
        let dependent_table = table.qualified_name();
        let principal_table = snapshot.table_name(&fk.principal_table);
        let dependent_columns = table.column_names(&fk.dependent_columns);
        let principal_columns = snapshot
            .tables
            .get(&fk.principal_table)
            .map(|t| t.column_names(&fk.principal_columns))
            .unwrap_or_default();
        let name = fk.name.clone().unwrap_or_else(|| {
            naming::foreign_key_name(&dependent_table, &principal_table, &dependent_columns)
        });
        AddForeignKey {
            name,
            dependent_table,
            dependent_columns,
            principal_table,
            principal_columns,
            cascade_delete: fk.cascade_delete,
        }
    }

    fn diff_foreign_keys(&mut self) -> ForeignKeys<'a> {
        let old_fks = self.collect_foreign_keys(Side::Old);
        let new_fks = self.collect_foreign_keys(Side::New);

        let mut rebuilt = HashSet::new();
        for (key, old_entry) in &old_fks {
            let Some(new_entry) = new_fks.get(key) else {
                continue;
            };
            if old_entry.fk.cascade_delete != new_entry.fk.cascade_delete
                || self.rebuilt_keys.contains(&new_entry.fk.principal_table)
            {
                rebuilt.insert(key.clone());
            }
        }

        for (key, &entry) in &old_fks {
            if new_fks.contains_key(key) && !rebuilt.contains(key) {
                continue;
            }
            let add = self.foreign_key_model(Side::Old, entry);
            self.orderer.drop_foreign_keys.push(add.inverse());
        }
        for (key, &entry) in &new_fks {
            if old_fks.contains_key(key) && !rebuilt.contains(key) {
                continue;
            }
            let add = self.foreign_key_model(Side::New, entry);
            self.orderer.add_foreign_keys.push(add);
        }

        ForeignKeys { rebuilt }
    }

    /// Physical indexes of one side: explicit ones, then one per foreign key
    /// when enabled. Identical shapes merge.
    fn collect_indexes(&self, side: Side) -> IndexMap<IndexKey<'a>, IndexEntry<'a>> {
        let mut indexes: IndexMap<IndexKey<'a>, IndexEntry<'a>> = IndexMap::new();
        let tables: Vec<&'a Table> = self.snapshot(side).tables.values().copied().collect();
        for table in tables {
            for index in &table.indexes {
                let key = (
                    &table.id,
                    self.column_keys(side, &index.columns),
                    index.unique,
                );
                indexes.entry(key).or_insert_with(|| IndexEntry {
                    table,
                    name: index.name.as_deref(),
                    columns: &index.columns,
                    unique: index.unique,
                    explicit: true,
                    backs: Vec::new(),
                });
            }

            if !self.options.index_foreign_keys {
                continue;
            }
            for fk in &table.foreign_keys {
                let fk_key = self.foreign_key_key(side, table, fk);
                let key = (&table.id, fk_key.1.clone(), false);
                indexes
                    .entry(key)
                    .or_insert_with(|| IndexEntry {
                        table,
                        name: None,
                        columns: &fk.dependent_columns,
                        unique: false,
                        explicit: false,
                        backs: Vec::new(),
                    })
                    .backs
                    .push(fk_key);
            }
        }
        indexes
    }

    fn index_model(entry: &IndexEntry<'a>) -> CreateIndex {
        let columns = entry.table.column_names(entry.columns);
        let name = match entry.name {
            Some(name) => name.to_string(),
            None => naming::index_name(&columns),
        };
        CreateIndex {
            table: entry.table.qualified_name(),
            name,
            columns,
            unique: entry.unique,
        }
    }

    fn diff_indexes(&mut self, foreign_keys: &ForeignKeys<'a>) {
        let old_indexes = self.collect_indexes(Side::Old);
        let new_indexes = self.collect_indexes(Side::New);

        let rebuilt: HashSet<&IndexKey<'a>> = new_indexes
            .iter()
            .filter(|(key, _)| old_indexes.contains_key(*key))
            .filter(|(_, entry)| {
                (entry.explicit && entry.columns.iter().any(|c| self.altered.contains(c)))
                    || entry
                        .backs
                        .iter()
                        .any(|fk| foreign_keys.rebuilt.contains(fk))
            })
            .map(|(key, _)| key)
            .collect();

        for (key, entry) in &old_indexes {
            if new_indexes.contains_key(key) && !rebuilt.contains(key) {
                continue;
            }
            let drop = Self::index_model(entry).inverse();
            self.orderer.drop_indexes.push(drop);
        }
        for (key, entry) in &new_indexes {
            if old_indexes.contains_key(key) && !rebuilt.contains(key) {
                continue;
            }
            self.orderer.create_indexes.push(Self::index_model(entry));
        }
    }

    /// Table drops, creates, and the rename/move batch.
    fn order_tables(&mut self, dropped: &[&'a Table], added: &[&'a Table]) -> Result<()> {
        let mut claimed: Vec<QualifiedName> = added.iter().map(|t| t.qualified_name()).collect();
        let mut relocations = Vec::new();
        for &(old_table, new_table) in &self.matched {
            let renamed = is_renamed(&old_table.name, &new_table.name);
            let moved = !same_schema(old_table.schema.as_deref(), new_table.schema.as_deref());
            if !renamed && !moved {
                continue;
            }
            claimed.push(new_table.qualified_name());
            if renamed {
                claimed.push(old_table.qualified_name().with_name(new_table.name.clone()));
            }
            relocations.push(Relocation {
                id: new_table.id.clone(),
                from: Scope::schema(old_table.schema.as_deref()),
                from_name: old_table.name.clone(),
                to: Scope::schema(new_table.schema.as_deref()),
                to_name: new_table.name.clone(),
            });
        }

        let mut live: Vec<&'a Table> = self.matched.iter().map(|&(old, _)| old).collect();
        for &table in dropped {
            let name = table.qualified_name();
            let drop = create_table(table).inverse();
            if claimed.iter().any(|c| c.same_slot(&name)) {
                self.orderer.vacating_table_drops.push(drop);
            } else {
                live.push(table);
                self.orderer.drop_tables.push(drop);
            }
        }

        let mut orderer = RenameOrderer::new(
            self.options.temp_name_prefix.clone(),
            live.iter()
                .map(|t| (Scope::schema(t.schema.as_deref()), t.name.as_str(), &t.id)),
        );
        for step in orderer.order(&relocations)? {
            let op = match step {
                Step::Rename {
                    scope, from, to, ..
                } => Operation::RenameTable(RenameTable {
                    name: QualifiedName::new(scope.display(), from),
                    new_name: to,
                }),
                Step::Move { id, from, name, to } => {
                    let mut create_table = match self.new.tables.get(&id) {
                        Some(table) => create_table(table),
                        None => continue,
                    };
                    create_table.name = QualifiedName::new(to.display(), name.clone());
                    Operation::MoveTable(MoveTable {
                        name: QualifiedName::new(from.display(), name),
                        new_schema: to.display().map(str::to_string),
                        create_table,
                    })
                }
            };
            self.orderer.table_relocations.push(op);
        }

        for &table in added {
            self.orderer.create_tables.push(create_table(table));
        }
        Ok(())
    }

    fn order_columns(
        &mut self,
        relocations: &[Relocation],
        live: Vec<(Scope, &'a str, &'a StableId)>,
    ) -> Result<()> {
        let mut orderer = RenameOrderer::new(self.options.temp_name_prefix.clone(), live);
        for step in orderer.order(relocations)? {
            // Columns never change scope, so only renames come back.
            let Step::Rename { id, from, to, .. } = step else {
                continue;
            };
            let Some(table) = self.new.columns.get(&id) else {
                continue;
            };
            self.orderer.column_renames.push(RenameColumn {
                table: table.qualified_name(),
                name: from,
                new_name: to,
            });
        }
        Ok(())
    }

    fn diff_procedures(&mut self, support: ProcedureSupport<'a>) -> Result<()> {
        let changes = support.diff(self.old.schema, self.new.schema)?;

        let live = self
            .old
            .schema
            .procedures
            .iter()
            .filter(|p| self.new.schema.get_procedure(&p.id).is_some())
            .map(|p| (Scope::schema(p.schema.as_deref()), p.name.as_str(), &p.id));
        let mut orderer = RenameOrderer::new(self.options.temp_name_prefix.clone(), live);
        for step in orderer.order(&changes.relocations)? {
            let op = match step {
                Step::Rename {
                    scope, from, to, ..
                } => Operation::RenameProcedure(RenameProcedure {
                    name: QualifiedName::new(scope.display(), from),
                    new_name: to,
                }),
                Step::Move { from, name, to, .. } => Operation::MoveProcedure(MoveProcedure {
                    name: QualifiedName::new(from.display(), name),
                    new_schema: to.display().map(str::to_string),
                }),
            };
            self.orderer.procedure_relocations.push(op);
        }

        self.orderer.drop_procedures.extend(changes.drops);
        self.orderer.create_procedures.extend(changes.creates);
        self.orderer.alter_procedures.extend(changes.alters);
        Ok(())
    }
}
