//! Rename ordering.
//!
//! Renames and moves in one batch can depend on each other: `A -> B` cannot
//! run while `B` still holds the name, and a rotation like
//! `Foo1 -> Baz1, Bar1 -> Foo1, Baz1 -> Bar1` can never run in any order
//! without a placeholder.
//!
//! The orderer works over a registry of live names per scope (a schema for
//! tables and procedures, a table for columns), each held by one object:
//!
//! 1. A rename whose source is the target of a *later* rename in the same
//!    scope is diverted to a temporary name. If the object also moves, the
//!    move carries the temporary name. The temporary -> final rename is
//!    appended after the batch, in the scope the object ends up in.
//! 2. The steps are scheduled with a progress loop. Each pass applies every
//!    pending step whose source is held by the step's own object and whose
//!    target is free.
//! 3. If a pass makes no progress, a blocked step's occupant is renamed to a
//!    temporary in place and scheduling resumes. If nothing can be displaced,
//!    the batch is reported as a cycle.
//!
//! Every emitted step only claims a name that is free at that moment.

use std::collections::{HashMap, HashSet};

use morph_schema::StableId;
use morph_schema::naming::slot_key;
use tracing::debug;

use crate::solver::SolverError;

/// A namespace inside which names are unique.
///
/// Compared by `key`. `display` is the schema name to put into operations,
/// if any.
#[derive(Debug, Clone)]
pub struct Scope {
    key: String,
    display: Option<String>,
}

impl Scope {
    /// The scope of tables or procedures in a schema.
    pub fn schema(schema: Option<&str>) -> Self {
        Self {
            key: match schema {
                Some(schema) => format!("schema:{}", slot_key(schema)),
                None => "schema".to_string(),
            },
            display: schema.map(str::to_string),
        }
    }

    /// The scope of columns in a table.
    pub fn table(table: &StableId) -> Self {
        Self {
            key: format!("table:{}", table),
            display: None,
        }
    }

    pub fn display(&self) -> Option<&str> {
        self.display.as_deref()
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Scope {}

impl std::hash::Hash for Scope {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

/// An object that changes name, scope, or both.
#[derive(Debug, Clone)]
pub struct Relocation {
    /// Identity of the object being relocated
    pub id: StableId,
    pub from: Scope,
    pub from_name: String,
    pub to: Scope,
    pub to_name: String,
}

/// One emitted step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Change the name inside a scope.
    Rename {
        id: StableId,
        scope: Scope,
        from: String,
        to: String,
    },
    /// Move to another scope, keeping the name.
    Move {
        id: StableId,
        from: Scope,
        name: String,
        to: Scope,
    },
}

impl Step {
    pub fn id(&self) -> &StableId {
        match self {
            Step::Rename { id, .. } | Step::Move { id, .. } => id,
        }
    }

    fn source(&self) -> (&Scope, &str) {
        match self {
            Step::Rename { scope, from, .. } => (scope, from),
            Step::Move { from, name, .. } => (from, name),
        }
    }

    fn target(&self) -> (&Scope, &str) {
        match self {
            Step::Rename { scope, to, .. } => (scope, to),
            Step::Move { to, name, .. } => (to, name),
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Rename { scope, from, to, .. } => {
                write!(f, "rename {} -> {} in {}", from, to, scope.key)
            }
            Step::Move { from, name, to, .. } => {
                write!(f, "move {} from {} to {}", name, from.key, to.key)
            }
        }
    }
}

/// Live names per scope, and the object holding each.
#[derive(Debug, Clone, Default)]
struct Registry {
    names: HashMap<(String, String), StableId>,
}

impl Registry {
    fn slot(scope: &Scope, name: &str) -> (String, String) {
        (scope.key.clone(), slot_key(name))
    }

    fn contains(&self, scope: &Scope, name: &str) -> bool {
        self.names.contains_key(&Self::slot(scope, name))
    }

    fn holds(&self, scope: &Scope, name: &str, id: &StableId) -> bool {
        self.names.get(&Self::slot(scope, name)) == Some(id)
    }

    fn insert(&mut self, scope: &Scope, name: &str, id: StableId) {
        self.names.insert(Self::slot(scope, name), id);
    }

    fn can_apply(&self, step: &Step) -> bool {
        let (source_scope, source) = step.source();
        let (target_scope, target) = step.target();
        self.holds(source_scope, source, step.id()) && !self.contains(target_scope, target)
    }

    fn apply(&mut self, step: &Step) {
        let (source_scope, source) = step.source();
        let (target_scope, target) = step.target();
        if let Some(id) = self.names.remove(&Self::slot(source_scope, source)) {
            self.insert(target_scope, target, id);
        }
    }
}

/// Orders one family of renames and moves (tables, columns, or procedures).
///
/// The temporary-name counter lives as long as the orderer, so one orderer
/// per family and diff call gives `prefix0`, `prefix1`, ... in emission order.
#[derive(Debug)]
pub struct RenameOrderer {
    prefix: String,
    counter: usize,
    registry: Registry,
    /// Names some step will claim, per scope. Temporaries must avoid them.
    reserved: HashSet<(String, String)>,
}

impl RenameOrderer {
    /// Create an orderer whose registry holds the given live names, each
    /// with the identity of the object holding it.
    pub fn new<'a>(
        prefix: impl Into<String>,
        occupied: impl IntoIterator<Item = (Scope, &'a str, &'a StableId)>,
    ) -> Self {
        let mut registry = Registry::default();
        for (scope, name, id) in occupied {
            registry.insert(&scope, name, id.clone());
        }
        Self {
            prefix: prefix.into(),
            counter: 0,
            registry,
            reserved: HashSet::new(),
        }
    }

    /// Order a batch of relocations.
    pub fn order(&mut self, relocations: &[Relocation]) -> Result<Vec<Step>, SolverError> {
        let mut head = expand(relocations);
        let finals: HashSet<_> = relocations
            .iter()
            .map(|r| Registry::slot(&r.to, &r.to_name))
            .collect();
        for step in &head {
            let (scope, name) = step.target();
            self.reserved.insert(Registry::slot(scope, name));
        }

        // Divert renames whose source a later rename wants, or whose target
        // will never free up.
        let mut tail = Vec::new();
        for i in 0..head.len() {
            let Step::Rename { id, scope, from, to } = &head[i] else {
                continue;
            };
            // The object's own move, if any, directly follows its rename.
            let moved_to = match head.get(i + 1) {
                Some(Step::Move {
                    id: next,
                    to: target,
                    ..
                }) if next == id => Some(target.clone()),
                _ => None,
            };

            let wanted_later = head[i + 1..].iter().any(|later| {
                matches!(later, Step::Rename { scope: s, to: t, .. }
                    if s == scope && Registry::slot(s, t) == Registry::slot(scope, from))
            });
            // A moving object only passes through its new name in the old
            // scope. Someone staying there, or ending up there, keeps it.
            let passing = Registry::slot(scope, to);
            let passing_blocked = moved_to.is_some()
                && (finals.contains(&passing)
                    || self
                        .registry
                        .names
                        .get(&passing)
                        .is_some_and(|holder| !head.iter().any(|step| step.id() == holder)));
            if !wanted_later && !passing_blocked {
                continue;
            }

            let landing = moved_to.clone().unwrap_or_else(|| scope.clone());

            let temp = self.next_temp(&[scope, &landing]);
            debug!(%from, %to, %temp, "diverting rename through placeholder");
            tail.push(Step::Rename {
                id: id.clone(),
                scope: landing,
                from: temp.clone(),
                to: to.clone(),
            });
            if moved_to.is_some()
                && let Some(Step::Move { name, .. }) = head.get_mut(i + 1)
            {
                *name = temp.clone();
            }
            if let Step::Rename { to, .. } = &mut head[i] {
                *to = temp;
            }
        }

        head.extend(tail);
        self.schedule(head)
    }

    fn schedule(&mut self, mut pending: Vec<Step>) -> Result<Vec<Step>, SolverError> {
        let mut ordered = Vec::with_capacity(pending.len());

        // Each displacement emits a step and unblocks another, so this is bounded.
        let max_displacements = pending.len() + 1;
        let mut displacements = 0;

        while !pending.is_empty() {
            let mut made_progress = false;
            let mut remaining = Vec::with_capacity(pending.len());

            for step in pending {
                if self.registry.can_apply(&step) {
                    self.registry.apply(&step);
                    ordered.push(step);
                    made_progress = true;
                } else {
                    remaining.push(step);
                }
            }
            pending = remaining;

            if made_progress || pending.is_empty() {
                continue;
            }

            displacements += 1;
            if displacements > max_displacements || !self.displace(&mut pending, &mut ordered) {
                return Err(SolverError::CycleDetected {
                    changes: pending.iter().map(|s| s.to_string()).collect(),
                });
            }
        }

        Ok(ordered)
    }

    /// Unblock a stuck batch by renaming the occupant of some pending step's
    /// target to a temporary. Returns false if no such occupant exists.
    fn displace(&mut self, pending: &mut Vec<Step>, ordered: &mut Vec<Step>) -> bool {
        let blocker = pending.iter().enumerate().find_map(|(i, step)| {
            let (source_scope, source) = step.source();
            if !self.registry.holds(source_scope, source, step.id()) {
                return None;
            }
            let (target_scope, target) = step.target();
            pending.iter().position(|other| {
                let (scope, name) = other.source();
                scope == target_scope
                    && Registry::slot(scope, name) == Registry::slot(target_scope, target)
                    && self.registry.holds(scope, name, other.id())
            })
            .filter(|&j| j != i)
        });

        let Some(j) = blocker else {
            return false;
        };

        let (scope, name) = pending[j].source();
        let (scope, name) = (scope.clone(), name.to_string());
        let (landing, _) = pending[j].target();
        let landing = landing.clone();
        let temp = self.next_temp(&[&scope, &landing]);
        debug!(%name, %temp, "displacing occupant through placeholder");

        let displaced = Step::Rename {
            id: pending[j].id().clone(),
            scope: scope.clone(),
            from: name.clone(),
            to: temp.clone(),
        };
        self.registry.apply(&displaced);
        ordered.push(displaced);

        let rewritten = match &pending[j] {
            Step::Rename { id, scope, to, .. } => vec![Step::Rename {
                id: id.clone(),
                scope: scope.clone(),
                from: temp,
                to: to.clone(),
            }],
            Step::Move { id, from, to, .. } => vec![
                Step::Move {
                    id: id.clone(),
                    from: from.clone(),
                    name: temp.clone(),
                    to: to.clone(),
                },
                Step::Rename {
                    id: id.clone(),
                    scope: to.clone(),
                    from: temp,
                    to: name,
                },
            ],
        };
        pending.splice(j..=j, rewritten);
        true
    }

    /// Next placeholder name not live and not claimed in any of `scopes`.
    fn next_temp(&mut self, scopes: &[&Scope]) -> String {
        loop {
            let candidate = format!("{}{}", self.prefix, self.counter);
            self.counter += 1;
            let slots: Vec<_> = scopes
                .iter()
                .map(|scope| Registry::slot(scope, &candidate))
                .collect();
            let free = slots.iter().all(|slot| {
                !self.registry.names.contains_key(slot) && !self.reserved.contains(slot)
            });
            if free {
                self.reserved.extend(slots);
                return candidate;
            }
        }
    }
}

/// Split relocations into steps: rename in the old scope, then move.
fn expand(relocations: &[Relocation]) -> Vec<Step> {
    let mut steps = Vec::new();
    for r in relocations {
        let renamed = morph_schema::naming::is_renamed(&r.from_name, &r.to_name);
        if renamed {
            steps.push(Step::Rename {
                id: r.id.clone(),
                scope: r.from.clone(),
                from: r.from_name.clone(),
                to: r.to_name.clone(),
            });
        }
        if r.from != r.to {
            let name = if renamed { &r.to_name } else { &r.from_name };
            steps.push(Step::Move {
                id: r.id.clone(),
                from: r.from.clone(),
                name: name.clone(),
                to: r.to.clone(),
            });
        }
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rename(scope: &Scope, from: &str, to: &str) -> Relocation {
        Relocation {
            id: StableId::new(from),
            from: scope.clone(),
            from_name: from.to_string(),
            to: scope.clone(),
            to_name: to.to_string(),
        }
    }

    fn summary(steps: &[Step]) -> Vec<String> {
        steps
            .iter()
            .map(|s| match s {
                Step::Rename { from, to, .. } => format!("{} -> {}", from, to),
                Step::Move { name, to, .. } => {
                    format!("{} => {}", name, to.display().unwrap_or("-"))
                }
            })
            .collect()
    }

    fn id(name: &str) -> StableId {
        StableId::new(name)
    }

    /// Every name is held by the object whose id is that name.
    fn orderer(scope: &Scope, names: &[&'static str]) -> RenameOrderer {
        let ids: Vec<StableId> = names.iter().map(|n| id(n)).collect();
        RenameOrderer::new(
            "__mig_tmp__",
            names.iter().zip(&ids).map(|(n, id)| (scope.clone(), *n, id)),
        )
    }

    #[test]
    fn test_independent_renames_keep_input_order() {
        let dbo = Scope::schema(Some("dbo"));
        let steps = orderer(&dbo, &["A", "B"])
            .order(&[rename(&dbo, "A", "X"), rename(&dbo, "B", "Y")])
            .unwrap();
        assert_eq!(summary(&steps), vec!["A -> X", "B -> Y"]);
    }

    #[test]
    fn test_chain_runs_back_to_front() {
        // A -> B needs B to vacate first
        let dbo = Scope::schema(Some("dbo"));
        let steps = orderer(&dbo, &["A", "B"])
            .order(&[rename(&dbo, "A", "B"), rename(&dbo, "B", "C")])
            .unwrap();
        assert_eq!(summary(&steps), vec!["B -> C", "A -> B"]);
    }

    #[test]
    fn test_swap_uses_one_placeholder() {
        let dbo = Scope::schema(Some("dbo"));
        let steps = orderer(&dbo, &["A", "B"])
            .order(&[rename(&dbo, "A", "B"), rename(&dbo, "B", "A")])
            .unwrap();
        assert_eq!(
            summary(&steps),
            vec!["A -> __mig_tmp__0", "B -> A", "__mig_tmp__0 -> B"]
        );
    }

    #[test]
    fn test_three_way_rotation() {
        let dbo = Scope::schema(Some("dbo"));
        let steps = orderer(&dbo, &["Foo1", "Bar1", "Baz1"])
            .order(&[
                rename(&dbo, "Foo1", "Baz1"),
                rename(&dbo, "Bar1", "Foo1"),
                rename(&dbo, "Baz1", "Bar1"),
            ])
            .unwrap();
        assert_eq!(
            summary(&steps),
            vec![
                "Foo1 -> __mig_tmp__0",
                "Bar1 -> __mig_tmp__1",
                "Baz1 -> Bar1",
                "__mig_tmp__0 -> Baz1",
                "__mig_tmp__1 -> Foo1",
            ]
        );
    }

    #[test]
    fn test_placeholder_skips_live_names() {
        let dbo = Scope::schema(Some("dbo"));
        let steps = orderer(&dbo, &["A", "B", "__mig_tmp__0"])
            .order(&[rename(&dbo, "A", "B"), rename(&dbo, "B", "A")])
            .unwrap();
        assert_eq!(
            summary(&steps),
            vec!["A -> __mig_tmp__1", "B -> A", "__mig_tmp__1 -> B"]
        );
    }

    #[test]
    fn test_scopes_are_independent() {
        let dbo = Scope::schema(Some("dbo"));
        let sales = Scope::schema(Some("sales"));
        let (a, b) = (id("A"), id("B"));
        let mut orderer =
            RenameOrderer::new("__mig_tmp__", [(dbo.clone(), "A", &a), (sales.clone(), "B", &b)]);
        let steps = orderer
            .order(&[rename(&dbo, "A", "B"), rename(&sales, "B", "A")])
            .unwrap();
        assert_eq!(summary(&steps), vec!["A -> B", "B -> A"]);
    }

    #[test]
    fn test_schema_scope_ignores_case() {
        assert_eq!(Scope::schema(Some("dbo")), Scope::schema(Some("DBO")));
        assert_ne!(Scope::schema(Some("dbo")), Scope::schema(None));
        assert_ne!(
            Scope::schema(Some("t")),
            Scope::table(&StableId::new("t"))
        );
    }

    #[test]
    fn test_rename_then_move() {
        let dbo = Scope::schema(Some("dbo"));
        let sales = Scope::schema(Some("sales"));
        let order = id("Order");
        let mut orderer = RenameOrderer::new("__mig_tmp__", [(dbo.clone(), "Orders", &order)]);
        let steps = orderer
            .order(&[Relocation {
                id: StableId::new("Order"),
                from: dbo.clone(),
                from_name: "Orders".to_string(),
                to: sales.clone(),
                to_name: "Order".to_string(),
            }])
            .unwrap();
        assert_eq!(summary(&steps), vec!["Orders -> Order", "Order => sales"]);
    }

    #[test]
    fn test_crossing_moves_are_displaced() {
        // dbo.T and sales.T trade places
        let dbo = Scope::schema(Some("dbo"));
        let sales = Scope::schema(Some("sales"));
        let (a, b) = (id("a"), id("b"));
        let mut orderer =
            RenameOrderer::new("__mig_tmp__", [(dbo.clone(), "T", &a), (sales.clone(), "T", &b)]);
        let steps = orderer
            .order(&[
                Relocation {
                    id: StableId::new("a"),
                    from: dbo.clone(),
                    from_name: "T".to_string(),
                    to: sales.clone(),
                    to_name: "T".to_string(),
                },
                Relocation {
                    id: StableId::new("b"),
                    from: sales.clone(),
                    from_name: "T".to_string(),
                    to: dbo.clone(),
                    to_name: "T".to_string(),
                },
            ])
            .unwrap();
        assert_eq!(
            summary(&steps),
            vec![
                "T -> __mig_tmp__0",
                "T => sales",
                "__mig_tmp__0 => dbo",
                "__mig_tmp__0 -> T",
            ]
        );
        assert_eq!(steps[0].id(), &StableId::new("b"));
    }

    #[test]
    fn test_diverted_rename_moves_under_placeholder() {
        // a: dbo.A -> sales.B while b: dbo.B -> dbo.A
        let dbo = Scope::schema(Some("dbo"));
        let sales = Scope::schema(Some("sales"));
        let (a, b) = (id("a"), id("b"));
        let mut orderer =
            RenameOrderer::new("__mig_tmp__", [(dbo.clone(), "A", &a), (dbo.clone(), "B", &b)]);
        let steps = orderer
            .order(&[
                Relocation {
                    id: a.clone(),
                    from: dbo.clone(),
                    from_name: "A".to_string(),
                    to: sales.clone(),
                    to_name: "B".to_string(),
                },
                Relocation {
                    id: b.clone(),
                    from: dbo.clone(),
                    from_name: "B".to_string(),
                    to: dbo.clone(),
                    to_name: "A".to_string(),
                },
            ])
            .unwrap();
        assert_eq!(
            summary(&steps),
            vec![
                "A -> __mig_tmp__0",
                "__mig_tmp__0 => sales",
                "B -> A",
                "__mig_tmp__0 -> B",
            ]
        );
        let ids: Vec<&str> = steps.iter().map(|s| s.id().as_str()).collect();
        assert_eq!(ids, vec!["a", "a", "b", "a"]);
        assert!(matches!(&steps[3], Step::Rename { scope, .. } if *scope == sales));
    }

    #[test]
    fn test_moving_rename_avoids_a_name_held_in_place() {
        // a: dbo.A -> sales.C while dbo.C stays put
        let dbo = Scope::schema(Some("dbo"));
        let sales = Scope::schema(Some("sales"));
        let (a, c) = (id("a"), id("c"));
        let mut orderer =
            RenameOrderer::new("__mig_tmp__", [(dbo.clone(), "A", &a), (dbo.clone(), "C", &c)]);
        let steps = orderer
            .order(&[Relocation {
                id: a.clone(),
                from: dbo.clone(),
                from_name: "A".to_string(),
                to: sales.clone(),
                to_name: "C".to_string(),
            }])
            .unwrap();
        assert_eq!(
            summary(&steps),
            vec!["A -> __mig_tmp__0", "__mig_tmp__0 => sales", "__mig_tmp__0 -> C"]
        );
    }

    #[test]
    fn test_moving_rename_avoids_a_name_another_object_moves_into() {
        // a: dbo.A -> sales.C while b: sales.P -> dbo.C
        let dbo = Scope::schema(Some("dbo"));
        let sales = Scope::schema(Some("sales"));
        let (a, b) = (id("a"), id("b"));
        let mut orderer =
            RenameOrderer::new("__mig_tmp__", [(dbo.clone(), "A", &a), (sales.clone(), "P", &b)]);
        let steps = orderer
            .order(&[
                Relocation {
                    id: a.clone(),
                    from: dbo.clone(),
                    from_name: "A".to_string(),
                    to: sales.clone(),
                    to_name: "C".to_string(),
                },
                Relocation {
                    id: b.clone(),
                    from: sales.clone(),
                    from_name: "P".to_string(),
                    to: dbo.clone(),
                    to_name: "C".to_string(),
                },
            ])
            .unwrap();
        assert_eq!(
            summary(&steps),
            vec![
                "A -> __mig_tmp__0",
                "__mig_tmp__0 => sales",
                "P -> __mig_tmp__1",
                "__mig_tmp__1 => dbo",
                "__mig_tmp__0 -> C",
                "__mig_tmp__1 -> C",
            ]
        );
    }

    #[test]
    fn test_step_needs_its_own_object_at_the_source() {
        // The name exists but belongs to another object.
        let dbo = Scope::schema(Some("dbo"));
        let other = id("other");
        let mut orderer = RenameOrderer::new("__mig_tmp__", [(dbo.clone(), "A", &other)]);
        let err = orderer.order(&[rename(&dbo, "A", "B")]).unwrap_err();
        assert!(matches!(err, SolverError::CycleDetected { .. }));
    }

    #[test]
    fn test_missing_source_is_reported() {
        let dbo = Scope::schema(Some("dbo"));
        let err = orderer(&dbo, &[])
            .order(&[rename(&dbo, "Ghost", "Other")])
            .unwrap_err();
        assert!(matches!(err, SolverError::CycleDetected { .. }));
    }
}
