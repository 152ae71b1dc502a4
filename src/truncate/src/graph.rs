use std::collections::HashMap;
use std::sync::Arc;

use crate::client::SpannerClient;
use crate::deleter::{Deleter, Status};
use crate::schema::{DeleteAction, IndexSchema, TableSchema};

/// Index of a table in the graph arena.
pub type TableId = usize;

/// A node of the inter-table relationship graph.
///
/// Tables participate in two relations at once: the interleave forest
/// (`children`) and the foreign-key relation (`referenced_by`). Both point
/// into the shared arena held by [`TableGraph`], so a table referenced from
/// several places is still a single node with a single [`Deleter`].
pub struct Table {
    name: String,

    /// Interleave children, in schema input order.
    children: Vec<TableId>,

    /// `ON DELETE` action of this table's own interleave edge.
    parent_on_delete: DeleteAction,

    /// Tables whose foreign keys point at this table.
    referenced_by: Vec<TableId>,

    /// Whether at least one non-interleaved index is defined on the table.
    has_global_index: bool,

    deleter: Arc<Deleter>,
}

impl Table {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn deleter(&self) -> &Arc<Deleter> {
        &self.deleter
    }

    pub fn children(&self) -> &[TableId] {
        &self.children
    }

    pub fn referenced_by(&self) -> &[TableId] {
        &self.referenced_by
    }

    pub fn has_global_index(&self) -> bool {
        self.has_global_index
    }
}

/// The relationship graph over all tables selected for truncation.
///
/// Structurally immutable once built; only the per-table deleter state
/// changes afterwards, which keeps the graph safely shareable across the
/// coordinator, the delete tasks, and the progress renderer.
pub struct TableGraph {
    tables: Vec<Table>,
    roots: Vec<TableId>,
}

impl TableGraph {
    /// Builds the graph from filtered schema descriptors.
    ///
    /// A table whose parent is missing from `schemas` (filtered out, or
    /// unknown) becomes a root. Foreign key references to missing tables are
    /// dropped for the same reason.
    pub fn new(
        schemas: &[TableSchema],
        indexes: &[IndexSchema],
        client: Arc<dyn SpannerClient>,
    ) -> Self {
        let ids: HashMap<&str, TableId> = schemas
            .iter()
            .enumerate()
            .map(|(id, schema)| (schema.table_name.as_str(), id))
            .collect();

        let mut tables: Vec<Table> = schemas
            .iter()
            .map(|schema| Table {
                name: schema.table_name.clone(),
                children: Vec::new(),
                parent_on_delete: schema.parent_on_delete,
                referenced_by: Vec::new(),
                has_global_index: indexes
                    .iter()
                    .any(|index| index.base_table_name == schema.table_name && index.is_global()),
                deleter: Arc::new(Deleter::new(schema.table_name.clone(), Arc::clone(&client))),
            })
            .collect();

        let mut roots = Vec::new();
        for (id, schema) in schemas.iter().enumerate() {
            match ids.get(schema.parent_table_name.as_str()) {
                Some(&parent) if !schema.parent_table_name.is_empty() => {
                    tables[parent].children.push(id);
                }
                _ => roots.push(id),
            }

            for referencing in &schema.referenced_by {
                if let Some(&referencing_id) = ids.get(referencing.as_str()) {
                    tables[id].referenced_by.push(referencing_id);
                }
            }
        }

        Self { tables, roots }
    }

    pub fn table(&self, id: TableId) -> &Table {
        &self.tables[id]
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn roots(&self) -> &[TableId] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// All tables in depth-first order, parents before their children.
    pub fn flatten(&self) -> Vec<TableId> {
        let mut order = Vec::with_capacity(self.tables.len());
        let mut stack: Vec<TableId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.tables[id].children.iter().rev());
        }
        order
    }

    /// Whether the table can be bulk-deleted right now without violating a
    /// constraint.
    ///
    /// A table is blocked by: a non-drained `NoAction` child (the database
    /// would reject the parent delete), a non-drained child carrying a
    /// global index (the cascade cannot maintain that index, so the child
    /// must be deleted explicitly first), any blocker deeper in its cascade
    /// subtree, and any not-yet-drained referencing table. The table's own
    /// global index never blocks it.
    pub fn is_deletable(&self, id: TableId) -> bool {
        let table = &self.tables[id];
        for &child_id in &table.children {
            let child = &self.tables[child_id];
            let drained = child.deleter.status() == Status::Completed;
            if child.parent_on_delete == DeleteAction::NoAction && !drained {
                return false;
            }
            if child.has_global_index && !drained {
                return false;
            }
            if !self.is_deletable(child_id) {
                return false;
            }
        }

        table
            .referenced_by
            .iter()
            .all(|&referencing| self.tables[referencing].deleter.status() == Status::Completed)
    }

    /// Tables that may start a bulk delete this tick.
    ///
    /// Selecting a table covers its whole cascade subtree, so the walk does
    /// not descend below a selected node. Tables already deleting or drained
    /// are skipped together with their subtrees.
    pub fn find_deletable(&self) -> Vec<TableId> {
        let mut deletable = Vec::new();
        self.find_deletable_in(&self.roots, &mut deletable);
        deletable
    }

    fn find_deletable_in(&self, ids: &[TableId], deletable: &mut Vec<TableId>) {
        for &id in ids {
            let table = &self.tables[id];
            match table.deleter.status() {
                Status::Deleting | Status::Completed => continue,
                _ => {}
            }

            if self.is_deletable(id) {
                deletable.push(id);
                continue;
            }

            self.find_deletable_in(&table.children, deletable);
        }
    }

    /// Marks every table in the subtrees under `id` as cascade-deleting.
    pub fn mark_cascading(&self, id: TableId) {
        let mut stack: Vec<TableId> = self.tables[id].children.clone();
        while let Some(child_id) = stack.pop() {
            let child = &self.tables[child_id];
            child.deleter.parent_deletion_started();
            stack.extend(&child.children);
        }
    }

    pub fn all_completed(&self) -> bool {
        self.tables
            .iter()
            .all(|table| table.deleter.status() == Status::Completed)
    }

    pub fn any_deleting(&self) -> bool {
        self.tables.iter().any(|table| {
            matches!(
                table.deleter.status(),
                Status::Deleting | Status::CascadeDeleting
            )
        })
    }
}
