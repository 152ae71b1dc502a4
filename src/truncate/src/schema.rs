use std::collections::HashSet;

use crate::error::Error;

/// `ON DELETE` action of an interleaved table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteAction {
    /// The table has no interleave parent.
    #[default]
    Undefined,
    /// Deleting a parent row cascades into this table.
    Cascade,
    /// Deleting a parent row is rejected while child rows exist.
    NoAction,
}

impl DeleteAction {
    /// Maps the nullable `ON_DELETE_ACTION` column to an action.
    pub fn parse(action: Option<&str>) -> Self {
        match action {
            Some("CASCADE") => DeleteAction::Cascade,
            Some("NO ACTION") => DeleteAction::NoAction,
            _ => DeleteAction::Undefined,
        }
    }
}

/// Table metadata and relationships as reported by the information schema.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableSchema {
    pub table_name: String,

    /// Interleave parent, empty when the table is not interleaved.
    pub parent_table_name: String,
    pub parent_on_delete: DeleteAction,

    /// Tables whose foreign keys point at this table.
    pub referenced_by: Vec<String>,
}

impl TableSchema {
    pub fn is_cascade_deletable(&self) -> bool {
        self.parent_on_delete == DeleteAction::Cascade
    }
}

/// Secondary index metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    pub index_name: String,

    /// Table on which the index is defined.
    pub base_table_name: String,

    /// Table the index is interleaved in. Empty for a global index.
    pub parent_table_name: String,
}

impl IndexSchema {
    /// A global index lives outside its base table's interleave hierarchy,
    /// so cascade deletes on the base table do not maintain it.
    pub fn is_global(&self) -> bool {
        self.parent_table_name.is_empty()
    }
}

/// Fetches table metadata and relationships, with inbound foreign key
/// references pre-aggregated per referenced table.
pub(crate) const TABLE_SCHEMA_QUERY: &str = r#"
WITH FKReferences AS (
    SELECT CCU.TABLE_NAME AS Referenced, ARRAY_AGG(TC.TABLE_NAME) AS Referencing
    FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS as TC
    INNER JOIN INFORMATION_SCHEMA.CONSTRAINT_COLUMN_USAGE AS CCU ON TC.CONSTRAINT_NAME = CCU.CONSTRAINT_NAME
    WHERE TC.TABLE_CATALOG = '' AND TC.TABLE_SCHEMA = '' AND TC.CONSTRAINT_TYPE = 'FOREIGN KEY' AND CCU.TABLE_CATALOG = '' AND CCU.TABLE_SCHEMA = ''
    GROUP BY CCU.TABLE_NAME
)
SELECT T.TABLE_NAME, T.PARENT_TABLE_NAME, T.ON_DELETE_ACTION, IF(F.Referencing IS NULL, ARRAY<STRING>[], F.Referencing) AS referencedBy
FROM INFORMATION_SCHEMA.TABLES AS T
LEFT OUTER JOIN FKReferences AS F ON T.TABLE_NAME = F.Referenced
WHERE T.TABLE_CATALOG = "" AND T.TABLE_SCHEMA = "" AND T.TABLE_TYPE = "BASE TABLE"
ORDER BY T.TABLE_NAME ASC
"#;

/// Fetches defined secondary indexes.
pub(crate) const INDEX_SCHEMA_QUERY: &str = r#"
SELECT INDEX_NAME, TABLE_NAME, PARENT_TABLE_NAME FROM INFORMATION_SCHEMA.INDEXES
WHERE INDEX_TYPE = 'INDEX' AND TABLE_CATALOG = '' AND TABLE_SCHEMA = ''
"#;

/// Narrows `schemas` to the tables that should be truncated.
///
/// With `target_tables`, only the named tables and their cascade-reachable
/// descendants are kept: deleting a target wipes those descendants anyway, so
/// they must be expected to drain. With `exclude_tables`, the named tables
/// are dropped together with every ancestor whose deletion would cascade
/// into them. Passing both selections at once is rejected.
pub fn filter_table_schemas(
    schemas: Vec<TableSchema>,
    target_tables: &[String],
    exclude_tables: &[String],
) -> Result<Vec<TableSchema>, Error> {
    match (!target_tables.is_empty(), !exclude_tables.is_empty()) {
        (true, true) => Err(Error::ConflictingSelection),
        (true, false) => Ok(target_filter_table_schemas(schemas, target_tables)),
        (false, true) => Ok(exclude_filter_table_schemas(schemas, exclude_tables)),
        (false, false) => Ok(schemas),
    }
}

/// Keeps the targeted tables plus every descendant reachable through an
/// unbroken chain of cascade hops. A `NoAction` hop cuts off the subtree
/// beneath it.
fn target_filter_table_schemas(
    schemas: Vec<TableSchema>,
    target_tables: &[String],
) -> Vec<TableSchema> {
    let mut keep: HashSet<&str> = target_tables.iter().map(String::as_str).collect();

    loop {
        let mut descendants: HashSet<&str> = HashSet::new();
        for schema in &schemas {
            if keep.contains(schema.table_name.as_str()) {
                continue;
            }
            if schema.is_cascade_deletable() && keep.contains(schema.parent_table_name.as_str()) {
                descendants.insert(&schema.table_name);
            }
        }

        if descendants.is_empty() {
            break;
        }
        keep.extend(descendants);
    }

    schemas
        .iter()
        .filter(|schema| keep.contains(schema.table_name.as_str()))
        .cloned()
        .collect()
}

/// Drops the excluded tables plus every parent that would delete them in
/// cascade. Interleave hierarchies can be deep, so the walk runs up to the
/// topmost level.
fn exclude_filter_table_schemas(
    schemas: Vec<TableSchema>,
    exclude_tables: &[String],
) -> Vec<TableSchema> {
    let mut excludes: HashSet<&str> = exclude_tables.iter().map(String::as_str).collect();

    loop {
        let mut parents: HashSet<&str> = HashSet::new();
        for schema in &schemas {
            if excludes.contains(schema.table_name.as_str())
                && schema.is_cascade_deletable()
                && !excludes.contains(schema.parent_table_name.as_str())
            {
                parents.insert(&schema.parent_table_name);
            }
        }

        if parents.is_empty() {
            break;
        }
        excludes.extend(parents);
    }

    schemas
        .iter()
        .filter(|schema| !excludes.contains(schema.table_name.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str) -> TableSchema {
        TableSchema {
            table_name: name.to_string(),
            ..TableSchema::default()
        }
    }

    fn child(name: &str, parent: &str, on_delete: DeleteAction) -> TableSchema {
        TableSchema {
            table_name: name.to_string(),
            parent_table_name: parent.to_string(),
            parent_on_delete: on_delete,
            referenced_by: Vec::new(),
        }
    }

    /// The hierarchical part uses the well known Singers/Albums/Songs schema
    /// from the Cloud Spanner data model documentation.
    fn fixture() -> Vec<TableSchema> {
        vec![
            table("Singers"),
            child("Albums", "Singers", DeleteAction::Cascade),
            child("Songs", "Albums", DeleteAction::Cascade),
            table("t1"),
            table("t2"),
            table("t3"),
        ]
    }

    fn names(schemas: &[TableSchema]) -> Vec<&str> {
        let mut names: Vec<&str> = schemas.iter().map(|s| s.table_name.as_str()).collect();
        names.sort_unstable();
        names
    }

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn parse_delete_action() {
        assert_eq!(DeleteAction::parse(None), DeleteAction::Undefined);
        assert_eq!(DeleteAction::parse(Some("CASCADE")), DeleteAction::Cascade);
        assert_eq!(DeleteAction::parse(Some("NO ACTION")), DeleteAction::NoAction);
    }

    #[test]
    fn exclude_traces_cascade_parents_to_the_top() {
        let got = filter_table_schemas(fixture(), &[], &strings(&["Songs"])).unwrap();
        assert_eq!(names(&got), vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn exclude_keeps_lower_levels() {
        let got = filter_table_schemas(fixture(), &[], &strings(&["Albums"])).unwrap();
        assert_eq!(names(&got), vec!["Songs", "t1", "t2", "t3"]);
    }

    #[test]
    fn exclude_multiple_tables() {
        let got = filter_table_schemas(fixture(), &[], &strings(&["Songs", "t1", "t2"])).unwrap();
        assert_eq!(names(&got), vec!["t3"]);
    }

    #[test]
    fn exclude_stops_at_no_action_hop() {
        let schemas = vec![
            table("Singers"),
            child("Albums", "Singers", DeleteAction::NoAction),
            child("Songs", "Albums", DeleteAction::Cascade),
        ];
        let got = filter_table_schemas(schemas, &[], &strings(&["Songs"])).unwrap();
        // Albums would cascade into Songs so it goes, but the NoAction hop
        // protects Singers.
        assert_eq!(names(&got), vec!["Singers"]);
    }

    #[test]
    fn target_keeps_cascade_descendants() {
        let got = filter_table_schemas(fixture(), &strings(&["Singers", "t1"]), &[]).unwrap();
        assert_eq!(names(&got), vec!["Albums", "Singers", "Songs", "t1"]);
    }

    #[test]
    fn target_cut_off_by_no_action_edge() {
        let schemas = vec![
            table("Singers"),
            child("Albums", "Singers", DeleteAction::NoAction),
            child("Songs", "Albums", DeleteAction::Cascade),
        ];
        let got = filter_table_schemas(schemas, &strings(&["Singers"]), &[]).unwrap();
        assert_eq!(names(&got), vec!["Singers"]);
    }

    #[test]
    fn target_only_named_tables() {
        let got = filter_table_schemas(fixture(), &strings(&["t2"]), &[]).unwrap();
        assert_eq!(names(&got), vec!["t2"]);
    }

    #[test]
    fn no_selection_returns_everything() {
        let got = filter_table_schemas(fixture(), &[], &[]).unwrap();
        assert_eq!(got, fixture());
    }

    #[test]
    fn both_selections_conflict() {
        let err = filter_table_schemas(fixture(), &strings(&["t1"]), &strings(&["t2"]))
            .expect_err("conflicting selection must be rejected");
        assert!(matches!(err, Error::ConflictingSelection));
    }

    #[test]
    fn filtering_is_idempotent() {
        for (targets, excludes) in [
            (strings(&["Singers"]), Vec::new()),
            (Vec::new(), strings(&["Songs"])),
        ] {
            let once = filter_table_schemas(fixture(), &targets, &excludes).unwrap();
            let twice = filter_table_schemas(once.clone(), &targets, &excludes).unwrap();
            assert_eq!(once, twice);
        }
    }
}
