// Metadata queries that populate the object tree, and the mapping from rows to nodes
use crate::models::{row_string, ColumnDetail, NodeKind, QueryOutput, TreeNode};
use crate::validation::SqlValidator;

/// Children of kinds that need no server round trip
pub fn static_children(node: &TreeNode) -> Option<Vec<TreeNode>> {
    match node.kind {
        NodeKind::Database => Some(
            [
                NodeKind::TableGroup,
                NodeKind::ViewGroup,
                NodeKind::ProcedureGroup,
                NodeKind::FunctionGroup,
                NodeKind::TriggerGroup,
            ]
            .into_iter()
            .map(|kind| TreeNode::group(node, kind))
            .collect(),
        ),
        _ if !node.kind.is_expandable() => Some(Vec::new()),
        _ => None,
    }
}

/// Query listing the children of `node`, for kinds fetched from the server
pub fn children_query(node: &TreeNode) -> Option<String> {
    let schema = node.database().map(SqlValidator::quote_literal);

    match (node.kind, schema) {
        (NodeKind::Connection, _) => Some("SHOW DATABASES".to_string()),
        (NodeKind::UserGroup, _) => {
            Some("SELECT DISTINCT `User` AS name FROM mysql.user ORDER BY name".to_string())
        }
        (NodeKind::TableGroup, Some(schema)) => Some(format!(
            "SELECT TABLE_NAME AS name, TABLE_COMMENT AS comment FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = {} AND TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME",
            schema
        )),
        (NodeKind::ViewGroup, Some(schema)) => Some(format!(
            "SELECT TABLE_NAME AS name FROM information_schema.VIEWS \
             WHERE TABLE_SCHEMA = {} ORDER BY TABLE_NAME",
            schema
        )),
        (NodeKind::ProcedureGroup, Some(schema)) => Some(routines_query(&schema, "PROCEDURE")),
        (NodeKind::FunctionGroup, Some(schema)) => Some(routines_query(&schema, "FUNCTION")),
        (NodeKind::TriggerGroup, Some(schema)) => Some(format!(
            "SELECT TRIGGER_NAME AS name FROM information_schema.TRIGGERS \
             WHERE TRIGGER_SCHEMA = {} ORDER BY TRIGGER_NAME",
            schema
        )),
        (NodeKind::Table | NodeKind::View, Some(schema)) => {
            let table = SqlValidator::quote_literal(node.identity.object_name()?);
            Some(format!(
                "SELECT COLUMN_NAME AS name, COLUMN_TYPE AS `type`, IS_NULLABLE AS nullable, \
                 COLUMN_KEY AS `key`, COLUMN_COMMENT AS comment FROM information_schema.COLUMNS \
                 WHERE TABLE_SCHEMA = {} AND TABLE_NAME = {} ORDER BY ORDINAL_POSITION",
                schema, table
            ))
        }
        _ => None,
    }
}

fn routines_query(schema: &str, routine_type: &str) -> String {
    format!(
        "SELECT ROUTINE_NAME AS name FROM information_schema.ROUTINES \
         WHERE ROUTINE_SCHEMA = {} AND ROUTINE_TYPE = '{}' ORDER BY ROUTINE_NAME",
        schema, routine_type
    )
}

/// Build child nodes of `node` from the result of its `children_query`.
///
/// Connection children always start with the user group, regardless of the order
/// the server returns databases in.
pub fn children_from_output(node: &TreeNode, output: &QueryOutput, active_database: Option<&str>) -> Vec<TreeNode> {
    match node.kind {
        NodeKind::Connection => {
            let mut children = vec![TreeNode::group(node, NodeKind::UserGroup)];
            children.extend(output.column_strings("Database").into_iter().map(|name| {
                let active = active_database == Some(name.as_str());
                TreeNode::database_node(node, &name, active)
            }));
            children
        }
        NodeKind::Table | NodeKind::View => output
            .rows()
            .iter()
            .filter_map(|row| {
                let name = row_string(row, "name")?;
                let detail = ColumnDetail {
                    data_type: row_string(row, "type").unwrap_or_default(),
                    nullable: row_string(row, "nullable").as_deref() == Some("YES"),
                    key: row_string(row, "key").filter(|k| !k.is_empty()),
                    comment: row_string(row, "comment").filter(|c| !c.is_empty()),
                };
                Some(TreeNode::column(node, &name, detail))
            })
            .collect(),
        group => {
            let Some(child_kind) = object_kind(group) else {
                return Vec::new();
            };
            output
                .rows()
                .iter()
                .filter_map(|row| {
                    let name = row_string(row, "name")?;
                    let mut child = TreeNode::object(node, child_kind, &name);
                    child.description = row_string(row, "comment").filter(|c| !c.is_empty());
                    Some(child)
                })
                .collect()
        }
    }
}

fn object_kind(group: NodeKind) -> Option<NodeKind> {
    match group {
        NodeKind::UserGroup => Some(NodeKind::User),
        NodeKind::TableGroup => Some(NodeKind::Table),
        NodeKind::ViewGroup => Some(NodeKind::View),
        NodeKind::ProcedureGroup => Some(NodeKind::Procedure),
        NodeKind::FunctionGroup => Some(NodeKind::Function),
        NodeKind::TriggerGroup => Some(NodeKind::Trigger),
        _ => None,
    }
}

/// `SHOW CREATE ...` statement for a schema object and the column holding its definition
pub fn source_query(node: &TreeNode) -> Option<(String, &'static str)> {
    let (object_type, column) = match node.kind {
        NodeKind::Table => ("TABLE", "Create Table"),
        NodeKind::View => ("VIEW", "Create View"),
        NodeKind::Procedure => ("PROCEDURE", "Create Procedure"),
        NodeKind::Function => ("FUNCTION", "Create Function"),
        NodeKind::Trigger => ("TRIGGER", "SQL Original Statement"),
        _ => return None,
    };
    let name = SqlValidator::qualified_name(node.database()?, node.identity.object_name()?);
    Some((format!("SHOW CREATE {} {}", object_type, name), column))
}

/// Query producing one `TRUNCATE TABLE` statement per base table of `database`
pub fn truncate_statements_query(database: &str) -> String {
    format!(
        "SELECT CONCAT('TRUNCATE TABLE `', REPLACE(TABLE_SCHEMA, '`', '``'), '`.`', \
         REPLACE(TABLE_NAME, '`', '``'), '`;') AS trun FROM information_schema.TABLES \
         WHERE TABLE_SCHEMA = {} AND TABLE_TYPE = 'BASE TABLE'",
        SqlValidator::quote_literal(database)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConnectionDescriptor;
    use crate::services::database::testing::{records, rows};

    fn connection_node() -> TreeNode {
        TreeNode::connection(&ConnectionDescriptor::new("localhost", 3306, "root"))
    }

    #[test]
    fn test_user_group_is_prepended() {
        let conn = connection_node();
        let output = rows("Database", &["mysql", "app_db"]);
        let children = children_from_output(&conn, &output, Some("app_db"));

        let labels: Vec<&str> = children.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["USER", "mysql", "app_db"]);
        assert_eq!(children[0].kind, NodeKind::UserGroup);
        assert!(!children[1].active);
        assert!(children[2].active);
    }

    #[test]
    fn test_database_children_are_static() {
        let conn = connection_node();
        let db = TreeNode::database_node(&conn, "app_db", false);
        let children = static_children(&db).unwrap();
        let kinds: Vec<NodeKind> = children.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::TableGroup,
                NodeKind::ViewGroup,
                NodeKind::ProcedureGroup,
                NodeKind::FunctionGroup,
                NodeKind::TriggerGroup
            ]
        );
        assert!(children.iter().all(|c| c.database() == Some("app_db")));
        assert!(children_query(&db).is_none());
    }

    #[test]
    fn test_leaves_have_no_children() {
        let conn = connection_node();
        let users = TreeNode::group(&conn, NodeKind::UserGroup);
        let user = TreeNode::object(&users, NodeKind::User, "root");
        assert_eq!(static_children(&user), Some(Vec::new()));
        assert!(static_children(&users).is_none());
    }

    #[test]
    fn test_table_group_query_escapes_schema() {
        let conn = connection_node();
        let db = TreeNode::database_node(&conn, "o'brien", false);
        let tables = TreeNode::group(&db, NodeKind::TableGroup);
        let sql = children_query(&tables).unwrap();
        assert!(sql.contains("TABLE_SCHEMA = 'o''brien'"));
        assert!(sql.contains("BASE TABLE"));
    }

    #[test]
    fn test_columns_from_rows() {
        let conn = connection_node();
        let db = TreeNode::database_node(&conn, "app_db", false);
        let tables = TreeNode::group(&db, NodeKind::TableGroup);
        let users = TreeNode::object(&tables, NodeKind::Table, "users");

        let output = records(&[
            &[("name", "id"), ("type", "int(11)"), ("nullable", "NO"), ("key", "PRI"), ("comment", "")],
            &[("name", "email"), ("type", "varchar(255)"), ("nullable", "YES"), ("key", ""), ("comment", "login")],
        ]);
        let columns = children_from_output(&users, &output, None);

        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].label, "id");
        match &columns[0].detail {
            crate::models::NodeDetail::Column(detail) => {
                assert_eq!(detail.data_type, "int(11)");
                assert!(!detail.nullable);
                assert_eq!(detail.key.as_deref(), Some("PRI"));
                assert!(detail.comment.is_none());
            }
            other => panic!("unexpected detail: {:?}", other),
        }
        assert_eq!(columns[1].parent.as_ref(), Some(&users.identity));
    }

    #[test]
    fn test_source_query() {
        let conn = connection_node();
        let db = TreeNode::database_node(&conn, "app_db", false);
        let procs = TreeNode::group(&db, NodeKind::ProcedureGroup);
        let proc_node = TreeNode::object(&procs, NodeKind::Procedure, "cleanup");
        let (sql, column) = source_query(&proc_node).unwrap();
        assert_eq!(sql, "SHOW CREATE PROCEDURE `app_db`.`cleanup`");
        assert_eq!(column, "Create Procedure");
        assert!(source_query(&db).is_none());
    }
}
