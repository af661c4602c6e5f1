use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::NodeKind;

/// Percent-encode the characters used as separators in identity strings.
fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '%' => escaped.push_str("%25"),
            '/' => escaped.push_str("%2F"),
            '@' => escaped.push_str("%40"),
            ':' => escaped.push_str("%3A"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Identity of a server login: user, host and port.
///
/// Renaming any of the three yields a different identity; entries cached under the
/// old one are orphaned rather than rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionIdentity(String);

impl ConnectionIdentity {
    pub fn new(host: &str, port: u16, user: &str) -> Self {
        Self(format!("{}@{}:{}", escape(user), escape(host), port))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix shared by the key of every node under this connection
    pub fn key_prefix(&self) -> String {
        format!("{}/", self.0)
    }
}

impl fmt::Display for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable identity of one tree node, used as the cache key everywhere.
///
/// Encodes as `connection/db/kind[/path...]` where `db` is empty above database
/// level and `=name` below it. Every segment is escaped so distinct nodes never
/// share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeIdentity {
    connection: ConnectionIdentity,
    database: Option<String>,
    kind: NodeKind,
    path: Vec<String>,
}

impl NodeIdentity {
    pub fn connection(connection: ConnectionIdentity) -> Self {
        Self {
            connection,
            database: None,
            kind: NodeKind::Connection,
            path: Vec::new(),
        }
    }

    pub fn database(connection: ConnectionIdentity, database: impl Into<String>) -> Self {
        Self {
            connection,
            database: Some(database.into()),
            kind: NodeKind::Database,
            path: Vec::new(),
        }
    }

    /// Group node (tables, views, users...) below a connection or a database
    pub fn group(connection: ConnectionIdentity, database: Option<String>, kind: NodeKind) -> Self {
        Self {
            connection,
            database,
            kind,
            path: Vec::new(),
        }
    }

    /// Named schema object; `path` is the object name, followed by the column name for columns
    pub fn object(
        connection: ConnectionIdentity,
        database: Option<String>,
        kind: NodeKind,
        path: Vec<String>,
    ) -> Self {
        Self {
            connection,
            database,
            kind,
            path,
        }
    }

    pub fn connection_identity(&self) -> &ConnectionIdentity {
        &self.connection
    }

    pub fn database_name(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Object name (first path segment), if the node names a schema object
    pub fn object_name(&self) -> Option<&str> {
        self.path.first().map(String::as_str)
    }

    /// Canonical string form, used as the persisted expansion-state key
    pub fn key(&self) -> String {
        let mut key = String::from(self.connection.as_str());
        key.push('/');
        if let Some(database) = &self.database {
            key.push('=');
            key.push_str(&escape(database));
        }
        key.push('/');
        key.push_str(self.kind.as_str());
        for segment in &self.path {
            key.push('/');
            key.push_str(&escape(segment));
        }
        key
    }

    /// Whether this node lives under the given connection
    pub fn is_under(&self, connection: &ConnectionIdentity) -> bool {
        &self.connection == connection
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(host: &str, port: u16, user: &str) -> ConnectionIdentity {
        ConnectionIdentity::new(host, port, user)
    }

    #[test]
    fn test_identity_is_deterministic() {
        let a = NodeIdentity::database(conn("localhost", 3306, "root"), "app_db");
        let b = NodeIdentity::database(conn("localhost", 3306, "root"), "app_db");
        assert_eq!(a, b);
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key(), "root@localhost:3306/=app_db/database");
    }

    #[test]
    fn test_connection_fields_all_distinguish() {
        let base = conn("localhost", 3306, "root");
        assert_ne!(base, conn("127.0.0.1", 3306, "root"));
        assert_ne!(base, conn("localhost", 3307, "root"));
        assert_ne!(base, conn("localhost", 3306, "admin"));
    }

    #[test]
    fn test_separator_characters_cannot_collide() {
        // "a@b" on host "c" versus "a" on host "b@c"
        assert_ne!(conn("c", 1, "a@b"), conn("b@c", 1, "a"));
        // database "x/table" versus database "x" with a table node
        let c = conn("h", 1, "u");
        let tricky = NodeIdentity::database(c.clone(), "x/table");
        let plain = NodeIdentity::object(
            c.clone(),
            Some("x".into()),
            NodeKind::Table,
            vec!["database".into()],
        );
        assert_ne!(tricky.key(), plain.key());
        // absent database versus a database literally named "="
        let group = NodeIdentity::group(c.clone(), None, NodeKind::UserGroup);
        let odd = NodeIdentity::group(c, Some(String::new()), NodeKind::UserGroup);
        assert_ne!(group.key(), odd.key());
    }

    #[test]
    fn test_column_identity_includes_table() {
        let c = conn("h", 1, "u");
        let a = NodeIdentity::object(c.clone(), Some("db".into()), NodeKind::Column, vec!["t1".into(), "id".into()]);
        let b = NodeIdentity::object(c, Some("db".into()), NodeKind::Column, vec!["t2".into(), "id".into()]);
        assert_ne!(a, b);
        assert_eq!(a.object_name(), Some("t1"));
    }
}
