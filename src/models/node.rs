use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{ConnectionDescriptor, ConnectionIdentity, NodeIdentity};

/// Kind tag for every item in the object hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Connection,
    Database,
    UserGroup,
    User,
    TableGroup,
    ViewGroup,
    ProcedureGroup,
    FunctionGroup,
    TriggerGroup,
    Table,
    View,
    Column,
    Procedure,
    Function,
    Trigger,
    Info,
}

/// Operations a node may offer, looked up per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeOperation {
    Refresh,
    CreateDatabase,
    DropDatabase,
    TruncateDatabase,
    DeleteConnection,
    NewQuery,
    RunScript,
    ImportScript,
    DropTable,
    TruncateTable,
    RenameTable,
    SelectTemplate,
    ShowSource,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Connection => "connection",
            NodeKind::Database => "database",
            NodeKind::UserGroup => "user_group",
            NodeKind::User => "user",
            NodeKind::TableGroup => "table_group",
            NodeKind::ViewGroup => "view_group",
            NodeKind::ProcedureGroup => "procedure_group",
            NodeKind::FunctionGroup => "function_group",
            NodeKind::TriggerGroup => "trigger_group",
            NodeKind::Table => "table",
            NodeKind::View => "view",
            NodeKind::Column => "column",
            NodeKind::Procedure => "procedure",
            NodeKind::Function => "function",
            NodeKind::Trigger => "trigger",
            NodeKind::Info => "info",
        }
    }

    pub fn operations(&self) -> &'static [NodeOperation] {
        use NodeOperation::*;
        match self {
            NodeKind::Connection => &[Refresh, CreateDatabase, DeleteConnection, NewQuery, RunScript],
            NodeKind::Database => &[DropDatabase, TruncateDatabase, NewQuery, RunScript, ImportScript],
            NodeKind::UserGroup
            | NodeKind::TableGroup
            | NodeKind::ViewGroup
            | NodeKind::ProcedureGroup
            | NodeKind::FunctionGroup
            | NodeKind::TriggerGroup => &[Refresh],
            NodeKind::Table => &[Refresh, DropTable, TruncateTable, RenameTable, SelectTemplate, ShowSource],
            NodeKind::View => &[Refresh, SelectTemplate, ShowSource],
            NodeKind::Procedure | NodeKind::Function | NodeKind::Trigger => &[ShowSource],
            NodeKind::User | NodeKind::Column | NodeKind::Info => &[],
        }
    }

    pub fn supports(&self, operation: NodeOperation) -> bool {
        self.operations().contains(&operation)
    }

    /// Whether nodes of this kind can have children
    pub fn is_expandable(&self) -> bool {
        !matches!(
            self,
            NodeKind::User
                | NodeKind::Column
                | NodeKind::Procedure
                | NodeKind::Function
                | NodeKind::Trigger
                | NodeKind::Info
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remembered UI expansion state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpansionState {
    Collapsed,
    Expanded,
    Unset,
}

impl ExpansionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpansionState::Collapsed => "collapsed",
            ExpansionState::Expanded => "expanded",
            ExpansionState::Unset => "unset",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "collapsed" => Some(ExpansionState::Collapsed),
            "expanded" => Some(ExpansionState::Expanded),
            _ => None,
        }
    }
}

/// Column attributes shown on column nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDetail {
    pub data_type: String,
    pub nullable: bool,
    pub key: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeDetail {
    None,
    Column(ColumnDetail),
    Info { message: String },
}

/// One item of the object hierarchy.
///
/// `parent` is a lookup key only; nodes never own or link to each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub identity: NodeIdentity,
    pub parent: Option<NodeIdentity>,
    pub kind: NodeKind,
    pub label: String,
    pub description: Option<String>,
    pub active: bool,
    pub detail: NodeDetail,
}

impl TreeNode {
    fn new(identity: NodeIdentity, parent: Option<NodeIdentity>, label: impl Into<String>) -> Self {
        let kind = identity.kind();
        Self {
            identity,
            parent,
            kind,
            label: label.into(),
            description: None,
            active: false,
            detail: NodeDetail::None,
        }
    }

    pub fn connection(descriptor: &ConnectionDescriptor) -> Self {
        let identity = descriptor.identity();
        let label = descriptor.display_name();
        Self::new(NodeIdentity::connection(identity), None, label)
    }

    pub fn database_node(parent: &TreeNode, name: &str, active: bool) -> Self {
        let identity = NodeIdentity::database(parent.connection_identity().clone(), name);
        let mut node = Self::new(identity, Some(parent.identity.clone()), name);
        if active {
            node.active = true;
            node.description = Some("Active".to_string());
        }
        node
    }

    /// Group node placed under `parent`, inheriting its database scope
    pub fn group(parent: &TreeNode, kind: NodeKind) -> Self {
        let label = match kind {
            NodeKind::UserGroup => "USER",
            NodeKind::TableGroup => "TABLE",
            NodeKind::ViewGroup => "VIEW",
            NodeKind::ProcedureGroup => "PROCEDURE",
            NodeKind::FunctionGroup => "FUNCTION",
            NodeKind::TriggerGroup => "TRIGGER",
            other => other.as_str(),
        };
        let identity = NodeIdentity::group(
            parent.connection_identity().clone(),
            parent.database().map(str::to_string),
            kind,
        );
        Self::new(identity, Some(parent.identity.clone()), label)
    }

    /// Named schema object (table, view, routine, trigger, user) under a group
    pub fn object(parent: &TreeNode, kind: NodeKind, name: &str) -> Self {
        let identity = NodeIdentity::object(
            parent.connection_identity().clone(),
            parent.database().map(str::to_string),
            kind,
            vec![name.to_string()],
        );
        Self::new(identity, Some(parent.identity.clone()), name)
    }

    pub fn column(parent: &TreeNode, name: &str, detail: ColumnDetail) -> Self {
        let mut path = parent.identity.path().to_vec();
        path.push(name.to_string());
        let identity = NodeIdentity::object(
            parent.connection_identity().clone(),
            parent.database().map(str::to_string),
            NodeKind::Column,
            path,
        );
        let mut node = Self::new(identity, Some(parent.identity.clone()), name);
        node.description = Some(detail.data_type.clone());
        node.detail = NodeDetail::Column(detail);
        node
    }

    /// Placeholder shown in place of children that could not be fetched
    pub fn info(parent: &TreeNode, message: impl Into<String>) -> Self {
        let message = message.into();
        let identity = NodeIdentity::object(
            parent.connection_identity().clone(),
            parent.database().map(str::to_string),
            NodeKind::Info,
            vec![parent.identity.key()],
        );
        let mut node = Self::new(identity, Some(parent.identity.clone()), message.clone());
        node.detail = NodeDetail::Info { message };
        node
    }

    pub fn connection_identity(&self) -> &ConnectionIdentity {
        self.identity.connection_identity()
    }

    pub fn database(&self) -> Option<&str> {
        self.identity.database_name()
    }

    pub fn supports(&self, operation: NodeOperation) -> bool {
        self.kind.supports(operation)
    }
}
