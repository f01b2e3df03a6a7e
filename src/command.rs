//! Domain commands issued against the table service.
//!
//! Scenarios describe their work as [`TableCommand`] values and hand them to a
//! [`CommandExecutor`]. Only `execute` touches the wire; every typed operation is
//! a provided method that interprets the generic [`Reply`].
//!
//! The built-in workloads use a subset of this surface. Ordered comparisons,
//! compound predicates, [`Row`] field access and `drop_table` cover the rest of
//! the module's command grammar for custom [`Workload`](crate::scenario::Workload)
//! implementations passed to [`Scenario::new`](crate::scenario::Scenario::new).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ProfilerError, Result};

/// Column data types understood by the table module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    String,
    Date,
}

impl ColumnType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Date => "date",
        }
    }
}

/// Column definition, encoded as `name:type:indexed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    name: String,
    column_type: ColumnType,
    indexed: bool,
}

impl ColumnSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType, indexed: bool) -> Self {
        Self {
            name: name.into(),
            column_type,
            indexed,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn column_type(&self) -> ColumnType {
        self.column_type
    }

    #[must_use]
    pub const fn indexed(&self) -> bool {
        self.indexed
    }
}

impl fmt::Display for ColumnSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.name,
            self.column_type.as_str(),
            self.indexed
        )
    }
}

/// Structural change applied by `TABLE.SCHEMA.ALTER`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlterAction {
    AddColumn(ColumnSpec),
    DropColumn(String),
    AddIndex(String),
    DropIndex(String),
}

impl AlterAction {
    fn args(&self) -> [String; 3] {
        match self {
            Self::AddColumn(spec) => ["ADD".into(), "COLUMN".into(), spec.to_string()],
            Self::DropColumn(column) => ["DROP".into(), "COLUMN".into(), column.clone()],
            Self::AddIndex(column) => ["ADD".into(), "INDEX".into(), column.clone()],
            Self::DropIndex(column) => ["DROP".into(), "INDEX".into(), column.clone()],
        }
    }
}

/// A `column=value` assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValue {
    column: String,
    value: String,
}

impl FieldValue {
    #[must_use]
    pub fn new(column: impl Into<String>, value: impl ToString) -> Self {
        Self {
            column: column.into(),
            value: value.to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.column, self.value)
    }
}

/// Comparison operator inside a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CompareOp {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
        }
    }
}

/// A single `column<op>value` condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    column: String,
    op: CompareOp,
    value: String,
}

impl Condition {
    #[must_use]
    pub fn new(column: impl Into<String>, op: CompareOp, value: impl ToString) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.column, self.op.as_str(), self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conjunction {
    And,
    Or,
}

/// Chain of conditions joined left to right by `AND`/`OR`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    first: Condition,
    rest: Vec<(Conjunction, Condition)>,
}

impl Predicate {
    #[must_use]
    pub const fn new(condition: Condition) -> Self {
        Self {
            first: condition,
            rest: Vec::new(),
        }
    }

    /// Shorthand for `column=value`.
    #[must_use]
    pub fn eq(column: impl Into<String>, value: impl ToString) -> Self {
        Self::new(Condition::new(column, CompareOp::Eq, value))
    }

    #[must_use]
    pub fn and(mut self, condition: Condition) -> Self {
        self.rest.push((Conjunction::And, condition));
        self
    }

    #[must_use]
    pub fn or(mut self, condition: Condition) -> Self {
        self.rest.push((Conjunction::Or, condition));
        self
    }

    fn push_args(&self, args: &mut Vec<String>) {
        args.push("WHERE".to_string());
        args.push(self.first.to_string());
        for (conjunction, condition) in &self.rest {
            args.push(
                match conjunction {
                    Conjunction::And => "AND",
                    Conjunction::Or => "OR",
                }
                .to_string(),
            );
            args.push(condition.to_string());
        }
    }
}

/// A row returned by `TABLE.SELECT`, as ordered `(column, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    fields: Vec<(String, String)>,
}

impl Row {
    /// Build a row from a flat `[column, value, column, value, ...]` reply.
    /// A trailing unpaired element is ignored.
    #[must_use]
    pub fn from_flat(values: Vec<String>) -> Self {
        let mut iter = values.into_iter();
        let mut fields = Vec::new();
        while let (Some(column), Some(value)) = (iter.next(), iter.next()) {
            fields.push((column, value));
        }
        Self { fields }
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    #[must_use]
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }
}

/// Protocol-neutral command reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Nil,
    Status(String),
    Text(String),
    Integer(i64),
    Rows(Vec<Row>),
}

/// A command understood by the table service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableCommand {
    CreateNamespace {
        name: String,
    },
    CreateSchema {
        table: String,
        columns: Vec<ColumnSpec>,
    },
    AlterSchema {
        table: String,
        action: AlterAction,
    },
    Insert {
        table: String,
        fields: Vec<FieldValue>,
    },
    Select {
        table: String,
        predicate: Option<Predicate>,
    },
    Update {
        table: String,
        predicate: Predicate,
        fields: Vec<FieldValue>,
    },
    Delete {
        table: String,
        predicate: Option<Predicate>,
    },
    Drop {
        table: String,
        force: bool,
    },
    FlushAll,
}

impl TableCommand {
    /// The command keyword sent first on the wire.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CreateNamespace { .. } => "TABLE.NAMESPACE.CREATE",
            Self::CreateSchema { .. } => "TABLE.SCHEMA.CREATE",
            Self::AlterSchema { .. } => "TABLE.SCHEMA.ALTER",
            Self::Insert { .. } => "TABLE.INSERT",
            Self::Select { .. } => "TABLE.SELECT",
            Self::Update { .. } => "TABLE.UPDATE",
            Self::Delete { .. } => "TABLE.DELETE",
            Self::Drop { .. } => "TABLE.DROP",
            Self::FlushAll => "FLUSHALL",
        }
    }

    /// Arguments following the command keyword.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::CreateNamespace { name } => vec![name.clone()],
            Self::CreateSchema { table, columns } => std::iter::once(table.clone())
                .chain(columns.iter().map(ToString::to_string))
                .collect(),
            Self::AlterSchema { table, action } => std::iter::once(table.clone())
                .chain(action.args())
                .collect(),
            Self::Insert { table, fields } => std::iter::once(table.clone())
                .chain(fields.iter().map(ToString::to_string))
                .collect(),
            Self::Select { table, predicate } | Self::Delete { table, predicate } => {
                let mut args = vec![table.clone()];
                if let Some(predicate) = predicate {
                    predicate.push_args(&mut args);
                }
                args
            }
            Self::Update {
                table,
                predicate,
                fields,
            } => {
                let mut args = vec![table.clone()];
                predicate.push_args(&mut args);
                args.push("SET".to_string());
                args.extend(fields.iter().map(ToString::to_string));
                args
            }
            Self::Drop { table, force } => {
                let mut args = vec![table.clone()];
                if *force {
                    args.push("FORCE".to_string());
                }
                args
            }
            Self::FlushAll => Vec::new(),
        }
    }
}

impl fmt::Display for TableCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        for arg in self.args() {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

fn unexpected(command: &TableCommand, reply: &Reply) -> ProfilerError {
    ProfilerError::command(command.name(), format!("unexpected reply: {reply:?}"))
}

fn expect_ok(command: &TableCommand, reply: &Reply) -> Result<()> {
    match reply {
        Reply::Status(_) | Reply::Text(_) => Ok(()),
        other => Err(unexpected(command, other)),
    }
}

fn expect_count(command: &TableCommand, reply: &Reply) -> Result<u64> {
    match reply {
        Reply::Integer(n) => u64::try_from(*n).map_err(|_| unexpected(command, reply)),
        other => Err(unexpected(command, other)),
    }
}

/// Synchronous command-execution capability against the target service.
///
/// Implementors provide `execute`; the typed operations are derived from it.
pub trait CommandExecutor {
    /// Send one command and block until its reply arrives.
    ///
    /// # Errors
    ///
    /// Returns `ProfilerError::Command` when the service rejects the command or
    /// the connection fails.
    fn execute(&mut self, command: &TableCommand) -> Result<Reply>;

    /// # Errors
    ///
    /// Returns error if the namespace cannot be created.
    fn create_namespace(&mut self, name: &str) -> Result<()> {
        let command = TableCommand::CreateNamespace { name: name.into() };
        let reply = self.execute(&command)?;
        expect_ok(&command, &reply)
    }

    /// # Errors
    ///
    /// Returns error if the schema cannot be created.
    fn create_schema(&mut self, table: &str, columns: &[ColumnSpec]) -> Result<()> {
        let command = TableCommand::CreateSchema {
            table: table.into(),
            columns: columns.to_vec(),
        };
        let reply = self.execute(&command)?;
        expect_ok(&command, &reply)
    }

    /// # Errors
    ///
    /// Returns error if the alteration is rejected.
    fn alter_schema(&mut self, table: &str, action: AlterAction) -> Result<()> {
        let command = TableCommand::AlterSchema {
            table: table.into(),
            action,
        };
        let reply = self.execute(&command)?;
        expect_ok(&command, &reply)
    }

    /// Insert a row and return the identifier the service assigned to it.
    ///
    /// # Errors
    ///
    /// Returns error if the insert is rejected.
    fn insert(&mut self, table: &str, fields: &[FieldValue]) -> Result<String> {
        let command = TableCommand::Insert {
            table: table.into(),
            fields: fields.to_vec(),
        };
        match self.execute(&command)? {
            Reply::Text(id) | Reply::Status(id) => Ok(id),
            Reply::Integer(id) => Ok(id.to_string()),
            other => Err(unexpected(&command, &other)),
        }
    }

    /// # Errors
    ///
    /// Returns error if the query is rejected.
    fn select(&mut self, table: &str, predicate: Option<&Predicate>) -> Result<Vec<Row>> {
        let command = TableCommand::Select {
            table: table.into(),
            predicate: predicate.cloned(),
        };
        match self.execute(&command)? {
            Reply::Rows(rows) => Ok(rows),
            Reply::Nil => Ok(Vec::new()),
            other => Err(unexpected(&command, &other)),
        }
    }

    /// Returns the number of updated rows.
    ///
    /// # Errors
    ///
    /// Returns error if the update is rejected.
    fn update(&mut self, table: &str, predicate: &Predicate, fields: &[FieldValue]) -> Result<u64> {
        let command = TableCommand::Update {
            table: table.into(),
            predicate: predicate.clone(),
            fields: fields.to_vec(),
        };
        let reply = self.execute(&command)?;
        expect_count(&command, &reply)
    }

    /// Returns the number of deleted rows.
    ///
    /// # Errors
    ///
    /// Returns error if the delete is rejected.
    fn delete(&mut self, table: &str, predicate: Option<&Predicate>) -> Result<u64> {
        let command = TableCommand::Delete {
            table: table.into(),
            predicate: predicate.cloned(),
        };
        let reply = self.execute(&command)?;
        expect_count(&command, &reply)
    }

    /// # Errors
    ///
    /// Returns error if the table cannot be dropped.
    fn drop_table(&mut self, table: &str, force: bool) -> Result<()> {
        let command = TableCommand::Drop {
            table: table.into(),
            force,
        };
        let reply = self.execute(&command)?;
        expect_ok(&command, &reply)
    }

    /// Clear every key on the service.
    ///
    /// # Errors
    ///
    /// Returns error if the flush is rejected.
    fn flush_all(&mut self) -> Result<()> {
        let command = TableCommand::FlushAll;
        let reply = self.execute(&command)?;
        expect_ok(&command, &reply)
    }
}
