use crate::ast::{FieldPath, WhereExpr};

/// Sort direction in an ORDER BY clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Ascending,
    Descending,
}

/// One `FOR $var IN path [AT $pos]` clause.
///
/// Clause order in [`Query::for_clauses`] is significant: the first clause
/// is the outermost loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ForClause {
    pub variable: String,
    pub path: FieldPath,
    /// 1-based loop counter bound by `AT $pos`
    pub position_var: Option<String>,
}

/// A complete parsed query. Built once by the parser, read-only during
/// execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub select_fields: Vec<FieldPath>,
    /// File or directory the query runs against, as written after FROM
    pub from_path: String,
    pub for_clauses: Vec<ForClause>,
    pub where_clause: Option<WhereExpr>,
    pub group_by_fields: Vec<String>,
    pub order_by_fields: Vec<(String, OrderDirection)>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub distinct: bool,
    /// True when any select field uses COUNT/SUM/AVG/MIN/MAX
    pub has_aggregates: bool,
}

impl Query {
    pub fn new(select_fields: Vec<FieldPath>, from_path: String) -> Self {
        let has_aggregates = select_fields
            .iter()
            .any(|f| f.aggregate != crate::ast::Aggregate::None);
        Query {
            select_fields,
            from_path,
            for_clauses: Vec::new(),
            where_clause: None,
            group_by_fields: Vec::new(),
            order_by_fields: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
            has_aggregates,
        }
    }

    /// Does `name` refer to a FOR loop variable?
    pub fn is_for_variable(&self, name: &str) -> bool {
        self.for_clauses.iter().any(|c| c.variable == name)
    }

    /// Does `name` refer to an `AT` position variable?
    pub fn is_position_variable(&self, name: &str) -> bool {
        self.for_clauses
            .iter()
            .any(|c| c.position_var.as_deref() == Some(name))
    }
}
