use crate::ast::FieldPath;

/// Comparison operator of a WHERE condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    /// Unanchored regex search (`field LIKE /pattern/`)
    Like,
    /// Negated regex search (`field IS NOT LIKE /pattern/`)
    NotLike,
    /// `field IS NULL` — true when the field resolves to nothing
    IsNull,
    /// `field IS NOT NULL`
    IsNotNull,
}

impl ComparisonOp {
    /// Operators that carry no right-hand value.
    pub fn is_null_check(self) -> bool {
        matches!(self, ComparisonOp::IsNull | ComparisonOp::IsNotNull)
    }
}

/// Connective of a logical WHERE node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// A single comparison in a WHERE clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: FieldPath,
    pub op: ComparisonOp,
    /// Right-hand side as written; empty for null checks, the pattern text
    /// for LIKE
    pub value: String,
    /// True when the right-hand side was a numeric literal; selects f64
    /// comparison over lexicographic
    pub is_numeric: bool,
}

/// A parsed WHERE expression tree.
///
/// AND binds tighter than OR, so `a = 1 OR b = 2 AND c = 3` parses as
/// `a = 1 OR (b = 2 AND c = 3)`; parentheses override as usual.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereExpr {
    Condition(Condition),
    Logical {
        op: LogicalOp,
        left: Box<WhereExpr>,
        right: Box<WhereExpr>,
    },
}

impl WhereExpr {
    /// The first condition along the left spine. Anchored WHERE evaluation
    /// derives its anchor path from this condition's field.
    pub fn first_condition(&self) -> &Condition {
        match self {
            WhereExpr::Condition(cond) => cond,
            WhereExpr::Logical { left, .. } => left.first_condition(),
        }
    }

    /// Every field referenced anywhere in the tree, left to right.
    pub fn fields(&self) -> Vec<&FieldPath> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a FieldPath>) {
        match self {
            WhereExpr::Condition(cond) => out.push(&cond.field),
            WhereExpr::Logical { left, right, .. } => {
                left.collect_fields(out);
                right.collect_fields(out);
            }
        }
    }

    /// Mutable variant of [`WhereExpr::fields`], used by the post-parse
    /// variable-resolution pass.
    pub fn fields_mut(&mut self) -> Vec<&mut FieldPath> {
        let mut out = Vec::new();
        self.collect_fields_mut(&mut out);
        out
    }

    fn collect_fields_mut<'a>(&'a mut self, out: &mut Vec<&'a mut FieldPath>) {
        match self {
            WhereExpr::Condition(cond) => out.push(&mut cond.field),
            WhereExpr::Logical { left, right, .. } => {
                left.collect_fields_mut(out);
                right.collect_fields_mut(out);
            }
        }
    }
}
