//! # XQL - Abstract Syntax Tree
//!
//! Typed representation of a parsed XQL query, produced by
//! [`crate::parser::Parser`] and consumed read-only by
//! [`crate::executor::Executor`].
//!
//! The module is organized into focused submodules:
//!
//! - **[tokens]** - Lexical tokens produced by the lexer
//! - **[fields]** - Field paths, aggregates, and aliases
//! - **[conditions]** - WHERE expression trees and comparison operators
//! - **[query]** - The complete query with FOR clauses and modifiers
//!
//! ## The shape of a query
//!
//! ```text
//! SELECT department.employee.name, COUNT(*) AS n
//! FROM ./data
//! FOR $d IN department FOR $e IN $d.employee AT $i
//! WHERE $e.salary > 50000 AND $e.name IS NOT NULL
//! GROUP BY department.name
//! ORDER BY n DESC
//! LIMIT 10
//! ```
//!
//! Field paths are deliberately partial: `employee.name` matches any node
//! whose ancestor tag chain *ends with* those components, wherever it sits
//! in the document. See [`crate::resolver`] for the matching rules.

pub mod conditions;
pub mod fields;
pub mod query;
pub mod tokens;

pub use conditions::{ComparisonOp, Condition, LogicalOp, WhereExpr};
pub use fields::{Aggregate, FieldPath};
pub use query::{ForClause, OrderDirection, Query};
pub use tokens::{Token, TokenKind};
