//! Query execution: file discovery, per-file extraction, aggregation, and
//! the result-shaping pipeline, with multi-threaded fan-out across files.
//!
//! Each call to [`Executor::execute`] is self-contained. Whole files are the
//! unit of parallelism: when enough files are discovered, worker threads take
//! a strided share of the file list, process their documents independently,
//! and send per-file row batches over a channel to a single collector. No
//! document is ever shared between threads.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::ast::{Aggregate, FieldPath, OrderDirection, Query, WhereExpr};
use crate::document::{XmlDocument, XmlNode};
use crate::resolver;

/// Joins group-key parts; an ASCII control character cannot appear in
/// parsed XML text content, so composite keys cannot collide with data.
const GROUP_KEY_SEPARATOR: char = '\u{1f}';

/// Worker threads are capped to bound contention regardless of hardware.
const MAX_WORKER_THREADS: usize = 16;

/// One result row: `(column name, value)` pairs in SELECT order.
///
/// Duplicate column names are permitted (the same aggregate can be selected
/// twice); values are copied out of the document, so rows outlive it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultRow {
    pub columns: Vec<(String, String)>,
}

impl ResultRow {
    pub fn new() -> Self {
        ResultRow::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.columns.push((name.into(), value.into()));
    }

    /// Value of the first column with this name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value.as_str())
    }

    /// Canonical serialization used by DISTINCT.
    fn distinct_key(&self) -> String {
        let mut key = String::new();
        for (name, value) in &self.columns {
            key.push_str(name);
            key.push(GROUP_KEY_SEPARATOR);
            key.push_str(value);
            key.push(GROUP_KEY_SEPARATOR);
        }
        key
    }
}

/// Progress callback: `(files completed, files total)`.
pub type ProgressFn = dyn Fn(usize, usize) + Send + Sync;

/// Execution tuning, injected rather than read from globals so behavior is
/// deterministic and testable.
#[derive(Clone)]
pub struct ExecutorConfig {
    /// Upper bound on worker threads; also bounded by
    /// [`MAX_WORKER_THREADS`] and the file count. `1` forces sequential
    /// execution.
    pub max_threads: usize,
    /// Minimum file count before threads are worth spawning
    pub parallel_threshold: usize,
    /// Invoked from a monitor thread roughly once per second while workers
    /// run
    pub progress: Option<Arc<ProgressFn>>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            max_threads: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .min(MAX_WORKER_THREADS),
            parallel_threshold: 5,
            progress: None,
        }
    }
}

impl ExecutorConfig {
    /// A configuration that never spawns worker threads.
    pub fn sequential() -> Self {
        ExecutorConfig {
            max_threads: 1,
            ..ExecutorConfig::default()
        }
    }

    pub fn with_progress(mut self, progress: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }
}

/// Executes parsed queries against XML files. Holds no state between calls.
#[derive(Default)]
pub struct Executor {
    config: ExecutorConfig,
}

impl Executor {
    pub fn new() -> Self {
        Executor::default()
    }

    pub fn with_config(config: ExecutorConfig) -> Self {
        Executor { config }
    }

    /// Runs a query and returns its ordered result rows.
    ///
    /// Failures degrade rather than abort: an unresolvable FROM path or an
    /// empty directory yields an empty result with a logged warning, and a
    /// file that fails to load is skipped while the rest of the batch
    /// continues.
    pub fn execute(&self, query: &Query) -> Vec<ResultRow> {
        let files = discover_files(&query.from_path);
        if files.is_empty() {
            warn!("no XML files found at '{}'", query.from_path);
            return Vec::new();
        }

        let mut rows = if files.len() >= self.config.parallel_threshold && self.config.max_threads > 1
        {
            self.run_parallel(query, &files)
        } else {
            run_sequential(query, &files)
        };

        if query.has_aggregates {
            rows = aggregate_rows(query, rows);
        }
        apply_modifiers(query, &mut rows);
        rows
    }

    /// Samples the first discovered file and reports every SELECT/WHERE
    /// field whose partial path suffix-matches more than one distinct
    /// ancestor chain there. Advisory only; the query still runs with
    /// first-match semantics.
    pub fn check_ambiguous_fields(&self, query: &Query) -> Vec<String> {
        let files = discover_files(&query.from_path);
        let Some(sample) = files.first() else {
            return Vec::new();
        };
        let doc = match XmlDocument::load(sample) {
            Ok(doc) => doc,
            Err(err) => {
                warn!("cannot sample {} for ambiguity check: {err}", sample.display());
                return Vec::new();
            }
        };

        let mut fields: Vec<&FieldPath> = query.select_fields.iter().collect();
        if let Some(where_clause) = &query.where_clause {
            fields.extend(where_clause.fields());
        }

        let mut seen = HashSet::new();
        let mut ambiguous = Vec::new();
        for field in fields {
            if field.is_variable_ref || field.include_filename || field.components.len() < 2 {
                continue;
            }
            if resolver::count_matching_paths(&doc.root, &field.components) > 1 {
                let name = field.components.join(".");
                if seen.insert(name.clone()) {
                    ambiguous.push(name);
                }
            }
        }
        ambiguous
    }

    fn run_parallel(&self, query: &Query, files: &[PathBuf]) -> Vec<ResultRow> {
        let worker_count = self
            .config
            .max_threads
            .clamp(1, MAX_WORKER_THREADS)
            .min(files.len());
        debug!(
            "processing {} files across {} worker threads",
            files.len(),
            worker_count
        );

        let completed = AtomicUsize::new(0);
        let done = AtomicBool::new(false);
        let mut rows = Vec::new();

        thread::scope(|scope| {
            let (sender, receiver) = mpsc::channel::<Vec<ResultRow>>();

            for worker in 0..worker_count {
                let sender = sender.clone();
                let completed = &completed;
                scope.spawn(move || {
                    // Strided assignment: worker w takes files w, w+n, w+2n,
                    // ... which balances unevenly sized files
                    for index in (worker..files.len()).step_by(worker_count) {
                        let batch = load_and_process(query, &files[index]);
                        completed.fetch_add(1, Ordering::Relaxed);
                        if !batch.is_empty() && sender.send(batch).is_err() {
                            return;
                        }
                    }
                });
            }
            drop(sender);

            if let Some(progress) = self.config.progress.clone() {
                let completed = &completed;
                let done = &done;
                let total = files.len();
                scope.spawn(move || {
                    let mut ticks = 0u32;
                    while !done.load(Ordering::Acquire) {
                        thread::sleep(Duration::from_millis(100));
                        ticks += 1;
                        if ticks % 10 == 0 {
                            (*progress)(completed.load(Ordering::Relaxed), total);
                        }
                    }
                    (*progress)(completed.load(Ordering::Relaxed), total);
                });
            }

            // Fan-in: the collector is the only owner of the result vector
            for batch in receiver {
                rows.extend(batch);
            }
            done.store(true, Ordering::Release);
        });

        rows
    }
}

fn run_sequential(query: &Query, files: &[PathBuf]) -> Vec<ResultRow> {
    let mut rows = Vec::new();
    for file in files {
        rows.extend(load_and_process(query, file));
    }
    rows
}

fn load_and_process(query: &Query, file: &Path) -> Vec<ResultRow> {
    match XmlDocument::load(file) {
        Ok(doc) => process_document(query, &doc),
        Err(err) => {
            // A bad file never aborts the batch
            warn!("skipping {}: {err}", file.display());
            Vec::new()
        }
    }
}

/// Resolves the FROM path to a concrete file list: a regular file is taken
/// as-is, a directory contributes its `*.xml` entries (non-recursive,
/// sorted for deterministic assignment).
fn discover_files(from_path: &str) -> Vec<PathBuf> {
    let path = Path::new(from_path);
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    if !path.is_dir() {
        return Vec::new();
    }
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("cannot read directory {}: {err}", path.display());
            return Vec::new();
        }
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
        })
        .collect();
    files.sort();
    files
}

/// Per-file processing. The mode is a property of the query, chosen once:
/// FOR clauses drive nested iteration; a bare WHERE anchors extraction at
/// the condition's parent path; otherwise field lists are zipped by
/// position.
fn process_document(query: &Query, doc: &XmlDocument) -> Vec<ResultRow> {
    if !query.for_clauses.is_empty() {
        iterate_for_clauses(query, doc)
    } else if let Some(where_clause) = &query.where_clause {
        extract_with_where(query, doc, where_clause)
    } else {
        extract_positional(query, doc)
    }
}

// ---------------------------------------------------------------------------
// Mode 1: no FOR, no WHERE — index-aligned zip of per-field value lists
// ---------------------------------------------------------------------------

/// Each SELECT field resolves its full value list independently; rows are
/// formed by positional index up to the longest list, shorter lists padded
/// with empty strings. This is a zip, not a Cartesian product — a known,
/// deliberately preserved limitation when field cardinalities differ.
fn extract_positional(query: &Query, doc: &XmlDocument) -> Vec<ResultRow> {
    let lists: Vec<Vec<String>> = query
        .select_fields
        .iter()
        .map(|field| {
            if field.include_filename || field.is_count_star() {
                Vec::new()
            } else {
                resolver::collect_values(&doc.root, field)
            }
        })
        .collect();

    let mut height = lists.iter().map(Vec::len).max().unwrap_or(0);
    // A query selecting only synthetic fields still yields one row per file
    if height == 0
        && query
            .select_fields
            .iter()
            .all(|f| f.include_filename || f.is_count_star())
    {
        height = 1;
    }

    let mut rows = Vec::with_capacity(height);
    for index in 0..height {
        let mut row = ResultRow::new();
        for (field, list) in query.select_fields.iter().zip(&lists) {
            let value = if field.include_filename {
                doc.file_name.clone()
            } else {
                list.get(index).cloned().unwrap_or_default()
            };
            row.push(field.display_name(), value);
        }
        append_group_columns(query, &mut row, |field| {
            resolver::resolve_first(&doc.root, field)
        });
        rows.push(row);
    }
    rows
}

// ---------------------------------------------------------------------------
// Mode 2: WHERE without FOR — anchored evaluation
// ---------------------------------------------------------------------------

fn extract_with_where(
    query: &Query,
    doc: &XmlDocument,
    where_clause: &WhereExpr,
) -> Vec<ResultRow> {
    let first = where_clause.first_condition();
    let components = &first.field.components;
    let anchor_components: &[String] = if components.is_empty() {
        &[]
    } else {
        &components[..components.len() - 1]
    };

    if anchor_components.len() >= 2 {
        anchored_extraction(query, doc, where_clause, anchor_components)
    } else {
        scan_extraction(query, doc, where_clause)
    }
}

/// The first condition's parent path locates anchor nodes; the WHERE tree
/// and all SELECT fields are then resolved relative to each anchor, so
/// sibling fields of the matched node end up in the same row.
fn anchored_extraction(
    query: &Query,
    doc: &XmlDocument,
    where_clause: &WhereExpr,
    anchor_components: &[String],
) -> Vec<ResultRow> {
    let mut rows = Vec::new();
    for anchor in resolver::collect_matches(&doc.root, anchor_components) {
        let passes = resolver::evaluate_where(where_clause, &|cond| {
            let value = resolver::resolve_relative(anchor, anchor_components, &cond.field);
            resolver::compare(cond, &value)
        });
        if passes {
            rows.push(extract_row_at(query, doc, anchor, anchor_components));
        }
    }
    rows
}

/// Top-level conditions (anchor path shorter than two components) scan the
/// whole tree for plausible holder nodes. Null checks must run on nodes
/// *lacking* the WHERE field, so their candidate rule keys off the SELECT
/// fields instead.
fn scan_extraction(query: &Query, doc: &XmlDocument, where_clause: &WhereExpr) -> Vec<ResultRow> {
    let first = where_clause.first_condition();
    let null_check = first.op.is_null_check();

    let mut candidates: Vec<&XmlNode> = Vec::new();
    resolver::for_each_node(&doc.root, &mut |node| {
        let candidate = if null_check {
            query
                .select_fields
                .iter()
                .any(|field| !field.include_filename && resolver::owns_field(node, field))
        } else {
            resolver::owns_field(node, &first.field)
        };
        if candidate {
            candidates.push(node);
        }
    });

    let mut rows = Vec::new();
    for node in candidates {
        let passes = resolver::evaluate_where(where_clause, &|cond| {
            let value = resolver::resolve_first(node, &cond.field);
            resolver::compare(cond, &value)
        });
        if passes {
            rows.push(extract_row_at(query, doc, node, &[]));
        }
    }
    rows
}

fn extract_row_at(
    query: &Query,
    doc: &XmlDocument,
    anchor: &XmlNode,
    anchor_components: &[String],
) -> ResultRow {
    let mut row = ResultRow::new();
    for field in &query.select_fields {
        let value = if field.include_filename {
            doc.file_name.clone()
        } else if field.is_count_star() {
            String::new()
        } else {
            resolver::resolve_relative(anchor, anchor_components, field)
        };
        row.push(field.display_name(), value);
    }
    append_group_columns(query, &mut row, |field| {
        resolver::resolve_relative(anchor, anchor_components, field)
    });
    row
}

// ---------------------------------------------------------------------------
// Mode 3: FOR clauses — recursive nested-loop iteration
// ---------------------------------------------------------------------------

/// Variable environment for one branch of the nested iteration. Each
/// recursion level gets its own copy with one more binding, so unwinding a
/// level is just dropping the child environment — sibling iterations can
/// never observe stale bindings.
#[derive(Clone, Default)]
struct Bindings<'a> {
    variables: Vec<(&'a str, &'a XmlNode)>,
    positions: Vec<(&'a str, usize)>,
}

impl<'a> Bindings<'a> {
    fn bind(&self, clause: &'a crate::ast::ForClause, node: &'a XmlNode, position: usize) -> Self {
        let mut child = self.clone();
        child.variables.push((clause.variable.as_str(), node));
        if let Some(pos_var) = &clause.position_var {
            child.positions.push((pos_var.as_str(), position));
        }
        child
    }

    fn node(&self, name: &str) -> Option<&'a XmlNode> {
        self.variables
            .iter()
            .find(|(var, _)| *var == name)
            .map(|(_, node)| *node)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.positions
            .iter()
            .find(|(var, _)| *var == name)
            .map(|(_, pos)| *pos)
    }

    fn innermost(&self) -> Option<&'a XmlNode> {
        self.variables.last().map(|(_, node)| *node)
    }
}

fn iterate_for_clauses(query: &Query, doc: &XmlDocument) -> Vec<ResultRow> {
    let mut rows = Vec::new();
    bind_clause(query, doc, 0, &Bindings::default(), &mut rows);
    rows
}

fn bind_clause<'a>(
    query: &'a Query,
    doc: &'a XmlDocument,
    depth: usize,
    env: &Bindings<'a>,
    rows: &mut Vec<ResultRow>,
) {
    if depth == query.for_clauses.len() {
        let passes = query.where_clause.as_ref().map_or(true, |where_clause| {
            resolver::evaluate_where(where_clause, &|cond| {
                let value = resolve_in_context(doc, env, &cond.field);
                resolver::compare(cond, &value)
            })
        });
        if passes {
            rows.push(build_iteration_row(query, doc, env));
        }
        return;
    }

    let clause = &query.for_clauses[depth];
    let candidates = iteration_candidates(doc, env, clause);
    for (index, node) in candidates.into_iter().enumerate() {
        let child = env.bind(clause, node, index + 1);
        bind_clause(query, doc, depth + 1, &child, rows);
    }
}

/// A FOR path whose head names an already-bound variable iterates inside
/// that variable's subtree (`FOR $e IN $d.employee`); otherwise it iterates
/// from the document root.
fn iteration_candidates<'a>(
    doc: &'a XmlDocument,
    env: &Bindings<'a>,
    clause: &crate::ast::ForClause,
) -> Vec<&'a XmlNode> {
    if let Some(outer) = clause.path.head_variable().and_then(|name| env.node(name)) {
        let tail = clause.path.tail(1);
        if tail.components.is_empty() {
            return vec![outer];
        }
        return resolver::collect_matches(outer, &tail.components);
    }
    resolver::collect_matches(&doc.root, &clause.path.components)
}

/// Resolves a field with the loop variables in scope: a field headed by a
/// bound variable navigates from that variable's node (a position variable
/// yields its counter), anything else falls back to the innermost
/// iteration context.
fn resolve_in_context(doc: &XmlDocument, env: &Bindings<'_>, field: &FieldPath) -> String {
    if field.include_filename {
        return doc.file_name.clone();
    }

    if field.is_variable_ref {
        let name = field.variable_name.as_deref().unwrap_or_default();
        if let Some(position) = env.position(name) {
            return position.to_string();
        }
        if let Some(node) = env.node(name) {
            let tail = field.tail(1);
            if tail.components.is_empty() {
                return resolver::value_at(node, field);
            }
            return resolver::resolve_first(node, &tail);
        }
        return String::new();
    }

    // Plain tag paths are legal alongside FOR; they resolve within the
    // innermost bound node
    let base = env.innermost().unwrap_or(&doc.root);
    resolver::resolve_first(base, field)
}

fn build_iteration_row(query: &Query, doc: &XmlDocument, env: &Bindings<'_>) -> ResultRow {
    let mut row = ResultRow::new();
    for field in &query.select_fields {
        let value = if field.is_count_star() {
            String::new()
        } else {
            resolve_in_context(doc, env, field)
        };
        row.push(field.display_name(), value);
    }
    append_group_columns(query, &mut row, |field| resolve_in_context(doc, env, field));
    row
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// When aggregating with GROUP BY, the grouping fields must be resolvable
/// per contribution row even when they are not selected; they ride along as
/// trailing columns and are dropped when the aggregate output is built.
fn append_group_columns(
    query: &Query,
    row: &mut ResultRow,
    resolve: impl Fn(&FieldPath) -> String,
) {
    if !query.has_aggregates || query.group_by_fields.is_empty() {
        return;
    }
    for name in &query.group_by_fields {
        if row.get(name).is_none() {
            let field = parse_group_field(query, name);
            let value = resolve(&field);
            row.push(name.clone(), value);
        }
    }
}

/// Rebuilds a FieldPath from a GROUP BY name string (`dept.name`,
/// `$d.name`, `book.@isbn`).
fn parse_group_field(query: &Query, name: &str) -> FieldPath {
    let mut field = FieldPath::default();
    for segment in name.split('.') {
        if let Some(attr) = segment.strip_prefix('@') {
            field.is_attribute = true;
            field.attribute_name = Some(attr.to_string());
        } else {
            field.components.push(segment.to_string());
        }
    }
    if let Some(head) = field.head_variable().map(|h| h.to_string()) {
        if query.is_for_variable(&head) || query.is_position_variable(&head) {
            field.is_variable_ref = true;
            field.variable_name = Some(head);
        }
    }
    field
}

/// Collapses contribution rows into aggregate output rows: one row total
/// without GROUP BY, one per partition with it. Partitions keep first-seen
/// order.
fn aggregate_rows(query: &Query, raw: Vec<ResultRow>) -> Vec<ResultRow> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<ResultRow>> = HashMap::new();

    for row in raw {
        let key = if query.group_by_fields.is_empty() {
            String::new()
        } else {
            let parts: Vec<&str> = query
                .group_by_fields
                .iter()
                .map(|name| row.get(name).unwrap_or_default())
                .collect();
            parts.join(&GROUP_KEY_SEPARATOR.to_string())
        };
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(row);
    }

    // Even zero contribution rows produce one output row when not grouping
    // (COUNT(*) over an empty match set is 0, not absent)
    if query.group_by_fields.is_empty() && order.is_empty() {
        order.push(String::new());
        groups.insert(String::new(), Vec::new());
    }

    let mut out = Vec::with_capacity(order.len());
    for key in order {
        let partition = &groups[&key];
        let mut row = ResultRow::new();
        for field in &query.select_fields {
            let name = field.display_name();
            let value = match field.aggregate {
                Aggregate::None => partition
                    .first()
                    .and_then(|r| r.get(&name))
                    .unwrap_or_default()
                    .to_string(),
                Aggregate::Count => {
                    if field.is_count_star() {
                        partition.len().to_string()
                    } else {
                        partition
                            .iter()
                            .filter(|r| r.get(&name).is_some_and(|v| !v.is_empty()))
                            .count()
                            .to_string()
                    }
                }
                Aggregate::Sum => format_number(numeric_values(partition, &name).iter().sum()),
                Aggregate::Avg => {
                    let values = numeric_values(partition, &name);
                    if values.is_empty() {
                        "0".to_string()
                    } else {
                        format_number(values.iter().sum::<f64>() / values.len() as f64)
                    }
                }
                Aggregate::Min => numeric_values(partition, &name)
                    .into_iter()
                    .fold(None::<f64>, |min, v| Some(min.map_or(v, |m| m.min(v))))
                    .map(format_number)
                    .unwrap_or_default(),
                Aggregate::Max => numeric_values(partition, &name)
                    .into_iter()
                    .fold(None::<f64>, |max, v| Some(max.map_or(v, |m| m.max(v))))
                    .map(format_number)
                    .unwrap_or_default(),
            };
            row.push(name, value);
        }
        out.push(row);
    }
    out
}

/// Values in the named column that parse as numbers; everything else is
/// silently skipped, since semi-structured data is expected to have
/// missing or irregular fields.
fn numeric_values(rows: &[ResultRow], name: &str) -> Vec<f64> {
    rows.iter()
        .filter_map(|row| row.get(name))
        .filter_map(|value| value.parse::<f64>().ok())
        .collect()
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// Result shaping
// ---------------------------------------------------------------------------

/// Applies the trailing modifiers in a fixed order regardless of query
/// shape: ORDER BY, then DISTINCT, then OFFSET, then LIMIT.
fn apply_modifiers(query: &Query, rows: &mut Vec<ResultRow>) {
    // Only the first ORDER BY field is honored
    if let Some((name, direction)) = query.order_by_fields.first() {
        rows.sort_by(|a, b| {
            let left = a.get(name).unwrap_or_default();
            let right = b.get(name).unwrap_or_default();
            let ordering = match (left.parse::<f64>(), right.parse::<f64>()) {
                (Ok(l), Ok(r)) => l.partial_cmp(&r).unwrap_or(std::cmp::Ordering::Equal),
                _ => left.cmp(right),
            };
            match direction {
                OrderDirection::Ascending => ordering,
                OrderDirection::Descending => ordering.reverse(),
            }
        });
    }

    if query.distinct {
        let mut seen = HashSet::new();
        rows.retain(|row| seen.insert(row.distinct_key()));
    }

    if let Some(offset) = query.offset {
        let offset = (offset as usize).min(rows.len());
        rows.drain(..offset);
    }

    if let Some(limit) = query.limit {
        rows.truncate(limit as usize);
    }
}
