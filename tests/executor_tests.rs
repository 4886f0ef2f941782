// tests/executor_tests.rs

use std::fs;
use std::path::Path;

use tempfile::TempDir;
use xql_lang::executor::{Executor, ExecutorConfig, ResultRow};
use xql_lang::parser::parse;

fn write_file(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

fn run(query: &str) -> Vec<ResultRow> {
    Executor::new().execute(&parse(query).unwrap())
}

fn values(rows: &[ResultRow], column: &str) -> Vec<String> {
    rows.iter()
        .map(|row| row.get(column).unwrap_or_default().to_string())
        .collect()
}

// ============================================================================
// Field extraction (no FOR, no WHERE)
// ============================================================================

#[test]
fn test_simple_extraction_from_one_file() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "books.xml",
        "<library><book><title>Dune</title></book><book><title>Solaris</title></book></library>",
    );

    let rows = run(&format!(
        r#"SELECT book.title FROM "{}""#,
        dir.path().join("books.xml").display()
    ));
    assert_eq!(values(&rows, "book.title"), vec!["Dune", "Solaris"]);
}

#[test]
fn zip_pads_shorter_field_lists() {
    // Pins the index-aligned zip: rows are formed by position, not by
    // Cartesian product, and short lists pad with empty strings
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "data.xml",
        "<r><a>1</a><a>2</a><a>3</a><b>x</b></r>",
    );

    let rows = run(&format!(
        r#"SELECT a, b FROM "{}""#,
        dir.path().join("data.xml").display()
    ));
    assert_eq!(rows.len(), 3);
    assert_eq!(values(&rows, "a"), vec!["1", "2", "3"]);
    assert_eq!(values(&rows, "b"), vec!["x", "", ""]);
}

#[test]
fn test_file_name_column_is_synthetic() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "inv.xml", "<r><sku>A1</sku></r>");

    let rows = run(&format!(
        r#"SELECT FILE_NAME, sku FROM "{}""#,
        dir.path().join("inv.xml").display()
    ));
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("FILE_NAME"), Some("inv.xml"));
    assert_eq!(rows[0].get("sku"), Some("A1"));
}

#[test]
fn test_attribute_extraction() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "books.xml",
        r#"<inv><book isbn="111"/><book isbn="222"/></inv>"#,
    );

    let rows = run(&format!(
        r#"SELECT book.@isbn FROM "{}""#,
        dir.path().join("books.xml").display()
    ));
    assert_eq!(values(&rows, "book.@isbn"), vec!["111", "222"]);
}

#[test]
fn test_empty_directory_yields_empty_result_not_error() {
    let dir = TempDir::new().unwrap();
    let rows = run(&format!(r#"SELECT a FROM "{}""#, dir.path().display()));
    assert!(rows.is_empty());
}

#[test]
fn test_missing_path_yields_empty_result_not_error() {
    let rows = run(r#"SELECT a FROM "/no/such/place/at/all""#);
    assert!(rows.is_empty());
}

#[test]
fn test_malformed_file_is_skipped_batch_continues() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "good.xml", "<r><v>ok</v></r>");
    write_file(dir.path(), "bad.xml", "<open><unclosed>");

    let rows = run(&format!(r#"SELECT v FROM "{}""#, dir.path().display()));
    assert_eq!(values(&rows, "v"), vec!["ok"]);
}

#[test]
fn test_non_xml_files_are_not_discovered() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "data.xml", "<r><v>1</v></r>");
    write_file(dir.path(), "notes.txt", "<r><v>2</v></r>");

    let rows = run(&format!(r#"SELECT v FROM "{}""#, dir.path().display()));
    assert_eq!(rows.len(), 1);
}

// ============================================================================
// WHERE evaluation
// ============================================================================

fn staff_file(dir: &Path) -> String {
    write_file(
        dir,
        "staff.xml",
        "<company><department>\
           <employee><name>Ana</name><salary>100</salary></employee>\
           <employee><name>Bo</name><salary>50</salary></employee>\
           <employee><name>Cy</name><salary>75</salary></employee>\
         </department></company>",
    );
    dir.join("staff.xml").display().to_string()
}

#[test]
fn test_anchored_where_returns_sibling_fields() {
    let dir = TempDir::new().unwrap();
    let file = staff_file(dir.path());

    let rows = run(&format!(
        r#"SELECT department.employee.name FROM "{file}" WHERE department.employee.salary > 60"#
    ));
    assert_eq!(values(&rows, "department.employee.name"), vec!["Ana", "Cy"]);
}

#[test]
fn test_where_with_and_or_precedence() {
    let dir = TempDir::new().unwrap();
    let file = staff_file(dir.path());

    // salary > 90 OR (salary > 60 AND name = Cy) -> Ana and Cy
    let query = format!(
        r#"SELECT department.employee.name FROM "{file}" WHERE department.employee.salary > 90 OR department.employee.salary > 60 AND department.employee.name = Cy"#
    );
    let rows = run(&query);
    assert_eq!(values(&rows, "department.employee.name"), vec!["Ana", "Cy"]);
}

#[test]
fn test_top_level_where_scans_candidate_holders() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "items.xml",
        "<inv>\
           <item><name>a</name><price>5</price></item>\
           <item><name>b</name><price>2</price></item>\
         </inv>",
    );

    let rows = run(&format!(
        r#"SELECT name FROM "{}" WHERE price > 3"#,
        dir.path().join("items.xml").display()
    ));
    assert_eq!(values(&rows, "name"), vec!["a"]);
}

#[test]
fn test_is_null_and_is_not_null_partition_the_candidates() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "items.xml",
        "<inv>\
           <item><name>a</name><price>5</price></item>\
           <item><name>b</name></item>\
           <item><name>c</name></item>\
         </inv>",
    );
    let file = dir.path().join("items.xml").display().to_string();

    let nulls = run(&format!(r#"SELECT name FROM "{file}" WHERE price IS NULL"#));
    assert_eq!(values(&nulls, "name"), vec!["b", "c"]);

    let not_nulls = run(&format!(
        r#"SELECT name FROM "{file}" WHERE price IS NOT NULL"#
    ));
    assert_eq!(values(&not_nulls, "name"), vec!["a"]);

    // Exact complement over the same candidate set
    assert_eq!(nulls.len() + not_nulls.len(), 3);
}

#[test]
fn test_like_filters_by_regex_search() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "items.xml",
        "<inv>\
           <item><name>redwood</name><kind>tree</kind></item>\
           <item><name>bluebell</name><kind>flower</kind></item>\
           <item><name>cactus</name><kind>plant</kind></item>\
         </inv>",
    );

    let rows = run(&format!(
        r#"SELECT kind FROM "{}" WHERE name LIKE /red|blue/"#,
        dir.path().join("items.xml").display()
    ));
    assert_eq!(values(&rows, "kind"), vec!["tree", "flower"]);
}

// ============================================================================
// FOR iteration
// ============================================================================

fn org_file(dir: &Path) -> String {
    write_file(
        dir,
        "org.xml",
        "<org>\
           <department><dname>Eng</dname>\
             <employee><name>Ana</name><salary>100</salary></employee>\
             <employee><name>Bo</name><salary>50</salary></employee>\
           </department>\
           <department><dname>Ops</dname>\
             <employee><name>Cy</name><salary>75</salary></employee>\
           </department>\
         </org>",
    );
    dir.join("org.xml").display().to_string()
}

#[test]
fn test_nested_for_yields_union_without_leakage() {
    let dir = TempDir::new().unwrap();
    let file = org_file(dir.path());

    let rows = run(&format!(
        r#"SELECT $d.dname, $e.name FROM "{file}" FOR $d IN department FOR $e IN $d.employee"#
    ));
    // Each employee bound to its own department, siblings never leak
    assert_eq!(values(&rows, "$d.dname"), vec!["Eng", "Eng", "Ops"]);
    assert_eq!(values(&rows, "$e.name"), vec!["Ana", "Bo", "Cy"]);
}

#[test]
fn test_position_variable_counts_from_one() {
    let dir = TempDir::new().unwrap();
    let file = org_file(dir.path());

    let rows = run(&format!(
        r#"SELECT $i, $e.name FROM "{file}" FOR $e IN employee AT $i"#
    ));
    assert_eq!(values(&rows, "$i"), vec!["1", "2", "3"]);
}

#[test]
fn test_for_with_where_filters_per_binding() {
    let dir = TempDir::new().unwrap();
    let file = org_file(dir.path());

    let rows = run(&format!(
        r#"SELECT $e.name FROM "{file}" FOR $e IN employee WHERE $e.salary >= 75"#
    ));
    assert_eq!(values(&rows, "$e.name"), vec!["Ana", "Cy"]);
}

#[test]
fn test_position_variable_resets_per_outer_iteration() {
    let dir = TempDir::new().unwrap();
    let file = org_file(dir.path());

    let rows = run(&format!(
        r#"SELECT $d.dname, $i FROM "{file}" FOR $d IN department FOR $e IN $d.employee AT $i"#
    ));
    assert_eq!(values(&rows, "$i"), vec!["1", "2", "1"]);
}

// ============================================================================
// Aggregation
// ============================================================================

fn sales_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "day1.xml",
        "<sales><sale><price>10</price></sale><sale><price>20</price></sale></sales>",
    );
    write_file(
        dir.path(),
        "day2.xml",
        "<sales><sale><price>5</price></sale><sale><price>bad</price></sale></sales>",
    );
    dir
}

#[test]
fn test_count_star_matches_file_name_row_count() {
    let dir = sales_dir();
    let path = dir.path().display().to_string();

    let names = run(&format!(r#"SELECT FILE_NAME FROM "{path}""#));
    let counted = run(&format!(r#"SELECT COUNT(*) FROM "{path}""#));

    assert_eq!(counted.len(), 1);
    assert_eq!(
        counted[0].get("COUNT(*)"),
        Some(names.len().to_string().as_str())
    );
}

#[test]
fn test_sum_skips_non_numeric_values() {
    let dir = sales_dir();
    let rows = run(&format!(
        r#"SELECT SUM(price) FROM "{}""#,
        dir.path().display()
    ));
    assert_eq!(rows.len(), 1);
    // 10 + 20 + 5, with "bad" silently excluded
    assert_eq!(rows[0].get("SUM(price)"), Some("35"));
}

#[test]
fn test_avg_min_max_over_numeric_values() {
    let dir = sales_dir();
    let rows = run(&format!(
        r#"SELECT AVG(price), MIN(price), MAX(price) FROM "{}""#,
        dir.path().display()
    ));
    assert_eq!(rows[0].get("AVG(price)"), Some("11.666666666666666"));
    assert_eq!(rows[0].get("MIN(price)"), Some("5"));
    assert_eq!(rows[0].get("MAX(price)"), Some("20"));
}

#[test]
fn test_count_field_counts_non_empty_values() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "data.xml",
        "<r><item><v>1</v></item><item><v></v></item><item><v>3</v></item></r>",
    );
    let rows = run(&format!(
        r#"SELECT COUNT(v) FROM "{}""#,
        dir.path().join("data.xml").display()
    ));
    assert_eq!(rows[0].get("COUNT(v)"), Some("2"));
}

#[test]
fn test_group_by_partitions_rows() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "staff.xml",
        "<org>\
           <person><dept>Eng</dept><salary>100</salary></person>\
           <person><dept>Ops</dept><salary>40</salary></person>\
           <person><dept>Eng</dept><salary>60</salary></person>\
         </org>",
    );

    let rows = run(&format!(
        r#"SELECT dept, COUNT(*), SUM(salary) FROM "{}" GROUP BY dept ORDER BY dept"#,
        dir.path().join("staff.xml").display()
    ));
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("dept"), Some("Eng"));
    assert_eq!(rows[0].get("COUNT(*)"), Some("2"));
    assert_eq!(rows[0].get("SUM(salary)"), Some("160"));
    assert_eq!(rows[1].get("dept"), Some("Ops"));
    assert_eq!(rows[1].get("SUM(salary)"), Some("40"));
}

#[test]
fn test_aggregate_over_empty_match_set_still_returns_one_row() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "data.xml", "<r><other>1</other></r>");
    let rows = run(&format!(
        r#"SELECT COUNT(nothing) FROM "{}""#,
        dir.path().join("data.xml").display()
    ));
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("COUNT(nothing)"), Some("0"));
}

// ============================================================================
// Result shaping: ORDER BY -> DISTINCT -> OFFSET -> LIMIT
// ============================================================================

fn numbers_file(dir: &Path) -> String {
    write_file(
        dir,
        "n.xml",
        "<r><v>2</v><v>10</v><v>1</v><v>10</v></r>",
    );
    dir.join("n.xml").display().to_string()
}

#[test]
fn test_order_by_is_numeric_when_values_parse() {
    let dir = TempDir::new().unwrap();
    let file = numbers_file(dir.path());

    let rows = run(&format!(r#"SELECT v FROM "{file}" ORDER BY v"#));
    // Numeric order, not lexicographic ("10" would sort before "2")
    assert_eq!(values(&rows, "v"), vec!["1", "2", "10", "10"]);

    let rows = run(&format!(r#"SELECT v FROM "{file}" ORDER BY v DESC"#));
    assert_eq!(values(&rows, "v"), vec!["10", "10", "2", "1"]);
}

#[test]
fn test_order_by_falls_back_to_lexicographic() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "w.xml", "<r><v>pear</v><v>apple</v></r>");
    let rows = run(&format!(
        r#"SELECT v FROM "{}" ORDER BY v"#,
        dir.path().join("w.xml").display()
    ));
    assert_eq!(values(&rows, "v"), vec!["apple", "pear"]);
}

#[test]
fn test_distinct_runs_before_limit() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "d.xml", "<r><v>1</v><v>1</v><v>1</v><v>2</v></r>");

    // Three duplicate rows over two distinct values: LIMIT 2 must return
    // both distinct rows, not fewer
    let rows = run(&format!(
        r#"SELECT DISTINCT v FROM "{}" LIMIT 2"#,
        dir.path().join("d.xml").display()
    ));
    assert_eq!(values(&rows, "v"), vec!["1", "2"]);
}

#[test]
fn test_offset_drops_then_limit_truncates() {
    let dir = TempDir::new().unwrap();
    let file = numbers_file(dir.path());

    let rows = run(&format!(
        r#"SELECT v FROM "{file}" ORDER BY v LIMIT 2 OFFSET 1"#
    ));
    assert_eq!(values(&rows, "v"), vec!["2", "10"]);
}

#[test]
fn test_offset_is_clamped_to_result_size() {
    let dir = TempDir::new().unwrap();
    let file = numbers_file(dir.path());

    let rows = run(&format!(r#"SELECT v FROM "{file}" OFFSET 100"#));
    assert!(rows.is_empty());
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_parallel_and_sequential_runs_agree() {
    let dir = TempDir::new().unwrap();
    for i in 0..50 {
        write_file(
            dir.path(),
            &format!("f{i:02}.xml"),
            &format!("<item><n>{i}</n></item>"),
        );
    }
    let query = parse(&format!(r#"SELECT n FROM "{}""#, dir.path().display())).unwrap();

    let sequential = Executor::with_config(ExecutorConfig::sequential()).execute(&query);

    let mut parallel_config = ExecutorConfig::default();
    parallel_config.max_threads = 4;
    parallel_config.parallel_threshold = 1;
    let parallel = Executor::with_config(parallel_config).execute(&query);

    // Batch arrival order is unspecified; compare as sorted sets
    let mut seq_values = values(&sequential, "n");
    let mut par_values = values(&parallel, "n");
    seq_values.sort();
    par_values.sort();
    assert_eq!(seq_values.len(), 50);
    assert_eq!(seq_values, par_values);
}

#[test]
fn test_progress_callback_reports_completion() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let dir = TempDir::new().unwrap();
    for i in 0..10 {
        write_file(dir.path(), &format!("f{i}.xml"), "<r><v>1</v></r>");
    }
    let query = parse(&format!(r#"SELECT v FROM "{}""#, dir.path().display())).unwrap();

    let last_seen = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&last_seen);
    let mut config = ExecutorConfig::default();
    config.max_threads = 2;
    config.parallel_threshold = 1;
    let config = config.with_progress(move |completed, _total| {
        seen.store(completed, Ordering::SeqCst);
    });

    let rows = Executor::with_config(config).execute(&query);
    assert_eq!(rows.len(), 10);
    // The monitor fires a final report after all workers finish
    assert_eq!(last_seen.load(Ordering::SeqCst), 10);
}

// ============================================================================
// Ambiguity diagnostics
// ============================================================================

#[test]
fn test_ambiguous_partial_paths_are_reported() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "store.xml",
        "<store>\
           <aisle><item><name>soap</name></item></aisle>\
           <backroom><item><name>mop</name></item></backroom>\
         </store>",
    );

    let query = parse(&format!(
        r#"SELECT item.name FROM "{}" WHERE aisle.item.name IS NOT NULL"#,
        dir.path().display()
    ))
    .unwrap();
    let ambiguous = Executor::new().check_ambiguous_fields(&query);
    // item.name matches two distinct chains; aisle.item.name only one
    assert_eq!(ambiguous, vec!["item.name"]);
}
