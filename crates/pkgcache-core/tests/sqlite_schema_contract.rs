use pkgcache_core::sqlite::packages_schema;

#[test]
fn package_table_keeps_its_historical_name_and_columns() {
    let schema = packages_schema();
    assert_eq!(schema.table, "packages");

    for column in [
        "name text",
        "version text",
        "deps text",
        "arch text",
        "short_desc text",
        "long_desc text",
        "repo text",
    ] {
        assert!(
            schema.up_sql.contains(column),
            "schema is missing column '{column}'"
        );
    }
}

#[test]
fn primary_key_covers_name_version_arch_and_repo() {
    assert!(
        packages_schema()
            .up_sql
            .contains("primary key(name, version, arch, repo)")
    );
}

#[test]
fn schema_sql_is_defined_for_up_and_down_paths() {
    let schema = packages_schema();
    assert!(!schema.up_sql.trim().is_empty(), "up sql must not be empty");
    assert!(
        !schema.down_sql.trim().is_empty(),
        "down sql must not be empty"
    );
    assert!(schema.down_sql.contains("DROP TABLE IF EXISTS packages"));
}
