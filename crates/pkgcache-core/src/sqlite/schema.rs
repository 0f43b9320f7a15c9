use rusqlite::{Connection, OptionalExtension};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SqliteSchema {
    pub table: &'static str,
    pub up_sql: &'static str,
    pub down_sql: &'static str,
}

// Column names and order match caches written by earlier backends, so an
// existing packages database can be opened as-is. Those declared `repo
// string`, which coerces numeric-looking repositories; new caches use text.
const PACKAGES_SCHEMA: SqliteSchema = SqliteSchema {
    table: "packages",
    up_sql: r#"
CREATE TABLE packages (
    name text,
    version text,
    deps text,
    arch text,
    short_desc text,
    long_desc text,
    repo text,
    primary key(name, version, arch, repo)
);

CREATE INDEX IF NOT EXISTS idx_packages_name ON packages (name);
"#,
    down_sql: r#"
DROP INDEX IF EXISTS idx_packages_name;
DROP TABLE IF EXISTS packages;
"#,
};

pub fn packages_schema() -> &'static SqliteSchema {
    &PACKAGES_SCHEMA
}

pub fn schema_exists(connection: &Connection) -> rusqlite::Result<bool> {
    let found: Option<String> = connection
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [PACKAGES_SCHEMA.table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn create_schema(connection: &mut Connection) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(PACKAGES_SCHEMA.up_sql)?;
    transaction.commit()
}

pub fn drop_schema(connection: &mut Connection) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(PACKAGES_SCHEMA.down_sql)?;
    transaction.commit()
}
