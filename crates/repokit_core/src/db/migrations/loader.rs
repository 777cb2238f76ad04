//! Migration discovery from `<version>_<name>.up.sql` / `.down.sql` files.

use super::{MigrateError, MigrateResult, Migration};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

static FILE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)_([A-Za-z0-9_\-]+)\.(up|down)\.sql$").expect("valid migration file regex")
});

#[derive(Default)]
struct Pair {
    name: String,
    up: Option<String>,
    down: Option<String>,
}

/// Reads every migration file in `dir`, ordered by version.
///
/// Files that do not match the naming pattern are skipped. An empty down
/// file leaves the migration irreversible.
pub(crate) fn load_dir(dir: &Path) -> MigrateResult<Vec<Migration>> {
    let entries = fs::read_dir(dir).map_err(|source| MigrateError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut pairs: BTreeMap<String, Pair> = BTreeMap::new();
    for entry in entries {
        let entry = entry.map_err(|source| MigrateError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let Some(captures) = FILE_NAME.captures(&file_name) else {
            debug!("event=migrate_load module=migrate status=skip file={file_name}");
            continue;
        };

        let version = captures[1].to_string();
        let name = captures[2].to_string();
        let sql = fs::read_to_string(&path).map_err(|source| MigrateError::Io {
            path: path.clone(),
            source,
        })?;

        let pair = pairs.entry(version.clone()).or_default();
        if pair.name.is_empty() {
            pair.name = name;
        } else if pair.name != name {
            return Err(MigrateError::InvalidMigration(format!(
                "version {version} has files named `{}` and `{name}`",
                pair.name
            )));
        }
        let slot = if &captures[3] == "up" {
            &mut pair.up
        } else {
            &mut pair.down
        };
        *slot = Some(sql);
    }

    let mut migrations = Vec::with_capacity(pairs.len());
    for (version, pair) in pairs {
        let Some(up) = pair.up else {
            return Err(MigrateError::InvalidMigration(format!(
                "version {version} has a down file but no up file"
            )));
        };
        let mut migration = Migration::sql(version, pair.name, up);
        if let Some(down) = pair.down.filter(|sql| !sql.trim().is_empty()) {
            migration = migration.down_sql(down);
        }
        migrations.push(migration);
    }
    Ok(migrations)
}
