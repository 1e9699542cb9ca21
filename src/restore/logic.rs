// iamrestore/src/restore/logic.rs
use std::path::Path;

use tracing::{debug, error, info, warn};

use crate::errors::{AppError, Result};
use crate::utils::command::CommandRunner;

use super::db_restore::SqlClient;
use super::names::NameTriple;
use super::plan::{Action, State, Step, compensation};

/// Result of a restore that replaced the current database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub names: NameTriple,
    /// Set when the previous data could not be dropped after the swap.
    pub orphaned: Option<String>,
}

async fn execute<R: CommandRunner>(
    runner: &R,
    client: &SqlClient,
    backup: &Path,
    action: &Action,
) -> Result<()> {
    let invocation = client.invocation(action, backup);
    info!("Running: {}", invocation);
    match runner.run(&invocation).await {
        Ok(()) => {
            info!("✓ {}", action);
            Ok(())
        }
        Err(e) => {
            error!("Failed to {}: {}", action, e);
            Err(e)
        }
    }
}

/// Replaces `names.current` with the contents of `backup`.
///
/// The backup is loaded into `names.new`, the live database is renamed to
/// `names.old`, the new one takes its name and the old one is dropped. Each
/// step that fails is followed by the rollback for that step before the
/// error is returned. A failed final drop leaves `names.old` behind and still
/// counts as success.
pub async fn perform_restore<R: CommandRunner>(
    runner: &R,
    client: &SqlClient,
    backup: &Path,
    names: &NameTriple,
) -> Result<RestoreReport> {
    let mut state = State::Start;
    debug!(?state, "Restoring {} from {}", names.current, backup.display());

    for step in Step::ALL {
        let action = step.action(names);
        match execute(runner, client, backup, &action).await {
            Ok(()) => {
                state = step.reached();
                debug!(?state, "Step {:?} complete", step);
            }
            Err(e) if step.is_best_effort() => {
                // The new data is already live under the current name.
                warn!(
                    "Restore succeeded but {} could not be dropped ({}); remove it manually",
                    names.old, e
                );
                return Ok(RestoreReport {
                    names: names.clone(),
                    orphaned: Some(names.old.clone()),
                });
            }
            Err(e) => {
                warn!(?state, "Rolling back after failed step {:?}", step);
                roll_back(runner, client, backup, names, step).await?;
                return Err(e);
            }
        }
    }

    info!("✓ Database {} restored from {}", names.current, backup.display());
    Ok(RestoreReport {
        names: names.clone(),
        orphaned: None,
    })
}

async fn roll_back<R: CommandRunner>(
    runner: &R,
    client: &SqlClient,
    backup: &Path,
    names: &NameTriple,
    failed: Step,
) -> Result<()> {
    for undo in compensation(failed, names) {
        if let Err(e) = execute(runner, client, backup, &undo.action).await {
            if undo.required {
                error!(
                    "Could not put {} back as {}; the server needs manual repair",
                    names.old, names.current
                );
                return Err(AppError::Unrecovered {
                    current: names.current.clone(),
                    old: names.old.clone(),
                    new: names.new.clone(),
                    source: Box::new(e),
                });
            }
            warn!("Rollback could not {}; it may need manual cleanup", undo.action);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Overrides, RawJsonConfig, resolve_restore_config};
    use crate::utils::command::Invocation;
    use regex::Regex;
    use std::collections::{BTreeMap, HashSet};
    use std::io::Write;
    use std::os::unix::process::ExitStatusExt;
    use std::path::PathBuf;
    use std::process::ExitStatus;
    use std::sync::{Arc, Mutex};

    /// In-memory server: database name -> table names.
    #[derive(Default)]
    struct FakeServer {
        databases: Mutex<BTreeMap<String, Vec<String>>>,
        failing: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeServer {
        fn with_current() -> Self {
            let server = Self::default();
            server
                .databases
                .lock()
                .unwrap()
                .insert("iam".into(), vec!["legacy".into()]);
            server
        }

        fn failing(mut self, label: &str) -> Self {
            self.failing.insert(label.to_string());
            self
        }

        fn databases(&self) -> BTreeMap<String, Vec<String>> {
            self.databases.lock().unwrap().clone()
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn label(invocation: &Invocation) -> String {
            match invocation.statement() {
                Some(sql) => sql.to_string(),
                None => format!("LOAD {}", invocation.flag_value("database").unwrap_or("?")),
            }
        }

        fn apply(&self, invocation: &Invocation, label: &str) -> std::result::Result<(), String> {
            let mut dbs = self.databases.lock().unwrap();
            let words: Vec<&str> = label.split_whitespace().collect();
            match words.as_slice() {
                ["CREATE", "DATABASE", db] => {
                    if dbs.contains_key(*db) {
                        return Err(format!("database {db} already exists"));
                    }
                    dbs.insert(db.to_string(), Vec::new());
                }
                ["ALTER", "DATABASE", from, "RENAME", "TO", to] => {
                    if dbs.contains_key(*to) {
                        return Err(format!("database {to} already exists"));
                    }
                    let tables = dbs.remove(*from).ok_or(format!("database {from} does not exist"))?;
                    dbs.insert(to.to_string(), tables);
                }
                ["DROP", "DATABASE", db, "CASCADE"] => {
                    dbs.remove(*db).ok_or(format!("database {db} does not exist"))?;
                }
                ["LOAD", db] => {
                    let path = invocation.stdin_file.as_ref().ok_or("no input")?;
                    let sql = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
                    let tables = dbs.get_mut(*db).ok_or(format!("database {db} does not exist"))?;
                    let create = Regex::new(r"CREATE TABLE (\w+)").unwrap();
                    tables.extend(create.captures_iter(&sql).map(|c| c[1].to_string()));
                }
                _ => return Err(format!("unsupported: {label}")),
            }
            Ok(())
        }
    }

    impl CommandRunner for FakeServer {
        async fn run(&self, invocation: &Invocation) -> Result<()> {
            let label = Self::label(invocation);
            self.calls.lock().unwrap().push(label.clone());
            let outcome = if self.failing.contains(&label) {
                Err("injected failure".to_string())
            } else {
                self.apply(invocation, &label)
            };
            outcome.map_err(|stderr| AppError::Command {
                command: invocation.to_string(),
                status: ExitStatus::from_raw(1 << 8),
                stderr,
            })
        }
    }

    struct Fixture {
        client: SqlClient,
        names: NameTriple,
        backup: tempfile::NamedTempFile,
    }

    fn fixture() -> Fixture {
        let config = resolve_restore_config(RawJsonConfig::default(), Overrides::default()).unwrap();
        let client = SqlClient::new(PathBuf::from("cockroach"), "10.0.0.5", &config);
        let mut backup = tempfile::NamedTempFile::new().unwrap();
        write!(backup, "CREATE TABLE t (id INT); INSERT INTO t VALUES (1);").unwrap();
        Fixture {
            client,
            names: NameTriple::new("iam", "s1").unwrap(),
            backup,
        }
    }

    fn only_current(tables: &[&str]) -> BTreeMap<String, Vec<String>> {
        BTreeMap::from([(
            "iam".to_string(),
            tables.iter().map(|t| t.to_string()).collect(),
        )])
    }

    #[tokio::test]
    async fn test_successful_restore_swaps_in_backup() -> anyhow::Result<()> {
        let f = fixture();
        let server = FakeServer::with_current();

        let report = perform_restore(&server, &f.client, f.backup.path(), &f.names).await?;

        assert_eq!(report.orphaned, None);
        assert_eq!(server.databases(), only_current(&["t"]));
        assert_eq!(
            server.calls(),
            vec![
                "CREATE DATABASE iam_new_s1",
                "LOAD iam_new_s1",
                "ALTER DATABASE iam RENAME TO iam_old_s1",
                "ALTER DATABASE iam_new_s1 RENAME TO iam",
                "DROP DATABASE iam_old_s1 CASCADE",
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_create_failure_touches_nothing_else() {
        let f = fixture();
        let server = FakeServer::with_current().failing("CREATE DATABASE iam_new_s1");

        let result = perform_restore(&server, &f.client, f.backup.path(), &f.names).await;

        assert!(matches!(result, Err(AppError::Command { .. })));
        assert_eq!(server.calls().len(), 1);
        assert_eq!(server.databases(), only_current(&["legacy"]));
    }

    #[tokio::test]
    async fn test_load_failure_drops_new() {
        let f = fixture();
        let server = FakeServer::with_current().failing("LOAD iam_new_s1");

        let result = perform_restore(&server, &f.client, f.backup.path(), &f.names).await;

        assert!(matches!(result, Err(AppError::Command { .. })));
        assert_eq!(server.databases(), only_current(&["legacy"]));
        assert_eq!(server.calls().last().map(String::as_str), Some("DROP DATABASE iam_new_s1 CASCADE"));
    }

    #[tokio::test]
    async fn test_swap_out_failure_leaves_current_alone() {
        let f = fixture();
        let server =
            FakeServer::with_current().failing("ALTER DATABASE iam RENAME TO iam_old_s1");

        let result = perform_restore(&server, &f.client, f.backup.path(), &f.names).await;

        assert!(result.is_err());
        assert_eq!(server.databases(), only_current(&["legacy"]));
    }

    #[tokio::test]
    async fn test_swap_in_failure_restores_previous_current() {
        let f = fixture();
        let server =
            FakeServer::with_current().failing("ALTER DATABASE iam_new_s1 RENAME TO iam");

        let result = perform_restore(&server, &f.client, f.backup.path(), &f.names).await;

        assert!(matches!(result, Err(AppError::Command { .. })));
        assert_eq!(server.databases(), only_current(&["legacy"]));
        assert_eq!(
            server.calls()[4..],
            [
                "ALTER DATABASE iam_old_s1 RENAME TO iam".to_string(),
                "DROP DATABASE iam_new_s1 CASCADE".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_rename_back_is_unrecovered() {
        let f = fixture();
        let server = FakeServer::with_current()
            .failing("ALTER DATABASE iam_new_s1 RENAME TO iam")
            .failing("ALTER DATABASE iam_old_s1 RENAME TO iam");

        let result = perform_restore(&server, &f.client, f.backup.path(), &f.names).await;

        match result {
            Err(AppError::Unrecovered { current, old, new, .. }) => {
                assert_eq!(current, "iam");
                assert_eq!(old, "iam_old_s1");
                assert_eq!(new, "iam_new_s1");
            }
            other => panic!("expected unrecovered error, got {other:?}"),
        }
        let dbs = server.databases();
        assert!(!dbs.contains_key("iam"));
        assert_eq!(dbs.get("iam_old_s1"), Some(&vec!["legacy".to_string()]));
        assert!(dbs.contains_key("iam_new_s1"));
    }

    #[tokio::test]
    async fn test_failed_rollback_drop_still_reports_step_error() {
        let f = fixture();
        let server = FakeServer::with_current()
            .failing("LOAD iam_new_s1")
            .failing("DROP DATABASE iam_new_s1 CASCADE");

        let result = perform_restore(&server, &f.client, f.backup.path(), &f.names).await;

        match result {
            Err(AppError::Command { command, .. }) => assert!(command.contains("--database=iam_new_s1")),
            other => panic!("expected load failure, got {other:?}"),
        }
        assert!(server.databases().contains_key("iam_new_s1"));
    }

    #[tokio::test]
    async fn test_swap_in_rollback_keeps_going_when_new_cannot_be_dropped() {
        let f = fixture();
        let server = FakeServer::with_current()
            .failing("ALTER DATABASE iam_new_s1 RENAME TO iam")
            .failing("DROP DATABASE iam_new_s1 CASCADE");

        let result = perform_restore(&server, &f.client, f.backup.path(), &f.names).await;

        match result {
            Err(AppError::Command { command, .. }) => {
                assert!(command.contains("ALTER DATABASE iam_new_s1 RENAME TO iam"))
            }
            other => panic!("expected swap-in failure, got {other:?}"),
        }
        let dbs = server.databases();
        assert_eq!(dbs.get("iam"), Some(&vec!["legacy".to_string()]));
        assert_eq!(dbs.get("iam_new_s1"), Some(&vec!["t".to_string()]));
        assert!(!dbs.contains_key("iam_old_s1"));
    }

    #[tokio::test]
    async fn test_cleanup_failure_is_still_success() -> anyhow::Result<()> {
        let f = fixture();
        let server = FakeServer::with_current().failing("DROP DATABASE iam_old_s1 CASCADE");

        let report = perform_restore(&server, &f.client, f.backup.path(), &f.names).await?;

        assert_eq!(report.orphaned.as_deref(), Some("iam_old_s1"));
        let dbs = server.databases();
        assert_eq!(dbs.get("iam"), Some(&vec!["t".to_string()]));
        assert_eq!(dbs.get("iam_old_s1"), Some(&vec!["legacy".to_string()]));
        assert!(!dbs.contains_key("iam_new_s1"));
        Ok(())
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_commands_and_failures_are_logged() -> anyhow::Result<()> {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let f = fixture();
        let server = FakeServer::with_current().failing("DROP DATABASE iam_old_s1 CASCADE");
        perform_restore(&server, &f.client, f.backup.path(), &f.names).await?;

        let output = String::from_utf8(logs.0.lock().unwrap().clone())?;
        assert!(output.contains(
            "Running: cockroach sql --insecure --host=10.0.0.5 -e \"CREATE DATABASE iam_new_s1\""
        ));
        assert!(output.contains(&format!(
            "Running: cockroach sql --insecure --host=10.0.0.5 --database=iam_new_s1 < {}",
            f.backup.path().display()
        )));
        assert!(output
            .lines()
            .any(|l| l.contains("ERROR") && l.contains("Failed to drop database iam_old_s1")));
        Ok(())
    }
}
