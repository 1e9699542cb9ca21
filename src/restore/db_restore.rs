// iamrestore/src/restore/db_restore.rs
use std::path::{Path, PathBuf};

use crate::config::{RestoreConfig, Security};
use crate::utils::command::Invocation;

use super::plan::Action;

/// Builds `cockroach sql` invocations against one server.
#[derive(Debug, Clone)]
pub struct SqlClient {
    program: PathBuf,
    connection_args: Vec<String>,
}

impl SqlClient {
    pub fn new(program: PathBuf, host: &str, restore_config: &RestoreConfig) -> Self {
        let mut connection_args = Vec::new();
        match &restore_config.security {
            Security::Insecure => connection_args.push("--insecure".to_string()),
            Security::Certs(dir) => connection_args.push(format!("--certs-dir={}", dir.display())),
        }
        connection_args.push(format!("--host={}", host));
        if let Some(port) = restore_config.port {
            connection_args.push(format!("--port={}", port));
        }
        if let Some(user) = &restore_config.user {
            connection_args.push(format!("--user={}", user));
        }
        Self {
            program,
            connection_args,
        }
    }

    fn base(&self) -> Invocation {
        Invocation::new(&self.program)
            .arg("sql")
            .args(self.connection_args.iter().cloned())
    }

    /// Executes one statement with `-e`.
    pub fn statement(&self, sql: &str) -> Invocation {
        self.base().arg("-e").arg(sql)
    }

    /// Streams `backup` on stdin, executed in a single session against `database`.
    pub fn load(&self, database: &str, backup: &Path) -> Invocation {
        self.base()
            .arg(format!("--database={}", database))
            .stdin_file(backup)
    }

    pub fn invocation(&self, action: &Action, backup: &Path) -> Invocation {
        match action {
            Action::Create(db) => self.statement(&format!("CREATE DATABASE {}", db)),
            Action::Load(db) => self.load(db, backup),
            Action::Rename { from, to } => {
                self.statement(&format!("ALTER DATABASE {} RENAME TO {}", from, to))
            }
            Action::Drop(db) => self.statement(&format!("DROP DATABASE {} CASCADE", db)),
        }
    }
}
