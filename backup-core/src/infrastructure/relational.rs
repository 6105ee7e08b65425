// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Relational-database adapter, grounded on the original tool's
//! `postgres.go` (`pg_dump --dbname=... -xF tar`) and extended per the
//! physical base-backup/restore operations: `pg_basebackup`,
//! `pg_verifybackup`, and `tar`, invoked as subprocesses via
//! `tokio::process::Command`. The connectivity probe before the (costly)
//! dump spawn uses `sqlx`'s Postgres pool.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use backup_domain::error::{BackupError, BackupResult};
use backup_domain::services::relational::RelationalClient;
use backup_domain::value_objects::SslMode;
use sqlx::postgres::PgPoolOptions;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub struct RelationalConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub ssl_mode: SslMode,
    pub cacert: Option<String>,
    pub clientcert: Option<String>,
    pub clientkey: Option<String>,
}

impl RelationalConfig {
    /// Builds the `postgresql://` URI, augmented per `ssl_mode` exactly as
    /// described for the connection surface: `allow`/`disable` append a
    /// bare `sslmode`; `prefer` appends nothing; the verify tiers append
    /// cert material for whichever of `cacert`/`clientcert`/`clientkey`
    /// are configured. `verify-full` refuses to build without a client
    /// cert and key.
    pub fn uri(&self) -> BackupResult<String> {
        let mut uri = format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        );

        match self.ssl_mode {
            SslMode::Allow | SslMode::Disable => {
                uri.push_str(&format!("?sslmode={}", self.ssl_mode.as_str()));
            }
            SslMode::Prefer => {}
            SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => {
                if self.ssl_mode.requires_client_cert() && (self.clientcert.is_none() || self.clientkey.is_none()) {
                    return Err(BackupError::ConfigInvalid("db.sslmode=verify-full requires db.clientcert and db.clientkey".into()));
                }
                let mut params = vec![format!("sslmode={}", self.ssl_mode.as_str())];
                if let Some(cacert) = &self.cacert {
                    params.push(format!("sslrootcert={cacert}"));
                }
                if let Some(clientcert) = &self.clientcert {
                    params.push(format!("sslcert={clientcert}"));
                }
                if let Some(clientkey) = &self.clientkey {
                    params.push(format!("sslkey={clientkey}"));
                }
                uri.push('?');
                uri.push_str(&params.join("&"));
            }
        }

        Ok(uri)
    }
}

pub struct PostgresClient {
    config: RelationalConfig,
}

impl PostgresClient {
    pub fn new(config: RelationalConfig) -> Self {
        Self { config }
    }

    async fn run_capturing_stdout(&self, program: &str, args: &[&str]) -> BackupResult<Vec<u8>> {
        let output = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| BackupError::SubprocessFailed { exit_code: None, stderr: format!("could not spawn {program}: {e}") })?;

        if !output.status.success() {
            return Err(BackupError::SubprocessFailed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(output.stdout)
    }

    async fn run_silent(&self, program: &str, args: &[&str]) -> BackupResult<()> {
        self.run_capturing_stdout(program, args).await.map(|_| ())
    }
}

#[async_trait]
impl RelationalClient for PostgresClient {
    async fn probe(&self) -> BackupResult<()> {
        let uri = self.config.uri()?;
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(&uri)
            .await
            .map_err(|e| BackupError::Connectivity(format!("could not connect to postgres: {e}")))?;
        pool.close().await;
        Ok(())
    }

    async fn logical_dump(&self, database: &str) -> BackupResult<Vec<u8>> {
        let uri = self.config.uri()?;
        let dbname_flag = format!("--dbname={uri}");
        let _ = database;
        self.run_capturing_stdout("pg_dump", &[&dbname_flag, "-xF", "tar"]).await
    }

    async fn logical_restore(&self, data: Vec<u8>) -> BackupResult<()> {
        let uri = self.config.uri()?;
        let dbname_flag = format!("--dbname={uri}");

        let mut child = Command::new("pg_restore")
            .arg(&dbname_flag)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BackupError::SubprocessFailed { exit_code: None, stderr: format!("could not spawn pg_restore: {e}") })?;

        let mut stdin = child.stdin.take().expect("stdin was piped");
        let writer = tokio::spawn(async move {
            stdin.write_all(&data).await?;
            stdin.shutdown().await
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| BackupError::SubprocessFailed { exit_code: None, stderr: format!("pg_restore wait failed: {e}") })?;

        writer
            .await
            .map_err(|e| BackupError::SubprocessFailed { exit_code: None, stderr: format!("pg_restore stdin writer panicked: {e}") })?
            .map_err(BackupError::from)?;

        if !output.status.success() {
            return Err(BackupError::SubprocessFailed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }

    async fn physical_base_backup(&self, output_dir: &Path) -> BackupResult<()> {
        let host_flag = format!("--host={}", self.config.host);
        let port_flag = format!("--port={}", self.config.port);
        let user_flag = format!("--username={}", self.config.user);
        let dir_flag = format!("--pgdata={}", output_dir.display());

        self.run_silent("pg_basebackup", &[&host_flag, &port_flag, &user_flag, &dir_flag, "--format=plain"]).await?;

        let verify_dir_flag = format!("--pgdata={}", output_dir.display());
        self.run_silent("pg_verifybackup", &[&verify_dir_flag]).await
    }

    async fn physical_unpack(&self, tar_path: &Path, target_dir: &Path) -> BackupResult<()> {
        let target = target_dir.display().to_string();
        self.run_silent("tar", &["-xvf", &tar_path.display().to_string(), "--directory", &target]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: SslMode) -> RelationalConfig {
        RelationalConfig {
            host: "db.internal".into(),
            port: 5432,
            user: "app".into(),
            password: "secret".into(),
            database: "app_db".into(),
            ssl_mode: mode,
            cacert: Some("/etc/pg/ca.pem".into()),
            clientcert: Some("/etc/pg/client.pem".into()),
            clientkey: Some("/etc/pg/client.key".into()),
        }
    }

    #[test]
    fn allow_appends_bare_sslmode() {
        let uri = config(SslMode::Allow).uri().unwrap();
        assert!(uri.ends_with("?sslmode=allow"));
    }

    #[test]
    fn prefer_appends_nothing() {
        let uri = config(SslMode::Prefer).uri().unwrap();
        assert!(!uri.contains('?'));
    }

    #[test]
    fn verify_full_augments_with_all_cert_material() {
        let uri = config(SslMode::VerifyFull).uri().unwrap();
        assert!(uri.contains("sslmode=verify-full"));
        assert!(uri.contains("sslrootcert=/etc/pg/ca.pem"));
        assert!(uri.contains("sslcert=/etc/pg/client.pem"));
        assert!(uri.contains("sslkey=/etc/pg/client.key"));
    }

    #[test]
    fn verify_full_without_client_cert_is_rejected() {
        let mut cfg = config(SslMode::VerifyFull);
        cfg.clientcert = None;
        assert!(cfg.uri().is_err());
    }
}
