use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use eyre::{Context, ContextCompat, Result, bail};
use nix::unistd::{Uid, User};
use tempfile::TempDir;
use tokio::{net::TcpListener, process::Command};
use tokio_postgres::{Client, NoTls};
use tracing::{debug, info, warn};

pub const DATABASE: &str = "testdb";

/// Appended to `postgresql.conf` of every fresh cluster.
pub const SERVER_SETTINGS: &str = "
max_connections = 2000
shared_buffers = 32GB
work_mem = 1MB
autovacuum = off
";

/// Paths of the PostgreSQL programs, either from `PATH` or a bin directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgBinaries {
    pub initdb: PathBuf,
    pub pg_ctl: PathBuf,
    pub createdb: PathBuf,
}

impl PgBinaries {
    pub fn new(bin_dir: Option<&Path>) -> Self {
        let program = |name: &str| match bin_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        };
        Self {
            initdb: program("initdb"),
            pg_ctl: program("pg_ctl"),
            createdb: program("createdb"),
        }
    }

    /// Fails when one of the programs cannot be executed.
    pub async fn check(&self) -> Result<()> {
        for program in [&self.initdb, &self.pg_ctl, &self.createdb] {
            Command::new(program)
                .arg("--version")
                .output()
                .await
                .wrap_err_with(|| format!("{} not found", program.display()))?;
        }
        Ok(())
    }
}

/// Options passed to the postmaster through `pg_ctl -o`.
pub fn postmaster_options(port: u16, notify_multicast_threshold: Option<u64>) -> String {
    match notify_multicast_threshold {
        Some(threshold) => format!("-p {port} -c notify_multicast_threshold={threshold}"),
        None => format!("-p {port}"),
    }
}

pub fn connection_string(port: u16, user: &str) -> String {
    format!("host=127.0.0.1 port={port} dbname={DATABASE} user={user}")
}

async fn free_port() -> Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .wrap_err("Find a free port")?;
    Ok(listener.local_addr()?.port())
}

fn current_user() -> Result<String> {
    let user = User::from_uid(Uid::current())?.context("Current user has no passwd entry")?;
    Ok(user.name)
}

async fn run(program: &Path, args: &[&str]) -> Result<()> {
    debug!("{} {}", program.display(), args.join(" "));
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .wrap_err_with(|| format!("Run {}", program.display()))?;
    if !output.status.success() {
        bail!(
            "{} failed: {}",
            program.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

/// Connects and drives the connection on a background task. The task ends
/// once the returned client is dropped.
pub async fn connect(conn: &str) -> Result<Client> {
    let (client, connection) = tokio_postgres::connect(conn, NoTls)
        .await
        .wrap_err_with(|| format!("Connect to {conn}"))?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            warn!("Connection closed with error: {err}");
        }
    });
    Ok(client)
}

/// A throwaway cluster in a temporary directory. Dropping it without calling
/// [`TempServer::stop`] leaves the postmaster running.
#[derive(Debug)]
pub struct TempServer {
    dir: TempDir,
    pg_ctl: PathBuf,
    pub port: u16,
    pub conn: String,
    pub version: String,
}

impl TempServer {
    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    /// Runs initdb, starts the postmaster on a free port and creates the test
    /// database. `version_name` replaces the `SELECT version()` label.
    pub async fn start(
        bins: &PgBinaries,
        notify_multicast_threshold: Option<u64>,
        version_name: Option<&str>,
    ) -> Result<Self> {
        bins.check().await?;
        let user = current_user()?;
        let dir = TempDir::new()?;
        let data_dir = dir.path().join("data");
        let data = data_dir.to_string_lossy().into_owned();
        let port = free_port().await?;

        run(
            &bins.initdb,
            &["-D", &data, "--auth=trust", "--encoding=UTF8"],
        )
        .await?;

        let conf = data_dir.join("postgresql.conf");
        OpenOptions::new()
            .append(true)
            .open(&conf)
            .and_then(|mut f| f.write_all(SERVER_SETTINGS.as_bytes()))
            .wrap_err_with(|| format!("Append settings to {}", conf.display()))?;

        let log = dir.path().join("postgres.log").to_string_lossy().into_owned();
        let options = postmaster_options(port, notify_multicast_threshold);
        run(
            &bins.pg_ctl,
            &["-D", &data, "-l", &log, "-o", &options, "-w", "start"],
        )
        .await?;
        info!("PostgreSQL started on port {port}");

        let server = Self {
            dir,
            pg_ctl: bins.pg_ctl.clone(),
            port,
            conn: connection_string(port, &user),
            version: String::new(),
        };
        let init = server.init(bins, version_name).await;
        match init {
            Ok(version) => Ok(Self { version, ..server }),
            Err(err) => {
                server.stop().await;
                Err(err)
            }
        }
    }

    async fn init(&self, bins: &PgBinaries, version_name: Option<&str>) -> Result<String> {
        let port = self.port.to_string();
        run(
            &bins.createdb,
            &["-h", "127.0.0.1", "-p", &port, DATABASE],
        )
        .await?;

        let client = connect(&self.conn).await?;
        for setting in [
            "max_connections",
            "superuser_reserved_connections",
            "shared_buffers",
        ] {
            let row = client
                .query_one(format!("SHOW {setting}").as_str(), &[])
                .await?;
            debug!("{setting} = {}", row.try_get::<_, String>(0)?);
        }

        let version = match version_name {
            Some(name) => name.to_owned(),
            None => client
                .query_one("SELECT version()", &[])
                .await?
                .try_get::<_, String>(0)?,
        };
        info!("PostgreSQL version: {version}");
        Ok(version)
    }

    /// Immediate shutdown. A failure is logged since the directory is removed
    /// anyway.
    pub async fn stop(self) {
        let data = self.data_dir().to_string_lossy().into_owned();
        if let Err(err) = run(&self.pg_ctl, &["-D", &data, "-m", "immediate", "stop"]).await {
            warn!("Could not stop PostgreSQL on port {}: {err:#}", self.port);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binaries_from_bin_dir() {
        let bins = PgBinaries::new(Some(Path::new("/usr/lib/postgresql/17/bin")));
        assert_eq!(
            bins.pg_ctl,
            Path::new("/usr/lib/postgresql/17/bin/pg_ctl")
        );
        assert_eq!(PgBinaries::new(None).initdb, Path::new("initdb"));
    }

    #[test]
    fn threshold_is_passed_to_postmaster() {
        assert_eq!(postmaster_options(5433, None), "-p 5433");
        assert_eq!(
            postmaster_options(5433, Some(8)),
            "-p 5433 -c notify_multicast_threshold=8"
        );
    }

    #[test]
    fn connection_string_targets_test_database() {
        assert_eq!(
            connection_string(6000, "bench"),
            "host=127.0.0.1 port=6000 dbname=testdb user=bench"
        );
    }

    #[tokio::test]
    async fn missing_binaries_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = PgBinaries::new(Some(dir.path())).check().await.unwrap_err();
        assert!(err.to_string().contains("initdb not found"));
    }

    #[tokio::test]
    async fn free_port_is_bindable() {
        let port = free_port().await.unwrap();
        assert!(port > 0);
        TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    }
}
