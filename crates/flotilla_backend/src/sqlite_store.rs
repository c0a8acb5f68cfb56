use anyhow::{Context as _, anyhow};
use flotilla_domain::{CrashRecoveryRecord, CrashTracker, PersistedWorkstream, WorkstreamStore};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

const LATEST_SCHEMA_VERSION: u32 = 3;

const MIGRATIONS: &[(u32, &str)] = &[
    (
        1,
        include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/migrations/0001_init.sql"
        )),
    ),
    (
        2,
        include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/migrations/0002_pull_request_and_pairing.sql"
        )),
    ),
    (
        3,
        include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/migrations/0003_tracked_containers.sql"
        )),
    ),
];

/// Workstream records and crash-recovery records in one sqlite database.
///
/// All access goes through a single worker thread, so `track` and `untrack`
/// are serialized without further locking.
#[derive(Clone)]
pub struct SqliteStore {
    tx: mpsc::Sender<DbCommand>,
}

enum DbCommand {
    LoadWorkstreams {
        reply: mpsc::Sender<anyhow::Result<Vec<PersistedWorkstream>>>,
    },
    SaveWorkstreams {
        workstreams: Vec<PersistedWorkstream>,
        reply: mpsc::Sender<anyhow::Result<()>>,
    },
    Track {
        record: CrashRecoveryRecord,
        reply: mpsc::Sender<anyhow::Result<()>>,
    },
    Untrack {
        container_id: String,
        reply: mpsc::Sender<anyhow::Result<()>>,
    },
    ListTracked {
        reply: mpsc::Sender<anyhow::Result<Vec<CrashRecoveryRecord>>>,
    },
}

impl SqliteStore {
    pub fn new(db_path: PathBuf) -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::channel::<DbCommand>();

        std::thread::Builder::new()
            .name("flotilla-sqlite".to_owned())
            .spawn(move || {
                let mut db = SqliteDatabase::open(&db_path);
                if let Err(err) = &db {
                    tracing::error!(error = %format!("{err:#}"), "failed to open sqlite store");
                }
                while let Ok(cmd) = rx.recv() {
                    match (&mut db, cmd) {
                        (Ok(db), DbCommand::LoadWorkstreams { reply }) => {
                            let _ = reply.send(db.load_workstreams());
                        }
                        (Ok(db), DbCommand::SaveWorkstreams { workstreams, reply }) => {
                            let _ = reply.send(db.save_workstreams(&workstreams));
                        }
                        (Ok(db), DbCommand::Track { record, reply }) => {
                            let _ = reply.send(db.track(&record));
                        }
                        (Ok(db), DbCommand::Untrack {
                            container_id,
                            reply,
                        }) => {
                            let _ = reply.send(db.untrack(&container_id));
                        }
                        (Ok(db), DbCommand::ListTracked { reply }) => {
                            let _ = reply.send(db.list_tracked());
                        }
                        (Err(err), cmd) => respond_db_open_error(err, cmd),
                    }
                }
            })
            .context("failed to spawn sqlite worker")?;

        Ok(Self { tx })
    }

    pub fn load_workstreams(&self) -> anyhow::Result<Vec<PersistedWorkstream>> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::LoadWorkstreams { reply: reply_tx })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn save_workstreams(&self, workstreams: Vec<PersistedWorkstream>) -> anyhow::Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::SaveWorkstreams {
                workstreams,
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn track(&self, record: CrashRecoveryRecord) -> anyhow::Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::Track {
                record,
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn untrack(&self, container_id: String) -> anyhow::Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::Untrack {
                container_id,
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn list_tracked(&self) -> anyhow::Result<Vec<CrashRecoveryRecord>> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::ListTracked { reply: reply_tx })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }
}

impl WorkstreamStore for SqliteStore {
    fn load_workstreams(&self) -> Result<Vec<PersistedWorkstream>, String> {
        SqliteStore::load_workstreams(self).map_err(|e| format!("{e:#}"))
    }

    fn save_workstreams(&self, workstreams: Vec<PersistedWorkstream>) -> Result<(), String> {
        SqliteStore::save_workstreams(self, workstreams).map_err(|e| format!("{e:#}"))
    }
}

impl CrashTracker for SqliteStore {
    fn track(&self, record: &CrashRecoveryRecord) -> Result<(), String> {
        SqliteStore::track(self, record.clone()).map_err(|e| format!("{e:#}"))
    }

    fn untrack(&self, container_id: &str) -> Result<(), String> {
        SqliteStore::untrack(self, container_id.to_owned()).map_err(|e| format!("{e:#}"))
    }

    fn records(&self) -> Result<Vec<CrashRecoveryRecord>, String> {
        self.list_tracked().map_err(|e| format!("{e:#}"))
    }
}

fn respond_db_open_error(err: &anyhow::Error, cmd: DbCommand) {
    let message = format!("{err:#}");
    match cmd {
        DbCommand::LoadWorkstreams { reply } => {
            let _ = reply.send(Err(anyhow!(message)));
        }
        DbCommand::SaveWorkstreams { reply, .. } => {
            let _ = reply.send(Err(anyhow!(message)));
        }
        DbCommand::Track { reply, .. } => {
            let _ = reply.send(Err(anyhow!(message)));
        }
        DbCommand::Untrack { reply, .. } => {
            let _ = reply.send(Err(anyhow!(message)));
        }
        DbCommand::ListTracked { reply } => {
            let _ = reply.send(Err(anyhow!(message)));
        }
    }
}

struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    fn open(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut conn = Connection::open(db_path)
            .with_context(|| format!("failed to open sqlite db {}", db_path.display()))?;

        configure_connection(&mut conn).context("failed to configure sqlite connection")?;
        apply_migrations(&mut conn).context("failed to apply sqlite migrations")?;

        Ok(Self { conn })
    }

    fn load_workstreams(&mut self) -> anyhow::Result<Vec<PersistedWorkstream>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, prompt, branch_name, container_id, worktree_path, state,
                    pr_url, pr_number, pairing_previous_branch, pairing_stashed_changes,
                    created_at_ms
             FROM workstreams
             ORDER BY sort_order ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PersistedWorkstream {
                id: row.get(0)?,
                prompt: row.get(1)?,
                branch_name: row.get(2)?,
                container_id: row.get(3)?,
                worktree_path: row.get::<_, Option<String>>(4)?.map(PathBuf::from),
                state: row.get(5)?,
                pr_url: row.get(6)?,
                pr_number: row
                    .get::<_, Option<i64>>(7)?
                    .and_then(|n| u64::try_from(n).ok()),
                pairing_previous_branch: row.get(8)?,
                pairing_stashed_changes: row.get::<_, i64>(9)? != 0,
                created_at_unix_ms: u64::try_from(row.get::<_, i64>(10)?).unwrap_or(0),
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("failed to read workstream row")?);
        }
        Ok(out)
    }

    fn save_workstreams(&mut self, workstreams: &[PersistedWorkstream]) -> anyhow::Result<()> {
        let now = now_unix_millis() as i64;
        let tx = self
            .conn
            .transaction()
            .context("failed to begin save transaction")?;
        tx.execute("DELETE FROM workstreams", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO workstreams
                 (id, sort_order, prompt, branch_name, container_id, worktree_path, state,
                  pr_url, pr_number, pairing_previous_branch, pairing_stashed_changes,
                  created_at_ms, updated_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for (index, workstream) in workstreams.iter().enumerate() {
                let worktree_path = workstream
                    .worktree_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned());
                stmt.execute(params![
                    workstream.id,
                    index as i64,
                    workstream.prompt,
                    workstream.branch_name,
                    workstream.container_id,
                    worktree_path,
                    workstream.state,
                    workstream.pr_url,
                    workstream.pr_number.map(|n| n as i64),
                    workstream.pairing_previous_branch,
                    workstream.pairing_stashed_changes as i64,
                    workstream.created_at_unix_ms as i64,
                    now,
                ])
                .with_context(|| format!("failed to save workstream {}", workstream.id))?;
            }
        }
        tx.commit().context("failed to commit workstreams")?;
        Ok(())
    }

    fn track(&mut self, record: &CrashRecoveryRecord) -> anyhow::Result<()> {
        self.conn
            .execute(
                "INSERT INTO tracked_containers
                 (container_id, workstream_id, branch_name, path, tracked_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(container_id) DO UPDATE SET
                   workstream_id = excluded.workstream_id,
                   branch_name = excluded.branch_name,
                   path = excluded.path,
                   tracked_at_ms = excluded.tracked_at_ms",
                params![
                    record.container_id,
                    record.workstream_id,
                    record.branch_name,
                    record.path.to_string_lossy().into_owned(),
                    now_unix_millis() as i64,
                ],
            )
            .with_context(|| format!("failed to track container {}", record.container_id))?;
        Ok(())
    }

    fn untrack(&mut self, container_id: &str) -> anyhow::Result<()> {
        self.conn
            .execute(
                "DELETE FROM tracked_containers WHERE container_id = ?1",
                params![container_id],
            )
            .with_context(|| format!("failed to untrack container {container_id}"))?;
        Ok(())
    }

    fn list_tracked(&mut self) -> anyhow::Result<Vec<CrashRecoveryRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT container_id, workstream_id, branch_name, path
             FROM tracked_containers
             ORDER BY tracked_at_ms ASC, container_id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CrashRecoveryRecord {
                container_id: row.get(0)?,
                workstream_id: row.get(1)?,
                branch_name: row.get(2)?,
                path: PathBuf::from(row.get::<_, String>(3)?),
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("failed to read tracked container row")?);
        }
        Ok(out)
    }
}

fn configure_connection(conn: &mut Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;",
    )
    .context("failed to apply sqlite PRAGMAs")?;
    Ok(())
}

fn apply_migrations(conn: &mut Connection) -> anyhow::Result<()> {
    let current: u32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get::<_, i64>(0))
        .context("failed to read user_version")? as u32;

    if current > LATEST_SCHEMA_VERSION {
        return Err(anyhow!(
            "sqlite schema version is newer than this build: db={}, app={}",
            current,
            LATEST_SCHEMA_VERSION
        ));
    }

    if current == LATEST_SCHEMA_VERSION {
        return Ok(());
    }

    conn.execute_batch("BEGIN IMMEDIATE;")
        .context("failed to begin migration transaction")?;

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        conn.execute_batch(sql)
            .with_context(|| format!("failed to apply migration v{version:04}"))?;
        conn.pragma_update(None, "user_version", *version as i64)
            .context("failed to update user_version")?;
    }

    conn.execute_batch("COMMIT;")
        .context("failed to commit migration transaction")?;
    Ok(())
}

fn now_unix_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| u64::try_from(d.as_millis()).ok())
        .unwrap_or(0)
}
