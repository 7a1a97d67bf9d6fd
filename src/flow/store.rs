use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rand::distr::Alphanumeric;
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

use super::{FlowKind, FlowRow, FlowStatus, FlowStoreError, IdTokenMap};

const FLOW_ROWS_TABLE_V1: Table = Table {
    name: "flow_rows",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("kind", &SqlType::Text, non_null = true),
        sqlite_column!("client_id", &SqlType::Text, non_null = true),
        sqlite_column!("scope", &SqlType::Text, non_null = true),
        sqlite_column!("audience", &SqlType::Text, non_null = true),
        sqlite_column!("user_code", &SqlType::Text),
        sqlite_column!("device_code", &SqlType::Text),
        sqlite_column!("uuid", &SqlType::Text),
        sqlite_column!("code", &SqlType::Text),
        sqlite_column!("redirect_uri", &SqlType::Text),
        sqlite_column!("code_challenge", &SqlType::Text),
        sqlite_column!("code_challenge_method", &SqlType::Text),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("id_token", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("consumed", &SqlType::Integer, non_null = true, default_value = Some("0")),
    ],
    indices: &[
        ("idx_flow_rows_user_code", "user_code"),
        ("idx_flow_rows_device_code", "device_code"),
        ("idx_flow_rows_uuid", "uuid"),
        ("idx_flow_rows_code", "code"),
    ],
    unique_constraints: &[],
};

const FLOW_SCHEMA: VersionedSchema = VersionedSchema {
    version: 0,
    tables: &[FLOW_ROWS_TABLE_V1],
    migration: None,
};

fn kind_str(kind: FlowKind) -> &'static str {
    match kind {
        FlowKind::Device => "device",
        FlowKind::AuthCode => "auth_code",
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn random_user_code() -> String {
    // Short, human-typeable alphabet: uppercase letters and digits, with
    // visually ambiguous characters (0/O, 1/I) removed.
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::rng();
    (0..8)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

fn random_opaque_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(43) // >= 256 bits of entropy, base62-ish alphabet
        .map(char::from)
        .collect()
}

/// C4: persists and transitions device/auth-code flow rows. All operations
/// are single serializable SQLite transactions guarded by one connection
/// mutex, matching exactly-once consumption semantics under concurrency.
#[async_trait]
pub trait FlowStore: Send + Sync {
    async fn insert_device(
        &self,
        client_id: &str,
        scope: &str,
        audience: &str,
    ) -> Result<(String, String), FlowStoreError>;

    async fn validate_user_code(&self, user_code: &str, ttl_secs: i64) -> Result<(), FlowStoreError>;

    async fn device_attach_id_token(
        &self,
        user_code: &str,
        id_token: IdTokenMap,
        ttl_secs: i64,
    ) -> Result<(), FlowStoreError>;

    async fn get_device(&self, device_code: &str, ttl_secs: i64) -> Result<FlowRow, FlowStoreError>;

    async fn insert_auth_code(
        &self,
        client_id: &str,
        scope: &str,
        audience: &str,
        code_challenge: &str,
        code_challenge_method: &str,
        redirect_uri: &str,
    ) -> Result<String, FlowStoreError>;

    async fn auth_code_attach_id_token(
        &self,
        uuid: &str,
        id_token: IdTokenMap,
        ttl_secs: i64,
    ) -> Result<(String, String), FlowStoreError>;

    async fn get_auth_code(&self, code: &str, ttl_secs: i64) -> Result<FlowRow, FlowStoreError>;
}

pub struct SqliteFlowStore {
    conn: Mutex<Connection>,
}

impl SqliteFlowStore {
    pub fn new(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;
        let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        if raw_version == 0 {
            FLOW_SCHEMA.create(&conn)?;
        } else {
            FLOW_SCHEMA.validate(&conn)?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        FLOW_SCHEMA.create(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_from_query(
        conn: &Connection,
        where_clause: &str,
        param: &str,
    ) -> rusqlite::Result<Option<(i64, FlowRow)>> {
        let sql = format!(
            "SELECT id, kind, client_id, scope, audience, user_code, device_code, uuid, code, \
             redirect_uri, code_challenge, code_challenge_method, status, id_token, created_at \
             FROM flow_rows WHERE {} = ?1 AND consumed = 0",
            where_clause
        );
        conn.query_row(&sql, params![param], |r| {
            let kind: String = r.get(1)?;
            let status: String = r.get(12)?;
            let id_token_json: Option<String> = r.get(13)?;
            Ok((
                r.get::<_, i64>(0)?,
                FlowRow {
                    kind: if kind == "device" {
                        FlowKind::Device
                    } else {
                        FlowKind::AuthCode
                    },
                    client_id: r.get(2)?,
                    scope: r.get(3)?,
                    audience: r.get(4)?,
                    user_code: r.get(5)?,
                    device_code: r.get(6)?,
                    uuid: r.get(7)?,
                    code: r.get(8)?,
                    redirect_uri: r.get(9)?,
                    code_challenge: r.get(10)?,
                    code_challenge_method: r.get(11)?,
                    status: if status == "ready" {
                        FlowStatus::Ready
                    } else {
                        FlowStatus::Pending
                    },
                    id_token: id_token_json
                        .map(|j| serde_json::from_str(&j).unwrap_or_default()),
                    created_at: r.get(14)?,
                },
            ))
        })
        .optional()
    }
}

#[async_trait]
impl FlowStore for SqliteFlowStore {
    async fn insert_device(
        &self,
        client_id: &str,
        scope: &str,
        audience: &str,
    ) -> Result<(String, String), FlowStoreError> {
        let conn = self.conn.lock().unwrap();
        for _ in 0..10 {
            let user_code = random_user_code();
            let device_code = random_opaque_token();
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT id FROM flow_rows WHERE consumed = 0 AND (user_code = ?1 OR device_code = ?2)",
                    params![user_code, device_code],
                    |r| r.get(0),
                )
                .optional()
                .map_err(|e| FlowStoreError::Storage(e.to_string()))?;
            if exists.is_some() {
                continue;
            }
            conn.execute(
                "INSERT INTO flow_rows (kind, client_id, scope, audience, user_code, device_code, status, created_at) \
                 VALUES ('device', ?1, ?2, ?3, ?4, ?5, 'pending', ?6)",
                params![client_id, scope, audience, user_code, device_code, now()],
            )
            .map_err(|e| FlowStoreError::Storage(e.to_string()))?;
            return Ok((user_code, device_code));
        }
        Err(FlowStoreError::Storage(
            "could not allocate unique device/user code".to_string(),
        ))
    }

    async fn validate_user_code(&self, user_code: &str, ttl_secs: i64) -> Result<(), FlowStoreError> {
        let conn = self.conn.lock().unwrap();
        let row = Self::row_from_query(&conn, "user_code", user_code)
            .map_err(|e| FlowStoreError::Storage(e.to_string()))?;
        match row {
            Some((_, row)) if now() - row.created_at <= ttl_secs => Ok(()),
            Some(_) => Err(FlowStoreError::ExpiredFlow),
            None => Err(FlowStoreError::NotFound),
        }
    }

    async fn device_attach_id_token(
        &self,
        user_code: &str,
        id_token: IdTokenMap,
        ttl_secs: i64,
    ) -> Result<(), FlowStoreError> {
        let conn = self.conn.lock().unwrap();
        let row = Self::row_from_query(&conn, "user_code", user_code)
            .map_err(|e| FlowStoreError::Storage(e.to_string()))?;
        let (id, row) = row.ok_or(FlowStoreError::NotFound)?;
        if now() - row.created_at > ttl_secs {
            return Err(FlowStoreError::ExpiredFlow);
        }
        if row.status != FlowStatus::Pending {
            return Err(FlowStoreError::WrongStatus);
        }
        let id_token_json =
            serde_json::to_string(&id_token).map_err(|e| FlowStoreError::Storage(e.to_string()))?;
        let updated = conn
            .execute(
                "UPDATE flow_rows SET status = 'ready', id_token = ?1 WHERE id = ?2 AND status = 'pending'",
                params![id_token_json, id],
            )
            .map_err(|e| FlowStoreError::Storage(e.to_string()))?;
        if updated == 0 {
            return Err(FlowStoreError::WrongStatus);
        }
        Ok(())
    }

    async fn get_device(&self, device_code: &str, ttl_secs: i64) -> Result<FlowRow, FlowStoreError> {
        let conn = self.conn.lock().unwrap();
        let row = Self::row_from_query(&conn, "device_code", device_code)
            .map_err(|e| FlowStoreError::Storage(e.to_string()))?;
        let (id, row) = row.ok_or(FlowStoreError::NotFound)?;
        if now() - row.created_at > ttl_secs {
            return Err(FlowStoreError::ExpiredFlow);
        }
        match row.status {
            FlowStatus::Pending => Err(FlowStoreError::PendingAuthorization),
            FlowStatus::Ready => {
                let updated = conn
                    .execute(
                        "UPDATE flow_rows SET consumed = 1 WHERE id = ?1 AND consumed = 0",
                        params![id],
                    )
                    .map_err(|e| FlowStoreError::Storage(e.to_string()))?;
                if updated == 0 {
                    return Err(FlowStoreError::NotFound);
                }
                Ok(row)
            }
        }
    }

    async fn insert_auth_code(
        &self,
        client_id: &str,
        scope: &str,
        audience: &str,
        code_challenge: &str,
        code_challenge_method: &str,
        redirect_uri: &str,
    ) -> Result<String, FlowStoreError> {
        let conn = self.conn.lock().unwrap();
        for _ in 0..10 {
            let uuid = random_opaque_token();
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT id FROM flow_rows WHERE consumed = 0 AND uuid = ?1",
                    params![uuid],
                    |r| r.get(0),
                )
                .optional()
                .map_err(|e| FlowStoreError::Storage(e.to_string()))?;
            if exists.is_some() {
                continue;
            }
            conn.execute(
                "INSERT INTO flow_rows (kind, client_id, scope, audience, uuid, redirect_uri, \
                 code_challenge, code_challenge_method, status, created_at) \
                 VALUES ('auth_code', ?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8)",
                params![
                    client_id,
                    scope,
                    audience,
                    uuid,
                    redirect_uri,
                    code_challenge,
                    code_challenge_method,
                    now()
                ],
            )
            .map_err(|e| FlowStoreError::Storage(e.to_string()))?;
            return Ok(uuid);
        }
        Err(FlowStoreError::Storage(
            "could not allocate unique auth-code uuid".to_string(),
        ))
    }

    async fn auth_code_attach_id_token(
        &self,
        uuid: &str,
        id_token: IdTokenMap,
        ttl_secs: i64,
    ) -> Result<(String, String), FlowStoreError> {
        let conn = self.conn.lock().unwrap();
        let row = Self::row_from_query(&conn, "uuid", uuid)
            .map_err(|e| FlowStoreError::Storage(e.to_string()))?;
        let (id, row) = row.ok_or(FlowStoreError::NotFound)?;
        if now() - row.created_at > ttl_secs {
            return Err(FlowStoreError::ExpiredFlow);
        }
        if row.status != FlowStatus::Pending {
            return Err(FlowStoreError::WrongStatus);
        }

        let code = random_opaque_token();
        let id_token_json =
            serde_json::to_string(&id_token).map_err(|e| FlowStoreError::Storage(e.to_string()))?;
        let updated = conn
            .execute(
                "UPDATE flow_rows SET status = 'ready', id_token = ?1, code = ?2 \
                 WHERE id = ?3 AND status = 'pending'",
                params![id_token_json, code, id],
            )
            .map_err(|e| FlowStoreError::Storage(e.to_string()))?;
        if updated == 0 {
            return Err(FlowStoreError::WrongStatus);
        }
        let redirect_uri = row
            .redirect_uri
            .ok_or_else(|| FlowStoreError::Storage("auth-code row missing redirect_uri".to_string()))?;
        Ok((code, redirect_uri))
    }

    async fn get_auth_code(&self, code: &str, ttl_secs: i64) -> Result<FlowRow, FlowStoreError> {
        let conn = self.conn.lock().unwrap();
        let row = Self::row_from_query(&conn, "code", code)
            .map_err(|e| FlowStoreError::Storage(e.to_string()))?;
        let (id, row) = row.ok_or(FlowStoreError::NotFound)?;
        if now() - row.created_at > ttl_secs {
            return Err(FlowStoreError::ExpiredFlow);
        }
        match row.status {
            FlowStatus::Pending => Err(FlowStoreError::PendingAuthorization),
            FlowStatus::Ready => {
                let updated = conn
                    .execute(
                        "UPDATE flow_rows SET consumed = 1 WHERE id = ?1 AND consumed = 0",
                        params![id],
                    )
                    .map_err(|e| FlowStoreError::Storage(e.to_string()))?;
                if updated == 0 {
                    return Err(FlowStoreError::NotFound);
                }
                Ok(row)
            }
        }
    }
}
