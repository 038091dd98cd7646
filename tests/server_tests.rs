//! End-to-end tests over real TCP connections
//!
//! Each test boots an in-process server on an ephemeral port, speaks the
//! line protocol with plain sockets, and asserts on the JSON responses.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use lodedb::config::{AuthConfig, Config, WalFsync};
use lodedb::{Database, Server};
use serde_json::Value as Json;
use tempfile::TempDir;

// =============================================================================
// Test Server Harness
// =============================================================================

struct TestServer {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    db: Arc<Database>,
}

fn start_server(data_dir: &Path, auth: Option<(&str, &str)>) -> TestServer {
    let config = Config {
        data_dir: data_dir.to_path_buf(),
        wal_fsync: WalFsync::Always,
        auth: auth.map(|(username, password)| AuthConfig {
            username: username.into(),
            password: password.into(),
        }),
        ..Config::default()
    };
    let db = Database::open(config).unwrap();
    let server = Server::bind(db.clone()).unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = server.shutdown_handle();
    let handle = std::thread::spawn(move || server.run().unwrap());
    TestServer {
        addr,
        shutdown,
        handle: Some(handle),
        db,
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
        self.db.shutdown();
    }
}

/// One statement over a fresh connection
fn query(addr: SocketAddr, statement: &str) -> Json {
    let mut client = Client::connect(addr);
    client.send(statement)
}

/// A persistent connection (session state survives between statements)
struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        Self {
            reader,
            writer: stream,
        }
    }

    fn send(&mut self, statement: &str) -> Json {
        self.writer
            .write_all(format!("{}\n", statement).as_bytes())
            .unwrap();
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        serde_json::from_str(line.trim()).unwrap()
    }
}

fn must_ok(reply: &Json) -> &Json {
    assert_eq!(reply["ok"], Json::Bool(true), "expected ok: {}", reply);
    reply
}

fn must_err(reply: &Json, kind: &str) {
    assert_eq!(reply["ok"], Json::Bool(false), "expected error: {}", reply);
    assert_eq!(reply["error"], Json::String(kind.into()), "{}", reply);
}

fn ensure_schema(addr: SocketAddr) {
    must_ok(&query(addr, "CREATE KEYSPACE IF NOT EXISTS myapp;"));
    must_ok(&query(
        addr,
        "CREATE TABLE IF NOT EXISTS myapp.users (id int64, name varchar, active boolean, \
         born date, createdAt timestamp, avatar binary, PRIMARY KEY (id));",
    ));
}

fn insert_alice(addr: SocketAddr) {
    must_ok(&query(
        addr,
        "INSERT INTO myapp.users (id,name,active,born,createdAt,avatar) VALUES \
         (1,\"alice\",true,\"2026-02-18\",\"2026-02-18T12:34:56.123Z\",0x01020304);",
    ));
}

fn assert_alice_row(row: &Json) {
    assert_eq!(row["id"], Json::from(1));
    assert_eq!(row["name"], Json::from("alice"));
    assert_eq!(row["active"], Json::Bool(true));
    assert_eq!(row["born"], Json::from("2026-02-18"));
    assert_eq!(row["createdAt"], Json::from("2026-02-18T12:34:56.123Z"));
    assert_eq!(row["avatar"], Json::from("AQIDBA=="));
}

fn row_ids(reply: &Json) -> Vec<i64> {
    reply["rows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_i64().unwrap())
        .collect()
}

// =============================================================================
// Basic Protocol
// =============================================================================

#[test]
fn ping_pongs() {
    let temp = TempDir::new().unwrap();
    let server = start_server(temp.path(), None);
    let reply = query(server.addr, "PING;");
    must_ok(&reply);
    assert_eq!(reply["result"], Json::from("PONG"));
}

#[test]
fn create_keyspace_is_idempotent_with_if_not_exists() {
    let temp = TempDir::new().unwrap();
    let server = start_server(temp.path(), None);
    must_ok(&query(server.addr, "CREATE KEYSPACE IF NOT EXISTS myapp;"));
    must_ok(&query(server.addr, "CREATE KEYSPACE IF NOT EXISTS myapp;"));
    must_err(&query(server.addr, "CREATE KEYSPACE myapp;"), "already_exists");
}

#[test]
fn parse_errors_keep_the_connection_open() {
    let temp = TempDir::new().unwrap();
    let server = start_server(temp.path(), None);
    let mut client = Client::connect(server.addr);
    must_err(&client.send("NOT A STATEMENT;"), "parse_error");
    must_ok(&client.send("PING;"));
}

// =============================================================================
// Typed Rows
// =============================================================================

#[test]
fn insert_then_select_typed_row() {
    let temp = TempDir::new().unwrap();
    let server = start_server(temp.path(), None);
    ensure_schema(server.addr);
    insert_alice(server.addr);

    let reply = query(server.addr, "SELECT * FROM myapp.users WHERE id=1;");
    must_ok(&reply);
    assert_eq!(reply["found"], Json::Bool(true));
    assert_alice_row(&reply["row"]);

    // Projection returns only the listed columns
    let reply = query(server.addr, "SELECT name,avatar FROM myapp.users WHERE id=1;");
    must_ok(&reply);
    assert_eq!(reply["row"]["name"], Json::from("alice"));
    assert_eq!(reply["row"]["avatar"], Json::from("AQIDBA=="));
    assert!(reply["row"].get("active").is_none());
}

#[test]
fn missing_row_reports_found_false() {
    let temp = TempDir::new().unwrap();
    let server = start_server(temp.path(), None);
    ensure_schema(server.addr);
    let reply = query(server.addr, "SELECT * FROM myapp.users WHERE id=42;");
    must_ok(&reply);
    assert_eq!(reply["found"], Json::Bool(false));
    assert!(reply.get("row").is_none());
}

#[test]
fn type_mismatches_are_schema_errors() {
    let temp = TempDir::new().unwrap();
    let server = start_server(temp.path(), None);
    ensure_schema(server.addr);
    must_err(
        &query(server.addr, "INSERT INTO myapp.users (id,name) VALUES (1,2);"),
        "schema_error",
    );
    must_err(
        &query(server.addr, "INSERT INTO myapp.users (id,born) VALUES (1,\"not a date\");"),
        "schema_error",
    );
    must_err(
        &query(server.addr, "INSERT INTO myapp.users (name) VALUES (\"x\");"),
        "schema_error",
    );
    must_err(
        &query(server.addr, "INSERT INTO myapp.users (id,nope) VALUES (1,2);"),
        "schema_error",
    );
    must_err(
        &query(server.addr, "INSERT INTO myapp.users (id,name) VALUES (1);"),
        "schema_error",
    );
    must_err(
        &query(server.addr, "INSERT INTO myapp.users (id) VALUES (null);"),
        "schema_error",
    );
}

// =============================================================================
// Scans
// =============================================================================

#[test]
fn order_by_asc_desc_and_limit() {
    let temp = TempDir::new().unwrap();
    let server = start_server(temp.path(), None);
    must_ok(&query(server.addr, "CREATE KEYSPACE IF NOT EXISTS orderTest;"));
    must_ok(&query(
        server.addr,
        "CREATE TABLE IF NOT EXISTS orderTest.people (id int64, name varchar, PRIMARY KEY (id));",
    ));
    must_ok(&query(
        server.addr,
        "INSERT INTO orderTest.people (id,name) VALUES (2,\"b\"), (1,\"a\"), (3,\"c\");",
    ));

    let addr = server.addr;
    let reply = query(addr, "SELECT * FROM orderTest.people ORDER BY id ASC;");
    assert_eq!(row_ids(must_ok(&reply)), vec![1, 2, 3]);

    let reply = query(addr, "SELECT * FROM orderTest.people ORDER BY id ASC LIMIT 2;");
    assert_eq!(row_ids(must_ok(&reply)), vec![1, 2]);

    let reply = query(addr, "SELECT * FROM orderTest.people ORDER BY id DESC;");
    assert_eq!(row_ids(must_ok(&reply)), vec![3, 2, 1]);

    let reply = query(addr, "SELECT * FROM orderTest.people ORDER BY id DESC LIMIT 2;");
    assert_eq!(row_ids(must_ok(&reply)), vec![3, 2]);

    let reply = query(addr, "SELECT * FROM orderTest.people ORDER BY id DESC LIMIT 0;");
    assert_eq!(row_ids(must_ok(&reply)), Vec::<i64>::new());

    must_err(
        &query(addr, "SELECT * FROM orderTest.people ORDER BY name ASC;"),
        "schema_error",
    );
}

#[test]
fn empty_table_scans_to_empty_rows() {
    let temp = TempDir::new().unwrap();
    let server = start_server(temp.path(), None);
    ensure_schema(server.addr);
    let reply = query(server.addr, "SELECT * FROM myapp.users ORDER BY id ASC;");
    assert_eq!(row_ids(must_ok(&reply)), Vec::<i64>::new());
}

// =============================================================================
// Updates and Deletes
// =============================================================================

#[test]
fn delete_by_pk() {
    let temp = TempDir::new().unwrap();
    let server = start_server(temp.path(), None);
    ensure_schema(server.addr);
    insert_alice(server.addr);
    must_ok(&query(server.addr, "DELETE FROM myapp.users WHERE id=1;"));
    let reply = query(server.addr, "SELECT * FROM myapp.users WHERE id=1;");
    assert_eq!(must_ok(&reply)["found"], Json::Bool(false));
}

#[test]
fn update_preserves_other_columns() {
    let temp = TempDir::new().unwrap();
    let server = start_server(temp.path(), None);
    ensure_schema(server.addr);
    insert_alice(server.addr);
    must_ok(&query(
        server.addr,
        "UPDATE myapp.users SET name=\"alice2\" WHERE id=1;",
    ));

    let reply = query(server.addr, "SELECT * FROM myapp.users WHERE id=1;");
    let row = &must_ok(&reply)["row"];
    assert_eq!(row["name"], Json::from("alice2"));
    assert_eq!(row["active"], Json::Bool(true));
    assert_eq!(row["avatar"], Json::from("AQIDBA=="));
}

#[test]
fn update_is_an_upsert() {
    let temp = TempDir::new().unwrap();
    let server = start_server(temp.path(), None);
    ensure_schema(server.addr);
    must_ok(&query(
        server.addr,
        "UPDATE myapp.users SET name=\"bob\", active=false WHERE id=2;",
    ));

    let reply = query(server.addr, "SELECT * FROM myapp.users WHERE id=2;");
    let row = &must_ok(&reply)["row"];
    assert_eq!(row["id"], Json::from(2));
    assert_eq!(row["name"], Json::from("bob"));
    assert_eq!(row["active"], Json::Bool(false));
    assert_eq!(row["born"], Json::Null);
    assert_eq!(row["createdAt"], Json::Null);
    assert_eq!(row["avatar"], Json::Null);
}

#[test]
fn update_set_null_stores_null() {
    let temp = TempDir::new().unwrap();
    let server = start_server(temp.path(), None);
    ensure_schema(server.addr);
    insert_alice(server.addr);
    must_ok(&query(
        server.addr,
        "UPDATE myapp.users SET avatar=null WHERE id=1;",
    ));

    let reply = query(server.addr, "SELECT avatar FROM myapp.users WHERE id=1;");
    let ok = must_ok(&reply);
    assert_eq!(ok["found"], Json::Bool(true));
    assert_eq!(ok["row"]["avatar"], Json::Null);

    // The other columns survived
    let reply = query(server.addr, "SELECT name FROM myapp.users WHERE id=1;");
    assert_eq!(must_ok(&reply)["row"]["name"], Json::from("alice"));
}

// =============================================================================
// Sessions
// =============================================================================

#[test]
fn use_keyspace_resolves_unqualified_tables() {
    let temp = TempDir::new().unwrap();
    let server = start_server(temp.path(), None);
    let mut client = Client::connect(server.addr);

    must_ok(&client.send("CREATE KEYSPACE IF NOT EXISTS sessionKs;"));
    must_ok(&client.send("USE sessionKs;"));
    must_ok(&client.send(
        "CREATE TABLE IF NOT EXISTS sessionTable (id int64, name varchar, PRIMARY KEY (id));",
    ));
    must_ok(&client.send("INSERT INTO sessionTable (id,name) VALUES (1,\"alice\"), (2,\"bob\");"));

    let reply = client.send("SELECT * FROM sessionTable WHERE id=1;");
    assert_eq!(must_ok(&reply)["row"]["name"], Json::from("alice"));
    let reply = client.send("SELECT * FROM sessionTable WHERE id=2;");
    assert_eq!(must_ok(&reply)["row"]["name"], Json::from("bob"));

    // Another connection has no session keyspace
    must_err(
        &query(server.addr, "SELECT * FROM sessionTable WHERE id=1;"),
        "not_found",
    );
}

// =============================================================================
// Introspection and DDL Lifecycle
// =============================================================================

#[test]
fn show_keyspaces_and_tables() {
    let temp = TempDir::new().unwrap();
    let server = start_server(temp.path(), None);
    let addr = server.addr;

    let reply = query(addr, "SHOW KEYSPACES;");
    assert_eq!(must_ok(&reply)["keyspaces"], serde_json::json!([]));

    must_ok(&query(addr, "CREATE KEYSPACE IF NOT EXISTS ksA;"));
    must_ok(&query(addr, "CREATE KEYSPACE IF NOT EXISTS ksB;"));
    let reply = query(addr, "SHOW KEYSPACES;");
    assert_eq!(must_ok(&reply)["keyspaces"], serde_json::json!(["ksA", "ksB"]));

    must_ok(&query(
        addr,
        "CREATE TABLE IF NOT EXISTS ksA.t1 (id int64, name varchar, PRIMARY KEY (id));",
    ));
    must_ok(&query(
        addr,
        "CREATE TABLE IF NOT EXISTS ksA.t2 (id int64, name varchar, PRIMARY KEY (id));",
    ));
    let reply = query(addr, "SHOW TABLES IN ksA;");
    assert_eq!(must_ok(&reply)["tables"], serde_json::json!(["t1", "t2"]));

    must_err(&query(addr, "SHOW TABLES IN nope;"), "not_found");
}

#[test]
fn describe_show_create_truncate_drop() {
    let temp = TempDir::new().unwrap();
    let server = start_server(temp.path(), None);
    let addr = server.addr;
    ensure_schema(addr);
    insert_alice(addr);

    let reply = query(addr, "DESCRIBE TABLE myapp.users;");
    let ok = must_ok(&reply);
    assert_eq!(ok["keyspace"], Json::from("myapp"));
    assert_eq!(ok["table"], Json::from("users"));
    assert_eq!(ok["primaryKey"], Json::from("id"));
    let columns: Vec<&str> = ok["columns"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        columns,
        vec!["id", "name", "active", "born", "createdAt", "avatar"]
    );

    let reply = query(addr, "SHOW CREATE TABLE myapp.users;");
    let create = must_ok(&reply)["create"].as_str().unwrap().to_string();
    assert!(create.contains("CREATE TABLE myapp.users"), "{}", create);
    assert!(create.contains("PRIMARY KEY (id)"), "{}", create);

    must_ok(&query(addr, "TRUNCATE TABLE myapp.users;"));
    let reply = query(addr, "SELECT * FROM myapp.users WHERE id=1;");
    assert_eq!(must_ok(&reply)["found"], Json::Bool(false));

    // Schema stays; rows can come back
    let reply = query(addr, "DESCRIBE TABLE myapp.users;");
    assert_eq!(must_ok(&reply)["primaryKey"], Json::from("id"));
    insert_alice(addr);
    let reply = query(addr, "SELECT * FROM myapp.users WHERE id=1;");
    assert_eq!(must_ok(&reply)["found"], Json::Bool(true));

    must_ok(&query(addr, "DROP TABLE myapp.users;"));
    let reply = query(addr, "SHOW TABLES IN myapp;");
    assert_eq!(must_ok(&reply)["tables"], serde_json::json!([]));
    must_err(
        &query(addr, "SELECT * FROM myapp.users WHERE id=1;"),
        "not_found",
    );
    must_ok(&query(addr, "DROP TABLE IF EXISTS myapp.users;"));

    must_ok(&query(addr, "DROP KEYSPACE myapp;"));
    let reply = query(addr, "SHOW KEYSPACES;");
    assert!(!must_ok(&reply)["keyspaces"]
        .as_array()
        .unwrap()
        .iter()
        .any(|k| k == "myapp"));
    must_ok(&query(addr, "DROP KEYSPACE IF EXISTS myapp;"));
}

// =============================================================================
// Durability
// =============================================================================

#[test]
fn flush_then_restart_persists() {
    let temp = TempDir::new().unwrap();
    {
        let server = start_server(temp.path(), None);
        ensure_schema(server.addr);
        insert_alice(server.addr);
        must_ok(&query(server.addr, "FLUSH myapp.users;"));
    }

    let server = start_server(temp.path(), None);
    let reply = query(server.addr, "SELECT * FROM myapp.users WHERE id=1;");
    let ok = must_ok(&reply);
    assert_eq!(ok["found"], Json::Bool(true));
    assert_alice_row(&ok["row"]);
}

#[test]
fn unflushed_writes_survive_restart_via_wal() {
    let temp = TempDir::new().unwrap();
    {
        let server = start_server(temp.path(), None);
        ensure_schema(server.addr);
        insert_alice(server.addr);
    }

    let server = start_server(temp.path(), None);
    let reply = query(server.addr, "SELECT * FROM myapp.users WHERE id=1;");
    let ok = must_ok(&reply);
    assert_eq!(ok["found"], Json::Bool(true));
    assert_alice_row(&ok["row"]);
}

// =============================================================================
// Authentication
// =============================================================================

#[test]
fn auth_gates_everything_but_auth() {
    let temp = TempDir::new().unwrap();
    let server = start_server(temp.path(), Some(("admin", "secret")));

    must_err(&query(server.addr, "PING;"), "unauthorized");
    must_err(&query(server.addr, "SHOW KEYSPACES;"), "unauthorized");

    let mut client = Client::connect(server.addr);
    must_err(&client.send("AUTH \"admin\" \"wrong\";"), "bad_auth");
    must_err(&client.send("PING;"), "unauthorized");
    must_err(&client.send("AUTH \"nobody\" \"secret\";"), "bad_auth");
    must_ok(&client.send("AUTH \"admin\" \"secret\";"));
    let reply = client.send("PING;");
    assert_eq!(must_ok(&reply)["result"], Json::from("PONG"));
}

#[test]
fn admin_show_keyspaces_includes_system() {
    let temp = TempDir::new().unwrap();
    let server = start_server(temp.path(), Some(("admin", "secret")));
    let mut client = Client::connect(server.addr);
    must_ok(&client.send("AUTH \"admin\" \"secret\"; "));
    let reply = client.send("SHOW KEYSPACES;");
    assert_eq!(must_ok(&reply)["keyspaces"], serde_json::json!(["SYSTEM"]));
}

#[test]
fn system_is_hidden_without_auth() {
    let temp = TempDir::new().unwrap();
    let server = start_server(temp.path(), None);
    let reply = query(server.addr, "SHOW KEYSPACES;");
    assert_eq!(must_ok(&reply)["keyspaces"], serde_json::json!([]));
    must_err(&query(server.addr, "SHOW TABLES IN SYSTEM;"), "forbidden");
}

#[test]
fn ownership_and_grants() {
    let temp = TempDir::new().unwrap();
    let server = start_server(temp.path(), Some(("admin", "secret")));

    let mut admin = Client::connect(server.addr);
    must_ok(&admin.send("AUTH \"admin\" \"secret\"; "));
    must_ok(&admin.send("CREATE KEYSPACE IF NOT EXISTS ksA;"));
    must_ok(&admin.send("CREATE KEYSPACE IF NOT EXISTS ksB;"));
    must_ok(&admin.send("CREATE KEYSPACE IF NOT EXISTS ksC;"));
    must_ok(&admin.send(
        "INSERT INTO SYSTEM.USERS (username,password,level,enabled,created_at) \
         VALUES (\"alice\",\"pw\",1,true,0);",
    ));
    must_ok(&admin.send(
        "INSERT INTO SYSTEM.KEYSPACE_OWNERS (keyspace,owner_username,created_at) \
         VALUES (\"ksA\",\"alice\",0);",
    ));
    must_ok(&admin.send(
        "INSERT INTO SYSTEM.KEYSPACE_GRANTS (keyspace_username,created_at) \
         VALUES (\"ksB#alice\",0);",
    ));

    let mut alice = Client::connect(server.addr);
    must_ok(&alice.send("AUTH \"alice\" \"pw\"; "));
    let reply = alice.send("SHOW KEYSPACES;");
    assert_eq!(must_ok(&reply)["keyspaces"], serde_json::json!(["ksA", "ksB"]));

    must_ok(&alice.send("USE ksA;"));
    must_ok(&alice.send("CREATE TABLE IF NOT EXISTS t (id int64, name varchar, PRIMARY KEY (id));"));
    must_ok(&alice.send("INSERT INTO t (id,name) VALUES (1,\"x\");"));
    let reply = alice.send("SELECT * FROM t WHERE id=1;");
    let ok = must_ok(&reply);
    assert_eq!(ok["found"], Json::Bool(true));
    assert_eq!(ok["row"]["name"], Json::from("x"));

    must_err(&alice.send("USE ksC;"), "forbidden");
    must_err(&alice.send("SHOW TABLES IN SYSTEM;"), "forbidden");
    must_err(&alice.send("CREATE KEYSPACE IF NOT EXISTS nope;"), "forbidden");
    must_err(&alice.send("DROP KEYSPACE ksA;"), "forbidden");
    must_err(&alice.send("SELECT * FROM ksC.t WHERE id=1;"), "forbidden");
}

#[test]
fn config_wins_for_admin_password_on_restart() {
    let temp = TempDir::new().unwrap();
    {
        let server = start_server(temp.path(), Some(("admin", "secret1")));
        let mut client = Client::connect(server.addr);
        must_ok(&client.send("AUTH \"admin\" \"secret1\"; "));
        let reply = client.send("PING;");
        assert_eq!(must_ok(&reply)["result"], Json::from("PONG"));
    }

    let server = start_server(temp.path(), Some(("admin", "secret2")));
    let mut client = Client::connect(server.addr);
    must_err(&client.send("AUTH \"admin\" \"secret1\"; "), "bad_auth");
    must_ok(&client.send("AUTH \"admin\" \"secret2\"; "));
    let reply = client.send("PING;");
    assert_eq!(must_ok(&reply)["result"], Json::from("PONG"));
}

#[test]
fn failed_auth_does_not_grant() {
    let temp = TempDir::new().unwrap();
    let server = start_server(temp.path(), Some(("admin", "secret")));
    let mut client = Client::connect(server.addr);
    must_ok(&client.send("AUTH \"admin\" \"secret\";"));
    // A later failed AUTH must not keep the old principal either way;
    // the session stays whatever it was before the failure
    must_err(&client.send("AUTH \"admin\" \"nope\";"), "bad_auth");
    must_ok(&client.send("PING;"));
}
