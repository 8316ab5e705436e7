//! Keyword and function denylists

use lazy_static::lazy_static;
use std::collections::HashSet;

lazy_static! {
    /// Statements that change data, schema, privileges or session state.
    /// Any occurrence in code is a write.
    pub static ref WRITE_KEYWORDS: HashSet<&'static str> = [
        "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE",
        "GRANT", "REVOKE", "COPY", "MERGE",
        "CALL", "EXEC", "EXECUTE", "DO", "LOCK", "VACUUM", "REINDEX", "CLUSTER",
        "REFRESH", "PREPARE", "LISTEN", "NOTIFY", "SET", "RESET", "DISCARD",
        "IMPORT", "INTO",
    ]
    .into_iter()
    .collect();

    /// Write keywords that also count when smuggled inside a comment
    pub static ref COMMENT_WRITE_KEYWORDS: HashSet<&'static str> = [
        "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE",
        "GRANT", "REVOKE", "COPY", "MERGE",
    ]
    .into_iter()
    .collect();

    /// Leading words that name a statement other than a query
    pub static ref OTHER_STATEMENTS: HashSet<&'static str> = [
        "EXPLAIN", "SHOW", "VALUES", "TABLE", "BEGIN", "START", "COMMIT", "END",
        "ROLLBACK", "SAVEPOINT", "RELEASE", "ANALYZE", "ANALYSE", "CHECKPOINT",
        "LOAD", "COMMENT", "SECURITY", "ABORT", "DEALLOCATE", "FETCH", "MOVE",
        "CLOSE", "DECLARE", "UNLISTEN",
    ]
    .into_iter()
    .collect();

    /// Keywords that start the body of a statement after a WITH list
    pub static ref STATEMENT_BODY_KEYWORDS: HashSet<&'static str> = [
        "SELECT", "INSERT", "UPDATE", "DELETE", "MERGE", "VALUES", "TABLE",
    ]
    .into_iter()
    .collect();

    /// Denied wherever they appear, lower case
    pub static ref DENIED_FUNCTIONS: HashSet<&'static str> = [
        // sleep / delay
        "pg_sleep", "pg_sleep_for", "pg_sleep_until",
        // file, program and large-object access
        "pg_read_file", "pg_read_binary_file", "pg_ls_dir", "pg_stat_file",
        "pg_ls_logdir", "pg_ls_waldir", "pg_ls_tmpdir", "pg_ls_archive_statusdir",
        "lo_import", "lo_export", "lo_get", "lo_put", "lo_open", "lo_create",
        "lo_unlink", "lo_from_bytea", "loread", "lowrite",
        "pg_file_write", "pg_file_unlink", "pg_file_rename", "pg_file_sync",
        "pg_file_read", "pg_file_length", "pg_logdir_ls",
        // network
        "dblink", "dblink_exec", "dblink_connect", "dblink_connect_u",
        "dblink_send_query", "dblink_open", "dblink_fetch",
        // server control
        "pg_terminate_backend", "pg_cancel_backend", "pg_reload_conf",
        "pg_rotate_logfile", "pg_promote", "pg_switch_wal", "pg_create_restore_point",
        "pg_backup_start", "pg_backup_stop", "pg_start_backup", "pg_stop_backup",
        "set_config", "current_setting",
        // locking, notification and sequence side effects
        "pg_advisory_lock", "pg_advisory_xact_lock", "pg_try_advisory_lock",
        "pg_try_advisory_xact_lock", "pg_advisory_lock_shared", "pg_notify",
        "pg_logical_emit_message", "nextval", "setval",
        "txid_current", "pg_current_xact_id",
        // query-to-document helpers that run arbitrary SQL text
        "query_to_xml", "query_to_xml_and_xmlschema", "query_to_xmlschema",
        "cursor_to_xml", "table_to_xml", "schema_to_xml", "database_to_xml",
        "ts_stat", "ts_rewrite",
        // privilege and identity inspection
        "has_table_privilege", "has_column_privilege", "has_database_privilege",
        "has_schema_privilege", "has_function_privilege", "has_any_column_privilege",
        "has_sequence_privilege", "pg_has_role", "current_user", "session_user",
        "current_role", "inet_server_addr", "inet_server_port", "pg_postmaster_start_time",
    ]
    .into_iter()
    .collect();

    /// System catalogs, off limits in any position
    pub static ref DENIED_SCHEMAS: HashSet<&'static str> = [
        "pg_catalog", "information_schema",
    ]
    .into_iter()
    .collect();

    /// Generic names denied only when called
    pub static ref DENIED_CALLS: HashSet<&'static str> = [
        "sleep", "delay", "benchmark", "waitfor", "version", "system", "shell",
        "load_file", "xp_cmdshell",
    ]
    .into_iter()
    .collect();

    /// Function-call forms whose argument syntax uses FROM
    pub static ref FROM_TAKING_FUNCTIONS: HashSet<&'static str> = [
        "EXTRACT", "SUBSTRING", "TRIM", "OVERLAY", "POSITION",
    ]
    .into_iter()
    .collect();

    /// Keywords that close a FROM clause at the same nesting depth
    pub static ref FROM_CLAUSE_END: HashSet<&'static str> = [
        "WHERE", "GROUP", "HAVING", "ORDER", "LIMIT", "OFFSET", "UNION",
        "INTERSECT", "EXCEPT", "WINDOW", "FETCH", "FOR", "SELECT", "RETURNING",
    ]
    .into_iter()
    .collect();
}
