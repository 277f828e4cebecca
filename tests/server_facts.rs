//! Tests for the Server façade and its host-fact cache

mod common;

use common::ScriptedDriver;
use command_driver::{Command, ProcessError, Server};
use std::sync::Arc;

#[test]
fn test_hostname_is_cached() {
    smol::block_on(async {
        let driver = Arc::new(ScriptedDriver::new(vec![(0, b"storage1\n", "")]));
        let server = Server::local(driver.clone());

        assert_eq!(server.hostname(true).await.unwrap(), "storage1");
        // Cache hit: the script is exhausted, so a re-query would fail.
        assert_eq!(server.hostname(true).await.unwrap(), "storage1");
        assert_eq!(driver.call_count(), 1);
    });
}

#[test]
fn test_hostname_explicit_requery_bypasses_cache() {
    smol::block_on(async {
        let driver = Arc::new(ScriptedDriver::new(vec![
            (0, b"before\n", ""),
            (0, b"after\n", ""),
        ]));
        let server = Server::local(driver.clone());

        assert_eq!(server.hostname(true).await.unwrap(), "before");
        assert_eq!(server.hostname(false).await.unwrap(), "after");
        assert_eq!(driver.call_count(), 2);

        // The re-query refreshed the cache.
        assert_eq!(server.hostname(true).await.unwrap(), "after");
    });
}

#[test]
fn test_ip_address_parsing() {
    smol::block_on(async {
        let driver = Arc::new(ScriptedDriver::new(vec![(
            0,
            b"1.1.1.1 via 10.0.0.1 dev eth0 src 10.0.0.5 uid 1000\n",
            "",
        )]));
        let server = Server::local(driver.clone());

        assert_eq!(server.ip_address(true).await.unwrap(), "10.0.0.5");
        assert_eq!(
            driver.calls.lock().unwrap()[0],
            ["ip", "route", "get", "1.1.1.1"]
        );
    });
}

#[test]
fn test_ip_address_malformed_output() {
    smol::block_on(async {
        let driver = Arc::new(ScriptedDriver::new(vec![(0, b"garbage\n", "")]));
        let server = Server::local(driver);

        match server.ip_address(true).await {
            Err(ProcessError::Failed { message, .. }) => {
                assert!(message.contains("malformed output"))
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    });
}

#[test]
fn test_is_accessible_runs_true() {
    smol::block_on(async {
        let driver = Arc::new(ScriptedDriver::new(vec![(0, b"", "")]));
        let server = Server::local(driver.clone());

        server.is_accessible().await.unwrap();
        assert_eq!(driver.calls.lock().unwrap()[0], ["true"]);
    });
}

#[test]
fn test_connect_verifies_accessibility() {
    smol::block_on(async {
        let reachable = Arc::new(ScriptedDriver::new(vec![(0, b"", "")]));
        let server = Server::connect(reachable, "storage1").await.unwrap();
        assert_eq!(server.host(), Some("storage1"));

        let unreachable = Arc::new(ScriptedDriver::new(vec![(1, b"", "no route")]));
        assert!(Server::connect(unreachable, "storage2").await.is_err());
    });
}

#[test]
fn test_execute_passes_command_through() {
    smol::block_on(async {
        let driver = Arc::new(ScriptedDriver::new(vec![(0, b"ok\n", "")]));
        let server = Server::local(driver.clone());

        let exited = server
            .execute(Command::new(["zpool", "status"]), true)
            .await
            .unwrap();
        assert_eq!(exited.get_stdout(), "ok\n");
        assert_eq!(driver.calls.lock().unwrap()[0], ["zpool", "status"]);
    });
}
