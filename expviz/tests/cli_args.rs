//! CLI surface tests for the expviz binary.
use assert_cmd::prelude::*;
use std::process::Command;

fn expviz() -> Command {
    let mut cmd = Command::cargo_bin("expviz").expect("binary exists");
    for var in ["EXPVIZ_TARGET", "EXPVIZ_PORT", "EXPVIZ_INTERFACE"] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn missing_target_is_fatal() {
    let out = expviz().output().expect("run expviz");
    assert!(!out.status.success());
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("TARGET"), "usage should name the target:\n{err}");
}

#[test]
fn help_mentions_interface_flag() {
    let out = expviz().arg("--help").output().expect("run expviz --help");
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(
        text.contains("--interface") && text.contains("-i") && text.contains("--port") && text.contains("--open"),
        "help text missing expected flags\n{text}"
    );
}

#[test]
fn unreachable_first_fetch_is_fatal() {
    let port = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let out = expviz()
        .args(["--fetch-timeout-ms", "500", &format!("http://127.0.0.1:{port}")])
        .output()
        .expect("run expviz");
    assert!(!out.status.success());
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("couldn't get expvar"), "{err}");
}
