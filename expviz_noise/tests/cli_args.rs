//! CLI arg tests for the noise generator
use assert_cmd::prelude::*;
use std::process::Command;
use std::time::Duration;

#[test]
fn help_lists_port_flags() {
    let out = Command::cargo_bin("expviz_noise")
        .expect("binary exists")
        .arg("--help")
        .output()
        .expect("run --help");
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("--port") && text.contains("-p") && text.contains("--tick-ms"));
}

#[test]
fn starts_on_an_ephemeral_port() {
    // Spawn then kill quickly; staying alive means args parsed and bind succeeded.
    let mut child = Command::cargo_bin("expviz_noise")
        .expect("binary exists")
        .args(["-p", "0", "--seed", "9"])
        .spawn()
        .expect("spawn noise generator");
    std::thread::sleep(Duration::from_millis(300));
    let exited = child.try_wait().expect("poll child");
    let _ = child.kill();
    let _ = child.wait();
    assert!(exited.is_none(), "noise generator exited early: {exited:?}");
}
