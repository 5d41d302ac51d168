//! Shared snapshot fixtures for the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

pub const UNIX_HEADER: &str = "Num       RefCount Protocol Flags    Type St Inode Path";
pub const TCP_HEADER: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode";

pub fn unix_table() -> Vec<String> {
    vec![
        UNIX_HEADER.to_string(),
        "ffff8f2a1c3e4400: 00000002 00000000 00010000 0001 01 100 /run/dbus/system_bus_socket"
            .to_string(),
        "ffff8f2a1c3e4800: 00000003 00000000 00000000 0001 03 200".to_string(),
    ]
}

pub fn tcp_line(state: &str, uid: u32, inode: &str) -> String {
    format!(
        "   0: 0100007F:1F90 00000000:0000 {state} 00000000:00000000 00:00000000 00000000  {uid}        0 {inode} 1 0000000000000000 100 0 0 10 0"
    )
}

/// TCP table with one established and one listening connection of carol,
/// neither of them referenced by her descriptors.
pub fn tcp_table() -> Vec<String> {
    vec![
        TCP_HEADER.to_string(),
        tcp_line("01", 5000, "999"),
        tcp_line("0A", 5000, "0"),
        tcp_line("0A", 0, "17"),
    ]
}

pub fn process_list() -> Vec<String> {
    vec![
        "  UID USER                             PID".to_string(),
        "    0 root                               1".to_string(),
        " 5000 carol                             10".to_string(),
        " 5000 carol                             11".to_string(),
    ]
}

fn fd_line(owner: &str, fd: u32, target: &str) -> String {
    format!("lrwx------ 1 {owner} {owner} 64 Jun 18 19:33 {fd} -> {target}")
}

fn listing_header() -> Vec<String> {
    vec![
        "total 0".to_string(),
        "dr-x------ 2 carol carol  0 Jun 18 19:33 .".to_string(),
        "dr-xr-xr-x 9 carol carol  0 Jun 18 19:33 ..".to_string(),
    ]
}

/// Two open files, one of them the unix socket 100.
pub fn listing_10() -> Vec<String> {
    let mut lines = listing_header();
    lines.push(fd_line("carol", 3, "socket:[100]"));
    lines.push(fd_line("carol", 4, "/dev/null"));
    lines
}

/// Three open files: unix socket 200, socket 300 unknown to every table, a pipe.
pub fn listing_11() -> Vec<String> {
    let mut lines = listing_header();
    lines.push(fd_line("carol", 3, "socket:[200]"));
    lines.push(fd_line("carol", 4, "socket:[300]"));
    lines.push(fd_line("carol", 5, "pipe:[9]"));
    lines
}

fn write_lines(path: &Path, lines: &[String]) {
    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(path, content).unwrap();
}

/// Writes the scenario above in the `FixtureSource` layout.
pub fn write_fixture(dir: &Path) {
    write_lines(&dir.join("unix"), &unix_table());
    write_lines(&dir.join("tcp"), &tcp_table());
    write_lines(&dir.join("tcp6"), &[TCP_HEADER.to_string()]);
    write_lines(&dir.join("ps"), &process_list());
    fs::create_dir_all(dir.join("fd")).unwrap();
    write_lines(&dir.join("fd").join("10"), &listing_10());
    write_lines(&dir.join("fd").join("11"), &listing_11());
}
