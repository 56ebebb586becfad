//! Shared helpers: real shell scripts in a scratch directory.
#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write an executable `/bin/sh` script.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
    path
}

/// A toggle script that keeps its state in `<name>.state` beside itself,
/// following the `check` / `toggle true|false` contract.
pub fn write_state_script(dir: &Path, name: &str, initial: bool) -> PathBuf {
    fs::write(dir.join(format!("{}.state", name)), if initial { "true\n" } else { "false\n" })
        .expect("write state");
    write_script(
        dir,
        &format!("{}.sh", name),
        &format!(
            r#"STATE="$(dirname "$0")/{name}.state"
case "$1" in
    check) cat "$STATE" ;;
    toggle) echo "$2" > "$STATE" ;;
    *) echo "usage: $0 check|toggle true|false" >&2; exit 2 ;;
esac"#,
            name = name
        ),
    )
}

pub fn read_state(dir: &Path, name: &str) -> String {
    fs::read_to_string(dir.join(format!("{}.state", name)))
        .expect("read state")
        .trim()
        .to_string()
}
