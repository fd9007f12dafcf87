// Fake executables for process tests

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write an executable `sh` script named `megatools` into `dir`
pub(crate) fn fake_executable(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("megatools");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}
