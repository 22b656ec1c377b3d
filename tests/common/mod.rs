//! Shared fixtures: fake signing tools and module files in a temp dir.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use kmod_signer::SignerConfig;

/// Signature block appended by the fake signer for hash `sha512`.
pub const FAKE_SIG_BLOCK: &[u8] = b"SIG:sha512~Module signature appended~\n";

pub fn write_exec(path: &Path, body: &str) {
    fs::write(path, body).expect("write script");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod script");
}

/// Lay out `<root>/build/{scripts/sign-file, certs-local/current/*}`.
///
/// The signer appends `SIG:<hash>` plus the kernel signature marker to its
/// 4th argument, like `scripts/sign-file <hash> <key> <cert> <module>`.
pub fn fake_build_dir(root: &Path) -> PathBuf {
    let build = root.join("build");
    fs::create_dir_all(build.join("scripts")).expect("mkdir scripts");
    fs::create_dir_all(build.join("certs-local/current")).expect("mkdir certs");
    write_exec(
        &build.join("scripts/sign-file"),
        "#!/bin/sh\nprintf 'SIG:%s' \"$1\" >> \"$4\"\nprintf '~Module signature appended~\\n' >> \"$4\"\n",
    );
    fs::write(build.join("certs-local/current/signing_key.pem"), "key").expect("key");
    fs::write(build.join("certs-local/current/signing_crt.crt"), "crt").expect("crt");
    build
}

pub fn fake_signer(build: &Path) -> SignerConfig {
    kmod_signer::SignerPaths::from_build_dir(build)
        .build()
        .expect("fake signer should be initialized")
}

/// Strip tool that drops the fake signature block from the end of `$2`,
/// replacing the file (new inode) the way binutils strip does.
pub fn fake_strip(root: &Path) -> PathBuf {
    let strip = root.join("strip");
    write_exec(
        &strip,
        &format!(
            "#!/bin/sh\n[ \"$1\" = --strip-debug ] || exit 64\nn=$(wc -c < \"$2\")\nhead -c $((n - {})) \"$2\" > \"$2.new\" && mv \"$2.new\" \"$2\"\n",
            FAKE_SIG_BLOCK.len()
        ),
    );
    strip
}

/// Strip tool that always fails.
pub fn failing_strip(root: &Path) -> PathBuf {
    let strip = root.join("strip-fail");
    write_exec(&strip, "#!/bin/sh\necho 'strip: file format not recognized' >&2\nexit 1\n");
    strip
}

/// Names of leftover staging files in `dir`.
pub fn staged_leftovers(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .expect("read dir")
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| n.starts_with(".kmod-sign-"))
        .collect()
}
