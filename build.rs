use std::process::Command;

/// Build identifier reported by `/`, `/health` and `bridge_diagnostics`.
/// Release tarballs have no `.git`, so packagers can pin it with
/// `BRIDGE_BUILD_HASH`.
fn build_hash() -> String {
    if let Ok(pinned) = std::env::var("BRIDGE_BUILD_HASH") {
        if !pinned.trim().is_empty() {
            return pinned.trim().to_string();
        }
    }

    Command::new("git")
        .args(["describe", "--always", "--dirty", "--abbrev=10"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .filter(|hash| !hash.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    println!("cargo:rustc-env=GIT_HASH={}", build_hash());
    println!("cargo:rerun-if-env-changed=BRIDGE_BUILD_HASH");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");
}
