use std::{env, process::Command};

use anyhow::Result as AnyResult;
use chrono::Utc;

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|stdout| stdout.trim().to_owned())
}

fn main() -> AnyResult<()> {
    let commit_sha = git(&["rev-parse", "HEAD"]).unwrap_or_else(|| "unknown".to_owned());
    let commit_date =
        git(&["log", "-1", "--format=%cI"]).unwrap_or_else(|| "unknown".to_owned());
    println!("cargo:rustc-env=COMMIT_SHA={}", commit_sha);
    println!("cargo:rustc-env=COMMIT_DATE={}", commit_date);
    println!("cargo:rustc-env=TARGET={}", env::var("TARGET")?);
    println!("cargo:rustc-env=BUILD_DATE={}", Utc::now().format("%Y-%m-%d"));
    println!("cargo:rerun-if-changed=.git/HEAD");
    Ok(())
}
