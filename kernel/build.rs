// kernel/build.rs
//
// ブートイメージ（target_os = "none"）のときだけ linker.ld を bin に渡す。
// ホストの cargo test では何もしない。

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=linker.ld");

    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("none") {
        return;
    }

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_default());
    let script = manifest_dir.join("linker.ld");
    println!("cargo:rustc-link-arg-bins=-T{}", script.display());
}
