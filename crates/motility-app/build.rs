use std::fs;
use std::path::PathBuf;

// Exposes the workspace `VERSION` file as `MOTILITY_VERSION`.
fn main() {
    let manifest_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").expect("manifest dir"));
    let version_path = manifest_dir
        .ancestors()
        .nth(2)
        .expect("crate lives in <root>/crates/<name>")
        .join("VERSION");
    println!("cargo:rerun-if-changed={}", version_path.display());

    let version = fs::read_to_string(&version_path)
        .unwrap_or_else(|error| panic!("cannot read {}: {error}", version_path.display()));
    let version = version.trim();
    let well_formed = version.split('.').count() == 3
        && version
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|ch| ch.is_ascii_digit()));
    assert!(well_formed, "VERSION must be MAJOR.MINOR.PATCH, got {version:?}");

    println!("cargo:rustc-env=MOTILITY_VERSION={version}");
}
