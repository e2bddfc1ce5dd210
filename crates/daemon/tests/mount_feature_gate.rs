//! Emit a warning when FUSE-dependent tests are skipped.
//!
//! The mount tests live in `mount_integration.rs` and are gated behind
//! `#[cfg(feature = "fuse")]`. This companion file makes sure a visible
//! message is emitted when running `cargo test --no-default-features`, so the
//! missing coverage is not silently hidden. The adapter tests in
//! `adapter_integration.rs` run either way.

#[cfg(not(feature = "fuse"))]
#[test]
fn fuse_tests_skipped_warning() {
    eprintln!(
        "\n\x1b[33mwarning\x1b[0m: Skipping drivefs mount tests: built without `fuse` feature.\n\
         To run them, build with: cargo test --features fuse\n"
    );
}
