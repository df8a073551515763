//! `plsp-server` with the routines of this crate linked in. Point
//! `--static-dir` or `--dynamic-dir` at a directory holding their
//! descriptors to make them callable.

fn main() -> std::process::ExitCode {
    plsp_server::cli::run(plsp_routines::symbols())
}
