fn main() -> std::process::ExitCode {
    plsp_server::cli::run(plsp_server::SymbolTable::new())
}
