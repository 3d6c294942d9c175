fn main() {
    if let Err(err) = table_sync::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
