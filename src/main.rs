fn main() {
    if let Err(err) = wbs_loader::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
