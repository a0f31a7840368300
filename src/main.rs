fn main() {
    if let Err(e) = pwb_access::run() {
        eprintln!("pwb-access failed: {e}");
        std::process::exit(1);
    }
}
