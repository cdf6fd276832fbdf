fn main() {
    if let Err(e) = triagechat_lib::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
