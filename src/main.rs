fn main() {
    let code = match deltamake::run::run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("deltamake: {:#}", err);
            1
        }
    };
    std::process::exit(code);
}
