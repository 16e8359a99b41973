use fds_query::CliError;

fn is_json_args() -> bool {
    std::env::args().any(|arg| arg == "--json")
}

fn report(err: &CliError) {
    if is_json_args() {
        let payload = serde_json::json!({ "error": err });
        eprintln!("{payload}");
    } else {
        eprintln!("error: {}", err.message);
        if let Some(hint) = &err.hint {
            eprintln!("hint: {hint}");
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Load .env early; ignore if missing.
    dotenvy::dotenv().ok();

    let raw_args: Vec<String> = std::env::args().collect();
    let cli = match fds_query::parse_cli(raw_args) {
        Ok(cli) => cli,
        // --help / --version
        Err(err) if err.code == 0 => {
            print!("{}", err.message);
            return Ok(());
        }
        Err(err) => {
            if is_json_args() {
                report(&err);
            } else {
                eprint!("{}", err.message);
            }
            std::process::exit(err.code);
        }
    };

    fds_query::init_logging(cli.verbose)?;

    if let Err(err) = fds_query::run(cli) {
        report(&err);
        std::process::exit(err.code);
    }
    Ok(())
}
