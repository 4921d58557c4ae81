mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use session::{Session, SessionOptions};

const USAGE: &str =
    "Usage: glow-emulator [--maintenance] [--seed <n>] [--no-radio] [--transcript <path>]";

fn main() -> io::Result<()> {
    let options = parse_options(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();

    writeln!(
        writer,
        "Glow emulator ready. Type `help` for commands or `exit` to quit."
    )?;
    let (mut session, boot_lines) = Session::start(options)?;
    for line in boot_lines {
        writeln!(writer, "{line}")?;
    }

    let mut line = String::new();
    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        let responses = session.handle_command(trimmed)?;
        for response in responses {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<SessionOptions, String> {
    let mut options = SessionOptions {
        radio_fitted: true,
        ..SessionOptions::default()
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--maintenance" => options.maintenance = true,
            "--no-radio" => options.radio_fitted = false,
            "--seed" => {
                let value = args.next().ok_or("Expected value after --seed")?;
                options.seed = parse_seed(&value)?;
            }
            "--transcript" => {
                let value = args.next().ok_or("Expected path after --transcript")?;
                options.transcript = Some(PathBuf::from(value));
            }
            other => {
                if let Some(value) = other.strip_prefix("--seed=") {
                    options.seed = parse_seed(value)?;
                } else if let Some(value) = other.strip_prefix("--transcript=") {
                    options.transcript = Some(PathBuf::from(value));
                } else {
                    return Err(format!("Unknown argument `{other}`"));
                }
            }
        }
    }

    Ok(options)
}

fn parse_seed(value: &str) -> Result<u64, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid seed `{value}`"))
}
