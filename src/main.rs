use conjure::cli;

fn main() -> anyhow::Result<()> {
    if let Err(e) = cli::run() {
        let msg = e.to_string();
        // Diagnostics for these were already rendered.
        if msg.contains("parsing failed") || msg.contains("materialization failed") {
            std::process::exit(1);
        }
        eprintln!("Error: {:?}", e);
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use conjure::cli::{Command, ConjureCli};

    #[test]
    fn call_command_collects_arguments() {
        let cli = ConjureCli::parse_from([
            "conjure",
            "call",
            "demos/fibonacci.py",
            "fibonacci",
            "10",
            "-3",
            "--kw",
            "memo=True",
            "--store",
            "target/store.json",
        ]);
        match cli.command() {
            Command::Call {
                path,
                function,
                args,
                kwargs,
            } => {
                assert_eq!(path.to_string_lossy(), "demos/fibonacci.py");
                assert_eq!(function, "fibonacci");
                assert_eq!(args, &["10", "-3"]);
                assert_eq!(kwargs, &["memo=True"]);
            }
            other => panic!("expected call command, got {other:?}"),
        }
    }

    #[test]
    fn freeze_command_honors_output_flag() {
        let cli = ConjureCli::parse_from([
            "conjure",
            "freeze",
            "demos/fibonacci.py",
            "--output",
            "target/frozen.py",
        ]);
        match cli.command() {
            Command::Freeze { path, output } => {
                assert_eq!(path.to_string_lossy(), "demos/fibonacci.py");
                assert_eq!(
                    output.as_ref().map(|p| p.to_string_lossy().into_owned()),
                    Some("target/frozen.py".into())
                );
            }
            other => panic!("expected freeze command, got {other:?}"),
        }
    }
}
