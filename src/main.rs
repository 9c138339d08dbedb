use astropost::app::{initialize_client, prepare_action, run_action};
use astropost::cli::{handle_token_clear, Cli, Command};
use astropost::logging::init_tracing;
use clap::{CommandFactory, Parser};
use std::process::ExitCode;

async fn run(cli: &Cli, command: Command) -> astropost::Result<String> {
    let action = prepare_action(command)?;
    let client = initialize_client(cli).await?;
    run_action(&client, action).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let mut cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.clear_token {
        return match handle_token_clear(&cli.auth_config()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::from(e.exit_code())
            }
        };
    }

    let Some(command) = cli.command.take() else {
        let _ = Cli::command().print_help();
        return ExitCode::from(2);
    };

    match run(&cli, command).await {
        Ok(output) => {
            print!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
