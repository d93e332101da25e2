use crate::demo::{run_demo, run_reconcile, DemoArgs, ReconcileArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use interview_booking::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Interview Booking",
    about = "Run and demonstrate the interview booking service from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk through a booking from availability to approval against an in-memory store
    Demo(DemoArgs),
    /// Run one reconciliation pass over a seeded snapshot and print the report
    Reconcile(ReconcileArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args).await,
        Command::Reconcile(args) => run_reconcile(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["interview-booking-api"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn demo_accepts_date_and_failure_flag() {
        let cli = Cli::try_parse_from([
            "interview-booking-api",
            "demo",
            "--date",
            "2025-03-10",
            "--fail-interviewer-mail",
        ])
        .expect("parses");
        match cli.command {
            Some(Command::Demo(args)) => {
                assert_eq!(args.date.map(|d| d.to_string()).as_deref(), Some("2025-03-10"));
                assert!(args.fail_interviewer_mail);
            }
            other => panic!("expected demo command, got {other:?}"),
        }
    }

    #[test]
    fn demo_rejects_malformed_dates() {
        assert!(Cli::try_parse_from(["interview-booking-api", "demo", "--date", "10/03/2025"]).is_err());
    }
}
