use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "grabbot")]
#[command(author, version, about = "Telegram bot for downloading videos and converting media", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Run the bot (long polling unless --webhook)
    Run {
        /// Receive updates through WEBHOOK_URL instead of long polling
        #[arg(long)]
        webhook: bool,
    },

    /// Print account statistics from the database
    Stats,

    /// Write all accounts as CSV
    Export {
        /// Destination file
        path: String,
    },

    /// Sign in the user account used for keyword search
    Login,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_defaults_to_polling() {
        let cli = Cli::try_parse_from(["grabbot", "run"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Run { webhook: false }));
    }

    #[test]
    fn test_export_requires_path() {
        assert!(Cli::try_parse_from(["grabbot", "export"]).is_err());
        let cli = Cli::try_parse_from(["grabbot", "export", "users.csv"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Export {
                path: "users.csv".to_string()
            })
        );
    }

    #[test]
    fn test_login_takes_no_arguments() {
        let cli = Cli::try_parse_from(["grabbot", "login"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Login));
        assert!(Cli::try_parse_from(["grabbot", "login", "+100"]).is_err());
    }

    #[test]
    fn test_no_subcommand() {
        let cli = Cli::try_parse_from(["grabbot"]).unwrap();
        assert!(cli.command.is_none());
    }
}
