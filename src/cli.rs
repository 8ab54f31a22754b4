use clap::{Parser, Subcommand};

/// Command-line surface for devproxy (`spec.md` §6). Grounded on
/// `mockforge-cli`'s use of `clap`'s derive API; merged into `Config` via
/// `Config::merge_with_cli`, mirroring the teacher's
/// `Config::merge_with_opt`.
#[derive(Debug, Parser)]
#[command(name = "devproxy", version, about = "A developer-oriented intercepting proxy")]
pub struct Cli {
    #[arg(short = 'c', long = "config-file")]
    pub config_file: Option<std::path::PathBuf>,

    #[arg(short = 'u', long = "urls-to-watch", num_args = 0..)]
    pub urls_to_watch: Vec<String>,

    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    #[arg(long = "ip-address")]
    pub ip_address: Option<String>,

    #[arg(short = 'r', long = "record")]
    pub record: bool,

    #[arg(long = "log-level")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands named for interface completeness per `spec.md` §6; none
/// of them are implemented beyond a clear "not implemented" message,
/// since the console renderer, OpenAPI generator, and JWT helper are out
/// of the core's scope.
#[derive(Debug, Subcommand)]
pub enum Command {
    Config,
    Outdated,
    #[command(name = "jwt")]
    Jwt {
        #[command(subcommand)]
        action: JwtAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum JwtAction {
    Create,
}

impl Command {
    pub fn run(&self) -> i32 {
        match self {
            Command::Config | Command::Outdated | Command::Jwt { .. } => {
                eprintln!("this subcommand is not implemented in this build");
                1
            }
        }
    }
}
