use clap::Parser;

use hpf_binner::app;
use hpf_binner::cli::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.log_level)
        .parse_default_env()
        .init();

    app::run(cli)
}
