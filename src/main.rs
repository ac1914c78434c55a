use anyhow::Result;
use clap::Parser;
use scbamsplit::cli::Args;
use scbamsplit::pipeline;

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_level())).init();
    pipeline::run(&args)
}
