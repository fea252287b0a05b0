use clap::{
    crate_authors,
    crate_description,
    crate_name,
    crate_version,
    Args,
    Parser,
};

pub mod server;

#[derive(Parser, Debug)]
#[command(name = crate_name!())]
#[command(author = crate_authors!())]
#[command(about = crate_description!())]
#[command(version = crate_version!())]
pub enum Options {
    /// Run the auction engine service.
    Run(RunOptions),
}

#[derive(Args, Clone, Debug)]
pub struct RunOptions {
    /// Server Options
    #[command(flatten)]
    pub server: server::Options,

    /// Minimum increment over the current price required for a bid to be
    /// accepted. Zero disables the rule.
    #[arg(long = "min-increment")]
    #[arg(env = "MIN_INCREMENT")]
    #[arg(default_value = "0")]
    pub min_increment: f64,
}
