#![recursion_limit = "256"]

// Layer map:
//   1 cli          argument parsing, subcommand routing
//   2 application  one use case per subcommand
//   3 domain       vocabulary, captions, traits (no burn types)
//   4 data         annotations, image preprocessing, shards, batching
//   5 ml           model, training, evaluation, beam search
//   6 infra        checkpoints, vocabulary file, metrics, file globs
//   7 web          upload form server

mod cli;
mod application;
mod domain;
mod data;
mod error;
mod ml;
mod infra;
mod web;

use anyhow::Result;
use clap::Parser;
use cli::Cli;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("show_and_tell=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    Cli::parse().run()
}
