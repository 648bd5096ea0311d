use std::process;

use clap::Parser;

use l10n_scheduler::cli::Options;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let options = Options::parse();

    if let Err(err) = options.run().await {
        tracing::error!("{err:?}");
        process::exit(1);
    }
}
