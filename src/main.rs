use std::path::PathBuf;

use clap::Parser;
use log::{error, info};
use tower_lsp::{LspService, Server};

use projdict::lsp::{Backend, IS_ACCEPTED};
use projdict::Config;

#[derive(Parser, Debug)]
#[command(version, about = "Project dictionary language server")]
struct Args {
    /// Config file, defaults to <config dir>/projdict/config.json
    #[arg(long)]
    config: Option<PathBuf>,

    /// Milliseconds to wait after a file change before reloading
    #[arg(long)]
    reload_delay: Option<u64>,

    /// Don't watch dictionary files on disk
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };
    if let Some(delay) = args.reload_delay {
        config.reload_delay_ms = delay;
    }
    if args.no_watch {
        config.watch_files = false;
    }

    let (stdin, stdout) = (tokio::io::stdin(), tokio::io::stdout());

    let (service, socket) = LspService::build(move |client| Backend::new(client, config))
        .custom_method(IS_ACCEPTED, Backend::is_accepted)
        .finish();

    info!("Started language server");
    Server::new(stdin, stdout, socket).serve(service).await;
}
