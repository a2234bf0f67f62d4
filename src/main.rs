use clap::Parser;

#[tokio::main]
async fn main() {
    let args = aniloader::cli::Args::parse();

    if let Err(err) = aniloader::app::run(args).await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
