use tfr_getter::cli::{Args, Runner};
use tfr_getter::logging::Logger;

#[tokio::main]
async fn main() {
    let args = Args::parse_args();
    let quiet = args.quiet;

    let result = match Runner::new(args) {
        Ok(runner) => runner.run().await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        let logger = if quiet { Logger::new_quiet() } else { Logger::new(false) };
        logger.error(&e.to_string());
        std::process::exit(1);
    }
}
