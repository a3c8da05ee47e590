mod archiver;
mod cli;
mod commands;
mod env_loader;
mod error;
mod logging;

use error::ArchiveErrorCode;

fn main() {
    env_loader::load_dotenv();

    if let Err(err) = cli::run() {
        match ArchiveErrorCode::classify(&err) {
            Some(code) => eprintln!("error: {}: {err:#}", code.as_str()),
            None => eprintln!("error: {err:#}"),
        }
        std::process::exit(1);
    }
}
