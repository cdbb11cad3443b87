use std::io::Write;

use batchrun::app::cli;
use batchrun::config::Config;
use batchrun::manager::session::Session;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| writeln!(buf, "\r[{}] {}", record.level(), record.args()))
        .init();

    let session = Session::new(Config::from_env());

    if let Err(e) = cli::run_cli(session) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
