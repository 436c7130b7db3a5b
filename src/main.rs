use clap::Parser;
use fern::colors::{Color, ColoredLevelConfig};
use log::{error, info};
use warp::Filter;

mod config;
mod reports;
mod routes;

use config::Config;
use db::{new_db, seed};
use filters::TokenSigner;

#[tokio::main]
async fn main() {
    let config = Config::parse();
    setup_logging(config.log_level);

    let global_db = match new_db(&config.database) {
        Ok(db) => db,
        Err(e) => {
            error!("Could not open database {}: {}", config.database, e);
            std::process::exit(1);
        }
    };

    {
        let mut db = global_db.lock().await;
        if let Err(e) = seed::ensure_admin(&mut *db, &config.admin_email, &config.admin_password)
        {
            error!("Could not create the admin account: {}", e);
            std::process::exit(1);
        }
    }

    let tokens = TokenSigner::new(
        &config.jwt_secret,
        chrono::Duration::days(config.token_ttl_days),
    );
    let filters = routes::api(&global_db, &tokens, config.development)
        .with(warp::log("mentorlog"));

    let address = config.socket_address();
    info!("Listening on http://{}", address);

    warp::serve(filters).run(address).await;
}

fn setup_logging(level: log::LevelFilter) {
    let colors = ColoredLevelConfig::new().debug(Color::Magenta);

    let result = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{}{} {}",
                colors.color(record.level()),
                chrono::Local::now().format("[%H:%M:%S]"),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply();

    if let Err(e) = result {
        eprintln!("Could not apply logging configuration: {}", e);
    }
}
