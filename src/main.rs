use actix_web::{middleware, web, App, HttpServer};

use foodgram::config::Config;
use foodgram::{db, routes};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::load()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    // set up database connection pool, migrations included
    let pool =
        db::init_pool(&config.database_url, config.pool_size).map_err(std::io::Error::other)?;

    let bind = (config.bind_address.clone(), config.port);
    log::info!("starting HTTP server at http://{}:{}", bind.0, bind.1);

    let config = web::Data::new(config);
    let pool = web::Data::new(pool);

    HttpServer::new(move || {
        App::new()
            .app_data(pool.clone())
            .app_data(config.clone())
            .wrap(middleware::NormalizePath::trim())
            .wrap(middleware::Logger::default())
            .configure(routes::configure)
    })
    .bind(bind)?
    .run()
    .await
}
