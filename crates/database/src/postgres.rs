use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use taskbay_common::define_module_client;

define_module_client! {
    (struct PostgresClient, "postgres")
    client_type: PgPool,
    env: ["DATABASE_URL"],
    setup: async {
        let database_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL environment variable not set");

        PgPoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await
            .expect("Failed to connect to postgres")
    }
}
