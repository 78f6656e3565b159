use migration::Migrator;
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;

pub async fn run_all_migrations(url: &str) {
    let db = Database::connect(url)
        .await
        .expect("Failed to connect to database");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    println!("All migrations applied: {}", url);
}
