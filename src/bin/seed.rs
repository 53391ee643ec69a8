//! Seed script for development — populates a fresh database with sample data.
//!
//! Usage: `cargo run --bin seed`
//!
//! Requires the `DATABASE_URL` environment variable (reads .env).

use chrono::{Duration, Utc};
use sqlx::PgPool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let db_url = std::env::var("DATABASE_URL")?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    // Run migrations first
    usage_stats::db::run_migrations(&pool).await?;

    println!("=== Usage Statistics Seed Script ===");

    seed_users(&pool).await?;
    seed_dashboards(&pool).await?;
    seed_revisions(&pool).await?;
    seed_analytics(&pool).await?;
    seed_sessions(&pool).await?;

    println!("\n=== Seed complete! ===");
    Ok(())
}

async fn is_empty(pool: &PgPool, table: &str) -> anyhow::Result<bool> {
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await?;
    if count > 0 {
        println!("[skip] {table} already populated ({count})");
    }
    Ok(count == 0)
}

async fn seed_users(pool: &PgPool) -> anyhow::Result<()> {
    if !is_empty(pool, "users").await? {
        return Ok(());
    }

    let now = Utc::now();
    let users = [
        ("Cyclotron", Some(now), 9000_i64),
        ("alice", Some(now - Duration::hours(3)), 42),
        ("bob", Some(now - Duration::days(12)), 7),
        ("carol", Some(now - Duration::days(95)), 3),
        ("dave", None, 0),
    ];

    for (name, last_login, times) in users {
        sqlx::query("INSERT INTO users (name, last_login, times_logged_in) VALUES ($1, $2, $3)")
            .bind(name)
            .bind(last_login)
            .bind(times)
            .execute(pool)
            .await?;
    }

    println!("[done] Created {} users", users.len());
    Ok(())
}

async fn seed_dashboards(pool: &PgPool) -> anyhow::Result<()> {
    if !is_empty(pool, "dashboards").await? {
        return Ok(());
    }

    let now = Utc::now();
    let dashboards = [
        ("ops-overview", false, now - Duration::hours(1)),
        ("sales-weekly", false, now - Duration::days(20)),
        ("latency", false, now - Duration::days(150)),
        ("legacy-kpis", true, now - Duration::days(400)),
        ("scratch", true, now - Duration::days(2)),
    ];

    for (name, deleted, date) in dashboards {
        sqlx::query("INSERT INTO dashboards (name, deleted, date) VALUES ($1, $2, $3)")
            .bind(name)
            .bind(deleted)
            .bind(date)
            .execute(pool)
            .await?;
    }

    println!("[done] Created {} dashboards", dashboards.len());
    Ok(())
}

async fn seed_revisions(pool: &PgPool) -> anyhow::Result<()> {
    if !is_empty(pool, "revisions").await? {
        return Ok(());
    }

    let revisions = [
        ("ops-overview", Some("alice")),
        ("ops-overview", Some("alice")),
        ("ops-overview", Some("bob")),
        ("sales-weekly", Some("bob")),
        ("latency", Some("carol")),
        ("legacy-kpis", None),
    ];

    let mut next_rev = std::collections::HashMap::new();
    for (name, editor) in revisions {
        let rev: &mut i64 = next_rev.entry(name).or_insert(0);
        *rev += 1;
        sqlx::query("INSERT INTO revisions (name, rev, last_updated_by) VALUES ($1, $2, $3)")
            .bind(name)
            .bind(*rev)
            .bind(editor)
            .execute(pool)
            .await?;
    }

    println!("[done] Created {} revisions", revisions.len());
    Ok(())
}

async fn seed_analytics(pool: &PgPool) -> anyhow::Result<()> {
    if !is_empty(pool, "analytics").await? {
        return Ok(());
    }

    let views = [
        ("uid-1", "visit-1", "ops-overview"),
        ("uid-1", "visit-1", "latency"),
        ("uid-1", "visit-2", "ops-overview"),
        ("uid-2", "visit-3", "sales-weekly"),
        ("uid-3", "visit-4", "ops-overview"),
        ("uid-3", "visit-4", "sales-weekly"),
    ];

    for (uid, visit, dashboard) in views {
        sqlx::query("INSERT INTO analytics (uid, visit_id, dashboard) VALUES ($1, $2, $3)")
            .bind(uid)
            .bind(visit)
            .bind(dashboard)
            .execute(pool)
            .await?;
    }

    println!("[done] Created {} page views", views.len());
    Ok(())
}

async fn seed_sessions(pool: &PgPool) -> anyhow::Result<()> {
    if !is_empty(pool, "sessions").await? {
        return Ok(());
    }

    let now = Utc::now();
    let sessions = [
        ("session-expired", now - Duration::hours(1)),
        ("session-alice", now + Duration::hours(8)),
        ("session-bob", now + Duration::hours(20)),
    ];

    for (key, expiration) in sessions {
        sqlx::query("INSERT INTO sessions (key, expiration) VALUES ($1, $2)")
            .bind(key)
            .bind(expiration)
            .execute(pool)
            .await?;
    }

    println!("[done] Created {} sessions", sessions.len());
    Ok(())
}
