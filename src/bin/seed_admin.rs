//! Admin bootstrap
//!
//! Creates (or promotes) an admin user, registers a device for it and records
//! a VERIFIED verification so the admin can log in. An existing user's
//! password is replaced with the one given here.
//!
//! Run with: cargo run --bin seed_admin -- --email admin@jambo.rw --password <pw> --device <id>

use sqlx::postgres::PgPoolOptions;

use jambo_backend::handlers::{BootstrapAdminCommand, BootstrapAdminHandler};

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let email = arg_value(&args, "--email")
        .or_else(|| std::env::var("ADMIN_EMAIL").ok())
        .ok_or_else(|| anyhow::anyhow!("--email or ADMIN_EMAIL is required"))?;
    let password = arg_value(&args, "--password")
        .or_else(|| std::env::var("ADMIN_PASSWORD").ok())
        .ok_or_else(|| anyhow::anyhow!("--password or ADMIN_PASSWORD is required"))?;
    let device_id = arg_value(&args, "--device").unwrap_or_else(|| "admin-console".to_string());

    let database_url = std::env::var("DATABASE_URL")?;
    println!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;

    let result = BootstrapAdminHandler::new(pool)
        .execute(BootstrapAdminCommand {
            email: email.clone(),
            password,
            device_id,
        })
        .await?;

    if result.created_user {
        println!("Created admin user {}", email);
    } else {
        println!("Promoted existing user {} to admin and reset its password", email);
    }
    if !result.created_device {
        println!("Reusing existing device record");
    }

    println!();
    println!("=== Admin ready ===");
    println!("User id:   {}", result.user_id);
    println!("Device id: {}  (use as device_id when logging in)", result.device_id);

    Ok(())
}
