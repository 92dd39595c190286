//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `checkin_core` linkage without the Flutter host.
//! - When given a journal database path, preview the next reminder batch.

use checkin_core::db::open_db;
use checkin_core::{open_reconciler, plan_batch};
use chrono::{Local, Utc};

const PREVIEW_LIMIT: usize = 5;

fn main() {
    println!("checkin_core ping={}", checkin_core::ping());
    println!("checkin_core version={}", checkin_core::core_version());

    let Some(db_path) = std::env::args().nth(1) else {
        return;
    };
    if let Err(err) = preview(&db_path) {
        eprintln!("preview failed: {err}");
        std::process::exit(1);
    }
}

fn preview(db_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let reconciler = open_reconciler(open_db(db_path)?, Local)?;
    println!("journal entries={}", reconciler.store().len());

    let batch = plan_batch(reconciler.settings(), reconciler.time_zone(), Utc::now())?;
    if batch.is_empty() {
        println!("no reminders configured");
        return Ok(());
    }
    println!("pending batch size={}", batch.len());
    for notification in batch.iter().take(PREVIEW_LIMIT) {
        println!(
            "next fire_at={}",
            notification.fire_at.with_timezone(&Local).format("%a %Y-%m-%d %H:%M")
        );
    }
    Ok(())
}
