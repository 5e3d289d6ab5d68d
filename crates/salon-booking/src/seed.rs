//! Sample catalog and a week of slots for a fresh database.

use chrono::{Duration, NaiveDate};
use tracing::info;

use crate::booking_db::{BookingDatabase, NewService};
use crate::error::BookingResult;
use crate::scheduling::OperatingHours;

const SEED_DAYS: i64 = 7;

/// (name, description, minutes, price)
const SAMPLE_SERVICES: [(&str, &str, i64, f64); 6] = [
    ("Gel Manicure", "Long-lasting gel polish with a glossy finish", 60, 200000.0),
    ("Gel Manicure with Nail Art", "Gel polish plus hand-painted designs", 90, 350000.0),
    ("Regular Polish", "Classic polish in the color of your choice", 30, 100000.0),
    ("Nail Trim and Shape", "Trimming, filing and shaping", 20, 50000.0),
    ("Rhinestone Nails", "Gel nails decorated with rhinestones and charms", 120, 500000.0),
    ("Nail Removal and Redo", "Remove old gel or acrylic and apply a fresh set", 90, 400000.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub services_created: usize,
    pub slots_created: usize,
}

/// Seed services and `today` plus the next six days of slots. Does nothing when any
/// service already exists, so running it again is harmless.
pub fn seed_sample_data(
    database: &BookingDatabase,
    today: NaiveDate,
    hours: &OperatingHours,
) -> BookingResult<Option<SeedReport>> {
    if database.services.count()? > 0 {
        info!("Services already present, skipping sample data");
        return Ok(None);
    }

    for (name, description, minutes, price) in SAMPLE_SERVICES {
        database.services.create(NewService {
            name: name.to_string(),
            description: Some(description.to_string()),
            duration_minutes: minutes,
            price,
        })?;
    }

    let mut slots_created = 0;
    for offset in 0..SEED_DAYS {
        let generated = database.slots.generate(today + Duration::days(offset), hours)?;
        slots_created += generated.created;
    }

    let report = SeedReport {
        services_created: SAMPLE_SERVICES.len(),
        slots_created,
    };
    info!(
        "Seeded {} services and {} time slots",
        report.services_created, report.slots_created
    );
    Ok(Some(report))
}
