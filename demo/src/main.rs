//! Plotbook Demo
//!
//! Scripted session against the booking core showing:
//! - Posting a listing with two blocks of plots
//! - Unit listing with reconciled per-plot prices
//! - Booking a plot, and buyers racing for the last plots of a block
//! - Owner confirmation and the owner-only guard
//! - Messaging with a realtime subscription
//!
//! # Usage
//!
//! ```bash
//! # In-memory store
//! cargo run --bin plotbook-demo
//!
//! # PostgreSQL store
//! PLOTBOOK_BACKEND=postgres DATABASE_URL=postgres://localhost/plotbook cargo run --bin plotbook-demo
//! ```

mod backends;

use backends::Backends;
use futures::StreamExt;
use plotbook_core::availability::UnitSelection;
use plotbook_core::booking::{BookingCommitter, BookingEnvironment, BookingError, BookingRequest};
use plotbook_core::config::Config;
use plotbook_core::environment::SystemClock;
use plotbook_core::favorites::FavoritesService;
use plotbook_core::inventory::{Inventory, PlotSlot, PurchasableUnits};
use plotbook_core::listing::{ListingEnvironment, ListingService, NewBlock, NewListing};
use plotbook_core::messaging::MessagingService;
use plotbook_core::search::{PropertyFilter, PropertySearch};
use plotbook_core::types::{AreaUnit, BookingStatus, BuyerContact, PriceType, UserId};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn buyer(name: &str, phone: &str) -> BuyerContact {
    BuyerContact { name: name.to_string(), phone: phone.to_string(), ..BuyerContact::default() }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,plotbook=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("\n============================================");
    println!("   Plotbook - Live Demo");
    println!("============================================\n");

    let config = Config::from_env();
    config.validate()?;
    let backends = Backends::from_env(&config).await?;
    let clock = Arc::new(SystemClock);

    let listings = ListingService::new(ListingEnvironment {
        listings: backends.listings.clone(),
        bookings: backends.bookings.clone(),
        storage: backends.storage.clone(),
        clock: clock.clone(),
        listing: config.listing.clone(),
        booking: config.booking.clone(),
    });
    let inventory = Inventory::new(backends.listings.clone(), config.booking.clone());
    let committer = BookingCommitter::new(BookingEnvironment::new(
        backends.listings.clone(),
        backends.bookings.clone(),
        clock.clone(),
        config.booking.clone(),
    ));
    let messaging = MessagingService::new(
        backends.messages.clone(),
        backends.listings.clone(),
        backends.feed.clone(),
        clock,
        config.booking.clone(),
    );
    let search = PropertySearch::new(backends.listings.clone(), config.booking.clone());
    let favorites = FavoritesService::new(backends.favorites.clone(), backends.listings.clone(), config.booking.clone());

    // ========== Step 1: post a listing ==========

    println!("1. Owner posts a plotted layout...");
    let owner = UserId::new();
    let block = |label: &str, plots: u32, area: u32, rate: u32| NewBlock {
        block_id: label.to_string(),
        block_name: None,
        total_plots: plots,
        area_per_plot: Decimal::from(area),
        area_unit: AreaUnit::Sqft,
        price_per_unit: Decimal::from(rate),
        total_price_per_plot: None,
    };
    let listing = listings
        .create_listing(
            &owner,
            NewListing {
                title: "Green Meadows Layout".to_string(),
                description: "DTCP approved plots, 40 ft roads".to_string(),
                location: "Trichy - Madurai Highway".to_string(),
                district: "Tiruchirappalli".to_string(),
                price: None,
                price_type: PriceType::Total,
                amenities: vec!["Water".to_string(), "Street lights".to_string()],
                size_sqft: Some(24_000),
                bedrooms: None,
                bathrooms: None,
                coordinates: None,
                blocks: vec![block("A", 3, 1200, 2500), block("B", 2, 1500, 2200)],
            },
        )
        .await?;
    let property_id = listing.property.id.clone();
    println!("   Listing {property_id} with {} blocks", listing.blocks.len());

    let with_image = listings.attach_image(&owner, &property_id, "layout plan.png", vec![0x89, 0x50, 0x4e, 0x47], "image/png").await?;
    println!("   Image attached: {}\n", with_image.images.join(", "));

    // ========== Step 2: list units ==========

    println!("2. Purchasable units:");
    let units = inventory.list_units(&property_id).await?;
    let PurchasableUnits::Blocks(blocks) = &units.units else {
        return Err("expected a plotted listing".into());
    };
    for unit in blocks {
        println!(
            "   {} - {} of {} plots at {} each",
            unit.block_name, unit.available_plots, unit.total_plots, unit.price_per_plot
        );
    }
    println!();

    // ========== Step 3: book a plot ==========

    println!("3. A buyer books Plot 1 of Block A...");
    let block_a = blocks.iter().find(|u| u.block_id == "A").ok_or("block A missing")?;
    let block_b = blocks.iter().find(|u| u.block_id == "B").ok_or("block B missing")?;
    let slot = PlotSlot::from_display_number(1).ok_or("plot numbers start at 1")?;
    let booking = committer
        .book(BookingRequest {
            selection: UnitSelection::Plot { property_id: property_id.clone(), block: block_a.block, slot },
            buyer: buyer("Asha Raman", "+91 98765 43210"),
            notes: Some("Prefer east facing".to_string()),
        })
        .await?;
    println!("   Booking {} ({}) for {}\n", booking.id, booking.status, booking.total_price);

    // ========== Step 4: race for the last plots ==========

    println!("4. Four buyers race for the {} plots of Block B...", block_b.available_plots);
    let handles: Vec<_> = (1..=4)
        .map(|n| {
            let committer = committer.clone();
            let request = BookingRequest {
                selection: UnitSelection::Plot {
                    property_id: property_id.clone(),
                    block: block_b.block,
                    slot: PlotSlot::new(0),
                },
                buyer: buyer(&format!("Buyer {n}"), &format!("+91 90000 0000{n}")),
                notes: None,
            };
            tokio::spawn(async move { (n, committer.book(request).await) })
        })
        .collect();
    for result in futures::future::join_all(handles).await {
        let (n, outcome) = result?;
        match outcome {
            Ok(booking) => println!("   Buyer {n}: booked ({})", booking.id),
            Err(error) => println!("   Buyer {n}: {error} [{:?}]", error.recovery()),
        }
    }
    println!();

    // ========== Step 5: owner decisions ==========

    println!("5. Owner confirms the first booking...");
    let stranger = UserId::new();
    match committer.transition_status(&stranger, &booking.id, BookingStatus::Confirmed).await {
        Err(BookingError::Unauthorized) => println!("   A stranger's attempt was refused"),
        other => println!("   Unexpected outcome for a stranger: {other:?}"),
    }
    let change = committer.transition_status(&owner, &booking.id, BookingStatus::Confirmed).await?;
    println!("   Booking is now {}", change.booking.status);
    let dashboard = listings.booking_dashboard(&owner, &property_id).await?;
    println!(
        "   Dashboard: {} bookings, {} pending, {} confirmed, revenue {}\n",
        dashboard.total, dashboard.pending, dashboard.confirmed, dashboard.confirmed_revenue
    );

    // ========== Step 6: messaging ==========

    println!("6. Buyer messages the owner...");
    let buyer_id = UserId::new();
    let mut inbox = messaging.subscribe(&owner, Some(property_id.clone())).await?;
    messaging.send_message(&buyer_id, &owner, &property_id, "Can I visit the site on Sunday?").await?;
    match tokio::time::timeout(Duration::from_secs(2), inbox.next()).await {
        Ok(Some(message)) => println!("   Owner received: {}", message.content),
        _ => println!("   No realtime delivery within 2s"),
    }
    inbox.cancel();
    messaging.send_message(&owner, &buyer_id, &property_id, "Yes, 10am works").await?;
    for conversation in messaging.conversations(&owner).await? {
        println!(
            "   Conversation with {} about {}: {} messages, last: {}",
            conversation.key.other,
            conversation.key.property_id,
            conversation.message_count,
            conversation.last_message.content
        );
    }
    println!();

    // ========== Step 7: explore and save ==========

    println!("7. Buyer explores and saves the listing...");
    let filter = PropertyFilter {
        district: Some("Tiruchirappalli".to_string()),
        amenities: vec!["water".to_string()],
        only_available: true,
        ..PropertyFilter::default()
    };
    let found = search.explore(&filter).await?;
    println!("   {} listing(s) match", found.len());
    let saved = favorites.toggle_saved(&buyer_id, &property_id).await?;
    println!("   Saved: {saved}, saved listings: {}", favorites.saved_properties(&buyer_id).await?.len());

    println!("\n============================================");
    println!("   Demo complete");
    println!("============================================\n");
    Ok(())
}
